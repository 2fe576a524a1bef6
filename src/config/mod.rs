//! Configuration module for serial-overlapped.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_OVERLAPPED_CONFIG` environment variable (explicit path)
//! 2. `./serial-overlapped.toml` (current directory)
//! 3. `~/.config/serial-overlapped/config.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serial-overlapped\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `SERIAL_OVERLAPPED_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_OVERLAPPED_SERIAL_BAUDS=115200`
//! - `SERIAL_OVERLAPPED_LOGGING_LEVEL=debug`
//! - `SERIAL_OVERLAPPED_RFC2217_SIGNATURE=bench-client`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_overlapped::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Default baud: {}", config.serial.settings.bauds());
//! # Ok::<(), serial_overlapped::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, Rfc2217Config, SerialConfig};
