//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_OVERLAPPED";

/// Config file name in the working directory
const LOCAL_CONFIG_FILE_NAME: &str = "serial-overlapped.toml";

/// Config file name inside the user config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory inside the user config directory
const APP_DIR_NAME: &str = "serial-overlapped";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_OVERLAPPED_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_OVERLAPPED_CONFIG` environment variable (explicit path)
    /// 2. `./serial-overlapped.toml` (current directory)
    /// 3. `<user config dir>/serial-overlapped/config.toml`
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides still apply; an invalid one is an error.
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        debug!("{} points to missing file {}", CONFIG_PATH_ENV, path.display());
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. XDG config directory (Linux/macOS) or APPDATA (Windows)
    get_default_config_path().filter(|path| path.exists())
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!("Loading configuration from {}", path.display());
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SERIAL_OVERLAPPED_<SECTION>_<KEY>`
/// For example:
/// - `SERIAL_OVERLAPPED_SERIAL_BAUDS=115200`
/// - `SERIAL_OVERLAPPED_LOGGING_FORMAT=json`
/// - `SERIAL_OVERLAPPED_RFC2217_SIGNATURE=bench-client`
///
/// Either every override applies or `config` is left untouched.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    let mut updated = config.clone();

    // Serial overrides
    let var = format!("{}_SERIAL_BAUDS", ENV_PREFIX);
    if let Ok(val) = std::env::var(&var) {
        let bauds: u32 = val
            .parse()
            .map_err(|_| ConfigError::invalid_env(&var, format!("'{}' is not a baud rate", val)))?;
        updated.serial.settings = updated
            .serial
            .settings
            .to_builder()
            .bauds(bauds)
            .build()
            .map_err(|source| ConfigError::Settings { var, source })?;
    }

    // Logging overrides
    if let Ok(val) = std::env::var(format!("{}_LOGGING_LEVEL", ENV_PREFIX)) {
        updated.logging.level = val;
    }
    let var = format!("{}_LOGGING_FORMAT", ENV_PREFIX);
    if let Ok(val) = std::env::var(&var) {
        updated.logging.format = val
            .parse()
            .map_err(|e: String| ConfigError::invalid_env(&var, e))?;
    }

    // RFC 2217 overrides
    if let Ok(val) = std::env::var(format!("{}_RFC2217_SIGNATURE", ENV_PREFIX)) {
        updated.rfc2217.signature = val;
    }

    *config = updated;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use crate::error::SerialError;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults().unwrap();
        assert_eq!(loader.config().serial.settings.bauds(), 9600);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("SERIAL_OVERLAPPED_SERIAL_BAUDS", "57600");
        env::set_var("SERIAL_OVERLAPPED_LOGGING_FORMAT", "compact");

        let loader = ConfigLoader::with_defaults().unwrap();
        assert_eq!(loader.config().serial.settings.bauds(), 57600);
        assert_eq!(loader.config().logging.format, LogFormat::Compact);

        // Clean up
        env::remove_var("SERIAL_OVERLAPPED_SERIAL_BAUDS");
        env::remove_var("SERIAL_OVERLAPPED_LOGGING_FORMAT");
    }

    #[test]
    #[serial]
    fn test_invalid_env_override() {
        let mut config = Config::default();

        env::set_var("SERIAL_OVERLAPPED_SERIAL_BAUDS", "fast");
        let err = apply_env_overrides(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));

        env::set_var("SERIAL_OVERLAPPED_SERIAL_BAUDS", "0");
        let err = apply_env_overrides(&mut config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Settings {
                source: SerialError::Configuration(_),
                ..
            }
        ));

        env::remove_var("SERIAL_OVERLAPPED_SERIAL_BAUDS");
    }

    #[test]
    #[serial]
    fn test_defaults_loader_reports_bad_override() {
        env::set_var("SERIAL_OVERLAPPED_SERIAL_BAUDS", "0");

        let result = ConfigLoader::with_defaults();

        env::remove_var("SERIAL_OVERLAPPED_SERIAL_BAUDS");
        assert!(matches!(result, Err(ConfigError::Settings { .. })));
    }

    #[test]
    #[serial]
    fn test_failed_override_leaves_config_untouched() {
        let mut config = Config::default();
        env::set_var("SERIAL_OVERLAPPED_SERIAL_BAUDS", "115200");
        env::set_var("SERIAL_OVERLAPPED_LOGGING_FORMAT", "xml");

        let result = apply_env_overrides(&mut config);

        env::remove_var("SERIAL_OVERLAPPED_SERIAL_BAUDS");
        env::remove_var("SERIAL_OVERLAPPED_LOGGING_FORMAT");
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
        assert_eq!(config.serial.settings.bauds(), 9600);
        assert_eq!(config.logging.format, LogFormat::default());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [serial.settings]
            bauds = 38400
            stop_bits = "two"

            [rfc2217]
            signature = "lab bench"
            "#
        )
        .unwrap();

        let loader = ConfigLoader::load_from(file.path()).unwrap();

        assert_eq!(loader.config_path.as_deref(), Some(file.path()));
        assert_eq!(loader.config().serial.settings.bauds(), 38400);
        assert_eq!(loader.config().rfc2217.signature, "lab bench");
    }

    #[test]
    #[serial]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::load_from(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    #[serial]
    fn test_load_rejects_zero_bauds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[serial.settings]\nbauds = 0").unwrap();

        let err = ConfigLoader::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    #[serial]
    fn test_explicit_config_path_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[logging]\nlevel = \"trace\"\n").unwrap();
        env::set_var(CONFIG_PATH_ENV, &path);

        let loader = ConfigLoader::load().unwrap();
        assert_eq!(loader.config_path, Some(path));
        assert_eq!(loader.config().logging.level, "trace");

        env::remove_var(CONFIG_PATH_ENV);
    }

    #[test]
    #[serial]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut loader = ConfigLoader::with_defaults().unwrap();
        loader
            .config
            .serial
            .port_aliases
            .insert("modem".to_string(), "COM4".to_string());
        loader.save_to(&path).unwrap();

        let reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config().serial.resolve_port("modem"), "COM4");
    }
}
