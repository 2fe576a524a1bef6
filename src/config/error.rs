//! Failures while locating, reading or overriding the configuration file.

use crate::error::SerialError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or a value failed settings validation.
    #[error("Malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An override variable could not be parsed.
    #[error("{var}: {message}")]
    InvalidEnv { var: String, message: String },

    /// An override produced serial line settings the builder rejects.
    #[error("{var} yields invalid line settings: {source}")]
    Settings {
        var: String,
        #[source]
        source: SerialError,
    },
}

impl ConfigError {
    pub fn invalid_env(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnv {
            var: var.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_settings_error_keeps_serial_error() {
        let err = ConfigError::Settings {
            var: "SERIAL_OVERLAPPED_SERIAL_BAUDS".to_string(),
            source: SerialError::configuration("Argument >bauds< must be greater than 0"),
        };

        assert!(err.to_string().starts_with("SERIAL_OVERLAPPED_SERIAL_BAUDS"));
        let source = err.source().and_then(|s| s.downcast_ref::<SerialError>());
        assert!(matches!(source, Some(SerialError::Configuration(_))));
    }

    #[test]
    fn test_invalid_env_message() {
        let err = ConfigError::invalid_env("SERIAL_OVERLAPPED_LOGGING_FORMAT", "unknown format");
        assert_eq!(
            err.to_string(),
            "SERIAL_OVERLAPPED_LOGGING_FORMAT: unknown format"
        );
    }
}
