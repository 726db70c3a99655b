//! Engine configuration.
//!
//! Loaded from TOML files or environment variables; everything has a
//! working default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reassembly tunables.
    #[serde(default)]
    pub reassembly: ReassemblyConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| DecodeError::Config(format!("Failed to read config file: {e}")))?;

        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PACKETLENS_DESEGMENT") {
            if let Ok(val) = val.parse() {
                config.reassembly.desegment = val;
            }
        }
        if let Ok(val) = std::env::var("PACKETLENS_MAX_MESSAGE_LEN") {
            if let Ok(val) = val.parse() {
                config.reassembly.max_message_len = val;
            }
        }

        config
    }
}

/// Reassembly tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassemblyConfig {
    /// Reassemble messages spanning multiple transport segments. When off,
    /// each segment is decoded as delivered.
    pub desegment: bool,

    /// Ceiling on a declared message length; anything larger discards the
    /// direction's buffer instead of accumulating without bound.
    pub max_message_len: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            desegment: true,
            max_message_len: 256 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.reassembly.desegment);
        assert_eq!(config.reassembly.max_message_len, 256 * 1024);
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [reassembly]
            desegment = false
            max_message_len = 4096
        "#;

        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert!(!config.reassembly.desegment);
        assert_eq!(config.reassembly.max_message_len, 4096);
    }

    #[test]
    fn test_config_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reassembly]\nmax_message_len = 512\ndesegment = true").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.reassembly.max_message_len, 512);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = EngineConfig::from_file("/nonexistent/packetlens.toml").unwrap_err();
        assert!(matches!(err, DecodeError::Config(_)));
    }
}
