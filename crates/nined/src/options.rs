//! Runtime configuration
//!
//! Options that tune the translation runtime without touching its semantics.
//! Loaded from a `.toml` or `.ron` file next to the host application when
//! present, defaults otherwise.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration load/store errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Runtime options for the translation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Enable debug-utils labels on native objects when available
    pub enable_debug_utils: bool,

    /// Maximum number of deferred operations the worker drains per batch
    pub cs_chunk_size: usize,

    /// Warn once the number of default-pool (losable) resources passes this
    pub losable_resource_warn_threshold: u32,

    /// Application name reported to the native instance
    pub app_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enable_debug_utils: false,
            cs_chunk_size: 64,
            losable_resource_warn_threshold: 4096,
            app_name: "nined".to_string(),
        }
    }
}

impl Options {
    /// Load options from a `.toml` or `.ron` file
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save options to a `.toml` or `.ron` file
    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert!(!options.enable_debug_utils);
        assert!(options.cs_chunk_size > 0);
        assert_eq!(options.app_name, "nined");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let options: Options = toml::from_str("cs_chunk_size = 16").unwrap();
        assert_eq!(options.cs_chunk_size, 16);
        assert_eq!(
            options.losable_resource_warn_threshold,
            Options::default().losable_resource_warn_threshold
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let mut options = Options::default();
        options.enable_debug_utils = true;
        options.cs_chunk_size = 8;

        let text = toml::to_string_pretty(&options).unwrap();
        let back: Options = toml::from_str(&text).unwrap();
        assert!(back.enable_debug_utils);
        assert_eq!(back.cs_chunk_size, 8);
    }

    #[test]
    fn test_unsupported_format_rejected() {
        assert!(matches!(
            Options::load_from_file("options.json"),
            Err(ConfigError::UnsupportedFormat(_)) | Err(ConfigError::Io(_))
        ));
    }
}
