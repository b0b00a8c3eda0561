//! Application configuration.
//!
//! The configuration is loaded from a JSON file
//! (`$XDG_CONFIG_HOME/openpipe/config.json` by default).  The top-level
//! schema uses named sections so the file can be extended later without
//! breaking backward compatibility.
//!
//! # Example
//!
//! ```json
//! {
//!   "socket": { "directory": "/run/user/1000", "prefix": "openpipe" },
//!   "workspace_extensions": ["code-workspace"]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
///
/// Every field is optional — a minimal `{}` file is valid and all sections
/// fall back to their compiled-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Socket endpoint settings.
    pub socket: SocketConfig,

    /// File extensions (without the leading dot) recognized as multi-folder
    /// workspace descriptors when classifying `"open"` requests.
    pub workspace_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: SocketConfig::default(),
            workspace_extensions: vec!["code-workspace".into()],
        }
    }
}

/// Socket endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Directory in which socket files are created.  `None` means
    /// `$XDG_RUNTIME_DIR`, falling back to the system temp dir.
    pub directory: Option<PathBuf>,
    /// Leading component of generated socket file names.
    pub prefix: String,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: "openpipe".into(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigError(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }
}

/// Error from loading or parsing a configuration file.
#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_config() {
        let json = r#"{
            "socket": { "directory": "/run/user/1000", "prefix": "myapp" },
            "workspace_extensions": ["myapp-workspace", "code-workspace"]
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.socket.directory, Some(PathBuf::from("/run/user/1000")));
        assert_eq!(cfg.socket.prefix, "myapp");
        assert_eq!(cfg.workspace_extensions.len(), 2);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.socket.directory, None);
        assert_eq!(cfg.socket.prefix, "openpipe");
        assert_eq!(cfg.workspace_extensions, vec!["code-workspace".to_string()]);
    }

    #[test]
    fn deserialize_partial_socket_section() {
        let json = r#"{ "socket": { "prefix": "custom" } }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.socket.prefix, "custom");
        assert_eq!(cfg.socket.directory, None);
    }

    #[test]
    fn unknown_top_level_keys_ignored() {
        let json = r#"{ "socket": {}, "future_section": { "key": 42 } }"#;
        // Should not fail — unknown keys are silently ignored.
        let _cfg: Config = serde_json::from_str(json).unwrap();
    }
}
