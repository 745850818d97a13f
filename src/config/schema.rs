//! Configuration schema for artcache
//!
//! Configuration is stored at `~/.config/artcache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Registry holding rebuilt artifact images
    pub registry: RegistryConfig,

    /// Local cache settings
    pub cache: CacheConfig,

    /// Rebuilt artifact tracking
    pub rebuilt: RebuiltConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// OCI registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry host, optionally with port
    pub host: String,

    /// Organization owning the repository
    pub owner: Option<String>,

    /// Repository rebuilt artifacts are pushed to
    pub repository: Option<String>,

    /// Base64 `user:pass`, or a docker config JSON document
    pub token: Option<String>,

    /// Talk plain HTTP
    pub insecure: bool,

    /// Connect and response timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "quay.io".to_string(),
            owner: None,
            repository: Some("artifact-deployments".to_string()),
            token: None,
            insecure: false,
            timeout_secs: 60,
        }
    }
}

/// Local cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; defaults to the user cache directory
    pub root: Option<PathBuf>,

    /// Namespace prepended to cache keys
    pub prepend_tag: Option<String>,

    /// Give up waiting on a concurrent fetch after N seconds (unset = wait forever)
    pub wait_timeout_secs: Option<u64>,
}

/// Rebuilt artifact tracking configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuiltConfig {
    /// File listing rebuilt coordinates, one `group:artifact:version` per line
    pub gav_file: Option<PathBuf>,

    /// Rebuilt coordinates listed inline
    pub gavs: Vec<String>,
}

impl RebuiltConfig {
    /// Whether any source of rebuilt coordinates is configured
    pub fn is_configured(&self) -> bool {
        self.gav_file.is_some() || !self.gavs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[registry]"));
        assert!(toml.contains("host = \"quay.io\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.registry.host, "quay.io");
        assert_eq!(config.registry.timeout_secs, 60);
        assert!(!config.rebuilt.is_configured());
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [registry]
            host = "localhost:5000"
            owner = "hacbs"
            insecure = true

            [cache]
            prepend_tag = "team"

            [rebuilt]
            gavs = ["org.foo:bar:1.0"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.registry.host, "localhost:5000");
        assert_eq!(config.registry.owner.as_deref(), Some("hacbs"));
        assert!(config.registry.insecure);
        // default preserved
        assert_eq!(
            config.registry.repository.as_deref(),
            Some("artifact-deployments")
        );
        assert_eq!(config.cache.prepend_tag.as_deref(), Some("team"));
        assert!(config.rebuilt.is_configured());
    }
}
