//! Error types for artcache
//!
//! All modules use `ArtcacheResult<T>` as their return type. A missing
//! artifact is never an error: lookups return `Ok(None)` instead.

use crate::registry::RegistryError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for artcache operations
pub type ArtcacheResult<T> = Result<T, ArtcacheError>;

/// All errors that can occur in artcache
#[derive(Error, Debug)]
pub enum ArtcacheError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry not configured: {0}")]
    RegistryNotConfigured(&'static str),

    // Credential errors
    #[error("Unable to find a host matching {registry} in provided docker config, hosts provided: {hosts:?}")]
    CredentialHostNotFound { registry: String, hosts: Vec<String> },

    #[error("Invalid registry token: {0}")]
    CredentialInvalid(String),

    // Registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Unsupported manifest media type {media_type}, expected {expected}")]
    UnsupportedManifest {
        media_type: String,
        expected: &'static str,
    },

    // Cache errors
    #[error("Failed to extract archive into {path}: {source}")]
    ArchiveExtract {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl ArtcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an archive extraction error
    pub fn extract(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArchiveExtract {
            path: path.into(),
            source,
        }
    }

    /// Whether the error stems from configuration rather than a request
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. }
                | Self::ConfigDirCreate { .. }
                | Self::RegistryNotConfigured(_)
                | Self::CredentialHostNotFound { .. }
                | Self::CredentialInvalid(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RegistryNotConfigured(_) => {
                Some("Set [registry] host/owner/repository in the config file")
            }
            Self::CredentialHostNotFound { .. } => {
                Some("Add an `auths` entry whose key is a prefix of registry/owner/repository")
            }
            Self::CredentialInvalid(_) => {
                Some("Token must be base64(user:pass) or a docker config JSON document")
            }
            Self::ArtifactNotFound(_) => {
                Some("Pass --assume-rebuilt if the rebuilt set is not configured")
            }
            _ => None,
        }
    }
}
