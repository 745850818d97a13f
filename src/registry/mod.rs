//! Pull side of the OCI distribution protocol
//!
//! Errors are classified once, at the HTTP boundary, into not-found,
//! unauthorized and fatal kinds so callers never inspect error chains.

pub mod client;
pub mod credential;
pub mod manifest;

pub use client::{RegistryClient, RegistryOptions};
pub use credential::Credential;
pub use manifest::{digest_hash, Descriptor, Manifest, ManifestAndDigest, OCI_MANIFEST_MEDIA_TYPE};

use std::io::Write;
use thiserror::Error;

/// Errors raised while talking to a registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Unauthorized to pull {what}")]
    Unauthorized { what: String },

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: ureq::Error,
    },

    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("Failed to write blob {digest}: {source}")]
    BlobWrite {
        digest: String,
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    /// The requested manifest or blob does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Credentials were rejected
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Anything that is neither not-found nor unauthorized
    pub fn is_fatal(&self) -> bool {
        !self.is_not_found() && !self.is_unauthorized()
    }
}

/// Registry operations needed to fetch rebuilt artifacts.
///
/// Calls block; async callers run them on the blocking pool.
pub trait RegistryApi: Send + Sync {
    /// Registry host, used for logging and as the repository client name
    fn name(&self) -> &str;

    /// Pull a manifest by tag, authenticating once on a 401 challenge
    fn pull_manifest(&self, tag: &str) -> Result<ManifestAndDigest, RegistryError>;

    /// Stream a blob into `sink`, returning the number of bytes written
    fn pull_blob(&self, digest: &str, sink: &mut dyn Write) -> Result<u64, RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        let not_found = RegistryError::NotFound {
            what: "manifest abc".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_fatal());

        let unauthorized = RegistryError::Unauthorized {
            what: "manifest abc".to_string(),
        };
        assert!(unauthorized.is_unauthorized());
        assert!(!unauthorized.is_fatal());

        let status = RegistryError::Status {
            status: 500,
            url: "https://quay.io/v2/".to_string(),
        };
        assert!(status.is_fatal());
        assert!(status.to_string().contains("500"));
    }
}
