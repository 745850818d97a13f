//! Artifact coordinates and cache key derivation
//!
//! A cache key is the SHA256 of `group:artifact:version`, optionally
//! prefixed with a namespace. The same key names the registry tag the
//! rebuilt artifact was published under.

use crate::error::{ArtcacheError, ArtcacheResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Registry tags are limited to 128 characters
pub const MAX_KEY_LEN: usize = 128;

/// Maven-style coordinate of a single file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactCoordinate {
    /// Group id, dot separated (`org.foo`)
    pub group: String,
    /// Artifact id
    pub artifact: String,
    /// Version
    pub version: String,
    /// File name relative to the version directory (`bar-1.0.jar`)
    pub target: String,
}

impl ArtifactCoordinate {
    /// Create a coordinate, normalizing `/` group separators to `.`
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            group: normalize_group(&group.into()),
            artifact: artifact.into(),
            version: version.into(),
            target: target.into(),
        }
    }

    /// `group:artifact:version`
    pub fn gav(&self) -> String {
        format!("{}:{}:{}", self.group, self.artifact, self.version)
    }

    /// Group as a relative directory path (`org/foo`)
    pub fn group_path(&self) -> PathBuf {
        self.group.split('.').collect()
    }

    /// Path of the target inside a Maven repository layout
    pub fn repository_path(&self) -> PathBuf {
        self.group_path()
            .join(&self.artifact)
            .join(&self.version)
            .join(&self.target)
    }

    /// Cache key for this coordinate
    pub fn cache_key(&self, namespace: Option<&str>) -> String {
        derive_key(&self.group, &self.artifact, &self.version, namespace)
    }
}

impl fmt::Display for ArtifactCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.gav(), self.target)
    }
}

/// Group, artifact and version parsed from `group:artifact:version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gav {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl Gav {
    /// Attach a target file name
    pub fn with_target(self, target: impl Into<String>) -> ArtifactCoordinate {
        ArtifactCoordinate::new(self.group, self.artifact, self.version, target)
    }
}

impl FromStr for Gav {
    type Err = ArtcacheError;

    fn from_str(s: &str) -> ArtcacheResult<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            [group, artifact, version]
                if !group.is_empty() && !artifact.is_empty() && !version.is_empty() =>
            {
                Ok(Self {
                    group: normalize_group(group),
                    artifact: (*artifact).to_string(),
                    version: (*version).to_string(),
                })
            }
            _ => Err(ArtcacheError::User(format!(
                "Invalid coordinate '{}'. Expected format: group:artifact:version",
                s
            ))),
        }
    }
}

fn normalize_group(group: &str) -> String {
    group.replace('/', ".")
}

/// Derive the cache key for a coordinate.
///
/// Empty components are hashed as given.
pub fn derive_key(group: &str, artifact: &str, version: &str, namespace: Option<&str>) -> String {
    let canonical = format!("{}:{}:{}", normalize_group(group), artifact, version);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    let mut key = match namespace.map(str::trim).filter(|ns| !ns.is_empty()) {
        Some(ns) => format!("{}_{}", ns, hash),
        None => hash,
    };

    if key.len() > MAX_KEY_LEN {
        let mut end = MAX_KEY_LEN;
        while !key.is_char_boundary(end) {
            end -= 1;
        }
        key.truncate(end);
    }
    key
}
