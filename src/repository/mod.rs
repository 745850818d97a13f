//! Artifact retrieval interface
//!
//! Backing stores (OCI registry cache, local proxy, remote Maven repository)
//! implement [`RepositoryClient`] so callers can chain them.

pub mod oci;

pub use oci::{OciRepositoryClient, OciRepositoryOptions};

use crate::cache::ArtifactCoordinate;
use crate::error::ArtcacheResult;
use async_trait::async_trait;
use std::collections::HashMap;

/// A resolved artifact file
#[derive(Debug)]
pub struct ArtifactResult {
    /// Open handle positioned at the start of the file
    pub stream: tokio::fs::File,
    pub size: u64,
    /// Contents of the `.sha1` sidecar, if one was published
    pub sha1: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// A source of Maven artifacts and metadata.
///
/// `Ok(None)` means not found; errors are reserved for failures the caller
/// should not paper over by trying the next source.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Human-readable name of the backing store
    fn name(&self) -> &str;

    /// Resolve a single artifact file
    async fn get_artifact_file(
        &self,
        coordinate: &ArtifactCoordinate,
    ) -> ArtcacheResult<Option<ArtifactResult>>;

    /// Resolve a `maven-metadata.xml` style file for a group
    async fn get_metadata_file(
        &self,
        group: &str,
        target: &str,
    ) -> ArtcacheResult<Option<ArtifactResult>>;
}
