//! Rebuilt artifacts served from an OCI registry
//!
//! A request resolves its cache key to a manifest digest, makes sure the
//! digest's artifact layer is extracted locally (fetching it at most once
//! per process), and opens the requested file from the extracted tree.

use crate::cache::extract::extract;
use crate::cache::flight::{Flight, FlightGuard, SingleFlight};
use crate::cache::key::ArtifactCoordinate;
use crate::cache::store::{read_sha1, resolve_file, LocalCacheStore};
use crate::error::{ArtcacheError, ArtcacheResult};
use crate::rebuilt::RebuiltArtifacts;
use crate::registry::manifest::{is_valid_digest, ManifestAndDigest, OCI_MANIFEST_MEDIA_TYPE};
use crate::registry::{RegistryApi, RegistryError};
use crate::repository::{ArtifactResult, RepositoryClient};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Component, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// File name of the downloaded layer inside the staging directory
const LAYER_ARCHIVE: &str = "layer.tar.gz";

/// Tunables for [`OciRepositoryClient`]
#[derive(Debug, Clone, Default)]
pub struct OciRepositoryOptions {
    /// Prefix for cache keys (`<namespace>_<hash>`)
    pub namespace: Option<String>,
    /// How long a caller waits on another caller's fetch; `None` waits forever
    pub wait_timeout: Option<Duration>,
}

/// Repository client backed by rebuilt artifact images in an OCI registry
pub struct OciRepositoryClient {
    registry: Arc<dyn RegistryApi>,
    rebuilt: Arc<dyn RebuiltArtifacts>,
    store: LocalCacheStore,
    flights: SingleFlight,
    options: OciRepositoryOptions,
}

impl OciRepositoryClient {
    pub fn new(
        registry: Arc<dyn RegistryApi>,
        rebuilt: Arc<dyn RebuiltArtifacts>,
        store: LocalCacheStore,
        options: OciRepositoryOptions,
    ) -> Self {
        Self {
            registry,
            rebuilt,
            store,
            flights: SingleFlight::new(),
            options,
        }
    }

    async fn resolve(
        &self,
        coordinate: &ArtifactCoordinate,
    ) -> ArtcacheResult<Option<ArtifactResult>> {
        let gav = coordinate.gav();
        if !self.rebuilt.is_possibly_rebuilt(&gav) {
            debug!("{} is not a rebuilt artifact", gav);
            return Ok(None);
        }

        let key = coordinate.cache_key(self.options.namespace.as_deref());
        let Some(pulled) = self.pull_manifest(&key, &gav).await? else {
            return Ok(None);
        };

        if !pulled.manifest.is_oci() {
            return Err(ArtcacheError::UnsupportedManifest {
                media_type: pulled.manifest.media_type.clone().unwrap_or_default(),
                expected: OCI_MANIFEST_MEDIA_TYPE,
            });
        }

        // Digests name cache directories and blob URLs
        if let Some(bad) = invalid_digest(&pulled) {
            return Err(RegistryError::InvalidResponse {
                url: format!("{}/manifests/{}", self.registry.name(), key),
                reason: format!("invalid digest '{}' for {}", bad, gav),
            }
            .into());
        }

        let Some(layer) = pulled.manifest.artifacts_layer() else {
            warn!(
                "Unexpected layer count {} in manifest {} for {}",
                pulled.manifest.layers.len(),
                pulled.digest,
                gav
            );
            return Ok(None);
        };

        let Some(artifacts) = self
            .ensure_extracted(pulled.digest_hash(), &layer.digest)
            .await?
        else {
            return Ok(None);
        };

        open_artifact(artifacts, coordinate).await
    }

    async fn pull_manifest(&self, key: &str, gav: &str) -> ArtcacheResult<Option<ManifestAndDigest>> {
        let registry = Arc::clone(&self.registry);
        let tag = key.to_string();
        let pulled = blocking("manifest pull", move || Ok(registry.pull_manifest(&tag))).await?;

        match pulled {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) if e.is_not_found() => {
                debug!("No rebuilt image tagged {} for {}", key, gav);
                Ok(None)
            }
            Err(e) => {
                error!("Giving up on {} after authentication failed: {}", gav, e);
                Ok(None)
            }
        }
    }

    async fn lookup(&self, digest_hash: &str) -> ArtcacheResult<Option<PathBuf>> {
        let store = self.store.clone();
        let key = digest_hash.to_string();
        blocking("cache lookup", move || store.lookup(&key)).await
    }

    /// Root of the extracted `artifacts/` tree for a manifest digest
    async fn ensure_extracted(
        &self,
        digest_hash: &str,
        layer_digest: &str,
    ) -> ArtcacheResult<Option<PathBuf>> {
        if let Some(artifacts) = self.lookup(digest_hash).await? {
            return Ok(Some(artifacts));
        }

        match self.flights.acquire(digest_hash) {
            Flight::Owner(guard) => {
                // A previous owner may have published between lookup and acquire
                if let Some(artifacts) = self.lookup(digest_hash).await? {
                    return Ok(Some(artifacts));
                }
                self.fetch(guard, layer_digest).await
            }
            Flight::Waiter(waiter) => {
                if !waiter.wait(self.options.wait_timeout).await {
                    warn!("Timed out waiting for another fetch of {}", digest_hash);
                    return Ok(None);
                }
                let artifacts = self.lookup(digest_hash).await?;
                if artifacts.is_none() {
                    debug!("Fetch of {} by another request did not complete", digest_hash);
                }
                Ok(artifacts)
            }
        }
    }

    /// Download and extract as the gate owner.
    ///
    /// The guard moves into the blocking task so the gate stays closed until
    /// extraction is over, even if this future is dropped.
    async fn fetch(&self, guard: FlightGuard, layer_digest: &str) -> ArtcacheResult<Option<PathBuf>> {
        let registry = Arc::clone(&self.registry);
        let store = self.store.clone();
        let layer_digest = layer_digest.to_string();

        blocking("artifact fetch", move || {
            let entry_key = guard.key().to_string();
            let outcome = fetch_layer(registry.as_ref(), &store, &entry_key, &layer_digest);
            drop(guard);
            outcome
        })
        .await
    }
}

#[async_trait]
impl RepositoryClient for OciRepositoryClient {
    fn name(&self) -> &str {
        self.registry.name()
    }

    async fn get_artifact_file(
        &self,
        coordinate: &ArtifactCoordinate,
    ) -> ArtcacheResult<Option<ArtifactResult>> {
        let started = Instant::now();
        let result = self.resolve(coordinate).await;
        debug!(
            "Request for {} took {}ms",
            coordinate,
            started.elapsed().as_millis()
        );
        result
    }

    async fn get_metadata_file(
        &self,
        _group: &str,
        _target: &str,
    ) -> ArtcacheResult<Option<ArtifactResult>> {
        Ok(None)
    }
}

/// Run filesystem or registry work on the blocking pool
async fn blocking<T, F>(what: &'static str, work: F) -> ArtcacheResult<T>
where
    F: FnOnce() -> ArtcacheResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ArtcacheError::Internal(format!("{} task failed: {}", what, e)))?
}

fn invalid_digest(pulled: &ManifestAndDigest) -> Option<&str> {
    if !is_valid_digest(&pulled.digest) {
        return Some(pulled.digest.as_str());
    }
    pulled.manifest.invalid_digest()
}

fn fetch_layer(
    registry: &dyn RegistryApi,
    store: &LocalCacheStore,
    entry_key: &str,
    layer_digest: &str,
) -> ArtcacheResult<Option<PathBuf>> {
    let started = Instant::now();
    let staging = store.stage(entry_key)?;
    let archive_path = staging.path().join(LAYER_ARCHIVE);

    let mut archive = File::create(&archive_path)
        .map_err(|e| ArtcacheError::io(format!("creating {}", archive_path.display()), e))?;
    let bytes = match registry.pull_blob(layer_digest, &mut archive) {
        Ok(bytes) => bytes,
        Err(e) => return blob_failure(e, layer_digest),
    };
    archive
        .flush()
        .map_err(|e| ArtcacheError::io(format!("writing {}", archive_path.display()), e))?;
    drop(archive);

    let archive = File::open(&archive_path)
        .map_err(|e| ArtcacheError::io(format!("opening {}", archive_path.display()), e))?;
    let summary = extract(BufReader::new(archive), staging.path())?;

    let published = staging.commit()?;
    if published.is_some() {
        info!(
            "Cached layer {} ({} bytes, {} files) in {}ms",
            layer_digest,
            bytes,
            summary.files,
            started.elapsed().as_millis()
        );
    }
    Ok(published)
}

fn blob_failure(e: RegistryError, layer_digest: &str) -> ArtcacheResult<Option<PathBuf>> {
    if e.is_fatal() {
        return Err(e.into());
    }
    if e.is_not_found() {
        warn!("Layer {} is missing from the registry", layer_digest);
    } else {
        error!("Not authorized to pull layer {}: {}", layer_digest, e);
    }
    Ok(None)
}

async fn open_artifact(
    artifacts: PathBuf,
    coordinate: &ArtifactCoordinate,
) -> ArtcacheResult<Option<ArtifactResult>> {
    let relative = coordinate.repository_path();
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        warn!("Refusing to resolve {} outside the artifact tree", coordinate);
        return Ok(None);
    }

    let root = artifacts.clone();
    let target = coordinate.clone();
    let located = blocking("artifact lookup", move || {
        let Some(path) = resolve_file(&root, &target) else {
            return Ok(None);
        };
        let sha1 = read_sha1(&path)?;
        Ok(Some((path, sha1)))
    })
    .await?;

    let Some((path, sha1)) = located else {
        warn!(
            "{} not found in rebuilt image at {}",
            coordinate,
            artifacts.display()
        );
        return Ok(None);
    };

    let stream = tokio::fs::File::open(&path)
        .await
        .map_err(|e| ArtcacheError::io(format!("opening {}", path.display()), e))?;
    let size = stream
        .metadata()
        .await
        .map_err(|e| ArtcacheError::io(format!("reading metadata of {}", path.display()), e))?
        .len();

    Ok(Some(ArtifactResult {
        stream,
        size,
        sha1,
        metadata: HashMap::new(),
    }))
}
