//! OCI image manifest parsing
//!
//! Only the OCI image manifest shape is understood. Rebuilt artifact images
//! carry exactly three layers; the third holds the `artifacts/` tree.

use serde::{Deserialize, Serialize};

/// OCI image manifest media type
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Docker v2 schema 2 manifest media type (accepted on the wire, rejected after)
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

/// Number of layers in a rebuilt artifact image
pub const EXPECTED_LAYERS: usize = 3;

/// Index of the layer holding the artifact tree
pub const ARTIFACTS_LAYER_INDEX: usize = 2;

/// Content descriptor for a config or layer blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Blob media type
    #[serde(default)]
    pub media_type: String,

    /// Content digest (`sha256:<hex>`)
    pub digest: String,

    /// Blob size in bytes
    #[serde(default)]
    pub size: u64,
}

/// Parsed image manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version (2 for both OCI and Docker v2)
    #[serde(default)]
    pub schema_version: u32,

    /// Manifest media type; older registries may omit it from the body
    #[serde(default)]
    pub media_type: Option<String>,

    /// Image config descriptor
    #[serde(default)]
    pub config: Option<Descriptor>,

    /// Layer descriptors in order
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

impl Manifest {
    /// Parse a manifest from raw JSON bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Whether this is an OCI image manifest
    pub fn is_oci(&self) -> bool {
        self.media_type
            .as_deref()
            .is_some_and(|mt| mt.eq_ignore_ascii_case(OCI_MANIFEST_MEDIA_TYPE))
    }

    /// The artifact tree layer, if the manifest has the expected shape
    pub fn artifacts_layer(&self) -> Option<&Descriptor> {
        if self.layers.len() == EXPECTED_LAYERS {
            self.layers.get(ARTIFACTS_LAYER_INDEX)
        } else {
            None
        }
    }

    /// First config or layer digest that is not a well-formed `algorithm:hex`
    pub fn invalid_digest(&self) -> Option<&str> {
        self.config
            .iter()
            .chain(self.layers.iter())
            .map(|d| d.digest.as_str())
            .find(|digest| !is_valid_digest(digest))
    }
}

/// A manifest together with its content digest
#[derive(Debug, Clone)]
pub struct ManifestAndDigest {
    pub manifest: Manifest,
    /// Manifest digest (`sha256:<hex>`)
    pub digest: String,
}

impl ManifestAndDigest {
    /// Hex part of the digest, used as the local cache directory name
    pub fn digest_hash(&self) -> &str {
        digest_hash(&self.digest)
    }
}

/// Strip the `algorithm:` prefix from a digest
pub fn digest_hash(digest: &str) -> &str {
    digest.split_once(':').map_or(digest, |(_, hash)| hash)
}

/// `algorithm:hex`, safe to use as a path component
pub(crate) fn is_valid_digest(digest: &str) -> bool {
    match digest.split_once(':') {
        Some((algorithm, hash)) => {
            !algorithm.is_empty()
                && !hash.is_empty()
                && algorithm
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '+' || c == '.')
                && hash.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}
