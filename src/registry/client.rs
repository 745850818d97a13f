//! Blocking registry client built on ureq
//!
//! Speaks just enough of the distribution API to pull a manifest by tag and
//! a blob by digest. When the registry answers 401, a bearer challenge scoped
//! to `repository:{owner}/{repository}:pull` is synthesized, a token fetched
//! from `{scheme}://{registry}/v2/auth`, and the manifest pull retried once.

use crate::registry::credential::Credential;
use crate::registry::manifest::{
    is_valid_digest, Manifest, ManifestAndDigest, DOCKER_MANIFEST_MEDIA_TYPE,
    OCI_MANIFEST_MEDIA_TYPE,
};
use crate::registry::{RegistryApi, RegistryError};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};
use ureq::Agent;

/// Connection settings for a registry repository
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Registry host, optionally with port (`quay.io`, `localhost:5000`)
    pub registry: String,
    /// Organization or user owning the repository
    pub owner: String,
    /// Repository holding rebuilt artifacts
    pub repository: String,
    /// Talk plain HTTP instead of HTTPS
    pub insecure: bool,
    /// Connect and response timeout
    pub timeout: Duration,
}

/// Authorization currently attached to requests
#[derive(Debug, Clone)]
enum Authorization {
    Anonymous,
    Basic(String),
    Bearer(String),
}

impl Authorization {
    fn header(&self) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::Basic(value) => Some(value.clone()),
            Self::Bearer(token) => Some(format!("Bearer {}", token)),
        }
    }
}

/// Token endpoint response; registries use either field name
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Registry client for a single `owner/repository`
pub struct RegistryClient {
    options: RegistryOptions,
    credential: Option<Credential>,
    agent: Agent,
    authorization: Mutex<Authorization>,
}

impl RegistryClient {
    /// Create a client. The credential is used as-is for every request.
    pub fn new(options: RegistryOptions, credential: Option<Credential>) -> Self {
        let config = Agent::config_builder()
            .timeout_connect(Some(options.timeout))
            .timeout_recv_response(Some(options.timeout))
            .build();
        let agent = Agent::new_with_config(config);

        let authorization = match &credential {
            Some(cred) => Authorization::Basic(cred.basic_auth_header()),
            None => Authorization::Anonymous,
        };

        Self {
            options,
            credential,
            agent,
            authorization: Mutex::new(authorization),
        }
    }

    fn scheme(&self) -> &'static str {
        if self.options.insecure {
            "http"
        } else {
            "https"
        }
    }

    fn repository_url(&self) -> String {
        format!(
            "{}://{}/v2/{}/{}",
            self.scheme(),
            self.options.registry,
            self.options.owner,
            self.options.repository
        )
    }

    /// Bearer challenge for pull access to this repository
    pub fn pull_challenge(&self) -> String {
        format!(
            "Bearer realm=\"{}://{}/v2/auth\",service=\"{}\",scope=\"repository:{}/{}:pull\"",
            self.scheme(),
            self.options.registry,
            self.options.registry,
            self.options.owner,
            self.options.repository
        )
    }

    fn current_authorization(&self) -> Option<String> {
        self.authorization
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .header()
    }

    fn fetch_manifest(&self, tag: &str) -> Result<ManifestAndDigest, RegistryError> {
        let url = format!("{}/manifests/{}", self.repository_url(), tag);
        let what = format!("manifest {}", tag);

        let mut request = self.agent.get(&url).header(
            "Accept",
            format!("{}, {}", OCI_MANIFEST_MEDIA_TYPE, DOCKER_MANIFEST_MEDIA_TYPE),
        );
        if let Some(auth) = self.current_authorization() {
            request = request.header("Authorization", auth);
        }

        let mut response = request.call().map_err(|e| classify(e, &what, &url))?;

        let header_digest = header_value(&response, "docker-content-digest");
        let content_type = header_value(&response, "content-type");
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| classify(e, &what, &url))?;

        let mut manifest = Manifest::parse(&body).map_err(|e| RegistryError::InvalidResponse {
            url: url.clone(),
            reason: format!("malformed manifest: {}", e),
        })?;
        if let Some(bad) = manifest.invalid_digest() {
            return Err(RegistryError::InvalidResponse {
                url,
                reason: format!("invalid descriptor digest '{}'", bad),
            });
        }
        if manifest.media_type.is_none() {
            manifest.media_type = content_type
                .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_string());
        }

        let digest = match header_digest {
            Some(digest) => digest,
            None => format!("sha256:{}", hex::encode(Sha256::digest(&body))),
        };
        if !is_valid_digest(&digest) {
            return Err(RegistryError::InvalidResponse {
                url,
                reason: format!("invalid manifest digest '{}'", digest),
            });
        }

        Ok(ManifestAndDigest { manifest, digest })
    }

    /// Answer the synthesized challenge by fetching a pull token
    fn authenticate_pull(&self) -> Result<(), RegistryError> {
        let registry = &self.options.registry;
        let url = format!("{}://{}/v2/auth", self.scheme(), registry);
        let scope = format!(
            "repository:{}/{}:pull",
            self.options.owner, self.options.repository
        );
        debug!("Authenticating with challenge {}", self.pull_challenge());

        let mut request = self
            .agent
            .get(&url)
            .query("service", registry)
            .query("scope", &scope);
        if let Some(cred) = &self.credential {
            request = request.header("Authorization", cred.basic_auth_header());
        }

        let what = format!("token for {}", scope);
        let mut response = request.call().map_err(|e| match e {
            ureq::Error::StatusCode(401 | 403) => RegistryError::Unauthorized { what: what.clone() },
            other => classify(other, &what, &url),
        })?;
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| classify(e, &what, &url))?;

        let parsed: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| RegistryError::InvalidResponse {
                url: url.clone(),
                reason: format!("malformed token response: {}", e),
            })?;
        let token = parsed
            .token
            .or(parsed.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RegistryError::InvalidResponse {
                url,
                reason: "token response carried no token".to_string(),
            })?;

        *self.authorization.lock().unwrap_or_else(|e| e.into_inner()) =
            Authorization::Bearer(token);
        Ok(())
    }
}

impl RegistryApi for RegistryClient {
    fn name(&self) -> &str {
        &self.options.registry
    }

    fn pull_manifest(&self, tag: &str) -> Result<ManifestAndDigest, RegistryError> {
        match self.fetch_manifest(tag) {
            Err(RegistryError::Unauthorized { .. }) => {
                debug!("Manifest pull for {} unauthorized, retrying with token", tag);
                self.authenticate_pull()?;
                self.fetch_manifest(tag)
            }
            other => other,
        }
    }

    fn pull_blob(&self, digest: &str, sink: &mut dyn Write) -> Result<u64, RegistryError> {
        let url = format!("{}/blobs/{}", self.repository_url(), digest);
        let what = format!("blob {}", digest);

        let mut request = self.agent.get(&url);
        if let Some(auth) = self.current_authorization() {
            request = request.header("Authorization", auth);
        }

        let response = request.call().map_err(|e| classify(e, &what, &url))?;
        let mut reader = response.into_body().into_reader();
        let written =
            std::io::copy(&mut reader, sink).map_err(|source| RegistryError::BlobWrite {
                digest: digest.to_string(),
                source,
            })?;

        info!("Pulled blob {} ({} bytes)", digest, written);
        Ok(written)
    }
}

fn header_value(response: &ureq::http::Response<ureq::Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Map a ureq error onto the closed registry error set
fn classify(err: ureq::Error, what: &str, url: &str) -> RegistryError {
    match err {
        ureq::Error::StatusCode(404) => RegistryError::NotFound {
            what: what.to_string(),
        },
        ureq::Error::StatusCode(401) => RegistryError::Unauthorized {
            what: what.to_string(),
        },
        ureq::Error::StatusCode(status) => RegistryError::Status {
            status,
            url: url.to_string(),
        },
        source => RegistryError::Transport {
            url: url.to_string(),
            source,
        },
    }
}
