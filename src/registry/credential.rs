//! Registry credential resolution
//!
//! A token is either base64 of `user:pass` or a docker config document
//! (`{"auths": {"host": {"auth": "<base64 user:pass>"}}}`). Resolution runs
//! once when the client is built; a docker config without a matching host
//! is a configuration error.

use crate::error::{ArtcacheError, ArtcacheResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use tracing::info;

/// Username and password for a registry
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Value for an `Authorization: Basic ...` header
    pub fn basic_auth_header(&self) -> String {
        let pair = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(pair))
    }

    /// Resolve a token into a credential for `registry/owner/repository`.
    ///
    /// Blank or absent tokens mean anonymous access.
    pub fn resolve(
        token: Option<&str>,
        registry: &str,
        owner: &str,
        repository: &str,
    ) -> ArtcacheResult<Option<Self>> {
        let token = match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t,
            None => {
                info!("No credential provided");
                return Ok(None);
            }
        };

        if token.starts_with('{') {
            let full_name = format!("{}/{}/{}", registry, owner, repository);
            let config: DockerConfig = serde_json::from_str(token).map_err(|e| {
                ArtcacheError::CredentialInvalid(format!("malformed docker config: {}", e))
            })?;

            let (host, entry) = config
                .auths
                .iter()
                .find(|(host, _)| full_name.starts_with(host.as_str()))
                .ok_or_else(|| ArtcacheError::CredentialHostNotFound {
                    registry: registry.to_string(),
                    hosts: config.auths.iter().map(|(h, _)| h.clone()).collect(),
                })?;

            let credential = entry.credential(host)?;
            info!(
                "Credential provided as docker config, selected host {} for registry {}",
                host, registry
            );
            return Ok(Some(credential));
        }

        let credential = Self::from_encoded_pair(token)?;
        info!("Credential provided as base64 encoded token");
        Ok(Some(credential))
    }

    /// Decode base64 `user:pass`, splitting on the first colon
    fn from_encoded_pair(encoded: &str) -> ArtcacheResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ArtcacheError::CredentialInvalid(format!("not valid base64: {}", e)))?;
        let decoded = String::from_utf8(bytes)
            .map_err(|_| ArtcacheError::CredentialInvalid("not valid UTF-8".to_string()))?;

        let (username, password) = decoded.split_once(':').ok_or_else(|| {
            ArtcacheError::CredentialInvalid("expected user:pass after decoding".to_string())
        })?;
        Ok(Self::new(username, password))
    }
}

/// The subset of `~/.docker/config.json` needed to pick a credential
#[derive(Debug, Deserialize)]
struct DockerConfig {
    /// Host prefix to auth entry, in document order
    #[serde(default, deserialize_with = "ordered_auths")]
    auths: Vec<(String, DockerAuth)>,
}

#[derive(Debug, Deserialize)]
struct DockerAuth {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl DockerAuth {
    fn credential(&self, host: &str) -> ArtcacheResult<Credential> {
        match (&self.auth, &self.username, &self.password) {
            (Some(auth), _, _) => Credential::from_encoded_pair(auth),
            (None, Some(user), Some(pass)) => Ok(Credential::new(user.as_str(), pass.as_str())),
            _ => Err(ArtcacheError::CredentialInvalid(format!(
                "docker config entry for {} has no auth",
                host
            ))),
        }
    }
}

fn ordered_auths<'de, D>(deserializer: D) -> Result<Vec<(String, DockerAuth)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct AuthsVisitor;

    impl<'de> Visitor<'de> for AuthsVisitor {
        type Value = Vec<(String, DockerAuth)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of registry hosts to auth entries")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, DockerAuth>()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(AuthsVisitor)
}
