//! Rebuilt artifact existence oracle
//!
//! The cache only asks the registry about coordinates that might have been
//! rebuilt. Membership is fed by an external event source (a watch on rebuilt
//! artifact resources, a file, a test); this module only keeps the set and
//! fans out deletion notices.

use crate::error::{ArtcacheError, ArtcacheResult};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{info, warn};

const DELETION_CHANNEL_CAPACITY: usize = 256;

/// Answers whether a `group:artifact:version` might have a rebuilt copy
pub trait RebuiltArtifacts: Send + Sync {
    /// Cheap, non-blocking membership test
    fn is_possibly_rebuilt(&self, gav: &str) -> bool;
}

/// A rebuilt artifact as reported by the event source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuiltArtifact {
    pub gav: String,
    /// Digest of the image holding the rebuilt artifact
    pub digest: String,
}

/// Change reported by the event source
#[derive(Debug, Clone)]
pub enum RebuiltEvent {
    Added(RebuiltArtifact),
    Updated {
        old: RebuiltArtifact,
        new: RebuiltArtifact,
    },
    Deleted {
        artifact: RebuiltArtifact,
        /// False when the source lost track of the final state
        final_state_known: bool,
    },
}

/// Notice that a rebuilt image is gone or was replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDeletion {
    pub gav: String,
    pub digest: String,
}

/// In-memory, event-fed set of rebuilt coordinates
pub struct RebuiltArtifactSet {
    gavs: RwLock<HashSet<String>>,
    deletions: broadcast::Sender<ArtifactDeletion>,
}

impl RebuiltArtifactSet {
    pub fn new() -> Self {
        let (deletions, _) = broadcast::channel(DELETION_CHANNEL_CAPACITY);
        Self {
            gavs: RwLock::new(HashSet::new()),
            deletions,
        }
    }

    /// A set that never learns anything, for runs without an event source
    pub fn disabled() -> Self {
        warn!("Rebuilt artifact tracking disabled, no artifacts will be served from the registry");
        Self::new()
    }

    /// Seed the set with known coordinates
    pub fn with_gavs<I, S>(gavs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = Self::new();
        {
            let mut members = set.gavs.write().unwrap_or_else(PoisonError::into_inner);
            members.extend(gavs.into_iter().map(Into::into));
        }
        set
    }

    /// Load coordinates from a file, one `group:artifact:version` per line.
    ///
    /// Blank lines and `#` comments are ignored.
    pub async fn from_gav_file(path: &Path) -> ArtcacheResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ArtcacheError::io(format!("reading rebuilt artifact list {}", path.display()), e)
        })?;

        let set = Self::with_gavs(parse_gav_lines(&content));
        info!("Loaded {} rebuilt artifacts from {}", set.len(), path.display());
        Ok(set)
    }

    /// Apply an event from the source
    pub fn apply(&self, event: RebuiltEvent) {
        match event {
            RebuiltEvent::Added(artifact) => {
                info!("Adding new rebuilt artifact {}", artifact.gav);
                self.write().insert(artifact.gav);
            }
            RebuiltEvent::Updated { old, new } => {
                self.notify(&old);
                info!("Adding updated rebuilt artifact {}", new.gav);
                self.write().insert(new.gav);
            }
            RebuiltEvent::Deleted {
                artifact,
                final_state_known,
            } => {
                self.write().remove(&artifact.gav);
                if final_state_known {
                    self.notify(&artifact);
                }
            }
        }
    }

    /// Subscribe to deletion notices
    pub fn subscribe(&self) -> broadcast::Receiver<ArtifactDeletion> {
        self.deletions.subscribe()
    }

    pub fn len(&self) -> usize {
        self.gavs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<String>> {
        self.gavs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, artifact: &RebuiltArtifact) {
        // No subscribers is not an error
        let _ = self.deletions.send(ArtifactDeletion {
            gav: artifact.gav.clone(),
            digest: artifact.digest.clone(),
        });
    }
}

impl Default for RebuiltArtifactSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RebuiltArtifacts for RebuiltArtifactSet {
    fn is_possibly_rebuilt(&self, gav: &str) -> bool {
        self.gavs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(gav)
    }
}

/// Oracle that lets every coordinate through to the registry
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeRebuilt;

impl RebuiltArtifacts for AssumeRebuilt {
    fn is_possibly_rebuilt(&self, _gav: &str) -> bool {
        true
    }
}

fn parse_gav_lines(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact(gav: &str, digest: &str) -> RebuiltArtifact {
        RebuiltArtifact {
            gav: gav.to_string(),
            digest: digest.to_string(),
        }
    }

    #[test]
    fn add_and_query() {
        let set = RebuiltArtifactSet::new();
        assert!(!set.is_possibly_rebuilt("org.foo:bar:1.0"));

        set.apply(RebuiltEvent::Added(artifact("org.foo:bar:1.0", "sha256:1")));
        assert!(set.is_possibly_rebuilt("org.foo:bar:1.0"));
        assert!(!set.is_possibly_rebuilt("org.foo:bar:2.0"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn delete_notifies_subscribers() {
        let set = RebuiltArtifactSet::with_gavs(["org.foo:bar:1.0"]);
        let mut deletions = set.subscribe();

        set.apply(RebuiltEvent::Deleted {
            artifact: artifact("org.foo:bar:1.0", "sha256:1"),
            final_state_known: true,
        });

        assert!(!set.is_possibly_rebuilt("org.foo:bar:1.0"));
        let notice = deletions.try_recv().unwrap();
        assert_eq!(notice.gav, "org.foo:bar:1.0");
        assert_eq!(notice.digest, "sha256:1");
    }

    #[test]
    fn delete_with_unknown_state_is_silent() {
        let set = RebuiltArtifactSet::with_gavs(["org.foo:bar:1.0"]);
        let mut deletions = set.subscribe();

        set.apply(RebuiltEvent::Deleted {
            artifact: artifact("org.foo:bar:1.0", "sha256:1"),
            final_state_known: false,
        });

        assert!(set.is_empty());
        assert!(deletions.try_recv().is_err());
    }

    #[test]
    fn update_notifies_old_and_keeps_new() {
        let set = RebuiltArtifactSet::new();
        let mut deletions = set.subscribe();

        set.apply(RebuiltEvent::Updated {
            old: artifact("org.foo:bar:1.0", "sha256:old"),
            new: artifact("org.foo:bar:1.0", "sha256:new"),
        });

        assert!(set.is_possibly_rebuilt("org.foo:bar:1.0"));
        assert_eq!(deletions.try_recv().unwrap().digest, "sha256:old");
    }

    #[test]
    fn events_without_subscribers() {
        let set = RebuiltArtifactSet::new();
        set.apply(RebuiltEvent::Deleted {
            artifact: artifact("a:b:c", "sha256:1"),
            final_state_known: true,
        });
        assert!(set.is_empty());
    }

    #[test]
    fn assume_rebuilt_always_true() {
        assert!(AssumeRebuilt.is_possibly_rebuilt("anything:at:all"));
    }

    #[tokio::test]
    async fn load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rebuilt.txt");
        std::fs::write(&path, "# rebuilt\norg.foo:bar:1.0\n\n  org.baz:qux:2.0  \n").unwrap();

        let set = RebuiltArtifactSet::from_gav_file(&path).await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.is_possibly_rebuilt("org.baz:qux:2.0"));
    }

    #[tokio::test]
    async fn load_missing_file_errors() {
        let temp = TempDir::new().unwrap();
        let result = RebuiltArtifactSet::from_gav_file(&temp.path().join("nope")).await;
        assert!(matches!(result, Err(ArtcacheError::Io { .. })));
    }
}
