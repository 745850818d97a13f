//! Per-digest single-flight gates
//!
//! The first caller to `acquire` a key becomes its owner and receives a
//! [`FlightGuard`]; every later caller receives a [`FlightWaiter`] until the
//! guard is dropped. Dropping the guard unregisters the key first and then
//! wakes the waiters, on success, error and unwind alike.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

type Gates = Arc<Mutex<HashMap<String, watch::Receiver<()>>>>;

fn lock(gates: &Gates) -> MutexGuard<'_, HashMap<String, watch::Receiver<()>>> {
    gates.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of in-flight fetches keyed by digest
#[derive(Debug, Default, Clone)]
pub struct SingleFlight {
    gates: Gates,
}

/// Outcome of [`SingleFlight::acquire`]
#[derive(Debug)]
pub enum Flight {
    /// This caller performs the fetch
    Owner(FlightGuard),
    /// Another caller is already fetching
    Waiter(FlightWaiter),
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gate for `key`, or join the one already registered
    pub fn acquire(&self, key: &str) -> Flight {
        let mut gates = lock(&self.gates);

        if let Some(existing) = gates.get(key) {
            debug!("Fetch for {} already in flight, waiting", key);
            return Flight::Waiter(FlightWaiter {
                key: key.to_string(),
                released: existing.clone(),
            });
        }

        let (release, released) = watch::channel(());
        gates.insert(key.to_string(), released);
        Flight::Owner(FlightGuard {
            key: key.to_string(),
            gates: Arc::clone(&self.gates),
            _release: release,
        })
    }

    /// Number of keys currently being fetched
    pub fn in_flight(&self) -> usize {
        lock(&self.gates).len()
    }
}

/// Ownership of a key's fetch; releases the gate when dropped
#[derive(Debug)]
pub struct FlightGuard {
    key: String,
    gates: Gates,
    // Dropped after `drop` runs, which closes the channel and wakes waiters
    _release: watch::Sender<()>,
}

impl FlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        lock(&self.gates).remove(&self.key);
        debug!("Released fetch gate for {}", self.key);
    }
}

/// Handle for a caller waiting on another caller's fetch
#[derive(Debug)]
pub struct FlightWaiter {
    key: String,
    released: watch::Receiver<()>,
}

impl FlightWaiter {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait until the owner releases the gate.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait(mut self, timeout: Option<Duration>) -> bool {
        // The owner never sends; `changed` resolves once the sender is dropped
        let released = async move {
            let _ = self.released.changed().await;
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, released).await.is_ok(),
            None => {
                released.await;
                true
            }
        }
    }
}
