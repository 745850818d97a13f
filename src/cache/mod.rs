//! Digest-addressed artifact cache
//!
//! Rebuilt artifacts are looked up by a key derived from their coordinate,
//! resolved to a manifest digest by the registry, and extracted on disk
//! under that digest at most once per process.
//!
//! # Entry States
//!
//! | State | On disk | Meaning |
//! |-------|---------|---------|
//! | Miss | nothing | Never fetched |
//! | Partial | digest dir, no `artifacts/` | Fetch failed or crashed; refetched by the next owner |
//! | Complete | `artifacts/` present | Immutable, read without locking |

pub mod extract;
pub mod flight;
pub mod key;
pub mod store;

pub use extract::{extract, ExtractSummary};
pub use flight::{Flight, FlightGuard, FlightWaiter, SingleFlight};
pub use key::{derive_key, ArtifactCoordinate, Gav};
pub use store::{DirectoryAllocator, EntryState, LocalCacheStore, Staging, StorageAllocator};
