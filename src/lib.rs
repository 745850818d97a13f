//! artcache - rebuilt Maven artifact cache backed by an OCI registry
//!
//! Rebuilt artifacts are published as OCI images tagged with a hash of
//! their coordinate. This crate pulls those images on demand, extracts the
//! artifact layer into a digest-addressed local cache exactly once, and
//! serves individual files from it.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod rebuilt;
pub mod registry;
pub mod repository;

pub use error::{ArtcacheError, ArtcacheResult};
