//! CLI command implementations

pub mod config;
pub mod get;
pub mod key;

pub use config::execute as config;
pub use get::execute as get;
pub use key::execute as key;
