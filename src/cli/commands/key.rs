//! Key command - print the cache key for a coordinate

use crate::cache::{derive_key, Gav};
use crate::cli::args::KeyArgs;
use crate::config::Config;
use crate::error::ArtcacheResult;

/// Execute the key command
pub async fn execute(args: KeyArgs, config: &Config) -> ArtcacheResult<()> {
    println!("{}", key_for(&args, config)?);
    Ok(())
}

fn key_for(args: &KeyArgs, config: &Config) -> ArtcacheResult<String> {
    let gav: Gav = args.gav.parse()?;
    let namespace = args
        .namespace
        .as_deref()
        .or(config.cache.prepend_tag.as_deref());
    Ok(derive_key(&gav.group, &gav.artifact, &gav.version, namespace))
}
