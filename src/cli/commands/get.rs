//! Get command - fetch a rebuilt artifact through the cache

use crate::cache::{ArtifactCoordinate, DirectoryAllocator, Gav, LocalCacheStore};
use crate::cli::args::GetArgs;
use crate::config::{Config, ConfigManager, RebuiltConfig};
use crate::error::{ArtcacheError, ArtcacheResult};
use crate::rebuilt::{AssumeRebuilt, RebuiltArtifact, RebuiltArtifactSet, RebuiltArtifacts, RebuiltEvent};
use crate::registry::{Credential, RegistryClient, RegistryOptions};
use crate::repository::{ArtifactResult, OciRepositoryClient, OciRepositoryOptions, RepositoryClient};
use console::style;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Execute the get command
pub async fn execute(args: GetArgs, config: &Config) -> ArtcacheResult<()> {
    let gav: Gav = args.gav.parse()?;
    let coordinate = gav.with_target(args.target.as_str());

    let client = build_client(config, args.token.as_deref(), args.assume_rebuilt).await?;
    debug!("Resolving {} via {}", coordinate, client.name());

    let Some(result) = client.get_artifact_file(&coordinate).await? else {
        return Err(ArtcacheError::ArtifactNotFound(coordinate.to_string()));
    };

    match args.output {
        Some(path) => write_artifact(result, &path).await,
        None => {
            print_summary(&coordinate, &result);
            Ok(())
        }
    }
}

/// Wire an [`OciRepositoryClient`] from configuration.
///
/// `token` overrides `registry.token`; `assume_rebuilt` bypasses the
/// rebuilt artifact set.
pub async fn build_client(
    config: &Config,
    token: Option<&str>,
    assume_rebuilt: bool,
) -> ArtcacheResult<OciRepositoryClient> {
    let registry = &config.registry;
    let host = required(Some(registry.host.as_str()), "registry.host")?;
    let owner = required(registry.owner.as_deref(), "registry.owner")?;
    let repository = required(registry.repository.as_deref(), "registry.repository")?;

    let token = token.or(registry.token.as_deref());
    let credential = Credential::resolve(token, host, owner, repository)?;

    let registry_client = RegistryClient::new(
        RegistryOptions {
            registry: host.to_string(),
            owner: owner.to_string(),
            repository: repository.to_string(),
            insecure: registry.insecure,
            timeout: Duration::from_secs(registry.timeout_secs),
        },
        credential,
    );

    let rebuilt: Arc<dyn RebuiltArtifacts> = if assume_rebuilt {
        Arc::new(AssumeRebuilt)
    } else {
        Arc::new(load_rebuilt(&config.rebuilt).await?)
    };

    let root = config
        .cache
        .root
        .clone()
        .unwrap_or_else(ConfigManager::default_cache_root);
    let allocator = DirectoryAllocator::new(root)?;
    debug!("Caching extracted layers under {}", allocator.root().display());
    let store = LocalCacheStore::new(Arc::new(allocator));

    Ok(OciRepositoryClient::new(
        Arc::new(registry_client),
        rebuilt,
        store,
        OciRepositoryOptions {
            namespace: config.cache.prepend_tag.clone(),
            wait_timeout: config.cache.wait_timeout_secs.map(Duration::from_secs),
        },
    ))
}

fn required<'a>(value: Option<&'a str>, key: &'static str) -> ArtcacheResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ArtcacheError::RegistryNotConfigured(key))
}

async fn load_rebuilt(config: &RebuiltConfig) -> ArtcacheResult<RebuiltArtifactSet> {
    if !config.is_configured() {
        return Ok(RebuiltArtifactSet::disabled());
    }

    let set = match &config.gav_file {
        Some(path) => RebuiltArtifactSet::from_gav_file(path).await?,
        None => RebuiltArtifactSet::new(),
    };
    for gav in &config.gavs {
        set.apply(RebuiltEvent::Added(RebuiltArtifact {
            gav: gav.clone(),
            digest: String::new(),
        }));
    }
    Ok(set)
}

async fn write_artifact(mut result: ArtifactResult, path: &Path) -> ArtcacheResult<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ArtcacheError::io(format!("creating {}", path.display()), e))?;
    let written = tokio::io::copy(&mut result.stream, &mut file)
        .await
        .map_err(|e| ArtcacheError::io(format!("writing {}", path.display()), e))?;

    println!(
        "{} Wrote {} bytes to {}",
        style("✓").green().bold(),
        written,
        path.display()
    );
    Ok(())
}

fn print_summary(coordinate: &ArtifactCoordinate, result: &ArtifactResult) {
    println!("{}", style(coordinate).bold());
    println!("  size: {}", result.size);
    println!(
        "  sha1: {}",
        result.sha1.as_deref().unwrap_or("(none)")
    );
}
