//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::ArtcacheResult;
use console::style;

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> ArtcacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => {
            println!("{}", toml::to_string_pretty(&redacted(config))?);
        }
        Some(ConfigAction::Path) => {
            println!("{}", manager.path().display());
        }
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }

    Ok(())
}

fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if shown.registry.token.is_some() {
        shown.registry.token = Some("<redacted>".to_string());
    }
    shown
}

async fn init_config(manager: &ConfigManager, force: bool) -> ArtcacheResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        eprintln!(
            "{} Config already exists at {}",
            style("!").yellow().bold(),
            path.display()
        );
        eprintln!("  {}", style("Use --force to overwrite").dim());
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    println!(
        "{} Configuration initialized {}",
        style("✓").green().bold(),
        style(path.display()).dim()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn show_hides_token() {
        let mut config = Config::default();
        config.registry.token = Some("dXNlcjpwYXNz".to_string());
        let shown = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(!shown.contains("dXNlcjpwYXNz"));
        assert!(shown.contains("<redacted>"));
    }

    #[tokio::test]
    async fn init_writes_defaults_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path.clone());

        init_config(&manager, false).await.unwrap();
        assert!(path.exists());

        std::fs::write(&path, "[registry]\nowner = \"kept\"\n").unwrap();
        init_config(&manager, false).await.unwrap();
        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.registry.owner.as_deref(), Some("kept"));

        init_config(&manager, true).await.unwrap();
        let loaded = manager.load().await.unwrap();
        assert!(loaded.registry.owner.is_none());
    }
}
