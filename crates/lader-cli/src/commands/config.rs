//! Configuration management commands

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::config::Config;

const DEFAULT_CONFIG: &str = include_str!("../../../../lader.toml.example");

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (file + environment)
    Show,
    /// Print where the configuration file is looked for
    Path,
    /// Initialize configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn run(cmd: ConfigCommands, config: &Config) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(config),
        ConfigCommands::Path => path(),
        ConfigCommands::Init { force } => init(Path::new("lader.toml"), force),
    }
}

fn show(config: &Config) -> Result<()> {
    println!("Current Configuration");
    println!("=====================\n");

    match Config::find_config_file() {
        Some(path) => println!("# Config file: {}\n", path.display()),
        None => println!("# No configuration file found. Using defaults.\n"),
    }
    println!("{}", toml::to_string_pretty(config).context("Failed to render configuration")?);
    Ok(())
}

fn path() -> Result<()> {
    match Config::find_config_file() {
        Some(path) => println!("{}", path.display()),
        None => {
            println!("No configuration file found. Searched:");
            println!("  $LADER_CONFIG");
            println!("  ./lader.toml");
            println!("  ~/.config/lader/lader.toml");
        }
    }
    Ok(())
}

fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        println!("Configuration file already exists: {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    std::fs::write(config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Configuration file created: {}", config_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let parsed: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_init_respects_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lader.toml");
        std::fs::write(&path, "# mine\n").unwrap();

        init(&path, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n");

        init(&path, true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
    }
}
