//! Register mapping inspection

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use lader_core::mapping::load_mapping_file;
use lader_core::{Register, RegisterStore};

use crate::config::Config;

#[derive(Subcommand)]
pub enum RegistersCommands {
    /// Show the active register mapping
    Show {
        /// Mapping file to show instead of the configured one
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a mapping file without running anything
    Validate {
        /// Mapping file (JSON)
        path: PathBuf,
    },
}

pub async fn run(cmd: RegistersCommands, config: &Config) -> Result<()> {
    match cmd {
        RegistersCommands::Show { mapping, json } => show(mapping, json, config),
        RegistersCommands::Validate { path } => validate(&path),
    }
}

fn show(mapping: Option<PathBuf>, json: bool, config: &Config) -> Result<()> {
    let store = match mapping {
        Some(path) => load_store(&path)?,
        None => config.register_store()?,
    };
    let registers = store.registers();

    if json {
        println!("{}", serde_json::to_string_pretty(&registers)?);
        return Ok(());
    }

    println!("Register Mapping ({} registers)", registers.len());
    println!("===============================\n");
    println!(
        "{:>7}  {:<20} {:<8} {:>4} {:>8} {:>8}  DESCRIPTION",
        "ADDR", "NAME", "TYPE", "SIZE", "SCALE", "OFFSET"
    );
    for register in &registers {
        println!("{}", format_row(register));
    }
    Ok(())
}

fn format_row(r: &Register) -> String {
    format!(
        "{:>7}  {:<20} {:<8} {:>4} {:>8} {:>8}  {}",
        r.address,
        r.name,
        r.kind.to_string(),
        r.size,
        r.scale,
        r.offset,
        r.description
    )
}

fn validate(path: &Path) -> Result<()> {
    let store = load_store(path)?;
    println!("{}: {} registers, mapping is valid", path.display(), store.len());
    Ok(())
}

fn load_store(path: &Path) -> Result<RegisterStore> {
    let defs = load_mapping_file(path)
        .with_context(|| format!("Failed to read mapping file {}", path.display()))?;
    RegisterStore::from_mapping(&defs)
        .with_context(|| format!("Invalid mapping in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_accepts_good_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "total_energy", "register": 108, "type": "holding", "size": 2, "conversion": 0.01}}]"#
        )
        .unwrap();

        assert!(validate(file.path()).is_ok());
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "total_energy", "register": 108, "type": "holding", "size": 2}},
                {{"name": "overlap", "register": 109, "type": "holding"}}
            ]"#
        )
        .unwrap();

        let err = validate(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("109"));
    }

    #[test]
    fn test_format_row() {
        let store = RegisterStore::with_default_mapping().unwrap();
        let row = format_row(&store.get(103).unwrap());
        assert!(row.contains("total_power"));
        assert!(row.contains("holding"));
    }
}
