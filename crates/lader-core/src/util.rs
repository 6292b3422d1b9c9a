//! Utility functions for Smart Energy Lader
//!
//! Provides environment file loading for the command line tools.

use std::path::{Path, PathBuf};

/// Candidate env file locations, in search order:
/// 1. /usr/local/etc/lader/lader.env
/// 2. User's config directory/lader/lader.env
/// 3. ~/.config/lader/lader.env
pub fn env_file_candidates() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/usr/local/etc/lader/lader.env")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("lader/lader.env"));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/lader/lader.env"));
    }
    paths
}

/// Load environment variables from the first Lader env file found.
/// Variables that are already set are left alone.
///
/// Returns the path that was loaded, if any.
pub fn load_env_file() -> Option<PathBuf> {
    for path in env_file_candidates() {
        if Path::new(&path).exists() {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                parse_env_file(&contents);
            }
            return Some(path);
        }
    }
    None
}

/// Parse env file contents and set environment variables (only if not already set).
/// Supports formats:
/// - `KEY=value`
/// - `export KEY=value`
/// - `KEY="quoted value"`
/// - `KEY='single quoted'`
/// - Comments starting with #
pub fn parse_env_file(contents: &str) {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if std::env::var(key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }
}
