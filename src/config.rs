#![forbid(unsafe_code)]

//! Runtime settings for the sync binaries.
//!
//! Values come from the process environment first, then from a `.env` file,
//! with explicit CLI overrides winning over both.

use crate::error::{Result, SyncError};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_EPHEMERAL_DAYS: u64 = 60;
const HISTORY_DIR: &str = ".tubesync";
const HISTORY_DB_FILE: &str = "history.db";

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub downloads_root: PathBuf,
    pub subscriptions_path: PathBuf,
    pub history_db: PathBuf,
    pub library_root: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub cookies_path: Option<PathBuf>,
    pub ephemeral_days: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub downloads_root: Option<PathBuf>,
    pub subscriptions_path: Option<PathBuf>,
    pub history_db: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    build_settings_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeSettings> {
    build_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeSettings> {
    let downloads_root = overrides
        .downloads_root
        .or_else(|| lookup_value("DOWNLOADS_ROOT", file_vars, &env_lookup).map(PathBuf::from))
        .ok_or(SyncError::StartupConfigMissing {
            key: "DOWNLOADS_ROOT",
        })?;
    let subscriptions_path = overrides
        .subscriptions_path
        .or_else(|| lookup_value("SUBSCRIPTIONS_PATH", file_vars, &env_lookup).map(PathBuf::from))
        .ok_or(SyncError::StartupConfigMissing {
            key: "SUBSCRIPTIONS_PATH",
        })?;
    let history_db = overrides
        .history_db
        .or_else(|| lookup_value("HISTORY_DB", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| downloads_root.join(HISTORY_DIR).join(HISTORY_DB_FILE));
    let library_root = lookup_value("LIBRARY_ROOT", file_vars, &env_lookup)
        .map(PathBuf::from)
        .unwrap_or_else(|| downloads_root.clone());
    let log_dir = lookup_value("LOG_DIR", file_vars, &env_lookup).map(PathBuf::from);
    let cookies_path = lookup_value("COOKIES_PATH", file_vars, &env_lookup).map(PathBuf::from);
    let ephemeral_days = lookup_value("EPHEMERAL_DAYS", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_EPHEMERAL_DAYS);

    Ok(RuntimeSettings {
        downloads_root,
        subscriptions_path,
        history_db,
        library_root,
        log_dir,
        cookies_path,
        ephemeral_days,
    })
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

/// Parses `KEY=value` lines, tolerating `export`, quotes and comments. A
/// missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content = fs::read_to_string(path)?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
