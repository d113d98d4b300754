//! Config file loading and merging with CLI overrides.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use manga_sync_core::{PageQuality, RefreshPolicy, SyncConfig};

use crate::cli::SyncOverrides;

/// Database file used when neither the config file nor `--db` names one.
pub(crate) const DEFAULT_DB_FILE: &str = "manga-sync.db";

/// TOML-backed defaults; every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) db_path: Option<PathBuf>,
    pub(crate) base_url: Option<String>,
    pub(crate) batch_size: Option<u32>,
    pub(crate) item_concurrency: Option<usize>,
    pub(crate) batch_delay_ms: Option<u64>,
    pub(crate) max_page_retries: Option<u32>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) connect_timeout_secs: Option<u64>,
    pub(crate) request_timeout_secs: Option<u64>,
    pub(crate) rate_limit_fallback_secs: Option<u64>,
    pub(crate) page_quality: Option<PageQuality>,
    pub(crate) refresh_policy: Option<RefreshPolicy>,
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub(crate) struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub(crate) path: Option<PathBuf>,
    /// Parsed file config when the file exists.
    pub(crate) config: Option<FileConfig>,
}

/// Everything the binary needs to build the pipeline.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSettings {
    pub(crate) sync: SyncConfig,
    pub(crate) db_path: PathBuf,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/manga-sync/config.toml`
/// 2. `$HOME/.config/manga-sync/config.toml`
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(env_var_non_empty_os("XDG_CONFIG_HOME"), env_var_non_empty_os("HOME"))
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let base = match xdg_config_home {
        Some(xdg) => PathBuf::from(xdg),
        None => PathBuf::from(home?).join(".config"),
    };
    Some(base.join("manga-sync").join("config.toml"))
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub(crate) fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path) if path.exists() => Some(load_file_config(path)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    Ok(toml::from_str(raw)?)
}

/// Layers defaults, then the file, then CLI flags, and validates the result.
pub(crate) fn resolve_settings(
    file: Option<&FileConfig>,
    overrides: &SyncOverrides,
) -> Result<ResolvedSettings> {
    let mut sync = SyncConfig::default();
    let mut db_path = PathBuf::from(DEFAULT_DB_FILE);

    if let Some(file) = file {
        apply_file(&mut sync, &mut db_path, file);
    }

    if let Some(path) = &overrides.db_path {
        db_path.clone_from(path);
    }
    if let Some(base_url) = &overrides.base_url {
        sync.base_url.clone_from(base_url);
    }
    if let Some(batch_size) = overrides.batch_size {
        sync.batch_size = batch_size;
    }
    if let Some(concurrency) = overrides.concurrency {
        sync.item_concurrency = usize::from(concurrency);
    }
    if let Some(ms) = overrides.batch_delay_ms {
        sync.batch_delay = Duration::from_millis(ms);
    }
    if let Some(retries) = overrides.max_retries {
        sync.max_retries = retries;
    }
    if let Some(quality) = overrides.quality {
        sync.page_quality = quality;
    }
    if let Some(policy) = overrides.refresh_policy {
        sync.refresh_policy = policy;
    }

    sync.validate()?;
    Ok(ResolvedSettings { sync, db_path })
}

fn apply_file(sync: &mut SyncConfig, db_path: &mut PathBuf, file: &FileConfig) {
    if let Some(path) = &file.db_path {
        db_path.clone_from(path);
    }
    if let Some(base_url) = &file.base_url {
        sync.base_url.clone_from(base_url);
    }
    if let Some(value) = file.batch_size {
        sync.batch_size = value;
    }
    if let Some(value) = file.item_concurrency {
        sync.item_concurrency = value;
    }
    if let Some(ms) = file.batch_delay_ms {
        sync.batch_delay = Duration::from_millis(ms);
    }
    if let Some(value) = file.max_page_retries {
        sync.max_page_retries = value;
    }
    if let Some(value) = file.max_retries {
        sync.max_retries = value;
    }
    if let Some(secs) = file.connect_timeout_secs {
        sync.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.request_timeout_secs {
        sync.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.rate_limit_fallback_secs {
        sync.rate_limit_fallback = Duration::from_secs(secs);
    }
    if let Some(quality) = file.page_quality {
        sync.page_quality = quality;
    }
    if let Some(policy) = file.refresh_policy {
        sync.refresh_policy = policy;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_prefers_xdg() {
        let path = config_path_from(Some("/xdg".into()), Some("/home/u".into())).unwrap();
        assert_eq!(path, PathBuf::from("/xdg/manga-sync/config.toml"));
    }

    #[test]
    fn test_config_path_falls_back_to_home() {
        let path = config_path_from(None, Some("/home/u".into())).unwrap();
        assert_eq!(path, PathBuf::from("/home/u/.config/manga-sync/config.toml"));
        assert!(config_path_from(None, None).is_none());
    }

    #[test]
    fn test_parse_config_str_reads_known_keys() {
        let cfg = parse_config_str(
            r#"
            db_path = "/var/lib/manga.db"
            batch_size = 10
            batch_delay_ms = 250
            page_quality = "data"
            refresh_policy = "missing-only"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.db_path, Some(PathBuf::from("/var/lib/manga.db")));
        assert_eq!(cfg.batch_size, Some(10));
        assert_eq!(cfg.batch_delay_ms, Some(250));
        assert_eq!(cfg.page_quality, Some(PageQuality::Data));
        assert_eq!(cfg.refresh_policy, Some(RefreshPolicy::MissingOnly));
        assert!(cfg.base_url.is_none());
    }

    #[test]
    fn test_parse_config_str_rejects_unknown_key() {
        assert!(parse_config_str("concurency = 3").is_err());
    }

    #[test]
    fn test_parse_config_str_empty_is_default() {
        assert_eq!(parse_config_str("").unwrap(), FileConfig::default());
    }

    #[test]
    fn test_resolve_settings_without_file_uses_defaults() {
        let resolved = resolve_settings(None, &SyncOverrides::default()).unwrap();
        assert_eq!(resolved.sync, SyncConfig::default());
        assert_eq!(resolved.db_path, PathBuf::from(DEFAULT_DB_FILE));
    }

    #[test]
    fn test_cli_overrides_win_over_file() {
        let file = FileConfig {
            batch_size: Some(10),
            item_concurrency: Some(2),
            db_path: Some(PathBuf::from("file.db")),
            ..FileConfig::default()
        };
        let overrides = SyncOverrides {
            batch_size: Some(50),
            db_path: Some(PathBuf::from("cli.db")),
            ..SyncOverrides::default()
        };

        let resolved = resolve_settings(Some(&file), &overrides).unwrap();

        assert_eq!(resolved.sync.batch_size, 50);
        assert_eq!(resolved.sync.item_concurrency, 2);
        assert_eq!(resolved.db_path, PathBuf::from("cli.db"));
    }

    #[test]
    fn test_invalid_file_value_fails_validation() {
        let file = FileConfig {
            item_concurrency: Some(0),
            ..FileConfig::default()
        };
        let err = resolve_settings(Some(&file), &SyncOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("item_concurrency"));
    }
}
