// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration loading and resolution.
//!
//! Resolution order for the config file:
//! 1. explicit path (CLI `--config`)
//! 2. `SIGAA_CONFIG` env
//! 3. `~/.sigaa/config.json` if it exists
//! 4. built-in defaults
//!
//! `SIGAA_*` variables are applied on top of whatever file was loaded.

use crate::error::{Result, SigaaError};
use crate::institution::Institution;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default portal.
pub const DEFAULT_URL: &str = "https://sigaa.ifsc.edu.br";

/// Default page cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default maximum number of cached pages before LRU eviction.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 256;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default limit for `follow_all_redirect`.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

const MOBILE_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) \
                         AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/131.0.0.0 Mobile Safari/537.36";

/// Settings for one SIGAA session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Portal base URL, e.g. `https://sigaa.ifsc.edu.br`.
    pub url: String,
    /// Institution variant. Inferred from the host when absent.
    pub institution: Option<Institution>,
    /// Page cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Page cache capacity.
    pub cache_max_entries: usize,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum hops followed by `follow_all_redirect`.
    pub max_redirects: usize,
    /// User-Agent for regular requests.
    pub user_agent: String,
    /// User-Agent for requests made with the `mobile` option.
    pub mobile_user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            institution: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DESKTOP_UA.to_string(),
            mobile_user_agent: MOBILE_UA.to_string(),
        }
    }
}

impl SessionConfig {
    /// Defaults pointed at `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the institution explicitly.
    pub fn institution(mut self, institution: Institution) -> Self {
        self.institution = Some(institution);
        self
    }

    /// Set the page cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| SigaaError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| SigaaError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Resolve the config file (see module docs) and apply env overrides.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(explicit) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SIGAA_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SIGAA_URL") {
            self.url = url;
        }
        if let Some(inst) = lookup("SIGAA_INSTITUTION") {
            self.institution = Some(inst.parse()?);
        }
        if let Some(v) = lookup("SIGAA_CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_number("SIGAA_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("SIGAA_TIMEOUT_MS") {
            self.timeout_ms = parse_number("SIGAA_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SIGAA_MAX_REDIRECTS") {
            self.max_redirects = parse_number("SIGAA_MAX_REDIRECTS", &v)?;
        }
        Ok(())
    }

    /// Parsed base URL.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.url).map_err(|e| SigaaError::Config(format!("invalid url {}: {e}", self.url)))
    }

    /// Explicit institution, or the one inferred from the URL host.
    pub fn resolved_institution(&self) -> Result<Institution> {
        if let Some(inst) = self.institution {
            return Ok(inst);
        }
        let url = self.base_url()?;
        Ok(Institution::from_host(url.host_str().unwrap_or_default()))
    }

    pub fn cache_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SigaaError::Config(format!("{key} must be a number, got {value:?}")))
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var("SIGAA_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    let home_config = dirs::home_dir()?.join(".sigaa").join("config.json");
    home_config.exists().then_some(home_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.cache_ttl_duration(), Duration::from_secs(300));
        assert_eq!(config.resolved_institution().unwrap(), Institution::Ifsc);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"url": "https://sigaa.unb.br", "cache_ttl_secs": 5}}"#).unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.url, "https://sigaa.unb.br");
        assert_eq!(config.cache_ttl_secs, 5);
        assert_eq!(config.max_redirects, DEFAULT_MAX_REDIRECTS);
        assert_eq!(config.resolved_institution().unwrap(), Institution::Unb);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            SessionConfig::load(file.path()),
            Err(SigaaError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SIGAA_URL", "https://sigaa.ufpb.br"),
            ("SIGAA_INSTITUTION", "uffs"),
            ("SIGAA_TIMEOUT_MS", "1500"),
        ]
        .into_iter()
        .collect();

        let mut config = SessionConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.url, "https://sigaa.ufpb.br");
        // explicit institution wins over host inference
        assert_eq!(config.resolved_institution().unwrap(), Institution::Uffs);
        assert_eq!(config.timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = SessionConfig::default();
        let err = config
            .apply_overrides(|k| (k == "SIGAA_MAX_REDIRECTS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("SIGAA_MAX_REDIRECTS"));
    }
}
