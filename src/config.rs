// src/config.rs
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::{DEFAULT_MAX_ACCOUNTS, DEFAULT_MAX_PER_ACCOUNT};
use crate::validate::SubmissionLimits;

pub const DEFAULT_CONFIG_PATH: &str = "config/nps.toml";
pub const DEFAULT_LIVE_KEY_PREFIX: &str = "sk_";

pub const ENV_CONFIG_PATH: &str = "NPS_CONFIG_PATH";
pub const ENV_LIVE_KEY_PREFIX: &str = "NPS_LIVE_KEY_PREFIX";
pub const ENV_METRICS: &str = "NPS_METRICS";

/// Whole service configuration. Built once at startup and shared read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub auth: AuthConfig,
    pub submission: SubmissionLimits,
    pub store: StoreConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryMode {
    /// Any key carrying the live prefix is accepted; each key is its own account.
    #[default]
    PrefixOnly,
    /// Only keys listed under `[[auth.keys]]` are accepted.
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub live_key_prefix: String,
    pub registry: RegistryMode,
    pub keys: Vec<IssuedKeyConfig>,
    /// SHA-256 hex digests of revoked keys.
    pub revoked: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            live_key_prefix: DEFAULT_LIVE_KEY_PREFIX.to_string(),
            registry: RegistryMode::default(),
            keys: Vec::new(),
            revoked: Vec::new(),
        }
    }
}

/// One issued key. Either the raw `key` (dev setups) or its `key_sha256`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedKeyConfig {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub key_sha256: Option<String>,
    pub account: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Per-account retention; oldest responses are dropped first.
    pub max_per_account: usize,
    /// Accounts kept at once; the least recently written one is evicted.
    pub max_accounts: usize,
    /// Upper bound for `GET /api/nps-responses`.
    pub list_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_per_account: DEFAULT_MAX_PER_ACCOUNT,
            max_accounts: DEFAULT_MAX_ACCOUNTS,
            list_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub max_body_bytes: usize,
    /// Directory with the embeddable widget script, served under `/assets`.
    pub asset_dir: Option<PathBuf>,
    pub metrics_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 64 * 1024,
            asset_dir: None,
            metrics_enabled: false,
        }
    }
}

impl ServiceConfig {
    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading service config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing service config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: ServiceConfig = toml::from_str(s)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $NPS_CONFIG_PATH
    /// 2) config/nps.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.check()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(prefix) = std::env::var(ENV_LIVE_KEY_PREFIX) {
            let prefix = prefix.trim();
            if !prefix.is_empty() {
                self.auth.live_key_prefix = prefix.to_string();
            }
        }
        if let Some(on) = parse_bool_env(std::env::var(ENV_METRICS).ok()) {
            self.http.metrics_enabled = on;
        }
    }

    fn check(&self) -> Result<()> {
        if self.auth.live_key_prefix.is_empty() {
            return Err(anyhow!("auth.live_key_prefix must not be empty"));
        }
        for k in &self.auth.keys {
            if k.key.is_none() && k.key_sha256.is_none() {
                return Err(anyhow!(
                    "issued key for account '{}' needs `key` or `key_sha256`",
                    k.account
                ));
            }
        }
        if self.store.list_limit == 0
            || self.store.max_per_account == 0
            || self.store.max_accounts == 0
        {
            return Err(anyhow!("store limits must be positive"));
        }
        Ok(())
    }
}

fn parse_bool_env(raw: Option<String>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
