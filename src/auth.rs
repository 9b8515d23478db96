// src/auth.rs
//! Credential gate: bearer-token extraction, live-key prefix check and a
//! pluggable registry of issued keys (lookup, expiry, revocation).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config::{AuthConfig, IssuedKeyConfig, RegistryMode};
use crate::model::AccountId;

/// Wire message for a missing credential.
pub const MSG_KEY_REQUIRED: &str = "API key required";
/// Wire message for every other rejection.
pub const MSG_KEY_INVALID: &str = "Invalid API key";

/// Why a credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CredentialRejection {
    #[error("no credential presented")]
    MissingCredential,
    #[error("credential does not carry the live-key prefix")]
    MalformedCredential,
    #[error("credential is not an issued key")]
    UnknownCredential,
    #[error("credential has expired")]
    ExpiredCredential,
    #[error("credential has been revoked")]
    RevokedCredential,
}

impl CredentialRejection {
    /// Message returned to the caller. Only "missing" is distinguishable.
    pub fn public_message(self) -> &'static str {
        match self {
            CredentialRejection::MissingCredential => MSG_KEY_REQUIRED,
            _ => MSG_KEY_INVALID,
        }
    }

    /// Stable label for metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            CredentialRejection::MissingCredential => "missing_credential",
            CredentialRejection::MalformedCredential => "malformed_credential",
            CredentialRejection::UnknownCredential => "unknown_credential",
            CredentialRejection::ExpiredCredential => "expired_credential",
            CredentialRejection::RevokedCredential => "revoked_credential",
        }
    }
}

/// An authorized caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account: AccountId,
    /// Short SHA-256 fingerprint of the key, safe to log.
    pub key_fingerprint: String,
}

/// Registry verdict for a well-formed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    Active(AccountId),
    Unknown,
    Expired,
    Revoked,
}

/// Lookup of issued keys. Real deployments back this with their account database.
#[async_trait::async_trait]
pub trait KeyRegistry: Send + Sync {
    async fn status(&self, key: &str, now: DateTime<Utc>) -> KeyStatus;
    fn name(&self) -> &'static str;
}

/// Demo registry: every correctly prefixed key is active and is its own account.
#[derive(Debug, Clone, Default)]
pub struct PrefixOnlyRegistry;

#[async_trait::async_trait]
impl KeyRegistry for PrefixOnlyRegistry {
    async fn status(&self, key: &str, _now: DateTime<Utc>) -> KeyStatus {
        KeyStatus::Active(AccountId::new(format!("key-{}", key_fingerprint(key))))
    }

    fn name(&self) -> &'static str {
        "prefix-only"
    }
}

#[derive(Debug, Clone)]
struct KeyRecord {
    account: AccountId,
    expires_at: Option<DateTime<Utc>>,
    revoked: bool,
}

/// Registry built from configuration. Keys are indexed by SHA-256 hex digest,
/// so raw keys never need to live in memory after startup.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyRegistry {
    records: HashMap<String, KeyRecord>,
}

impl StaticKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(keys: &[IssuedKeyConfig], revoked: &[String]) -> Self {
        let mut reg = Self::new();
        for k in keys {
            let digest = match (&k.key_sha256, &k.key) {
                (Some(hex), _) => hex.trim().to_ascii_lowercase(),
                (None, Some(raw)) => sha256_hex(raw),
                (None, None) => continue,
            };
            reg.records.insert(
                digest,
                KeyRecord {
                    account: AccountId::new(k.account.clone()),
                    expires_at: k.expires_at,
                    revoked: k.revoked,
                },
            );
        }
        for hex in revoked {
            reg.revoke_digest(hex);
        }
        reg
    }

    /// Register a raw key for `account`.
    pub fn issue(
        mut self,
        key: &str,
        account: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.records.insert(
            sha256_hex(key),
            KeyRecord {
                account: AccountId::new(account),
                expires_at,
                revoked: false,
            },
        );
        self
    }

    pub fn revoke(mut self, key: &str) -> Self {
        self.revoke_digest(&sha256_hex(key));
        self
    }

    fn revoke_digest(&mut self, hex: &str) {
        if let Some(rec) = self.records.get_mut(&hex.trim().to_ascii_lowercase()) {
            rec.revoked = true;
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl KeyRegistry for StaticKeyRegistry {
    async fn status(&self, key: &str, now: DateTime<Utc>) -> KeyStatus {
        match self.records.get(&sha256_hex(key)) {
            None => KeyStatus::Unknown,
            Some(rec) if rec.revoked => KeyStatus::Revoked,
            Some(rec) if rec.expires_at.is_some_and(|exp| exp <= now) => KeyStatus::Expired,
            Some(rec) => KeyStatus::Active(rec.account.clone()),
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Authorize-or-reject in front of every ingestion route.
#[derive(Clone)]
pub struct CredentialGate {
    live_prefix: String,
    registry: Arc<dyn KeyRegistry>,
}

impl fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialGate")
            .field("live_prefix", &self.live_prefix)
            .field("registry", &self.registry.name())
            .finish()
    }
}

impl CredentialGate {
    pub fn new(live_prefix: impl Into<String>, registry: Arc<dyn KeyRegistry>) -> Self {
        Self {
            live_prefix: live_prefix.into(),
            registry,
        }
    }

    pub fn from_config(cfg: &AuthConfig) -> Self {
        let registry: Arc<dyn KeyRegistry> = match cfg.registry {
            RegistryMode::PrefixOnly => Arc::new(PrefixOnlyRegistry),
            RegistryMode::Static => {
                Arc::new(StaticKeyRegistry::from_config(&cfg.keys, &cfg.revoked))
            }
        };
        Self::new(cfg.live_key_prefix.clone(), registry)
    }

    pub fn live_prefix(&self) -> &str {
        &self.live_prefix
    }

    /// Check the raw `Authorization` header value.
    pub async fn authorize(
        &self,
        header: Option<&str>,
    ) -> Result<Principal, CredentialRejection> {
        self.authorize_at(header, Utc::now()).await
    }

    pub async fn authorize_at(
        &self,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Principal, CredentialRejection> {
        let token = header
            .and_then(bearer_token)
            .ok_or(CredentialRejection::MissingCredential)?;

        if !token.starts_with(&self.live_prefix) {
            return Err(CredentialRejection::MalformedCredential);
        }

        let key_fingerprint = key_fingerprint(token);
        match self.registry.status(token, now).await {
            KeyStatus::Active(account) => Ok(Principal {
                account,
                key_fingerprint,
            }),
            KeyStatus::Unknown => Err(CredentialRejection::UnknownCredential),
            KeyStatus::Expired => Err(CredentialRejection::ExpiredCredential),
            KeyStatus::Revoked => Err(CredentialRejection::RevokedCredential),
        }
    }
}

/// Strip an optional `Bearer ` scheme. `None` when no token remains.
pub fn bearer_token(header: &str) -> Option<&str> {
    let h = header.trim();
    let token = match h.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => h[7..].trim_start(),
        _ if h.eq_ignore_ascii_case("bearer") => "",
        _ => h,
    };
    (!token.is_empty()).then_some(token)
}

/// First 12 hex chars of SHA-256(key). Never log raw keys.
pub fn key_fingerprint(key: &str) -> String {
    let mut full = sha256_hex(key);
    full.truncate(12);
    full
}

pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
