//! Credential records and the request/response shapes built from them.

use crate::error::{VaultError, VaultResult};
use crate::vault::ledger::UsageLedger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use zeroize::Zeroize;

/// Opaque record identifier.
pub type KeyId = String;

/// Generate a fresh record identifier.
pub fn new_key_id() -> KeyId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// One managed credential. Only ever holds ciphertext.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub(crate) id: KeyId,
    pub(crate) seq: u64,
    pub(crate) service_name: String,
    pub(crate) ciphertext: String,
    pub(crate) description: String,
    pub(crate) allow_list: BTreeSet<String>,
    pub(crate) rate_limit: u32,
    pub(crate) active: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
    pub(crate) rotated_at: Option<DateTime<Utc>>,
    pub(crate) last_used_at: Option<DateTime<Utc>>,
    pub(crate) total_calls: u64,
    pub(crate) rate_limit_hits: u64,
    pub(crate) ledger: UsageLedger,
}

impl CredentialRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Insertion order within the store.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Empty allow-list admits everyone.
    pub fn permits(&self, caller: &str) -> bool {
        self.allow_list.is_empty() || self.allow_list.contains(caller)
    }

    pub fn summary(&self) -> KeySummary {
        KeySummary {
            key_id: self.id.clone(),
            service_name: self.service_name.clone(),
            description: self.description.clone(),
            allowed_contracts: self.allow_list.iter().cloned().collect(),
            rate_limit: self.rate_limit,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            rotated_at: self.rotated_at,
            last_used_at: self.last_used_at,
            total_calls: self.total_calls,
        }
    }

    pub fn usage_stats(&self, now: DateTime<Utc>) -> UsageStats {
        UsageStats {
            key_id: self.id.clone(),
            total_calls: self.total_calls,
            calls_last_hour: self.ledger.calls_in_window(now),
            rate_limit_hits: self.rate_limit_hits,
            rate_limit: self.rate_limit,
            last_used_at: self.last_used_at,
            active: self.active,
        }
    }
}

/// Key metadata as shown to administrators. Never carries key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySummary {
    pub key_id: KeyId,
    pub service_name: String,
    pub description: String,
    pub allowed_contracts: Vec<String>,
    pub rate_limit: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub total_calls: u64,
}

/// Usage counters for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub key_id: KeyId,
    pub total_calls: u64,
    pub calls_last_hour: usize,
    pub rate_limit_hits: u64,
    pub rate_limit: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Request to store a new credential.
#[derive(Clone, Deserialize)]
pub struct NewKey {
    pub service_name: String,
    pub api_key: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub allowed_contracts: Vec<String>,
    /// Calls per rolling hour; the vault default applies when absent.
    #[serde(default)]
    pub rate_limit: Option<i64>,
}

impl NewKey {
    pub fn new(service_name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            api_key: api_key.into(),
            description: None,
            allowed_contracts: Vec::new(),
            rate_limit: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn allow<I, S>(mut self, callers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_contracts = callers.into_iter().map(Into::into).collect();
        self
    }

    pub fn rate_limit(mut self, rate_limit: i64) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }
}

impl Drop for NewKey {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl std::fmt::Debug for NewKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewKey")
            .field("service_name", &self.service_name)
            .field("api_key", &"<redacted>")
            .field("allowed_contracts", &self.allowed_contracts)
            .field("rate_limit", &self.rate_limit)
            .finish_non_exhaustive()
    }
}

/// Partial update of a key's mutable fields.
///
/// The service name and the credential itself are not settable here;
/// unknown fields are refused rather than dropped. Use rotation to
/// replace the credential.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyUpdate {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub rate_limit: Option<i64>,
    #[serde(default)]
    pub allowed_contracts: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A released credential. The plaintext is wiped when this is dropped.
#[derive(Serialize)]
pub struct CredentialGrant {
    pub api_key: String,
    pub service_name: String,
    pub rate_limit: u32,
    pub calls_remaining: u32,
}

impl Drop for CredentialGrant {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl std::fmt::Debug for CredentialGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGrant")
            .field("api_key", &"<redacted>")
            .field("service_name", &self.service_name)
            .field("rate_limit", &self.rate_limit)
            .field("calls_remaining", &self.calls_remaining)
            .finish()
    }
}

pub(crate) fn validate_service_name(service_name: &str) -> VaultResult<()> {
    if service_name.trim().is_empty() {
        return Err(VaultError::validation("service_name must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_rate_limit(rate_limit: i64) -> VaultResult<u32> {
    if rate_limit <= 0 {
        return Err(VaultError::validation("rate_limit must be positive"));
    }
    u32::try_from(rate_limit).map_err(|_| VaultError::validation("rate_limit is too large"))
}

pub(crate) fn validate_allow_list(callers: &[String]) -> VaultResult<BTreeSet<String>> {
    callers
        .iter()
        .map(|caller| {
            let caller = caller.trim();
            if caller.is_empty() {
                Err(VaultError::validation("allowed_contracts entries must not be empty"))
            } else {
                Ok(caller.to_owned())
            }
        })
        .collect()
}
