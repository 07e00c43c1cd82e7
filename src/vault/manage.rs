//! Administrative key lifecycle: create, list, update, rotate, delete, stats.

use super::record::{
    new_key_id, validate_allow_list, validate_rate_limit, validate_service_name,
    CredentialRecord, KeyId, KeySummary, KeyUpdate, NewKey, UsageStats,
};
use super::{KeyStore, RotationPolicy, Vault};
use crate::error::{VaultError, VaultResult};
use crate::vault::ledger::UsageLedger;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

/// Key counts for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VaultHealth {
    pub total_keys: usize,
    pub active_keys: usize,
}

impl<S: KeyStore> Vault<S> {
    /// Encrypt and store a new credential. Returns its id.
    pub fn create_key(&self, request: NewKey) -> VaultResult<KeyId> {
        validate_service_name(&request.service_name)?;
        if request.api_key.is_empty() {
            return Err(VaultError::validation("api_key must not be empty"));
        }
        let rate_limit = match request.rate_limit {
            Some(limit) => validate_rate_limit(limit)?,
            None => self.settings.default_rate_limit,
        };
        let allow_list = validate_allow_list(&request.allowed_contracts)?;

        let ciphertext = self
            .cipher
            .encrypt(request.api_key.as_bytes())
            .map_err(|e| VaultError::internal(e.to_string()))?;

        let id = new_key_id();
        let record = CredentialRecord {
            id: id.clone(),
            seq: self.store.next_seq(),
            service_name: request.service_name.clone(),
            ciphertext,
            description: request.description.clone().unwrap_or_default(),
            allow_list,
            rate_limit,
            active: true,
            created_at: self.clock.now(),
            updated_at: None,
            rotated_at: None,
            last_used_at: None,
            total_calls: 0,
            rate_limit_hits: 0,
            ledger: UsageLedger::new(),
        };
        self.store.insert(record);

        info!(
            key_id = %id,
            service = %request.service_name,
            rate_limit,
            "Stored API key"
        );
        Ok(id)
    }

    /// All keys in creation order, metadata only.
    pub fn list_keys(&self) -> Vec<KeySummary> {
        self.store.scan(|record| Some(record.summary()))
    }

    /// Apply a partial update to the mutable fields of a key.
    pub fn update_key(&self, id: &str, update: KeyUpdate) -> VaultResult<KeySummary> {
        let rate_limit = update.rate_limit.map(validate_rate_limit).transpose()?;
        let allow_list = update
            .allowed_contracts
            .as_deref()
            .map(validate_allow_list)
            .transpose()?;
        let now = self.clock.now();

        let summary = self
            .store
            .update(id, |record| {
                if let Some(active) = update.active {
                    record.active = active;
                }
                if let Some(rate_limit) = rate_limit {
                    record.rate_limit = rate_limit;
                }
                if let Some(allow_list) = allow_list {
                    record.allow_list = allow_list;
                }
                if let Some(description) = update.description {
                    record.description = description;
                }
                record.updated_at = Some(now);
                record.summary()
            })
            .ok_or(VaultError::NotFound)?;

        info!(key_id = %id, active = summary.active, "Updated API key");
        Ok(summary)
    }

    /// Hard-remove a key. A second delete of the same id is `NotFound`.
    pub fn delete_key(&self, id: &str) -> VaultResult<()> {
        let record = self.store.remove(id).ok_or(VaultError::NotFound)?;
        info!(key_id = %id, service = %record.service_name, "Deleted API key");
        Ok(())
    }

    /// Replace the credential behind a key. Returns the rotation time.
    pub fn rotate_key(&self, id: &str, new_api_key: &str) -> VaultResult<DateTime<Utc>> {
        if new_api_key.is_empty() {
            return Err(VaultError::validation("new_api_key must not be empty"));
        }
        let ciphertext = self
            .cipher
            .encrypt(new_api_key.as_bytes())
            .map_err(|e| VaultError::internal(e.to_string()))?;
        let now = self.clock.now();
        let policy = self.settings.rotation_policy;

        self.store
            .update(id, |record| {
                record.ciphertext = ciphertext;
                record.rotated_at = Some(now);
                if policy == RotationPolicy::ResetUsage {
                    record.ledger.clear();
                    record.total_calls = 0;
                    record.rate_limit_hits = 0;
                }
            })
            .ok_or(VaultError::NotFound)?;

        info!(key_id = %id, ?policy, "Rotated API key");
        Ok(now)
    }

    pub fn usage_stats(&self, id: &str) -> VaultResult<UsageStats> {
        let now = self.clock.now();
        let stats = self
            .store
            .read(id, |record| record.usage_stats(now))
            .ok_or(VaultError::NotFound)?;
        debug!(key_id = %id, calls_last_hour = stats.calls_last_hour, "Usage stats read");
        Ok(stats)
    }

    pub fn health(&self) -> VaultHealth {
        let active_keys = self
            .store
            .scan(|record| record.is_active().then_some(()))
            .len();
        VaultHealth {
            total_keys: self.store.len(),
            active_keys,
        }
    }
}
