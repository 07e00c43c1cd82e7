//! Export and import of the full key set, ciphertext only.

use super::cipher::Cipher;
use super::ledger::UsageLedger;
use super::record::{validate_allow_list, CredentialRecord, KeyId};
use super::{KeyStore, Vault};
use crate::error::{VaultError, VaultResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::info;

/// One key as it appears in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedRecord {
    pub key_id: KeyId,
    pub service_name: String,
    pub encrypted_key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allowed_contracts: Vec<String>,
    pub rate_limit: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rotated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Informational; restored as-is.
    #[serde(default)]
    pub total_calls: u64,
    #[serde(default)]
    pub rate_limit_hits: u64,
}

impl ExportedRecord {
    fn from_record(record: &CredentialRecord) -> Self {
        Self {
            key_id: record.id.clone(),
            service_name: record.service_name.clone(),
            encrypted_key: record.ciphertext.clone(),
            description: record.description.clone(),
            allowed_contracts: record.allow_list.iter().cloned().collect(),
            rate_limit: record.rate_limit,
            active: record.active,
            created_at: record.created_at,
            updated_at: record.updated_at,
            rotated_at: record.rotated_at,
            last_used_at: record.last_used_at,
            total_calls: record.total_calls,
            rate_limit_hits: record.rate_limit_hits,
        }
    }

    fn validate(&self) -> VaultResult<BTreeSet<String>> {
        if self.key_id.trim().is_empty() {
            return Err(VaultError::validation("key_id must not be empty"));
        }
        if self.service_name.trim().is_empty() {
            return Err(VaultError::validation("service_name must not be empty"));
        }
        if self.rate_limit == 0 {
            return Err(VaultError::validation("rate_limit must be positive"));
        }
        if !Cipher::is_well_formed(&self.encrypted_key) {
            return Err(VaultError::validation("encrypted_key is malformed"));
        }
        validate_allow_list(&self.allowed_contracts)
    }

    /// Overwrite `record` in place. The ledger starts over.
    fn apply_to(&self, record: &mut CredentialRecord, allow_list: BTreeSet<String>) {
        record.service_name = self.service_name.clone();
        record.ciphertext = self.encrypted_key.clone();
        record.description = self.description.clone();
        record.allow_list = allow_list;
        record.rate_limit = self.rate_limit;
        record.active = self.active;
        record.created_at = self.created_at;
        record.updated_at = self.updated_at;
        record.rotated_at = self.rotated_at;
        record.last_used_at = self.last_used_at;
        record.total_calls = self.total_calls;
        record.rate_limit_hits = self.rate_limit_hits;
        record.ledger = UsageLedger::new();
    }

    fn to_record(&self, seq: u64, allow_list: BTreeSet<String>) -> CredentialRecord {
        let mut record = CredentialRecord {
            id: self.key_id.clone(),
            seq,
            service_name: String::new(),
            ciphertext: String::new(),
            description: String::new(),
            allow_list: BTreeSet::new(),
            rate_limit: self.rate_limit,
            active: self.active,
            created_at: self.created_at,
            updated_at: None,
            rotated_at: None,
            last_used_at: None,
            total_calls: 0,
            rate_limit_hits: 0,
            ledger: UsageLedger::new(),
        };
        self.apply_to(&mut record, allow_list);
        record
    }
}

/// Full vault contents for backup and restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub keys: Vec<ExportedRecord>,
    #[serde(default = "Utc::now")]
    pub exported_at: DateTime<Utc>,
}

impl VaultSnapshot {
    pub fn to_json(&self) -> VaultResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| VaultError::internal(e.to_string()))
    }

    pub fn from_json(json: &str) -> VaultResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| VaultError::validation(format!("malformed snapshot: {}", e)))
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Keys that did not exist before.
    pub imported: usize,
    /// Existing keys overwritten in place.
    pub updated: usize,
}

impl<S: KeyStore> Vault<S> {
    /// Every key in creation order, ciphertext only.
    pub fn export_all(&self) -> VaultSnapshot {
        let keys = self
            .store
            .scan(|record| Some(ExportedRecord::from_record(record)));
        info!(keys = keys.len(), "Exported vault");
        VaultSnapshot {
            keys,
            exported_at: self.clock.now(),
        }
    }

    /// Load a snapshot. Existing ids are overwritten, new ids appended.
    ///
    /// All entries are validated before anything is written; one bad entry
    /// rejects the whole snapshot. Ciphertext is never opened here, so keys
    /// sealed under another master key only fail when requested.
    pub fn import_all(&self, snapshot: &VaultSnapshot) -> VaultResult<ImportReport> {
        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(snapshot.keys.len());
        for (index, entry) in snapshot.keys.iter().enumerate() {
            let allow_list = entry.validate().map_err(|e| match e {
                VaultError::Validation(msg) => {
                    VaultError::Validation(format!("entry {}: {}", index, msg))
                }
                other => other,
            })?;
            if !seen.insert(entry.key_id.as_str()) {
                return Err(VaultError::validation(format!(
                    "entry {}: duplicate key_id {}",
                    index, entry.key_id
                )));
            }
            validated.push((entry, allow_list));
        }

        let mut report = ImportReport {
            imported: 0,
            updated: 0,
        };
        for (entry, allow_list) in validated {
            let replacement = allow_list.clone();
            let updated = self.store.upsert(
                &entry.key_id,
                |record| entry.apply_to(record, replacement),
                |seq| entry.to_record(seq, allow_list),
            );
            if updated {
                report.updated += 1;
            } else {
                report.imported += 1;
            }
        }

        info!(
            imported = report.imported,
            updated = report.updated,
            "Imported vault snapshot"
        );
        Ok(report)
    }
}
