//! Credential release: service lookup, allow-list, rate limit, decrypt.

use super::ledger::Admission;
use super::record::{CredentialGrant, CredentialRecord};
use super::{KeyStore, Vault};
use crate::error::{VaultError, VaultResult};
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

impl<S: KeyStore> Vault<S> {
    /// Release the credential for `service_name` to `caller`.
    ///
    /// `caller` must already be authenticated. Checks run in order:
    /// active key for the service (`NotFound`), allow-list (`Forbidden`),
    /// rate limit (`RateLimited`), decryption (`Internal`). Only a
    /// `RateLimited` denial touches state, and only `rate_limit_hits`.
    pub fn request_credential(
        &self,
        caller: &str,
        service_name: &str,
    ) -> VaultResult<CredentialGrant> {
        let now = self.clock.now();

        // Earliest-created active key wins. The record is re-checked under
        // its lock since it may change between the scan and the update.
        let candidates = self.store.scan(|record| {
            (record.active && record.service_name == service_name).then(|| record.id.clone())
        });

        for id in candidates {
            let outcome = self.store.update(&id, |record| {
                if !record.active || record.service_name != service_name {
                    return None;
                }
                Some(self.release(record, caller, now))
            });
            if let Some(Some(result)) = outcome {
                return result;
            }
        }

        debug!(service = %service_name, "No active key for service");
        Err(VaultError::NotFound)
    }

    fn release(
        &self,
        record: &mut CredentialRecord,
        caller: &str,
        now: DateTime<Utc>,
    ) -> VaultResult<CredentialGrant> {
        if !record.permits(caller) {
            warn!(key_id = %record.id, caller = %caller, "Caller not on allow-list");
            return Err(VaultError::Forbidden);
        }

        let remaining = match record.ledger.try_admit(now, record.rate_limit) {
            Admission::Admitted { remaining } => remaining,
            Admission::RateLimited { retry_after } => {
                record.rate_limit_hits += 1;
                warn!(
                    key_id = %record.id,
                    caller = %caller,
                    rate_limit = record.rate_limit,
                    retry_after_secs = retry_after.as_secs(),
                    "Rate limit exceeded"
                );
                return Err(VaultError::RateLimited { retry_after });
            }
        };

        let api_key = match self.cipher.decrypt_string(&record.ciphertext) {
            Ok(api_key) => api_key,
            Err(e) => {
                // A corrupt record must not eat into the caller's quota.
                record.ledger.revoke_last();
                error!(
                    key_id = %record.id,
                    error = %e,
                    "Stored credential failed to decrypt; check master key and snapshot origin"
                );
                return Err(VaultError::internal("stored credential could not be decrypted"));
            }
        };

        record.total_calls += 1;
        record.last_used_at = Some(now);
        debug!(key_id = %record.id, caller = %caller, remaining, "Released API key");

        Ok(CredentialGrant {
            api_key: api_key.as_str().to_owned(),
            service_name: record.service_name.clone(),
            rate_limit: record.rate_limit,
            calls_remaining: remaining,
        })
    }
}
