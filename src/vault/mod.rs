//! Credential vault engine.
//!
//! Holds encrypted third-party API keys and releases them to callers that
//! pass the allow-list and rate-limit checks.
//!
//! ## Layout
//!
//! - [`cipher`] seals and opens credentials under the master key
//! - [`ledger`] is the per-key rolling-hour admission log
//! - [`store`] is the storage seam and its in-memory implementation
//! - `manage`, `access` and `snapshot` add the admin, release and
//!   backup operations to [`Vault`]
//!
//! ## Snapshots and the master key
//!
//! Import never decrypts. A snapshot taken under a different master key
//! imports cleanly and then fails with an internal error on the first
//! request for each affected key.
//!
//! ## Usage
//!
//! ```ignore
//! let cipher = Cipher::from_base64(&config.vault.master_key)?;
//! let vault = Vault::new(cipher, config.vault_settings());
//!
//! let id = vault.create_key(NewKey::new("openweathermap", "sk-...").rate_limit(50))?;
//! let grant = vault.request_credential("0xContract", "openweathermap")?;
//! ```

mod access;
pub mod cipher;
pub mod clock;
pub mod ledger;
mod manage;
pub mod record;
mod snapshot;
pub mod store;

pub use cipher::{Cipher, CipherError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{Admission, UsageLedger};
pub use manage::VaultHealth;
pub use record::{CredentialGrant, KeyId, KeySummary, KeyUpdate, NewKey, UsageStats};
pub use snapshot::{ExportedRecord, ImportReport, VaultSnapshot};
pub use store::{KeyStore, MemoryStore};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What rotation does to a key's usage history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Ledger and counters carry over to the new credential.
    #[default]
    PreserveUsage,
    /// Ledger is emptied and counters go back to zero.
    ResetUsage,
}

/// Engine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultSettings {
    /// Rate limit applied when a new key does not specify one.
    pub default_rate_limit: u32,
    pub rotation_policy: RotationPolicy,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            default_rate_limit: 100,
            rotation_policy: RotationPolicy::default(),
        }
    }
}

/// The vault engine.
pub struct Vault<S: KeyStore = MemoryStore> {
    store: S,
    cipher: Cipher,
    clock: Arc<dyn Clock>,
    settings: VaultSettings,
}

impl Vault<MemoryStore> {
    /// In-memory vault on the wall clock.
    pub fn new(cipher: Cipher, settings: VaultSettings) -> Self {
        Self::with_store(MemoryStore::new(), cipher, settings)
    }
}

impl<S: KeyStore> Vault<S> {
    pub fn with_store(store: S, cipher: Cipher, settings: VaultSettings) -> Self {
        Self {
            store,
            cipher,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: KeyStore> std::fmt::Debug for Vault<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("keys", &self.store.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Shared vault handle for use across the application.
pub type SharedVault = Arc<Vault>;
