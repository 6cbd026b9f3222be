//! Account key storage contract and an in-memory implementation.
//!
//! The remote repository that persists account keys and opt-in status is
//! external; the pairer reaches it only through [`AccountKeyStore`].
//! [`InMemoryAccountKeyStore`] backs tests and the demo.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::keys::AccountKey;
use crate::types::{FastPairDevice, OptInStatus};

// ============================================================================
// Store Trait
// ============================================================================

/// Account-side persistence for account keys and saved-devices opt-in.
///
/// Association calls are fire-and-forget: the store owns any retries.
#[async_trait]
pub trait AccountKeyStore: Send + Sync {
    /// Whether the account already holds a key for the device at `address`.
    async fn is_device_saved_to_account(&self, address: &str) -> bool;

    /// Save a freshly written key for the device to the account.
    fn associate_account_key(&self, device: &FastPairDevice, account_key: &AccountKey);

    /// Record locally that the device carries this account's existing key.
    fn associate_account_key_locally(&self, device: &FastPairDevice);

    async fn check_opt_in_status(&self) -> OptInStatus;

    /// Returns whether the update was accepted.
    async fn update_opt_in_status(&self, status: OptInStatus) -> bool;
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

#[derive(Debug, Default)]
struct Inner {
    /// Saved keys by upper-cased address
    saved: HashMap<String, AccountKey>,
    /// Metadata ids associated without a write
    local: HashSet<String>,
    opt_in: Option<OptInStatus>,
    opt_in_updates: Vec<OptInStatus>,
}

/// Process-local [`AccountKeyStore`].
#[derive(Debug, Default)]
pub struct InMemoryAccountKeyStore {
    inner: Mutex<Inner>,
}

impl InMemoryAccountKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given opt-in status.
    pub fn with_opt_in(status: OptInStatus) -> Self {
        let store = Self::default();
        store.lock().opt_in = Some(status);
        store
    }

    /// Pretend the account already holds a key for `address`.
    pub fn mark_saved(&self, address: &str, account_key: AccountKey) {
        self.lock()
            .saved
            .insert(address.to_ascii_uppercase(), account_key);
    }

    pub fn saved_key(&self, address: &str) -> Option<AccountKey> {
        self.lock().saved.get(&address.to_ascii_uppercase()).copied()
    }

    pub fn saved_count(&self) -> usize {
        self.lock().saved.len()
    }

    pub fn is_locally_associated(&self, metadata_id: &str) -> bool {
        self.lock().local.contains(metadata_id)
    }

    pub fn opt_in_updates(&self) -> Vec<OptInStatus> {
        self.lock().opt_in_updates.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AccountKeyStore for InMemoryAccountKeyStore {
    async fn is_device_saved_to_account(&self, address: &str) -> bool {
        self.lock()
            .saved
            .contains_key(&address.to_ascii_uppercase())
    }

    fn associate_account_key(&self, device: &FastPairDevice, account_key: &AccountKey) {
        let address = device.account_lookup_address();
        debug!(device = %address, "saving account key to account");
        self.lock()
            .saved
            .insert(address.to_ascii_uppercase(), *account_key);
    }

    fn associate_account_key_locally(&self, device: &FastPairDevice) {
        debug!(device = %device.ble_address(), "associating account key locally");
        self.lock().local.insert(device.metadata_id().to_string());
    }

    async fn check_opt_in_status(&self) -> OptInStatus {
        self.lock().opt_in.unwrap_or(OptInStatus::Unknown)
    }

    async fn update_opt_in_status(&self, status: OptInStatus) -> bool {
        let mut inner = self.lock();
        inner.opt_in = Some(status);
        inner.opt_in_updates.push(status);
        true
    }
}
