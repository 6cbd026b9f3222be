//! Handshake contracts and the handshake registry.
//!
//! The cryptographic handshake itself is performed by a [`HandshakeFactory`].
//! The pairer only sees the result: a data encryptor and a GATT client,
//! looked up per device through [`HandshakeLookup`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::errors::{AccountKeyFailure, PairFailure};
use crate::keys::AccountKey;
use crate::platform::BluetoothAdapter;
use crate::types::{DecryptedPasskey, FastPairDevice, FastPairMessageType};

// ============================================================================
// Handshake Contracts
// ============================================================================

/// Decrypts payloads with the key agreed during the handshake.
#[async_trait]
pub trait DataEncryptor: Send + Sync {
    /// Decrypt and parse a passkey notification. `None` if it does not decrypt.
    async fn parse_decrypted_passkey(&self, encrypted: Bytes) -> Option<DecryptedPasskey>;
}

/// Authenticated GATT operations against the provider.
#[async_trait]
pub trait GattServiceClient: Send + Sync {
    /// Write an encrypted passkey and wait for the provider's encrypted reply.
    async fn write_passkey(
        &self,
        message_type: FastPairMessageType,
        passkey: u32,
        encryptor: Arc<dyn DataEncryptor>,
    ) -> Result<Bytes, PairFailure>;

    async fn write_account_key(
        &self,
        account_key: AccountKey,
        encryptor: Arc<dyn DataEncryptor>,
    ) -> Result<(), AccountKeyFailure>;
}

/// Result of a handshake with one provider.
pub trait Handshake: Send + Sync {
    fn completed_successfully(&self) -> bool;
    fn data_encryptor(&self) -> Arc<dyn DataEncryptor>;
    fn gatt_service_client(&self) -> Arc<dyn GattServiceClient>;
}

/// Per-device handshake cache.
#[async_trait]
pub trait HandshakeLookup: Send + Sync {
    fn get(&self, device: &FastPairDevice) -> Option<Arc<dyn Handshake>>;

    /// Drop the cached handshake. Returns whether one was present.
    fn erase(&self, device: &FastPairDevice) -> bool;

    /// Perform a new handshake and cache it on success.
    async fn create(
        &self,
        adapter: Arc<dyn BluetoothAdapter>,
        device: Arc<FastPairDevice>,
    ) -> Result<(), PairFailure>;
}

/// Performs the cryptographic handshake with a provider.
#[async_trait]
pub trait HandshakeFactory: Send + Sync {
    async fn perform_handshake(
        &self,
        adapter: Arc<dyn BluetoothAdapter>,
        device: Arc<FastPairDevice>,
    ) -> Result<Arc<dyn Handshake>, PairFailure>;
}

// ============================================================================
// Handshake Registry
// ============================================================================

/// [`HandshakeLookup`] keyed by BLE address, passed explicitly to each pairer.
pub struct HandshakeRegistry {
    factory: Arc<dyn HandshakeFactory>,
    handshakes: Mutex<HashMap<String, Arc<dyn Handshake>>>,
}

impl HandshakeRegistry {
    pub fn new(factory: Arc<dyn HandshakeFactory>) -> Self {
        Self {
            factory,
            handshakes: Mutex::new(HashMap::new()),
        }
    }

    /// Seed a handshake, replacing any existing one for the device.
    pub fn insert(&self, device: &FastPairDevice, handshake: Arc<dyn Handshake>) {
        self.lock().insert(key(device), handshake);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn Handshake>>> {
        self.handshakes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(device: &FastPairDevice) -> String {
    device.ble_address().to_ascii_uppercase()
}

#[async_trait]
impl HandshakeLookup for HandshakeRegistry {
    fn get(&self, device: &FastPairDevice) -> Option<Arc<dyn Handshake>> {
        self.lock().get(&key(device)).cloned()
    }

    fn erase(&self, device: &FastPairDevice) -> bool {
        let removed = self.lock().remove(&key(device)).is_some();
        if removed {
            debug!(device = %device.ble_address(), "erased handshake");
        }
        removed
    }

    async fn create(
        &self,
        adapter: Arc<dyn BluetoothAdapter>,
        device: Arc<FastPairDevice>,
    ) -> Result<(), PairFailure> {
        match self
            .factory
            .perform_handshake(adapter, device.clone())
            .await
        {
            Ok(handshake) => {
                info!(device = %device.ble_address(), "handshake complete");
                self.insert(&device, handshake);
                Ok(())
            }
            Err(failure) => {
                warn!(device = %device.ble_address(), %failure, "handshake failed");
                Err(failure)
            }
        }
    }
}
