//! Device model and value types shared by the pairer and its collaborators.

use std::sync::{PoisonError, RwLock};

use crate::keys::AccountKey;

/// Which Fast Pair flow a device is going through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// First pairing, with account key provisioning
    Initial,
    /// Device already carries this account's key
    Subsequent,
    /// Device was bonded outside Fast Pair and is only being associated now
    Retroactive,
}

/// Fast Pair version advertised by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceFastPairVersion {
    /// Legacy providers: no GATT flow, system pairing dialog only
    V1,
    HigherThanV1,
}

/// Address type hint for connect-by-address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressType {
    LePublic,
    LeRandom,
    BrEdr,
}

/// Message types carried in encrypted Fast Pair GATT payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FastPairMessageType {
    KeyBasedPairingRequest,
    KeyBasedPairingResponse,
    SeekersPasskey,
    ProvidersPasskey,
}

/// A passkey payload after decryption by the handshake's data encryptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecryptedPasskey {
    pub message_type: FastPairMessageType,
    pub passkey: u32,
    pub salt: [u8; 12],
}

impl DecryptedPasskey {
    pub fn new(message_type: FastPairMessageType, passkey: u32) -> Self {
        Self {
            message_type,
            passkey,
            salt: [0u8; 12],
        }
    }
}

/// Login state of the local user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginStatus {
    NotLoggedIn,
    Guest,
    SignedIn,
}

impl LoginStatus {
    /// Only a signed-in user has an account to save keys to.
    pub fn is_signed_in(self) -> bool {
        matches!(self, LoginStatus::SignedIn)
    }
}

/// Saved-devices opt-in state for the signed-in account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptInStatus {
    Unknown,
    OptedIn,
    OptedOut,
}

// ============================================================================
// Fast Pair Device
// ============================================================================

/// A Fast Pair provider, shared between the caller and the pairer.
///
/// Identity fields are fixed at construction. The classic address, version
/// and account key are filled in as discovery and pairing progress, so they
/// sit behind locks and the device is always handled as `Arc<FastPairDevice>`.
#[derive(Debug)]
pub struct FastPairDevice {
    metadata_id: String,
    ble_address: String,
    protocol: Protocol,
    classic_address: RwLock<Option<String>>,
    version: RwLock<Option<DeviceFastPairVersion>>,
    account_key: RwLock<Option<AccountKey>>,
}

impl FastPairDevice {
    pub fn new(
        metadata_id: impl Into<String>,
        ble_address: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        Self {
            metadata_id: metadata_id.into(),
            ble_address: ble_address.into(),
            protocol,
            classic_address: RwLock::new(None),
            version: RwLock::new(None),
            account_key: RwLock::new(None),
        }
    }

    pub fn metadata_id(&self) -> &str {
        &self.metadata_id
    }

    pub fn ble_address(&self) -> &str {
        &self.ble_address
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn classic_address(&self) -> Option<String> {
        self.classic_address
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_classic_address(&self, address: Option<String>) {
        *self
            .classic_address
            .write()
            .unwrap_or_else(PoisonError::into_inner) = address;
    }

    pub fn version(&self) -> Option<DeviceFastPairVersion> {
        *self.version.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_version(&self, version: Option<DeviceFastPairVersion>) {
        *self.version.write().unwrap_or_else(PoisonError::into_inner) = version;
    }

    pub fn account_key(&self) -> Option<AccountKey> {
        *self
            .account_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_account_key(&self, key: AccountKey) {
        *self
            .account_key
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(key);
    }

    /// Address used to look the device up in account storage.
    pub fn account_lookup_address(&self) -> String {
        self.classic_address()
            .unwrap_or_else(|| self.ble_address.clone())
    }

    /// True if `address` is either this device's BLE or classic address.
    ///
    /// The Bluetooth stack may report the paired device under either
    /// address, so both are checked.
    pub fn matches_address(&self, address: &str) -> bool {
        if self.ble_address.eq_ignore_ascii_case(address) {
            return true;
        }
        self.classic_address()
            .map(|classic| classic.eq_ignore_ascii_case(address))
            .unwrap_or(false)
    }
}
