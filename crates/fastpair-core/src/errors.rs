//! Error types for Fast Pair core.
//!
//! Pairing has three independent outcome channels:
//! - [`PairFailure`] ends the attempt through the pair-failed callback
//! - [`AccountKeyFailure`] ends it through the account-key-failure callback,
//!   after the device may already be bonded
//! - soft skips, which are not errors at all and simply complete the procedure
//!
//! [`PairerError`] covers misuse of the pairer's own API surface.

use thiserror::Error;

// ============================================================================
// Pairing Failures
// ============================================================================

/// Reasons a pairing attempt fails before the device is paired.
///
/// The handshake-phase kinds are produced by handshake collaborators and
/// passed through unchanged; the remaining kinds are raised by the pairer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairFailure {
    // -------------------------------------------------------------------------
    // Handshake phase
    // -------------------------------------------------------------------------
    /// Could not open a GATT connection to the provider
    #[error("failed to create GATT connection")]
    CreateGattConnection,

    /// GATT service discovery failed
    #[error("GATT service discovery failed")]
    GattServiceDiscovery,

    /// GATT service discovery did not finish in time
    #[error("GATT service discovery timed out")]
    GattServiceDiscoveryTimeout,

    /// The data encryptor could not be built from the provider's key
    #[error("failed to retrieve data encryptor")]
    DataEncryptorRetrieval,

    #[error("key-based pairing characteristic not found")]
    KeyBasedPairingCharacteristicDiscovery,

    #[error("passkey characteristic not found")]
    PasskeyCharacteristicDiscovery,

    #[error("account key characteristic not found")]
    AccountKeyCharacteristicDiscovery,

    #[error("failed to start key-based pairing notify session")]
    KeyBasedPairingCharacteristicNotifySession,

    #[error("failed to start passkey notify session")]
    PasskeyCharacteristicNotifySession,

    #[error("key-based pairing characteristic write failed")]
    KeyBasedPairingCharacteristicWrite,

    #[error("key-based pairing response timed out")]
    KeyBasedPairingResponseTimeout,

    #[error("key-based pairing response could not be decrypted")]
    KeybasedPairingResponseDecryptFailure,

    #[error("unexpected key-based pairing response type")]
    IncorrectKeyBasedPairingResponseType,

    // -------------------------------------------------------------------------
    // Bonding phase
    // -------------------------------------------------------------------------
    /// Direct `pair()` on a resolved device failed
    #[error("pairing connect failed")]
    PairingConnect,

    /// Connect-by-address failed
    #[error("connect by address failed")]
    AddressConnect,

    /// No bonding response within the bond timeout
    #[error("create bond timed out")]
    CreateBondTimeout,

    // -------------------------------------------------------------------------
    // Passkey phase
    // -------------------------------------------------------------------------
    /// Writing the seeker's passkey over GATT failed
    #[error("passkey characteristic write failed")]
    PasskeyPairingCharacteristicWrite,

    /// The provider did not answer the passkey write in time
    #[error("passkey response timed out")]
    PasskeyResponseTimeout,

    /// The provider's passkey response could not be decrypted
    #[error("passkey response could not be decrypted")]
    PasskeyDecryptFailure,

    /// The decrypted response was not a provider's passkey message
    #[error("unexpected passkey response type")]
    IncorrectPasskeyResponseType,

    /// The provider echoed a different passkey
    #[error("passkey mismatch")]
    PasskeyMismatch,

    /// The classic device disappeared from the adapter
    #[error("pairing device lost")]
    PairingDeviceLost,

    /// The handshake vanished while the OS was confirming the passkey
    #[error("BLE device lost mid-pair")]
    BleDeviceLostMidPair,
}

// ============================================================================
// Account Key Failures
// ============================================================================

/// Reasons writing the account key to a provider fails.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKeyFailure {
    #[error("account key characteristic not found")]
    AccountKeyCharacteristicDiscovery,

    #[error("account key characteristic write failed")]
    AccountKeyCharacteristicWrite,

    /// No successfully completed handshake was available for the write
    #[error("handshake lost before account key write")]
    HandshakeLost,

    #[error("GATT error: failed")]
    GattErrorFailed,

    #[error("GATT error: unknown")]
    GattErrorUnknown,

    #[error("GATT error: operation in progress")]
    GattInProgress,

    #[error("GATT error: invalid length")]
    GattErrorInvalidLength,

    #[error("GATT error: not permitted")]
    GattErrorNotPermitted,

    #[error("GATT error: not authorized")]
    GattErrorNotAuthorized,

    #[error("GATT error: not paired")]
    GattErrorNotPaired,

    #[error("GATT error: not supported")]
    GattErrorNotSupported,
}

// ============================================================================
// Bluetooth Stack Errors
// ============================================================================

/// Error codes reported by the OS bonding layer for `pair()`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectErrorCode {
    #[error("authentication canceled")]
    AuthCanceled,
    #[error("authentication failed")]
    AuthFailed,
    #[error("authentication rejected")]
    AuthRejected,
    #[error("authentication timed out")]
    AuthTimeout,
    #[error("connection failed")]
    Failed,
    #[error("operation already in progress")]
    InProgress,
    #[error("unsupported device")]
    UnsupportedDevice,
    #[error("unknown error")]
    Unknown,
}

// ============================================================================
// Pairer API Errors
// ============================================================================

/// Errors returned by the pairer's inbound API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PairerError {
    /// Fast Pair never uses numeric PIN or passkey entry flows
    #[error("unsupported pairing request: {0}")]
    UnsupportedPairingRequest(&'static str),

    /// The pairer was shut down or dropped
    #[error("pairing session is closed")]
    SessionClosed,
}
