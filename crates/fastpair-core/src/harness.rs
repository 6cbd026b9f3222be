//! Test harness for Fast Pair pairing flows.
//!
//! Fakes for every collaborator a pairer drives, plus a [`TestBed`] that
//! wires them together. The fakes model a well-behaved provider by default:
//! prompts are raised as soon as bonding starts and the provider echoes the
//! seeker's passkey. Each fake can be told to fail or stall.

use std::collections::HashMap;
use std::future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::Notify;

use crate::{
    callbacks::PairerCallbacks,
    config::PairerConfig,
    delegate::PairingDelegate,
    errors::{AccountKeyFailure, ConnectErrorCode, PairFailure},
    handshake::{DataEncryptor, GattServiceClient, Handshake, HandshakeFactory, HandshakeRegistry},
    keys::AccountKey,
    metrics::MemoryMetricsSink,
    pairing::{FastPairPairer, PairerDeps},
    platform::{
        BluetoothAdapter, BluetoothDevice, LoginStatusSource, PairingDelegatePriority,
        SystemPairingUi,
    },
    store::InMemoryAccountKeyStore,
    types::{
        AddressType, DecryptedPasskey, DeviceFastPairVersion, FastPairDevice,
        FastPairMessageType, LoginStatus, Protocol,
    },
};

pub const METADATA_ID: &str = "718c17";
pub const BLE_ADDRESS: &str = "AA:BB:CC:00:11:22";
pub const CLASSIC_ADDRESS: &str = "11:22:33:44:55:66";
pub const PASSKEY: u32 = 123456;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Handshake Fakes
// ============================================================================

fn message_type_tag(message_type: FastPairMessageType) -> u8 {
    match message_type {
        FastPairMessageType::KeyBasedPairingRequest => 0x00,
        FastPairMessageType::KeyBasedPairingResponse => 0x01,
        FastPairMessageType::SeekersPasskey => 0x02,
        FastPairMessageType::ProvidersPasskey => 0x03,
    }
}

fn message_type_from_tag(tag: u8) -> Option<FastPairMessageType> {
    match tag {
        0x00 => Some(FastPairMessageType::KeyBasedPairingRequest),
        0x01 => Some(FastPairMessageType::KeyBasedPairingResponse),
        0x02 => Some(FastPairMessageType::SeekersPasskey),
        0x03 => Some(FastPairMessageType::ProvidersPasskey),
        _ => None,
    }
}

/// Plaintext passkey block: message type, then the passkey as 3 big-endian
/// bytes, padded to 16 bytes.
pub fn encode_passkey_block(message_type: FastPairMessageType, passkey: u32) -> Bytes {
    let mut block = BytesMut::with_capacity(16);
    block.put_u8(message_type_tag(message_type));
    block.put_slice(&passkey.to_be_bytes()[1..]);
    block.put_bytes(0, 12);
    block.freeze()
}

/// "Decrypts" by parsing the plaintext block.
#[derive(Debug, Default)]
pub struct FakeDataEncryptor {
    fail: AtomicBool,
}

impl FakeDataEncryptor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every payload fails to decrypt.
    pub fn failing() -> Arc<Self> {
        let encryptor = Self::default();
        encryptor.fail.store(true, Ordering::SeqCst);
        Arc::new(encryptor)
    }
}

#[async_trait]
impl DataEncryptor for FakeDataEncryptor {
    async fn parse_decrypted_passkey(&self, encrypted: Bytes) -> Option<DecryptedPasskey> {
        if self.fail.load(Ordering::SeqCst) || encrypted.len() != 16 {
            return None;
        }
        let message_type = message_type_from_tag(encrypted[0])?;
        let passkey = u32::from_be_bytes([0, encrypted[1], encrypted[2], encrypted[3]]);
        let mut salt = [0u8; 12];
        salt.copy_from_slice(&encrypted[4..]);
        Some(DecryptedPasskey {
            message_type,
            passkey,
            salt,
        })
    }
}

#[derive(Debug)]
struct ProviderBehavior {
    response_type: FastPairMessageType,
    passkey_override: Option<u32>,
    passkey_failure: Option<PairFailure>,
    account_key_failure: Option<AccountKeyFailure>,
    account_key_delay: Option<Duration>,
}

impl Default for ProviderBehavior {
    fn default() -> Self {
        Self {
            response_type: FastPairMessageType::ProvidersPasskey,
            passkey_override: None,
            passkey_failure: None,
            account_key_failure: None,
            account_key_delay: None,
        }
    }
}

/// Provider side of the GATT exchange.
#[derive(Debug, Default)]
pub struct FakeGattClient {
    behavior: Mutex<ProviderBehavior>,
    passkeys: Mutex<Vec<(FastPairMessageType, u32)>>,
    account_keys: Mutex<Vec<AccountKey>>,
}

impl FakeGattClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reply to passkey writes with this message type and, if set, this
    /// passkey instead of the seeker's.
    pub fn respond_with(&self, response_type: FastPairMessageType, passkey: Option<u32>) {
        let mut behavior = lock(&self.behavior);
        behavior.response_type = response_type;
        behavior.passkey_override = passkey;
    }

    pub fn fail_passkey_write(&self, failure: PairFailure) {
        lock(&self.behavior).passkey_failure = Some(failure);
    }

    pub fn fail_account_key_write(&self, failure: AccountKeyFailure) {
        lock(&self.behavior).account_key_failure = Some(failure);
    }

    /// Hold account key writes for `delay` before the provider answers.
    pub fn delay_account_key_write(&self, delay: Duration) {
        lock(&self.behavior).account_key_delay = Some(delay);
    }

    pub fn passkeys_written(&self) -> Vec<(FastPairMessageType, u32)> {
        lock(&self.passkeys).clone()
    }

    pub fn account_keys_written(&self) -> Vec<AccountKey> {
        lock(&self.account_keys).clone()
    }
}

#[async_trait]
impl GattServiceClient for FakeGattClient {
    async fn write_passkey(
        &self,
        message_type: FastPairMessageType,
        passkey: u32,
        _encryptor: Arc<dyn DataEncryptor>,
    ) -> Result<Bytes, PairFailure> {
        lock(&self.passkeys).push((message_type, passkey));
        let behavior = lock(&self.behavior);
        if let Some(failure) = behavior.passkey_failure {
            return Err(failure);
        }
        Ok(encode_passkey_block(
            behavior.response_type,
            behavior.passkey_override.unwrap_or(passkey),
        ))
    }

    async fn write_account_key(
        &self,
        account_key: AccountKey,
        _encryptor: Arc<dyn DataEncryptor>,
    ) -> Result<(), AccountKeyFailure> {
        let delay = lock(&self.behavior).account_key_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = lock(&self.behavior).account_key_failure {
            return Err(failure);
        }
        lock(&self.account_keys).push(account_key);
        Ok(())
    }
}

pub struct FakeHandshake {
    completed: bool,
    encryptor: Arc<FakeDataEncryptor>,
    gatt: Arc<FakeGattClient>,
}

impl FakeHandshake {
    pub fn new(
        completed: bool,
        encryptor: Arc<FakeDataEncryptor>,
        gatt: Arc<FakeGattClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            completed,
            encryptor,
            gatt,
        })
    }

    pub fn completed() -> Arc<Self> {
        Self::new(true, FakeDataEncryptor::new(), FakeGattClient::new())
    }

    /// Left over from a failed attempt.
    pub fn incomplete() -> Arc<Self> {
        Self::new(false, FakeDataEncryptor::new(), FakeGattClient::new())
    }

    pub fn gatt(&self) -> Arc<FakeGattClient> {
        self.gatt.clone()
    }
}

impl Handshake for FakeHandshake {
    fn completed_successfully(&self) -> bool {
        self.completed
    }

    fn data_encryptor(&self) -> Arc<dyn DataEncryptor> {
        self.encryptor.clone()
    }

    fn gatt_service_client(&self) -> Arc<dyn GattServiceClient> {
        self.gatt.clone()
    }
}

pub struct FakeHandshakeFactory {
    outcome: Result<bool, PairFailure>,
    encryptor: Arc<FakeDataEncryptor>,
    gatt: Arc<FakeGattClient>,
    created: AtomicUsize,
}

impl FakeHandshakeFactory {
    fn with_outcome(outcome: Result<bool, PairFailure>, gatt: Arc<FakeGattClient>) -> Self {
        Self {
            outcome,
            encryptor: FakeDataEncryptor::new(),
            gatt,
            created: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_outcome(Ok(true), FakeGattClient::new())
    }

    /// Successful handshakes share `gatt`.
    pub fn succeeding_with(gatt: Arc<FakeGattClient>) -> Self {
        Self::with_outcome(Ok(true), gatt)
    }

    pub fn failing(failure: PairFailure) -> Self {
        Self::with_outcome(Err(failure), FakeGattClient::new())
    }

    /// Reports success but caches a handshake that is not usable.
    pub fn yielding_incomplete() -> Self {
        Self::with_outcome(Ok(false), FakeGattClient::new())
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandshakeFactory for FakeHandshakeFactory {
    async fn perform_handshake(
        &self,
        _adapter: Arc<dyn BluetoothAdapter>,
        _device: Arc<FastPairDevice>,
    ) -> Result<Arc<dyn Handshake>, PairFailure> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let completed = self.outcome?;
        Ok(FakeHandshake::new(
            completed,
            self.encryptor.clone(),
            self.gatt.clone(),
        ))
    }
}

// ============================================================================
// Bluetooth Fakes
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PairMode {
    /// Raise a passkey prompt, then settle when confirmed or cancelled
    Prompt,
    Fail(ConnectErrorCode),
    /// Fail without prompting once the delay has passed
    FailAfter(ConnectErrorCode, Duration),
    Hang,
}

/// Classic device with a scripted bonding behavior.
pub struct FakeBluetoothDevice {
    this: Weak<FakeBluetoothDevice>,
    address: String,
    passkey: u32,
    bonded: AtomicBool,
    mode: Mutex<PairMode>,
    observers: Mutex<Vec<PairingDelegate>>,
    settled: Notify,
    pair_calls: AtomicUsize,
    confirm_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
}

impl FakeBluetoothDevice {
    /// `passkey` is what the device displays when bonding.
    pub fn new(address: &str, passkey: u32) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            address: address.to_string(),
            passkey,
            bonded: AtomicBool::new(false),
            mode: Mutex::new(PairMode::Prompt),
            observers: Mutex::new(Vec::new()),
            settled: Notify::new(),
            pair_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_bonded(&self, bonded: bool) {
        self.bonded.store(bonded, Ordering::SeqCst);
    }

    pub fn fail_pairing_with(&self, code: ConnectErrorCode) {
        *lock(&self.mode) = PairMode::Fail(code);
    }

    /// `pair()` fails with `code` after `delay`, and no prompt is raised.
    pub fn fail_pairing_after(&self, code: ConnectErrorCode, delay: Duration) {
        *lock(&self.mode) = PairMode::FailAfter(code, delay);
    }

    /// `pair()` never resolves and no prompt is raised.
    pub fn hang_pairing(&self) {
        *lock(&self.mode) = PairMode::Hang;
    }

    /// Receive paired-state changes, as an adapter observer would.
    pub fn add_observer(&self, delegate: PairingDelegate) {
        let mut observers = lock(&self.observers);
        if !observers.contains(&delegate) {
            observers.push(delegate);
        }
    }

    pub fn pair_calls(&self) -> usize {
        self.pair_calls.load(Ordering::SeqCst)
    }

    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Raise the passkey prompt on `delegate`.
    fn prompt(&self, delegate: &PairingDelegate) {
        if let Some(this) = self.this.upgrade() {
            let _ = delegate.confirm_passkey(this, self.passkey);
        }
    }
}

#[async_trait]
impl BluetoothDevice for FakeBluetoothDevice {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn is_bonded(&self) -> bool {
        self.bonded.load(Ordering::SeqCst)
    }

    async fn pair(&self, delegate: PairingDelegate) -> Result<(), ConnectErrorCode> {
        self.pair_calls.fetch_add(1, Ordering::SeqCst);
        let mode = *lock(&self.mode);
        match mode {
            PairMode::Fail(code) => Err(code),
            PairMode::FailAfter(code, delay) => {
                tokio::time::sleep(delay).await;
                Err(code)
            }
            PairMode::Hang => future::pending().await,
            PairMode::Prompt => {
                self.add_observer(delegate.clone());
                self.prompt(&delegate);
                self.settled.notified().await;
                if self.is_bonded() {
                    Ok(())
                } else {
                    Err(ConnectErrorCode::AuthCanceled)
                }
            }
        }
    }

    fn confirm_pairing(&self) {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        self.set_bonded(true);
        let observers = lock(&self.observers).clone();
        for observer in observers {
            let _ = observer.device_paired_changed(self, true);
        }
        self.settled.notify_one();
    }

    fn cancel_pairing(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.settled.notify_one();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ConnectMode {
    Connect,
    Fail(String),
    FailAfter(String, Duration),
    Hang,
}

/// Adapter holding known devices and devices reachable by address.
pub struct FakeBluetoothAdapter {
    known: Mutex<HashMap<String, Arc<FakeBluetoothDevice>>>,
    connectable: Mutex<HashMap<String, Arc<FakeBluetoothDevice>>>,
    delegates: Mutex<Vec<(PairingDelegate, PairingDelegatePriority)>>,
    connect_mode: Mutex<ConnectMode>,
    connect_calls: AtomicUsize,
}

impl Default for FakeBluetoothAdapter {
    fn default() -> Self {
        Self {
            known: Mutex::new(HashMap::new()),
            connectable: Mutex::new(HashMap::new()),
            delegates: Mutex::new(Vec::new()),
            connect_mode: Mutex::new(ConnectMode::Connect),
            connect_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeBluetoothAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `device` resolvable through `get_device`.
    pub fn add_device(&self, device: Arc<FakeBluetoothDevice>) {
        lock(&self.known).insert(device.address().to_ascii_uppercase(), device);
    }

    /// Make `device` reachable only through `connect_device`.
    pub fn add_connectable(&self, device: Arc<FakeBluetoothDevice>) {
        lock(&self.connectable).insert(device.address().to_ascii_uppercase(), device);
    }

    pub fn fail_connect(&self, message: &str) {
        *lock(&self.connect_mode) = ConnectMode::Fail(message.to_string());
    }

    /// `connect_device` fails with `message` after `delay`.
    pub fn fail_connect_after(&self, message: &str, delay: Duration) {
        *lock(&self.connect_mode) = ConnectMode::FailAfter(message.to_string(), delay);
    }

    pub fn hang_connect(&self) {
        *lock(&self.connect_mode) = ConnectMode::Hang;
    }

    pub fn delegates(&self) -> Vec<(PairingDelegate, PairingDelegatePriority)> {
        lock(&self.delegates).clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BluetoothAdapter for FakeBluetoothAdapter {
    fn get_device(&self, address: &str) -> Option<Arc<dyn BluetoothDevice>> {
        lock(&self.known)
            .get(&address.to_ascii_uppercase())
            .map(|device| device.clone() as Arc<dyn BluetoothDevice>)
    }

    async fn connect_device(
        &self,
        address: &str,
        _address_type: Option<AddressType>,
    ) -> Result<Arc<dyn BluetoothDevice>, String> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let mode = lock(&self.connect_mode).clone();
        match mode {
            ConnectMode::Fail(message) => return Err(message),
            ConnectMode::FailAfter(message, delay) => {
                tokio::time::sleep(delay).await;
                return Err(message);
            }
            ConnectMode::Hang => return future::pending().await,
            ConnectMode::Connect => {}
        }

        let key = address.to_ascii_uppercase();
        let device = lock(&self.connectable)
            .remove(&key)
            .ok_or_else(|| format!("no device at {address}"))?;
        lock(&self.known).insert(key, device.clone());

        // Connecting to an unbonded device makes the stack prompt every
        // registered delegate.
        for (delegate, _) in self.delegates() {
            device.add_observer(delegate.clone());
            device.prompt(&delegate);
        }
        Ok(device)
    }

    fn add_pairing_delegate(&self, delegate: PairingDelegate, priority: PairingDelegatePriority) {
        lock(&self.delegates).push((delegate, priority));
    }

    fn remove_pairing_delegate(&self, delegate: &PairingDelegate) {
        lock(&self.delegates).retain(|(registered, _)| registered != delegate);
    }
}

// ============================================================================
// Platform Fakes
// ============================================================================

#[derive(Debug)]
pub struct FakeLoginStatus {
    status: Mutex<LoginStatus>,
}

impl FakeLoginStatus {
    pub fn new(status: LoginStatus) -> Self {
        Self {
            status: Mutex::new(status),
        }
    }

    pub fn set(&self, status: LoginStatus) {
        *lock(&self.status) = status;
    }
}

impl LoginStatusSource for FakeLoginStatus {
    fn login_status(&self) -> LoginStatus {
        *lock(&self.status)
    }
}

#[derive(Debug, Default)]
pub struct FakePairingUi {
    shown: Mutex<Vec<String>>,
}

impl FakePairingUi {
    pub fn shown(&self) -> Vec<String> {
        lock(&self.shown).clone()
    }
}

impl SystemPairingUi for FakePairingUi {
    fn show_pairing_dialog(&self, ble_address: &str) {
        lock(&self.shown).push(ble_address.to_string());
    }
}

// ============================================================================
// Callback Recorder
// ============================================================================

/// A pairer callback as observed by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackEvent {
    HandshakeComplete,
    Paired,
    PairFailed(PairFailure),
    AccountKeyFailure(AccountKeyFailure),
    ProcedureComplete,
}

/// Records callbacks in the order they fire.
#[derive(Clone, Debug, Default)]
pub struct CallbackRecorder {
    events: Arc<Mutex<Vec<CallbackEvent>>>,
}

impl CallbackRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks that append to this recorder.
    pub fn callbacks(&self) -> PairerCallbacks {
        let handshake = self.events.clone();
        let paired = self.events.clone();
        let failed = self.events.clone();
        let key_failure = self.events.clone();
        let complete = self.events.clone();
        PairerCallbacks::new()
            .on_handshake_complete(move |_| lock(&handshake).push(CallbackEvent::HandshakeComplete))
            .on_paired(move |_| lock(&paired).push(CallbackEvent::Paired))
            .on_pair_failed(move |_, failure| lock(&failed).push(CallbackEvent::PairFailed(failure)))
            .on_account_key_failure(move |_, failure| {
                lock(&key_failure).push(CallbackEvent::AccountKeyFailure(failure))
            })
            .on_procedure_complete(move |_| lock(&complete).push(CallbackEvent::ProcedureComplete))
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        lock(&self.events).clone()
    }
}

// ============================================================================
// Test Bed
// ============================================================================

/// All fakes wired together, with a signed-in user and a provider that
/// completes handshakes through [`TestBed::gatt`].
pub struct TestBed {
    pub adapter: Arc<FakeBluetoothAdapter>,
    pub factory: Arc<FakeHandshakeFactory>,
    pub handshakes: Arc<HandshakeRegistry>,
    pub gatt: Arc<FakeGattClient>,
    pub store: Arc<InMemoryAccountKeyStore>,
    pub login: Arc<FakeLoginStatus>,
    pub pairing_ui: Arc<FakePairingUi>,
    pub metrics: Arc<MemoryMetricsSink>,
    pub recorder: CallbackRecorder,
}

impl Default for TestBed {
    fn default() -> Self {
        Self::with_factory(FakeHandshakeFactory::succeeding_with)
    }
}

impl TestBed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build with a custom handshake factory. The closure receives the
    /// shared provider GATT client.
    pub fn with_factory(
        factory: impl FnOnce(Arc<FakeGattClient>) -> FakeHandshakeFactory,
    ) -> Self {
        let gatt = FakeGattClient::new();
        let factory = Arc::new(factory(gatt.clone()));
        Self {
            adapter: Arc::new(FakeBluetoothAdapter::new()),
            handshakes: Arc::new(HandshakeRegistry::new(factory.clone())),
            factory,
            gatt,
            store: Arc::new(InMemoryAccountKeyStore::new()),
            login: Arc::new(FakeLoginStatus::new(LoginStatus::SignedIn)),
            pairing_ui: Arc::new(FakePairingUi::default()),
            metrics: Arc::new(MemoryMetricsSink::new()),
            recorder: CallbackRecorder::new(),
        }
    }

    pub fn deps(&self) -> PairerDeps {
        PairerDeps {
            adapter: self.adapter.clone(),
            handshakes: self.handshakes.clone(),
            account_keys: self.store.clone(),
            login: self.login.clone(),
            pairing_ui: self.pairing_ui.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// A discovered provider with both addresses and a post-V1 version.
    pub fn device(&self, protocol: Protocol) -> Arc<FastPairDevice> {
        let device = FastPairDevice::new(METADATA_ID, BLE_ADDRESS, protocol);
        device.set_classic_address(Some(CLASSIC_ADDRESS.to_string()));
        device.set_version(Some(DeviceFastPairVersion::HigherThanV1));
        Arc::new(device)
    }

    /// Seed a completed handshake sharing the provider GATT client.
    pub fn seed_handshake(&self, device: &FastPairDevice) {
        self.handshakes.insert(
            device,
            FakeHandshake::new(true, FakeDataEncryptor::new(), self.gatt.clone()),
        );
    }

    /// Classic device already known to the adapter.
    pub fn known_classic_device(&self) -> Arc<FakeBluetoothDevice> {
        let device = FakeBluetoothDevice::new(CLASSIC_ADDRESS, PASSKEY);
        self.adapter.add_device(device.clone());
        device
    }

    /// Classic device reachable only by connecting to its address.
    pub fn connectable_classic_device(&self) -> Arc<FakeBluetoothDevice> {
        let device = FakeBluetoothDevice::new(CLASSIC_ADDRESS, PASSKEY);
        self.adapter.add_connectable(device.clone());
        device
    }

    /// Start a pairer reporting to [`TestBed::recorder`].
    pub fn start(&self, device: Arc<FastPairDevice>, config: PairerConfig) -> FastPairPairer {
        self.start_with(device, config, self.recorder.callbacks())
    }

    pub fn start_with(
        &self,
        device: Arc<FastPairDevice>,
        config: PairerConfig,
        callbacks: PairerCallbacks,
    ) -> FastPairPairer {
        FastPairPairer::start(device, self.deps(), config, callbacks)
    }
}

/// Run a complete pairing for a device with the given protocol and return
/// the callbacks that fired.
///
/// The classic device is known to the adapter for subsequent pairing,
/// reachable by address for initial pairing and already bonded for
/// retroactive pairing.
pub async fn run_pairing_flow(bed: &TestBed, protocol: Protocol) -> Vec<CallbackEvent> {
    match protocol {
        Protocol::Initial => {
            bed.connectable_classic_device();
        }
        Protocol::Subsequent => {
            bed.known_classic_device();
        }
        Protocol::Retroactive => {
            bed.known_classic_device().set_bonded(true);
        }
    }

    let pairer = bed.start(bed.device(protocol), PairerConfig::default());
    pairer.wait_for_completion().await;
    bed.recorder.events()
}
