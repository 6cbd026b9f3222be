//! Fast Pair pairer state machine.
//!
//! One [`FastPairPairer`] drives one pairing attempt for one device:
//! handshake reuse or creation, classic bonding, passkey exchange and
//! verification, and account key provisioning.
//!
//! The attempt runs as a single tokio task. Every collaborator call is
//! spawned into a `JoinSet` owned by that task and its completion comes back
//! as a [`SessionEvent`]; prompts from the Bluetooth stack arrive through the
//! [`PairingDelegate`] inbox. Events are handled one at a time, so the state
//! machine itself needs no locking. Dropping the pairer aborts the task,
//! which cancels every in-flight operation and closes the delegate.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    callbacks::PairerCallbacks,
    config::PairerConfig,
    delegate::PairingDelegate,
    errors::{AccountKeyFailure, PairFailure, PairerError},
    handshake::{GattServiceClient, Handshake, HandshakeLookup},
    keys::{generate_account_key, AccountKey},
    metrics::{AccountKeySkipReason, BondMethod, MetricsSink, PairerMetric},
    platform::{BluetoothAdapter, BluetoothDevice, LoginStatusSource, SystemPairingUi},
    store::AccountKeyStore,
    types::{
        AddressType, DecryptedPasskey, DeviceFastPairVersion, FastPairDevice,
        FastPairMessageType, OptInStatus, Protocol,
    },
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Public Types
// ============================================================================

/// Phase of a pairing attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairerState {
    Created,
    AwaitingHandshake,
    /// V1 device handed to the system pairing dialog
    AwaitingSystemPairing,
    Bonding,
    AwaitingPasskeyConfirm,
    AwaitingPasskeyWriteResponse,
    AwaitingPasskeyDecrypt,
    AwaitingDeviceConfirm,
    AwaitingAccountKeyDecision,
    AwaitingAccountKeyWrite,
    /// Terminal, reached through any terminal callback
    Complete,
}

impl PairerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PairerState::Complete)
    }

    /// Whether a paired notification can still move this attempt forward.
    pub fn awaits_bond(self) -> bool {
        matches!(
            self,
            PairerState::AwaitingSystemPairing
                | PairerState::Bonding
                | PairerState::AwaitingPasskeyConfirm
                | PairerState::AwaitingPasskeyWriteResponse
                | PairerState::AwaitingPasskeyDecrypt
                | PairerState::AwaitingDeviceConfirm
        )
    }
}

/// Collaborators a pairer needs, injected per attempt.
#[derive(Clone)]
pub struct PairerDeps {
    pub adapter: Arc<dyn BluetoothAdapter>,
    pub handshakes: Arc<dyn HandshakeLookup>,
    pub account_keys: Arc<dyn AccountKeyStore>,
    pub login: Arc<dyn LoginStatusSource>,
    pub pairing_ui: Arc<dyn SystemPairingUi>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// Check a decrypted passkey response against the passkey we sent.
///
/// Checks run in order and stop at the first failure: decryption, message
/// type, then passkey value.
pub fn validate_passkey_response(
    payload: Option<&DecryptedPasskey>,
    expected_passkey: u32,
) -> Result<(), PairFailure> {
    let payload = payload.ok_or(PairFailure::PasskeyDecryptFailure)?;
    if payload.message_type != FastPairMessageType::ProvidersPasskey {
        return Err(PairFailure::IncorrectPasskeyResponseType);
    }
    if payload.passkey != expected_passkey {
        return Err(PairFailure::PasskeyMismatch);
    }
    Ok(())
}

// ============================================================================
// Session Events
// ============================================================================

/// Everything that can happen to a running pairer.
pub(crate) enum SessionEvent {
    HandshakeComplete(Result<(), PairFailure>),
    BondResult {
        method: BondMethod,
        result: Result<(), PairFailure>,
    },
    BondTimeout,
    ConfirmPasskey {
        device: Arc<dyn BluetoothDevice>,
        passkey: u32,
    },
    PasskeyResponse {
        expected: u32,
        result: Result<Bytes, PairFailure>,
    },
    PasskeyDecrypted {
        expected: u32,
        payload: Option<DecryptedPasskey>,
    },
    DevicePairedChanged {
        address: String,
        paired: bool,
    },
    OptInChecked(OptInStatus),
    DeviceSavedToAccount(bool),
    AccountKeyWritten {
        account_key: AccountKey,
        result: Result<(), AccountKeyFailure>,
    },
}

// ============================================================================
// Pairer Handle
// ============================================================================

/// Owner handle for one pairing attempt.
///
/// Dropping it cancels the attempt: in-flight operations are aborted and no
/// callback fires afterwards.
pub struct FastPairPairer {
    device: Arc<FastPairDevice>,
    delegate: PairingDelegate,
    state: watch::Receiver<PairerState>,
    task: Option<JoinHandle<()>>,
}

impl FastPairPairer {
    /// Start pairing `device`. Must be called from within a tokio runtime.
    pub fn start(
        device: Arc<FastPairDevice>,
        deps: PairerDeps,
        config: PairerConfig,
        callbacks: PairerCallbacks,
    ) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PairerState::Created);
        let delegate = PairingDelegate::new(id, inbox_tx);

        let span = info_span!(
            "fastpair_pairer",
            session = id,
            device = %device.ble_address()
        );
        let session = PairerSession {
            device: device.clone(),
            deps,
            config,
            callbacks,
            delegate: delegate.clone(),
            delegate_registered: false,
            inbox: inbox_rx,
            tasks: JoinSet::new(),
            state: PairerState::Created,
            state_tx,
            handshake: None,
            gatt: None,
            pending_peripheral_address: None,
            bond_timer: None,
        };
        let task = tokio::spawn(session.run().instrument(span));

        Self {
            device,
            delegate,
            state: state_rx,
            task: Some(task),
        }
    }

    pub fn device(&self) -> &Arc<FastPairDevice> {
        &self.device
    }

    pub fn state(&self) -> PairerState {
        *self.state.borrow()
    }

    /// Wait until the attempt reaches a terminal state, or its task ends.
    pub async fn wait_for_completion(&self) -> PairerState {
        let mut state = self.state.clone();
        let reached = state.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        reached.unwrap_or_else(|_| *state.borrow())
    }

    /// Delegate handle to register with the Bluetooth stack.
    pub fn pairing_delegate(&self) -> PairingDelegate {
        self.delegate.clone()
    }

    /// Forward an adapter paired-state notification.
    pub fn device_paired_changed(
        &self,
        device: &dyn BluetoothDevice,
        paired: bool,
    ) -> Result<(), PairerError> {
        self.delegate.device_paired_changed(device, paired)
    }

    /// Cancel the attempt and wait for its task to wind down.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for FastPairPairer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// Session Task
// ============================================================================

struct PairerSession {
    device: Arc<FastPairDevice>,
    deps: PairerDeps,
    config: PairerConfig,
    callbacks: PairerCallbacks,
    delegate: PairingDelegate,
    delegate_registered: bool,
    inbox: mpsc::UnboundedReceiver<SessionEvent>,
    tasks: JoinSet<SessionEvent>,
    state: PairerState,
    state_tx: watch::Sender<PairerState>,
    handshake: Option<Arc<dyn Handshake>>,
    gatt: Option<Arc<dyn GattServiceClient>>,
    /// Stack address at confirm time; it can change after discovery
    pending_peripheral_address: Option<String>,
    /// Armed while holding the timer task's handle
    bond_timer: Option<AbortHandle>,
}

impl PairerSession {
    async fn run(mut self) {
        self.begin();

        while !self.state.is_terminal() {
            let event = tokio::select! {
                Some(event) = self.inbox.recv() => event,
                Some(joined) = self.tasks.join_next() => match joined {
                    Ok(event) => event,
                    Err(e) if e.is_cancelled() => continue,
                    Err(e) => {
                        error!(error = %e, "pairing operation panicked");
                        continue;
                    }
                },
                else => break,
            };
            self.handle_event(event);
        }

        debug!(state = ?self.state, "pairing session finished");
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::HandshakeComplete(result) => self.on_handshake_complete(result),
            SessionEvent::BondResult { method, result } => self.on_bond_result(method, result),
            SessionEvent::BondTimeout => self.on_bond_timeout(),
            SessionEvent::ConfirmPasskey { device, passkey } => {
                self.confirm_passkey(device, passkey)
            }
            SessionEvent::PasskeyResponse { expected, result } => {
                self.on_passkey_response(expected, result)
            }
            SessionEvent::PasskeyDecrypted { expected, payload } => {
                self.on_passkey_decrypted(expected, payload)
            }
            SessionEvent::DevicePairedChanged { address, paired } => {
                self.device_paired_changed(&address, paired)
            }
            SessionEvent::OptInChecked(status) => self.on_opt_in_checked(status),
            SessionEvent::DeviceSavedToAccount(saved) => self.on_device_saved_to_account(saved),
            SessionEvent::AccountKeyWritten {
                account_key,
                result,
            } => self.on_account_key_written(account_key, result),
        }
    }

    // -------------------------------------------------------------------------
    // Handshake
    // -------------------------------------------------------------------------

    fn begin(&mut self) {
        if self.device.version() == Some(DeviceFastPairVersion::V1) {
            info!("V1 device, handing off to system pairing dialog");
            self.set_state(PairerState::AwaitingSystemPairing);
            self.deps
                .pairing_ui
                .show_pairing_dialog(self.device.ble_address());
            self.deps.metrics.record(PairerMetric::SystemPairingDialogShown);
            return;
        }

        self.set_state(PairerState::AwaitingHandshake);
        match self.deps.handshakes.get(&self.device) {
            Some(handshake) if handshake.completed_successfully() => {
                info!("reusing existing handshake");
                self.deps.metrics.record(PairerMetric::HandshakeReused);
                self.on_handshake_complete(Ok(()));
            }
            Some(_) => {
                warn!("discarding handshake left over from a failed attempt");
                self.deps.handshakes.erase(&self.device);
                self.create_handshake();
            }
            None => self.create_handshake(),
        }
    }

    fn create_handshake(&mut self) {
        self.deps.metrics.record(PairerMetric::HandshakeStarted);
        let handshakes = self.deps.handshakes.clone();
        let adapter = self.deps.adapter.clone();
        let device = self.device.clone();
        self.spawn_op(async move {
            SessionEvent::HandshakeComplete(handshakes.create(adapter, device).await)
        });
    }

    fn on_handshake_complete(&mut self, result: Result<(), PairFailure>) {
        if self.state != PairerState::AwaitingHandshake {
            warn!(state = ?self.state, "ignoring stale handshake completion");
            return;
        }

        if let Err(failure) = result {
            self.deps.metrics.record(PairerMetric::HandshakeFailed(failure));
            self.fail_pairing(failure);
            return;
        }

        if self.device.classic_address().is_none() {
            warn!("classic address lost during handshake");
            self.fail_pairing(PairFailure::PairingDeviceLost);
            return;
        }

        let Some(handshake) = self.completed_handshake() else {
            warn!("handshake missing after completion");
            self.fail_pairing(PairFailure::PairingDeviceLost);
            return;
        };

        info!("handshake complete");
        self.callbacks.handshake_complete(self.device.clone());
        self.gatt = Some(handshake.gatt_service_client());
        self.handshake = Some(handshake);
        self.start_pairing();
    }

    fn completed_handshake(&self) -> Option<Arc<dyn Handshake>> {
        self.deps
            .handshakes
            .get(&self.device)
            .filter(|h| h.completed_successfully())
    }

    // -------------------------------------------------------------------------
    // Bonding
    // -------------------------------------------------------------------------

    fn start_pairing(&mut self) {
        match self.device.protocol() {
            Protocol::Initial | Protocol::Subsequent => self.start_bonding(),
            Protocol::Retroactive => {
                info!("retroactive pairing, device is already bonded");
                self.unregister_delegate();
                self.attempt_send_account_key();
            }
        }
    }

    fn start_bonding(&mut self) {
        let Some(classic_address) = self.device.classic_address() else {
            self.fail_pairing(PairFailure::PairingDeviceLost);
            return;
        };

        let known = self.deps.adapter.get_device(&classic_address);
        if known.as_ref().map_or(false, |d| d.is_bonded()) {
            info!("device already bonded, skipping to account key");
            self.deps.metrics.record(PairerMetric::AlreadyBonded);
            self.notify_paired();
            self.attempt_send_account_key();
            return;
        }

        self.set_state(PairerState::Bonding);
        self.arm_bond_timer();

        match known {
            Some(bt_device) => {
                info!("pairing with known device");
                self.deps
                    .metrics
                    .record(PairerMetric::BondingStarted(BondMethod::Pair));
                let delegate = self.delegate.clone();
                self.spawn_op(async move {
                    let result = bt_device.pair(delegate).await.map_err(|code| {
                        warn!(%code, "pair failed");
                        PairFailure::PairingConnect
                    });
                    SessionEvent::BondResult {
                        method: BondMethod::Pair,
                        result,
                    }
                });
            }
            None => {
                info!("device not known to adapter, connecting by address");
                self.register_delegate();
                self.deps
                    .metrics
                    .record(PairerMetric::BondingStarted(BondMethod::ConnectByAddress));
                let adapter = self.deps.adapter.clone();
                self.spawn_op(async move {
                    let result = adapter
                        .connect_device(&classic_address, Some(AddressType::BrEdr))
                        .await
                        .map(|_| ())
                        .map_err(|message| {
                            warn!(%message, "connect by address failed");
                            PairFailure::AddressConnect
                        });
                    SessionEvent::BondResult {
                        method: BondMethod::ConnectByAddress,
                        result,
                    }
                });
            }
        }
    }

    fn on_bond_result(&mut self, method: BondMethod, result: Result<(), PairFailure>) {
        // A result that finds the timer stopped lost the race to the timeout
        // or to a paired notification.
        if !self.disarm_bond_timer() {
            warn!(?method, "ignoring bonding result after timer stopped");
            return;
        }

        self.deps.metrics.record(PairerMetric::BondingResult {
            method,
            success: result.is_ok(),
        });

        match result {
            Ok(()) => {
                info!(?method, "bonding connected, waiting for passkey");
                if self.state == PairerState::Bonding {
                    self.set_state(PairerState::AwaitingPasskeyConfirm);
                }
            }
            Err(failure) => self.fail_pairing(failure),
        }
    }

    fn on_bond_timeout(&mut self) {
        if self.bond_timer.take().is_none() {
            debug!("bond timer fired after being disarmed");
            return;
        }
        warn!(
            timeout_secs = self.config.bond_timeout_secs,
            "timed out waiting for bonding"
        );
        self.deps.metrics.record(PairerMetric::BondTimeout);
        self.fail_pairing(PairFailure::CreateBondTimeout);
    }

    fn arm_bond_timer(&mut self) {
        self.disarm_bond_timer();
        let timeout = self.config.bond_timeout();
        let handle = self.spawn_op(async move {
            tokio::time::sleep(timeout).await;
            SessionEvent::BondTimeout
        });
        self.bond_timer = Some(handle);
    }

    /// Returns whether the timer was running.
    fn disarm_bond_timer(&mut self) -> bool {
        match self.bond_timer.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // Passkey
    // -------------------------------------------------------------------------

    fn confirm_passkey(&mut self, bt_device: Arc<dyn BluetoothDevice>, passkey: u32) {
        if !matches!(
            self.state,
            PairerState::Bonding | PairerState::AwaitingPasskeyConfirm
        ) {
            warn!(state = ?self.state, "ignoring passkey confirmation in unexpected state");
            return;
        }
        self.deps.metrics.record(PairerMetric::PasskeyConfirmRequested);

        // The provider can drop off BLE while the OS is still bonding.
        let Some(handshake) = self.completed_handshake() else {
            warn!("handshake gone before passkey confirmation, cancelling pairing");
            bt_device.cancel_pairing();
            self.fail_pairing(PairFailure::BleDeviceLostMidPair);
            return;
        };

        self.pending_peripheral_address = Some(bt_device.address());

        let gatt = handshake.gatt_service_client();
        let encryptor = handshake.data_encryptor();
        self.gatt = Some(gatt.clone());
        self.handshake = Some(handshake);

        self.set_state(PairerState::AwaitingPasskeyWriteResponse);
        self.spawn_op(async move {
            let result = gatt
                .write_passkey(FastPairMessageType::SeekersPasskey, passkey, encryptor)
                .await;
            SessionEvent::PasskeyResponse {
                expected: passkey,
                result,
            }
        });
    }

    /// `expected` is the passkey we wrote; the provider must echo it back.
    fn on_passkey_response(&mut self, expected: u32, result: Result<Bytes, PairFailure>) {
        if self.state != PairerState::AwaitingPasskeyWriteResponse {
            warn!(state = ?self.state, "ignoring stale passkey response");
            return;
        }

        let response = match result {
            Ok(response) => response,
            Err(failure) => {
                self.fail_pairing(failure);
                return;
            }
        };

        let Some(encryptor) = self.handshake.as_ref().map(|h| h.data_encryptor()) else {
            self.fail_pairing(PairFailure::BleDeviceLostMidPair);
            return;
        };

        self.set_state(PairerState::AwaitingPasskeyDecrypt);
        self.spawn_op(async move {
            let payload = encryptor.parse_decrypted_passkey(response).await;
            SessionEvent::PasskeyDecrypted { expected, payload }
        });
    }

    fn on_passkey_decrypted(&mut self, expected: u32, payload: Option<DecryptedPasskey>) {
        if self.state != PairerState::AwaitingPasskeyDecrypt {
            warn!(state = ?self.state, "ignoring stale decrypted passkey");
            return;
        }

        if let Err(failure) = validate_passkey_response(payload.as_ref(), expected) {
            warn!(%failure, "passkey validation failed");
            self.fail_pairing(failure);
            return;
        }

        let bt_device = self
            .pending_peripheral_address
            .as_deref()
            .and_then(|address| self.deps.adapter.get_device(address));
        let Some(bt_device) = bt_device else {
            warn!("paired device no longer known to adapter");
            self.fail_pairing(PairFailure::PairingDeviceLost);
            return;
        };

        info!("passkey verified, confirming pairing");
        self.deps.metrics.record(PairerMetric::PasskeyValidated);
        self.set_state(PairerState::AwaitingDeviceConfirm);
        bt_device.confirm_pairing();
    }

    fn device_paired_changed(&mut self, address: &str, paired: bool) {
        if !paired || !self.callbacks.paired_pending() {
            return;
        }
        // Only a bond this session is waiting on counts. Retroactive sessions
        // and the account key step never expect one.
        if !self.state.awaits_bond() {
            debug!(state = ?self.state, "ignoring paired change outside bonding");
            return;
        }
        if !self.device.matches_address(address) {
            debug!(%address, "paired change for another device");
            return;
        }

        info!("device paired");
        self.notify_paired();

        if self.device.version() == Some(DeviceFastPairVersion::HigherThanV1) {
            self.unregister_delegate();
            self.attempt_send_account_key();
        } else {
            // V1 providers never receive an account key.
            self.complete();
        }
    }

    fn notify_paired(&mut self) {
        self.disarm_bond_timer();
        self.deps.metrics.record(PairerMetric::Paired);
        self.callbacks.paired(self.device.clone());
    }

    // -------------------------------------------------------------------------
    // Account Key
    // -------------------------------------------------------------------------

    fn attempt_send_account_key(&mut self) {
        self.set_state(PairerState::AwaitingAccountKeyDecision);

        match self.device.protocol() {
            Protocol::Subsequent => {
                info!("subsequent pairing, associating existing account key locally");
                self.deps
                    .account_keys
                    .associate_account_key_locally(&self.device);
                self.deps.metrics.record(PairerMetric::AccountKeySkipped(
                    AccountKeySkipReason::SubsequentPairing,
                ));
                self.update_opt_in_on_association();
                self.complete();
            }
            Protocol::Initial | Protocol::Retroactive => {
                if !self.deps.login.login_status().is_signed_in() {
                    info!("no signed-in user, not writing an account key");
                    self.skip_account_key(AccountKeySkipReason::NotSignedIn);
                    return;
                }

                if self.config.requires_opt_in_before_write() {
                    let store = self.deps.account_keys.clone();
                    self.spawn_op(async move {
                        SessionEvent::OptInChecked(store.check_opt_in_status().await)
                    });
                } else {
                    self.check_device_saved_to_account();
                }
            }
        }
    }

    fn on_opt_in_checked(&mut self, status: OptInStatus) {
        if self.state != PairerState::AwaitingAccountKeyDecision {
            warn!(state = ?self.state, "ignoring stale opt-in status");
            return;
        }

        if status == OptInStatus::OptedIn {
            self.check_device_saved_to_account();
        } else {
            info!(?status, "not opted in to saved devices, not writing an account key");
            self.skip_account_key(AccountKeySkipReason::NotOptedIn);
        }
    }

    fn check_device_saved_to_account(&mut self) {
        let store = self.deps.account_keys.clone();
        let address = self.device.account_lookup_address();
        self.spawn_op(async move {
            SessionEvent::DeviceSavedToAccount(store.is_device_saved_to_account(&address).await)
        });
    }

    fn on_device_saved_to_account(&mut self, saved: bool) {
        if self.state != PairerState::AwaitingAccountKeyDecision {
            warn!(state = ?self.state, "ignoring stale saved-device check");
            return;
        }

        if saved {
            // Writing a new key would replace the one the account already has.
            info!("device already saved to account, not writing an account key");
            self.skip_account_key(AccountKeySkipReason::AlreadySaved);
        } else {
            self.write_account_key();
        }
    }

    fn write_account_key(&mut self) {
        let encryptor = self
            .handshake
            .as_ref()
            .filter(|h| h.completed_successfully())
            .map(|h| h.data_encryptor());
        let (Some(encryptor), Some(gatt)) = (encryptor, self.gatt.clone()) else {
            warn!("no completed handshake for account key write");
            self.fail_account_key(AccountKeyFailure::HandshakeLost);
            return;
        };

        let account_key = generate_account_key();
        self.set_state(PairerState::AwaitingAccountKeyWrite);
        self.spawn_op(async move {
            let result = gatt.write_account_key(account_key, encryptor).await;
            SessionEvent::AccountKeyWritten {
                account_key,
                result,
            }
        });
    }

    fn on_account_key_written(
        &mut self,
        account_key: AccountKey,
        result: Result<(), AccountKeyFailure>,
    ) {
        if self.state != PairerState::AwaitingAccountKeyWrite {
            warn!(state = ?self.state, "ignoring stale account key write result");
            return;
        }

        if let Err(failure) = result {
            self.fail_account_key(failure);
            return;
        }

        info!("account key written");
        self.deps.metrics.record(PairerMetric::AccountKeyWritten);
        self.device.set_account_key(account_key);
        self.deps
            .account_keys
            .associate_account_key(&self.device, &account_key);
        self.update_opt_in_on_association();
        self.complete();
    }

    fn update_opt_in_on_association(&self) {
        if !self.config.opts_in_on_association() {
            return;
        }
        let store = self.deps.account_keys.clone();
        tokio::spawn(
            async move {
                if store.update_opt_in_status(OptInStatus::OptedIn).await {
                    debug!("opt-in status updated");
                } else {
                    warn!("failed to update opt-in status");
                }
            }
            .in_current_span(),
        );
    }

    fn skip_account_key(&mut self, reason: AccountKeySkipReason) {
        self.deps
            .metrics
            .record(PairerMetric::AccountKeySkipped(reason));
        self.complete();
    }

    // -------------------------------------------------------------------------
    // Terminal Transitions
    // -------------------------------------------------------------------------

    fn complete(&mut self) {
        info!("pairing procedure complete");
        self.deps.metrics.record(PairerMetric::ProcedureComplete);
        self.callbacks.procedure_complete(self.device.clone());
        self.set_state(PairerState::Complete);
    }

    fn fail_pairing(&mut self, failure: PairFailure) {
        if !self.callbacks.paired_pending() {
            warn!(%failure, "ignoring pair failure after device paired");
            return;
        }
        warn!(%failure, "pairing failed");
        self.deps.metrics.record(PairerMetric::PairFailure(failure));
        self.callbacks.pair_failed(self.device.clone(), failure);
        self.set_state(PairerState::Complete);
    }

    fn fail_account_key(&mut self, failure: AccountKeyFailure) {
        warn!(%failure, "account key write failed");
        self.deps
            .metrics
            .record(PairerMetric::AccountKeyFailure(failure));
        self.callbacks
            .account_key_failure(self.device.clone(), failure);
        self.set_state(PairerState::Complete);
    }

    // -------------------------------------------------------------------------
    // Plumbing
    // -------------------------------------------------------------------------

    fn set_state(&mut self, state: PairerState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "state transition");
        }
        if state.is_terminal() {
            self.disarm_bond_timer();
            self.unregister_delegate();
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn spawn_op<F>(&mut self, op: F) -> AbortHandle
    where
        F: Future<Output = SessionEvent> + Send + 'static,
    {
        self.tasks.spawn(op.in_current_span())
    }

    fn register_delegate(&mut self) {
        if !self.delegate_registered {
            self.deps
                .adapter
                .add_pairing_delegate(self.delegate.clone(), self.config.delegate_priority);
            self.delegate_registered = true;
        }
    }

    fn unregister_delegate(&mut self) {
        if self.delegate_registered {
            self.deps.adapter.remove_pairing_delegate(&self.delegate);
            self.delegate_registered = false;
        }
    }
}

// Runs on normal exit and when the task is aborted; the JoinSet drop cancels
// whatever is still in flight.
impl Drop for PairerSession {
    fn drop(&mut self) {
        self.unregister_delegate();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
