//! Integration tests for the pairer state machine.
//!
//! These tests drive a pairer against the harness fakes and cover:
//! - Handshake reuse, replacement and failure
//! - Bonding by `pair()` and by address, including the bond timeout
//! - Passkey verification
//! - Account key decisions and writes
//! - V1 providers and pairer teardown

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fastpair_core::{
    callbacks::PairerCallbacks,
    config::PairerConfig,
    delegate::PairingRequest,
    errors::{AccountKeyFailure, ConnectErrorCode, PairFailure, PairerError},
    handshake::HandshakeLookup,
    harness::{
        CallbackEvent, FakeDataEncryptor, FakeHandshake, FakeHandshakeFactory, TestBed,
        BLE_ADDRESS, CLASSIC_ADDRESS, PASSKEY,
    },
    keys::ACCOUNT_KEY_TAG,
    metrics::{AccountKeySkipReason, PairerMetric},
    pairing::PairerState,
    platform::PairingDelegatePriority,
    store::AccountKeyStore,
    types::{DeviceFastPairVersion, FastPairDevice, FastPairMessageType, LoginStatus, OptInStatus, Protocol},
};

/// Yield to the runtime until `condition` holds.
async fn until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

fn paired_flow() -> Vec<CallbackEvent> {
    vec![
        CallbackEvent::HandshakeComplete,
        CallbackEvent::Paired,
        CallbackEvent::ProcedureComplete,
    ]
}

fn pair_failed(failure: PairFailure) -> Vec<CallbackEvent> {
    vec![
        CallbackEvent::HandshakeComplete,
        CallbackEvent::PairFailed(failure),
    ]
}

// ============================================================================
// Happy Paths
// ============================================================================

/// Test: Unknown classic device is reached by address and gets one account key
#[tokio::test]
async fn connect_by_address_writes_one_tagged_account_key() {
    let bed = TestBed::new();
    bed.connectable_classic_device();
    let device = bed.device(Protocol::Initial);

    let pairer = bed.start(device.clone(), PairerConfig::default());
    assert_eq!(pairer.wait_for_completion().await, PairerState::Complete);

    assert_eq!(bed.recorder.events(), paired_flow());
    assert_eq!(bed.adapter.connect_calls(), 1);
    assert_eq!(
        bed.gatt.passkeys_written(),
        vec![(FastPairMessageType::SeekersPasskey, PASSKEY)]
    );

    let written = bed.gatt.account_keys_written();
    assert_eq!(written.len(), 1);
    let key = written[0];
    assert_eq!(key.as_bytes().len(), 16);
    assert_eq!(key.as_bytes()[0], ACCOUNT_KEY_TAG);
    assert_eq!(device.account_key(), Some(key));
    assert_eq!(bed.store.saved_key(CLASSIC_ADDRESS), Some(key));

    // Delegate is unregistered once the device pairs.
    assert!(bed.adapter.delegates().is_empty());
}

/// Test: Known classic device is bonded with pair()
#[tokio::test]
async fn known_device_is_bonded_with_pair() {
    let bed = TestBed::new();
    let classic = bed.known_classic_device();

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), paired_flow());
    assert_eq!(classic.pair_calls(), 1);
    assert_eq!(classic.confirm_calls(), 1);
    assert_eq!(bed.adapter.connect_calls(), 0);
    assert_eq!(bed.metrics.count("PAIRED"), 1);
    assert_eq!(bed.gatt.account_keys_written().len(), 1);
}

/// Test: Already bonded device skips bonding and the bond timer
#[tokio::test]
async fn already_bonded_device_skips_bonding() {
    let bed = TestBed::new();
    let classic = bed.known_classic_device();
    classic.set_bonded(true);

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), paired_flow());
    assert_eq!(classic.pair_calls(), 0);
    assert_eq!(bed.metrics.count("ALREADY_BONDED"), 1);
    assert_eq!(bed.metrics.count("BONDING_STARTED"), 0);
    assert_eq!(bed.metrics.count("BOND_TIMEOUT"), 0);
    assert_eq!(bed.gatt.account_keys_written().len(), 1);
}

/// Test: Retroactive device already saved to the account gets no new key
#[tokio::test]
async fn retroactive_device_already_saved_is_not_rewritten() {
    let bed = TestBed::new();
    bed.known_classic_device().set_bonded(true);
    let existing = fastpair_core::keys::generate_account_key();
    bed.store.mark_saved(CLASSIC_ADDRESS, existing);

    let pairer = bed.start(bed.device(Protocol::Retroactive), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(
        bed.recorder.events(),
        vec![
            CallbackEvent::HandshakeComplete,
            CallbackEvent::ProcedureComplete
        ]
    );
    assert!(bed.gatt.account_keys_written().is_empty());
    assert_eq!(bed.store.saved_key(CLASSIC_ADDRESS), Some(existing));
    assert!(bed.metrics.events().contains(&PairerMetric::AccountKeySkipped(
        AccountKeySkipReason::AlreadySaved
    )));
}

/// Test: Subsequent pairing associates the existing key locally
#[tokio::test]
async fn subsequent_pairing_associates_locally() {
    let bed = TestBed::new();
    bed.known_classic_device();

    let pairer = bed.start(bed.device(Protocol::Subsequent), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), paired_flow());
    assert!(bed.store.is_locally_associated("718c17"));
    assert!(bed.gatt.account_keys_written().is_empty());
}

// ============================================================================
// Handshake
// ============================================================================

/// Test: A completed handshake is reused without creating a new one
#[tokio::test]
async fn completed_handshake_is_reused() {
    let bed = TestBed::new();
    bed.known_classic_device();
    let device = bed.device(Protocol::Initial);
    bed.seed_handshake(&device);

    let pairer = bed.start(device, PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), paired_flow());
    assert_eq!(bed.factory.created(), 0);
    assert_eq!(bed.metrics.count("HANDSHAKE_REUSED"), 1);
}

/// Test: A handshake left over from a failed attempt is replaced
#[tokio::test]
async fn incomplete_handshake_is_erased_and_recreated() {
    let bed = TestBed::new();
    bed.connectable_classic_device();
    let device = bed.device(Protocol::Initial);
    bed.handshakes.insert(&device, FakeHandshake::incomplete());

    let pairer = bed.start(device.clone(), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), paired_flow());
    assert_eq!(bed.factory.created(), 1);
    let handshake = bed.handshakes.get(&device).expect("handshake cached");
    assert!(handshake.completed_successfully());
}

/// Test: Handshake failure is reported as-is, without onHandshakeComplete
#[tokio::test]
async fn handshake_failure_is_passed_through() {
    let bed = TestBed::with_factory(|_| {
        FakeHandshakeFactory::failing(PairFailure::KeyBasedPairingResponseTimeout)
    });
    bed.known_classic_device();

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(
        bed.recorder.events(),
        vec![CallbackEvent::PairFailed(
            PairFailure::KeyBasedPairingResponseTimeout
        )]
    );
    assert_eq!(bed.metrics.count("HANDSHAKE_FAILED"), 1);
}

/// Test: Handshake that reports success but is not usable loses the device
#[tokio::test]
async fn unusable_handshake_after_success_loses_device() {
    let bed = TestBed::with_factory(|_| FakeHandshakeFactory::yielding_incomplete());
    bed.known_classic_device();

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(
        bed.recorder.events(),
        vec![CallbackEvent::PairFailed(PairFailure::PairingDeviceLost)]
    );
}

/// Test: Losing the classic address during the handshake fails pairing
#[tokio::test]
async fn missing_classic_address_loses_device() {
    let bed = TestBed::new();
    let device = bed.device(Protocol::Initial);
    device.set_classic_address(None);

    let pairer = bed.start(device, PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(
        bed.recorder.events(),
        vec![CallbackEvent::PairFailed(PairFailure::PairingDeviceLost)]
    );
}

// ============================================================================
// Bonding
// ============================================================================

/// Test: Bonding that never settles times out
#[tokio::test(start_paused = true)]
async fn hung_bonding_times_out() {
    let bed = TestBed::new();
    bed.known_classic_device().hang_pairing();

    let started = tokio::time::Instant::now();
    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert!(started.elapsed() >= Duration::from_secs(15));
    assert_eq!(
        bed.recorder.events(),
        pair_failed(PairFailure::CreateBondTimeout)
    );
    assert_eq!(bed.metrics.count("BOND_TIMEOUT"), 1);
    assert_eq!(bed.metrics.count("PAIR_FAILURE"), 1);
}

/// Test: Bond timeout follows configuration and also covers connect-by-address
#[tokio::test(start_paused = true)]
async fn connect_timeout_uses_configured_duration() {
    let bed = TestBed::new();
    bed.connectable_classic_device();
    bed.adapter.hang_connect();
    let config = PairerConfig {
        bond_timeout_secs: 3,
        ..PairerConfig::default()
    };

    let started = tokio::time::Instant::now();
    let pairer = bed.start(bed.device(Protocol::Initial), config);
    pairer.wait_for_completion().await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_secs(15));
    assert_eq!(
        bed.recorder.events(),
        pair_failed(PairFailure::CreateBondTimeout)
    );
    assert!(bed.adapter.delegates().is_empty());
}

/// Test: pair() result arriving after the timeout is dropped
#[tokio::test(start_paused = true)]
async fn late_pair_result_after_timeout_is_ignored() {
    let bed = TestBed::new();
    bed.known_classic_device()
        .fail_pairing_after(ConnectErrorCode::AuthRejected, Duration::from_secs(20));

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(
        bed.recorder.events(),
        pair_failed(PairFailure::CreateBondTimeout)
    );
    assert_eq!(bed.metrics.count("BONDING_RESULT"), 0);
    assert_eq!(bed.metrics.count("PAIR_FAILURE"), 1);
}

/// Test: Connect result arriving after the timeout is dropped
#[tokio::test(start_paused = true)]
async fn late_connect_result_after_timeout_is_ignored() {
    let bed = TestBed::new();
    bed.connectable_classic_device();
    bed.adapter
        .fail_connect_after("page timeout", Duration::from_secs(20));

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(
        bed.recorder.events(),
        pair_failed(PairFailure::CreateBondTimeout)
    );
    assert_eq!(bed.metrics.count("BONDING_RESULT"), 0);
    assert_eq!(bed.metrics.count("PAIR_FAILURE"), 1);
}

/// Test: pair() result just before the timeout stops the timer
#[tokio::test(start_paused = true)]
async fn pair_result_before_timeout_disarms_timer() {
    let bed = TestBed::new();
    bed.known_classic_device()
        .fail_pairing_after(ConnectErrorCode::AuthRejected, Duration::from_secs(14));

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(bed.recorder.events(), pair_failed(PairFailure::PairingConnect));
    assert_eq!(bed.metrics.count("BONDING_RESULT"), 1);
    assert_eq!(bed.metrics.count("BOND_TIMEOUT"), 0);
    assert_eq!(bed.metrics.count("PAIR_FAILURE"), 1);
}

/// Test: pair() failure maps to PairingConnect
#[tokio::test]
async fn pair_error_fails_with_pairing_connect() {
    let bed = TestBed::new();
    bed.known_classic_device()
        .fail_pairing_with(ConnectErrorCode::AuthRejected);

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), pair_failed(PairFailure::PairingConnect));
}

/// Test: Connect-by-address failure maps to AddressConnect
#[tokio::test]
async fn connect_error_fails_with_address_connect() {
    let bed = TestBed::new();
    bed.connectable_classic_device();
    bed.adapter.fail_connect("page timeout");

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), pair_failed(PairFailure::AddressConnect));
}

/// Test: Delegate is registered with the configured priority
#[tokio::test]
async fn delegate_registered_with_configured_priority() {
    let bed = TestBed::new();
    bed.connectable_classic_device();
    bed.adapter.hang_connect();
    let config = PairerConfig {
        delegate_priority: PairingDelegatePriority::Low,
        ..PairerConfig::default()
    };

    let pairer = bed.start(bed.device(Protocol::Initial), config);
    let adapter = bed.adapter.clone();
    until(|| !adapter.delegates().is_empty()).await;

    let delegates = bed.adapter.delegates();
    assert_eq!(delegates.len(), 1);
    assert_eq!(delegates[0].0, pairer.pairing_delegate());
    assert_eq!(delegates[0].1, PairingDelegatePriority::Low);
    assert_eq!(pairer.state(), PairerState::Bonding);

    pairer.shutdown().await;
    assert!(bed.adapter.delegates().is_empty());
}

// ============================================================================
// Passkey
// ============================================================================

/// Test: Provider echoing a different passkey fails the pairing
#[tokio::test]
async fn passkey_mismatch_fails_pairing() {
    let bed = TestBed::new();
    let classic = bed.known_classic_device();
    bed.gatt
        .respond_with(FastPairMessageType::ProvidersPasskey, Some(654321));

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), pair_failed(PairFailure::PasskeyMismatch));
    assert_eq!(classic.confirm_calls(), 0);
}

/// Test: Response type is checked before the passkey value
#[tokio::test]
async fn wrong_response_type_wins_over_mismatch() {
    let bed = TestBed::new();
    bed.known_classic_device();
    bed.gatt
        .respond_with(FastPairMessageType::SeekersPasskey, Some(654321));

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(
        bed.recorder.events(),
        pair_failed(PairFailure::IncorrectPasskeyResponseType)
    );
}

/// Test: Undecryptable response fails with PasskeyDecryptFailure
#[tokio::test]
async fn undecryptable_response_fails_pairing() {
    let bed = TestBed::new();
    bed.known_classic_device();
    let device = bed.device(Protocol::Initial);
    bed.handshakes.insert(
        &device,
        FakeHandshake::new(true, FakeDataEncryptor::failing(), bed.gatt.clone()),
    );

    let pairer = bed.start(device, PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(
        bed.recorder.events(),
        pair_failed(PairFailure::PasskeyDecryptFailure)
    );
}

/// Test: Passkey write failure is passed through
#[tokio::test]
async fn passkey_write_failure_fails_pairing() {
    let bed = TestBed::new();
    bed.known_classic_device();
    bed.gatt
        .fail_passkey_write(PairFailure::PasskeyPairingCharacteristicWrite);

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(
        bed.recorder.events(),
        pair_failed(PairFailure::PasskeyPairingCharacteristicWrite)
    );
}

/// Test: Handshake lost before the passkey prompt cancels pairing
#[tokio::test]
async fn handshake_lost_before_passkey_cancels_pairing() {
    let bed = TestBed::new();
    let classic = bed.known_classic_device();
    let failures = Arc::new(Mutex::new(Vec::new()));

    let handshakes = bed.handshakes.clone();
    let seen = failures.clone();
    let callbacks = PairerCallbacks::new()
        .on_handshake_complete(move |device: Arc<FastPairDevice>| {
            // Simulate the provider dropping off BLE right after the handshake.
            handshakes.erase(&device);
        })
        .on_pair_failed(move |_, failure| seen.lock().unwrap().push(failure));

    let pairer = bed.start_with(bed.device(Protocol::Initial), PairerConfig::default(), callbacks);
    pairer.wait_for_completion().await;

    assert_eq!(
        *failures.lock().unwrap(),
        vec![PairFailure::BleDeviceLostMidPair]
    );
    assert_eq!(classic.cancel_calls(), 1);
    assert!(bed.gatt.passkeys_written().is_empty());
}

// ============================================================================
// Account Key
// ============================================================================

/// Test: No signed-in user means no account key
#[tokio::test]
async fn guest_user_gets_no_account_key() {
    let bed = TestBed::new();
    bed.login.set(LoginStatus::Guest);
    bed.known_classic_device();

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), paired_flow());
    assert!(bed.gatt.account_keys_written().is_empty());
    assert!(bed.metrics.events().contains(&PairerMetric::AccountKeySkipped(
        AccountKeySkipReason::NotSignedIn
    )));
}

/// Test: Strict opt-in skips the write unless opted in
#[tokio::test]
async fn strict_opt_in_requires_opted_in_account() {
    let bed = TestBed::new();
    bed.known_classic_device();
    let config = PairerConfig {
        strict_opt_in: true,
        ..PairerConfig::default()
    };

    let pairer = bed.start(bed.device(Protocol::Initial), config);
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), paired_flow());
    assert!(bed.gatt.account_keys_written().is_empty());
    assert!(bed.metrics.events().contains(&PairerMetric::AccountKeySkipped(
        AccountKeySkipReason::NotOptedIn
    )));
}

/// Test: Strict opt-in with an opted-in account writes the key
#[tokio::test]
async fn strict_opt_in_writes_when_opted_in() {
    let bed = TestBed::new();
    bed.known_classic_device();
    assert!(bed.store.update_opt_in_status(OptInStatus::OptedIn).await);
    let config = PairerConfig {
        strict_opt_in: true,
        ..PairerConfig::default()
    };

    let pairer = bed.start(bed.device(Protocol::Initial), config);
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), paired_flow());
    assert_eq!(bed.gatt.account_keys_written().len(), 1);
    // Strict mode never opts in on the user's behalf.
    tokio::task::yield_now().await;
    assert_eq!(bed.store.opt_in_updates(), vec![OptInStatus::OptedIn]);
}

/// Test: Writing a key implicitly opts the account in
#[tokio::test]
async fn association_opts_in_implicitly() {
    let bed = TestBed::new();
    bed.known_classic_device();

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    pairer.wait_for_completion().await;

    let store = bed.store.clone();
    until(|| !store.opt_in_updates().is_empty()).await;
    assert_eq!(bed.store.opt_in_updates(), vec![OptInStatus::OptedIn]);
}

/// Test: Account key write failure is terminal without onProcedureComplete
#[tokio::test]
async fn account_key_write_failure_is_terminal() {
    let bed = TestBed::new();
    bed.known_classic_device();
    bed.gatt
        .fail_account_key_write(AccountKeyFailure::AccountKeyCharacteristicWrite);
    let device = bed.device(Protocol::Initial);

    let pairer = bed.start(device.clone(), PairerConfig::default());
    assert_eq!(pairer.wait_for_completion().await, PairerState::Complete);

    assert_eq!(
        bed.recorder.events(),
        vec![
            CallbackEvent::HandshakeComplete,
            CallbackEvent::Paired,
            CallbackEvent::AccountKeyFailure(AccountKeyFailure::AccountKeyCharacteristicWrite),
        ]
    );
    assert_eq!(device.account_key(), None);
    assert_eq!(bed.store.saved_count(), 0);
    assert_eq!(bed.metrics.count("PROCEDURE_COMPLETE"), 0);
}

/// Test: Paired notification during a retroactive key write changes nothing
#[tokio::test(start_paused = true)]
async fn retroactive_write_ignores_paired_notification() {
    let bed = TestBed::new();
    let classic = bed.known_classic_device();
    classic.set_bonded(true);
    bed.gatt.delay_account_key_write(Duration::from_millis(100));
    let device = bed.device(Protocol::Retroactive);
    bed.seed_handshake(&device);

    let pairer = bed.start(device.clone(), PairerConfig::default());
    until(|| pairer.state() == PairerState::AwaitingAccountKeyWrite).await;
    pairer.device_paired_changed(&*classic, true).unwrap();
    assert_eq!(pairer.wait_for_completion().await, PairerState::Complete);

    assert_eq!(
        bed.recorder.events(),
        vec![
            CallbackEvent::HandshakeComplete,
            CallbackEvent::ProcedureComplete
        ]
    );
    let written = bed.gatt.account_keys_written();
    assert_eq!(written.len(), 1);
    assert_eq!(device.account_key(), Some(written[0]));
    assert_eq!(bed.metrics.count("PAIRED"), 0);
}

/// Test: Device without a known version completes after pairing
#[tokio::test]
async fn unknown_version_skips_account_key_after_pairing() {
    let bed = TestBed::new();
    bed.known_classic_device();
    let device = bed.device(Protocol::Initial);
    device.set_version(None);

    let pairer = bed.start(device, PairerConfig::default());
    pairer.wait_for_completion().await;

    assert_eq!(bed.recorder.events(), paired_flow());
    assert!(bed.gatt.account_keys_written().is_empty());
}

// ============================================================================
// V1 Providers
// ============================================================================

/// Test: V1 device goes through the system dialog and finishes on pairing
#[tokio::test]
async fn v1_device_uses_system_pairing_dialog() {
    let bed = TestBed::new();
    let classic = bed.known_classic_device();
    let device = bed.device(Protocol::Initial);
    device.set_version(Some(DeviceFastPairVersion::V1));

    let pairer = bed.start(device, PairerConfig::default());
    let ui = bed.pairing_ui.clone();
    until(|| !ui.shown().is_empty()).await;
    assert_eq!(bed.pairing_ui.shown(), vec![BLE_ADDRESS.to_string()]);
    assert_eq!(pairer.state(), PairerState::AwaitingSystemPairing);

    // Unpaired and unrelated notifications are ignored.
    let other = fastpair_core::harness::FakeBluetoothDevice::new("00:00:00:00:00:01", 0);
    pairer.device_paired_changed(&*classic, false).unwrap();
    pairer.device_paired_changed(&*other, true).unwrap();
    pairer.device_paired_changed(&*classic, true).unwrap();
    pairer.wait_for_completion().await;

    assert_eq!(
        bed.recorder.events(),
        vec![CallbackEvent::Paired, CallbackEvent::ProcedureComplete]
    );
    assert_eq!(bed.factory.created(), 0);
    assert!(bed.gatt.account_keys_written().is_empty());
}

// ============================================================================
// Teardown
// ============================================================================

/// Test: Notifications after completion report the closed session
#[tokio::test]
async fn paired_notification_after_completion_reports_closed_session() {
    let bed = TestBed::new();
    let classic = bed.known_classic_device();

    let pairer = bed.start(bed.device(Protocol::Subsequent), PairerConfig::default());
    pairer.wait_for_completion().await;

    let delegate = pairer.pairing_delegate();
    until(|| delegate.is_closed()).await;
    assert_eq!(
        pairer.device_paired_changed(&*classic, true),
        Err(PairerError::SessionClosed)
    );
    assert_eq!(bed.recorder.events(), paired_flow());
}

/// Test: Dropping the pairer silences it and closes its delegate
#[tokio::test]
async fn dropped_pairer_fires_no_more_callbacks() {
    let bed = TestBed::new();
    let classic = bed.known_classic_device();
    classic.hang_pairing();

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    let delegate = pairer.pairing_delegate();
    until(|| classic.pair_calls() == 1).await;
    drop(pairer);

    until(|| delegate.is_closed()).await;
    assert_eq!(
        delegate.confirm_passkey(classic.clone(), PASSKEY),
        Err(PairerError::SessionClosed)
    );
    assert_eq!(bed.recorder.events(), vec![CallbackEvent::HandshakeComplete]);
}

/// Test: Prompts other than passkey confirmation are rejected
#[tokio::test]
async fn unsupported_prompt_is_rejected_without_disturbing_pairing() {
    let bed = TestBed::new();
    let classic = bed.known_classic_device();
    classic.hang_pairing();

    let pairer = bed.start(bed.device(Protocol::Initial), PairerConfig::default());
    until(|| classic.pair_calls() == 1).await;

    let result = pairer
        .pairing_delegate()
        .handle_request(classic.clone(), PairingRequest::DisplayPasskey(1));
    assert_eq!(
        result,
        Err(PairerError::UnsupportedPairingRequest("display_passkey"))
    );
    tokio::task::yield_now().await;
    assert_eq!(pairer.state(), PairerState::Bonding);

    pairer.shutdown().await;
    assert_eq!(bed.recorder.events(), vec![CallbackEvent::HandshakeComplete]);
}
