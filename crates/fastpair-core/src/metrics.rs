//! Pairing metrics.
//!
//! Metrics are fire-and-forget: the pairer records them and never waits on
//! or reacts to the sink. Secrets (passkeys, account keys) are never part
//! of a metric.

use std::sync::{Mutex, PoisonError};

use crate::errors::{AccountKeyFailure, PairFailure};

/// How bonding was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondMethod {
    /// `pair()` on a device the adapter already knew
    Pair,
    /// Connect by classic address
    ConnectByAddress,
}

/// Why no account key was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKeySkipReason {
    SubsequentPairing,
    NotSignedIn,
    NotOptedIn,
    AlreadySaved,
}

/// Events recorded over one pairing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairerMetric {
    SystemPairingDialogShown,
    HandshakeReused,
    HandshakeStarted,
    HandshakeFailed(PairFailure),
    AlreadyBonded,
    BondingStarted(BondMethod),
    BondingResult { method: BondMethod, success: bool },
    BondTimeout,
    PasskeyConfirmRequested,
    PasskeyValidated,
    Paired,
    PairFailure(PairFailure),
    AccountKeySkipped(AccountKeySkipReason),
    AccountKeyWritten,
    AccountKeyFailure(AccountKeyFailure),
    ProcedureComplete,
}

impl PairerMetric {
    /// Stable identifier for export.
    pub fn name(&self) -> &'static str {
        match self {
            PairerMetric::SystemPairingDialogShown => "SYSTEM_PAIRING_DIALOG_SHOWN",
            PairerMetric::HandshakeReused => "HANDSHAKE_REUSED",
            PairerMetric::HandshakeStarted => "HANDSHAKE_STARTED",
            PairerMetric::HandshakeFailed(_) => "HANDSHAKE_FAILED",
            PairerMetric::AlreadyBonded => "ALREADY_BONDED",
            PairerMetric::BondingStarted(_) => "BONDING_STARTED",
            PairerMetric::BondingResult { .. } => "BONDING_RESULT",
            PairerMetric::BondTimeout => "BOND_TIMEOUT",
            PairerMetric::PasskeyConfirmRequested => "PASSKEY_CONFIRM_REQUESTED",
            PairerMetric::PasskeyValidated => "PASSKEY_VALIDATED",
            PairerMetric::Paired => "PAIRED",
            PairerMetric::PairFailure(_) => "PAIR_FAILURE",
            PairerMetric::AccountKeySkipped(_) => "ACCOUNT_KEY_SKIPPED",
            PairerMetric::AccountKeyWritten => "ACCOUNT_KEY_WRITTEN",
            PairerMetric::AccountKeyFailure(_) => "ACCOUNT_KEY_FAILURE",
            PairerMetric::ProcedureComplete => "PROCEDURE_COMPLETE",
        }
    }
}

/// Destination for pairer metrics.
pub trait MetricsSink: Send + Sync {
    fn record(&self, metric: PairerMetric);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _metric: PairerMetric) {}
}

/// Keeps every metric in memory, in order.
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    events: Mutex<Vec<PairerMetric>>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PairerMetric> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.name() == name)
            .count()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn record(&self, metric: PairerMetric) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(metric);
    }
}
