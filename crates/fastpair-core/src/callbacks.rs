//! Completion callbacks for one pairing attempt.
//!
//! Each callback fires at most once and is consumed when it fires. A second
//! invocation is a logic error in the pairer: it trips a debug assertion and
//! is otherwise dropped with an error log.

use std::fmt;
use std::sync::Arc;

use tracing::error;

use crate::errors::{AccountKeyFailure, PairFailure};
use crate::types::FastPairDevice;

pub type DeviceCallback = Box<dyn FnOnce(Arc<FastPairDevice>) + Send>;
pub type PairFailedCallback = Box<dyn FnOnce(Arc<FastPairDevice>, PairFailure) + Send>;
pub type AccountKeyFailureCallback = Box<dyn FnOnce(Arc<FastPairDevice>, AccountKeyFailure) + Send>;

/// The five single-shot callbacks of a pairer. Unset callbacks are no-ops.
pub struct PairerCallbacks {
    on_handshake_complete: Option<DeviceCallback>,
    on_paired: Option<DeviceCallback>,
    on_pair_failed: Option<PairFailedCallback>,
    on_account_key_failure: Option<AccountKeyFailureCallback>,
    on_procedure_complete: Option<DeviceCallback>,
}

impl Default for PairerCallbacks {
    fn default() -> Self {
        Self {
            on_handshake_complete: Some(Box::new(|_| {})),
            on_paired: Some(Box::new(|_| {})),
            on_pair_failed: Some(Box::new(|_, _| {})),
            on_account_key_failure: Some(Box::new(|_, _| {})),
            on_procedure_complete: Some(Box::new(|_| {})),
        }
    }
}

impl PairerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_handshake_complete(
        mut self,
        f: impl FnOnce(Arc<FastPairDevice>) + Send + 'static,
    ) -> Self {
        self.on_handshake_complete = Some(Box::new(f));
        self
    }

    pub fn on_paired(mut self, f: impl FnOnce(Arc<FastPairDevice>) + Send + 'static) -> Self {
        self.on_paired = Some(Box::new(f));
        self
    }

    pub fn on_pair_failed(
        mut self,
        f: impl FnOnce(Arc<FastPairDevice>, PairFailure) + Send + 'static,
    ) -> Self {
        self.on_pair_failed = Some(Box::new(f));
        self
    }

    pub fn on_account_key_failure(
        mut self,
        f: impl FnOnce(Arc<FastPairDevice>, AccountKeyFailure) + Send + 'static,
    ) -> Self {
        self.on_account_key_failure = Some(Box::new(f));
        self
    }

    pub fn on_procedure_complete(
        mut self,
        f: impl FnOnce(Arc<FastPairDevice>) + Send + 'static,
    ) -> Self {
        self.on_procedure_complete = Some(Box::new(f));
        self
    }

    // -------------------------------------------------------------------------
    // Invocation (pairer side)
    // -------------------------------------------------------------------------

    pub(crate) fn paired_pending(&self) -> bool {
        self.on_paired.is_some()
    }

    pub(crate) fn handshake_complete(&mut self, device: Arc<FastPairDevice>) {
        if let Some(f) = consume(&mut self.on_handshake_complete, "on_handshake_complete") {
            f(device);
        }
    }

    pub(crate) fn paired(&mut self, device: Arc<FastPairDevice>) {
        if let Some(f) = consume(&mut self.on_paired, "on_paired") {
            f(device);
        }
    }

    pub(crate) fn pair_failed(&mut self, device: Arc<FastPairDevice>, failure: PairFailure) {
        if let Some(f) = consume(&mut self.on_pair_failed, "on_pair_failed") {
            f(device, failure);
        }
    }

    pub(crate) fn account_key_failure(
        &mut self,
        device: Arc<FastPairDevice>,
        failure: AccountKeyFailure,
    ) {
        if let Some(f) = consume(&mut self.on_account_key_failure, "on_account_key_failure") {
            f(device, failure);
        }
    }

    pub(crate) fn procedure_complete(&mut self, device: Arc<FastPairDevice>) {
        if let Some(f) = consume(&mut self.on_procedure_complete, "on_procedure_complete") {
            f(device);
        }
    }
}

fn consume<F>(slot: &mut Option<F>, name: &'static str) -> Option<F> {
    let f = slot.take();
    if f.is_none() {
        error!(callback = name, "callback invoked more than once");
        debug_assert!(false, "{name} invoked more than once");
    }
    f
}

impl fmt::Debug for PairerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairerCallbacks")
            .field("on_handshake_complete", &self.on_handshake_complete.is_some())
            .field("on_paired", &self.on_paired.is_some())
            .field("on_pair_failed", &self.on_pair_failed.is_some())
            .field("on_account_key_failure", &self.on_account_key_failure.is_some())
            .field("on_procedure_complete", &self.on_procedure_complete.is_some())
            .finish()
    }
}
