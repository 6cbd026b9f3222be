//! Inbound surface the Bluetooth stack uses to reach a running pairer.
//!
//! A [`PairingDelegate`] is a cheap, cloneable handle. It is registered with
//! the adapter or passed to `pair()`, and forwards prompts and paired-state
//! changes to the pairer's task. Once the pairer is gone every call is a
//! no-op returning [`PairerError::SessionClosed`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::errors::PairerError;
use crate::pairing::SessionEvent;
use crate::platform::BluetoothDevice;

/// A pairing prompt raised by the Bluetooth stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairingRequest {
    RequestPinCode,
    RequestPasskey,
    DisplayPinCode(String),
    DisplayPasskey(u32),
    KeysEntered(u32),
    AuthorizePairing,
    ConfirmPasskey(u32),
}

impl PairingRequest {
    pub fn name(&self) -> &'static str {
        match self {
            PairingRequest::RequestPinCode => "request_pin_code",
            PairingRequest::RequestPasskey => "request_passkey",
            PairingRequest::DisplayPinCode(_) => "display_pin_code",
            PairingRequest::DisplayPasskey(_) => "display_passkey",
            PairingRequest::KeysEntered(_) => "keys_entered",
            PairingRequest::AuthorizePairing => "authorize_pairing",
            PairingRequest::ConfirmPasskey(_) => "confirm_passkey",
        }
    }
}

/// Handle through which the adapter delivers pairing prompts to one pairer.
#[derive(Clone)]
pub struct PairingDelegate {
    id: u64,
    inbox: mpsc::UnboundedSender<SessionEvent>,
}

impl PairingDelegate {
    pub(crate) fn new(id: u64, inbox: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { id, inbox }
    }

    /// Identity used for registration and removal on the adapter.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the pairer behind this handle is gone.
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    /// Dispatch a pairing prompt. Only passkey confirmation is part of
    /// Fast Pair; every other prompt is a logic error in the caller.
    pub fn handle_request(
        &self,
        device: Arc<dyn BluetoothDevice>,
        request: PairingRequest,
    ) -> Result<(), PairerError> {
        match request {
            PairingRequest::ConfirmPasskey(passkey) => self.confirm_passkey(device, passkey),
            other => {
                error!(
                    delegate = self.id,
                    request = other.name(),
                    device = %device.address(),
                    "unsupported pairing request"
                );
                Err(PairerError::UnsupportedPairingRequest(other.name()))
            }
        }
    }

    pub fn confirm_passkey(
        &self,
        device: Arc<dyn BluetoothDevice>,
        passkey: u32,
    ) -> Result<(), PairerError> {
        self.post(SessionEvent::ConfirmPasskey { device, passkey })
    }

    /// Adapter observer notification for a device's paired state.
    pub fn device_paired_changed(
        &self,
        device: &dyn BluetoothDevice,
        paired: bool,
    ) -> Result<(), PairerError> {
        self.post(SessionEvent::DevicePairedChanged {
            address: device.address(),
            paired,
        })
    }

    fn post(&self, event: SessionEvent) -> Result<(), PairerError> {
        self.inbox.send(event).map_err(|_| {
            debug!(delegate = self.id, "dropping event for closed pairing session");
            PairerError::SessionClosed
        })
    }
}

impl PartialEq for PairingDelegate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PairingDelegate {}

impl fmt::Debug for PairingDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingDelegate")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
