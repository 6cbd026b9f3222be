//! Host platform contracts the pairer drives: the Bluetooth adapter, classic
//! devices, the system pairing dialog and the login state.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::delegate::PairingDelegate;
use crate::errors::ConnectErrorCode;
use crate::types::{AddressType, LoginStatus};

/// Priority a pairing delegate is registered with on the adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingDelegatePriority {
    Low,
    High,
}

/// A device known to the host's Bluetooth stack.
#[async_trait]
pub trait BluetoothDevice: Send + Sync {
    /// Current stack address; may differ from the one seen at discovery.
    fn address(&self) -> String;

    fn is_bonded(&self) -> bool;

    /// Start classic bonding. Pairing prompts are delivered to `delegate`;
    /// the future resolves once bonding settles.
    async fn pair(&self, delegate: PairingDelegate) -> Result<(), ConnectErrorCode>;

    /// Tell the bonding layer the displayed passkey was verified.
    fn confirm_pairing(&self);

    fn cancel_pairing(&self);
}

/// The host's Bluetooth adapter.
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    fn get_device(&self, address: &str) -> Option<Arc<dyn BluetoothDevice>>;

    /// Connect to an address the adapter has not resolved to a device yet.
    /// Pairing prompts go to the registered pairing delegates.
    async fn connect_device(
        &self,
        address: &str,
        address_type: Option<AddressType>,
    ) -> Result<Arc<dyn BluetoothDevice>, String>;

    fn add_pairing_delegate(&self, delegate: PairingDelegate, priority: PairingDelegatePriority);

    fn remove_pairing_delegate(&self, delegate: &PairingDelegate);
}

/// System Bluetooth pairing UI, used for V1 providers.
pub trait SystemPairingUi: Send + Sync {
    fn show_pairing_dialog(&self, ble_address: &str);
}

/// Source of the current login status.
pub trait LoginStatusSource: Send + Sync {
    fn login_status(&self) -> LoginStatus;
}
