use std::fmt;

use rand_core::{OsRng, RngCore};

/// Length of a Fast Pair account key.
pub const ACCOUNT_KEY_LEN: usize = 16;

/// Leading byte every account key must carry.
pub const ACCOUNT_KEY_TAG: u8 = 0x04;

/// A 16-byte account key written to a provider and saved to the user's account.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountKey([u8; ACCOUNT_KEY_LEN]);

impl AccountKey {
    /// Wrap raw bytes, forcing the tag byte.
    pub fn from_bytes(mut bytes: [u8; ACCOUNT_KEY_LEN]) -> Self {
        bytes[0] = ACCOUNT_KEY_TAG;
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ACCOUNT_KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// Keys never show up in logs.
impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccountKey(..)")
    }
}

/// Generate a fresh account key from the OS RNG.
pub fn generate_account_key() -> AccountKey {
    let mut bytes = [0u8; ACCOUNT_KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    AccountKey::from_bytes(bytes)
}
