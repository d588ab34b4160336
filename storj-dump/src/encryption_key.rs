//! Storj-style encryption key.

use crate::crypto::{self, KEY_LEN};
use crate::{Error, Result};

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A symmetric key used for deriving the keys that encrypt objects' data.
///
/// The key material is zeroed when the instance drops and it's never printed by its [`Debug`]
/// implementation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    /// Derives a salted encryption key from a passphrase.
    ///
    /// The same passphrase and salt always derive the same key. Satellites hand out a
    /// project-based salt so that every client of a project arrives to the same key.
    ///
    /// It returns a [`KeyDerivationFailed` error](Error::KeyDerivationFailed) when `passphrase`
    /// or `salt` are empty.
    pub fn derive(passphrase: &str, salt: &[u8]) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(Error::KeyDerivationFailed(String::from(
                "the passphrase cannot be empty",
            )));
        }

        if salt.is_empty() {
            return Err(Error::KeyDerivationFailed(String::from(
                "the salt cannot be empty",
            )));
        }

        Ok(Self {
            bytes: crypto::derive_from_passphrase(passphrase.as_bytes(), salt),
        })
    }

    /// Derives the key of a child path component.
    pub(crate) fn derive_child(&self, component: &str) -> Self {
        Self {
            bytes: crypto::hmac_sha256(&self.bytes, component.as_bytes()),
        }
    }

    /// Borrows the raw key bytes for sealing and opening data.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}
