//! Passphrase wrapping of the data key.
//!
//! A [`WrappedBundle`] is the only persisted form of the data key. It carries
//! everything needed to re-derive the KEK except the passphrase itself, so the
//! server that stores it can never recover the key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cipher::IV_SIZE;
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{KdfParams, derive_kek};
use crate::key::{DataKey, SALT_SIZE, Salt, random_bytes};

/// Bundle format version written by [`wrap_data_key`].
pub const BUNDLE_VERSION: u32 = 1;

/// Passphrase-protected envelope around a data key.
///
/// Immutable once created; a new bundle replaces an old one wholesale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedBundle {
    /// AES-GCM ciphertext of the raw key bytes, tag appended.
    #[serde(with = "crate::encoding::base64_bytes")]
    pub wrapped_key: Vec<u8>,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub salt: Vec<u8>,
    pub version: u32,
}

impl WrappedBundle {
    /// Content fingerprint (hex SHA-256) used to compare two copies of a
    /// bundle without exposing anything about the key.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.to_be_bytes());
        hasher.update(&self.salt);
        hasher.update(&self.iv);
        hasher.update(&self.wrapped_key);
        hex::encode(hasher.finalize())
    }
}

/// Wraps a data key under a passphrase.
///
/// Draws a fresh salt and IV on every call, so wrapping the same key twice
/// never yields the same bundle.
pub fn wrap_data_key(data_key: &DataKey, passphrase: &str) -> CryptoResult<WrappedBundle> {
    let salt = Salt::random();
    let iv: [u8; IV_SIZE] = random_bytes();
    let params = KdfParams::for_version(BUNDLE_VERSION)?;

    let kek = derive_kek(passphrase, &salt, &params)?;
    let wrapped_key = kek.wrap_key(data_key, &iv)?;

    Ok(WrappedBundle {
        wrapped_key,
        iv: iv.to_vec(),
        salt: salt.as_bytes().to_vec(),
        version: BUNDLE_VERSION,
    })
}

/// Recovers the data key from a bundle.
///
/// A wrong passphrase is indistinguishable from tampering: both fail the
/// AES-GCM tag check with [`CryptoError::Decryption`].
pub fn unwrap_data_key(bundle: &WrappedBundle, passphrase: &str) -> CryptoResult<DataKey> {
    let params = KdfParams::for_version(bundle.version)?;
    if bundle.iv.len() != IV_SIZE {
        return Err(CryptoError::InvalidLength {
            field: "iv",
            expected: IV_SIZE,
            actual: bundle.iv.len(),
        });
    }
    if bundle.salt.len() != SALT_SIZE {
        return Err(CryptoError::InvalidLength {
            field: "salt",
            expected: SALT_SIZE,
            actual: bundle.salt.len(),
        });
    }

    let salt = Salt::from_slice(&bundle.salt)?;
    let kek = derive_kek(passphrase, &salt, &params)?;
    kek.unwrap_key(&bundle.wrapped_key, &bundle.iv)
}
