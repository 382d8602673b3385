//! Passphrase key derivation (PBKDF2-HMAC-SHA256).

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::{self, IV_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{DataKey, KEY_SIZE, Salt};

/// PBKDF2 iteration count for version-1 bundles.
pub const DEFAULT_ITERATIONS: u32 = 200_000;

/// Key derivation parameters.
///
/// Iterations are fixed per bundle version and never negotiated with the
/// server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Parameters for a given bundle format version.
    pub fn for_version(version: u32) -> CryptoResult<Self> {
        match version {
            1 => Ok(Self::default()),
            other => Err(CryptoError::UnsupportedVersion(other)),
        }
    }
}

/// Key-encryption key derived from a passphrase.
///
/// Non-extractable: the only things a `Kek` can do are wrap and unwrap a
/// [`DataKey`]. It is never applied to content directly.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Kek {
    key: [u8; KEY_SIZE],
}

impl Kek {
    /// Encrypts the raw data key bytes under this KEK.
    pub fn wrap_key(&self, data_key: &DataKey, iv: &[u8; IV_SIZE]) -> CryptoResult<Vec<u8>> {
        cipher::seal(&self.key, iv, data_key.as_bytes())
    }

    /// Recovers a data key. Fails when the authentication tag does not
    /// verify, which is how a wrong passphrase shows up.
    pub fn unwrap_key(&self, wrapped: &[u8], iv: &[u8]) -> CryptoResult<DataKey> {
        let mut raw = cipher::open(&self.key, iv, wrapped)?;
        let key = DataKey::from_slice(&raw);
        raw.zeroize();
        key
    }
}

/// Derives a KEK from a passphrase and salt.
pub fn derive_kek(passphrase: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<Kek> {
    if params.iterations == 0 {
        return Err(CryptoError::KeyDerivation(
            "iteration count must be non-zero".into(),
        ));
    }
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        passphrase.as_bytes(),
        salt.as_bytes(),
        params.iterations,
        &mut key,
    );
    Ok(Kek { key })
}
