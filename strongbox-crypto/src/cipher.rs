//! AES-256-GCM authenticated encryption.
//!
//! Every call draws a fresh 96-bit IV; an IV is never reused under the same
//! key. A failed tag check surfaces as [`CryptoError::Decryption`] and never
//! as an empty plaintext.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::key::{DataKey, KEY_SIZE, random_bytes};

/// AES-GCM IV size in bytes.
pub const IV_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Ciphertext plus the IV it was produced with. Both fields serialize as
/// base64.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedText {
    #[serde(with = "crate::encoding::base64_bytes")]
    pub cipher: Vec<u8>,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub iv: Vec<u8>,
}

pub(crate) fn seal(
    key: &[u8; KEY_SIZE],
    iv: &[u8; IV_SIZE],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::Encryption(format!("invalid key: {e}")))?;
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

pub(crate) fn open(key: &[u8; KEY_SIZE], iv: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if iv.len() != IV_SIZE {
        return Err(CryptoError::InvalidLength {
            field: "iv",
            expected: IV_SIZE,
            actual: iv.len(),
        });
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::Decryption(format!("invalid key: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| {
            CryptoError::Decryption("authentication failed (wrong key or tampered data)".into())
        })
}

/// Encrypts raw bytes with a data key under a fresh IV.
pub fn encrypt_bytes(key: &DataKey, plaintext: &[u8]) -> CryptoResult<EncryptedText> {
    let iv: [u8; IV_SIZE] = random_bytes();
    let cipher = seal(key.as_bytes(), &iv, plaintext)?;
    Ok(EncryptedText {
        cipher,
        iv: iv.to_vec(),
    })
}

/// Decrypts raw bytes produced by [`encrypt_bytes`].
pub fn decrypt_bytes(key: &DataKey, encrypted: &EncryptedText) -> CryptoResult<Vec<u8>> {
    open(key.as_bytes(), &encrypted.iv, &encrypted.cipher)
}

/// Encrypts a UTF-8 string.
pub fn encrypt_text(key: &DataKey, plaintext: &str) -> CryptoResult<EncryptedText> {
    encrypt_bytes(key, plaintext.as_bytes())
}

/// Decrypts a string produced by [`encrypt_text`].
pub fn decrypt_text(key: &DataKey, encrypted: &EncryptedText) -> CryptoResult<String> {
    let bytes = decrypt_bytes(key, encrypted)?;
    String::from_utf8(bytes).map_err(|_| CryptoError::InvalidUtf8)
}
