//! Encryption primitives for Strongbox.
//!
//! Provides the building blocks of a passphrase-protected vault:
//! - PBKDF2-HMAC-SHA256 for deriving a key-encryption key (KEK)
//! - AES-256-GCM for authenticated encryption
//! - Zeroized, in-memory-only data keys
//!
//! # Architecture
//!
//! The vault uses a two-tier key system:
//!
//! 1. **Data Key**: A random 256-bit key that encrypts content. It exists
//!    only in memory and is never serialized.
//!
//! 2. **KEK**: Derived from the user's passphrase and a per-bundle salt.
//!    It only wraps and unwraps the data key and is never applied to
//!    content.
//!
//! The wrapped data key ([`WrappedBundle`]) is what gets persisted locally
//! and remotely. There is deliberately no passphrase verifier: the AES-GCM
//! tag check during [`unwrap_data_key`] is the only signal that a
//! passphrase is correct.

mod cipher;
pub mod encoding;
mod error;
mod kdf;
mod key;
mod wrap;

pub use cipher::{
    EncryptedText, IV_SIZE, TAG_SIZE, decrypt_bytes, decrypt_text, encrypt_bytes, encrypt_text,
};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{DEFAULT_ITERATIONS, KdfParams, Kek, derive_kek};
pub use key::{DataKey, KEY_SIZE, SALT_SIZE, Salt, generate_data_key};
pub use wrap::{BUNDLE_VERSION, WrappedBundle, unwrap_data_key, wrap_data_key};
