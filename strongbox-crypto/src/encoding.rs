//! Base64 helpers for binary values that cross storage and API boundaries.
//!
//! Every byte field in a serialized bundle or ciphertext uses the standard
//! padded alphabet so browser and server peers can decode it with stock
//! tooling.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::{CryptoError, CryptoResult};

/// Encodes bytes as standard padded base64.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

/// Decodes standard padded base64.
pub fn decode(encoded: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::Encoding(e.to_string()))
}

/// `#[serde(with = "...")]` adapter storing a `Vec<u8>` as a base64 string.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        super::decode(&encoded).map_err(de::Error::custom)
    }
}
