//! Binary codec helpers for values that cross the transport, plus content
//! digests for at-least-once deduplication.

use serde::de::DeserializeOwned;
use serde::Serialize;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    Serde(String),
    DigestMismatch { expected: String, actual: String },
}

impl From<serde_cbor::Error> for ProtoError {
    fn from(err: serde_cbor::Error) -> Self {
        ProtoError::Serde(err.to_string())
    }
}

impl From<serde_json::Error> for ProtoError {
    fn from(err: serde_json::Error) -> Self {
        ProtoError::Serde(err.to_string())
    }
}

// ============================================================================
// CBOR Helpers
// ============================================================================

pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtoError> {
    Ok(serde_cbor::to_vec(value)?)
}

pub fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtoError> {
    Ok(serde_cbor::from_slice(bytes)?)
}

// ============================================================================
// Digests
// ============================================================================

pub fn digest_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Content digest of a value's canonical CBOR encoding.
pub fn payload_digest<T: Serialize>(value: &T) -> Result<String, ProtoError> {
    Ok(digest_hex(&encode_cbor(value)?))
}

pub fn verify_digest(bytes: &[u8], expected: &str) -> Result<(), ProtoError> {
    let actual = digest_hex(bytes);
    if actual == expected {
        Ok(())
    } else {
        Err(ProtoError::DigestMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
