//! Identifier aliases and prediction-key derivation.

// ============================================================================
// Type Aliases
// ============================================================================

/// A participant in the simulation (requester or authority).
pub type ParticipantId = String;

/// Caller-supplied request correlator, echoed unchanged in every result.
pub type CorrelationId = String;

/// Correlator binding one speculative execution to its authoritative outcome.
pub type PredictionKey = String;

// ============================================================================
// Key Derivation
// ============================================================================

/// Derive the prediction key for a request. Both the speculating participant
/// and the authority compute the same key from the same inputs, so no key
/// ever travels on the wire by itself.
pub fn prediction_key(requester: &str, correlation: &str) -> PredictionKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(requester.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(correlation.as_bytes());
    hasher.finalize().to_hex().to_string()
}
