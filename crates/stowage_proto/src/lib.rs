//! Shared boundary types for the stowage engine: identifiers, reconciliation
//! signals, transaction results, and the wire codec helpers. Everything here
//! crosses the transport between a speculating participant and the authority.

mod codec;
mod ids;
mod result;
mod signal;

pub use codec::{
    decode_cbor, digest_hex, encode_cbor, payload_digest, verify_digest, ProtoError,
};
pub use ids::{prediction_key, CorrelationId, ParticipantId, PredictionKey};
pub use result::{TransactionOutcome, TransactionResult};
pub use signal::{AuthorityFailureNotice, ReconciliationSignal, ReconciliationVerdict};
