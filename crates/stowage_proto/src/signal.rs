//! Reconciliation signals delivered from the authority to a speculating
//! participant. Delivery is assumed at-least-once and in-order per key.

use serde::{Deserialize, Serialize};

use crate::ids::PredictionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationVerdict {
    Confirmed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSignal {
    pub key: PredictionKey,
    pub verdict: ReconciliationVerdict,
}

impl ReconciliationSignal {
    pub fn confirmed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            verdict: ReconciliationVerdict::Confirmed,
        }
    }

    pub fn rejected(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            verdict: ReconciliationVerdict::Rejected,
        }
    }
}

/// Explicit failure channel for authority-side validation failures that occur
/// after a locally successful speculation. Independent of the generic reject
/// signal, which is not guaranteed to surface these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityFailureNotice {
    pub key: PredictionKey,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_index: Option<usize>,
}
