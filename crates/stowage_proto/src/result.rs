//! Transaction outcomes and the result value every submission terminates in.

use serde::{Deserialize, Serialize};

use crate::ids::{CorrelationId, ParticipantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOutcome {
    Success,
    FailedValidation,
    FailedAuthorityRejected,
    FailedActivationRejected,
    FailedTimeout,
}

impl TransactionOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, TransactionOutcome::Success)
    }
}

/// The terminal value of one transaction. The correlation id is always the
/// caller's, unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub outcome: TransactionOutcome,
    pub correlation: CorrelationId,
    pub message: String,
    pub instigator: ParticipantId,
}

impl TransactionResult {
    pub fn success(correlation: impl Into<String>, instigator: impl Into<String>) -> Self {
        Self {
            outcome: TransactionOutcome::Success,
            correlation: correlation.into(),
            message: String::new(),
            instigator: instigator.into(),
        }
    }

    pub fn failed(
        outcome: TransactionOutcome,
        correlation: impl Into<String>,
        instigator: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            outcome,
            correlation: correlation.into(),
            message: message.into(),
            instigator: instigator.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}
