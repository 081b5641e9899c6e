//! Speculative-execution records and their coordinator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use stowage_proto::{CorrelationId, ParticipantId, PredictionKey};

use super::delta::DeltaLedger;
use super::types::{EngineTime, ItemId};

// ============================================================================
// Prediction Records
// ============================================================================

/// Everything retained for one unresolved speculation: the ledger to replay
/// in reverse on rejection, the identities the authority may free on
/// confirmation, and the bookkeeping needed to report the eventual result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub key: PredictionKey,
    pub correlation: CorrelationId,
    pub instigator: ParticipantId,
    pub ledger: DeltaLedger,
    pub pending_destruction: Vec<ItemId>,
    pub bound_at: EngineTime,
    /// True for transactions downgraded to authority-only execution: no
    /// local deltas exist, but the key still resolves through the same
    /// signal, failure, and timeout paths.
    pub deferred: bool,
}

impl PredictionRecord {
    pub fn new(
        key: PredictionKey,
        correlation: CorrelationId,
        instigator: ParticipantId,
        ledger: DeltaLedger,
        pending_destruction: Vec<ItemId>,
        bound_at: EngineTime,
    ) -> Self {
        Self {
            key,
            correlation,
            instigator,
            ledger,
            pending_destruction,
            bound_at,
            deferred: false,
        }
    }

    pub fn deferred(
        key: PredictionKey,
        correlation: CorrelationId,
        instigator: ParticipantId,
        bound_at: EngineTime,
    ) -> Self {
        Self {
            key,
            correlation,
            instigator,
            ledger: DeltaLedger::new(),
            pending_destruction: Vec::new(),
            bound_at,
            deferred: true,
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Binds one prediction key to exactly one record and owns that record until
/// an explicit release. Release happens exactly once, on confirmation,
/// rejection, explicit authority failure, or timeout — never on collector
/// timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PredictionCoordinator {
    records: BTreeMap<PredictionKey, PredictionRecord>,
    order: VecDeque<PredictionKey>,
}

impl PredictionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a record under its key. A key that is already bound is refused
    /// and the existing record is kept.
    pub fn bind(&mut self, record: PredictionRecord) -> bool {
        if self.records.contains_key(&record.key) {
            return false;
        }
        self.order.push_back(record.key.clone());
        self.records.insert(record.key.clone(), record);
        true
    }

    pub fn is_bound(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn record(&self, key: &str) -> Option<&PredictionRecord> {
        self.records.get(key)
    }

    pub fn outstanding(&self) -> usize {
        self.records.len()
    }

    pub fn keys(&self) -> Vec<PredictionKey> {
        self.order.iter().cloned().collect()
    }

    /// Release ownership of a key's record. The single point where a record
    /// leaves the coordinator.
    pub fn release(&mut self, key: &str) -> Option<PredictionRecord> {
        let record = self.records.remove(key)?;
        self.order.retain(|bound| bound != key);
        Some(record)
    }

    /// Keys whose records have waited past the timeout budget, oldest first.
    pub fn expired_keys(&self, now: EngineTime, timeout_ticks: u64) -> Vec<PredictionKey> {
        self.order
            .iter()
            .filter(|key| {
                self.records
                    .get(*key)
                    .is_some_and(|record| record.bound_at.saturating_add(timeout_ticks) <= now)
            })
            .cloned()
            .collect()
    }
}
