//! Invertible primitive effects and the per-transaction ledger.

use serde::{Deserialize, Serialize};

use super::types::{ContainerId, ItemId, SlotDescriptor, TagName};

// ============================================================================
// Deltas
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Added,
    Removed,
}

impl Placement {
    pub fn inverted(self) -> Self {
        match self {
            Placement::Added => Placement::Removed,
            Placement::Removed => Placement::Added,
        }
    }
}

/// One recorded primitive effect. Every delta carries enough information to
/// undo itself; the ledger replays them in strict reverse order on rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Delta {
    SlotWrite {
        container: ContainerId,
        slot: SlotDescriptor,
        item: ItemId,
        placement: Placement,
    },
    TagWrite {
        item: ItemId,
        tag: TagName,
        old: i64,
        new: i64,
    },
    /// An identity instantiated mid-transaction. Reverse replay frees it
    /// entirely; there is no slot or counter to restore.
    Instantiated { item: ItemId },
}

impl Delta {
    /// The delta that undoes this one. `Instantiated` has no structural
    /// inverse; the rollback driver frees the identity directly.
    pub fn inverted(&self) -> Delta {
        match self {
            Delta::SlotWrite {
                container,
                slot,
                item,
                placement,
            } => Delta::SlotWrite {
                container: container.clone(),
                slot: slot.clone(),
                item: item.clone(),
                placement: placement.inverted(),
            },
            Delta::TagWrite {
                item,
                tag,
                old,
                new,
            } => Delta::TagWrite {
                item: item.clone(),
                tag: tag.clone(),
                old: *new,
                new: *old,
            },
            Delta::Instantiated { item } => Delta::Instantiated { item: item.clone() },
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Append-only record of one transaction's effects, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeltaLedger {
    pub deltas: Vec<Delta>,
}

impl DeltaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: Delta) {
        self.deltas.push(delta);
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Delta> {
        self.deltas.iter()
    }
}
