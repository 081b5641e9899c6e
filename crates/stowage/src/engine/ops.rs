//! The five mutation operations, the transaction request that carries them,
//! and the reject reasons validation can produce.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use stowage_proto::{CorrelationId, ParticipantId};

use super::types::{
    ContainerId, DefinitionId, ItemId, PermissionAction, RemoveDisposition, SlotRef, TagName,
    TagStacks,
};

// ============================================================================
// Operations
// ============================================================================

/// Source of an added item: a fresh instantiation from the catalog, or a
/// live item that currently sits in no container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AddItemSource {
    CreateNew {
        definition: DefinitionId,
        count: i64,
        #[serde(default)]
        initial_tags: TagStacks,
        /// Caller-supplied identity for the new instance. Mandatory while
        /// speculating so the guess and its authoritative twin unify.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_item: Option<ItemId>,
    },
    Existing { item: ItemId },
}

/// The closed operation set. Each variant validates independently and
/// produces invertible deltas when applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Operation {
    Move {
        from: SlotRef,
        to: SlotRef,
    },
    ModifyTagStack {
        item: ItemId,
        tag: TagName,
        delta: i64,
        #[serde(default)]
        clamp: bool,
    },
    SplitStack {
        from: SlotRef,
        to: SlotRef,
        amount: i64,
        /// Identity for the split-off stack; same contract as
        /// `AddItemSource::CreateNew::new_item`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_item: Option<ItemId>,
    },
    RemoveItem {
        from: SlotRef,
        disposition: RemoveDisposition,
        /// Partial removal quantity; absent removes the whole item.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quantity: Option<i64>,
        /// Opaque per-material parameters, forwarded untouched to the
        /// world-spawn collaborator.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        material_params: BTreeMap<String, i64>,
    },
    AddItem {
        to: SlotRef,
        source: AddItemSource,
        #[serde(default)]
        merge_first: bool,
    },
}

impl Operation {
    /// Slot references this operation names directly. Placement-dependent
    /// targets (tag mutation, holding transfers) are resolved by the engine.
    pub fn slot_refs(&self) -> Vec<&SlotRef> {
        match self {
            Operation::Move { from, to } | Operation::SplitStack { from, to, .. } => {
                vec![from, to]
            }
            Operation::ModifyTagStack { .. } => Vec::new(),
            Operation::RemoveItem { from, .. } => vec![from],
            Operation::AddItem { to, .. } => vec![to],
        }
    }
}

fn default_true() -> bool {
    true
}

/// One operation plus its client-side predictability override. A `false`
/// override forces the whole transaction to authority-only execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEnvelope {
    pub op: Operation,
    #[serde(default = "default_true")]
    pub predictable: bool,
}

impl OperationEnvelope {
    pub fn new(op: Operation) -> Self {
        Self {
            op,
            predictable: true,
        }
    }

    pub fn authority_only(op: Operation) -> Self {
        Self {
            op,
            predictable: false,
        }
    }
}

impl From<Operation> for OperationEnvelope {
    fn from(op: Operation) -> Self {
        OperationEnvelope::new(op)
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub correlation: CorrelationId,
    pub requester: ParticipantId,
    pub operations: Vec<OperationEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl TransactionRequest {
    pub fn new(
        correlation: impl Into<String>,
        requester: impl Into<String>,
        operations: impl IntoIterator<Item = Operation>,
    ) -> Self {
        Self {
            correlation: correlation.into(),
            requester: requester.into(),
            operations: operations.into_iter().map(OperationEnvelope::new).collect(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ============================================================================
// Reject Reasons
// ============================================================================

/// Why a transaction was refused. Ordinary data: reasons travel inside
/// results and journal events, they are never panics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RejectReason {
    EmptyTransaction,
    TooManyOperations { count: usize, max: usize },
    RequesterMissing,
    CorrelationMissing,
    MalformedDescriptor { slot: SlotRef },
    ContainerNotFound { container: ContainerId },
    SlotEmpty { slot: SlotRef },
    SlotOccupied { slot: SlotRef },
    CannotAccept { slot: SlotRef, item: ItemId },
    SwapNotAccepted { slot: SlotRef, item: ItemId },
    PermissionDenied {
        container: ContainerId,
        action: PermissionAction,
    },
    ItemNotFound { item: ItemId },
    ItemIdTaken { item: ItemId },
    ItemAlreadyPlaced { item: ItemId },
    ItemPendingDestruction { item: ItemId },
    DefinitionNotFound { definition: DefinitionId },
    TagNotDeclared { item: ItemId, tag: TagName },
    TagOutOfBounds {
        item: ItemId,
        tag: TagName,
        value: i64,
        min: i64,
        max: i64,
    },
    InvalidAmount { amount: i64 },
    SplitOutOfRange { amount: i64, count: i64 },
    NotAStack { item: ItemId },
    NotCombinable { slot: SlotRef },
    CombineOverflow {
        slot: SlotRef,
        count: i64,
        max_stack: i64,
    },
    CorrelationRequired { op_index: usize },
    HoldingUnavailable,
    InternalApplyFailure { message: String },
}
