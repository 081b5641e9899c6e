//! Container mutation engine: transactions, deltas, and prediction
//! reconciliation.
//!
//! This module is organized into submodules:
//! - `types`: core type definitions (IDs, constants, slot addressing, tags)
//! - `item`: item definitions, instances, and the item store
//! - `container`: the container capability interface and the standard
//!   slot container
//! - `delta`: invertible primitive effects and the per-transaction ledger
//! - `ops`: the five mutation operations (validate/apply)
//! - `executor`: the transaction engine state machine
//! - `prediction`: speculative-execution records and their coordinator
//! - `journal`: engine event journal and persistence

mod container;
mod delta;
mod executor;
mod item;
mod journal;
mod ops;
mod prediction;
mod types;

#[cfg(test)]
mod tests;

pub use container::{
    Container, ContainerError, ContainerRegistry, OccupiedPolicy, SlotContainer,
    SlotContainerConfig, SlotMutation, SlotShape,
};
pub use delta::{Delta, DeltaLedger, Placement};
pub use executor::{
    AllowAllPermissions, EngineConfig, ExecutionContext, ExecutionPhase, NullWorldSpawner,
    PermissionOracle, SpawnRequest, SubmitOutcome, TransactionEngine, WorldSpawner,
};
pub use item::{
    mint_item_id, ItemCatalog, ItemDefinition, ItemInstance, ItemStore, ItemStoreError,
};
pub use journal::{EngineEvent, EngineEventKind, EngineJournal, PersistError};
pub use ops::{
    AddItemSource, Operation, OperationEnvelope, RejectReason, TransactionRequest,
};
pub use prediction::{PredictionCoordinator, PredictionRecord};
pub use types::{
    ContainerId, DefinitionId, EngineTime, EventId, ItemId, OccupiedSlotBehavior,
    PermissionAction, RemoveDisposition, SlotDescriptor, SlotRef, TagBounds, TagName, TagStacks,
    DEFAULT_MAX_OPERATIONS_PER_REQUEST, DEFAULT_RECONCILIATION_TIMEOUT_TICKS, JOURNAL_VERSION,
    TAG_CHARGES, TAG_COUNT, TAG_DURABILITY,
};
