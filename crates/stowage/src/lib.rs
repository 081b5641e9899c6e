pub mod engine;

pub use engine::{
    mint_item_id, AddItemSource, AllowAllPermissions, Container, ContainerError,
    ContainerRegistry, Delta, DeltaLedger, EngineConfig, EngineEvent, EngineEventKind,
    EngineJournal, ExecutionContext, ExecutionPhase, ItemCatalog, ItemDefinition, ItemInstance,
    ItemStore, ItemStoreError, NullWorldSpawner, OccupiedPolicy, OccupiedSlotBehavior, Operation,
    OperationEnvelope, PermissionAction, PermissionOracle, PersistError, Placement,
    PredictionCoordinator, PredictionRecord, RejectReason, RemoveDisposition, SlotContainer,
    SlotContainerConfig, SlotDescriptor, SlotMutation, SlotRef, SlotShape, SpawnRequest,
    SubmitOutcome, TagBounds, TagStacks, TransactionEngine, TransactionRequest, WorldSpawner,
    DEFAULT_MAX_OPERATIONS_PER_REQUEST, DEFAULT_RECONCILIATION_TIMEOUT_TICKS, JOURNAL_VERSION,
    TAG_CHARGES, TAG_COUNT, TAG_DURABILITY,
};

pub use engine::{
    ContainerId, DefinitionId, EngineTime, EventId, ItemId, TagName,
};

pub use stowage_proto::{
    prediction_key, AuthorityFailureNotice, CorrelationId, ParticipantId, PredictionKey,
    ReconciliationSignal, ReconciliationVerdict, TransactionOutcome, TransactionResult,
};
