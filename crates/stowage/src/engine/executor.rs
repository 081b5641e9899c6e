//! Transaction engine: filtering, validation, application, and
//! reconciliation of speculative executions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use stowage_proto::{
    prediction_key, AuthorityFailureNotice, CorrelationId, ParticipantId, PredictionKey,
    ReconciliationSignal, ReconciliationVerdict, TransactionOutcome, TransactionResult,
};

use super::container::{Container, ContainerRegistry, SlotMutation};
use super::delta::{Delta, DeltaLedger, Placement};
use super::item::{ItemCatalog, ItemInstance, ItemStore};
use super::journal::{EngineEvent, EngineEventKind, EngineJournal};
use super::ops::{Operation, RejectReason, TransactionRequest};
use super::prediction::{PredictionCoordinator, PredictionRecord};
use super::types::{
    ContainerId, DefinitionId, EngineTime, ItemId, PermissionAction, RemoveDisposition,
    SlotDescriptor, SlotRef, TagStacks, DEFAULT_MAX_OPERATIONS_PER_REQUEST,
    DEFAULT_RECONCILIATION_TIMEOUT_TICKS,
};

mod apply;
mod validate;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// True on the single participant whose execution is final.
    pub authority: bool,
    pub max_operations_per_request: usize,
    /// Ticks an unresolved speculation may wait before it is treated as
    /// rejected; 0 disables the sweep.
    pub reconciliation_timeout_ticks: u64,
    /// Destination for `TransferToHolding` removals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holding_container: Option<ContainerId>,
    /// Completed results retained for at-least-once request replays.
    pub completed_results_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            authority: false,
            max_operations_per_request: DEFAULT_MAX_OPERATIONS_PER_REQUEST,
            reconciliation_timeout_ticks: DEFAULT_RECONCILIATION_TIMEOUT_TICKS,
            holding_container: None,
            completed_results_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn authority() -> Self {
        Self {
            authority: true,
            ..Self::default()
        }
    }

    pub fn sanitized(mut self) -> Self {
        self.max_operations_per_request = self.max_operations_per_request.max(1);
        self.completed_results_capacity = self.completed_results_capacity.max(1);
        self
    }
}

// ============================================================================
// Execution State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Filtering,
    Validating,
    Applying,
    FinalizedAuthoritative,
    AwaitingReconciliation,
    Confirmed,
    RolledBack,
}

/// Ephemeral per-attempt state threaded through validation and application.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub requester: ParticipantId,
    pub correlation: CorrelationId,
    pub key: PredictionKey,
    pub authority: bool,
    /// True only when every touched container supports speculation and no
    /// envelope opted out.
    pub speculative: bool,
    pub phase: ExecutionPhase,
    pub ledger: DeltaLedger,
    pub pending_destruction: Vec<ItemId>,
    pub spawn_requests: Vec<SpawnRequest>,
}

impl ExecutionContext {
    fn new(request: &TransactionRequest, key: PredictionKey, authority: bool, speculative: bool) -> Self {
        Self {
            requester: request.requester.clone(),
            correlation: request.correlation.clone(),
            key,
            authority,
            speculative,
            phase: ExecutionPhase::Filtering,
            ledger: DeltaLedger::new(),
            pending_destruction: Vec::new(),
            spawn_requests: Vec::new(),
        }
    }
}

// ============================================================================
// External Seams
// ============================================================================

/// Policy oracle consulted during validation, for both ends of a move.
pub trait PermissionOracle {
    fn check_permission(
        &self,
        container: &ContainerId,
        slot: &SlotDescriptor,
        requester: &ParticipantId,
        action: PermissionAction,
    ) -> bool;
}

pub struct AllowAllPermissions;

impl PermissionOracle for AllowAllPermissions {
    fn check_permission(
        &self,
        _container: &ContainerId,
        _slot: &SlotDescriptor,
        _requester: &ParticipantId,
        _action: PermissionAction,
    ) -> bool {
        true
    }
}

/// Payload handed to the world-spawn collaborator when a removal drops
/// content into the world. Fire-and-forget; the outcome never affects
/// transaction atomicity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub definition: DefinitionId,
    pub quantity: i64,
    pub tags: TagStacks,
    /// Opaque per-material parameters from the request payload, uninterpreted.
    pub params: BTreeMap<String, i64>,
    pub origin: SlotRef,
}

pub trait WorldSpawner {
    fn spawn(&mut self, request: SpawnRequest);
}

pub struct NullWorldSpawner;

impl WorldSpawner for NullWorldSpawner {
    fn spawn(&mut self, _request: SpawnRequest) {}
}

// ============================================================================
// Submission Outcome
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The transaction resolved locally: authoritative execution or a local
    /// failure. No reconciliation follows.
    Completed(TransactionResult),
    /// Applied locally; the ledger waits under this key for the authority.
    Speculated { key: PredictionKey },
    /// Downgraded to authority-only execution; nothing applied locally.
    Forwarded { key: PredictionKey },
}

impl SubmitOutcome {
    pub fn result(&self) -> Option<&TransactionResult> {
        match self {
            SubmitOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&PredictionKey> {
        match self {
            SubmitOutcome::Completed(_) => None,
            SubmitOutcome::Speculated { key } | SubmitOutcome::Forwarded { key } => Some(key),
        }
    }
}

// ============================================================================
// Transaction Engine
// ============================================================================

/// Orchestrates validate → apply → finalize/await over the container
/// registry. One engine instance per participant; the registry is handed in
/// at construction.
pub struct TransactionEngine {
    config: EngineConfig,
    registry: ContainerRegistry,
    items: ItemStore,
    catalog: ItemCatalog,
    coordinator: PredictionCoordinator,
    journal: EngineJournal,
    permissions: Box<dyn PermissionOracle>,
    spawner: Box<dyn WorldSpawner>,
    time: EngineTime,
    completed: BTreeMap<PredictionKey, TransactionResult>,
    completed_order: VecDeque<PredictionKey>,
}

impl TransactionEngine {
    pub fn new(config: EngineConfig, registry: ContainerRegistry, catalog: ItemCatalog) -> Self {
        Self {
            config: config.sanitized(),
            registry,
            items: ItemStore::new(),
            catalog,
            coordinator: PredictionCoordinator::new(),
            journal: EngineJournal::new(),
            permissions: Box::new(AllowAllPermissions),
            spawner: Box::new(NullWorldSpawner),
            time: 0,
            completed: BTreeMap::new(),
            completed_order: VecDeque::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Box<dyn PermissionOracle>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_spawner(mut self, spawner: Box<dyn WorldSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    pub fn items(&self) -> &ItemStore {
        &self.items
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut ItemCatalog {
        &mut self.catalog
    }

    pub fn coordinator(&self) -> &PredictionCoordinator {
        &self.coordinator
    }

    pub fn journal(&self) -> &EngineJournal {
        &self.journal
    }

    pub fn events(&self) -> &[EngineEvent] {
        self.journal.events()
    }

    pub fn time(&self) -> EngineTime {
        self.time
    }

    pub fn register_container(&mut self, container: Box<dyn Container>) -> bool {
        self.registry.register(container)
    }

    /// Adopt an externally spawned item without placing it anywhere; it can
    /// enter a container later via `AddItem`. Setup path, not transactional.
    pub fn adopt_loose_item(&mut self, item: ItemInstance) -> Result<(), RejectReason> {
        let item_id = item.id.clone();
        self.items
            .insert(item)
            .map_err(|_| RejectReason::ItemIdTaken { item: item_id })
    }

    /// Adopt an externally spawned item directly into a slot. Setup path for
    /// world bootstrap and replication; not transactional.
    pub fn adopt_item(&mut self, item: ItemInstance, at: SlotRef) -> Result<(), RejectReason> {
        if self.items.resolve(&item.id).is_some() {
            return Err(RejectReason::ItemIdTaken { item: item.id });
        }
        if !self.registry.contains(&at.container) {
            return Err(RejectReason::ContainerNotFound {
                container: at.container,
            });
        }
        let item_id = item.id.clone();
        if self.items.insert(item).is_err() {
            return Err(RejectReason::ItemIdTaken { item: item_id });
        }
        let Some(container) = self.registry.get_mut(&at.container) else {
            return Err(RejectReason::ContainerNotFound {
                container: at.container,
            });
        };
        match container.mutate(SlotMutation::Attach {
            slot: at.slot.clone(),
            item: item_id.clone(),
        }) {
            Ok(_) => {
                self.items.set_placement(&item_id, at);
                Ok(())
            }
            Err(err) => {
                self.items.free(&item_id);
                Err(RejectReason::InternalApplyFailure {
                    message: format!("adopt failed: {err:?}"),
                })
            }
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    pub fn submit(&mut self, request: TransactionRequest) -> SubmitOutcome {
        let key = prediction_key(&request.requester, &request.correlation);

        // At-least-once transport: replaying a completed request returns the
        // recorded result without re-execution.
        if let Some(result) = self.completed.get(&key) {
            return SubmitOutcome::Completed(result.clone());
        }
        if let Some(record) = self.coordinator.record(&key) {
            return if record.deferred {
                SubmitOutcome::Forwarded { key }
            } else {
                SubmitOutcome::Speculated { key }
            };
        }

        // Filtering: cheap, context-free rejection. No ledger exists yet.
        if let Some(reason) = self.filter(&request) {
            let result = self.fail_result(&request, TransactionOutcome::FailedValidation, &reason);
            return SubmitOutcome::Completed(self.finish_local(key, result));
        }

        // Every touched container must resolve before anything else runs.
        let touched = self.touched_containers(&request);
        for container in &touched {
            if !self.registry.contains(container) {
                let reason = RejectReason::ContainerNotFound {
                    container: container.clone(),
                };
                let result =
                    self.fail_result(&request, TransactionOutcome::FailedValidation, &reason);
                return SubmitOutcome::Completed(self.finish_local(key, result));
            }
        }

        // Mixed-capability rule: one container without speculative support —
        // or one envelope opting out — downgrades the whole transaction.
        let all_support = touched.iter().all(|container| {
            self.registry
                .get(container)
                .is_some_and(|c| c.supports_speculative_execution())
        });
        let all_predictable = request.operations.iter().all(|env| env.predictable);
        let speculative = !self.config.authority && all_support && all_predictable;

        if !self.config.authority && !speculative {
            let record = PredictionRecord::deferred(
                key.clone(),
                request.correlation.clone(),
                request.requester.clone(),
                self.time,
            );
            self.coordinator.bind(record);
            self.journal.record(
                self.time,
                EngineEventKind::TransactionForwarded {
                    key: key.clone(),
                    correlation: request.correlation.clone(),
                },
            );
            return SubmitOutcome::Forwarded { key };
        }

        let mut ctx = ExecutionContext::new(&request, key.clone(), self.config.authority, speculative);

        // Validating: the whole batch against current state, zero mutation.
        ctx.phase = ExecutionPhase::Validating;
        for (index, envelope) in request.operations.iter().enumerate() {
            if let Err(reason) = self.validate_operation(&ctx, index, &envelope.op) {
                let result =
                    self.fail_result(&request, TransactionOutcome::FailedValidation, &reason);
                return SubmitOutcome::Completed(self.finish_local(key, result));
            }
        }

        // Applying: operations mutate in array order, deltas append in
        // execution order.
        ctx.phase = ExecutionPhase::Applying;
        for (index, envelope) in request.operations.iter().enumerate() {
            if let Err(reason) = self.apply_operation(&mut ctx, index, &envelope.op) {
                // Should be unreachable after validation; unwind whatever
                // this attempt already produced before reporting.
                let ledger = std::mem::take(&mut ctx.ledger);
                let pending = std::mem::take(&mut ctx.pending_destruction);
                self.unwind(&ledger, &pending);
                let result =
                    self.fail_result(&request, TransactionOutcome::FailedValidation, &reason);
                return SubmitOutcome::Completed(self.finish_local(key, result));
            }
        }

        if ctx.authority {
            ctx.phase = ExecutionPhase::FinalizedAuthoritative;
            for item in &ctx.pending_destruction {
                self.items.finalize_pending(item);
            }
            for spawn in ctx.spawn_requests.drain(..) {
                self.spawner.spawn(spawn);
            }
            let result =
                TransactionResult::success(request.correlation.clone(), request.requester.clone());
            SubmitOutcome::Completed(self.finish_local(key, result))
        } else {
            ctx.phase = ExecutionPhase::AwaitingReconciliation;
            let record = PredictionRecord::new(
                key.clone(),
                request.correlation.clone(),
                request.requester.clone(),
                ctx.ledger,
                ctx.pending_destruction,
                self.time,
            );
            self.coordinator.bind(record);
            self.journal.record(
                self.time,
                EngineEventKind::SpeculationStarted {
                    key: key.clone(),
                    correlation: request.correlation,
                },
            );
            SubmitOutcome::Speculated { key }
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    pub fn apply_signal(&mut self, signal: ReconciliationSignal) -> Option<TransactionResult> {
        match signal.verdict {
            ReconciliationVerdict::Confirmed => self.confirm(&signal.key),
            ReconciliationVerdict::Rejected => self.resolve_rejected(
                &signal.key,
                TransactionOutcome::FailedAuthorityRejected,
                "authority rejected".to_string(),
            ),
        }
    }

    /// Explicit authoritative-failure channel, independent of the generic
    /// reject signal.
    pub fn apply_authority_failure(
        &mut self,
        notice: AuthorityFailureNotice,
    ) -> Option<TransactionResult> {
        self.resolve_rejected(
            &notice.key,
            TransactionOutcome::FailedActivationRejected,
            format!("authority validation failed: {}", notice.reason),
        )
    }

    /// Advance engine time and sweep timed-out speculations. A key that
    /// never resolves is treated as a rejection for cleanup.
    pub fn tick(&mut self) -> Vec<TransactionResult> {
        self.time = self.time.saturating_add(1);
        if self.config.reconciliation_timeout_ticks == 0 {
            return Vec::new();
        }
        let expired = self
            .coordinator
            .expired_keys(self.time, self.config.reconciliation_timeout_ticks);
        expired
            .iter()
            .filter_map(|key| {
                self.resolve_rejected(
                    key,
                    TransactionOutcome::FailedTimeout,
                    "reconciliation timed out".to_string(),
                )
            })
            .collect()
    }

    fn confirm(&mut self, key: &str) -> Option<TransactionResult> {
        // Idempotent: a key that already resolved returns its recorded
        // result unchanged.
        if let Some(result) = self.completed.get(key) {
            return Some(result.clone());
        }
        let record = self.coordinator.release(key)?;
        for item in &record.pending_destruction {
            self.items.finalize_pending(item);
        }
        self.journal.record(
            self.time,
            EngineEventKind::SpeculationConfirmed {
                key: record.key.clone(),
            },
        );
        let result = TransactionResult::success(record.correlation, record.instigator);
        Some(self.finish_local(record.key, result))
    }

    fn resolve_rejected(
        &mut self,
        key: &str,
        outcome: TransactionOutcome,
        message: String,
    ) -> Option<TransactionResult> {
        if let Some(result) = self.completed.get(key) {
            return Some(result.clone());
        }
        let record = self.coordinator.release(key)?;
        self.unwind(&record.ledger, &record.pending_destruction);
        self.journal.record(
            self.time,
            EngineEventKind::SpeculationRolledBack {
                key: record.key.clone(),
                outcome,
            },
        );
        let result = TransactionResult::failed(
            outcome,
            record.correlation,
            record.instigator,
            message,
        );
        Some(self.finish_local(record.key, result))
    }

    // ========================================================================
    // Rollback
    // ========================================================================

    /// Reverse a ledger. Pending destructions cancel first so reverse slot
    /// writes can re-attach the restored identities; deltas then invert in
    /// strict reverse order. Inversions that no longer match current
    /// occupancy are skipped — each ledger is self-contained, and later
    /// overlays on the same slots must not block an older reversal.
    fn unwind(&mut self, ledger: &DeltaLedger, pending_destruction: &[ItemId]) {
        for item in pending_destruction {
            let _ = self.items.cancel_pending(item);
        }
        for delta in ledger.iter().rev() {
            match delta {
                Delta::SlotWrite {
                    container,
                    slot,
                    item,
                    placement,
                } => {
                    let inverse = delta.inverted();
                    let applied = self
                        .registry
                        .get_mut(container)
                        .map(|c| c.apply_delta(&inverse, true));
                    if matches!(applied, Some(Ok(()))) {
                        match placement {
                            Placement::Added => self.items.clear_placement(item),
                            Placement::Removed => self
                                .items
                                .set_placement(item, SlotRef::new(container.clone(), slot.clone())),
                        }
                    }
                }
                Delta::TagWrite { item, tag, old, .. } => {
                    let _ = self.items.write_tag(item, tag, *old);
                }
                Delta::Instantiated { item } => {
                    // Removed entirely, never hidden: the guessed identity
                    // does not survive a rejection.
                    self.items.free(item);
                }
            }
        }
    }

    // ========================================================================
    // Filtering & Bookkeeping
    // ========================================================================

    fn filter(&self, request: &TransactionRequest) -> Option<RejectReason> {
        if request.operations.is_empty() {
            return Some(RejectReason::EmptyTransaction);
        }
        if request.operations.len() > self.config.max_operations_per_request {
            return Some(RejectReason::TooManyOperations {
                count: request.operations.len(),
                max: self.config.max_operations_per_request,
            });
        }
        if request.requester.trim().is_empty() {
            return Some(RejectReason::RequesterMissing);
        }
        if request.correlation.trim().is_empty() {
            return Some(RejectReason::CorrelationMissing);
        }
        for envelope in &request.operations {
            for slot_ref in envelope.op.slot_refs() {
                if slot_ref.container.trim().is_empty() || !slot_ref.slot.is_well_formed() {
                    return Some(RejectReason::MalformedDescriptor {
                        slot: slot_ref.clone(),
                    });
                }
            }
        }
        None
    }

    fn touched_containers(&self, request: &TransactionRequest) -> Vec<ContainerId> {
        let mut touched = BTreeSet::new();
        for envelope in &request.operations {
            for slot_ref in envelope.op.slot_refs() {
                touched.insert(slot_ref.container.clone());
            }
            match &envelope.op {
                Operation::ModifyTagStack { item, .. } => {
                    if let Some(at) = self.items.placement(item) {
                        touched.insert(at.container.clone());
                    }
                }
                Operation::RemoveItem {
                    disposition: RemoveDisposition::TransferToHolding,
                    ..
                } => {
                    if let Some(holding) = &self.config.holding_container {
                        touched.insert(holding.clone());
                    }
                }
                _ => {}
            }
        }
        touched.into_iter().collect()
    }

    fn fail_result(
        &self,
        request: &TransactionRequest,
        outcome: TransactionOutcome,
        reason: &RejectReason,
    ) -> TransactionResult {
        TransactionResult::failed(
            outcome,
            request.correlation.clone(),
            request.requester.clone(),
            format!("{reason:?}"),
        )
    }

    fn finish_local(&mut self, key: PredictionKey, result: TransactionResult) -> TransactionResult {
        self.remember_completed(key, result.clone());
        self.journal.record(
            self.time,
            EngineEventKind::TransactionResolved {
                result: result.clone(),
            },
        );
        result
    }

    fn remember_completed(&mut self, key: PredictionKey, result: TransactionResult) {
        if self.completed.contains_key(&key) {
            return;
        }
        while self.completed_order.len() >= self.config.completed_results_capacity {
            let Some(evicted) = self.completed_order.pop_front() else {
                break;
            };
            self.completed.remove(&evicted);
        }
        self.completed_order.push_back(key.clone());
        self.completed.insert(key, result);
    }
}
