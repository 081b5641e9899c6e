//! Tests for the engine module.

use super::*;
use std::sync::{Arc, Mutex};
use stowage_proto::{
    AuthorityFailureNotice, ParticipantId, PredictionKey, ReconciliationSignal,
    TransactionOutcome, TransactionResult,
};

mod basics;
mod prediction;
mod tags;

fn catalog() -> ItemCatalog {
    let mut catalog = ItemCatalog::new();
    catalog.insert(ItemDefinition::new("ore", "Iron Ore", 100));
    catalog.insert(
        ItemDefinition::new("rifle", "Coil Rifle", 1)
            .with_default_tag("ammo", 30)
            .with_tag_bounds("ammo", TagBounds::new(0, 30))
            .with_tag_bounds("heat", TagBounds::new(0, 50)),
    );
    catalog.insert(
        ItemDefinition::new("sword", "Plasma Sword", 1)
            .with_default_tag(TAG_DURABILITY, 100)
            .with_tag_bounds(TAG_DURABILITY, TagBounds::new(0, 100)),
    );
    catalog
}

fn engine_with(config: EngineConfig, containers: Vec<SlotContainer>) -> TransactionEngine {
    let mut registry = ContainerRegistry::new();
    for container in containers {
        registry.register(Box::new(container));
    }
    TransactionEngine::new(config, registry, catalog())
}

fn client_engine() -> TransactionEngine {
    engine_with(
        EngineConfig::default(),
        vec![SlotContainer::flat("bag-a", 8), SlotContainer::flat("bag-b", 8)],
    )
}

fn authority_engine() -> TransactionEngine {
    engine_with(
        EngineConfig::authority(),
        vec![SlotContainer::flat("bag-a", 8), SlotContainer::flat("bag-b", 8)],
    )
}

fn ore(id: &str, count: i64) -> ItemInstance {
    let mut item = ItemInstance::new(id, "ore");
    item.tags.set(TAG_COUNT, count);
    item
}

fn rifle(id: &str) -> ItemInstance {
    let mut item = ItemInstance::new(id, "rifle");
    item.tags.set("ammo", 30);
    item
}

fn slot(container: &str, index: u32) -> SlotRef {
    SlotRef::new(container, SlotDescriptor::index(index))
}

fn occupant(engine: &TransactionEngine, container: &str, index: u32) -> Option<ItemId> {
    engine
        .registry()
        .get(container)
        .and_then(|c| c.resolve_slot(&SlotDescriptor::index(index)))
}

fn live_count(engine: &TransactionEngine, item: &str) -> i64 {
    engine
        .items()
        .get_live(item)
        .map(|instance| instance.count())
        .expect("item is live")
}

fn completed(outcome: SubmitOutcome) -> TransactionResult {
    match outcome {
        SubmitOutcome::Completed(result) => result,
        other => panic!("expected completed result: {other:?}"),
    }
}

fn speculated(outcome: SubmitOutcome) -> PredictionKey {
    match outcome {
        SubmitOutcome::Speculated { key } => key,
        other => panic!("expected speculation: {other:?}"),
    }
}

struct DenyingOracle {
    denied: PermissionAction,
}

impl PermissionOracle for DenyingOracle {
    fn check_permission(
        &self,
        _container: &ContainerId,
        _slot: &SlotDescriptor,
        _requester: &ParticipantId,
        action: PermissionAction,
    ) -> bool {
        action != self.denied
    }
}

#[derive(Clone)]
struct RecordingSpawner {
    log: Arc<Mutex<Vec<SpawnRequest>>>,
}

impl RecordingSpawner {
    fn new() -> (Self, Arc<Mutex<Vec<SpawnRequest>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Self { log: log.clone() }, log)
    }
}

impl WorldSpawner for RecordingSpawner {
    fn spawn(&mut self, request: SpawnRequest) {
        self.log.lock().expect("spawn log lock").push(request);
    }
}
