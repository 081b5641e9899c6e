use super::*;

#[test]
fn filter_rejects_empty_transaction() {
    let mut engine = authority_engine();
    let request = TransactionRequest::new("corr-1", "player-1", Vec::<Operation>::new());
    let result = completed(engine.submit(request));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("EmptyTransaction"));
    assert_eq!(result.correlation, "corr-1");
    assert_eq!(result.instigator, "player-1");
}

#[test]
fn filter_rejects_blank_requester() {
    let mut engine = authority_engine();
    let request = TransactionRequest::new(
        "corr-1",
        "  ",
        vec![Operation::Move {
            from: slot("bag-a", 0),
            to: slot("bag-b", 0),
        }],
    );
    let result = completed(engine.submit(request));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("RequesterMissing"));
}

#[test]
fn filter_rejects_malformed_named_descriptor() {
    let mut engine = authority_engine();
    let request = TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![Operation::Move {
            from: slot("bag-a", 0),
            to: SlotRef::new("bag-b", SlotDescriptor::named("   ")),
        }],
    );
    let result = completed(engine.submit(request));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("MalformedDescriptor"));
}

#[test]
fn filter_rejects_oversized_batches() {
    let config = EngineConfig {
        authority: true,
        max_operations_per_request: 2,
        ..EngineConfig::default()
    };
    let mut engine = engine_with(config, vec![SlotContainer::flat("bag-a", 8)]);
    let ops: Vec<Operation> = (0..3)
        .map(|index| Operation::Move {
            from: slot("bag-a", index),
            to: slot("bag-a", index + 4),
        })
        .collect();
    let result = completed(engine.submit(TransactionRequest::new("corr-1", "player-1", ops)));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("TooManyOperations"));
}

#[test]
fn unknown_container_fails_validation() {
    let mut engine = authority_engine();
    let request = TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![Operation::Move {
            from: slot("no-such-bag", 0),
            to: slot("bag-b", 0),
        }],
    );
    let result = completed(engine.submit(request));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("ContainerNotFound"));
}

#[test]
fn adopt_places_and_indexes_items() {
    let mut engine = authority_engine();
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    assert_eq!(occupant(&engine, "bag-a", 0), Some("ore-1".to_string()));
    assert_eq!(
        engine.items().placement("ore-1"),
        Some(&slot("bag-a", 0))
    );
    assert_eq!(live_count(&engine, "ore-1"), 30);

    let err = engine.adopt_item(ore("ore-1", 5), slot("bag-a", 1));
    assert!(matches!(err, Err(RejectReason::ItemIdTaken { .. })));
}

#[test]
fn authority_move_finalizes_immediately() {
    let mut engine = authority_engine();
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    let request = TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![Operation::Move {
            from: slot("bag-a", 0),
            to: slot("bag-b", 2),
        }],
    );
    let result = completed(engine.submit(request));
    assert_eq!(result.outcome, TransactionOutcome::Success);
    assert_eq!(occupant(&engine, "bag-a", 0), None);
    assert_eq!(occupant(&engine, "bag-b", 2), Some("ore-1".to_string()));
    assert_eq!(engine.coordinator().outstanding(), 0);
}

#[test]
fn replayed_request_returns_recorded_result() {
    let mut engine = authority_engine();
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    let request = TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![Operation::Move {
            from: slot("bag-a", 0),
            to: slot("bag-b", 2),
        }],
    );
    let first = completed(engine.submit(request.clone()));
    assert_eq!(first.outcome, TransactionOutcome::Success);

    // Re-delivery of the same request must not re-execute: the source slot
    // is empty now, so a second execution would fail validation.
    let second = completed(engine.submit(request));
    assert_eq!(second, first);
    assert_eq!(occupant(&engine, "bag-b", 2), Some("ore-1".to_string()));
}

#[test]
fn nested_child_containers_survive_moves_of_their_carrier() {
    let mut engine = engine_with(
        EngineConfig::authority(),
        vec![
            SlotContainer::flat("bag-a", 8),
            SlotContainer::flat("bag-b", 8),
            SlotContainer::flat("pack-inner", 4),
        ],
    );
    let mut pack = ItemInstance::new("pack-1", "sword");
    pack.child_container = Some("pack-inner".to_string());
    engine
        .adopt_item(pack, slot("bag-a", 0))
        .expect("adopt pack");
    engine
        .adopt_item(ore("ore-1", 12), slot("pack-inner", 0))
        .expect("adopt nested ore");

    let result = completed(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![Operation::Move {
            from: slot("bag-a", 0),
            to: slot("bag-b", 3),
        }],
    )));
    assert_eq!(result.outcome, TransactionOutcome::Success);

    let pack = engine.items().get_live("pack-1").expect("pack is live");
    assert_eq!(pack.child_container.as_deref(), Some("pack-inner"));
    assert_eq!(occupant(&engine, "pack-inner", 0), Some("ore-1".to_string()));
}

#[test]
fn grid_and_named_descriptors_address_their_shapes() {
    let mut equipment = SlotContainer::keyed("equipment");
    equipment.config.keys = ["head".to_string(), "chest".to_string()].into_iter().collect();
    let mut engine = engine_with(
        EngineConfig::authority(),
        vec![SlotContainer::grid("crate", 3, 2), equipment],
    );
    engine
        .adopt_item(
            rifle("rifle-1"),
            SlotRef::new("crate", SlotDescriptor::grid(2, 1)),
        )
        .expect("adopt into grid");

    let result = completed(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![Operation::Move {
            from: SlotRef::new("crate", SlotDescriptor::grid(2, 1)),
            to: SlotRef::new("equipment", SlotDescriptor::named("chest")),
        }],
    )));
    assert_eq!(result.outcome, TransactionOutcome::Success);
    let chest = engine
        .registry()
        .get("equipment")
        .and_then(|c| c.resolve_slot(&SlotDescriptor::named("chest")));
    assert_eq!(chest, Some("rifle-1".to_string()));

    // Out-of-shape addressing is ordinary validation input.
    let result = completed(engine.submit(TransactionRequest::new(
        "corr-2",
        "player-1",
        vec![Operation::Move {
            from: SlotRef::new("equipment", SlotDescriptor::named("chest")),
            to: SlotRef::new("crate", SlotDescriptor::grid(9, 9)),
        }],
    )));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("CannotAccept"));
}

#[test]
fn multi_op_transaction_is_atomic() {
    // bag-c refuses ore outright, so op #2 fails `can_accept`; neither op #1
    // nor op #3 may leave any observable effect.
    let bag_c = SlotContainer::new(
        "bag-c",
        SlotContainerConfig::flat(4).with_accepts(vec!["sword".to_string()]),
    );
    let mut engine = engine_with(
        EngineConfig::authority(),
        vec![
            SlotContainer::flat("bag-a", 8),
            SlotContainer::flat("bag-b", 8),
            bag_c,
        ],
    );
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore-1");
    engine
        .adopt_item(ore("ore-2", 10), slot("bag-a", 2))
        .expect("adopt ore-2");
    engine
        .adopt_item(rifle("rifle-1"), slot("bag-a", 3))
        .expect("adopt rifle");

    let request = TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![
            Operation::Move {
                from: slot("bag-a", 0),
                to: slot("bag-b", 0),
            },
            Operation::Move {
                from: slot("bag-a", 2),
                to: slot("bag-c", 0),
            },
            Operation::ModifyTagStack {
                item: "rifle-1".to_string(),
                tag: "ammo".to_string(),
                delta: -5,
                clamp: false,
            },
        ],
    );
    let result = completed(engine.submit(request));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("CannotAccept"));

    assert_eq!(occupant(&engine, "bag-a", 0), Some("ore-1".to_string()));
    assert_eq!(occupant(&engine, "bag-a", 2), Some("ore-2".to_string()));
    assert_eq!(occupant(&engine, "bag-b", 0), None);
    assert_eq!(occupant(&engine, "bag-c", 0), None);
    let rifle = engine.items().get_live("rifle-1").expect("rifle is live");
    assert_eq!(rifle.tags.get("ammo"), 30);
}
