use super::*;

fn move_op(from: SlotRef, to: SlotRef) -> Operation {
    Operation::Move { from, to }
}

#[test]
fn speculative_move_is_visible_immediately_and_confirms() {
    let mut engine = client_engine();
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    let key = speculated(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![move_op(slot("bag-a", 0), slot("bag-b", 2))],
    )));
    // Local effect is instant.
    assert_eq!(occupant(&engine, "bag-a", 0), None);
    assert_eq!(occupant(&engine, "bag-b", 2), Some("ore-1".to_string()));
    assert_eq!(engine.coordinator().outstanding(), 1);

    let result = engine
        .apply_signal(ReconciliationSignal::confirmed(key))
        .expect("confirmation resolves the key");
    assert_eq!(result.outcome, TransactionOutcome::Success);
    assert_eq!(result.correlation, "corr-1");
    assert_eq!(occupant(&engine, "bag-a", 0), None);
    assert_eq!(occupant(&engine, "bag-b", 2), Some("ore-1".to_string()));
    assert_eq!(engine.coordinator().outstanding(), 0);
}

#[test]
fn rejected_move_reverts_after_one_rollback_pass() {
    let mut engine = client_engine();
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    let key = speculated(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![move_op(slot("bag-a", 0), slot("bag-b", 2))],
    )));
    let result = engine
        .apply_signal(ReconciliationSignal::rejected(key))
        .expect("rejection resolves the key");
    assert_eq!(result.outcome, TransactionOutcome::FailedAuthorityRejected);
    assert_eq!(occupant(&engine, "bag-a", 0), Some("ore-1".to_string()));
    assert_eq!(occupant(&engine, "bag-b", 2), None);
}

#[test]
fn confirmation_is_idempotent() {
    let mut engine = client_engine();
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    let key = speculated(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![move_op(slot("bag-a", 0), slot("bag-b", 2))],
    )));
    let first = engine
        .apply_signal(ReconciliationSignal::confirmed(key.clone()))
        .expect("first confirmation resolves");
    let second = engine
        .apply_signal(ReconciliationSignal::confirmed(key))
        .expect("second confirmation returns the recorded result");
    assert_eq!(first, second);
    assert_eq!(occupant(&engine, "bag-b", 2), Some("ore-1".to_string()));
}

#[test]
fn signals_for_unknown_keys_are_ignored() {
    let mut engine = client_engine();
    assert_eq!(
        engine.apply_signal(ReconciliationSignal::confirmed("no-such-key")),
        None
    );
    assert_eq!(
        engine.apply_signal(ReconciliationSignal::rejected("no-such-key")),
        None
    );
}

#[test]
fn mixed_capability_downgrades_the_whole_transaction() {
    let fixed = SlotContainer::new(
        "vault",
        SlotContainerConfig::flat(8).with_speculative(false),
    );
    let mut engine = engine_with(
        EngineConfig::default(),
        vec![SlotContainer::flat("bag-a", 8), fixed],
    );
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    let outcome = engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![
            move_op(slot("bag-a", 0), slot("bag-a", 1)),
            move_op(slot("bag-a", 1), slot("vault", 0)),
        ],
    ));
    let key = match outcome {
        SubmitOutcome::Forwarded { key } => key,
        other => panic!("expected downgrade to authority-only: {other:?}"),
    };

    // No partial speculation: nothing moved locally.
    assert_eq!(occupant(&engine, "bag-a", 0), Some("ore-1".to_string()));
    assert_eq!(occupant(&engine, "bag-a", 1), None);
    assert_eq!(occupant(&engine, "vault", 0), None);
    assert_eq!(engine.coordinator().outstanding(), 1);

    // The authoritative result still resolves through the same key.
    let result = engine
        .apply_signal(ReconciliationSignal::confirmed(key))
        .expect("confirmation resolves the deferred record");
    assert_eq!(result.outcome, TransactionOutcome::Success);
    assert_eq!(engine.coordinator().outstanding(), 0);
}

#[test]
fn predictable_override_forces_the_downgrade() {
    let mut engine = client_engine();
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    let mut request = TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![move_op(slot("bag-a", 0), slot("bag-b", 2))],
    );
    request.operations[0].predictable = false;

    let outcome = engine.submit(request);
    assert!(matches!(outcome, SubmitOutcome::Forwarded { .. }));
    assert_eq!(occupant(&engine, "bag-a", 0), Some("ore-1".to_string()));
}

#[test]
fn explicit_authority_failure_rolls_back_with_its_own_outcome() {
    let mut engine = client_engine();
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    let key = speculated(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![move_op(slot("bag-a", 0), slot("bag-b", 2))],
    )));
    let result = engine
        .apply_authority_failure(AuthorityFailureNotice {
            key,
            reason: "slot reserved by a rule module".to_string(),
            op_index: Some(0),
        })
        .expect("failure notice resolves the key");
    assert_eq!(result.outcome, TransactionOutcome::FailedActivationRejected);
    assert!(result.message.contains("slot reserved"));
    assert_eq!(occupant(&engine, "bag-a", 0), Some("ore-1".to_string()));
    assert_eq!(occupant(&engine, "bag-b", 2), None);
}

#[test]
fn unresolved_keys_time_out_and_roll_back() {
    let config = EngineConfig {
        reconciliation_timeout_ticks: 3,
        ..EngineConfig::default()
    };
    let mut engine = engine_with(
        config,
        vec![SlotContainer::flat("bag-a", 8), SlotContainer::flat("bag-b", 8)],
    );
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    speculated(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![move_op(slot("bag-a", 0), slot("bag-b", 2))],
    )));

    assert!(engine.tick().is_empty());
    assert!(engine.tick().is_empty());
    let results = engine.tick();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, TransactionOutcome::FailedTimeout);
    assert_eq!(occupant(&engine, "bag-a", 0), Some("ore-1".to_string()));
    assert_eq!(occupant(&engine, "bag-b", 2), None);
    assert_eq!(engine.coordinator().outstanding(), 0);
}

#[test]
fn independent_ledgers_resolve_independently() {
    let mut engine = client_engine();
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore-1");
    engine
        .adopt_item(ore("ore-2", 10), slot("bag-a", 1))
        .expect("adopt ore-2");

    let key_older = speculated(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![move_op(slot("bag-a", 0), slot("bag-b", 0))],
    )));
    let key_newer = speculated(engine.submit(TransactionRequest::new(
        "corr-2",
        "player-1",
        vec![move_op(slot("bag-a", 1), slot("bag-b", 1))],
    )));
    assert_eq!(engine.coordinator().outstanding(), 2);

    // The older rejection reverses only its own ledger.
    engine
        .apply_signal(ReconciliationSignal::rejected(key_older))
        .expect("older rejection resolves");
    assert_eq!(occupant(&engine, "bag-a", 0), Some("ore-1".to_string()));
    assert_eq!(occupant(&engine, "bag-b", 1), Some("ore-2".to_string()));

    engine
        .apply_signal(ReconciliationSignal::confirmed(key_newer))
        .expect("newer confirmation resolves");
    assert_eq!(occupant(&engine, "bag-b", 1), Some("ore-2".to_string()));
    assert_eq!(engine.coordinator().outstanding(), 0);
}

#[test]
fn outstanding_keys_are_not_rebound_on_replay() {
    let mut engine = client_engine();
    engine
        .adopt_item(ore("ore-1", 30), slot("bag-a", 0))
        .expect("adopt ore");

    let request = TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![move_op(slot("bag-a", 0), slot("bag-b", 2))],
    );
    let key = speculated(engine.submit(request.clone()));
    // Replaying while the key is outstanding neither re-executes nor
    // rebinds.
    let replay = speculated(engine.submit(request));
    assert_eq!(replay, key);
    assert_eq!(engine.coordinator().outstanding(), 1);
    assert_eq!(occupant(&engine, "bag-b", 2), Some("ore-1".to_string()));
}
