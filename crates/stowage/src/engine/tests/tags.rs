use super::*;

fn modify(item: &str, tag: &str, delta: i64, clamp: bool) -> Operation {
    Operation::ModifyTagStack {
        item: item.to_string(),
        tag: tag.to_string(),
        delta,
        clamp,
    }
}

#[test]
fn signed_delta_within_bounds_succeeds() {
    let mut engine = authority_engine();
    engine
        .adopt_item(rifle("rifle-1"), slot("bag-a", 0))
        .expect("adopt rifle");

    let result = completed(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![modify("rifle-1", "ammo", -5, false)],
    )));
    assert_eq!(result.outcome, TransactionOutcome::Success);
    let item = engine.items().get_live("rifle-1").expect("rifle is live");
    assert_eq!(item.tags.get("ammo"), 25);
}

#[test]
fn out_of_bounds_delta_fails_and_leaves_value() {
    let mut engine = authority_engine();
    engine
        .adopt_item(rifle("rifle-1"), slot("bag-a", 0))
        .expect("adopt rifle");

    let result = completed(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![modify("rifle-1", "ammo", -40, false)],
    )));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("TagOutOfBounds"));
    let item = engine.items().get_live("rifle-1").expect("rifle is live");
    assert_eq!(item.tags.get("ammo"), 30);
}

#[test]
fn clamped_delta_clamps_to_bounds() {
    let mut engine = authority_engine();
    engine
        .adopt_item(rifle("rifle-1"), slot("bag-a", 0))
        .expect("adopt rifle");

    let result = completed(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![modify("rifle-1", "ammo", -40, true)],
    )));
    assert_eq!(result.outcome, TransactionOutcome::Success);
    let item = engine.items().get_live("rifle-1").expect("rifle is live");
    assert_eq!(item.tags.get("ammo"), 0);
}

#[test]
fn declared_tag_is_creatable_on_first_write() {
    let mut engine = authority_engine();
    engine
        .adopt_item(rifle("rifle-1"), slot("bag-a", 0))
        .expect("adopt rifle");

    // `heat` is declared in the definition's bounds but absent on the
    // instance; the first write creates it.
    let result = completed(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![modify("rifle-1", "heat", 20, false)],
    )));
    assert_eq!(result.outcome, TransactionOutcome::Success);
    let item = engine.items().get_live("rifle-1").expect("rifle is live");
    assert_eq!(item.tags.get("heat"), 20);
}

#[test]
fn undeclared_tag_is_rejected() {
    let mut engine = authority_engine();
    engine
        .adopt_item(rifle("rifle-1"), slot("bag-a", 0))
        .expect("adopt rifle");

    let result = completed(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![modify("rifle-1", "mana", 5, false)],
    )));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("TagNotDeclared"));
}

#[test]
fn unknown_item_is_rejected() {
    let mut engine = authority_engine();
    let result = completed(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![modify("ghost", "ammo", 1, false)],
    )));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("ItemNotFound"));
}

#[test]
fn pending_destruction_item_rejects_mutation() {
    let mut engine = client_engine();
    engine
        .adopt_item(rifle("rifle-1"), slot("bag-a", 0))
        .expect("adopt rifle");

    speculated(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![Operation::RemoveItem {
            from: slot("bag-a", 0),
            disposition: RemoveDisposition::Destroy,
            quantity: None,
            material_params: Default::default(),
        }],
    )));
    assert!(engine.items().is_pending_destruction("rifle-1"));

    let result = completed(engine.submit(TransactionRequest::new(
        "corr-2",
        "player-1",
        vec![modify("rifle-1", "ammo", -1, false)],
    )));
    assert_eq!(result.outcome, TransactionOutcome::FailedValidation);
    assert!(result.message.contains("ItemPendingDestruction"));
}

#[test]
fn tag_write_rolls_back_to_old_value() {
    let mut engine = client_engine();
    engine
        .adopt_item(rifle("rifle-1"), slot("bag-a", 0))
        .expect("adopt rifle");

    let key = speculated(engine.submit(TransactionRequest::new(
        "corr-1",
        "player-1",
        vec![modify("rifle-1", "ammo", -12, false)],
    )));
    let item = engine.items().get_live("rifle-1").expect("rifle is live");
    assert_eq!(item.tags.get("ammo"), 18);

    engine
        .apply_signal(ReconciliationSignal::rejected(key))
        .expect("rejection resolves the key");
    let item = engine.items().get_live("rifle-1").expect("rifle is live");
    assert_eq!(item.tags.get("ammo"), 30);
}
