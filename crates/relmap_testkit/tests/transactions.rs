//! Transaction boundaries across facade operations.

use relmap_core::{Config, CoreError, DatabaseAction};
use relmap_testkit::prelude::*;

#[test]
fn explicit_transaction_commits_joined_operations() {
    let db = TestDatabase::new();
    let txn = db.begin_transaction().unwrap();
    db.add(&mut [Investigation::new("A")]).unwrap();
    db.reconcile(&mut [Sample::new("A", "x")], DatabaseAction::Add, &SAMPLE_KEYS)
        .unwrap();
    assert!(db.in_transaction());
    assert!(db.store().in_transaction());
    txn.commit().unwrap();

    assert!(!db.store().in_transaction());
    assert_eq!(db.count::<Investigation>(&[]).unwrap(), 1);
    assert_eq!(db.count::<Sample>(&[]).unwrap(), 1);
}

#[test]
fn explicit_rollback_discards_joined_operations() {
    let db = TestDatabase::new();
    let txn = db.begin_transaction().unwrap();
    db.add(&mut [Sample::new("A", "x"), Sample::new("A", "y")])
        .unwrap();
    txn.rollback().unwrap();
    assert_eq!(db.count::<Sample>(&[]).unwrap(), 0);
}

#[test]
fn dropped_handle_rolls_back() {
    let db = TestDatabase::new();
    {
        let _txn = db.begin_transaction().unwrap();
        db.add(&mut [Sample::new("A", "x")]).unwrap();
    }
    assert!(!db.in_transaction());
    assert_eq!(db.count::<Sample>(&[]).unwrap(), 0);
}

#[test]
fn second_begin_is_rejected() {
    let db = TestDatabase::new();
    let txn = db.begin_transaction().unwrap();
    assert!(matches!(
        db.begin_transaction(),
        Err(CoreError::TransactionAlreadyActive)
    ));
    txn.commit().unwrap();
    db.begin_transaction().unwrap().commit().unwrap();
}

#[test]
fn policy_violation_inside_transaction_leaves_it_usable() {
    let db = TestDatabase::new();
    let txn = db.begin_transaction().unwrap();
    db.add(&mut [Sample::new("A", "x")]).unwrap();
    let err = db
        .reconcile(&mut [Sample::new("A", "x")], DatabaseAction::Add, &SAMPLE_KEYS)
        .unwrap_err();
    assert!(err.is_policy_violation());
    txn.commit().unwrap();
    assert_eq!(db.count::<Sample>(&[]).unwrap(), 1);
}

#[test]
fn key_field_typo_inside_transaction_leaves_it_usable() {
    let db = TestDatabase::new();
    let txn = db.begin_transaction().unwrap();
    db.add(&mut [Sample::new("A", "x")]).unwrap();
    let err = db
        .reconcile(&mut [Sample::new("A", "y")], DatabaseAction::Add, &["colour"])
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidField { .. }));
    let err = db
        .reconcile(&mut [Sample::new("A", "y")], DatabaseAction::Add, &[])
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));
    txn.commit().unwrap();
    assert_eq!(db.count::<Sample>(&[]).unwrap(), 1);
}

#[test]
fn backend_failure_inside_transaction_aborts_commit() {
    let (db, _flaky) = TestDatabase::with_sample_mapper(Config::default(), |m| {
        FlakyMapper::new(m).failing_write(2)
    });
    let txn = db.begin_transaction().unwrap();
    db.add(&mut [Sample::new("A", "x")]).unwrap();
    assert!(db.add(&mut [Sample::new("A", "y")]).is_err());
    assert!(db.in_transaction());

    let err = txn.commit().unwrap_err();
    assert!(matches!(err, CoreError::TransactionAborted { .. }));
    assert!(!db.in_transaction());
    assert_eq!(db.count::<Sample>(&[]).unwrap(), 0);
}

#[test]
fn transaction_closure_commits_or_rolls_back() {
    let db = TestDatabase::new();
    let added = db
        .transaction(|db| db.add(&mut [Sample::new("A", "x")]))
        .unwrap();
    assert_eq!(added, 1);

    let result: Result<(), CoreError> = db.transaction(|db| {
        db.add(&mut [Sample::new("A", "y")])?;
        db.reconcile(&mut [Sample::new("A", "q")], DatabaseAction::Update, &SAMPLE_KEYS)?;
        Ok(())
    });
    assert!(matches!(result, Err(CoreError::MissingEntity { .. })));
    assert_eq!(db.count::<Sample>(&[]).unwrap(), 1);
}

#[test]
fn standalone_operations_commit_on_their_own() {
    let db = TestDatabase::new();
    let mut sample = Sample::new("A", "x");
    db.add_one(&mut sample).unwrap();
    assert!(!db.store().in_transaction());

    sample.extra = Some(3);
    assert_eq!(db.update_one(&sample).unwrap(), 1);
    assert_eq!(
        db.find_by_id::<Sample>(sample.id.unwrap()).unwrap().unwrap().extra,
        Some(3)
    );
    assert_eq!(db.remove_one(&sample).unwrap(), 1);
    assert_eq!(db.count::<Sample>(&[]).unwrap(), 0);
}
