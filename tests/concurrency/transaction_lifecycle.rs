//! Start/stop rules of the per-thread transaction slot.

use crate::common::*;
use proctor::{Disposition, ProctorError, StaticContext, TransactionOptions, Value};
use std::sync::Arc;

#[test]
fn second_start_fails_without_touching_the_active_context() {
    let (server, connector, mut first) = memory_transaction();
    server.create_database("other").unwrap();
    first.start("db").unwrap();

    let mut second = Transaction::new(Arc::clone(&connector), Arc::new(StaticContext::default()));
    let err = second.start("other").unwrap_err();
    assert!(matches!(err, ProctorError::AlreadyStarted { ref database } if database == "db"));
    assert!(err.is_fatal());
    assert!(!second.is_started());
    assert_eq!(first.database(), Some("db"));
    assert_eq!(Transaction::current_database().as_deref(), Some("db"));
    assert_eq!(server.open_sessions("other"), 0);

    let err = first.start("db").unwrap_err();
    assert!(matches!(err, ProctorError::AlreadyStarted { .. }));
    first.stop().unwrap();
}

#[test]
fn stop_then_start_always_succeeds() {
    let (server, _connector, mut txn) = memory_transaction();
    for _ in 0..3 {
        txn.start("db").unwrap();
        assert!(txn.is_started());
        txn.stop().unwrap();
        assert!(!txn.is_started());
        assert_eq!(Transaction::current_database(), None);
    }
    // stopping twice is harmless
    txn.stop().unwrap();
    txn.assert_stopped().unwrap();
    assert_eq!(server.open_sessions("db"), 0);
}

#[test]
fn disposition_decides_what_stop_does() {
    let (server, _connector, mut txn) = memory_transaction();

    txn.start("db").unwrap();
    {
        let cursor = txn.cursor().unwrap();
        let mut cursor = cursor.lock();
        cursor.execute("CREATE TABLE t", &[]).unwrap();
        cursor.execute("INSERT INTO t", &[Value::Int(1)]).unwrap();
    }
    txn.stop().unwrap();
    assert!(server.rows("db", "t").unwrap().is_empty());

    txn.start_with("db", TransactionOptions::default().disposition(Disposition::Commit))
        .unwrap();
    {
        let cursor = txn.cursor().unwrap();
        let mut cursor = cursor.lock();
        cursor.execute("CREATE TABLE t", &[]).unwrap();
        cursor.execute("INSERT INTO t", &[Value::Int(2)]).unwrap();
    }
    txn.stop().unwrap();
    assert_eq!(server.rows("db", "t").unwrap(), vec![vec![Value::Int(2)]]);
}

#[test]
fn scope_stops_on_panic() {
    let (_server, _connector, mut txn) = memory_transaction();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _scope = txn
            .start_scoped("db", TransactionOptions::default())
            .unwrap();
        panic!("test body failed");
    }));
    assert!(result.is_err());
    assert!(!txn.is_started());
    assert_eq!(Transaction::current_database(), None);
    txn.start("db").unwrap();
    txn.stop().unwrap();
}

#[test]
fn failed_start_leaves_the_slot_empty() {
    let (_server, _connector, mut txn) = memory_transaction();
    assert!(txn.start("missing").is_err());
    assert!(!txn.is_started());
    assert_eq!(Transaction::current_database(), None);
    txn.start("db").unwrap();
    txn.stop().unwrap();
}

#[test]
fn slots_are_per_thread() {
    let (server, connector, mut txn) = memory_transaction();
    txn.start("db").unwrap();

    let handle = std::thread::spawn(move || {
        let mut other = Transaction::new(connector, Arc::new(StaticContext::default()));
        other.start("db").unwrap();
        let database = Transaction::current_database();
        other.stop().unwrap();
        database
    });
    assert_eq!(handle.join().unwrap().as_deref(), Some("db"));
    txn.stop().unwrap();
    assert_eq!(server.open_sessions("db"), 0);
}
