//! Patched cursors: transaction control is a no-op, everything else passes through.

use crate::common::*;
use proctor::{with_patched_cursors, CursorPatch, ProctorError, Value};

#[test]
fn commit_rollback_close_are_noops_on_patched_cursors() {
    let (server, connector, mut txn) = memory_transaction();
    txn.start("db").unwrap();

    with_patched_cursors(&connector, &txn, || {
        let mut conn = connector.connect("db").unwrap();
        let mut cur = conn.cursor().unwrap();
        cur.execute("CREATE TABLE t", &[]).unwrap();
        cur.execute("INSERT INTO t", &[Value::Int(7)]).unwrap();
        cur.commit().unwrap();
        cur.rollback().unwrap();
        cur.close().unwrap();
        assert!(!cur.is_closed());

        // a second connection sees the same uncommitted data
        let mut again = connector.connect("db").unwrap().cursor().unwrap();
        again.execute("SELECT * FROM t", &[]).unwrap();
        assert_eq!(again.fetch_all().unwrap(), vec![vec![Value::Int(7)]]);
        conn.close().unwrap();
    })
    .unwrap();

    // nothing reached the server and only the transaction's session was used
    assert!(server.rows("db", "t").unwrap().is_empty());
    assert_eq!(server.open_sessions("db"), 1);
    txn.stop().unwrap();
    assert!(server.rows("db", "t").unwrap().is_empty());
}

#[test]
fn disabling_restores_direct_connections() {
    let (server, connector, mut txn) = memory_transaction();
    txn.start("db").unwrap();

    let mut patch = CursorPatch::enable(&connector, &txn).unwrap();
    assert!(patch.is_enabled());
    assert_eq!(connector.depth(), 1);
    patch.disable().unwrap();
    assert!(!patch.is_enabled());
    assert_eq!(connector.depth(), 0);
    assert!(matches!(patch.disable(), Err(ProctorError::PatchMismatch(_))));

    let mut conn = connector.connect("db").unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE direct", &[]).unwrap();
    cur.execute("INSERT INTO direct", &[Value::Int(1)]).unwrap();
    cur.commit().unwrap();
    cur.close().unwrap();
    assert!(cur.is_closed());
    conn.close().unwrap();
    assert_eq!(server.rows("db", "direct").unwrap().len(), 1);
    assert_eq!(server.open_sessions("db"), 1);
    txn.stop().unwrap();
}

#[test]
fn panic_inside_patched_scope_restores_the_connector() {
    let (_server, connector, mut txn) = memory_transaction();
    txn.start("db").unwrap();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        with_patched_cursors(&connector, &txn, || {
            assert_eq!(connector.depth(), 1);
            panic!("boom");
        })
    }));
    assert!(result.is_err());
    assert_eq!(connector.depth(), 0);
    txn.stop().unwrap();
}

#[test]
fn patched_cursor_outliving_the_transaction_fails() {
    let (_server, connector, mut txn) = memory_transaction();
    txn.start("db").unwrap();

    let mut leaked = with_patched_cursors(&connector, &txn, || {
        connector.connect("db").unwrap().cursor().unwrap()
    })
    .unwrap();
    txn.stop().unwrap();

    let err = leaked.execute("SELECT * FROM t", &[]).unwrap_err();
    assert!(matches!(err, ProctorError::TransactionStopped));
    assert!(leaked.is_closed());
}

#[test]
fn nested_patches_must_unwind_in_order() {
    let (_server, connector, mut txn) = memory_transaction();
    txn.start("db").unwrap();

    let mut outer = CursorPatch::enable(&connector, &txn).unwrap();
    let mut inner = CursorPatch::enable(&connector, &txn).unwrap();
    assert!(matches!(outer.disable(), Err(ProctorError::PatchMismatch(_))));
    inner.disable().unwrap();
    outer.disable().unwrap();
    assert_eq!(connector.depth(), 0);
    txn.stop().unwrap();
}
