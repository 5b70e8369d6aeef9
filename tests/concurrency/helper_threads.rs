//! Threads spawned by a test still go through the interception.

use crate::common::*;
use proctor::{with_patched_cursors, ExecuteObserver, Value};
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn helper_thread_writes_land_in_the_test_transaction() {
    let (server, connector, mut txn) = memory_transaction();
    txn.start("db").unwrap();

    with_patched_cursors(&connector, &txn, || {
        let helper = Arc::clone(&connector);
        std::thread::spawn(move || {
            let mut conn = helper.connect("db").unwrap();
            let mut cur = conn.cursor().unwrap();
            cur.execute("CREATE TABLE jobs", &[]).unwrap();
            cur.execute("INSERT INTO jobs", &[Value::from("sync")]).unwrap();
            cur.commit().unwrap();
            cur.close().unwrap();
        })
        .join()
        .unwrap();
    })
    .unwrap();

    {
        let cursor = txn.cursor().unwrap();
        let mut cursor = cursor.lock();
        cursor.execute("SELECT * FROM jobs", &[]).unwrap();
        assert_eq!(cursor.fetch_all().unwrap().len(), 1);
    }
    txn.stop().unwrap();
    assert!(server.rows("db", "jobs").unwrap().is_empty());
}

#[derive(Default)]
struct QueryLog(Mutex<Vec<String>>);

impl ExecuteObserver for QueryLog {
    fn before_execute(&self, _database: &str, query: &str, _params: &[Value]) {
        self.0.lock().push(query.to_string());
    }
}

#[test]
fn execute_hooks_see_queries_from_every_thread() {
    let (_server, connector, mut txn) = memory_transaction();
    let log = Arc::new(QueryLog::default());
    connector.hooks().register(log.clone());
    txn.start("db").unwrap();

    with_patched_cursors(&connector, &txn, || {
        let helper = Arc::clone(&connector);
        std::thread::spawn(move || {
            let mut cur = helper.connect("db").unwrap().cursor().unwrap();
            cur.execute("CREATE TABLE from_thread", &[]).unwrap();
        })
        .join()
        .unwrap();
    })
    .unwrap();
    txn.stop().unwrap();

    assert_eq!(log.0.lock().clone(), vec!["CREATE TABLE from_thread".to_string()]);
}
