//! In-memory database server
//!
//! A small reference backend for the cursor traits. It understands a handful
//! of statements, which is all the transaction layer and the coordinator
//! need to be exercised end to end:
//!
//! ```text
//! CREATE TABLE <t>
//! INSERT INTO <t>            -- the params form the row
//! SELECT * FROM <t>
//! SELECT COUNT(*) FROM <t>
//! DELETE FROM <t>
//! ```
//!
//! Writes are buffered per cursor and applied on commit (or immediately with
//! autocommit). Every open connection counts as a session; a database with
//! open sessions cannot be dropped until they are terminated.

mod statement;

use crate::cursor::{Connection, ConnectionFactory, Cursor};
use statement::{parse_statement, Statement, Write};
use parking_lot::Mutex;
use proctor_core::{ProctorError, ProctorResult, Row, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct DatabaseState {
    tables: BTreeMap<String, Vec<Row>>,
    sessions: usize,
    generation: u64,
}

#[derive(Debug, Default)]
struct ServerState {
    databases: BTreeMap<String, DatabaseState>,
}

impl ServerState {
    fn database(&self, name: &str) -> ProctorResult<&DatabaseState> {
        self.databases
            .get(name)
            .ok_or_else(|| ProctorError::database(format!("database \"{}\" does not exist", name)))
    }

    fn database_mut(&mut self, name: &str) -> ProctorResult<&mut DatabaseState> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| ProctorError::database(format!("database \"{}\" does not exist", name)))
    }
}

/// Shared in-memory server; clones refer to the same databases
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    /// Create an empty server
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty database
    pub fn create_database(&self, name: &str) -> ProctorResult<()> {
        let mut state = self.state.lock();
        if state.databases.contains_key(name) {
            return Err(ProctorError::database(format!(
                "database \"{}\" already exists",
                name
            )));
        }
        state.databases.insert(name.to_string(), DatabaseState::default());
        tracing::debug!(database = %name, "created database");
        Ok(())
    }

    /// Create a database as a copy of `template`
    pub fn create_from_template(&self, name: &str, template: &str) -> ProctorResult<()> {
        let mut state = self.state.lock();
        if state.databases.contains_key(name) {
            return Err(ProctorError::database(format!(
                "database \"{}\" already exists",
                name
            )));
        }
        let source = state.database(template)?;
        if source.sessions > 0 {
            return Err(ProctorError::database(format!(
                "source database \"{}\" is being accessed by other users",
                template
            )));
        }
        let copy = DatabaseState {
            tables: source.tables.clone(),
            sessions: 0,
            generation: 0,
        };
        state.databases.insert(name.to_string(), copy);
        tracing::debug!(database = %name, template = %template, "created database from template");
        Ok(())
    }

    /// Drop a database; fails while sessions are open
    pub fn drop_database(&self, name: &str) -> ProctorResult<()> {
        let mut state = self.state.lock();
        let db = state.database(name)?;
        if db.sessions > 0 {
            return Err(ProctorError::database(format!(
                "database \"{}\" is being accessed by {} other session(s)",
                name, db.sessions
            )));
        }
        state.databases.remove(name);
        tracing::debug!(database = %name, "dropped database");
        Ok(())
    }

    /// Forcibly end every session on `name`, returning how many were open
    pub fn terminate_sessions(&self, name: &str) -> ProctorResult<usize> {
        let mut state = self.state.lock();
        let db = state.database_mut(name)?;
        let terminated = db.sessions;
        db.sessions = 0;
        db.generation += 1;
        if terminated > 0 {
            tracing::debug!(database = %name, sessions = terminated, "terminated sessions");
        }
        Ok(terminated)
    }

    /// Check if a database exists
    pub fn database_exists(&self, name: &str) -> bool {
        self.state.lock().databases.contains_key(name)
    }

    /// Names of all databases
    pub fn databases(&self) -> Vec<String> {
        self.state.lock().databases.keys().cloned().collect()
    }

    /// Number of open sessions on `name` (0 if missing)
    pub fn open_sessions(&self, name: &str) -> usize {
        self.state
            .lock()
            .databases
            .get(name)
            .map(|db| db.sessions)
            .unwrap_or(0)
    }

    /// Committed rows of `table`
    pub fn rows(&self, database: &str, table: &str) -> ProctorResult<Vec<Row>> {
        let state = self.state.lock();
        Ok(state
            .database(database)?
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default())
    }
}

impl ConnectionFactory for MemoryServer {
    fn connect(&self, database: &str) -> ProctorResult<Box<dyn Connection>> {
        let mut state = self.state.lock();
        let db = state.database_mut(database)?;
        db.sessions += 1;
        let generation = db.generation;
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            database: database.to_string(),
            generation,
            closed: false,
        }))
    }
}

/// Session check shared by connections and cursors
fn check_session(
    state: &ServerState,
    database: &str,
    generation: u64,
) -> ProctorResult<()> {
    match state.databases.get(database) {
        Some(db) if db.generation == generation => Ok(()),
        Some(_) => Err(ProctorError::database(
            "terminating connection due to administrator command",
        )),
        None => Err(ProctorError::database(format!(
            "database \"{}\" does not exist",
            database
        ))),
    }
}

struct MemoryConnection {
    state: Arc<Mutex<ServerState>>,
    database: String,
    generation: u64,
    closed: bool,
}

impl MemoryConnection {
    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.state.lock();
        if let Some(db) = state.databases.get_mut(&self.database) {
            if db.generation == self.generation {
                db.sessions = db.sessions.saturating_sub(1);
            }
        }
    }
}

impl Connection for MemoryConnection {
    fn database(&self) -> &str {
        &self.database
    }

    fn cursor(&mut self) -> ProctorResult<Box<dyn Cursor>> {
        if self.closed {
            return Err(ProctorError::database("connection already closed"));
        }
        check_session(&self.state.lock(), &self.database, self.generation)?;
        Ok(Box::new(MemoryCursor {
            state: Arc::clone(&self.state),
            database: self.database.clone(),
            generation: self.generation,
            pending: Vec::new(),
            results: VecDeque::new(),
            columns: Vec::new(),
            row_count: 0,
            autocommit: false,
            closed: false,
        }))
    }

    fn close(&mut self) -> ProctorResult<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

struct MemoryCursor {
    state: Arc<Mutex<ServerState>>,
    database: String,
    generation: u64,
    pending: Vec<Write>,
    results: VecDeque<Row>,
    columns: Vec<String>,
    row_count: u64,
    autocommit: bool,
    closed: bool,
}

impl MemoryCursor {
    fn check_open(&self) -> ProctorResult<()> {
        if self.closed {
            return Err(ProctorError::database("cursor already closed"));
        }
        Ok(())
    }

    /// Committed rows of `table` with this cursor's pending writes on top
    fn visible_rows(&self, state: &ServerState, table: &str) -> ProctorResult<Vec<Row>> {
        let db = state.database(&self.database)?;
        let mut tables = BTreeMap::new();
        if let Some(rows) = db.tables.get(table) {
            tables.insert(table.to_string(), rows.clone());
        }
        for write in &self.pending {
            write.apply(&mut tables);
        }
        match tables.remove(table) {
            Some(rows) => Ok(rows),
            None => Err(ProctorError::database(format!(
                "relation \"{}\" does not exist",
                table
            ))),
        }
    }

    fn flush(&mut self) -> ProctorResult<()> {
        let mut state = self.state.lock();
        check_session(&state, &self.database, self.generation)?;
        let db = state.database_mut(&self.database)?;
        for write in self.pending.drain(..) {
            write.apply(&mut db.tables);
        }
        Ok(())
    }
}

impl Cursor for MemoryCursor {
    fn execute(&mut self, query: &str, params: &[Value]) -> ProctorResult<u64> {
        self.check_open()?;
        let statement = parse_statement(query, params)?;
        let state = self.state.lock();
        check_session(&state, &self.database, self.generation)?;

        self.results.clear();
        self.columns.clear();
        let count = match statement {
            Statement::Write(write) => {
                // rows can only be touched in an existing table
                let mut scratch = BTreeMap::new();
                if let Write::Insert(table, _) | Write::Delete(table) = &write {
                    scratch.insert(table.clone(), self.visible_rows(&state, table)?);
                }
                let affected = write.apply(&mut scratch) as u64;
                drop(state);
                self.pending.push(write);
                if self.autocommit {
                    self.flush()?;
                }
                affected
            }
            Statement::SelectAll(table) => {
                let rows = self.visible_rows(&state, &table)?;
                let width = rows.first().map(Vec::len).unwrap_or(0);
                self.columns = (0..width).map(|i| format!("column{}", i)).collect();
                let n = rows.len() as u64;
                self.results = rows.into();
                n
            }
            Statement::Count(table) => {
                let n = self.visible_rows(&state, &table)?.len();
                self.columns = vec!["count".to_string()];
                self.results.push_back(vec![Value::Int(n as i64)]);
                1
            }
        };
        self.row_count = count;
        Ok(count)
    }

    fn fetch_one(&mut self) -> ProctorResult<Option<Row>> {
        self.check_open()?;
        Ok(self.results.pop_front())
    }

    fn fetch_all(&mut self) -> ProctorResult<Vec<Row>> {
        self.check_open()?;
        Ok(self.results.drain(..).collect())
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }

    fn description(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn commit(&mut self) -> ProctorResult<()> {
        self.check_open()?;
        self.flush()
    }

    fn rollback(&mut self) -> ProctorResult<()> {
        self.check_open()?;
        self.pending.clear();
        Ok(())
    }

    fn close(&mut self) -> ProctorResult<()> {
        self.pending.clear();
        self.results.clear();
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn set_autocommit(&mut self, enabled: bool) -> ProctorResult<()> {
        self.check_open()?;
        self.autocommit = enabled;
        if enabled {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> MemoryServer {
        let server = MemoryServer::new();
        server.create_database("db").unwrap();
        server
    }

    fn cursor(server: &MemoryServer) -> (Box<dyn Connection>, Box<dyn Cursor>) {
        let mut conn = server.connect("db").unwrap();
        let cur = conn.cursor().unwrap();
        (conn, cur)
    }

    #[test]
    fn test_writes_visible_after_commit_only() {
        let server = server();
        let (_conn, mut cur) = cursor(&server);
        cur.execute("CREATE TABLE partner", &[]).unwrap();
        cur.execute("INSERT INTO partner", &["Agrolait".into()]).unwrap();

        assert_eq!(cur.execute("SELECT * FROM partner", &[]).unwrap(), 1);
        assert!(server.rows("db", "partner").unwrap().is_empty());

        cur.commit().unwrap();
        assert_eq!(server.rows("db", "partner").unwrap(), vec![vec![Value::from("Agrolait")]]);
    }

    #[test]
    fn test_rollback_discards_pending() {
        let server = server();
        let (_conn, mut cur) = cursor(&server);
        cur.execute("CREATE TABLE t", &[]).unwrap();
        cur.commit().unwrap();
        cur.execute("INSERT INTO t", &[1.into()]).unwrap();
        cur.rollback().unwrap();
        cur.execute("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(cur.fetch_one().unwrap(), Some(vec![Value::Int(0)]));
    }

    #[test]
    fn test_delete_reports_affected_rows() {
        let server = server();
        let (_conn, mut cur) = cursor(&server);
        cur.set_autocommit(true).unwrap();
        cur.execute("CREATE TABLE t", &[]).unwrap();
        cur.execute("INSERT INTO t", &[1.into()]).unwrap();
        cur.execute("INSERT INTO t", &[2.into()]).unwrap();
        assert_eq!(cur.execute("DELETE FROM t", &[]).unwrap(), 2);
        assert!(server.rows("db", "t").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_table_and_statement() {
        let server = server();
        let (_conn, mut cur) = cursor(&server);
        assert!(cur.execute("SELECT * FROM nope", &[]).is_err());
        assert!(cur.execute("VACUUM", &[]).is_err());
    }

    #[test]
    fn test_drop_requires_no_sessions() {
        let server = server();
        let (conn, cur) = cursor(&server);
        assert_eq!(server.open_sessions("db"), 1);
        assert!(server.drop_database("db").is_err());

        drop(cur);
        drop(conn);
        assert_eq!(server.open_sessions("db"), 0);
        server.drop_database("db").unwrap();
        assert!(!server.database_exists("db"));
    }

    #[test]
    fn test_terminate_sessions_invalidates_cursors() {
        let server = server();
        let (mut conn, mut cur) = cursor(&server);
        assert_eq!(server.terminate_sessions("db").unwrap(), 1);
        assert!(cur.execute("CREATE TABLE t", &[]).is_err());

        // closing a terminated session does not underflow the count
        conn.close().unwrap();
        assert_eq!(server.open_sessions("db"), 0);
        server.drop_database("db").unwrap();
    }

    #[test]
    fn test_template_copies_committed_tables() {
        let server = server();
        {
            let (_conn, mut cur) = cursor(&server);
            cur.set_autocommit(true).unwrap();
            cur.execute("CREATE TABLE res_users", &[]).unwrap();
            cur.execute("INSERT INTO res_users", &["admin".into()]).unwrap();
        }
        server.create_from_template("copy", "db").unwrap();
        assert_eq!(server.rows("copy", "res_users").unwrap().len(), 1);
        assert!(server.create_from_template("copy", "db").is_err());
    }

    #[test]
    fn test_closed_cursor_rejects_use() {
        let server = server();
        let (_conn, mut cur) = cursor(&server);
        cur.close().unwrap();
        assert!(cur.is_closed());
        assert!(cur.execute("CREATE TABLE t", &[]).is_err());
    }
}
