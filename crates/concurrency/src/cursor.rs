//! Database access traits
//!
//! Code under test never talks to a driver directly: it asks a
//! [`ConnectionFactory`] (through the [`Connector`](crate::Connector)) for a
//! [`Connection`], then opens [`Cursor`]s on it. Swapping the factory is how
//! cursors get virtualized.

use proctor_core::{ProctorResult, Row, Value};

/// A database cursor
///
/// Writes are buffered until [`commit`](Cursor::commit) unless autocommit is
/// on. All methods fail with a database error once the cursor is closed.
pub trait Cursor: Send {
    /// Run a statement, returning the affected or selected row count
    fn execute(&mut self, query: &str, params: &[Value]) -> ProctorResult<u64>;

    /// Next row of the last result set
    fn fetch_one(&mut self) -> ProctorResult<Option<Row>>;

    /// Remaining rows of the last result set
    fn fetch_all(&mut self) -> ProctorResult<Vec<Row>>;

    /// Row count of the last statement
    fn row_count(&self) -> u64;

    /// Column names of the last result set
    fn description(&self) -> Vec<String>;

    /// Database this cursor is bound to
    fn database(&self) -> &str;

    /// Make buffered writes durable
    fn commit(&mut self) -> ProctorResult<()>;

    /// Discard buffered writes
    fn rollback(&mut self) -> ProctorResult<()>;

    /// Release the cursor
    fn close(&mut self) -> ProctorResult<()>;

    /// Check if the cursor was closed
    fn is_closed(&self) -> bool;

    /// Toggle autocommit
    fn set_autocommit(&mut self, enabled: bool) -> ProctorResult<()>;
}

/// An open database connection (one server session)
pub trait Connection: Send {
    /// Database this connection is bound to
    fn database(&self) -> &str;

    /// Open a new cursor
    fn cursor(&mut self) -> ProctorResult<Box<dyn Cursor>>;

    /// End the session
    fn close(&mut self) -> ProctorResult<()>;
}

/// Opens connections by database name
pub trait ConnectionFactory: Send + Sync {
    /// Connect to `database`
    fn connect(&self, database: &str) -> ProctorResult<Box<dyn Connection>>;
}
