//! Boundary to the database client.
//!
//! Session setup, authentication, timeouts and reconnection belong to the
//! implementor. The store only prepares statements once and executes them
//! with positional parameters.

use crate::registry::Statement;
use crate::value::{CqlValue, Row};

/// Outcome of executing one statement.
///
/// `applied` is false when a conditional write (`IF NOT EXISTS`,
/// `IF expire = ?`) was rejected; it is always true for plain writes and
/// reads.
#[derive(Clone, Debug, Default)]
pub struct QueryResult {
    pub applied: bool,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn applied() -> Self {
        Self {
            applied: true,
            rows: Vec::new(),
        }
    }

    pub fn not_applied() -> Self {
        Self {
            applied: false,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            applied: true,
            rows,
        }
    }
}

/// A CQL session shared by every caller of a store. Implementations must be
/// safe to call concurrently; single-row conditional writes must be
/// linearizable per key.
pub trait CqlConnection: Send + Sync {
    /// Adds `statement` to the prepared-statement cache.
    fn prepare(&self, statement: &Statement) -> anyhow::Result<()>;

    /// Executes a statement previously passed to [`CqlConnection::prepare`].
    fn execute(&self, statement: &Statement, params: &[CqlValue]) -> anyhow::Result<QueryResult>;

    /// Engine and client library identification for operators.
    fn engine_version(&self) -> String;
}
