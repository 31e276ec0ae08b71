//! Embedded [`CqlConnection`] backed by SQLite.
//!
//! Each structured statement is rendered to SQL once at prepare time.
//! Partition token order is reproduced with a `token` column holding a
//! hash of the partition key, and lightweight transactions become row-change
//! counts: a conditional write that touches no row was not applied.

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::types::Value;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::connection::{CqlConnection, QueryResult};
use crate::registry::{Comparison, Predicate, Statement, StatementKind};
use crate::schema::{strategy_for, LeaseKind, SchemaStrategyKind, TableLayout, SCHEMA_VERSION_TABLE};
use crate::schema::{LEASE4_COLUMNS, LEASE6_COLUMNS, PRIVACY_COLUMNS};
use crate::store::SCHEMA_VERSION;
use crate::value::{CqlValue, Row};

/// Partition token of a key: the first eight bytes of a SHA-256 over a
/// tagged encoding of the values. Integers hash the same whatever their
/// width.
pub fn partition_token<'v>(values: impl IntoIterator<Item = &'v CqlValue>) -> i64 {
    let mut hasher = Sha256::new();
    for value in values {
        match value {
            CqlValue::Null => hasher.update(b"n"),
            CqlValue::Text(s) => {
                hasher.update(b"t");
                hasher.update((s.len() as u64).to_be_bytes());
                hasher.update(s.as_bytes());
            }
            CqlValue::Blob(b) => {
                hasher.update(b"b");
                hasher.update((b.len() as u64).to_be_bytes());
                hasher.update(b);
            }
            other => {
                hasher.update(b"i");
                hasher.update(other.as_i64().unwrap_or_default().to_be_bytes());
            }
        }
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(head)
}

fn to_sql(value: &CqlValue) -> Value {
    match value {
        CqlValue::Null => Value::Null,
        CqlValue::Boolean(b) => Value::Integer(i64::from(*b)),
        CqlValue::Int(v) => Value::Integer(i64::from(*v)),
        CqlValue::BigInt(v) => Value::Integer(*v),
        CqlValue::Text(s) => Value::Text(s.clone()),
        CqlValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn from_sql(column: &str, value: Value) -> Result<CqlValue> {
    Ok(match value {
        Value::Null => CqlValue::Null,
        Value::Integer(v) => CqlValue::BigInt(v),
        Value::Text(s) => CqlValue::Text(s),
        Value::Blob(b) => CqlValue::Blob(b),
        Value::Real(r) => bail!("column {column} holds a floating point value {r}"),
    })
}

fn has_token(table: &TableLayout) -> bool {
    table.name != SCHEMA_VERSION_TABLE.name
}

fn column_type(kind: LeaseKind, column: &str) -> &'static str {
    match column {
        "hwaddr" | "client_id" | "duid" | "privacy_hash" => "BLOB",
        "hostname" | "user_context" | "privacy_history" => "TEXT",
        "address" if kind == LeaseKind::V6 => "TEXT",
        _ => "INTEGER",
    }
}

#[derive(Clone, Debug)]
enum Mode {
    Query { columns: Arc<[&'static str]> },
    Write { conditional: bool },
}

/// A statement rendered to SQL.
#[derive(Clone, Debug)]
struct Rendered {
    sql: String,
    params: usize,
    /// Positions of the partition key among the parameters. When set, the
    /// key's token is bound ahead of the parameters.
    token_of: Option<Vec<usize>>,
    /// Parameters replaced by their combined token (`TOKEN(?, ..)`).
    token_bound: Option<Range<usize>>,
    mode: Mode,
    transactional: bool,
}

fn key_clause(key: &[&'static str]) -> String {
    key.iter()
        .map(|c| format!("{c} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn partition_positions(table: &TableLayout, columns: &[&'static str]) -> Result<Vec<usize>> {
    table
        .partition_key
        .iter()
        .map(|key| {
            columns
                .iter()
                .position(|c| c == key)
                .ok_or_else(|| anyhow!("partition column {key} of {} is not bound", table.name))
        })
        .collect()
}

fn render(statement: &Statement) -> Result<Rendered> {
    let table = statement.table();
    let name = table.name;
    let transactional = statement.transactional();
    let rendered = match statement.kind() {
        StatementKind::Insert {
            columns,
            if_not_exists,
        } => {
            let sql = format!(
                "INSERT {}INTO {name} (token, {}) VALUES (?, {}){}",
                if *if_not_exists { "" } else { "OR REPLACE " },
                columns.join(", "),
                vec!["?"; columns.len()].join(", "),
                if *if_not_exists { " ON CONFLICT DO NOTHING" } else { "" },
            );
            Rendered {
                sql,
                params: columns.len(),
                token_of: Some(partition_positions(table, columns)?),
                token_bound: None,
                mode: Mode::Write {
                    conditional: *if_not_exists,
                },
                transactional,
            }
        }
        // Without a condition an update is an upsert.
        StatementKind::Update {
            set,
            key,
            if_expire: false,
        } => {
            let columns: Vec<&'static str> = set.iter().chain(key.iter()).copied().collect();
            Rendered {
                sql: format!(
                    "INSERT OR REPLACE INTO {name} (token, {}) VALUES (?, {})",
                    columns.join(", "),
                    vec!["?"; columns.len()].join(", ")
                ),
                params: columns.len(),
                token_of: Some(partition_positions(table, &columns)?),
                token_bound: None,
                mode: Mode::Write { conditional: false },
                transactional,
            }
        }
        StatementKind::Update {
            set,
            key,
            if_expire: true,
        } => {
            let assignments = set
                .iter()
                .map(|c| format!("{c} = ?"))
                .collect::<Vec<_>>()
                .join(", ");
            Rendered {
                sql: format!(
                    "UPDATE {name} SET {assignments} WHERE {} AND expire = ?",
                    key_clause(key)
                ),
                params: set.len() + key.len() + 1,
                token_of: None,
                token_bound: None,
                mode: Mode::Write { conditional: true },
                transactional,
            }
        }
        StatementKind::Delete { key, if_expire } => {
            let mut sql = format!("DELETE FROM {name} WHERE {}", key_clause(key));
            if *if_expire {
                sql.push_str(" AND expire = ?");
            }
            Rendered {
                sql,
                params: key.len() + usize::from(*if_expire),
                token_of: None,
                token_bound: None,
                mode: Mode::Write {
                    conditional: *if_expire,
                },
                transactional,
            }
        }
        StatementKind::Select {
            columns,
            filter,
            limit,
            ..
        } => {
            let mut sql = format!("SELECT {} FROM {name}", columns.join(", "));
            let mut token_bound = None;
            let mut position = 0;
            if !filter.is_empty() {
                let mut preds = Vec::with_capacity(filter.len());
                for p in filter {
                    preds.push(match p {
                        Predicate::Compare { column, op } => {
                            let op = match op {
                                Comparison::Eq => "=",
                                Comparison::Lt => "<",
                                Comparison::Ge => ">=",
                                Comparison::Le => "<=",
                            };
                            format!("{column} {op} ?")
                        }
                        Predicate::TokenAfter(key) => {
                            if *key != table.partition_key {
                                bail!("token bound of {name} is not its partition key");
                            }
                            token_bound = Some(position..position + key.len());
                            "token > ?".to_string()
                        }
                    });
                    position += p.params();
                }
                sql.push_str(" WHERE ");
                sql.push_str(&preds.join(" AND "));
            }
            if has_token(table) {
                let order: Vec<&str> = std::iter::once("token")
                    .chain(table.clustering_key.iter().copied())
                    .collect();
                sql.push_str(" ORDER BY ");
                sql.push_str(&order.join(", "));
            }
            if *limit {
                sql.push_str(" LIMIT ?");
            }
            Rendered {
                sql,
                params: position + usize::from(*limit),
                token_of: None,
                token_bound,
                mode: Mode::Query {
                    columns: Arc::from(columns.as_slice()),
                },
                transactional: false,
            }
        }
    };
    Ok(rendered)
}

/// SQLite database speaking the lease store's statement set.
pub struct SqliteConnection {
    conn: Mutex<Connection>,
    prepared: RwLock<HashMap<String, Arc<Rendered>>>,
    location: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("location", &self.location)
            .finish()
    }
}

impl SqliteConnection {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("opening lease database {}", path.display()))?;
        // Pragmas tuned for a shared server connection
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // Busy timeout (default 5000ms; override with LEASE_CQL_SQLITE_BUSY_MS)
        let busy_ms: u64 = std::env::var("LEASE_CQL_SQLITE_BUSY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);
        conn.busy_timeout(std::time::Duration::from_millis(busy_ms))?;
        let _ = conn.pragma_update(None, "temp_store", "MEMORY");
        Ok(Self::from_connection(conn, path.display().to_string()))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn, ":memory:".to_string()))
    }

    fn from_connection(conn: Connection, location: String) -> Self {
        Self {
            conn: Mutex::new(conn),
            prepared: RwLock::new(HashMap::new()),
            location,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("lease database mutex poisoned"))
    }

    /// Creates the tables of `strategy` and seeds the schema version when
    /// the keyspace is new. Existing tables are left untouched.
    pub fn create_schema(&self, strategy: SchemaStrategyKind) -> Result<()> {
        let strategy = strategy_for(strategy);
        let mut ddl = String::new();
        for kind in [LeaseKind::V4, LeaseKind::V6] {
            let base = match kind {
                LeaseKind::V4 => LEASE4_COLUMNS,
                LeaseKind::V6 => LEASE6_COLUMNS,
            };
            for table in strategy.tables(kind) {
                let columns = base
                    .iter()
                    .chain(PRIVACY_COLUMNS.iter())
                    .map(|c| format!("{c} {}", column_type(kind, c)))
                    .collect::<Vec<_>>()
                    .join(",\n  ");
                let key = table.primary_key().collect::<Vec<_>>().join(", ");
                ddl.push_str(&format!(
                    "CREATE TABLE IF NOT EXISTS {name} (\n  \
                     token INTEGER NOT NULL,\n  {columns},\n  PRIMARY KEY ({key})\n);\n\
                     CREATE INDEX IF NOT EXISTS idx_{name}_token ON {name}(token);\n",
                    name = table.name,
                ));
            }
        }
        ddl.push_str(
            "CREATE TABLE IF NOT EXISTS schema_version (\n  \
             version INTEGER PRIMARY KEY,\n  minor INTEGER\n);\n",
        );

        let conn = self.lock()?;
        conn.execute_batch(&ddl).context("creating lease tables")?;
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))?;
        if rows == 0 {
            conn.execute(
                "INSERT INTO schema_version (version, minor) VALUES (?1, ?2)",
                rusqlite::params![SCHEMA_VERSION.0, SCHEMA_VERSION.1],
            )?;
        }
        info!(location = %self.location, strategy = ?strategy.kind(), "lease schema ready");
        Ok(())
    }

    /// Overwrites the stored schema version.
    pub fn set_schema_version(&self, major: i64, minor: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version, minor) VALUES (?1, ?2)",
            rusqlite::params![major, minor],
        )?;
        Ok(())
    }

    fn rendered(&self, statement: &Statement) -> Result<Arc<Rendered>> {
        let prepared = self
            .prepared
            .read()
            .map_err(|_| anyhow!("prepared statement cache poisoned"))?;
        prepared
            .get(statement.cql())
            .cloned()
            .ok_or_else(|| anyhow!("statement {} was not prepared", statement.id()))
    }
}

impl CqlConnection for SqliteConnection {
    fn prepare(&self, statement: &Statement) -> Result<()> {
        let rendered = render(statement)?;
        {
            let conn = self.lock()?;
            conn.prepare_cached(&rendered.sql)
                .with_context(|| format!("preparing {}: {}", statement.id(), rendered.sql))?;
        }
        debug!(id = statement.id(), sql = %rendered.sql, "statement prepared");
        self.prepared
            .write()
            .map_err(|_| anyhow!("prepared statement cache poisoned"))?
            .insert(statement.cql().to_string(), Arc::new(rendered));
        Ok(())
    }

    fn execute(&self, statement: &Statement, params: &[CqlValue]) -> Result<QueryResult> {
        let rendered = self.rendered(statement)?;
        if params.len() != rendered.params {
            bail!(
                "{} expects {} parameters, got {}",
                statement.id(),
                rendered.params,
                params.len()
            );
        }

        let mut values = Vec::with_capacity(params.len() + 1);
        if let Some(positions) = &rendered.token_of {
            values.push(Value::Integer(partition_token(
                positions.iter().map(|&i| &params[i]),
            )));
        }
        let mut idx = 0;
        while idx < params.len() {
            match &rendered.token_bound {
                Some(bound) if bound.start == idx => {
                    values.push(Value::Integer(partition_token(&params[bound.clone()])));
                    idx = bound.end;
                }
                _ => {
                    values.push(to_sql(&params[idx]));
                    idx += 1;
                }
            }
        }

        let mut conn = self.lock()?;
        match &rendered.mode {
            Mode::Query { columns } => {
                let mut stmt = conn.prepare_cached(&rendered.sql)?;
                let raw = stmt
                    .query_map(rusqlite::params_from_iter(values), |row| {
                        (0..columns.len())
                            .map(|i| row.get::<_, Value>(i))
                            .collect::<rusqlite::Result<Vec<_>>>()
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .with_context(|| format!("running {}", statement.id()))?;
                let rows = raw
                    .into_iter()
                    .map(|vals| {
                        let vals = columns
                            .iter()
                            .zip(vals)
                            .map(|(c, v)| from_sql(c, v))
                            .collect::<Result<Vec<_>>>()?;
                        Ok(Row::new(columns.clone(), vals))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(QueryResult::with_rows(rows))
            }
            Mode::Write { conditional } => {
                let changed = if rendered.transactional {
                    let tx = conn.transaction()?;
                    let n = tx
                        .prepare_cached(&rendered.sql)?
                        .execute(rusqlite::params_from_iter(values))?;
                    tx.commit()?;
                    n
                } else {
                    conn.prepare_cached(&rendered.sql)?
                        .execute(rusqlite::params_from_iter(values))
                        .with_context(|| format!("running {}", statement.id()))?
                };
                if *conditional && changed == 0 {
                    Ok(QueryResult::not_applied())
                } else {
                    Ok(QueryResult::applied())
                }
            }
        }
    }

    fn engine_version(&self) -> String {
        format!("SQLite {} ({})", rusqlite::version(), self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegistryOptions, StatementRegistry, StatementTag};

    fn registry(kind: SchemaStrategyKind, transactional_writes: bool) -> StatementRegistry {
        StatementRegistry::build(
            strategy_for(kind),
            RegistryOptions {
                privacy_extension: false,
                transactional_writes,
            },
        )
    }

    #[test]
    fn token_ignores_integer_width() {
        assert_eq!(
            partition_token([&CqlValue::Int(7)]),
            partition_token([&CqlValue::BigInt(7)])
        );
        assert_ne!(
            partition_token([&CqlValue::BigInt(7)]),
            partition_token([&CqlValue::Text("7".into())])
        );
    }

    #[test]
    fn renders_conditional_writes_as_change_counts() {
        let r = registry(SchemaStrategyKind::Denormalized, false);
        let insert = render(r.primary(StatementTag::INSERT_LEASE4)).unwrap();
        assert!(insert.sql.starts_with("INSERT INTO lease4 (token, address, hwaddr"));
        assert!(insert.sql.ends_with("ON CONFLICT DO NOTHING"));
        assert_eq!(insert.token_of, Some(vec![0]));

        let update = render(r.primary(StatementTag::UPDATE_LEASE4)).unwrap();
        assert!(update.sql.ends_with("WHERE address = ? AND expire = ?"));
        assert!(matches!(update.mode, Mode::Write { conditional: true }));

        let mirror = render(&r.mirrors(StatementTag::UPDATE_LEASE4)[0]).unwrap();
        assert!(mirror.sql.starts_with("INSERT OR REPLACE INTO lease4_client_id (token, "));
        assert!(matches!(mirror.mode, Mode::Write { conditional: false }));
    }

    #[test]
    fn page_query_compares_tokens() {
        let r = registry(SchemaStrategyKind::Consolidated, false);
        let page = render(r.primary(StatementTag::GET_LEASE6_PAGE)).unwrap();
        assert_eq!(page.token_bound, Some(0..2));
        assert_eq!(page.params, 3);
        assert!(page
            .sql
            .ends_with("FROM lease6 WHERE token > ? ORDER BY token LIMIT ?"));
        let version = render(r.primary(StatementTag::GET_VERSION)).unwrap();
        assert_eq!(version.sql, "SELECT version, minor FROM schema_version");
    }

    #[test]
    fn prepares_every_statement_against_created_schema() {
        for kind in [SchemaStrategyKind::Consolidated, SchemaStrategyKind::Denormalized] {
            let conn = SqliteConnection::open_in_memory().unwrap();
            conn.create_schema(kind).unwrap();
            let r = registry(kind, true);
            r.prepare_all(&conn).unwrap();
            let res = conn.execute(r.primary(StatementTag::GET_VERSION), &[]).unwrap();
            assert_eq!(res.rows.len(), 1);
            assert_eq!(res.rows[0].int("version").unwrap(), SCHEMA_VERSION.0);
        }
    }

    #[test]
    fn unprepared_statement_is_rejected() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.create_schema(SchemaStrategyKind::Consolidated).unwrap();
        let r = registry(SchemaStrategyKind::Consolidated, false);
        let err = conn
            .execute(r.primary(StatementTag::GET_LEASE4), &[])
            .unwrap_err();
        assert!(err.to_string().contains("was not prepared"));
    }

    #[test]
    fn create_schema_is_idempotent_and_keeps_version() {
        let dir = tempfile::tempdir().unwrap();
        let conn = SqliteConnection::open(dir.path().join("leases.sqlite")).unwrap();
        conn.create_schema(SchemaStrategyKind::Consolidated).unwrap();
        conn.set_schema_version(4, 1).unwrap();
        conn.create_schema(SchemaStrategyKind::Consolidated).unwrap();
        let r = registry(SchemaStrategyKind::Consolidated, false);
        r.prepare_all(&conn).unwrap();
        let res = conn.execute(r.primary(StatementTag::GET_VERSION), &[]).unwrap();
        assert_eq!(res.rows[0].int("minor").unwrap(), 1);
    }
}
