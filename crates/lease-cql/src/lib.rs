//! DHCP lease storage on CQL wide-column stores.
//!
//! [`LeaseStore`] is the entry point: it owns a [`StatementRegistry`] built
//! for one [`SchemaStrategyKind`] and executes statements through a shared
//! [`CqlConnection`]. [`SqliteConnection`] provides an embedded connection
//! with the same conditional-write and token-order semantics.

pub mod config;
pub mod connection;
pub mod error;
pub mod exchange;
mod ops;
mod reclaim;
pub mod registry;
pub mod schema;
pub mod sqlite;
pub mod stats;
pub mod store;
pub mod value;

pub use config::{config_schema_json, load_config, parse_config, Consistency, CqlConfig};
pub use connection::{CqlConnection, QueryResult};
pub use error::{LeaseStoreError, Result};
pub use exchange::{Lease4Exchange, Lease6Exchange, LeaseExchange, LeaseRecord};
pub use registry::{RegistryOptions, Statement, StatementKind, StatementRegistry, StatementTag};
pub use schema::{LeaseKind, SchemaStrategy, SchemaStrategyKind};
pub use sqlite::SqliteConnection;
pub use stats::{LeaseStatsQuery, StatsScope};
pub use store::{LeaseStore, SCHEMA_VERSION};
pub use value::{CqlValue, Row};
