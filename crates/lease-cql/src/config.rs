use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::LeaseStoreError;
use crate::registry::RegistryOptions;
use crate::schema::SchemaStrategyKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl Consistency {
    pub fn as_str(self) -> &'static str {
        match self {
            Consistency::Any => "ANY",
            Consistency::One => "ONE",
            Consistency::Two => "TWO",
            Consistency::Three => "THREE",
            Consistency::Quorum => "QUORUM",
            Consistency::All => "ALL",
            Consistency::LocalQuorum => "LOCAL_QUORUM",
            Consistency::EachQuorum => "EACH_QUORUM",
            Consistency::Serial => "SERIAL",
            Consistency::LocalSerial => "LOCAL_SERIAL",
            Consistency::LocalOne => "LOCAL_ONE",
        }
    }
}

/// Connection and layout parameters of a lease store.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct CqlConfig {
    /// Hosts the client contacts first.
    pub contact_points: Vec<String>,
    pub port: u16,
    pub keyspace: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Reconnect attempts before a session is declared lost (0 disables).
    pub reconnect_tries: u32,
    pub reconnect_wait_ms: u64,
    pub consistency: Consistency,
    /// Consistency of the Paxos phase of conditional writes.
    pub serial_consistency: Consistency,
    pub schema_strategy: SchemaStrategyKind,
    /// Store the privacy extension columns.
    pub privacy_extension: bool,
    /// Wrap writes in `BEGIN TRANSACTION ... COMMIT TRANSACTION`.
    pub transactional_writes: bool,
    /// Rows fetched per round when deleting reclaimed leases.
    pub reclaim_batch_size: u32,
}

impl Default for CqlConfig {
    fn default() -> Self {
        Self {
            contact_points: vec!["127.0.0.1".to_string()],
            port: 9042,
            keyspace: "dhcp_leases".to_string(),
            user: None,
            password: None,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 12_000,
            reconnect_tries: 0,
            reconnect_wait_ms: 2_000,
            consistency: Consistency::Quorum,
            serial_consistency: Consistency::Serial,
            schema_strategy: SchemaStrategyKind::Consolidated,
            privacy_extension: false,
            transactional_writes: false,
            reclaim_batch_size: 1_024,
        }
    }
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(CqlConfig);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing [`CqlConfig`].
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(CqlConfig);
    serde_json::to_value(&schema).expect("schema json")
}

/// Parses TOML text, rejecting anything the JSON schema does not accept.
pub fn parse_config(content: &str) -> Result<CqlConfig> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value = serde_json::to_value(&raw)?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(anyhow::anyhow!(validation_errors.join(", ")));
    }
    let cfg: CqlConfig = toml::from_str(content)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Loads a config file and applies `LEASE_CQL_*` environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> Result<CqlConfig> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let mut cfg = parse_config(&content)?;
    cfg.apply_env_overrides();
    cfg.validate()?;
    Ok(cfg)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

impl CqlConfig {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(points) = std::env::var("LEASE_CQL_CONTACT_POINTS") {
            self.contact_points = points
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(port) = env_parse("LEASE_CQL_PORT") {
            self.port = port;
        }
        if let Ok(keyspace) = std::env::var("LEASE_CQL_KEYSPACE") {
            self.keyspace = keyspace;
        }
        if let Ok(user) = std::env::var("LEASE_CQL_USER") {
            self.user = Some(user);
        }
        if let Ok(password) = std::env::var("LEASE_CQL_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(ms) = env_parse("LEASE_CQL_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = ms;
        }
        if let Ok(strategy) = std::env::var("LEASE_CQL_SCHEMA_STRATEGY") {
            match strategy.trim().to_ascii_lowercase().as_str() {
                "consolidated" => self.schema_strategy = SchemaStrategyKind::Consolidated,
                "denormalized" => self.schema_strategy = SchemaStrategyKind::Denormalized,
                other => tracing::warn!(value = other, "unknown LEASE_CQL_SCHEMA_STRATEGY"),
            }
        }
    }

    /// Semantic checks on top of the schema.
    pub fn validate(&self) -> Result<(), LeaseStoreError> {
        if self.contact_points.is_empty() {
            return Err(LeaseStoreError::bad_value(
                "contact_points",
                "at least one contact point is required",
            ));
        }
        if self.keyspace.is_empty()
            || !self
                .keyspace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(LeaseStoreError::bad_value(
                "keyspace",
                format!("'{}' is not a valid keyspace name", self.keyspace),
            ));
        }
        if self.reclaim_batch_size == 0 {
            return Err(LeaseStoreError::bad_value(
                "reclaim_batch_size",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_wait(&self) -> Duration {
        Duration::from_millis(self.reconnect_wait_ms)
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            privacy_extension: self.privacy_extension,
            transactional_writes: self.transactional_writes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_KEYS: &[&str] = &[
        "LEASE_CQL_CONTACT_POINTS",
        "LEASE_CQL_PORT",
        "LEASE_CQL_KEYSPACE",
        "LEASE_CQL_USER",
        "LEASE_CQL_PASSWORD",
        "LEASE_CQL_REQUEST_TIMEOUT_MS",
        "LEASE_CQL_SCHEMA_STRATEGY",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn parses_full_config() {
        let cfg = parse_config(
            r#"
contact_points = ["10.0.0.1", "10.0.0.2"]
port = 9142
keyspace = "kea_leases"
user = "dhcp"
consistency = "local-quorum"
serial_consistency = "local-serial"
schema_strategy = "denormalized"
privacy_extension = true
reclaim_batch_size = 64
"#,
        )
        .unwrap();
        assert_eq!(cfg.contact_points.len(), 2);
        assert_eq!(cfg.port, 9142);
        assert_eq!(cfg.consistency.as_str(), "LOCAL_QUORUM");
        assert_eq!(cfg.schema_strategy, SchemaStrategyKind::Denormalized);
        assert!(cfg.registry_options().privacy_extension);
        assert!(!cfg.registry_options().transactional_writes);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(12));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.port, 9042);
        assert_eq!(cfg.schema_strategy, SchemaStrategyKind::Consolidated);
    }

    #[test]
    fn schema_rejects_wrong_types_and_unknown_keys() {
        assert!(parse_config("port = \"abc\"").is_err());
        assert!(parse_config("schema_strategy = \"sharded\"").is_err());
        assert!(parse_config("lease_database = true").is_err());
    }

    #[test]
    fn semantic_validation_rejects_bad_keyspace() {
        let err = parse_config("keyspace = \"drop table\"").unwrap_err();
        assert!(err.to_string().contains("keyspace"));
    }

    #[test]
    #[serial]
    fn env_overrides_take_precedence() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lease-cql.toml");
        std::fs::write(&path, "port = 9142\nkeyspace = \"from_file\"\n").unwrap();
        std::env::set_var("LEASE_CQL_KEYSPACE", "from_env");
        std::env::set_var("LEASE_CQL_PORT", "not-a-port");
        std::env::set_var("LEASE_CQL_SCHEMA_STRATEGY", "Denormalized");
        let cfg = load_config(&path).unwrap();
        clear_env();
        assert_eq!(cfg.keyspace, "from_env");
        assert_eq!(cfg.port, 9142);
        assert_eq!(cfg.schema_strategy, SchemaStrategyKind::Denormalized);
    }

    #[test]
    fn schema_json_lists_strategy() {
        let schema = config_schema_json();
        let text = schema.to_string();
        assert!(text.contains("schema_strategy"));
        assert!(text.contains("denormalized"));
    }
}
