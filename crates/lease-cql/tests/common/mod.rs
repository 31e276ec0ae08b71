#![allow(dead_code)]

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use lease_cql::{CqlConfig, LeaseStore, SchemaStrategyKind, SqliteConnection};
use lease_model::{ClientId, Duid, HwAddr, Lease4, Lease6, LeaseType};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn config(strategy: SchemaStrategyKind) -> CqlConfig {
    CqlConfig {
        schema_strategy: strategy,
        reclaim_batch_size: 4,
        ..CqlConfig::default()
    }
}

/// Store over a fresh in-memory database with the schema of `cfg`.
pub fn open_with(cfg: CqlConfig) -> (LeaseStore, Arc<SqliteConnection>) {
    init_tracing();
    let conn = Arc::new(SqliteConnection::open_in_memory().expect("open sqlite"));
    conn.create_schema(cfg.schema_strategy).expect("create schema");
    let store = LeaseStore::open(cfg, conn.clone()).expect("open store");
    (store, conn)
}

pub fn open(strategy: SchemaStrategyKind) -> LeaseStore {
    open_with(config(strategy)).0
}

pub fn hw(last: u8) -> HwAddr {
    HwAddr::ethernet(vec![0x00, 0x1a, 0x2b, 0x3c, 0x4d, last])
}

pub fn lease4(addr: Ipv4Addr, cltt: i64, subnet_id: u32) -> Lease4 {
    let last = addr.octets()[3];
    Lease4::new(
        addr,
        Some(hw(last)),
        Some(ClientId::new(vec![0x01, last])),
        3600,
        cltt,
        subnet_id,
    )
}

pub fn lease6(addr: &str, lease_type: LeaseType, cltt: i64, subnet_id: u32) -> Lease6 {
    let addr: Ipv6Addr = addr.parse().expect("ipv6 literal");
    Lease6::new(
        lease_type,
        addr,
        Some(Duid::new(vec![0x00, 0x01, 0x00, 0x01, 0xca, 0xfe])),
        42,
        1800,
        3600,
        cltt,
        subnet_id,
    )
}
