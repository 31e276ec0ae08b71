use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use anyhow::anyhow;
use lease_model::{
    ClientId, Duid, HwAddr, Lease4, Lease6, LeaseType, CLIENT_ID_MAX, DUID_MAX, HOSTNAME_MAX,
    HWADDR_MAX,
};
use tracing::{debug, info};

use crate::config::CqlConfig;
use crate::connection::CqlConnection;
use crate::error::{check_len, LeaseStoreError, Result};
use crate::exchange::{Lease4Exchange, Lease6Exchange};
use crate::ops::KindOps;
use crate::reclaim::ExpirationReclaimer;
use crate::registry::{StatementRegistry, StatementTag};
use crate::schema::{strategy_for, LeaseKind, SchemaStrategyKind};
use crate::stats::{LeaseStatsQuery, StatsScope};
use crate::value::CqlValue;

/// Schema version (major, minor) this crate reads and writes.
pub const SCHEMA_VERSION: (i64, i64) = (5, 0);

/// Lease database on a CQL store.
///
/// Cloning is cheap; clones share the connection and the statement
/// registry. Every operation blocks the calling thread; the `*_async`
/// variants move the work onto tokio's blocking pool.
#[derive(Clone)]
pub struct LeaseStore {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Arc<dyn CqlConnection>,
    registry: StatementRegistry,
    v4: Lease4Exchange,
    v6: Lease6Exchange,
    config: CqlConfig,
}

impl fmt::Debug for LeaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseStore")
            .field("keyspace", &self.inner.config.keyspace)
            .field("strategy", &self.inner.registry.strategy().kind())
            .field("options", &self.inner.registry.options())
            .finish()
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn v4_key(addr: Ipv4Addr) -> CqlValue {
    CqlValue::BigInt(i64::from(u32::from(addr)))
}

fn v6_key(addr: Ipv6Addr) -> CqlValue {
    CqlValue::Text(addr.to_string())
}

fn hwaddr_param(hwaddr: &HwAddr) -> Result<CqlValue> {
    check_len("hwaddr", hwaddr.bytes.len(), HWADDR_MAX)?;
    Ok(CqlValue::Blob(hwaddr.bytes.clone()))
}

fn client_id_param(client_id: &ClientId) -> Result<CqlValue> {
    check_len("client_id", client_id.0.len(), CLIENT_ID_MAX)?;
    Ok(CqlValue::Blob(client_id.0.clone()))
}

fn duid_param(duid: &Duid) -> Result<CqlValue> {
    check_len("duid", duid.0.len(), DUID_MAX)?;
    Ok(CqlValue::Blob(duid.0.clone()))
}

fn hostname_param(hostname: &str) -> Result<CqlValue> {
    check_len("hostname", hostname.len(), HOSTNAME_MAX)?;
    Ok(CqlValue::Text(hostname.to_string()))
}

fn join_error(e: tokio::task::JoinError) -> LeaseStoreError {
    LeaseStoreError::backend("blocking lease task", anyhow!("join error: {}", e))
}

impl LeaseStore {
    /// Builds the statement registry for the configured strategy, prepares
    /// every statement on `conn` and checks the stored schema version.
    pub fn open(config: CqlConfig, conn: Arc<dyn CqlConnection>) -> Result<Self> {
        config.validate()?;
        let options = config.registry_options();
        let registry = StatementRegistry::build(strategy_for(config.schema_strategy), options);
        registry
            .prepare_all(conn.as_ref())
            .map_err(|e| LeaseStoreError::backend("preparing lease statements", e))?;
        let store = Self {
            inner: Arc::new(Inner {
                conn,
                registry,
                v4: Lease4Exchange::new(options.privacy_extension),
                v6: Lease6Exchange::new(options.privacy_extension),
                config,
            }),
        };

        let (major, minor) = store.schema_version()?;
        if (major, minor) != SCHEMA_VERSION {
            return Err(LeaseStoreError::SchemaVersionMismatch {
                expected_major: SCHEMA_VERSION.0,
                expected_minor: SCHEMA_VERSION.1,
                found_major: major,
                found_minor: minor,
            });
        }
        info!(
            keyspace = %store.inner.config.keyspace,
            strategy = ?store.strategy(),
            privacy = options.privacy_extension,
            transactional = options.transactional_writes,
            engine = %store.inner.conn.engine_version(),
            "lease store opened"
        );
        Ok(store)
    }

    pub(crate) fn connection(&self) -> &dyn CqlConnection {
        self.inner.conn.as_ref()
    }

    pub(crate) fn registry(&self) -> &StatementRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &CqlConfig {
        &self.inner.config
    }

    pub fn strategy(&self) -> SchemaStrategyKind {
        self.inner.registry.strategy().kind()
    }

    fn v4(&self) -> KindOps<'_, Lease4Exchange> {
        KindOps {
            conn: self.inner.conn.as_ref(),
            registry: &self.inner.registry,
            exchange: &self.inner.v4,
        }
    }

    fn v6(&self) -> KindOps<'_, Lease6Exchange> {
        KindOps {
            conn: self.inner.conn.as_ref(),
            registry: &self.inner.registry,
            exchange: &self.inner.v6,
        }
    }

    /// Backend type name.
    pub fn get_type(&self) -> &'static str {
        "cql"
    }

    /// Keyspace holding the lease tables.
    pub fn get_name(&self) -> &str {
        &self.inner.config.keyspace
    }

    pub fn get_description(&self) -> &'static str {
        "lease database on a CQL wide-column store"
    }

    /// Engine and library identification for operators.
    pub fn get_db_version(&self) -> String {
        format!(
            "{} {} on {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            self.inner.conn.engine_version()
        )
    }

    /// Schema version stored in the keyspace.
    pub fn schema_version(&self) -> Result<(i64, i64)> {
        let statement = self.inner.registry.primary(StatementTag::GET_VERSION);
        let result = self
            .inner
            .conn
            .execute(statement, &[])
            .map_err(|e| LeaseStoreError::backend("reading schema version", e))?;
        let row = result.rows.first().ok_or_else(|| {
            LeaseStoreError::OperationError("schema_version table is empty".to_string())
        })?;
        Ok((row.int("version")?, row.int("minor")?))
    }

    /// Writes apply individually; there is nothing to commit.
    pub fn commit(&self) {
        debug!("commit is a no-op for the cql lease store");
    }

    /// Writes apply individually; there is nothing to roll back.
    pub fn rollback(&self) {
        debug!("rollback is a no-op for the cql lease store");
    }

    // ---------------- DHCPv4 ----------------

    /// Inserts `lease` unless a lease for its address exists. Returns false
    /// when the insert was not applied.
    pub fn add_lease4(&self, lease: &mut Lease4) -> Result<bool> {
        debug!(address = %lease.addr, "adding lease4");
        self.v4().insert(lease)
    }

    pub fn get_lease4(&self, addr: Ipv4Addr) -> Result<Option<Lease4>> {
        debug!(address = %addr, "get lease4 by address");
        self.v4()
            .select_one(StatementTag::GET_LEASE4_ADDR, &[v4_key(addr)], addr)
    }

    pub fn get_lease4_by_hwaddr(&self, hwaddr: &HwAddr) -> Result<Vec<Lease4>> {
        debug!(hwaddr = %hwaddr, "get lease4 by hardware address");
        self.v4()
            .select(StatementTag::GET_LEASE4_HWADDR, &[hwaddr_param(hwaddr)?], hwaddr)
    }

    pub fn get_lease4_by_hwaddr_subnet(
        &self,
        hwaddr: &HwAddr,
        subnet_id: u32,
    ) -> Result<Option<Lease4>> {
        debug!(hwaddr = %hwaddr, subnet_id, "get lease4 by hardware address and subnet");
        self.v4().select_one(
            StatementTag::GET_LEASE4_HWADDR_SUBID,
            &[hwaddr_param(hwaddr)?, CqlValue::from(subnet_id)],
            format_args!("{hwaddr} in subnet {subnet_id}"),
        )
    }

    pub fn get_lease4_by_client_id(&self, client_id: &ClientId) -> Result<Vec<Lease4>> {
        debug!(client_id = %client_id, "get lease4 by client id");
        self.v4().select(
            StatementTag::GET_LEASE4_CLIENTID,
            &[client_id_param(client_id)?],
            client_id,
        )
    }

    pub fn get_lease4_by_client_id_subnet(
        &self,
        client_id: &ClientId,
        subnet_id: u32,
    ) -> Result<Option<Lease4>> {
        debug!(client_id = %client_id, subnet_id, "get lease4 by client id and subnet");
        self.v4().select_one(
            StatementTag::GET_LEASE4_CLIENTID_SUBID,
            &[client_id_param(client_id)?, CqlValue::from(subnet_id)],
            format_args!("client {client_id} in subnet {subnet_id}"),
        )
    }

    pub fn get_leases4_by_subnet(&self, subnet_id: u32) -> Result<Vec<Lease4>> {
        debug!(subnet_id, "get lease4 by subnet");
        self.v4().select(
            StatementTag::GET_LEASE4_SUBID,
            &[CqlValue::from(subnet_id)],
            format_args!("subnet {subnet_id}"),
        )
    }

    pub fn get_leases4_by_hostname(&self, hostname: &str) -> Result<Vec<Lease4>> {
        debug!(hostname, "get lease4 by hostname");
        self.v4().select(
            StatementTag::GET_LEASE4_HOSTNAME,
            &[hostname_param(hostname)?],
            hostname,
        )
    }

    pub fn get_leases4(&self) -> Result<Vec<Lease4>> {
        debug!("get all lease4");
        self.v4().select(StatementTag::GET_LEASE4, &[], "all lease4")
    }

    /// Up to `page_size` leases placed after `lower_bound` in partition
    /// token order. `0.0.0.0` starts from the beginning. Token order is not
    /// address order.
    pub fn get_leases4_page(&self, lower_bound: Ipv4Addr, page_size: usize) -> Result<Vec<Lease4>> {
        debug!(lower_bound = %lower_bound, page_size, "get lease4 page");
        let lower = (!lower_bound.is_unspecified()).then(|| vec![v4_key(lower_bound)]);
        self.v4().page(lower, page_size)
    }

    /// Rewrites `lease` provided the stored expiration still equals the one
    /// observed when the lease was read. On success the observed expiration
    /// advances to the new one.
    pub fn update_lease4(&self, lease: &mut Lease4) -> Result<()> {
        debug!(address = %lease.addr, token = lease.observed_expire(), "updating lease4");
        self.v4().update(lease)
    }

    pub fn delete_lease4(&self, lease: &Lease4) -> Result<()> {
        debug!(address = %lease.addr, token = lease.observed_expire(), "deleting lease4");
        self.v4().delete(lease)
    }

    /// Expired lease4 not yet reclaimed, at most `max_leases` per state
    /// (zero for no cap).
    pub fn get_expired_leases4(&self, max_leases: usize) -> Result<Vec<Lease4>> {
        ExpirationReclaimer::new(self.v4()).expired(max_leases, now())
    }

    /// Removes reclaimed lease4 that expired more than `secs` seconds ago and
    /// returns how many were deleted.
    pub fn delete_expired_reclaimed_leases4(&self, secs: u32) -> Result<u64> {
        ExpirationReclaimer::new(self.v4()).delete_reclaimed(
            secs,
            now(),
            self.inner.config.reclaim_batch_size as usize,
        )
    }

    pub fn wipe_leases4(&self, subnet_id: u32) -> Result<usize> {
        debug!(subnet_id, "wipe lease4 requested");
        Err(LeaseStoreError::NotImplemented("wipe_leases4"))
    }

    pub fn lease4_stats(&self, scope: StatsScope) -> Result<LeaseStatsQuery> {
        LeaseStatsQuery::new(self.clone(), LeaseKind::V4, scope)
    }

    // ---------------- DHCPv6 ----------------

    /// Inserts `lease` unless a lease for its address and type exists.
    pub fn add_lease6(&self, lease: &mut Lease6) -> Result<bool> {
        debug!(address = %lease.addr, lease_type = lease.lease_type.as_str(), "adding lease6");
        self.v6().insert(lease)
    }

    pub fn get_lease6(&self, lease_type: LeaseType, addr: Ipv6Addr) -> Result<Option<Lease6>> {
        debug!(address = %addr, lease_type = lease_type.as_str(), "get lease6 by address");
        self.v6().select_one(
            StatementTag::GET_LEASE6_ADDR,
            &[v6_key(addr), CqlValue::from(lease_type.code())],
            format_args!("{addr} ({})", lease_type.as_str()),
        )
    }

    pub fn get_leases6_by_duid(&self, duid: &Duid) -> Result<Vec<Lease6>> {
        debug!(duid = %duid, "get lease6 by duid");
        self.v6()
            .select(StatementTag::GET_LEASE6_DUID, &[duid_param(duid)?], duid)
    }

    pub fn get_leases6_by_duid_iaid(
        &self,
        lease_type: LeaseType,
        duid: &Duid,
        iaid: u32,
    ) -> Result<Vec<Lease6>> {
        debug!(duid = %duid, iaid, lease_type = lease_type.as_str(), "get lease6 by duid and iaid");
        self.v6().select(
            StatementTag::GET_LEASE6_DUID_IAID,
            &[
                duid_param(duid)?,
                CqlValue::from(iaid),
                CqlValue::from(lease_type.code()),
            ],
            format_args!("duid {duid} iaid {iaid}"),
        )
    }

    pub fn get_leases6_by_duid_iaid_subnet(
        &self,
        lease_type: LeaseType,
        duid: &Duid,
        iaid: u32,
        subnet_id: u32,
    ) -> Result<Vec<Lease6>> {
        debug!(
            duid = %duid,
            iaid,
            subnet_id,
            lease_type = lease_type.as_str(),
            "get lease6 by duid, iaid and subnet"
        );
        self.v6().select(
            StatementTag::GET_LEASE6_DUID_IAID_SUBID,
            &[
                duid_param(duid)?,
                CqlValue::from(iaid),
                CqlValue::from(lease_type.code()),
                CqlValue::from(subnet_id),
            ],
            format_args!("duid {duid} iaid {iaid} in subnet {subnet_id}"),
        )
    }

    pub fn get_leases6_by_subnet(&self, subnet_id: u32) -> Result<Vec<Lease6>> {
        debug!(subnet_id, "get lease6 by subnet");
        self.v6().select(
            StatementTag::GET_LEASE6_SUBID,
            &[CqlValue::from(subnet_id)],
            format_args!("subnet {subnet_id}"),
        )
    }

    pub fn get_leases6_by_hostname(&self, hostname: &str) -> Result<Vec<Lease6>> {
        debug!(hostname, "get lease6 by hostname");
        self.v6().select(
            StatementTag::GET_LEASE6_HOSTNAME,
            &[hostname_param(hostname)?],
            hostname,
        )
    }

    pub fn get_leases6(&self) -> Result<Vec<Lease6>> {
        debug!("get all lease6");
        self.v6().select(StatementTag::GET_LEASE6, &[], "all lease6")
    }

    /// Token-ordered page of lease6. The cursor is the address and type of
    /// the last lease of the previous page, since several types can share
    /// one address; `::` starts from the beginning whatever the type.
    pub fn get_leases6_page(
        &self,
        lower_bound: Ipv6Addr,
        lower_type: LeaseType,
        page_size: usize,
    ) -> Result<Vec<Lease6>> {
        debug!(
            lower_bound = %lower_bound,
            lease_type = lower_type.as_str(),
            page_size,
            "get lease6 page"
        );
        let lower = (!lower_bound.is_unspecified())
            .then(|| vec![v6_key(lower_bound), CqlValue::from(lower_type.code())]);
        self.v6().page(lower, page_size)
    }

    pub fn update_lease6(&self, lease: &mut Lease6) -> Result<()> {
        debug!(address = %lease.addr, token = lease.observed_expire(), "updating lease6");
        self.v6().update(lease)
    }

    pub fn delete_lease6(&self, lease: &Lease6) -> Result<()> {
        debug!(address = %lease.addr, token = lease.observed_expire(), "deleting lease6");
        self.v6().delete(lease)
    }

    pub fn get_expired_leases6(&self, max_leases: usize) -> Result<Vec<Lease6>> {
        ExpirationReclaimer::new(self.v6()).expired(max_leases, now())
    }

    pub fn delete_expired_reclaimed_leases6(&self, secs: u32) -> Result<u64> {
        ExpirationReclaimer::new(self.v6()).delete_reclaimed(
            secs,
            now(),
            self.inner.config.reclaim_batch_size as usize,
        )
    }

    pub fn wipe_leases6(&self, subnet_id: u32) -> Result<usize> {
        debug!(subnet_id, "wipe lease6 requested");
        Err(LeaseStoreError::NotImplemented("wipe_leases6"))
    }

    pub fn lease6_stats(&self, scope: StatsScope) -> Result<LeaseStatsQuery> {
        LeaseStatsQuery::new(self.clone(), LeaseKind::V6, scope)
    }

    // ---------------- Async wrappers (spawn_blocking) ----------------
    // These helpers keep blocking driver calls off async executors.

    pub async fn get_lease4_async(&self, addr: Ipv4Addr) -> Result<Option<Lease4>> {
        let s = self.clone();
        tokio::task::spawn_blocking(move || s.get_lease4(addr))
            .await
            .map_err(join_error)?
    }

    pub async fn add_lease4_async(&self, mut lease: Lease4) -> Result<(bool, Lease4)> {
        let s = self.clone();
        tokio::task::spawn_blocking(move || s.add_lease4(&mut lease).map(|added| (added, lease)))
            .await
            .map_err(join_error)?
    }

    /// Returns the updated lease carrying its new observed expiration.
    pub async fn update_lease4_async(&self, mut lease: Lease4) -> Result<Lease4> {
        let s = self.clone();
        tokio::task::spawn_blocking(move || s.update_lease4(&mut lease).map(|()| lease))
            .await
            .map_err(join_error)?
    }

    pub async fn get_expired_leases4_async(&self, max_leases: usize) -> Result<Vec<Lease4>> {
        let s = self.clone();
        tokio::task::spawn_blocking(move || s.get_expired_leases4(max_leases))
            .await
            .map_err(join_error)?
    }

    pub async fn delete_expired_reclaimed_leases4_async(&self, secs: u32) -> Result<u64> {
        let s = self.clone();
        tokio::task::spawn_blocking(move || s.delete_expired_reclaimed_leases4(secs))
            .await
            .map_err(join_error)?
    }

    pub async fn get_lease6_async(
        &self,
        lease_type: LeaseType,
        addr: Ipv6Addr,
    ) -> Result<Option<Lease6>> {
        let s = self.clone();
        tokio::task::spawn_blocking(move || s.get_lease6(lease_type, addr))
            .await
            .map_err(join_error)?
    }

    pub async fn add_lease6_async(&self, mut lease: Lease6) -> Result<(bool, Lease6)> {
        let s = self.clone();
        tokio::task::spawn_blocking(move || s.add_lease6(&mut lease).map(|added| (added, lease)))
            .await
            .map_err(join_error)?
    }

    pub async fn update_lease6_async(&self, mut lease: Lease6) -> Result<Lease6> {
        let s = self.clone();
        tokio::task::spawn_blocking(move || s.update_lease6(&mut lease).map(|()| lease))
            .await
            .map_err(join_error)?
    }

    pub async fn get_expired_leases6_async(&self, max_leases: usize) -> Result<Vec<Lease6>> {
        let s = self.clone();
        tokio::task::spawn_blocking(move || s.get_expired_leases6(max_leases))
            .await
            .map_err(join_error)?
    }

    pub async fn delete_expired_reclaimed_leases6_async(&self, secs: u32) -> Result<u64> {
        let s = self.clone();
        tokio::task::spawn_blocking(move || s.delete_expired_reclaimed_leases6(secs))
            .await
            .map_err(join_error)?
    }
}
