//! Conversion between lease values and statement parameters / result rows.
//!
//! A lease is first flattened into a [`LeaseRecord`] (every column of its
//! kind, bounds already checked), and the record is then bound to whichever
//! statement is about to run. Nothing here performs I/O.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use lease_model::{
    ClientId, Duid, HwAddr, Lease4, Lease6, LeaseState, LeaseType, PrivacyExt, UserContext,
    ADDRESS6_TEXT_MAX, CLIENT_ID_MAX, DUID_MAX, HOSTNAME_MAX, HWADDR_MAX,
    PRIVACY_HASH_MAX,
};

use crate::error::{check_len, LeaseStoreError, Result};
use crate::registry::{Predicate, Statement, StatementKind, StatementTag};
use crate::schema::{LeaseKind, TableLayout};
use crate::value::{CqlValue, Row};

/// Every column of one lease, keyed by column name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeaseRecord {
    values: BTreeMap<&'static str, CqlValue>,
}

static NULL: CqlValue = CqlValue::Null;

impl LeaseRecord {
    fn set(&mut self, column: &'static str, value: impl Into<CqlValue>) {
        self.values.insert(column, value.into());
    }

    pub fn get(&self, column: &str) -> &CqlValue {
        self.values.get(column).unwrap_or(&NULL)
    }

    /// Whether every primary key column of `table` has a usable value. A
    /// lease without a client id, for instance, has no row in the table
    /// keyed by client id.
    pub fn has_key_for(&self, table: &TableLayout) -> bool {
        table.primary_key().all(|c| match self.get(c) {
            CqlValue::Null => false,
            CqlValue::Blob(b) => !b.is_empty(),
            _ => true,
        })
    }

    /// Primary key values of this record in `table`.
    pub fn key_for(&self, table: &TableLayout) -> Vec<&CqlValue> {
        table.primary_key().map(|c| self.get(c)).collect()
    }

    fn pick(&self, columns: &[&'static str]) -> Vec<CqlValue> {
        columns.iter().map(|c| self.get(c).clone()).collect()
    }

    /// Positional parameters for `statement`. `expected_expire` fills the
    /// `IF expire = ?` slot of conditional updates and deletes.
    pub fn bind(&self, statement: &Statement, expected_expire: i64) -> Vec<CqlValue> {
        match statement.kind() {
            StatementKind::Insert { columns, .. } => self.pick(columns),
            StatementKind::Update {
                set,
                key,
                if_expire,
            } => {
                let mut params = self.pick(set);
                params.extend(self.pick(key));
                if *if_expire {
                    params.push(CqlValue::BigInt(expected_expire));
                }
                params
            }
            StatementKind::Delete { key, if_expire } => {
                let mut params = self.pick(key);
                if *if_expire {
                    params.push(CqlValue::BigInt(expected_expire));
                }
                params
            }
            StatementKind::Select { filter, .. } => filter
                .iter()
                .filter_map(Predicate::equality_column)
                .map(|column| self.get(column).clone())
                .collect(),
        }
    }
}

/// Marshalling for one lease kind.
pub trait LeaseExchange: Send + Sync {
    type Lease: Clone + Send + 'static;

    const KIND: LeaseKind;
    const INSERT: StatementTag;
    const UPDATE: StatementTag;
    const DELETE: StatementTag;
    const GET_ADDR: StatementTag;
    const GET_EXPIRE: StatementTag;
    const GET_ALL: StatementTag;
    const GET_LIMIT: StatementTag;
    const GET_PAGE: StatementTag;

    /// Flattens `lease`, enforcing every field bound.
    fn to_record(&self, lease: &Self::Lease) -> Result<LeaseRecord>;

    /// Rebuilds a lease from a row selected with this kind's lease columns.
    fn retrieve(&self, row: &Row) -> Result<Self::Lease>;

    /// Human-readable primary key for logs and errors.
    fn describe(lease: &Self::Lease) -> String;

    fn expire(lease: &Self::Lease) -> i64;

    fn observed_expire(lease: &Self::Lease) -> i64;

    fn set_observed_expire(lease: &mut Self::Lease, expire: i64);

    fn bind_for_insert(&self, lease: &Self::Lease, statement: &Statement) -> Result<Vec<CqlValue>> {
        Ok(self.to_record(lease)?.bind(statement, 0))
    }

    fn bind_for_update(&self, lease: &Self::Lease, statement: &Statement) -> Result<Vec<CqlValue>> {
        Ok(self
            .to_record(lease)?
            .bind(statement, Self::observed_expire(lease)))
    }

    fn bind_for_delete(&self, lease: &Self::Lease, statement: &Statement) -> Result<Vec<CqlValue>> {
        Ok(self
            .to_record(lease)?
            .bind(statement, Self::observed_expire(lease)))
    }

    /// Receiving columns of a select, in row order.
    fn bind_for_select<'s>(&self, statement: &'s Statement) -> &'s [&'static str] {
        statement.select_columns()
    }
}

fn encode_user_context(ctx: &Option<UserContext>) -> Result<CqlValue> {
    match ctx {
        None => Ok(CqlValue::Null),
        Some(map) => serde_json::to_string(map)
            .map(CqlValue::Text)
            .map_err(|e| LeaseStoreError::bad_value("user_context", e.to_string())),
    }
}

fn decode_user_context(row: &Row) -> Result<Option<UserContext>> {
    let text = row.text("user_context")?;
    if text.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(serde_json::Value::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(LeaseStoreError::bad_value(
            "user_context",
            format!("expected a JSON map, found '{other}'"),
        )),
        Err(e) => Err(LeaseStoreError::bad_value("user_context", e.to_string())),
    }
}

fn encode_privacy(record: &mut LeaseRecord, privacy: &Option<PrivacyExt>) -> Result<()> {
    match privacy {
        Some(p) => {
            check_len("privacy_hash", p.hash.len(), PRIVACY_HASH_MAX)?;
            record.set("privacy_expire", p.expire);
            record.set("privacy_hash", p.hash.clone());
            record.set("privacy_history", p.history.clone());
        }
        None => {
            record.set("privacy_expire", CqlValue::Null);
            record.set("privacy_hash", CqlValue::Null);
            record.set("privacy_history", CqlValue::Null);
        }
    }
    Ok(())
}

fn decode_privacy(row: &Row) -> Result<Option<PrivacyExt>> {
    if row.is_null("privacy_expire") {
        return Ok(None);
    }
    let hash = row.blob("privacy_hash")?;
    check_len("privacy_hash", hash.len(), PRIVACY_HASH_MAX)?;
    Ok(Some(PrivacyExt {
        expire: row.int("privacy_expire")?,
        hash,
        history: row.text("privacy_history")?,
    }))
}

fn decode_u32(row: &Row, column: &'static str) -> Result<u32> {
    let v = row.int(column)?;
    u32::try_from(v)
        .map_err(|_| LeaseStoreError::bad_value(column, format!("{v} is out of range")))
}

fn decode_state(row: &Row) -> Result<LeaseState> {
    let code = row.int("state")?;
    LeaseState::from_code(code)
        .ok_or_else(|| LeaseStoreError::bad_value("state", format!("unknown lease state {code}")))
}

fn decode_hostname(row: &Row) -> Result<String> {
    let hostname = row.text("hostname")?;
    check_len("hostname", hostname.len(), HOSTNAME_MAX)?;
    Ok(hostname)
}

/// Reads `expire` and `valid_lifetime` and derives the transmission time.
fn decode_times(row: &Row) -> Result<(u32, i64, i64)> {
    let valid_lft = decode_u32(row, "valid_lifetime")?;
    let expire = row.int("expire")?;
    Ok((valid_lft, expire - i64::from(valid_lft), expire))
}

/// Writes `hwaddr` with its type and source, or nulls when absent. An empty
/// address is refused since it would read back as absent.
fn encode_hwaddr(r: &mut LeaseRecord, hwaddr: &Option<HwAddr>) -> Result<()> {
    match hwaddr {
        Some(hw) => {
            if hw.bytes.is_empty() {
                return Err(LeaseStoreError::bad_value("hwaddr", "must not be empty"));
            }
            check_len("hwaddr", hw.bytes.len(), HWADDR_MAX)?;
            r.set("hwaddr", hw.bytes.clone());
            r.set("hwtype", i32::from(hw.htype));
            r.set("hwaddr_source", hw.source);
        }
        None => {
            r.set("hwaddr", CqlValue::Null);
            r.set("hwtype", CqlValue::Null);
            r.set("hwaddr_source", CqlValue::Null);
        }
    }
    Ok(())
}

fn decode_hwaddr(row: &Row) -> Result<Option<HwAddr>> {
    let bytes = row.blob("hwaddr")?;
    check_len("hwaddr", bytes.len(), HWADDR_MAX)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    let htype = row.int("hwtype")?;
    let htype = u16::try_from(htype).map_err(|_| {
        LeaseStoreError::bad_value("hwtype", format!("{htype} is out of range"))
    })?;
    let source = decode_u32(row, "hwaddr_source")?;
    Ok(Some(HwAddr::new(bytes, htype).with_source(source)))
}

/// DHCPv4 marshalling.
#[derive(Clone, Debug, Default)]
pub struct Lease4Exchange {
    privacy: bool,
}

impl Lease4Exchange {
    pub fn new(privacy: bool) -> Self {
        Self { privacy }
    }
}

impl LeaseExchange for Lease4Exchange {
    type Lease = Lease4;

    const KIND: LeaseKind = LeaseKind::V4;
    const INSERT: StatementTag = StatementTag::INSERT_LEASE4;
    const UPDATE: StatementTag = StatementTag::UPDATE_LEASE4;
    const DELETE: StatementTag = StatementTag::DELETE_LEASE4;
    const GET_ADDR: StatementTag = StatementTag::GET_LEASE4_ADDR;
    const GET_EXPIRE: StatementTag = StatementTag::GET_LEASE4_EXPIRE;
    const GET_ALL: StatementTag = StatementTag::GET_LEASE4;
    const GET_LIMIT: StatementTag = StatementTag::GET_LEASE4_LIMIT;
    const GET_PAGE: StatementTag = StatementTag::GET_LEASE4_PAGE;

    fn to_record(&self, lease: &Lease4) -> Result<LeaseRecord> {
        let mut r = LeaseRecord::default();
        r.set("address", i64::from(u32::from(lease.addr)));
        encode_hwaddr(&mut r, &lease.hwaddr)?;
        match &lease.client_id {
            Some(id) if id.0.is_empty() => {
                return Err(LeaseStoreError::bad_value("client_id", "must not be empty"));
            }
            Some(id) => {
                check_len("client_id", id.0.len(), CLIENT_ID_MAX)?;
                r.set("client_id", id.0.clone());
            }
            None => r.set("client_id", CqlValue::Null),
        }
        check_len("hostname", lease.hostname.len(), HOSTNAME_MAX)?;
        r.set("valid_lifetime", lease.valid_lft);
        r.set("expire", lease.expire());
        r.set("subnet_id", lease.subnet_id);
        r.set("fqdn_fwd", lease.fqdn_fwd);
        r.set("fqdn_rev", lease.fqdn_rev);
        r.set("hostname", lease.hostname.clone());
        r.set("state", lease.state.code());
        r.set("user_context", encode_user_context(&lease.user_context)?);
        if self.privacy {
            encode_privacy(&mut r, &lease.privacy)?;
        }
        Ok(r)
    }

    fn retrieve(&self, row: &Row) -> Result<Lease4> {
        let raw = row.int("address")?;
        let addr = u32::try_from(raw).map(Ipv4Addr::from).map_err(|_| {
            LeaseStoreError::bad_value("address", format!("{raw} is not an IPv4 address"))
        })?;
        let client_id = row.blob("client_id")?;
        check_len("client_id", client_id.len(), CLIENT_ID_MAX)?;
        let (valid_lft, cltt, expire) = decode_times(row)?;

        let mut lease = Lease4::new(
            addr,
            decode_hwaddr(row)?,
            (!client_id.is_empty()).then(|| ClientId::new(client_id)),
            valid_lft,
            cltt,
            decode_u32(row, "subnet_id")?,
        );
        lease.fqdn_fwd = row.boolean("fqdn_fwd")?;
        lease.fqdn_rev = row.boolean("fqdn_rev")?;
        lease.hostname = decode_hostname(row)?;
        lease.state = decode_state(row)?;
        lease.user_context = decode_user_context(row)?;
        if self.privacy {
            lease.privacy = decode_privacy(row)?;
        }
        lease.set_observed_expire(expire);
        Ok(lease)
    }

    fn describe(lease: &Lease4) -> String {
        lease.addr.to_string()
    }

    fn expire(lease: &Lease4) -> i64 {
        lease.expire()
    }

    fn observed_expire(lease: &Lease4) -> i64 {
        lease.observed_expire()
    }

    fn set_observed_expire(lease: &mut Lease4, expire: i64) {
        lease.set_observed_expire(expire);
    }
}

/// DHCPv6 marshalling.
#[derive(Clone, Debug, Default)]
pub struct Lease6Exchange {
    privacy: bool,
}

impl Lease6Exchange {
    pub fn new(privacy: bool) -> Self {
        Self { privacy }
    }
}

impl LeaseExchange for Lease6Exchange {
    type Lease = Lease6;

    const KIND: LeaseKind = LeaseKind::V6;
    const INSERT: StatementTag = StatementTag::INSERT_LEASE6;
    const UPDATE: StatementTag = StatementTag::UPDATE_LEASE6;
    const DELETE: StatementTag = StatementTag::DELETE_LEASE6;
    const GET_ADDR: StatementTag = StatementTag::GET_LEASE6_ADDR;
    const GET_EXPIRE: StatementTag = StatementTag::GET_LEASE6_EXPIRE;
    const GET_ALL: StatementTag = StatementTag::GET_LEASE6;
    const GET_LIMIT: StatementTag = StatementTag::GET_LEASE6_LIMIT;
    const GET_PAGE: StatementTag = StatementTag::GET_LEASE6_PAGE;

    fn to_record(&self, lease: &Lease6) -> Result<LeaseRecord> {
        let duid = lease.duid.as_ref().ok_or_else(|| {
            LeaseStoreError::OperationError(format!("lease6 {} has no DUID", lease.addr))
        })?;
        check_len("duid", duid.0.len(), DUID_MAX)?;
        let address = lease.addr.to_string();
        check_len("address", address.len(), ADDRESS6_TEXT_MAX)?;
        check_len("hostname", lease.hostname.len(), HOSTNAME_MAX)?;

        let mut r = LeaseRecord::default();
        r.set("address", address);
        r.set("lease_type", lease.lease_type.code());
        r.set("duid", duid.0.clone());
        r.set("iaid", lease.iaid);
        r.set("valid_lifetime", lease.valid_lft);
        r.set("expire", lease.expire());
        r.set("subnet_id", lease.subnet_id);
        r.set("pref_lifetime", lease.preferred_lft);
        r.set("prefix_len", i32::from(lease.prefixlen));
        r.set("fqdn_fwd", lease.fqdn_fwd);
        r.set("fqdn_rev", lease.fqdn_rev);
        r.set("hostname", lease.hostname.clone());
        encode_hwaddr(&mut r, &lease.hwaddr)?;
        r.set("state", lease.state.code());
        r.set("user_context", encode_user_context(&lease.user_context)?);
        r.set("pool_id", lease.pool_id);
        if self.privacy {
            encode_privacy(&mut r, &lease.privacy)?;
        }
        Ok(r)
    }

    fn retrieve(&self, row: &Row) -> Result<Lease6> {
        let text = row.text("address")?;
        check_len("address", text.len(), ADDRESS6_TEXT_MAX)?;
        let addr: Ipv6Addr = text.parse().map_err(|_| {
            LeaseStoreError::bad_value("address", format!("'{text}' is not an IPv6 address"))
        })?;
        let type_code = row.int("lease_type")?;
        let lease_type = match LeaseType::from_code(type_code) {
            Some(t) if t != LeaseType::V4 => t,
            _ => {
                return Err(LeaseStoreError::bad_value(
                    "lease_type",
                    format!("unknown lease6 type {type_code}"),
                ))
            }
        };
        let duid = row.blob("duid")?;
        check_len("duid", duid.len(), DUID_MAX)?;
        let (valid_lft, cltt, expire) = decode_times(row)?;

        let mut lease = Lease6::new(
            lease_type,
            addr,
            Some(Duid::new(duid)),
            decode_u32(row, "iaid")?,
            decode_u32(row, "pref_lifetime")?,
            valid_lft,
            cltt,
            decode_u32(row, "subnet_id")?,
        );
        let prefix_len = row.int("prefix_len")?;
        lease.prefixlen = u8::try_from(prefix_len)
            .ok()
            .filter(|p| *p <= 128)
            .ok_or_else(|| {
                LeaseStoreError::bad_value("prefix_len", format!("{prefix_len} is out of range"))
            })?;
        lease.pool_id = decode_u32(row, "pool_id")?;
        lease.fqdn_fwd = row.boolean("fqdn_fwd")?;
        lease.fqdn_rev = row.boolean("fqdn_rev")?;
        lease.hostname = decode_hostname(row)?;
        lease.hwaddr = decode_hwaddr(row)?;
        lease.state = decode_state(row)?;
        lease.user_context = decode_user_context(row)?;
        if self.privacy {
            lease.privacy = decode_privacy(row)?;
        }
        lease.set_observed_expire(expire);
        Ok(lease)
    }

    fn describe(lease: &Lease6) -> String {
        format!("{} ({})", lease.addr, lease.lease_type.as_str())
    }

    fn expire(lease: &Lease6) -> i64 {
        lease.expire()
    }

    fn observed_expire(lease: &Lease6) -> i64 {
        lease.observed_expire()
    }

    fn set_observed_expire(lease: &mut Lease6, expire: i64) {
        lease.set_observed_expire(expire);
    }
}
