use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ClientId, Duid, HwAddr, LeaseState, LeaseType};

/// Free-form JSON attributes attached to a lease by hooks or operators.
pub type UserContext = Map<String, Value>;

/// Privacy extension block: when the stored identity must be forgotten and
/// the opaque material kept in its place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyExt {
    pub expire: i64,
    pub hash: Vec<u8>,
    pub history: String,
}

fn expire_of(cltt: i64, valid_lft: u32) -> i64 {
    cltt + i64::from(valid_lft)
}

/// DHCPv4 lease.
///
/// `cltt` is the client last transmission time in unix seconds; the stored
/// expiration is always `cltt + valid_lft`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lease4 {
    pub addr: Ipv4Addr,
    pub hwaddr: Option<HwAddr>,
    pub client_id: Option<ClientId>,
    pub valid_lft: u32,
    pub cltt: i64,
    pub subnet_id: u32,
    pub fqdn_fwd: bool,
    pub fqdn_rev: bool,
    pub hostname: String,
    pub state: LeaseState,
    pub user_context: Option<UserContext>,
    pub privacy: Option<PrivacyExt>,
    #[serde(skip)]
    observed_expire: Option<i64>,
}

impl Lease4 {
    pub fn new(
        addr: Ipv4Addr,
        hwaddr: Option<HwAddr>,
        client_id: Option<ClientId>,
        valid_lft: u32,
        cltt: i64,
        subnet_id: u32,
    ) -> Self {
        Self {
            addr,
            hwaddr,
            client_id,
            valid_lft,
            cltt,
            subnet_id,
            fqdn_fwd: false,
            fqdn_rev: false,
            hostname: String::new(),
            state: LeaseState::Default,
            user_context: None,
            privacy: None,
            observed_expire: None,
        }
    }

    pub fn expire(&self) -> i64 {
        expire_of(self.cltt, self.valid_lft)
    }

    pub fn expire_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expire(), 0)
    }

    /// Moves `cltt` so that the lease expires at `expire` with the current
    /// valid lifetime.
    pub fn set_expire(&mut self, expire: i64) {
        self.cltt = expire - i64::from(self.valid_lft);
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expire() < now
    }

    /// Expiration last seen in the store; the compare token for conditional
    /// updates and deletes. Falls back to the current expiration for leases
    /// that were never stored.
    pub fn observed_expire(&self) -> i64 {
        self.observed_expire.unwrap_or_else(|| self.expire())
    }

    pub fn set_observed_expire(&mut self, expire: i64) {
        self.observed_expire = Some(expire);
    }
}

impl PartialEq for Lease4 {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
            && self.hwaddr == other.hwaddr
            && self.client_id == other.client_id
            && self.valid_lft == other.valid_lft
            && self.cltt == other.cltt
            && self.subnet_id == other.subnet_id
            && self.fqdn_fwd == other.fqdn_fwd
            && self.fqdn_rev == other.fqdn_rev
            && self.hostname == other.hostname
            && self.state == other.state
            && self.user_context == other.user_context
            && self.privacy == other.privacy
    }
}

/// DHCPv6 lease (address or delegated prefix).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lease6 {
    pub addr: Ipv6Addr,
    pub lease_type: LeaseType,
    pub prefixlen: u8,
    pub duid: Option<Duid>,
    pub iaid: u32,
    pub preferred_lft: u32,
    pub valid_lft: u32,
    pub cltt: i64,
    pub subnet_id: u32,
    pub pool_id: u32,
    pub fqdn_fwd: bool,
    pub fqdn_rev: bool,
    pub hostname: String,
    pub hwaddr: Option<HwAddr>,
    pub state: LeaseState,
    pub user_context: Option<UserContext>,
    pub privacy: Option<PrivacyExt>,
    #[serde(skip)]
    observed_expire: Option<i64>,
}

impl Lease6 {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lease_type: LeaseType,
        addr: Ipv6Addr,
        duid: Option<Duid>,
        iaid: u32,
        preferred_lft: u32,
        valid_lft: u32,
        cltt: i64,
        subnet_id: u32,
    ) -> Self {
        Self {
            addr,
            lease_type,
            prefixlen: if lease_type == LeaseType::Pd { 64 } else { 128 },
            duid,
            iaid,
            preferred_lft,
            valid_lft,
            cltt,
            subnet_id,
            pool_id: 0,
            fqdn_fwd: false,
            fqdn_rev: false,
            hostname: String::new(),
            hwaddr: None,
            state: LeaseState::Default,
            user_context: None,
            privacy: None,
            observed_expire: None,
        }
    }

    pub fn expire(&self) -> i64 {
        expire_of(self.cltt, self.valid_lft)
    }

    pub fn expire_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expire(), 0)
    }

    pub fn set_expire(&mut self, expire: i64) {
        self.cltt = expire - i64::from(self.valid_lft);
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expire() < now
    }

    pub fn observed_expire(&self) -> i64 {
        self.observed_expire.unwrap_or_else(|| self.expire())
    }

    pub fn set_observed_expire(&mut self, expire: i64) {
        self.observed_expire = Some(expire);
    }
}

impl PartialEq for Lease6 {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
            && self.lease_type == other.lease_type
            && self.prefixlen == other.prefixlen
            && self.duid == other.duid
            && self.iaid == other.iaid
            && self.preferred_lft == other.preferred_lft
            && self.valid_lft == other.valid_lft
            && self.cltt == other.cltt
            && self.subnet_id == other.subnet_id
            && self.pool_id == other.pool_id
            && self.fqdn_fwd == other.fqdn_fwd
            && self.fqdn_rev == other.fqdn_rev
            && self.hostname == other.hostname
            && self.hwaddr == other.hwaddr
            && self.state == other.state
            && self.user_context == other.user_context
            && self.privacy == other.privacy
    }
}
