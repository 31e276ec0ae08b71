//! Lease value types for the DHCP lease storage engine: IPv4 and IPv6 leases,
//! client identifiers, lease states and the per-field bounds that every
//! storage backend enforces before touching the wire.

mod identifiers;
mod lease;
mod state;

pub use identifiers::*;
pub use lease::*;
pub use state::*;

/// Maximum length of a hardware address in bytes.
pub const HWADDR_MAX: usize = 20;
/// Maximum length of a DHCPv4 client identifier in bytes.
pub const CLIENT_ID_MAX: usize = 128;
/// Maximum length of a DHCPv6 DUID in bytes.
pub const DUID_MAX: usize = 128;
/// Maximum length of a hostname in bytes.
pub const HOSTNAME_MAX: usize = 255;
/// Maximum length of the privacy extension hash in bytes.
pub const PRIVACY_HASH_MAX: usize = 64;
/// Maximum length of an IPv6 address in its textual form.
pub const ADDRESS6_TEXT_MAX: usize = 39;

/// One aggregated statistics row: how many leases of a type sit in a state
/// within a subnet.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LeaseStatsRow {
    pub subnet_id: u32,
    pub lease_type: LeaseType,
    pub state: LeaseState,
    pub count: i64,
}
