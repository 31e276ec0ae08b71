//! Physical schema layouts.
//!
//! A [`SchemaStrategy`] decides which tables hold each lease kind and which
//! table serves each lookup. Both strategies are selected at construction
//! and never mixed at call time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lease family a table or statement belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeaseKind {
    V4,
    V6,
}

/// Strategy selector as it appears in configuration.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaStrategyKind {
    /// One table per lease kind.
    #[default]
    Consolidated,
    /// Lease rows mirrored across tables keyed by different natural keys.
    Denormalized,
}

/// A physical table: its name and primary key split into partition and
/// clustering columns. Every lease table carries the full lease column set.
#[derive(Debug, PartialEq, Eq)]
pub struct TableLayout {
    pub name: &'static str,
    pub partition_key: &'static [&'static str],
    pub clustering_key: &'static [&'static str],
}

impl TableLayout {
    pub fn primary_key(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.partition_key
            .iter()
            .chain(self.clustering_key.iter())
            .copied()
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        self.primary_key().any(|c| c == column)
    }
}

pub static LEASE4: TableLayout = TableLayout {
    name: "lease4",
    partition_key: &["address"],
    clustering_key: &[],
};
pub static LEASE4_CLIENT_ID: TableLayout = TableLayout {
    name: "lease4_client_id",
    partition_key: &["client_id"],
    clustering_key: &["subnet_id", "address"],
};
pub static LEASE4_HWADDR: TableLayout = TableLayout {
    name: "lease4_hwaddr",
    partition_key: &["hwaddr"],
    clustering_key: &["subnet_id", "address"],
};
pub static LEASE4_SUBNET: TableLayout = TableLayout {
    name: "lease4_subnet",
    partition_key: &["subnet_id"],
    clustering_key: &["address"],
};
pub static LEASE6: TableLayout = TableLayout {
    name: "lease6",
    partition_key: &["address", "lease_type"],
    clustering_key: &[],
};
pub static LEASE6_DUID: TableLayout = TableLayout {
    name: "lease6_duid",
    partition_key: &["duid"],
    clustering_key: &["iaid", "lease_type", "subnet_id", "address"],
};
pub static SCHEMA_VERSION_TABLE: TableLayout = TableLayout {
    name: "schema_version",
    partition_key: &["version"],
    clustering_key: &[],
};

static CONSOLIDATED_V4: [&TableLayout; 1] = [&LEASE4];
static CONSOLIDATED_V6: [&TableLayout; 1] = [&LEASE6];
static DENORMALIZED_V4: [&TableLayout; 4] =
    [&LEASE4, &LEASE4_CLIENT_ID, &LEASE4_HWADDR, &LEASE4_SUBNET];
static DENORMALIZED_V6: [&TableLayout; 2] = [&LEASE6, &LEASE6_DUID];

pub const LEASE4_COLUMNS: &[&str] = &[
    "address",
    "hwaddr",
    "hwtype",
    "hwaddr_source",
    "client_id",
    "valid_lifetime",
    "expire",
    "subnet_id",
    "fqdn_fwd",
    "fqdn_rev",
    "hostname",
    "state",
    "user_context",
];

pub const LEASE6_COLUMNS: &[&str] = &[
    "address",
    "lease_type",
    "duid",
    "iaid",
    "valid_lifetime",
    "expire",
    "subnet_id",
    "pref_lifetime",
    "prefix_len",
    "fqdn_fwd",
    "fqdn_rev",
    "hostname",
    "hwaddr",
    "hwtype",
    "hwaddr_source",
    "state",
    "user_context",
    "pool_id",
];

pub const PRIVACY_COLUMNS: &[&str] = &["privacy_expire", "privacy_hash", "privacy_history"];

/// Column set of a lease table, with the privacy extension columns appended
/// when enabled.
pub fn lease_columns(kind: LeaseKind, privacy: bool) -> Vec<&'static str> {
    let base = match kind {
        LeaseKind::V4 => LEASE4_COLUMNS,
        LeaseKind::V6 => LEASE6_COLUMNS,
    };
    let mut columns = base.to_vec();
    if privacy {
        columns.extend_from_slice(PRIVACY_COLUMNS);
    }
    columns
}

/// Natural keys a lease can be looked up by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lookup {
    Address,
    ClientId,
    ClientIdSubnet,
    HwAddr,
    HwAddrSubnet,
    Subnet,
    Hostname,
    Duid,
    DuidIaid,
    DuidIaidSubnet,
}

pub trait SchemaStrategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> SchemaStrategyKind;

    /// Tables holding leases of `kind`, primary table first. Writes fan out
    /// over these in this order.
    fn tables(&self, kind: LeaseKind) -> &'static [&'static TableLayout];

    /// Table whose key serves `lookup` directly. `None` means the lookup is a
    /// filtered scan of the primary table.
    fn lookup_table(&self, kind: LeaseKind, lookup: Lookup) -> Option<&'static TableLayout>;

    /// Whether reclaimed leases can be bulk-deleted without correlated
    /// deletes across mirror tables.
    fn supports_reclaimed_cleanup(&self) -> bool;

    fn primary_table(&self, kind: LeaseKind) -> &'static TableLayout {
        self.tables(kind)[0]
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Consolidated;

impl SchemaStrategy for Consolidated {
    fn kind(&self) -> SchemaStrategyKind {
        SchemaStrategyKind::Consolidated
    }

    fn tables(&self, kind: LeaseKind) -> &'static [&'static TableLayout] {
        match kind {
            LeaseKind::V4 => &CONSOLIDATED_V4,
            LeaseKind::V6 => &CONSOLIDATED_V6,
        }
    }

    fn lookup_table(&self, kind: LeaseKind, lookup: Lookup) -> Option<&'static TableLayout> {
        match lookup {
            Lookup::Address => Some(self.primary_table(kind)),
            _ => None,
        }
    }

    fn supports_reclaimed_cleanup(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Denormalized;

impl SchemaStrategy for Denormalized {
    fn kind(&self) -> SchemaStrategyKind {
        SchemaStrategyKind::Denormalized
    }

    fn tables(&self, kind: LeaseKind) -> &'static [&'static TableLayout] {
        match kind {
            LeaseKind::V4 => &DENORMALIZED_V4,
            LeaseKind::V6 => &DENORMALIZED_V6,
        }
    }

    fn lookup_table(&self, kind: LeaseKind, lookup: Lookup) -> Option<&'static TableLayout> {
        match (kind, lookup) {
            (_, Lookup::Address) => Some(self.primary_table(kind)),
            (LeaseKind::V4, Lookup::ClientId | Lookup::ClientIdSubnet) => Some(&LEASE4_CLIENT_ID),
            (LeaseKind::V4, Lookup::HwAddr | Lookup::HwAddrSubnet) => Some(&LEASE4_HWADDR),
            (LeaseKind::V4, Lookup::Subnet) => Some(&LEASE4_SUBNET),
            (LeaseKind::V6, Lookup::Duid | Lookup::DuidIaid | Lookup::DuidIaidSubnet) => {
                Some(&LEASE6_DUID)
            }
            _ => None,
        }
    }

    fn supports_reclaimed_cleanup(&self) -> bool {
        false
    }
}

pub fn strategy_for(kind: SchemaStrategyKind) -> Box<dyn SchemaStrategy> {
    match kind {
        SchemaStrategyKind::Consolidated => Box::new(Consolidated),
        SchemaStrategyKind::Denormalized => Box::new(Denormalized),
    }
}
