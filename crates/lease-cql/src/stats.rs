//! Client-side lease statistics.
//!
//! The wire protocol has no `GROUP BY`, so a query scans the `subnet_id`,
//! `lease_type` and `state` columns and counts rows itself.

use std::collections::BTreeMap;

use lease_model::{LeaseState, LeaseStatsRow, LeaseType};
use tracing::debug;

use crate::error::{LeaseStoreError, Result};
use crate::registry::StatementTag;
use crate::schema::LeaseKind;
use crate::store::LeaseStore;
use crate::value::{CqlValue, Row};

/// Subnets a statistics query covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatsScope {
    All,
    Subnet(u32),
    /// Inclusive on both ends.
    Range { first: u32, last: u32 },
}

impl StatsScope {
    fn validate(self) -> Result<Self> {
        if let StatsScope::Range { first, last } = self {
            if first > last {
                return Err(LeaseStoreError::bad_value(
                    "subnet_range",
                    format!("first subnet {first} is greater than last subnet {last}"),
                ));
            }
        }
        Ok(self)
    }
}

/// Cursor over aggregated lease counts.
///
/// [`start`](Self::start) runs the scan; rows then come out ordered by
/// subnet, type and state.
pub struct LeaseStatsQuery {
    store: LeaseStore,
    kind: LeaseKind,
    scope: StatsScope,
    rows: Option<std::vec::IntoIter<LeaseStatsRow>>,
}

impl LeaseStatsQuery {
    pub(crate) fn new(store: LeaseStore, kind: LeaseKind, scope: StatsScope) -> Result<Self> {
        Ok(Self {
            store,
            kind,
            scope: scope.validate()?,
            rows: None,
        })
    }

    pub fn scope(&self) -> StatsScope {
        self.scope
    }

    fn tag(&self) -> StatementTag {
        match (self.kind, self.scope) {
            (LeaseKind::V4, StatsScope::All) => StatementTag::ALL_LEASE4_STATS,
            (LeaseKind::V4, StatsScope::Subnet(_)) => StatementTag::SUBNET_LEASE4_STATS,
            (LeaseKind::V4, StatsScope::Range { .. }) => StatementTag::SUBNET_RANGE_LEASE4_STATS,
            (LeaseKind::V6, StatsScope::All) => StatementTag::ALL_LEASE6_STATS,
            (LeaseKind::V6, StatsScope::Subnet(_)) => StatementTag::SUBNET_LEASE6_STATS,
            (LeaseKind::V6, StatsScope::Range { .. }) => StatementTag::SUBNET_RANGE_LEASE6_STATS,
        }
    }

    fn params(&self) -> Vec<CqlValue> {
        match self.scope {
            StatsScope::All => Vec::new(),
            StatsScope::Subnet(id) => vec![CqlValue::from(id)],
            StatsScope::Range { first, last } => vec![CqlValue::from(first), CqlValue::from(last)],
        }
    }

    /// Executes the scan and materialises the counts. Calling it again
    /// re-runs the scan.
    pub fn start(&mut self) -> Result<()> {
        let statement = self.store.registry().primary(self.tag());
        let result = self
            .store
            .connection()
            .execute(statement, &self.params())
            .map_err(|e| {
                LeaseStoreError::backend(format!("{} for {:?}", statement.id(), self.scope), e)
            })?;

        let mut counts: BTreeMap<(u32, LeaseType, LeaseState), i64> = BTreeMap::new();
        for row in &result.rows {
            let Some(key) = self.classify(row)? else {
                continue;
            };
            *counts.entry(key).or_default() += 1;
        }
        debug!(
            kind = ?self.kind,
            scope = ?self.scope,
            scanned = result.rows.len(),
            groups = counts.len(),
            "lease statistics aggregated"
        );
        let rows: Vec<LeaseStatsRow> = counts
            .into_iter()
            .map(|((subnet_id, lease_type, state), count)| LeaseStatsRow {
                subnet_id,
                lease_type,
                state,
                count,
            })
            .collect();
        self.rows = Some(rows.into_iter());
        Ok(())
    }

    /// Next aggregated row, or `None` once exhausted or before `start`.
    pub fn next_row(&mut self) -> Option<LeaseStatsRow> {
        self.rows.as_mut().and_then(Iterator::next)
    }

    fn classify(&self, row: &Row) -> Result<Option<(u32, LeaseType, LeaseState)>> {
        let code = row.int("state")?;
        let state = LeaseState::from_code(code).ok_or_else(|| {
            LeaseStoreError::bad_value("state", format!("unknown lease state {code}"))
        })?;
        if !state.is_counted() {
            return Ok(None);
        }
        let subnet = row.int("subnet_id")?;
        let subnet_id = u32::try_from(subnet).map_err(|_| {
            LeaseStoreError::bad_value("subnet_id", format!("{subnet} is out of range"))
        })?;
        let lease_type = match self.kind {
            LeaseKind::V4 => LeaseType::V4,
            LeaseKind::V6 => {
                let code = row.int("lease_type")?;
                LeaseType::from_code(code).ok_or_else(|| {
                    LeaseStoreError::bad_value("lease_type", format!("unknown lease type {code}"))
                })?
            }
        };
        Ok(Some((subnet_id, lease_type, state)))
    }
}

impl Iterator for LeaseStatsQuery {
    type Item = LeaseStatsRow;

    fn next(&mut self) -> Option<LeaseStatsRow> {
        self.next_row()
    }
}
