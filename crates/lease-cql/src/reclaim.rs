//! Expired lease queries and bulk removal of reclaimed leases.
//!
//! The query language has no `OR` across predicates, so expiry is one
//! `state = ? AND expire < ?` query per non-terminal state.

use lease_model::LeaseState;
use tracing::{debug, info};

use crate::error::{LeaseStoreError, Result};
use crate::exchange::LeaseExchange;
use crate::ops::{limit_param, KindOps};
use crate::value::CqlValue;

pub(crate) struct ExpirationReclaimer<'a, X: LeaseExchange> {
    ops: KindOps<'a, X>,
}

impl<'a, X: LeaseExchange> ExpirationReclaimer<'a, X> {
    pub(crate) fn new(ops: KindOps<'a, X>) -> Self {
        Self { ops }
    }

    /// Leases past their expiration at `now`, excluding reclaimed ones. The
    /// cap applies to each per-state query; zero means no cap.
    pub(crate) fn expired(&self, max_leases: usize, now: i64) -> Result<Vec<X::Lease>> {
        let cap = if max_leases == 0 {
            limit_param(usize::MAX)
        } else {
            limit_param(max_leases)
        };
        let mut leases = Vec::new();
        for state in LeaseState::ALL.into_iter().filter(|s| !s.is_terminal()) {
            let params = [CqlValue::Int(state.code()), CqlValue::BigInt(now), cap.clone()];
            let subject = format!("state {} before {now}", state.as_str());
            leases.extend(self.ops.select(X::GET_EXPIRE, &params, subject)?);
        }
        debug!(kind = ?X::KIND, count = leases.len(), "expired leases fetched");
        Ok(leases)
    }

    /// Deletes reclaimed leases whose expiration is older than
    /// `now - older_than_secs`, `batch_size` rows at a time. Each lease is
    /// deleted with its own conditional write; rows changed concurrently are
    /// skipped.
    pub(crate) fn delete_reclaimed(
        &self,
        older_than_secs: u32,
        now: i64,
        batch_size: usize,
    ) -> Result<u64> {
        if !self.ops.registry.strategy().supports_reclaimed_cleanup() {
            tracing::warn!(
                kind = ?X::KIND,
                strategy = ?self.ops.registry.strategy().kind(),
                "reclaimed lease removal is not supported by this schema strategy"
            );
            return Ok(0);
        }
        let cutoff = now - i64::from(older_than_secs);
        let batch_size = batch_size.max(1);
        let mut deleted = 0u64;
        loop {
            let params = [
                CqlValue::Int(LeaseState::ExpiredReclaimed.code()),
                CqlValue::BigInt(cutoff),
                limit_param(batch_size),
            ];
            let batch = self
                .ops
                .select(X::GET_EXPIRE, &params, format!("reclaimed before {cutoff}"))?;
            let mut removed = 0u64;
            for lease in &batch {
                match self.ops.delete(lease) {
                    Ok(()) => removed += 1,
                    Err(LeaseStoreError::NoSuchLease(subject)) => {
                        debug!(lease = %subject, "reclaimed lease changed before removal");
                    }
                    Err(e) => return Err(e),
                }
            }
            deleted += removed;
            if batch.len() < batch_size || removed == 0 {
                break;
            }
        }
        info!(kind = ?X::KIND, deleted, cutoff, "reclaimed leases removed");
        Ok(deleted)
    }
}
