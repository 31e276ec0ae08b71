//! Statement execution shared by both lease kinds.

use std::fmt::Display;

use tracing::{debug, warn};

use crate::connection::{CqlConnection, QueryResult};
use crate::error::{LeaseStoreError, Result};
use crate::exchange::{LeaseExchange, LeaseRecord};
use crate::registry::{Statement, StatementRegistry, StatementTag};
use crate::value::CqlValue;

/// Borrowed view of a store specialised to one lease kind.
pub(crate) struct KindOps<'a, X: LeaseExchange> {
    pub(crate) conn: &'a dyn CqlConnection,
    pub(crate) registry: &'a StatementRegistry,
    pub(crate) exchange: &'a X,
}

/// Converts a page size or row cap into a `LIMIT` parameter.
pub(crate) fn limit_param(n: usize) -> CqlValue {
    CqlValue::Int(i32::try_from(n).unwrap_or(i32::MAX))
}

impl<'a, X: LeaseExchange> KindOps<'a, X> {
    pub(crate) fn run(
        &self,
        statement: &Statement,
        params: &[CqlValue],
        subject: impl Display,
    ) -> Result<QueryResult> {
        self.conn
            .execute(statement, params)
            .map_err(|e| LeaseStoreError::backend(format!("{} for {subject}", statement.id()), e))
    }

    /// Runs a lookup and converts every returned row.
    pub(crate) fn select(
        &self,
        tag: StatementTag,
        params: &[CqlValue],
        subject: impl Display,
    ) -> Result<Vec<X::Lease>> {
        let statement = self.registry.primary(tag);
        let result = self.run(statement, params, subject)?;
        result
            .rows
            .iter()
            .map(|row| self.exchange.retrieve(row))
            .collect()
    }

    /// Lookup by a key defined to be unique.
    pub(crate) fn select_one(
        &self,
        tag: StatementTag,
        params: &[CqlValue],
        subject: impl Display,
    ) -> Result<Option<X::Lease>> {
        let subject = subject.to_string();
        let mut leases = self.select(tag, params, &subject)?;
        if leases.len() > 1 {
            return Err(LeaseStoreError::MultipleRecordsFound(subject));
        }
        Ok(leases.pop())
    }

    /// Inserts into the primary table, then into each mirror the lease has
    /// a key for. Mirror rows already written stay in place if a later
    /// mirror rejects the insert.
    pub(crate) fn insert(&self, lease: &mut X::Lease) -> Result<bool> {
        let record = self.exchange.to_record(lease)?;
        let subject = X::describe(lease);
        let primary = self.registry.primary(X::INSERT);
        let params = self.exchange.bind_for_insert(lease, primary)?;
        if !self.run(primary, &params, &subject)?.applied {
            debug!(lease = %subject, "lease already present");
            return Ok(false);
        }
        for mirror in self.registry.mirrors(X::INSERT) {
            if !record.has_key_for(mirror.table()) {
                continue;
            }
            let params = record.bind(mirror, 0);
            if !self.run(mirror, &params, &subject)?.applied {
                warn!(
                    lease = %subject,
                    table = mirror.table().name,
                    "mirror insert rejected, earlier rows are kept"
                );
                return Ok(false);
            }
        }
        X::set_observed_expire(lease, X::expire(lease));
        Ok(true)
    }

    /// Conditional update on the primary row followed by a mirror refresh.
    pub(crate) fn update(&self, lease: &mut X::Lease) -> Result<()> {
        let record = self.exchange.to_record(lease)?;
        let subject = X::describe(lease);
        let mirrors = self.registry.mirrors(X::UPDATE);

        let previous = if mirrors.is_empty() {
            None
        } else {
            self.fetch_stored(&record, &subject)?
        };

        let primary = self.registry.primary(X::UPDATE);
        let params = self.exchange.bind_for_update(lease, primary)?;
        if !self.run(primary, &params, &subject)?.applied {
            return Err(LeaseStoreError::NoSuchLease(subject));
        }

        for mirror in mirrors {
            let table = mirror.table();
            if let Some(old) = &previous {
                let moved =
                    !record.has_key_for(table) || old.key_for(table) != record.key_for(table);
                if old.has_key_for(table) && moved {
                    if let Some(delete) = self.registry.for_table(X::DELETE, table) {
                        self.run(delete, &old.bind(delete, 0), &subject)?;
                    }
                }
            }
            if record.has_key_for(table) {
                self.run(mirror, &record.bind(mirror, 0), &subject)?;
            }
        }
        X::set_observed_expire(lease, X::expire(lease));
        Ok(())
    }

    /// Conditional delete of the primary row, then of every mirror row.
    /// Mirror rows are keyed from the stored row, not from `lease`, whose
    /// natural keys may have changed since it was read.
    pub(crate) fn delete(&self, lease: &X::Lease) -> Result<()> {
        let record = self.exchange.to_record(lease)?;
        let subject = X::describe(lease);
        let mirrors = self.registry.mirrors(X::DELETE);

        let stored = if mirrors.is_empty() {
            None
        } else {
            self.fetch_stored(&record, &subject)?
        };

        let primary = self.registry.primary(X::DELETE);
        let params = self.exchange.bind_for_delete(lease, primary)?;
        if !self.run(primary, &params, &subject)?.applied {
            return Err(LeaseStoreError::NoSuchLease(subject));
        }
        let keyed = stored.as_ref().unwrap_or(&record);
        for mirror in mirrors {
            if keyed.has_key_for(mirror.table()) {
                self.run(mirror, &keyed.bind(mirror, 0), &subject)?;
            }
        }
        Ok(())
    }

    /// Token-ordered page. `lower` holds the partition key of the last row
    /// of the previous page, `None` for the first page.
    pub(crate) fn page(
        &self,
        lower: Option<Vec<CqlValue>>,
        page_size: usize,
    ) -> Result<Vec<X::Lease>> {
        if page_size == 0 {
            return Err(LeaseStoreError::bad_value(
                "page_size",
                "must be greater than zero",
            ));
        }
        match lower {
            None => self.select(X::GET_LIMIT, &[limit_param(page_size)], "first page"),
            Some(mut params) => {
                let subject = format!("page after {params:?}");
                params.push(limit_param(page_size));
                self.select(X::GET_PAGE, &params, subject)
            }
        }
    }

    /// Row currently stored under the lease's primary key.
    fn fetch_stored(&self, record: &LeaseRecord, subject: &str) -> Result<Option<LeaseRecord>> {
        let statement = self.registry.primary(X::GET_ADDR);
        let params = record.bind(statement, 0);
        match self.select_one(X::GET_ADDR, &params, subject)? {
            Some(stored) => Ok(Some(self.exchange.to_record(&stored)?)),
            None => Ok(None),
        }
    }
}
