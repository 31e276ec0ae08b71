/// Failures surfaced by the lease store.
///
/// Validation variants (`BadValue`, `FieldTooLong`) are raised before any
/// statement reaches the connection. `NoSuchLease` is the outcome of a
/// conditional write that was not applied and is recoverable by reloading.
#[derive(thiserror::Error, Debug)]
pub enum LeaseStoreError {
    #[error("invalid value for {field}: {reason}")]
    BadValue { field: &'static str, reason: String },
    #[error("{field} is {len} bytes long, maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("operation failed: {0}")]
    OperationError(String),
    #[error("lease {0} was not updated: stored expiration changed or lease is gone")]
    NoSuchLease(String),
    #[error("multiple records found for {0}")]
    MultipleRecordsFound(String),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error(
        "lease schema version mismatch: expected {expected_major}.{expected_minor}, \
         found {found_major}.{found_minor}"
    )]
    SchemaVersionMismatch {
        expected_major: i64,
        expected_minor: i64,
        found_major: i64,
        found_minor: i64,
    },
    #[error("{context}: {source:#}")]
    Backend {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl LeaseStoreError {
    pub(crate) fn bad_value(field: &'static str, reason: impl Into<String>) -> Self {
        LeaseStoreError::BadValue {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn backend(context: impl Into<String>, source: anyhow::Error) -> Self {
        LeaseStoreError::Backend {
            context: context.into(),
            source,
        }
    }

    /// Whether the failure is a stale-state conflict the caller may resolve by
    /// reloading the lease.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LeaseStoreError::NoSuchLease(_))
    }
}

pub type Result<T, E = LeaseStoreError> = std::result::Result<T, E>;

/// Fails with `FieldTooLong` when `len` exceeds `max`.
pub(crate) fn check_len(field: &'static str, len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(LeaseStoreError::FieldTooLong { field, len, max });
    }
    Ok(())
}
