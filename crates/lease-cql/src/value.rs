//! Column values exchanged with a connection and the rows it returns.

use std::fmt;
use std::sync::Arc;

use crate::error::{LeaseStoreError, Result};

/// A single bound parameter or column value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CqlValue {
    Null,
    Boolean(bool),
    Int(i32),
    BigInt(i64),
    Text(String),
    Blob(Vec<u8>),
}

impl CqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }

    /// Integer view accepting every integral encoding a driver may hand back.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CqlValue::Int(v) => Some(i64::from(*v)),
            CqlValue::BigInt(v) => Some(*v),
            CqlValue::Boolean(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CqlValue::Null => "null",
            CqlValue::Boolean(_) => "boolean",
            CqlValue::Int(_) => "int",
            CqlValue::BigInt(_) => "bigint",
            CqlValue::Text(_) => "text",
            CqlValue::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for CqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlValue::Null => f.write_str("null"),
            CqlValue::Boolean(v) => write!(f, "{v}"),
            CqlValue::Int(v) => write!(f, "{v}"),
            CqlValue::BigInt(v) => write!(f, "{v}"),
            CqlValue::Text(v) => write!(f, "'{v}'"),
            CqlValue::Blob(v) => {
                f.write_str("0x")?;
                v.iter().try_for_each(|b| write!(f, "{b:02x}"))
            }
        }
    }
}

impl From<bool> for CqlValue {
    fn from(v: bool) -> Self {
        CqlValue::Boolean(v)
    }
}

impl From<i32> for CqlValue {
    fn from(v: i32) -> Self {
        CqlValue::Int(v)
    }
}

impl From<i64> for CqlValue {
    fn from(v: i64) -> Self {
        CqlValue::BigInt(v)
    }
}

impl From<u32> for CqlValue {
    fn from(v: u32) -> Self {
        CqlValue::BigInt(i64::from(v))
    }
}

impl From<String> for CqlValue {
    fn from(v: String) -> Self {
        CqlValue::Text(v)
    }
}

impl From<&str> for CqlValue {
    fn from(v: &str) -> Self {
        CqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for CqlValue {
    fn from(v: Vec<u8>) -> Self {
        CqlValue::Blob(v)
    }
}

/// A result row. Columns are addressed by name, in the order the statement
/// selected them.
#[derive(Clone, Debug)]
pub struct Row {
    columns: Arc<[&'static str]>,
    values: Vec<CqlValue>,
}

impl Row {
    pub fn new(columns: Arc<[&'static str]>, values: Vec<CqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn values(&self) -> &[CqlValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&CqlValue> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .and_then(|idx| self.values.get(idx))
    }

    fn require(&self, column: &'static str) -> Result<&CqlValue> {
        self.get(column)
            .ok_or_else(|| LeaseStoreError::bad_value(column, "column missing from result row"))
    }

    pub fn is_null(&self, column: &str) -> bool {
        self.get(column).map_or(true, CqlValue::is_null)
    }

    pub fn int(&self, column: &'static str) -> Result<i64> {
        let value = self.require(column)?;
        value.as_i64().ok_or_else(|| {
            let found = value.type_name();
            LeaseStoreError::bad_value(column, format!("expected integer, found {found}"))
        })
    }

    pub fn boolean(&self, column: &'static str) -> Result<bool> {
        match self.require(column)? {
            CqlValue::Null => Ok(false),
            value => match value.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(LeaseStoreError::bad_value(
                    column,
                    format!("expected boolean, found {value}"),
                )),
            },
        }
    }

    /// Blob column; a null reads as empty.
    pub fn blob(&self, column: &'static str) -> Result<Vec<u8>> {
        match self.require(column)? {
            CqlValue::Null => Ok(Vec::new()),
            CqlValue::Blob(bytes) => Ok(bytes.clone()),
            other => Err(LeaseStoreError::bad_value(
                column,
                format!("expected blob, found {}", other.type_name()),
            )),
        }
    }

    /// Text column; a null reads as empty.
    pub fn text(&self, column: &'static str) -> Result<String> {
        match self.require(column)? {
            CqlValue::Null => Ok(String::new()),
            CqlValue::Text(s) => Ok(s.clone()),
            other => Err(LeaseStoreError::bad_value(
                column,
                format!("expected text, found {}", other.type_name()),
            )),
        }
    }
}
