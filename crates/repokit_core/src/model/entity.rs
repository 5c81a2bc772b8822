//! Entity contract and static mapping metadata.
//!
//! # Responsibility
//! - Describe how a Rust record maps onto one table (`EntityMeta`).
//! - Define the neutral row shape (`Record`) exchanged with the session.
//!
//! # Invariants
//! - `EntityMeta::columns` lists the identifier column first.
//! - An `EntityId` uniquely determines at most one live row per table.
//! - `Entity::is_new` is entity-supplied; the session never infers it from
//!   the identifier alone.

use crate::model::audit::AuditFields;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Identifier of one persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Surrogate numeric key.
    Int(i64),
    /// Externally assigned text key.
    Text(String),
}

impl EntityId {
    /// Converts the identifier into a SQLite bind value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(value) => Value::Integer(*value),
            Self::Text(value) => Value::Text(value.clone()),
        }
    }

    /// Reads an identifier back from a column value. `NULL` yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(value) => Some(Self::Int(*value)),
            Value::Text(value) => Some(Self::Text(value.clone())),
            _ => None,
        }
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// How an entity obtains its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// Allocated by the session from `id_sequences` on registration.
    Generated,
    /// Supplied by the caller before the entity is registered.
    Assigned,
}

/// Mapping of one entity field onto one table column.
#[derive(Debug)]
pub struct ColumnMeta {
    /// Rust-side field name, used by derived queries and projections.
    pub field: &'static str,
    /// SQL column name.
    pub column: &'static str,
    /// Target of a many-to-one reference stored in this column.
    pub references: Option<&'static EntityMeta>,
}

impl ColumnMeta {
    /// Plain column whose field and column names differ.
    pub const fn mapped(field: &'static str, column: &'static str) -> Self {
        Self {
            field,
            column,
            references: None,
        }
    }

    /// Plain column whose field and column names match.
    pub const fn plain(name: &'static str) -> Self {
        Self::mapped(name, name)
    }

    /// Many-to-one reference column.
    pub const fn reference(
        field: &'static str,
        column: &'static str,
        target: &'static EntityMeta,
    ) -> Self {
        Self {
            field,
            column,
            references: Some(target),
        }
    }
}

/// Static table mapping for one entity type.
#[derive(Debug)]
pub struct EntityMeta {
    /// Entity name used in logs and error messages.
    pub name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub id_strategy: IdStrategy,
    /// All mapped columns, identifier first.
    pub columns: &'static [ColumnMeta],
}

impl EntityMeta {
    /// Looks up a column by its Rust field name.
    pub fn field(&self, field: &str) -> Option<&'static ColumnMeta> {
        self.columns.iter().find(|column| column.field == field)
    }

    /// Looks up a column by its SQL name.
    pub fn column(&self, column: &str) -> Option<&'static ColumnMeta> {
        self.columns.iter().find(|meta| meta.column == column)
    }

    /// Comma separated column list for `SELECT`.
    pub fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|column| column.column)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns whether both handles describe the same table.
    pub fn same_as(&self, other: &EntityMeta) -> bool {
        std::ptr::eq(self, other) || self.table == other.table
    }
}

/// Ordered column/value pairs of one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Appends a column, replacing an earlier value with the same name.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    /// Value of the first column, used by scalar queries.
    pub fn first(&self) -> Option<&Value> {
        self.entries.first().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn require(&self, column: &str) -> Result<&Value, RecordError> {
        self.get(column)
            .ok_or_else(|| RecordError::MissingColumn(column.to_string()))
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, RecordError> {
        match self.require(column)? {
            Value::Integer(value) => Ok(*value),
            _ => Err(RecordError::type_mismatch(column, "integer")),
        }
    }

    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>, RecordError> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(*value)),
            _ => Err(RecordError::type_mismatch(column, "integer or null")),
        }
    }

    pub fn get_text(&self, column: &str) -> Result<String, RecordError> {
        match self.require(column)? {
            Value::Text(value) => Ok(value.clone()),
            _ => Err(RecordError::type_mismatch(column, "text")),
        }
    }

    pub fn get_opt_text(&self, column: &str) -> Result<Option<String>, RecordError> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value.clone())),
            _ => Err(RecordError::type_mismatch(column, "text or null")),
        }
    }
}

/// Row decoding failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    MissingColumn(String),
    TypeMismatch {
        column: String,
        expected: &'static str,
    },
}

impl RecordError {
    fn type_mismatch(column: &str, expected: &'static str) -> Self {
        Self::TypeMismatch {
            column: column.to_string(),
            expected,
        }
    }
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn(column) => write!(f, "missing column `{column}`"),
            Self::TypeMismatch { column, expected } => {
                write!(f, "column `{column}` is not {expected}")
            }
        }
    }
}

impl Error for RecordError {}

/// Persisted record type managed by a `PersistenceSession`.
pub trait Entity: Clone + 'static {
    fn meta() -> &'static EntityMeta;

    /// Current identifier; `None` while a generated key is not yet allocated.
    fn id(&self) -> Option<EntityId>;

    /// Receives a generated key. Only called for `IdStrategy::Generated`.
    fn assign_id(&mut self, _id: i64) {}

    /// Whether a save must insert rather than update.
    fn is_new(&self) -> bool {
        self.id().is_none()
    }

    /// Full row image in `meta().columns` order.
    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self, RecordError>;

    fn audit(&self) -> Option<&AuditFields> {
        None
    }

    fn audit_mut(&mut self) -> Option<&mut AuditFields> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityId, Record, RecordError};
    use rusqlite::types::Value;

    #[test]
    fn record_push_replaces_existing_column() {
        let mut record = Record::new().with("age", 10).with("username", "m1".to_string());
        record.push("age", 20);

        assert_eq!(record.len(), 2);
        assert_eq!(record.get_i64("age"), Ok(20));
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["age", "username"]);
    }

    #[test]
    fn record_getters_report_missing_and_mismatched_columns() {
        let record = Record::new().with("username", "m1".to_string()).with("team_id", Value::Null);

        assert_eq!(
            record.get_i64("age"),
            Err(RecordError::MissingColumn("age".to_string()))
        );
        assert!(matches!(
            record.get_i64("username"),
            Err(RecordError::TypeMismatch { .. })
        ));
        assert_eq!(record.get_opt_i64("team_id"), Ok(None));
    }

    #[test]
    fn entity_id_roundtrips_through_values() {
        let int_id = EntityId::from(7);
        let text_id = EntityId::from("item-a");

        assert_eq!(EntityId::from_value(&int_id.to_value()), Some(int_id));
        assert_eq!(EntityId::from_value(&text_id.to_value()), Some(text_id));
        assert_eq!(EntityId::from_value(&Value::Null), None);
    }
}
