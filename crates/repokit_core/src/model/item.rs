//! Item entity with an externally assigned text identifier.
//!
//! # Invariants
//! - `id` is set by the caller before registration and never reused.
//! - Newness is decided by `audit.created_at`, not by the identifier, so an
//!   assigned id is never mistaken for an existing row.

use crate::model::audit::{AuditFields, CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY};
use crate::model::entity::{
    ColumnMeta, Entity, EntityId, EntityMeta, IdStrategy, Record, RecordError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub static ITEM_META: EntityMeta = EntityMeta {
    name: "Item",
    table: "items",
    id_column: "item_id",
    id_strategy: IdStrategy::Assigned,
    columns: &[
        ColumnMeta::mapped("id", "item_id"),
        ColumnMeta::plain(CREATED_AT),
        ColumnMeta::plain(UPDATED_AT),
        ColumnMeta::plain(CREATED_BY),
        ColumnMeta::plain(UPDATED_BY),
    ],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub audit: AuditFields,
}

impl Item {
    /// Creates an item with a generated random identifier.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Creates an item with a caller-provided identifier (import/sync paths).
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            audit: AuditFields::default(),
        }
    }
}

impl Default for Item {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for Item {
    fn meta() -> &'static EntityMeta {
        &ITEM_META
    }

    fn id(&self) -> Option<EntityId> {
        Some(EntityId::Text(self.id.clone()))
    }

    fn is_new(&self) -> bool {
        self.audit.created_at.is_none()
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new().with("item_id", self.id.clone());
        self.audit.write_to(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, RecordError> {
        Ok(Self {
            id: record.get_text("item_id")?,
            audit: AuditFields::read_from(record)?,
        })
    }

    fn audit(&self) -> Option<&AuditFields> {
        Some(&self.audit)
    }

    fn audit_mut(&mut self) -> Option<&mut AuditFields> {
        Some(&mut self.audit)
    }
}
