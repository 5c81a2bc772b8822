//! Team entity: the "one" side of the member/team relation.

use crate::model::audit::{AuditFields, CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY};
use crate::model::entity::{
    ColumnMeta, Entity, EntityId, EntityMeta, IdStrategy, Record, RecordError,
};
use serde::{Deserialize, Serialize};

pub static TEAM_META: EntityMeta = EntityMeta {
    name: "Team",
    table: "teams",
    id_column: "team_id",
    id_strategy: IdStrategy::Generated,
    columns: &[
        ColumnMeta::mapped("id", "team_id"),
        ColumnMeta::plain("name"),
        ColumnMeta::plain(CREATED_AT),
        ColumnMeta::plain(UPDATED_AT),
        ColumnMeta::plain(CREATED_BY),
        ColumnMeta::plain(UPDATED_BY),
    ],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Option<i64>,
    pub name: String,
    pub audit: AuditFields,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            audit: AuditFields::default(),
        }
    }
}

impl Entity for Team {
    fn meta() -> &'static EntityMeta {
        &TEAM_META
    }

    fn id(&self) -> Option<EntityId> {
        self.id.map(EntityId::Int)
    }

    fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("team_id", self.id)
            .with("name", self.name.clone());
        self.audit.write_to(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, RecordError> {
        Ok(Self {
            id: Some(record.get_i64("team_id")?),
            name: record.get_text("name")?,
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
