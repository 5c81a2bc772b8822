//! Member entity and its read models.
//!
//! # Invariants
//! - `id` is `None` until the session allocates a key on registration.
//! - `team` is an explicit handle; loading the team is always a caller
//!   decision (`Ref::load`).

use crate::model::audit::{AuditFields, CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY};
use crate::model::entity::{
    ColumnMeta, Entity, EntityId, EntityMeta, IdStrategy, Record, RecordError,
};
use crate::model::reference::Ref;
use crate::model::team::{Team, TEAM_META};
use serde::{Deserialize, Serialize};

pub static MEMBER_META: EntityMeta = EntityMeta {
    name: "Member",
    table: "members",
    id_column: "member_id",
    id_strategy: IdStrategy::Generated,
    columns: &[
        ColumnMeta::mapped("id", "member_id"),
        ColumnMeta::plain("username"),
        ColumnMeta::plain("age"),
        ColumnMeta::reference("team", "team_id", &TEAM_META),
        ColumnMeta::plain(CREATED_AT),
        ColumnMeta::plain(UPDATED_AT),
        ColumnMeta::plain(CREATED_BY),
        ColumnMeta::plain(UPDATED_BY),
    ],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Option<i64>,
    pub username: String,
    pub age: i64,
    pub team: Option<Ref<Team>>,
    pub audit: AuditFields,
}

impl Member {
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_age(username, 0)
    }

    pub fn with_age(username: impl Into<String>, age: i64) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team: None,
            audit: AuditFields::default(),
        }
    }

    /// Creates a member already assigned to `team`.
    ///
    /// The team must have been registered first, otherwise the reference is
    /// left empty.
    pub fn with_team(username: impl Into<String>, age: i64, team: &Team) -> Self {
        let mut member = Self::with_age(username, age);
        member.change_team(team);
        member
    }

    pub fn change_team(&mut self, team: &Team) {
        self.team = Ref::to(team);
    }
}

impl Entity for Member {
    fn meta() -> &'static EntityMeta {
        &MEMBER_META
    }

    fn id(&self) -> Option<EntityId> {
        self.id.map(EntityId::Int)
    }

    fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_record(&self) -> Record {
        let team_id = self.team.as_ref().map(|team| team.id().to_value());
        let mut record = Record::new()
            .with("member_id", self.id)
            .with("username", self.username.clone())
            .with("age", self.age)
            .with("team_id", team_id);
        self.audit.write_to(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self, RecordError> {
        Ok(Self {
            id: Some(record.get_i64("member_id")?),
            username: record.get_text("username")?,
            age: record.get_i64("age")?,
            team: record.get_opt_i64("team_id")?.map(Ref::new),
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

/// Flat member/team read model produced by a join query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    pub id: i64,
    pub username: String,
    pub team_name: Option<String>,
}

impl MemberDto {
    pub fn from_record(record: &Record) -> Result<Self, RecordError> {
        Ok(Self {
            id: record.get_i64("id")?,
            username: record.get_text("username")?,
            team_name: record.get_opt_text("team_name")?,
        })
    }
}
