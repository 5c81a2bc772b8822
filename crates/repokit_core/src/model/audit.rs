//! Audit metadata block shared by all audited entities.
//!
//! # Invariants
//! - Timestamps are Unix epoch milliseconds.
//! - A freshly inserted row has `created_at == updated_at` and
//!   `created_by == updated_by`.
//! - Only the auditing hook writes these fields; callers read them.

use crate::model::entity::{Record, RecordError};
use serde::{Deserialize, Serialize};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const CREATED_BY: &str = "created_by";
pub const UPDATED_BY: &str = "updated_by";

/// Creation/modification timestamps and actors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFields {
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

impl AuditFields {
    /// Appends the four audit columns to a row image.
    pub fn write_to(&self, record: &mut Record) {
        record.push(CREATED_AT, self.created_at);
        record.push(UPDATED_AT, self.updated_at);
        record.push(CREATED_BY, self.created_by.clone());
        record.push(UPDATED_BY, self.updated_by.clone());
    }

    pub fn read_from(record: &Record) -> Result<Self, RecordError> {
        Ok(Self {
            created_at: record.get_opt_i64(CREATED_AT)?,
            updated_at: record.get_opt_i64(UPDATED_AT)?,
            created_by: record.get_opt_text(CREATED_BY)?,
            updated_by: record.get_opt_text(UPDATED_BY)?,
        })
    }
}
