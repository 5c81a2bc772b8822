//! Set-based UPDATE/DELETE statements.
//!
//! # Responsibility
//! - Render one statement that touches every row matching a predicate and
//!   report the affected row count.
//!
//! # Invariants
//! - Bulk statements bypass the identity map. Entities already managed by
//!   the session keep their old state until the caller `clear`s it.

use crate::model::entity::EntityMeta;
use crate::query::derive::DerivedQuery;
use crate::query::error::DerivationError;
use crate::query::params::Params;
use crate::query::template::QueryTemplate;
use crate::query::Statement;
use crate::repo::{RepoError, RepoResult};
use crate::session::PersistenceSession;
use log::{info, warn};
use rusqlite::types::Value;

/// Right-hand side of one `SET` assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateExpr {
    /// `column = value`
    Set(Value),
    /// `column = column + delta`
    Add(i64),
}

#[derive(Debug, Clone)]
enum BulkKind {
    Update {
        predicate: DerivedQuery,
        assignments: Vec<(&'static str, UpdateExpr)>,
    },
    Delete {
        predicate: DerivedQuery,
    },
    Template(QueryTemplate),
}

/// Declared bulk mutation.
#[derive(Debug, Clone)]
pub struct BulkMutation {
    kind: BulkKind,
}

impl BulkMutation {
    /// UPDATE of every row matching `predicate`. Add assignments with `set`.
    pub fn update(predicate: DerivedQuery) -> Self {
        Self {
            kind: BulkKind::Update {
                predicate,
                assignments: Vec::new(),
            },
        }
    }

    /// DELETE of every row matching `predicate`.
    pub fn delete(predicate: DerivedQuery) -> Self {
        Self {
            kind: BulkKind::Delete { predicate },
        }
    }

    /// Literal UPDATE/DELETE statement.
    pub fn template(template: QueryTemplate) -> Self {
        Self {
            kind: BulkKind::Template(template),
        }
    }

    /// Adds `field = expr`. Only valid on `update` mutations.
    pub fn set(mut self, field: &str, expr: UpdateExpr) -> Result<Self, DerivationError> {
        let BulkKind::Update {
            predicate,
            assignments,
        } = &mut self.kind
        else {
            return Err(DerivationError::new(
                "bulk mutation",
                field,
                "assignments need an update mutation for",
            ));
        };
        let meta = predicate.meta();
        let column = meta
            .field(field)
            .ok_or_else(|| DerivationError::new(predicate.label(), field, "unknown field"))?;
        if column.column == meta.id_column {
            return Err(DerivationError::new(
                predicate.label(),
                field,
                "identifier cannot be reassigned by",
            ));
        }
        assignments.push((column.column, expr));
        Ok(self)
    }

    /// Target table, when known from metadata.
    pub fn target(&self) -> Option<&'static EntityMeta> {
        match &self.kind {
            BulkKind::Update { predicate, .. } | BulkKind::Delete { predicate } => {
                Some(predicate.meta())
            }
            BulkKind::Template(template) => template.target(),
        }
    }

    /// Binds `params` and renders the statement.
    pub fn to_statement(&self, params: &Params) -> RepoResult<Statement> {
        match &self.kind {
            BulkKind::Update {
                predicate,
                assignments,
            } => {
                if assignments.is_empty() {
                    return Err(RepoError::InvalidArgument(format!(
                        "bulk update `{}` has no assignments",
                        predicate.label()
                    )));
                }
                let bound = predicate.bind(params)?;
                let Some((meta, where_sql, predicate_values)) = bound.predicate() else {
                    return Err(RepoError::InvalidArgument(
                        "bulk update needs a structured predicate".to_string(),
                    ));
                };

                let mut set_terms = Vec::with_capacity(assignments.len());
                let mut values = Vec::new();
                for (column, expr) in assignments {
                    match expr {
                        UpdateExpr::Set(value) => {
                            set_terms.push(format!("{column} = ?"));
                            values.push(value.clone());
                        }
                        UpdateExpr::Add(delta) => {
                            set_terms.push(format!("{column} = {column} + ?"));
                            values.push(Value::Integer(*delta));
                        }
                    }
                }
                values.extend(predicate_values.iter().cloned());

                Ok(Statement {
                    sql: format!("UPDATE {} SET {}{}", meta.table, set_terms.join(", "), where_sql),
                    values,
                })
            }
            BulkKind::Delete { predicate } => {
                let bound = predicate.bind(params)?;
                let Some((meta, where_sql, values)) = bound.predicate() else {
                    return Err(RepoError::InvalidArgument(
                        "bulk delete needs a structured predicate".to_string(),
                    ));
                };
                Ok(Statement {
                    sql: format!("DELETE FROM {}{}", meta.table, where_sql),
                    values: values.to_vec(),
                })
            }
            BulkKind::Template(template) => Ok(template.render(params)?),
        }
    }
}

/// Runs `mutation` and returns the affected row count.
pub fn execute_bulk<S: PersistenceSession>(
    session: &mut S,
    mutation: &BulkMutation,
    params: &Params,
) -> RepoResult<usize> {
    let statement = mutation.to_statement(params)?;
    let affected = session.execute_update(&statement)?;
    let target = mutation.target().map_or("template", |meta| meta.table);
    let managed = session.managed_len();

    if managed > 0 {
        warn!(
            "event=bulk_mutation module=bulk status=ok target={target} affected={affected} managed={managed} identity_map=stale"
        );
    } else {
        info!(
            "event=bulk_mutation module=bulk status=ok target={target} affected={affected} managed=0"
        );
    }
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::{BulkMutation, UpdateExpr};
    use crate::model::member::MEMBER_META;
    use crate::query::derive::DerivedQuery;
    use crate::query::params::Params;
    use crate::query::template::QueryTemplate;
    use crate::repo::RepoError;
    use rusqlite::types::Value;

    #[test]
    fn update_renders_assignments_before_predicate_values() {
        let predicate = DerivedQuery::parse(&MEMBER_META, "findByAgeGreaterThan").unwrap();
        let mutation = BulkMutation::update(predicate)
            .set("age", UpdateExpr::Add(10))
            .unwrap();

        let statement = mutation.to_statement(&Params::positional([18_i64])).unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE members SET age = age + ? WHERE age > ?"
        );
        assert_eq!(statement.values, vec![Value::Integer(10), Value::Integer(18)]);
    }

    #[test]
    fn delete_reuses_predicate() {
        let predicate = DerivedQuery::parse(&MEMBER_META, "findByUsername").unwrap();
        let statement = BulkMutation::delete(predicate)
            .to_statement(&Params::positional(["member1"]))
            .unwrap();
        assert_eq!(statement.sql, "DELETE FROM members WHERE username = ?");
    }

    #[test]
    fn identifier_and_unknown_fields_cannot_be_assigned() {
        let predicate = DerivedQuery::parse(&MEMBER_META, "findByAge").unwrap();
        let err = BulkMutation::update(predicate.clone())
            .set("id", UpdateExpr::Add(1))
            .unwrap_err();
        assert_eq!(err.token, "id");

        let err = BulkMutation::update(predicate)
            .set("nickname", UpdateExpr::Set(Value::Null))
            .unwrap_err();
        assert_eq!(err.token, "nickname");
    }

    #[test]
    fn update_without_assignments_is_rejected() {
        let predicate = DerivedQuery::parse(&MEMBER_META, "findByAge").unwrap();
        let err = BulkMutation::update(predicate)
            .to_statement(&Params::positional([10_i64]))
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidArgument(_)));
    }

    #[test]
    fn template_binding_is_checked() {
        let template =
            QueryTemplate::new("UPDATE members SET age = age + 1 WHERE age >= :age").unwrap();
        let err = BulkMutation::template(template)
            .to_statement(&Params::None)
            .unwrap_err();
        assert!(matches!(err, RepoError::ParameterBinding(_)));
    }
}
