//! Query derivation engine.
//!
//! # Responsibility
//! - Turn a declared query intent (`QueryDescriptor`) plus arguments into a
//!   `BoundQuery`, validating everything before the session is touched.
//! - Render bound queries into executable `Statement`s, optionally with
//!   ordering, an offset/limit window, or as a count.
//!
//! # Invariants
//! - Execution is always deferred to a `PersistenceSession`; nothing in this
//!   module performs I/O.
//! - Rendered ordering for entity queries ends with `id ASC` unless the
//!   identifier is already ordered, so paging is deterministic across calls.

pub mod derive;
pub mod error;
pub mod params;
pub mod sort;
pub mod template;

use crate::model::entity::EntityMeta;
use derive::{DerivedQuery, QueryKind};
use error::{DerivationError, ParameterBindingError};
use params::Params;
use rusqlite::types::Value;
use sort::{Direction, Sort};
use template::{QueryTemplate, IDENTIFIER_RE};

/// Declared query intent: structured predicate or literal template.
#[derive(Debug, Clone)]
pub enum QueryDescriptor {
    Derived(DerivedQuery),
    Template(QueryTemplate),
}

impl QueryDescriptor {
    pub fn bind(&self, params: &Params) -> Result<BoundQuery, ParameterBindingError> {
        match self {
            Self::Derived(query) => query.bind(params),
            Self::Template(template) => template.bind(params),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Derived(query) => query.label(),
            Self::Template(template) => template.sql(),
        }
    }
}

impl From<DerivedQuery> for QueryDescriptor {
    fn from(value: DerivedQuery) -> Self {
        Self::Derived(value)
    }
}

impl From<QueryTemplate> for QueryDescriptor {
    fn from(value: QueryTemplate) -> Self {
        Self::Template(value)
    }
}

/// Executable SQL with positional `?` parameters in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<Value>,
}

/// Offset/limit pair applied to a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone)]
enum BoundSource {
    Derived {
        query: DerivedQuery,
        values: Vec<Value>,
    },
    Template {
        select: Statement,
        count: Option<Statement>,
        target: Option<&'static EntityMeta>,
    },
}

/// Descriptor with its arguments bound and validated.
#[derive(Debug, Clone)]
pub struct BoundQuery {
    label: String,
    source: BoundSource,
}

impl BoundQuery {
    pub(crate) fn derived(query: DerivedQuery, values: Vec<Value>) -> Self {
        Self {
            label: query.label().to_string(),
            source: BoundSource::Derived { query, values },
        }
    }

    pub(crate) fn template(
        label: String,
        select: Statement,
        count: Option<Statement>,
        target: Option<&'static EntityMeta>,
    ) -> Self {
        Self {
            label,
            source: BoundSource::Template {
                select,
                count,
                target,
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Entity whose full rows this query returns, when known.
    pub fn target(&self) -> Option<&'static EntityMeta> {
        match &self.source {
            BoundSource::Derived { query, .. } => Some(query.meta()),
            BoundSource::Template { target, .. } => *target,
        }
    }

    pub fn kind(&self) -> QueryKind {
        match &self.source {
            BoundSource::Derived { query, .. } => query.kind(),
            BoundSource::Template { .. } => QueryKind::Select,
        }
    }

    /// Renders the row query with all columns.
    pub fn select(&self, sort: &Sort, window: Option<Window>) -> Result<Statement, DerivationError> {
        self.select_columns(None, sort, window)
    }

    /// Renders the row query restricted to `columns` when given.
    pub fn select_columns(
        &self,
        columns: Option<&[&str]>,
        sort: &Sort,
        window: Option<Window>,
    ) -> Result<Statement, DerivationError> {
        let mut statement = match &self.source {
            BoundSource::Derived { query, values } => {
                let meta = query.meta();
                let column_list = match columns {
                    Some(columns) => columns.join(", "),
                    None => meta.select_list(),
                };
                let mut terms: Vec<(String, Direction)> = query
                    .order()
                    .iter()
                    .map(|order| (order.column.to_string(), order.direction))
                    .collect();
                for order in sort.orders() {
                    let column = meta.field(&order.field).ok_or_else(|| {
                        DerivationError::new(&self.label, &order.field, "unknown sort field")
                    })?;
                    terms.push((column.column.to_string(), order.direction));
                }
                push_identifier_tiebreak(&mut terms, meta);

                Statement {
                    sql: format!(
                        "SELECT {column_list} FROM {}{}{}",
                        meta.table,
                        query.where_sql(),
                        order_by_sql(&terms)
                    ),
                    values: values.clone(),
                }
            }
            BoundSource::Template { select, target, .. } => {
                if columns.is_none() && sort.is_unsorted() && window.is_none() {
                    return Ok(select.clone());
                }
                let column_list = columns.map_or_else(|| "*".to_string(), |columns| columns.join(", "));
                let mut terms = Vec::new();
                for order in sort.orders() {
                    let column = match target {
                        Some(meta) => meta
                            .field(&order.field)
                            .map(|column| column.column.to_string())
                            .ok_or_else(|| {
                                DerivationError::new(&self.label, &order.field, "unknown sort field")
                            })?,
                        None if IDENTIFIER_RE.is_match(&order.field) => order.field.clone(),
                        None => {
                            return Err(DerivationError::new(
                                &self.label,
                                &order.field,
                                "invalid sort column",
                            ));
                        }
                    };
                    terms.push((column, order.direction));
                }
                // Entity rows always get a deterministic order, sorted or not.
                if let Some(meta) = target {
                    push_identifier_tiebreak(&mut terms, meta);
                }

                Statement {
                    sql: format!(
                        "SELECT {column_list} FROM ({}) AS q{}",
                        select.sql,
                        order_by_sql(&terms)
                    ),
                    values: select.values.clone(),
                }
            }
        };

        if let Some(window) = window {
            statement.sql.push_str(" LIMIT ? OFFSET ?");
            statement.values.push(Value::Integer(clamp_i64(window.limit)));
            statement.values.push(Value::Integer(clamp_i64(window.offset)));
        }
        Ok(statement)
    }

    /// Renders the count query sharing this query's predicate, without
    /// ordering or window.
    pub fn count(&self) -> Statement {
        match &self.source {
            BoundSource::Derived { query, values } => Statement {
                sql: format!(
                    "SELECT COUNT(*) FROM {}{}",
                    query.meta().table,
                    query.where_sql()
                ),
                values: values.clone(),
            },
            BoundSource::Template { select, count, .. } => match count {
                Some(count) => count.clone(),
                None => Statement {
                    sql: format!("SELECT COUNT(*) FROM ({}) AS q", select.sql),
                    values: select.values.clone(),
                },
            },
        }
    }

    /// Structured predicate as ` WHERE ...` plus its values; templates have
    /// none.
    pub(crate) fn predicate(&self) -> Option<(&'static EntityMeta, String, &[Value])> {
        match &self.source {
            BoundSource::Derived { query, values } => {
                Some((query.meta(), query.where_sql(), values.as_slice()))
            }
            BoundSource::Template { .. } => None,
        }
    }
}

fn push_identifier_tiebreak(terms: &mut Vec<(String, Direction)>, meta: &EntityMeta) {
    if !terms.iter().any(|(column, _)| column == meta.id_column) {
        terms.push((meta.id_column.to_string(), Direction::Asc));
    }
}

fn order_by_sql(terms: &[(String, Direction)]) -> String {
    if terms.is_empty() {
        return String::new();
    }
    let rendered = terms
        .iter()
        .map(|(column, direction)| format!("{column} {}", direction.as_sql()))
        .collect::<Vec<_>>();
    format!(" ORDER BY {}", rendered.join(", "))
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::derive::DerivedQuery;
    use super::params::Params;
    use super::sort::{Direction, Sort};
    use super::template::QueryTemplate;
    use super::Window;
    use crate::model::member::MEMBER_META;
    use rusqlite::types::Value;

    #[test]
    fn derived_select_appends_identifier_tiebreak_and_window() {
        let query = DerivedQuery::parse(&MEMBER_META, "findByAge").unwrap();
        let bound = query.bind(&Params::positional([10_i64])).unwrap();
        let statement = bound
            .select(
                &Sort::by(Direction::Desc, ["username"]),
                Some(Window {
                    offset: 3,
                    limit: 3,
                }),
            )
            .unwrap();

        assert!(statement.sql.ends_with(
            "FROM members WHERE age = ? ORDER BY username DESC, member_id ASC LIMIT ? OFFSET ?"
        ));
        assert_eq!(
            statement.values,
            vec![Value::Integer(10), Value::Integer(3), Value::Integer(3)]
        );
    }

    #[test]
    fn derived_count_drops_ordering() {
        let query = DerivedQuery::parse(&MEMBER_META, "findByAgeOrderByUsernameDesc").unwrap();
        let bound = query.bind(&Params::positional([10_i64])).unwrap();

        assert_eq!(
            bound.count().sql,
            "SELECT COUNT(*) FROM members WHERE age = ?"
        );
    }

    #[test]
    fn entity_template_window_is_ordered_by_identifier() {
        let template = QueryTemplate::new("SELECT * FROM members WHERE age = ?1")
            .unwrap()
            .returning(&MEMBER_META);
        let bound = template.bind(&Params::positional([10_i64])).unwrap();
        let statement = bound
            .select(
                &Sort::unsorted(),
                Some(Window {
                    offset: 0,
                    limit: 3,
                }),
            )
            .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT * FROM (SELECT * FROM members WHERE age = ?) AS q ORDER BY member_id ASC LIMIT ? OFFSET ?"
        );
    }

    #[test]
    fn entity_template_sort_uses_field_names() {
        let template = QueryTemplate::new("SELECT * FROM members")
            .unwrap()
            .returning(&MEMBER_META);
        let bound = template.bind(&Params::None).unwrap();

        let statement = bound.select(&Sort::by(Direction::Desc, ["id"]), None).unwrap();
        assert!(statement.sql.ends_with("AS q ORDER BY member_id DESC"));

        let err = bound
            .select(&Sort::by(Direction::Asc, ["member_id"]), None)
            .unwrap_err();
        assert_eq!(err.token, "member_id");
    }

    #[test]
    fn template_sort_rejects_non_identifiers() {
        let template = QueryTemplate::new("SELECT username FROM members").unwrap();
        let bound = template.bind(&Params::None).unwrap();
        let err = bound
            .select(&Sort::by(Direction::Asc, ["username; DROP TABLE members"]), None)
            .unwrap_err();
        assert_eq!(err.token, "username; DROP TABLE members");
    }
}
