//! Structured query derivation.
//!
//! # Responsibility
//! - Decompose a query-method name (`findByUsernameAndAgeGreaterThan`) into
//!   an ordered chain of `(field, comparator)` clauses plus static ordering.
//! - Offer the same descriptor through a builder, without string parsing.
//!
//! # Invariants
//! - Clauses keep declaration order and are joined with AND only.
//! - Every field is resolved against `EntityMeta` when the descriptor is
//!   built; an unknown token fails with `DerivationError` naming it.
//! - Argument count is checked when binding, before any SQL is issued.

use crate::model::entity::{ColumnMeta, EntityMeta};
use crate::query::error::{DerivationError, ParameterBindingError};
use crate::query::params::{Arg, Params};
use crate::query::sort::Direction;
use crate::query::BoundQuery;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;

static METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|read|get|query|count)([A-Z][A-Za-z0-9]*?)??By([A-Z][A-Za-z0-9]*)$")
        .expect("valid query method regex")
});
static ORDER_TERM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Za-z0-9]*?)(Asc|Desc)").expect("valid order term regex"));

const ORDER_BY: &str = "OrderBy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equals,
    GreaterThan,
}

impl Comparator {
    pub fn sql_operator(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::GreaterThan => ">",
        }
    }
}

/// One conjunctive predicate term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clause {
    pub field: &'static str,
    pub column: &'static str,
    pub comparator: Comparator,
}

/// Static ordering term resolved against entity metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOrder {
    pub field: &'static str,
    pub column: &'static str,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Count,
}

/// Validated structured query descriptor.
#[derive(Debug, Clone)]
pub struct DerivedQuery {
    label: String,
    meta: &'static EntityMeta,
    kind: QueryKind,
    clauses: Vec<Clause>,
    order: Vec<ResolvedOrder>,
}

impl DerivedQuery {
    /// Unfiltered query over the whole table.
    pub fn all(meta: &'static EntityMeta) -> Self {
        Self {
            label: format!("{} findAll", meta.name),
            meta,
            kind: QueryKind::Select,
            clauses: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Parses a query-method name against `meta`.
    ///
    /// Accepted shape: `(find|read|get|query|count)[Subject]By<Predicate>[OrderBy<Terms>]`
    /// where `<Predicate>` is `Field[GreaterThan|Equals|Is]` terms joined by
    /// `And`, and `<Terms>` is `Field[Asc|Desc]` repeated.
    pub fn parse(meta: &'static EntityMeta, method: &str) -> Result<Self, DerivationError> {
        let captures = METHOD_RE
            .captures(method)
            .ok_or_else(|| DerivationError::new(method, method, "unrecognised query method"))?;

        let kind = if &captures[1] == "count" {
            QueryKind::Count
        } else {
            QueryKind::Select
        };
        let tail = captures.get(3).map_or("", |matched| matched.as_str());
        let (predicate, ordering) = match tail.find(ORDER_BY) {
            Some(index) => (&tail[..index], Some(&tail[index + ORDER_BY.len()..])),
            None => (tail, None),
        };

        if predicate.is_empty() {
            return Err(DerivationError::new(method, tail, "empty predicate in"));
        }

        let clauses = split_conjunction(predicate)
            .into_iter()
            .map(|part| resolve_clause(method, meta, part))
            .collect::<Result<Vec<_>, _>>()?;

        let order = match ordering {
            Some(terms) => parse_ordering(method, meta, terms)?,
            None => Vec::new(),
        };

        Ok(Self {
            label: method.to_string(),
            meta,
            kind,
            clauses,
            order,
        })
    }

    pub fn builder(meta: &'static EntityMeta) -> DerivedQueryBuilder {
        DerivedQueryBuilder {
            query: Self {
                label: format!("{} criteria", meta.name),
                ..Self::all(meta)
            },
            error: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn order(&self) -> &[ResolvedOrder] {
        &self.order
    }

    /// Binds one argument per clause, positionally or by field name.
    pub fn bind(&self, params: &Params) -> Result<BoundQuery, ParameterBindingError> {
        let values = match params {
            Params::None => Vec::new(),
            Params::Positional(args) => args
                .iter()
                .map(|arg| self.scalar(arg))
                .collect::<Result<Vec<_>, _>>()?,
            Params::Named(args) => {
                if let Some((unknown, _)) = args
                    .iter()
                    .find(|(name, _)| !self.clauses.iter().any(|clause| clause.field == name.as_str()))
                {
                    return Err(ParameterBindingError::new(
                        &self.label,
                        format!("unexpected argument `:{unknown}`"),
                    ));
                }
                self.clauses
                    .iter()
                    .map(|clause| {
                        let arg = params.named_arg(clause.field).ok_or_else(|| {
                            ParameterBindingError::new(
                                &self.label,
                                format!("missing argument `:{}`", clause.field),
                            )
                        })?;
                        self.scalar(arg)
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        if values.len() != self.clauses.len() {
            return Err(ParameterBindingError::count_mismatch(
                &self.label,
                self.clauses.len(),
                values.len(),
            ));
        }

        Ok(BoundQuery::derived(self.clone(), values))
    }

    /// `column op ?` terms joined by AND, or an empty string.
    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            return String::new();
        }
        let terms = self
            .clauses
            .iter()
            .map(|clause| format!("{} {} ?", clause.column, clause.comparator.sql_operator()))
            .collect::<Vec<_>>();
        format!(" WHERE {}", terms.join(" AND "))
    }

    fn scalar(&self, arg: &Arg) -> Result<Value, ParameterBindingError> {
        match arg {
            Arg::One(value) => Ok(value.clone()),
            Arg::Many(_) => Err(ParameterBindingError::new(
                &self.label,
                "list arguments are not supported by derived comparators",
            )),
        }
    }
}

/// Builder producing the same descriptor as `DerivedQuery::parse`.
///
/// The first invalid field is remembered and reported by `build`.
#[derive(Debug, Clone)]
pub struct DerivedQueryBuilder {
    query: DerivedQuery,
    error: Option<DerivationError>,
}

impl DerivedQueryBuilder {
    pub fn eq(self, field: &str) -> Self {
        self.clause(field, Comparator::Equals)
    }

    pub fn gt(self, field: &str) -> Self {
        self.clause(field, Comparator::GreaterThan)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        if let Some(column) = self.lookup(field, "unknown sort field") {
            self.query.order.push(ResolvedOrder {
                field: column.field,
                column: column.column,
                direction,
            });
        }
        self
    }

    /// Turns the descriptor into a count query.
    pub fn counting(mut self) -> Self {
        self.query.kind = QueryKind::Count;
        self
    }

    pub fn build(self) -> Result<DerivedQuery, DerivationError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.query),
        }
    }

    fn clause(mut self, field: &str, comparator: Comparator) -> Self {
        if let Some(column) = self.lookup(field, "unknown field") {
            self.query.clauses.push(Clause {
                field: column.field,
                column: column.column,
                comparator,
            });
        }
        self
    }

    fn lookup(&mut self, field: &str, reason: &'static str) -> Option<&'static ColumnMeta> {
        let column = self.query.meta.field(field);
        if column.is_none() && self.error.is_none() {
            self.error = Some(DerivationError::new(&self.query.label, field, reason));
        }
        column
    }
}

/// Splits `UsernameAndAgeGreaterThan` at every `And` that starts a new
/// capitalised token.
fn split_conjunction(predicate: &str) -> Vec<&str> {
    let bytes = predicate.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut index = 1;
    while index + 3 < bytes.len() {
        if &predicate[index..index + 3] == "And" && bytes[index + 3].is_ascii_uppercase() {
            parts.push(&predicate[start..index]);
            start = index + 3;
            index = start + 1;
            continue;
        }
        index += 1;
    }
    parts.push(&predicate[start..]);
    parts
}

fn split_comparator(part: &str) -> (&str, Comparator) {
    if let Some(field) = part.strip_suffix("GreaterThan") {
        return (field, Comparator::GreaterThan);
    }
    for suffix in ["Equals", "Is"] {
        if let Some(field) = part.strip_suffix(suffix) {
            if !field.is_empty() {
                return (field, Comparator::Equals);
            }
        }
    }
    (part, Comparator::Equals)
}

fn resolve_clause(
    method: &str,
    meta: &'static EntityMeta,
    part: &str,
) -> Result<Clause, DerivationError> {
    let (field_token, comparator) = split_comparator(part);
    if field_token.is_empty() {
        return Err(DerivationError::new(method, part, "missing field name in"));
    }

    let column = meta
        .field(&to_snake_case(field_token))
        .ok_or_else(|| unknown_field(method, part))?;
    Ok(Clause {
        field: column.field,
        column: column.column,
        comparator,
    })
}

fn unknown_field(method: &str, token: &str) -> DerivationError {
    if has_disjunction(token) {
        DerivationError::new(method, token, "OR predicates are not supported")
    } else {
        DerivationError::new(method, token, "unknown field")
    }
}

fn has_disjunction(token: &str) -> bool {
    let bytes = token.as_bytes();
    (1..bytes.len().saturating_sub(2))
        .any(|index| &token[index..index + 2] == "Or" && bytes[index + 2].is_ascii_uppercase())
}

fn parse_ordering(
    method: &str,
    meta: &'static EntityMeta,
    terms: &str,
) -> Result<Vec<ResolvedOrder>, DerivationError> {
    if terms.is_empty() {
        return Err(DerivationError::new(method, ORDER_BY, "missing ordering field after"));
    }

    let mut rest = terms;
    let mut orders = Vec::new();
    while !rest.is_empty() {
        let (field_token, direction, consumed) = match ORDER_TERM_RE.captures(rest) {
            Some(captures) => {
                let direction = if &captures[2] == "Desc" {
                    Direction::Desc
                } else {
                    Direction::Asc
                };
                let consumed = captures.get(0).map_or(rest.len(), |matched| matched.end());
                (
                    captures.get(1).map_or("", |matched| matched.as_str()),
                    direction,
                    consumed,
                )
            }
            None => (rest, Direction::Asc, rest.len()),
        };

        let column = meta
            .field(&to_snake_case(field_token))
            .ok_or_else(|| DerivationError::new(method, field_token, "unknown sort field"))?;
        orders.push(ResolvedOrder {
            field: column.field,
            column: column.column,
            direction,
        });
        rest = &rest[consumed..];
    }
    Ok(orders)
}

/// `TeamName` -> `team_name`.
fn to_snake_case(token: &str) -> String {
    let mut snake = String::with_capacity(token.len() + 4);
    for (index, ch) in token.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if index > 0 {
                snake.push('_');
            }
            snake.push(ch.to_ascii_lowercase());
        } else {
            snake.push(ch);
        }
    }
    snake
}
