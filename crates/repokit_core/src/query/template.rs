//! Literal query templates with positional or named placeholders.
//!
//! # Responsibility
//! - Scan a SQL template for `?N` / `:name` placeholders once, at build time.
//! - Bind caller arguments into a plain `?`-parameterised statement.
//!
//! # Invariants
//! - A template uses one placeholder style; positional indices are
//!   contiguous from `?1`.
//! - Placeholders inside quoted literals or quoted identifiers are text.
//! - Binding fails unless the supplied arguments match the placeholders
//!   exactly (count for positional, name set for named).

use crate::model::entity::EntityMeta;
use crate::query::error::ParameterBindingError;
use crate::query::params::{Arg, Params};
use crate::query::{BoundQuery, Statement};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use std::collections::BTreeSet;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|\?(\d*)|:([A-Za-z_][A-Za-z0-9_]*)"#)
        .expect("valid placeholder regex")
});
pub(crate) static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Positional(usize),
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    None,
    Positional,
    Named,
}

/// Parsed literal query.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    sql: String,
    segments: Vec<Segment>,
    style: PlaceholderStyle,
    arity: usize,
    names: Vec<String>,
    count: Option<Box<QueryTemplate>>,
    target: Option<&'static EntityMeta>,
}

impl QueryTemplate {
    pub fn new(sql: impl Into<String>) -> Result<Self, ParameterBindingError> {
        let sql = sql.into();
        let mut segments = Vec::new();
        let mut positions = BTreeSet::new();
        let mut names: Vec<String> = Vec::new();
        let mut cursor = 0;

        for captures in PLACEHOLDER_RE.captures_iter(&sql) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            if whole.start() > cursor {
                segments.push(Segment::Text(sql[cursor..whole.start()].to_string()));
            }
            cursor = whole.end();

            if let Some(digits) = captures.get(1) {
                let index = digits.as_str().parse::<usize>().unwrap_or(0);
                if index == 0 {
                    return Err(ParameterBindingError::new(
                        &sql,
                        format!(
                            "invalid positional placeholder `{}`; use 1-based `?N`",
                            whole.as_str()
                        ),
                    ));
                }
                positions.insert(index);
                segments.push(Segment::Positional(index));
            } else if let Some(name) = captures.get(2) {
                let name = name.as_str().to_string();
                if !names.contains(&name) {
                    names.push(name.clone());
                }
                segments.push(Segment::Named(name));
            } else {
                segments.push(Segment::Text(whole.as_str().to_string()));
            }
        }
        if cursor < sql.len() {
            segments.push(Segment::Text(sql[cursor..].to_string()));
        }

        let style = match (positions.is_empty(), names.is_empty()) {
            (true, true) => PlaceholderStyle::None,
            (false, true) => PlaceholderStyle::Positional,
            (true, false) => PlaceholderStyle::Named,
            (false, false) => {
                return Err(ParameterBindingError::new(
                    &sql,
                    "template mixes positional and named placeholders",
                ));
            }
        };

        let arity = match style {
            PlaceholderStyle::None => 0,
            PlaceholderStyle::Positional => {
                let highest = positions.iter().next_back().copied().unwrap_or(0);
                if highest != positions.len() {
                    return Err(ParameterBindingError::new(
                        &sql,
                        format!("positional placeholders must be contiguous from ?1 to ?{highest}"),
                    ));
                }
                highest
            }
            PlaceholderStyle::Named => names.len(),
        };

        Ok(Self {
            sql,
            segments,
            style,
            arity,
            names,
            count: None,
            target: None,
        })
    }

    /// Declares an explicit count query sharing this template's placeholders.
    pub fn with_count_query(mut self, sql: impl Into<String>) -> Result<Self, ParameterBindingError> {
        let count = Self::new(sql)?;
        let same_names = {
            let mut left = self.names.clone();
            let mut right = count.names.clone();
            left.sort();
            right.sort();
            left == right
        };
        if count.style != self.style || count.arity != self.arity || !same_names {
            return Err(ParameterBindingError::new(
                count.sql,
                format!("count query placeholders differ from `{}`", self.sql),
            ));
        }
        self.count = Some(Box::new(count));
        Ok(self)
    }

    /// Declares that rows are full images of `meta`'s table.
    pub fn returning(mut self, meta: &'static EntityMeta) -> Self {
        self.target = Some(meta);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn style(&self) -> PlaceholderStyle {
        self.style
    }

    /// Number of distinct placeholders.
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn target(&self) -> Option<&'static EntityMeta> {
        self.target
    }

    pub fn bind(&self, params: &Params) -> Result<BoundQuery, ParameterBindingError> {
        let select = self.render(params)?;
        let count = match &self.count {
            Some(count) => Some(count.render(params)?),
            None => None,
        };
        Ok(BoundQuery::template(
            self.sql.clone(),
            select,
            count,
            self.target,
        ))
    }

    pub(crate) fn render(&self, params: &Params) -> Result<Statement, ParameterBindingError> {
        self.check_params(params)?;

        let mut sql = String::with_capacity(self.sql.len());
        let mut values = Vec::new();
        for segment in &self.segments {
            let arg = match segment {
                Segment::Text(text) => {
                    sql.push_str(text);
                    continue;
                }
                Segment::Positional(index) => match params {
                    Params::Positional(args) => args.get(index - 1),
                    _ => None,
                },
                Segment::Named(name) => params.named_arg(name),
            };
            let arg = arg.ok_or_else(|| {
                ParameterBindingError::new(&self.sql, "placeholder without argument")
            })?;
            push_arg(&mut sql, &mut values, arg);
        }

        Ok(Statement { sql, values })
    }

    fn check_params(&self, params: &Params) -> Result<(), ParameterBindingError> {
        match (self.style, params) {
            (PlaceholderStyle::None, _) if params.is_empty() => Ok(()),
            (PlaceholderStyle::None, _) => Err(ParameterBindingError::count_mismatch(
                &self.sql,
                0,
                params.len(),
            )),
            (PlaceholderStyle::Positional, Params::Positional(args)) => {
                if args.len() == self.arity {
                    Ok(())
                } else {
                    Err(ParameterBindingError::count_mismatch(
                        &self.sql,
                        self.arity,
                        args.len(),
                    ))
                }
            }
            (PlaceholderStyle::Named, Params::Named(args)) => {
                if let Some(missing) = self
                    .names
                    .iter()
                    .find(|name| params.named_arg(name).is_none())
                {
                    return Err(ParameterBindingError::new(
                        &self.sql,
                        format!("missing argument `:{missing}`"),
                    ));
                }
                if let Some((unexpected, _)) =
                    args.iter().find(|(name, _)| !self.names.contains(name))
                {
                    return Err(ParameterBindingError::new(
                        &self.sql,
                        format!("unexpected argument `:{unexpected}`"),
                    ));
                }
                if args.len() != self.arity {
                    return Err(ParameterBindingError::count_mismatch(
                        &self.sql,
                        self.arity,
                        args.len(),
                    ));
                }
                Ok(())
            }
            (PlaceholderStyle::Positional, _) => Err(ParameterBindingError::new(
                &self.sql,
                "template uses positional placeholders; supply positional arguments",
            )),
            (PlaceholderStyle::Named, _) => Err(ParameterBindingError::new(
                &self.sql,
                "template uses named placeholders; supply named arguments",
            )),
        }
    }
}

fn push_arg(sql: &mut String, values: &mut Vec<Value>, arg: &Arg) {
    match arg {
        Arg::One(value) => {
            sql.push('?');
            values.push(value.clone());
        }
        Arg::Many(items) => {
            let marks = vec!["?"; items.len()];
            sql.push_str(&marks.join(", "));
            values.extend(items.iter().cloned());
        }
    }
}
