//! Caller-supplied query arguments.

use crate::model::entity::EntityId;
use rusqlite::types::Value;

/// One argument. A list expands into `?, ?, ...` where a template allows it.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    One(Value),
    Many(Vec<Value>),
}

impl Arg {
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        let mut flattened = Vec::new();
        for value in values {
            match value.into() {
                Self::One(value) => flattened.push(value),
                Self::Many(values) => flattened.extend(values),
            }
        }
        Self::Many(flattened)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::One(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::One(Value::Integer(value))
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::One(Value::Integer(i64::from(value)))
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::One(Value::Text(value.to_string()))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::One(Value::Text(value))
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Self::One(Value::Text(value.clone()))
    }
}

impl From<&EntityId> for Arg {
    fn from(value: &EntityId) -> Self {
        Self::One(value.to_value())
    }
}

/// Arguments for one query execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Arg>),
    Named(Vec<(String, Arg)>),
}

impl Params {
    pub fn positional<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        Self::Positional(args.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, T>(args: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<Arg>,
    {
        Self::Named(
            args.into_iter()
                .map(|(name, arg)| (name.into(), arg.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(args) => args.len(),
            Self::Named(args) => args.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn named_arg(&self, name: &str) -> Option<&Arg> {
        match self {
            Self::Named(args) => args
                .iter()
                .find(|(candidate, _)| candidate == name)
                .map(|(_, arg)| arg),
            _ => None,
        }
    }
}
