//! Ordering requests applied on top of a query.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `(field, direction)` ordering term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Ordered list of ordering terms, applied in the given order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Sorts by every field in `fields` with the same direction.
    pub fn by<I, S>(direction: Direction, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            orders: fields
                .into_iter()
                .map(|field| Order {
                    field: field.into(),
                    direction,
                })
                .collect(),
        }
    }

    pub fn and(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }
}
