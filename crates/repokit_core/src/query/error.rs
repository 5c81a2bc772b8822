//! Build-time failures of query descriptors.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Query intent that cannot be turned into a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationError {
    /// Method name or field path that was being resolved.
    pub source_text: String,
    /// Offending token.
    pub token: String,
    pub reason: &'static str,
}

impl DerivationError {
    pub(crate) fn new(
        source_text: impl Into<String>,
        token: impl Into<String>,
        reason: &'static str,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            token: token.into(),
            reason,
        }
    }
}

impl Display for DerivationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot derive query from `{}`: {} `{}`",
            self.source_text, self.reason, self.token
        )
    }
}

impl Error for DerivationError {}

/// Supplied arguments do not match the declared placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBindingError {
    pub query: String,
    pub detail: String,
}

impl ParameterBindingError {
    pub(crate) fn new(query: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn count_mismatch(query: impl Into<String>, expected: usize, supplied: usize) -> Self {
        Self::new(
            query,
            format!("expected {expected} argument(s), got {supplied}"),
        )
    }
}

impl Display for ParameterBindingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot bind parameters of `{}`: {}", self.query, self.detail)
    }
}

impl Error for ParameterBindingError {}
