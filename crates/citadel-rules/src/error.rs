//! Definition errors raised while reading filters, abilities and catalogs.

use thiserror::Error;

/// A structural fault in a persisted filter, ability string or ability catalog.
///
/// Definition errors are never folded into a negative verdict: a filter with a typo
/// would otherwise deny membership in a way indistinguishable from a real denial.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Malformed filter: {0}")]
    Malformed(String),

    #[error("Unknown combinator: {0:?}")]
    UnknownCombinator(String),

    #[error("Unknown relation path: {0:?}")]
    UnknownPath(String),

    #[error("Unknown field {field:?} on relation {path:?}")]
    UnknownField { path: String, field: String },

    #[error("Unknown operator: {0:?}")]
    UnknownOperator(String),

    #[error("Invalid criteria for operator {operator:?}: {reason}")]
    InvalidCriteria { operator: String, reason: String },

    #[error("Filter nesting exceeds the maximum depth of {max}")]
    DepthExceeded { max: usize },

    #[error("Squad filter must contain at least one condition")]
    EmptyFilter,

    #[error("Invalid ability: {0:?}")]
    InvalidAbility(String),

    #[error("Unknown ability: {0:?}")]
    UnknownAbility(String),

    #[error("Unknown gate {gate:?} for ability {ability:?}")]
    UnknownGate { ability: String, gate: String },
}
