use thiserror::Error;

use strand_core::DeflateError;

/// Failures turning a query set into Cypher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Model '{0}' is not registered")]
    UnknownModel(String),

    #[error("No property '{field}' on model '{model}'")]
    UnknownField { field: String, model: String },

    #[error("No relationship '{field}' on model '{model}'")]
    UnknownTraversal { field: String, model: String },

    #[error("Unknown filter operator '{operator}' in lookup '{lookup}'")]
    UnknownOperator { lookup: String, operator: String },

    #[error("Invalid value for '{field}' with operator '{operator}': {reason}")]
    InvalidValue {
        field: String,
        operator: String,
        reason: String,
    },

    #[error("Relationship '{field}' on model '{model}' has no edge model")]
    NoEdgeModel { field: String, model: String },

    #[error("Property '{field}' on model '{model}' has no {index} index")]
    NotIndexed {
        field: String,
        model: String,
        index: &'static str,
    },

    #[error("Vector for '{field}' has {actual} dimensions, index expects {expected}")]
    VectorDimensions {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Anchor '{ident}' already has a similarity filter")]
    DuplicateSimilarity { ident: String },

    #[error("Incompatible projection: {0}")]
    IncompatibleProjection(String),

    #[error("Invalid traversal '{field}': {reason}")]
    InvalidTraversal { field: String, reason: String },

    #[error(transparent)]
    Deflate(#[from] DeflateError),
}

/// Multiplicity failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CardinalityError {
    /// Stored data already breaks the declared multiplicity.
    #[error("CardinalityViolation: Expected: {expected}, got: {actual}.")]
    Violation { expected: String, actual: String },

    /// A mutation was refused because it would break the declared
    /// multiplicity.
    #[error("AttemptedCardinalityViolation: {reason}. Expected: {expected}.")]
    AttemptedViolation { expected: String, reason: String },
}
