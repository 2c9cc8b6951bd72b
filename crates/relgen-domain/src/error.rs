//! Domain error types for schema compilation.
//!
//! Every variant here is fatal: the compilation run stops and nothing is
//! emitted. Relations that merely cannot be specialized are not errors; they
//! are recorded on [`GenerationCapabilities`](crate::analysis::GenerationCapabilities).

use thiserror::Error;

use crate::model::ParserError;
use crate::validation::ValidationError;

/// Domain-specific errors for schema analysis.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Error parsing the schema DSL.
    #[error("model parse error: {message}")]
    ModelParseError { message: String },

    /// One or more validation rules failed.
    #[error("model validation error: {}", join_errors(.errors))]
    ModelValidationError { errors: Vec<ValidationError> },

    /// A rewrite node that cannot be classified.
    #[error("malformed rewrite in {type_name}#{relation}: {reason}")]
    MalformedRewrite {
        type_name: String,
        relation: String,
        reason: String,
    },

    /// Type not found in the schema.
    #[error("type not found: {type_name}")]
    TypeNotFound { type_name: String },

    /// Relation not found on type.
    #[error("relation '{relation}' not found on type '{type_name}'")]
    RelationNotFound { type_name: String, relation: String },

    /// A rewrite references a type or relation that does not resolve.
    #[error("unresolved reference in {type_name}#{relation}: {reference}")]
    UnresolvedReference {
        type_name: String,
        relation: String,
        reference: String,
    },

    /// An analysis record is missing for a relation present in the schema.
    #[error("missing analysis for {type_name}#{relation}")]
    MissingAnalysis { type_name: String, relation: String },

    /// An upstream pass produced facts that break an analysis invariant.
    #[error("analysis invariant violated for {key}: {message}")]
    InvariantViolation { key: String, message: String },

    /// Analyzer configuration is unusable.
    #[error("invalid analyzer configuration: {message}")]
    InvalidConfig { message: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ParserError> for DomainError {
    fn from(err: ParserError) -> Self {
        DomainError::ModelParseError {
            message: err.to_string(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
