//! Code generation error types.

use relgen_domain::DomainError;
use thiserror::Error;

use crate::renderer::RenderError;

/// Errors that halt a generation run. Nothing partial is emitted.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// Parsing, validation or analysis failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Two renderers were registered under one name.
    #[error("renderer '{name}' is registered more than once")]
    DuplicateRenderer { name: String },

    /// The selected renderer was never registered.
    #[error("unknown renderer '{name}', available: {available}")]
    UnknownRenderer { name: String, available: String },

    /// Two relations sanitise to the same function name.
    #[error("function name '{function}' is generated for both {first} and {second}")]
    FunctionNameCollision {
        function: String,
        first: String,
        second: String,
    },

    /// A renderer rejected a request.
    #[error("failed to render {function}: {source}")]
    Render {
        function: String,
        #[source]
        source: RenderError,
    },
}

/// Result type for code generation.
pub type CodegenResult<T> = Result<T, CodegenError>;
