//! Error types for CEL operations

use thiserror::Error;

/// CEL operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CelError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("expression must evaluate to {expected}, found {found}")]
    ResultType { expected: String, found: String },

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("expression did not return a boolean result")]
    NonBooleanResult,
}

/// Result type for CEL operations
pub type Result<T> = std::result::Result<T, CelError>;
