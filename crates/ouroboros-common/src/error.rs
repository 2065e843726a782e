//! Error types for ouroboros query translation

use thiserror::Error;

/// Result type alias for ouroboros translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;

/// Unified error type for expression translation and result decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// No translation rule matches the node in the current mode
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// A nested lambda reads a member owned by an enclosing lambda parameter
    #[error(
        "Illegal scope reference: {expression} references parameter '{parameter}' from an enclosing scope"
    )]
    IllegalScopeReference {
        expression: String,
        parameter: String,
    },

    /// Server document does not have the planned result shape
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Invalid translation options
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TranslationError {
    /// Builds an `UnsupportedExpression` from a node description
    pub fn unsupported(description: impl Into<String>) -> Self {
        TranslationError::UnsupportedExpression(description.into())
    }

    /// Builds an `IllegalScopeReference` error
    pub fn illegal_scope(expression: impl Into<String>, parameter: impl Into<String>) -> Self {
        TranslationError::IllegalScopeReference {
            expression: expression.into(),
            parameter: parameter.into(),
        }
    }

    /// Returns true if no translation rule matched the expression
    pub fn is_unsupported(&self) -> bool {
        matches!(self, TranslationError::UnsupportedExpression(_))
    }

    /// Returns true if the expression crossed a lambda scope boundary
    pub fn is_scope_violation(&self) -> bool {
        matches!(self, TranslationError::IllegalScopeReference { .. })
    }

    /// The offending parameter name of a scope violation
    pub fn parameter(&self) -> Option<&str> {
        match self {
            TranslationError::IllegalScopeReference { parameter, .. } => Some(parameter),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(err: serde_json::Error) -> Self {
        TranslationError::Configuration(err.to_string())
    }
}

// BSON-specific error conversions (when bson-errors feature is enabled)
#[cfg(feature = "bson-errors")]
impl From<bson::de::Error> for TranslationError {
    fn from(err: bson::de::Error) -> Self {
        TranslationError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}

#[cfg(feature = "bson-errors")]
impl From<bson::ser::Error> for TranslationError {
    fn from(err: bson::ser::Error) -> Self {
        TranslationError::Deserialization(format!("BSON serialization error: {}", err))
    }
}
