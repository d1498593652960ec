//! Error handling for intent validation

use thiserror::Error;

/// Result type for intent parsing
pub type ParseResult<T> = Result<T, ParseError>;

/// Why a classifier response was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Text is not valid JSON (or has trailing content)
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// JSON value is not an object
    #[error("Expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    /// The `type` discriminator is absent
    #[error("Missing required field: type")]
    MissingDiscriminator,

    /// The `type` discriminator is not `command` or `conversation`
    #[error("Unknown intent type: {0}")]
    UnknownType(String),

    /// A required field for the chosen variant is absent
    #[error("Missing required field for {variant}: {field}")]
    MissingField {
        variant: &'static str,
        field: &'static str,
    },

    /// A field holds the wrong primitive type
    #[error("Invalid type for field {field}: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    /// `action` is not one of the permitted action kinds
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// A field outside the variant's shape is present
    #[error("Contains unexpected field: {0}")]
    UnexpectedField(String),
}
