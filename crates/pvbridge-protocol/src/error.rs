//! Protocol errors, reported back to the originating client.

use pvbridge_core::DomainError;
use thiserror::Error;

/// Errors raised while decoding client frames or packed arrays.
///
/// The `Display` text is what the client sees in the `message` field of an
/// error reply.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    MalformedJson(String),

    #[error("Malformed message: expected a JSON object")]
    NotAnObject,

    #[error("Unknown message type")]
    UnknownType(Option<String>),

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Binary frames are not supported")]
    BinaryFrame,

    #[error("Invalid base64 array: {0}")]
    InvalidArray(String),
}

impl ProtocolError {
    pub(crate) fn invalid(field: &'static str, err: DomainError) -> Self {
        Self::InvalidField {
            field,
            reason: err.to_string(),
        }
    }
}
