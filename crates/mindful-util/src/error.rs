//! Error types for mindful

use thiserror::Error;

/// Errors from parsing mindful identifiers
#[derive(Debug, Error)]
pub enum MindfulError {
    #[error("Item token could not be decoded: {0}")]
    Decode(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl MindfulError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MindfulError>;
