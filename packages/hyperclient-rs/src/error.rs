//! Error types for lifecycle tracking
//!
//! [`TrackerError`] is what callers see. [`ChainError`] is what a chain
//! reader returns; the retry layer decides whether it is worth another
//! attempt and escalates it into a [`TrackerError`] once it is not.

use thiserror::Error;

use crate::retry::{classify_error, ErrorClass};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    // ========================================================================
    // Boundary Errors (never retried)
    // ========================================================================
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // ========================================================================
    // Chain Read Errors
    // ========================================================================
    #[error("Chain {chain} unreachable after {attempts} attempts: {reason}")]
    ChainUnreachable {
        chain: String,
        attempts: u32,
        reason: String,
    },

    #[error("Chain {chain} read failed: {reason}")]
    ChainRead { chain: String, reason: String },
}

/// Failure of a single read against a chain endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported query: {0}")]
    Unsupported(String),
}

impl ChainError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ChainError::Transport(_) => true,
            ChainError::Rpc { message, .. } => classify_error(message) == ErrorClass::Transient,
            ChainError::Decode(_) | ChainError::Unsupported(_) => false,
        }
    }

    /// Wrap an error surfaced by a client library whose type we do not inspect
    pub fn from_client(error: impl std::fmt::Display) -> Self {
        let message = error.to_string();
        match classify_error(&message) {
            ErrorClass::Transient => ChainError::Transport(message),
            ErrorClass::Permanent => ChainError::Rpc { code: -1, message },
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ChainError::Decode(error.to_string())
        } else {
            ChainError::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(error: serde_json::Error) -> Self {
        ChainError::Decode(error.to_string())
    }
}
