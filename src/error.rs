//! Typed core error taxonomy (`BridgeError`) and its HTTP status mapping.
//!
//! Per SPEC_FULL.md §7: `NotFound` / `NotReady` / `Unsupported` / `Validation`
//! / `Storage` / `Transport`. Gateway mapping: Validation→400, NotFound→404,
//! NotReady→503, everything else→500.

use thiserror::Error;

/// The typed core error surface threaded through the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A requested entity (artifact, contact, …) does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The session is not in a state that permits the requested action.
    #[error("session is not ready")]
    NotReady,

    /// The operation is not supported in the current configuration/tier.
    #[error("{0}")]
    Unsupported(String),

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// A persistence/storage-layer failure.
    #[error("{0}")]
    Storage(String),

    /// A transport/network-layer failure talking to the provider.
    #[error("{0}")]
    Transport(String),
}

impl BridgeError {
    /// Build a `NotFound` from any string-like description.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Build a `Storage` error from any displayable underlying error.
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        Self::Storage(err.to_string())
    }

    /// Map the error onto its HTTP status class (SPEC_FULL.md §7).
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::Validation(_) => 400,
            BridgeError::NotFound(_) => 404,
            BridgeError::NotReady => 503,
            BridgeError::Unsupported(_)
            | BridgeError::Storage(_)
            | BridgeError::Transport(_) => 500,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
