//! Inventory API errors.

use thiserror::Error;

/// Errors talking to the inventory API.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("inventory authentication rejected ({0})")]
    Unauthorized(u16),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response from {path}: {reason}")]
    InvalidResponse { path: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl InventoryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Unauthorized(status) => Some(*status),
            _ => None,
        }
    }
}
