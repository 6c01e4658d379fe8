//! Error types for Beaglegaze client operations
//!
//! Every remote call is caught where it is issued; these types only travel as
//! far as the panel or toast that reports them.

use thiserror::Error;

/// Core error type for wallet, gateway and workflow operations
#[derive(Error, Debug)]
pub enum DashboardError {
    /// No wallet provider is configured (no RPC endpoint)
    #[error("No wallet provider available: {0}")]
    NoProvider(String),

    /// Provider or transport failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// The wallet refused to sign
    #[error("User rejected the request: {0}")]
    UserRejected(String),

    /// Contract revert or logical failure reported by the chain
    #[error("Contract reverted: {0}")]
    Reverted(String),

    /// A write was submitted but never confirmed in time
    #[error("Transaction {0} not confirmed before timeout")]
    ConfirmationTimeout(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Operation requires a connected wallet on an accepted chain
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Operation refused before any call was made
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Malformed ABI payload or RPC response
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Rejected,
    Revert,
    Validation,
    Storage,
}

impl DashboardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoProvider(_)
            | Self::Provider(_)
            | Self::ConfirmationTimeout(_)
            | Self::Decode(_)
            | Self::Internal(_) => ErrorKind::Connectivity,
            Self::UserRejected(_) => ErrorKind::Rejected,
            Self::Reverted(_) => ErrorKind::Revert,
            Self::InvalidAddress(_)
            | Self::InvalidAmount(_)
            | Self::NotConnected(_)
            | Self::Precondition(_) => ErrorKind::Validation,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Short message without the variant prefix, for toasts and inline errors
    pub fn reason(&self) -> String {
        match self {
            Self::NoProvider(m)
            | Self::Provider(m)
            | Self::UserRejected(m)
            | Self::Reverted(m)
            | Self::InvalidAddress(m)
            | Self::InvalidAmount(m)
            | Self::NotConnected(m)
            | Self::Precondition(m)
            | Self::Decode(m)
            | Self::Internal(m) => m.clone(),
            other => other.to_string(),
        }
    }

    pub fn not_connected() -> Self {
        Self::NotConnected("connect a wallet on an accepted network".to_string())
    }
}
