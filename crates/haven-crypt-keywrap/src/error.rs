//! Error types for the key-wrapping layer.

use thiserror::Error;

/// Connection lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// An operation needed a session but none is active.
    #[error("not connected to a key-wrapping network")]
    NotConnected,

    /// The network client failed to initialize.
    #[error("network initialization failed: {0}")]
    InitFailed(String),

    /// The requested network is not one the client knows.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}

impl ConnectionError {
    /// Stable name of the variant, suitable for wire-level error data.
    pub fn reason(&self) -> &'static str {
        match self {
            ConnectionError::NotConnected => "NotConnected",
            ConnectionError::InitFailed(_) => "InitFailed",
            ConnectionError::UnknownNetwork(_) => "UnknownNetwork",
        }
    }
}

/// Failures reported by the network during wrap or unwrap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("key wrap failed: {0}")]
    WrapFailed(String),

    #[error("key unwrap failed: {0}")]
    UnwrapFailed(String),

    /// The presenting identity does not satisfy the policy.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The auth proof is expired, mis-signed or bound to another resource.
    #[error("auth proof rejected: {0}")]
    ProofRejected(String),

    /// The unwrapped key does not match the recorded key digest.
    #[error("key digest mismatch")]
    KeyDigestMismatch,

    /// The wrapped key blob could not be decoded.
    #[error("malformed wrapped key: {0}")]
    Malformed(String),
}

impl NetworkError {
    /// Stable name of the variant, suitable for wire-level error data.
    pub fn reason(&self) -> &'static str {
        match self {
            NetworkError::WrapFailed(_) => "WrapFailed",
            NetworkError::UnwrapFailed(_) => "UnwrapFailed",
            NetworkError::AccessDenied(_) => "AccessDenied",
            NetworkError::ProofRejected(_) => "ProofRejected",
            NetworkError::KeyDigestMismatch => "KeyDigestMismatch",
            NetworkError::Malformed(_) => "Malformed",
        }
    }
}

/// Any failure from a [`KeyWrapClient`](crate::KeyWrapClient) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyWrapError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Result type for key-wrapping operations.
pub type Result<T> = std::result::Result<T, KeyWrapError>;
