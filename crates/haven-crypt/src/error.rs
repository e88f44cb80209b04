//! Error types for the engine and dispatcher.

use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;

use haven_crypt_core::{CoreError, CryptoError, ValidationError};
use haven_crypt_keywrap::{ConnectionError, KeyWrapError, NetworkError};
use haven_crypt_rpc::{codes, RpcError};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad parameters, empty policy, unsupported metadata.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No session, or the network could not be initialized.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The network failed to wrap or unwrap a key.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Authentication tag or integrity digest failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Reading or writing a payload or sidecar file failed.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn storage(path: &Path, source: std::io::Error) -> Self {
        EngineError::Storage {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable failure family name.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "ValidationError",
            EngineError::Connection(_) => "ConnectionError",
            EngineError::Network(_) => "NetworkError",
            EngineError::Crypto(_) => "CryptoError",
            EngineError::Storage { .. } => "StorageError",
            EngineError::Internal(_) => "InternalError",
        }
    }

    /// Stable variant name within the family.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::Validation(e) => e.reason(),
            EngineError::Connection(e) => e.reason(),
            EngineError::Network(e) => e.reason(),
            EngineError::Crypto(e) => e.reason(),
            EngineError::Storage { .. } => "Io",
            EngineError::Internal(_) => "Internal",
        }
    }

    /// Only network failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Network(_))
    }

    /// JSON-RPC code for this failure.
    pub fn rpc_code(&self) -> i64 {
        match self {
            EngineError::Validation(_) => codes::INVALID_PARAMS,
            EngineError::Connection(_) => codes::NOT_READY,
            EngineError::Network(_) => codes::NETWORK_ERROR,
            EngineError::Crypto(_) => codes::ENCRYPTION_ERROR,
            EngineError::Storage { .. } => codes::STORAGE_ERROR,
            EngineError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Convert into a wire error carrying `{kind, reason, retryable}`.
    pub fn to_rpc_error(&self) -> RpcError {
        RpcError::Server {
            code: self.rpc_code(),
            message: self.to_string(),
            data: Some(json!({
                "kind": self.kind(),
                "reason": self.reason(),
                "retryable": self.is_retryable(),
            })),
        }
    }
}

impl From<KeyWrapError> for EngineError {
    fn from(e: KeyWrapError) -> Self {
        match e {
            KeyWrapError::Connection(e) => EngineError::Connection(e),
            KeyWrapError::Network(e) => EngineError::Network(e),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(e) => EngineError::Validation(e),
            CoreError::Crypto(e) => EngineError::Crypto(e),
            CoreError::Encoding(msg) => EngineError::Internal(msg),
        }
    }
}

impl From<EngineError> for RpcError {
    fn from(e: EngineError) -> Self {
        e.to_rpc_error()
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_per_family() {
        assert_eq!(EngineError::from(ValidationError::EmptyPolicy).rpc_code(), -32602);
        assert_eq!(EngineError::from(ConnectionError::NotConnected).rpc_code(), -32002);
        assert_eq!(EngineError::from(NetworkError::KeyDigestMismatch).rpc_code(), -32003);
        assert_eq!(EngineError::from(CryptoError::AuthenticationFailed).rpc_code(), -32004);
        assert_eq!(
            EngineError::storage(Path::new("/tmp/x"), std::io::ErrorKind::NotFound.into()).rpc_code(),
            -32005
        );
    }

    #[test]
    fn test_only_network_errors_retry() {
        assert!(EngineError::from(NetworkError::WrapFailed("x".into())).is_retryable());
        assert!(!EngineError::from(ValidationError::EmptyPolicy).is_retryable());
        assert!(!EngineError::from(CryptoError::AuthenticationFailed).is_retryable());
        assert!(!EngineError::from(ConnectionError::NotConnected).is_retryable());
    }

    #[test]
    fn test_rpc_error_data() {
        let err = EngineError::from(CryptoError::AuthenticationFailed).to_rpc_error();
        let object = err.to_error_object();

        assert_eq!(object.code, -32004);
        assert_eq!(
            object.data,
            Some(json!({ "kind": "CryptoError", "reason": "AuthenticationFailed", "retryable": false }))
        );
    }

    #[test]
    fn test_seal_failure_is_not_reported_as_a_key_problem() {
        let err = EngineError::from(CryptoError::EncryptionFailed("aead::Error".into()));

        assert_eq!(err.rpc_code(), -32004);
        assert_eq!(err.reason(), "EncryptionFailed");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_keywrap_error_flattens() {
        let err = EngineError::from(KeyWrapError::Connection(ConnectionError::NotConnected));
        assert!(matches!(err, EngineError::Connection(ConnectionError::NotConnected)));
    }
}
