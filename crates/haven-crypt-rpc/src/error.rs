//! Error types for the control protocol.

use serde_json::Value;
use thiserror::Error;

use crate::messages::{codes, ErrorObject};

/// Errors surfaced to the host as JSON-RPC error objects, plus local I/O.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// Implementation-defined error in the -32000 range.
    #[error("{message}")]
    Server {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// The byte stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// The JSON-RPC code this error is reported with.
    pub fn code(&self) -> i64 {
        match self {
            RpcError::ParseError(_) => codes::PARSE_ERROR,
            RpcError::InvalidRequest(_) => codes::INVALID_REQUEST,
            RpcError::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            RpcError::InvalidParams(_) => codes::INVALID_PARAMS,
            RpcError::Internal(_) | RpcError::Io(_) => codes::INTERNAL_ERROR,
            RpcError::Server { code, .. } => *code,
        }
    }

    /// Convert into the wire error object.
    pub fn to_error_object(&self) -> ErrorObject {
        let data = match self {
            RpcError::Server { data, .. } => data.clone(),
            _ => None,
        };
        ErrorObject {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Internal(format!("serialization failed: {e}"))
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_codes() {
        assert_eq!(RpcError::ParseError("x".into()).code(), -32700);
        assert_eq!(RpcError::InvalidRequest("x".into()).code(), -32600);
        assert_eq!(RpcError::MethodNotFound("x".into()).code(), -32601);
        assert_eq!(RpcError::InvalidParams("x".into()).code(), -32602);
        assert_eq!(RpcError::Internal("x".into()).code(), -32603);
    }

    #[test]
    fn test_server_error_carries_data() {
        let err = RpcError::Server {
            code: -32004,
            message: "authentication failed".to_string(),
            data: Some(json!({ "kind": "CryptoError" })),
        };
        let object = err.to_error_object();

        assert_eq!(object.code, -32004);
        assert_eq!(object.message, "authentication failed");
        assert_eq!(object.data, Some(json!({ "kind": "CryptoError" })));
    }
}
