//! JSON-RPC 2.0 message types.
//!
//! Inbound lines are classified by [`Incoming::parse`]; outbound lines are
//! [`Response`]s and [`Notification`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::RpcError;

/// Protocol version tag.
pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Implementation-defined range.
    pub const SERVER_ERROR: i64 = -32000;
    pub const TIMEOUT: i64 = -32001;
    pub const NOT_READY: i64 = -32002;
    pub const NETWORK_ERROR: i64 = -32003;
    pub const ENCRYPTION_ERROR: i64 = -32004;
    pub const STORAGE_ERROR: i64 = -32005;
}

/// Caller-chosen request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(Number),
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

/// A call that expects a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

/// A message with no id, outbound or inbound. Never answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Wire error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response line. `id` is null only when the request could not be correlated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    pub id: Option<RequestId>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: Some(id),
        }
    }

    pub fn error(id: Option<RequestId>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// A classified inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request(Request),
    Notification(Notification),
    /// A response sent to us; there is nothing to answer.
    Response,
}

/// An inbound line that cannot be dispatched, with whatever id could be read.
#[derive(Debug)]
pub struct Rejected {
    pub id: Option<RequestId>,
    pub error: RpcError,
}

impl Incoming {
    /// Classify one line of text.
    pub fn parse(line: &str) -> Result<Incoming, Rejected> {
        let value: Value = serde_json::from_str(line).map_err(|e| Rejected {
            id: None,
            error: RpcError::ParseError(e.to_string()),
        })?;
        Self::from_value(value)
    }

    /// Classify an already parsed JSON value.
    pub fn from_value(value: Value) -> Result<Incoming, Rejected> {
        let Value::Object(mut object) = value else {
            return Err(invalid(None, "message must be a JSON object"));
        };

        let id = match object.remove("id") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(RequestId::Number(n)),
            Some(Value::String(s)) => Some(RequestId::String(s)),
            Some(_) => return Err(invalid(None, "id must be a string, number or null")),
        };

        match object.get("jsonrpc") {
            None => {}
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(_) => return Err(invalid(id, "jsonrpc must be \"2.0\"")),
        }

        let method = match object.remove("method") {
            Some(Value::String(m)) => m,
            Some(_) => return Err(invalid(id, "method must be a string")),
            None if object.contains_key("result") || object.contains_key("error") => {
                return Ok(Incoming::Response)
            }
            None => return Err(invalid(id, "missing method")),
        };

        let params = match object.remove("params") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(p @ Value::Object(_)) | Some(p @ Value::Array(_)) => p,
            Some(_) => return Err(invalid(id, "params must be an object or array")),
        };

        Ok(match id {
            Some(id) => Incoming::Request(Request { id, method, params }),
            None => Incoming::Notification(Notification::new(method, params)),
        })
    }
}

fn invalid(id: Option<RequestId>, reason: &str) -> Rejected {
    Rejected {
        id,
        error: RpcError::InvalidRequest(reason.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let incoming = Incoming::parse(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert_eq!(
            incoming,
            Incoming::Request(Request {
                id: RequestId::from(1),
                method: "ping".to_string(),
                params: json!({}),
            })
        );
    }

    #[test]
    fn test_parse_string_id_and_array_params() {
        let incoming = Incoming::parse(r#"{"id":"abc","method":"m","params":[1,2]}"#).unwrap();
        let Incoming::Request(request) = incoming else {
            panic!("expected request");
        };
        assert_eq!(request.id, RequestId::from("abc"));
        assert_eq!(request.params, json!([1, 2]));
    }

    #[test]
    fn test_null_id_is_notification() {
        let incoming = Incoming::parse(r#"{"jsonrpc":"2.0","id":null,"method":"shutdown"}"#).unwrap();
        assert!(matches!(incoming, Incoming::Notification(ref n) if n.method == "shutdown"));

        let incoming = Incoming::parse(r#"{"method":"shutdown"}"#).unwrap();
        assert!(matches!(incoming, Incoming::Notification(_)));
    }

    #[test]
    fn test_inbound_response_is_recognized() {
        let incoming = Incoming::parse(r#"{"jsonrpc":"2.0","id":3,"result":"ok"}"#).unwrap();
        assert_eq!(incoming, Incoming::Response);
    }

    #[test]
    fn test_parse_error() {
        let rejected = Incoming::parse("{not json").unwrap_err();
        assert!(rejected.id.is_none());
        assert_eq!(rejected.error.code(), codes::PARSE_ERROR);
    }

    #[test]
    fn test_invalid_requests() {
        let cases = [
            (r#"[1,2,3]"#, None),
            (r#"{"id":{"x":1},"method":"m"}"#, None),
            (r#"{"jsonrpc":"1.0","id":7,"method":"m"}"#, Some(RequestId::from(7))),
            (r#"{"id":7,"method":42}"#, Some(RequestId::from(7))),
            (r#"{"id":7}"#, Some(RequestId::from(7))),
            (r#"{"id":7,"method":"m","params":"x"}"#, Some(RequestId::from(7))),
        ];

        for (line, expected_id) in cases {
            let rejected = Incoming::parse(line).unwrap_err();
            assert_eq!(rejected.error.code(), codes::INVALID_REQUEST, "{line}");
            assert_eq!(rejected.id, expected_id, "{line}");
        }
    }

    #[test]
    fn test_response_serialization() {
        let ok = Response::success(RequestId::from(1), json!("pong"));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "jsonrpc": "2.0", "result": "pong", "id": 1 })
        );

        let err = Response::error(
            None,
            ErrorObject {
                code: codes::PARSE_ERROR,
                message: "parse error".to_string(),
                data: None,
            },
        );
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "jsonrpc": "2.0", "error": { "code": -32700, "message": "parse error" }, "id": null })
        );
    }

    #[test]
    fn test_null_result_is_kept() {
        let ok = Response::success(RequestId::from(2), Value::Null);
        let text = serde_json::to_string(&ok).unwrap();
        assert!(text.contains(r#""result":null"#));
    }

    #[test]
    fn test_notification_serialization() {
        let n = Notification::new("ready", json!({ "version": "0.1.0" }));
        assert_eq!(
            serde_json::to_value(&n).unwrap(),
            json!({ "jsonrpc": "2.0", "method": "ready", "params": { "version": "0.1.0" } })
        );
    }
}
