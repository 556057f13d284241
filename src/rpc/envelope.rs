//! JSON-RPC 2.0 request/response envelope and standard error codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(rename = "jsonrpc")]
    pub version: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn parse(raw: &str) -> Result<Self, RpcError> {
        serde_json::from_str(raw).map_err(|e| RpcError::new(PARSE_ERROR, format!("parse error: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    #[serde(rename = "jsonrpc")]
    pub version: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            version: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            version: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Parse-error responses carry an empty string id per the local
    /// IPC protocol, since the original request couldn't be read.
    pub fn parse_failure(error: RpcError) -> Self {
        Self::failure(Value::String(String::new()), error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let original = RpcRequest {
            version: "2.0".to_string(),
            id: Value::from(7),
            method: "tools/list".to_string(),
            params: Value::Null,
        };
        let raw = serde_json::to_string(&original).unwrap();
        let parsed = RpcRequest::parse(&raw).unwrap();
        assert_eq!(parsed.version, original.version);
        assert_eq!(parsed.id, original.id);
        assert_eq!(parsed.method, original.method);
    }

    #[test]
    fn malformed_json_yields_parse_error_code() {
        let err = RpcRequest::parse("{not json").unwrap_err();
        assert_eq!(err.code, PARSE_ERROR);
    }

    #[test]
    fn unknown_method_response_uses_method_not_found_code() {
        let resp = RpcResponse::failure(Value::from(1), RpcError::new(METHOD_NOT_FOUND, "unknown"));
        let echoed_id = resp.id.clone();
        assert_eq!(echoed_id, Value::from(1));
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn success_response_omits_error_field() {
        let resp = RpcResponse::success(Value::from(1), serde_json::json!({"tools": []}));
        let raw = serde_json::to_string(&resp).unwrap();
        assert!(!raw.contains("\"error\""));
    }
}
