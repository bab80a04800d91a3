// src/rpc/protocol.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChainError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Maps the error taxonomy onto JSON-RPC codes. Explorer failures
    /// keep their response body in the error data.
    pub fn from_chain_error(id: Value, err: &ChainError) -> Self {
        let data = match err {
            ChainError::ExplorerApi { detail, .. } => Some(Value::String(detail.clone())),
            _ => None,
        };
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(ErrorObject {
                code: chain_error_code(err),
                message: err.to_string(),
                data,
            }),
        }
    }
}

pub fn chain_error_code(err: &ChainError) -> i32 {
    match err {
        ChainError::Validation(_)
        | ChainError::UnknownNetwork(_)
        | ChainError::MissingRpcUrl
        | ChainError::InvalidKey(_) => error_codes::INVALID_PARAMS,
        ChainError::Permission(_) => error_codes::PERMISSION_DENIED,
        ChainError::ExplorerApi { .. } => error_codes::EXPLORER_ERROR,
        ChainError::Rpc(_) | ChainError::Provider(_) => error_codes::CHAIN_RPC_ERROR,
        ChainError::Transport(_) => error_codes::TRANSPORT_ERROR,
        ChainError::Other(_) => error_codes::INTERNAL_ERROR,
    }
}

// Standard JSON-RPC codes plus server-range codes for the chain error
// taxonomy.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const PERMISSION_DENIED: i32 = -32001;
    pub const EXPLORER_ERROR: i32 = -32002;
    pub const CHAIN_RPC_ERROR: i32 = -32003;
    pub const TRANSPORT_ERROR: i32 = -32004;
    pub const TRIGGER_ERROR: i32 = -32005;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_has_null_id() {
        let req: Request = serde_json::from_str(r#"{"method":"execute"}"#).unwrap();
        assert!(req.is_notification());
        let req: Request = serde_json::from_str(r#"{"id":1,"method":"execute"}"#).unwrap();
        assert!(!req.is_notification());
    }

    #[test]
    fn error_serialization_skips_absent_fields() {
        let resp = Response::success(json!(1), json!({"ok": true}));
        let raw = serde_json::to_string(&resp).unwrap();
        assert!(!raw.contains("error"));

        let resp = Response::from_chain_error(
            json!(2),
            &ChainError::permission("No private key configured"),
        );
        assert_eq!(resp.error.as_ref().unwrap().code, error_codes::PERMISSION_DENIED);
    }
}
