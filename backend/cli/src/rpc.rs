//! JSON-RPC 2.0 framing for the stdio transport.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use hearth_core::HearthError;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const REQUEST_CANCELLED: i32 = -32800;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Parse one line. On failure the error response is already built,
    /// addressed to whatever id could be recovered.
    pub fn parse(line: &str) -> Result<Self, Value> {
        let value: Value = serde_json::from_str(line).map_err(|e| {
            RpcError::new(PARSE_ERROR, format!("Parse error: {e}")).into_response(Value::Null)
        })?;
        let id = value.get("id").cloned().unwrap_or(Value::Null);

        let request: RpcRequest = serde_json::from_value(value).map_err(|e| {
            RpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")).into_response(id.clone())
        })?;
        if request.jsonrpc != "2.0" {
            return Err(RpcError::new(INVALID_REQUEST, "Invalid request: jsonrpc must be \"2.0\"")
                .into_response(id));
        }
        if !(request.id.is_string() || request.id.is_number()) {
            return Err(
                RpcError::new(INVALID_REQUEST, "Invalid request: id must be a string or number")
                    .into_response(id),
            );
        }
        Ok(request)
    }

    /// Key used to track the request while it is in flight.
    pub fn key(&self) -> String {
        id_key(&self.id)
    }
}

pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn cancelled() -> Self {
        Self::new(REQUEST_CANCELLED, "Request cancelled")
    }

    pub fn into_response(self, id: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": id, "error": self })
    }
}

impl From<HearthError> for RpcError {
    fn from(e: HearthError) -> Self {
        match e {
            HearthError::ToolNotFound(_)
            | HearthError::ApprovalNotPending(_)
            | HearthError::PolicyViolation(_) => Self::invalid_params(e.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

/// Decode a method's params, mapping failures to `INVALID_PARAMS`.
pub fn params<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, RpcError> {
    let value = if value.is_null() { json!({}) } else { value };
    serde_json::from_value(value).map_err(|e| RpcError::invalid_params(format!("Invalid params: {e}")))
}

pub fn result_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

pub fn token_frame(id: &Value, token: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "streaming": true, "token": token })
}

pub fn complete_frame(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "complete": true, "result": result })
}
