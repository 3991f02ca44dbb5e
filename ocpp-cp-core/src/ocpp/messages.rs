//! OCPP-J message framing
//!
//! OCPP-J carries JSON arrays over a WebSocket:
//! - CALL: [2, messageId, action, payload]
//! - CALLRESULT: [3, messageId, payload]
//! - CALLERROR: [4, messageId, errorCode, errorDescription, errorDetails]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// OCPP message type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

/// OCPP-J RPC error codes (union of the 1.6 and 2.0.1 vocabularies)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    FormatViolation,
    FormationViolation,
    GenericError,
    InternalError,
    MessageTypeNotSupported,
    NotImplemented,
    NotSupported,
    OccurrenceConstraintViolation,
    PropertyConstraintViolation,
    ProtocolError,
    RpcFrameworkError,
    SecurityError,
    TypeConstraintViolation,
}

impl ErrorCode {
    /// Wire spelling of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FormatViolation => "FormatViolation",
            ErrorCode::FormationViolation => "FormationViolation",
            ErrorCode::GenericError => "GenericError",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::MessageTypeNotSupported => "MessageTypeNotSupported",
            ErrorCode::NotImplemented => "NotImplemented",
            ErrorCode::NotSupported => "NotSupported",
            ErrorCode::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            ErrorCode::PropertyConstraintViolation => "PropertyConstraintViolation",
            ErrorCode::ProtocolError => "ProtocolError",
            ErrorCode::RpcFrameworkError => "RpcFrameworkError",
            ErrorCode::SecurityError => "SecurityError",
            ErrorCode::TypeConstraintViolation => "TypeConstraintViolation",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors in OCPP frame handling
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("JSON encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl FrameError {
    fn malformed(reason: impl Into<String>) -> Self {
        FrameError::MalformedFrame(reason.into())
    }
}

/// OCPP CALL message (request)
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub message_id: String,
    pub action: String,
    pub payload: Value,
}

impl Call {
    /// Create a CALL with an explicit message id
    pub fn new(
        message_id: impl Into<String>,
        action: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            action: action.into(),
            payload,
        }
    }

    /// Serialize to OCPP wire format: [2, messageId, action, payload]
    pub fn to_text(&self) -> Result<String, FrameError> {
        let array = serde_json::json!([
            MessageType::Call as i32,
            &self.message_id,
            &self.action,
            &self.payload
        ]);
        Ok(serde_json::to_string(&array)?)
    }

    /// Parse the payload as a specific request type
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// OCPP CALLRESULT message (success response)
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub message_id: String,
    pub payload: Value,
}

impl CallResult {
    /// Create a new CALLRESULT message
    pub fn new(message_id: impl Into<String>, payload: Value) -> Self {
        Self {
            message_id: message_id.into(),
            payload,
        }
    }

    /// Serialize to OCPP wire format: [3, messageId, payload]
    pub fn to_text(&self) -> Result<String, FrameError> {
        let array = serde_json::json!([
            MessageType::CallResult as i32,
            &self.message_id,
            &self.payload
        ]);
        Ok(serde_json::to_string(&array)?)
    }

    /// Parse the payload as a specific response type
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// OCPP CALLERROR message (error response)
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub message_id: String,
    pub error_code: ErrorCode,
    pub error_description: String,
    pub error_details: Value,
}

impl CallError {
    /// Create a new CALLERROR message with empty details
    pub fn new(
        message_id: impl Into<String>,
        error_code: ErrorCode,
        error_description: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            error_code,
            error_description: error_description.into(),
            error_details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Attach error details
    pub fn with_details(mut self, details: Value) -> Self {
        self.error_details = details;
        self
    }

    /// Serialize to OCPP wire format: [4, messageId, errorCode, errorDescription, errorDetails]
    pub fn to_text(&self) -> Result<String, FrameError> {
        let array = serde_json::json!([
            MessageType::CallError as i32,
            &self.message_id,
            self.error_code.as_str(),
            &self.error_description,
            &self.error_details
        ]);
        Ok(serde_json::to_string(&array)?)
    }
}

/// Parsed OCPP message (any type)
#[derive(Debug, Clone, PartialEq)]
pub enum OcppMessage {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

fn string_at(array: &[Value], index: usize, field: &str) -> Result<String, FrameError> {
    array
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| FrameError::malformed(format!("{field} must be a string")))
}

fn value_at(array: &[Value], index: usize) -> Value {
    array.get(index).cloned().unwrap_or(Value::Null)
}

impl OcppMessage {
    /// Parse an OCPP message from JSON bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| FrameError::malformed(format!("invalid JSON: {e}")))?;

        let array = value
            .as_array()
            .ok_or_else(|| FrameError::malformed("frame is not a JSON array"))?;

        let msg_type = array
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| FrameError::malformed("missing message type"))?;

        match msg_type {
            2 => {
                if array.len() != 4 {
                    return Err(FrameError::malformed(format!(
                        "CALL needs 4 elements, got {}",
                        array.len()
                    )));
                }

                Ok(OcppMessage::Call(Call {
                    message_id: string_at(array, 1, "messageId")?,
                    action: string_at(array, 2, "action")?,
                    payload: value_at(array, 3),
                }))
            }
            3 => {
                if array.len() != 3 {
                    return Err(FrameError::malformed(format!(
                        "CALLRESULT needs 3 elements, got {}",
                        array.len()
                    )));
                }

                Ok(OcppMessage::CallResult(CallResult {
                    message_id: string_at(array, 1, "messageId")?,
                    payload: value_at(array, 2),
                }))
            }
            4 => {
                if array.len() != 5 {
                    return Err(FrameError::malformed(format!(
                        "CALLERROR needs 5 elements, got {}",
                        array.len()
                    )));
                }

                let error_code_str = string_at(array, 2, "errorCode")?;
                let error_code: ErrorCode =
                    serde_json::from_value(Value::String(error_code_str))
                        .unwrap_or(ErrorCode::GenericError);

                Ok(OcppMessage::CallError(CallError {
                    message_id: string_at(array, 1, "messageId")?,
                    error_code,
                    error_description: array
                        .get(3)
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    error_details: value_at(array, 4),
                }))
            }
            other => Err(FrameError::malformed(format!(
                "unknown message type {other}"
            ))),
        }
    }

    /// Get the message ID
    pub fn message_id(&self) -> &str {
        match self {
            OcppMessage::Call(c) => &c.message_id,
            OcppMessage::CallResult(r) => &r.message_id,
            OcppMessage::CallError(e) => &e.message_id,
        }
    }

    /// Serialize to wire text
    pub fn to_text(&self) -> Result<String, FrameError> {
        match self {
            OcppMessage::Call(c) => c.to_text(),
            OcppMessage::CallResult(r) => r.to_text(),
            OcppMessage::CallError(e) => e.to_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_serialization() {
        let call = Call::new("msg-1", "Heartbeat", json!({}));
        let text = call.to_text().unwrap();

        assert_eq!(text, r#"[2,"msg-1","Heartbeat",{}]"#);
    }

    #[test]
    fn test_call_round_trip() {
        let call = Call::new(
            "19223201",
            "StartTransaction",
            json!({"connectorId": 1, "idTag": "TAG-1", "meterStart": 0, "timestamp": "2026-01-20T12:00:00Z"}),
        );

        let text = call.to_text().unwrap();
        match OcppMessage::parse(text.as_bytes()).unwrap() {
            OcppMessage::Call(parsed) => assert_eq!(parsed, call),
            other => panic!("Expected Call, got {:?}", other),
        }
    }

    #[test]
    fn test_call_parsing_keeps_unknown_action() {
        let json = r#"[2, "msg-123", "Reset", {"type": "Hard"}]"#;
        let msg = OcppMessage::parse(json.as_bytes()).unwrap();

        match msg {
            OcppMessage::Call(call) => {
                assert_eq!(call.message_id, "msg-123");
                assert_eq!(call.action, "Reset");
                assert_eq!(call.payload["type"], "Hard");
            }
            _ => panic!("Expected Call"),
        }
    }

    #[test]
    fn test_call_result_parsing() {
        let json = r#"[3, "msg-123", {"currentTime": "2026-01-20T12:00:00Z"}]"#;
        let msg = OcppMessage::parse(json.as_bytes()).unwrap();

        match msg {
            OcppMessage::CallResult(result) => {
                assert_eq!(result.message_id, "msg-123");
                assert_eq!(result.payload["currentTime"], "2026-01-20T12:00:00Z");
            }
            _ => panic!("Expected CallResult"),
        }
    }

    #[test]
    fn test_call_error_parsing() {
        let json = r#"[4, "msg-123", "NotImplemented", "Action not supported", {}]"#;
        let msg = OcppMessage::parse(json.as_bytes()).unwrap();

        match msg {
            OcppMessage::CallError(error) => {
                assert_eq!(error.message_id, "msg-123");
                assert_eq!(error.error_code, ErrorCode::NotImplemented);
                assert_eq!(error.error_description, "Action not supported");
            }
            _ => panic!("Expected CallError"),
        }
    }

    #[test]
    fn test_unknown_error_code_becomes_generic() {
        let json = r#"[4, "msg-9", "SomethingVendorSpecific", "", {}]"#;
        match OcppMessage::parse(json.as_bytes()).unwrap() {
            OcppMessage::CallError(error) => assert_eq!(error.error_code, ErrorCode::GenericError),
            _ => panic!("Expected CallError"),
        }
    }

    #[test]
    fn test_call_error_serialization() {
        let error = CallError::new("abc", ErrorCode::FormationViolation, "bad payload");
        assert_eq!(
            error.to_text().unwrap(),
            r#"[4,"abc","FormationViolation","bad payload",{}]"#
        );
    }

    #[test]
    fn test_malformed_frames() {
        let cases: [&[u8]; 7] = [
            b"not json",
            br#"{"id": 1}"#,
            b"[]",
            br#"[5, "id", {}]"#,
            br#"[2, "id", "Heartbeat"]"#,
            br#"[3, 17, {}]"#,
            br#"[4, "id", "GenericError", "", {}, "extra"]"#,
        ];

        for case in cases {
            let err = OcppMessage::parse(case).unwrap_err();
            assert!(
                matches!(err, FrameError::MalformedFrame(_)),
                "{:?} should be malformed",
                String::from_utf8_lossy(case)
            );
        }
    }
}
