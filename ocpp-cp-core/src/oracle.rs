//! Payload validation keyed by protocol version and action
//!
//! The connection treats the oracle as a pass/fail gate: outbound calls are
//! checked before transmission, inbound calls before dispatch, and results
//! against the action of the call they answer.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::ocpp::{v16, v201, ProtocolVersion};

/// A payload did not match the schema for its action
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{version} {action}: {reason}")]
pub struct SchemaViolation {
    pub version: ProtocolVersion,
    pub action: String,
    pub reason: String,
}

impl SchemaViolation {
    pub fn new(
        version: ProtocolVersion,
        action: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            version,
            action: action.into(),
            reason: reason.into(),
        }
    }
}

/// Validator consulted by the connection
pub trait SchemaOracle: Send + Sync {
    /// Check a CALL payload
    fn validate_request(
        &self,
        version: ProtocolVersion,
        action: &str,
        payload: &Value,
    ) -> Result<(), SchemaViolation>;

    /// Check a CALLRESULT payload against the action of its CALL
    fn validate_response(
        &self,
        version: ProtocolVersion,
        action: &str,
        payload: &Value,
    ) -> Result<(), SchemaViolation>;
}

/// Oracle that checks payloads by deserializing them into the typed
/// request/response structs of each version
#[derive(Debug, Default, Clone, Copy)]
pub struct TypedOracle;

#[derive(Clone, Copy)]
enum Direction {
    Request,
    Response,
}

fn check<T: DeserializeOwned>(
    version: ProtocolVersion,
    action: &str,
    payload: &Value,
) -> Result<(), SchemaViolation> {
    if !payload.is_object() {
        return Err(SchemaViolation::new(version, action, "payload must be a JSON object"));
    }
    serde_json::from_value::<T>(payload.clone())
        .map(|_| ())
        .map_err(|e| SchemaViolation::new(version, action, e.to_string()))
}

fn unknown(version: ProtocolVersion, action: &str) -> Result<(), SchemaViolation> {
    Err(SchemaViolation::new(version, action, "no schema for action"))
}

macro_rules! typed_table {
    ($version:expr, $action:expr, $payload:expr, $direction:expr, $module:ident {
        $($name:literal => ($req:ident, $resp:ident)),* $(,)?
    }) => {
        match ($action, $direction) {
            $(
                ($name, Direction::Request) => check::<$module::$req>($version, $action, $payload),
                ($name, Direction::Response) => check::<$module::$resp>($version, $action, $payload),
            )*
            _ => unknown($version, $action),
        }
    };
}

impl TypedOracle {
    fn validate(
        &self,
        version: ProtocolVersion,
        action: &str,
        payload: &Value,
        direction: Direction,
    ) -> Result<(), SchemaViolation> {
        match version {
            ProtocolVersion::Ocpp16 => typed_table!(version, action, payload, direction, v16 {
                "Authorize" => (AuthorizeRequest, AuthorizeResponse),
                "BootNotification" => (BootNotificationRequest, BootNotificationResponse),
                "ChangeAvailability" => (ChangeAvailabilityRequest, ChangeAvailabilityResponse),
                "ChangeConfiguration" => (ChangeConfigurationRequest, ChangeConfigurationResponse),
                "ClearCache" => (ClearCacheRequest, ClearCacheResponse),
                "DataTransfer" => (DataTransferRequest, DataTransferResponse),
                "GetConfiguration" => (GetConfigurationRequest, GetConfigurationResponse),
                "Heartbeat" => (HeartbeatRequest, HeartbeatResponse),
                "MeterValues" => (MeterValuesRequest, MeterValuesResponse),
                "RemoteStartTransaction" => (RemoteStartTransactionRequest, RemoteStartTransactionResponse),
                "RemoteStopTransaction" => (RemoteStopTransactionRequest, RemoteStopTransactionResponse),
                "Reset" => (ResetRequest, ResetResponse),
                "StartTransaction" => (StartTransactionRequest, StartTransactionResponse),
                "StatusNotification" => (StatusNotificationRequest, StatusNotificationResponse),
                "StopTransaction" => (StopTransactionRequest, StopTransactionResponse),
                "TriggerMessage" => (TriggerMessageRequest, TriggerMessageResponse),
                "UnlockConnector" => (UnlockConnectorRequest, UnlockConnectorResponse),
            }),
            ProtocolVersion::Ocpp201 => typed_table!(version, action, payload, direction, v201 {
                "Authorize" => (AuthorizeRequest, AuthorizeResponse),
                "BootNotification" => (BootNotificationRequest, BootNotificationResponse),
                "ChangeAvailability" => (ChangeAvailabilityRequest, ChangeAvailabilityResponse),
                "ClearCache" => (ClearCacheRequest, ClearCacheResponse),
                "DataTransfer" => (DataTransferRequest, DataTransferResponse),
                "GetVariables" => (GetVariablesRequest, GetVariablesResponse),
                "Heartbeat" => (HeartbeatRequest, HeartbeatResponse),
                "MeterValues" => (MeterValuesRequest, MeterValuesResponse),
                "RequestStartTransaction" => (RequestStartTransactionRequest, RequestStartTransactionResponse),
                "RequestStopTransaction" => (RequestStopTransactionRequest, RequestStopTransactionResponse),
                "Reset" => (ResetRequest, ResetResponse),
                "SetChargingProfile" => (SetChargingProfileRequest, SetChargingProfileResponse),
                "SetVariables" => (SetVariablesRequest, SetVariablesResponse),
                "StatusNotification" => (StatusNotificationRequest, StatusNotificationResponse),
                "TransactionEvent" => (TransactionEventRequest, TransactionEventResponse),
                "TriggerMessage" => (TriggerMessageRequest, TriggerMessageResponse),
                "UnlockConnector" => (UnlockConnectorRequest, UnlockConnectorResponse),
            }),
        }
    }
}

impl SchemaOracle for TypedOracle {
    fn validate_request(
        &self,
        version: ProtocolVersion,
        action: &str,
        payload: &Value,
    ) -> Result<(), SchemaViolation> {
        self.validate(version, action, payload, Direction::Request)
    }

    fn validate_response(
        &self,
        version: ProtocolVersion,
        action: &str,
        payload: &Value,
    ) -> Result<(), SchemaViolation> {
        self.validate(version, action, payload, Direction::Response)
    }
}
