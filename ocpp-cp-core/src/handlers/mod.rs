//! Version-specific protocol behaviour
//!
//! Each supported protocol version owns a static table from action name to
//! handler function for inbound CALLs, and another for the CALLRESULTs of
//! calls the charge point made. Resolution is a match on the configured
//! version, fixed for the connection's lifetime.

pub mod v16;
pub mod v201;

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::connection::{Connection, ConnectionError};
use crate::ocpp::{Call, CallError, CallResult, ErrorCode, ProtocolVersion};
use crate::simulator::TelemetryReport;
use crate::station::{
    ConfigChange, ConnectorStatus, PendingStart, AUTHORIZE_REMOTE_TX_REQUESTS, HEARTBEAT_INTERVAL,
    METER_VALUE_SAMPLE_INTERVAL,
};

/// Work to run once a CALLRESULT has been written
pub type Deferred = Box<dyn FnOnce(&Connection) + Send>;

/// Successful answer to an inbound CALL
pub struct Reply {
    pub payload: Value,
    pub(crate) then: Option<Deferred>,
}

impl Reply {
    pub fn new(payload: impl Serialize) -> Result<Self, CallFault> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| CallFault::new(ErrorCode::InternalError, e.to_string()))?;
        Ok(Self { payload, then: None })
    }

    /// Run `follow_up` after the CALLRESULT has been sent
    pub fn then(mut self, follow_up: impl FnOnce(&Connection) + Send + 'static) -> Self {
        self.then = Some(Box::new(follow_up));
        self
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reply")
            .field("payload", &self.payload)
            .field("then", &self.then.is_some())
            .finish()
    }
}

/// Failure answered with a CALLERROR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFault {
    pub code: ErrorCode,
    pub description: String,
}

impl CallFault {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn not_implemented(action: &str) -> Self {
        Self::new(
            ErrorCode::NotImplemented,
            format!("Action {} is not implemented", action),
        )
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, description)
    }

    pub fn into_call_error(self, message_id: &str) -> CallError {
        CallError::new(message_id, self.code, self.description)
    }
}

impl From<ConnectionError> for CallFault {
    fn from(e: ConnectionError) -> Self {
        CallFault::internal(e.to_string())
    }
}

/// Handler for an inbound CALL
pub type CallHandler = fn(&Connection, &Call) -> Result<Reply, CallFault>;

/// Handler for the CALLRESULT of an outbound CALL
pub type ResultHandler = fn(&Connection, &Call, &CallResult);

/// Action tables of one protocol version
pub struct HandlerTable {
    pub calls: &'static [(&'static str, CallHandler)],
    pub results: &'static [(&'static str, ResultHandler)],
}

impl HandlerTable {
    fn call(&self, action: &str) -> Option<CallHandler> {
        self.calls
            .iter()
            .find(|(name, _)| *name == action)
            .map(|(_, handler)| *handler)
    }

    fn result(&self, action: &str) -> Option<ResultHandler> {
        self.results
            .iter()
            .find(|(name, _)| *name == action)
            .map(|(_, handler)| *handler)
    }
}

/// Resolved behaviour for the configured protocol version
#[derive(Clone, Copy)]
pub enum VersionHandler {
    Ocpp16(&'static HandlerTable),
    Ocpp201(&'static HandlerTable),
}

impl std::fmt::Debug for VersionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VersionHandler({})", self.version())
    }
}

impl VersionHandler {
    /// Handler set for a protocol version
    pub fn resolve(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::Ocpp16 => VersionHandler::Ocpp16(&v16::TABLE),
            ProtocolVersion::Ocpp201 => VersionHandler::Ocpp201(&v201::TABLE),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        match self {
            VersionHandler::Ocpp16(_) => ProtocolVersion::Ocpp16,
            VersionHandler::Ocpp201(_) => ProtocolVersion::Ocpp201,
        }
    }

    fn table(&self) -> &'static HandlerTable {
        match self {
            VersionHandler::Ocpp16(table) | VersionHandler::Ocpp201(table) => table,
        }
    }

    /// Whether inbound CALLs with this action are handled
    pub fn supports_call(&self, action: &str) -> bool {
        self.table().call(action).is_some()
    }

    /// Answer an inbound CALL
    pub fn handle_call(&self, connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
        match self.table().call(&call.action) {
            Some(handler) => handler(connection, call),
            None => Err(CallFault::not_implemented(&call.action)),
        }
    }

    /// React to the CALLRESULT of one of our calls
    pub fn handle_call_result(&self, connection: &Connection, original: &Call, result: &CallResult) {
        if let Some(handler) = self.table().result(&original.action) {
            handler(connection, original, result);
        }
    }

    /// React to a CALLERROR
    pub fn handle_call_error(&self, _connection: &Connection, error: &CallError) {
        warn!(
            "{} CALLERROR for {}: {} - {} {}",
            self.version(),
            error.message_id,
            error.error_code,
            error.error_description,
            error.error_details
        );
    }

    /// Action and payload of a periodic telemetry call
    pub fn telemetry(&self, report: &TelemetryReport) -> Result<(&'static str, Value), serde_json::Error> {
        match self {
            VersionHandler::Ocpp16(_) => v16::telemetry(report),
            VersionHandler::Ocpp201(_) => v201::telemetry(report),
        }
    }

    pub fn boot_notification(&self, connection: &Connection) -> Result<String, ConnectionError> {
        match self {
            VersionHandler::Ocpp16(_) => v16::boot_notification(connection),
            VersionHandler::Ocpp201(_) => v201::boot_notification(connection),
        }
    }

    pub fn status_notification(
        &self,
        connection: &Connection,
        connector_id: u32,
        status: ConnectorStatus,
    ) -> Result<String, ConnectionError> {
        match self {
            VersionHandler::Ocpp16(_) => v16::status_notification(connection, connector_id, status),
            VersionHandler::Ocpp201(_) => v201::status_notification(connection, connector_id, status),
        }
    }

    pub fn authorize(&self, connection: &Connection, id_tag: &str) -> Result<String, ConnectionError> {
        match self {
            VersionHandler::Ocpp16(_) => v16::authorize(connection, id_tag),
            VersionHandler::Ocpp201(_) => v201::authorize(connection, id_tag),
        }
    }

    pub fn start_transaction(
        &self,
        connection: &Connection,
        connector_id: u32,
        id_tag: &str,
    ) -> Result<String, ConnectionError> {
        match self {
            VersionHandler::Ocpp16(_) => v16::start_transaction(connection, connector_id, id_tag),
            VersionHandler::Ocpp201(_) => v201::start_transaction(connection, connector_id, id_tag, None),
        }
    }

    pub fn stop_transaction(
        &self,
        connection: &Connection,
        transaction_id: &str,
    ) -> Result<String, ConnectionError> {
        match self {
            VersionHandler::Ocpp16(_) => v16::stop_transaction(connection, transaction_id, None),
            VersionHandler::Ocpp201(_) => v201::stop_transaction(connection, transaction_id, None),
        }
    }
}

/// Parse a typed payload, mapping failures to the version's format error
pub(crate) fn parse<T: for<'de> serde::Deserialize<'de>>(
    connection: &Connection,
    call: &Call,
) -> Result<T, CallFault> {
    call.parse_payload()
        .map_err(|e| CallFault::new(connection.version().format_violation(), e.to_string()))
}

/// BootNotification accepted: arm the heartbeat and report every connector
pub(crate) fn accept_registration(connection: &Connection, interval_secs: i32) {
    let interval_secs = match u64::try_from(interval_secs) {
        Ok(secs) if secs > 0 => secs,
        _ => connection
            .with_station(|s| s.interval_secs(HEARTBEAT_INTERVAL))
            .unwrap_or_else(|| connection.config().heartbeat_interval.as_secs()),
    };

    let connectors: Vec<(u32, ConnectorStatus)> = connection.with_station(|station| {
        station.registered = true;
        station.config_set(HEARTBEAT_INTERVAL, &interval_secs.to_string());
        station.connectors().map(|c| (c.id, c.status)).collect()
    });

    info!("Registered with CSMS, heartbeat every {}s", interval_secs);
    connection.arm_heartbeat(Duration::from_secs(interval_secs));

    for (connector_id, status) in connectors {
        notify(connection, connector_id, status);
    }
    connection.publish_state();
}

/// Change a configuration key and apply its side effects
pub(crate) fn apply_setting(connection: &Connection, key: &str, value: &str) -> ConfigChange {
    let (change, registered) = connection.with_station(|s| (s.config_set(key, value), s.registered));
    if change != ConfigChange::Accepted {
        return change;
    }

    match key {
        HEARTBEAT_INTERVAL if registered => {
            if let Ok(secs) = value.parse() {
                connection.arm_heartbeat(Duration::from_secs(secs));
            }
        }
        METER_VALUE_SAMPLE_INTERVAL => {
            if let Ok(secs) = value.parse() {
                connection.simulator().set_period(Duration::from_secs(secs));
            }
        }
        _ => {}
    }
    change
}

/// Set a connector's status and tell the CSMS
pub(crate) fn report_status(connection: &Connection, connector_id: u32, status: ConnectorStatus) {
    if connection.update_connector(connector_id, status) {
        notify(connection, connector_id, status);
    }
}

/// Send StatusNotification, logging failures
pub(crate) fn notify(connection: &Connection, connector_id: u32, status: ConnectorStatus) {
    if let Err(e) = connection.status_notification(connector_id, status) {
        warn!("StatusNotification for connector {} not sent: {}", connector_id, e);
    }
}

/// Connectors whose transaction ended take their next status
pub(crate) fn release_finished(connection: &Connection) {
    let released = connection.with_station(|s| s.release_finished());
    for (connector_id, status) in released {
        notify(connection, connector_id, status);
    }
    connection.publish_state();
}

/// Apply an availability change: idle connectors switch now, busy ones
/// once their transaction has finished
pub(crate) fn apply_availability(connection: &Connection, targets: &[(u32, bool)], status: ConnectorStatus) {
    for &(connector_id, busy) in targets {
        if busy {
            connection.with_station(|s| s.schedule_status(connector_id, status));
        } else {
            report_status(connection, connector_id, status);
        }
    }
}

/// Whether remote starts must be authorized before a transaction begins
pub(crate) fn authorize_remote_starts(connection: &Connection) -> bool {
    connection.with_station(|s| s.flag(AUTHORIZE_REMOTE_TX_REQUESTS))
}

/// Hold `connector_id` for a remote start and send Authorize for its id tag
pub(crate) fn hold_for_authorization(
    connection: &Connection,
    connector_id: u32,
    pending: PendingStart,
) -> Result<String, ConnectionError> {
    let id_tag = pending.id_tag.clone();
    connection.with_station(|s| s.hold_start(connector_id, pending));
    connection.publish_state();

    connection.authorize(&id_tag).inspect_err(|_| {
        connection.with_station(|s| s.take_pending_start(&id_tag));
    })
}

/// Authorize result for an id tag: the held start, if any, it releases
pub(crate) fn release_held_start(connection: &Connection, id_tag: &str) -> Option<(u32, PendingStart)> {
    connection.with_station(|s| s.take_pending_start(id_tag))
}

/// Connector addressed by a request, checked against the station
pub(crate) fn known_connector(connection: &Connection, connector_id: u32) -> Result<(), ConnectionError> {
    connection
        .with_station(|s| s.connector(connector_id).map(|_| ()))
        .ok_or(ConnectionError::UnknownConnector(connector_id))
}
