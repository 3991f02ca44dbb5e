//! Charge point connection
//!
//! Owns one link to the CSMS together with everything scoped to it: the
//! pending-call ledger, the version handler, the transaction simulator, the
//! heartbeat timer and the station model.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──connect()──► Connecting ──link open──► Open
//!                         │                      │ close() / peer close
//!                         ▼                      ▼
//!                       Closed ◄───teardown──── Closing
//! ```
//!
//! ## Message Flow
//!
//! Outbound: id allocation → ledger → schema check → encode → transport → mirror.
//!
//! Inbound CALL: handler lookup → schema check → handler → CALLRESULT or
//! CALLERROR. Inbound CALLRESULT: `take_by_id` → schema check keyed by the
//! original action → result handler. Inbound CALLERROR: settle → error handler.
//!
//! A fault in a single inbound message is logged and never closes the link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ChargePointConfig;
use crate::handlers::{CallFault, VersionHandler};
use crate::mirror::{AdminEvent, AdminMirror, NullMirror};
use crate::ocpp::{Call, CallError, CallResult, FrameError, OcppMessage, ProtocolVersion};
use crate::oracle::{SchemaOracle, SchemaViolation, TypedOracle};
use crate::outbox::{Outbox, OutboxError};
use crate::simulator::{TelemetryReport, TelemetrySink, TransactionSimulator};
use crate::station::{Connector, ConnectorStatus, Station};
use crate::transport::{Transport, TransportError, TransportEvent, ABNORMAL_CLOSURE};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Connection errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("operation not allowed in state {0:?}")]
    InvalidState(ConnectionState),

    #[error("connection is not open")]
    NotOpen,

    #[error("schema violation: {0}")]
    Schema(#[from] SchemaViolation),

    #[error(transparent)]
    DuplicateCallId(#[from] OutboxError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("transport terminated: {code} {reason}")]
    TransportTerminated { code: u16, reason: String },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("JSON encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no pending call with id {0}")]
    UnknownCorrelation(String),

    #[error("unknown connector {0}")]
    UnknownConnector(u32),

    #[error("connector {0} already has a transaction")]
    ConnectorBusy(u32),

    #[error("no free connector")]
    NoFreeConnector,

    #[error("unknown transaction {0}")]
    UnknownTransaction(String),
}

/// How a finished connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum Termination {
    Local,
    Remote { code: u16, reason: String },
}

struct Inner {
    config: ChargePointConfig,
    handler: VersionHandler,
    outbox: Outbox,
    oracle: Arc<dyn SchemaOracle>,
    mirror: Arc<dyn AdminMirror>,
    simulator: TransactionSimulator,
    station: Mutex<Station>,
    state: Mutex<ConnectionState>,
    is_finishing: AtomicBool,
    outgoing: Mutex<Option<mpsc::UnboundedSender<String>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    finished: watch::Sender<Option<Termination>>,
}

/// Handle to a charge point connection; clones share the same connection
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.inner.config.identity)
            .field("version", &self.version())
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    /// Create a connection validating with [`TypedOracle`] and no observer
    pub fn new(config: ChargePointConfig) -> Self {
        Self::with_parts(config, Arc::new(TypedOracle), Arc::new(NullMirror))
    }

    /// Create a connection with an explicit oracle and admin mirror
    pub fn with_parts(
        config: ChargePointConfig,
        oracle: Arc<dyn SchemaOracle>,
        mirror: Arc<dyn AdminMirror>,
    ) -> Self {
        let handler = VersionHandler::resolve(config.version);
        let station = Station::new(
            config.connector_count,
            config.heartbeat_interval.as_secs(),
            config.meter_interval.as_secs(),
        );
        let (finished, _) = watch::channel(None);

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let sink: TelemetrySink = Arc::new(move |report: &TelemetryReport| {
                match weak.upgrade() {
                    Some(inner) => {
                        Connection { inner }.emit_telemetry(report);
                        true
                    }
                    None => false,
                }
            });

            Inner {
                simulator: TransactionSimulator::new(config.simulator(), sink),
                config,
                handler,
                outbox: Outbox::new(),
                oracle,
                mirror,
                station: Mutex::new(station),
                state: Mutex::new(ConnectionState::Idle),
                is_finishing: AtomicBool::new(false),
                outgoing: Mutex::new(None),
                heartbeat: Mutex::new(None),
                reader: Mutex::new(None),
                finished,
            }
        });

        Self { inner }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn version(&self) -> ProtocolVersion {
        self.inner.handler.version()
    }

    pub fn config(&self) -> &ChargePointConfig {
        &self.inner.config
    }

    pub fn outbox(&self) -> &Outbox {
        &self.inner.outbox
    }

    pub fn simulator(&self) -> &TransactionSimulator {
        &self.inner.simulator
    }

    /// Snapshot of the station model
    pub fn station(&self) -> Station {
        self.inner.station.lock().clone()
    }

    /// Run `f` with the station model locked
    pub(crate) fn with_station<R>(&self, f: impl FnOnce(&mut Station) -> R) -> R {
        f(&mut self.inner.station.lock())
    }

    fn set_state(&self, state: ConnectionState) {
        *self.inner.state.lock() = state;
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the link and send BootNotification.
    ///
    /// Allowed from `Idle` and `Closed`.
    pub async fn connect<T: Transport>(&self, transport: &T) -> Result<(), ConnectionError> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ConnectionState::Idle | ConnectionState::Closed => {
                    *state = ConnectionState::Connecting;
                }
                other => return Err(ConnectionError::InvalidState(other)),
            }
            self.inner.is_finishing.store(false, Ordering::SeqCst);
        }
        self.inner.finished.send_replace(None);
        self.publish_connection_info();

        let config = &self.inner.config;
        let url = config.url();
        let credentials = config.credentials();
        info!(
            "Connecting to {} as {} ({})",
            url,
            config.identity,
            self.version()
        );

        let link = match transport
            .open(&url, self.version().subprotocol(), credentials.as_ref())
            .await
        {
            Ok(link) => link,
            Err(e) => {
                error!("Failed to open link to {}: {}", url, e);
                self.set_state(ConnectionState::Closed);
                self.publish_connection_info();
                return Err(e.into());
            }
        };

        {
            let mut state = self.inner.state.lock();
            if *state != ConnectionState::Connecting {
                // Closed while the link was opening
                return Err(ConnectionError::InvalidState(*state));
            }
            *self.inner.outgoing.lock() = Some(link.outgoing);
            *state = ConnectionState::Open;
        }

        let reader = tokio::spawn(read_loop(self.clone(), link.incoming));
        *self.inner.reader.lock() = Some(reader);

        info!("Connection open");
        self.publish_connection_info();
        self.boot_notification()?;
        Ok(())
    }

    /// Close the link locally. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ConnectionState::Closing | ConnectionState::Closed => return,
                ConnectionState::Idle => {
                    *state = ConnectionState::Closed;
                    drop(state);
                    self.inner.finished.send_replace(Some(Termination::Local));
                    return;
                }
                ConnectionState::Connecting | ConnectionState::Open => {}
            }
            self.inner.is_finishing.store(true, Ordering::SeqCst);
            *state = ConnectionState::Closing;
        }

        info!("Closing connection");
        self.teardown();
        if let Some(reader) = self.inner.reader.lock().take() {
            reader.abort();
        }
        self.inner.finished.send_replace(Some(Termination::Local));
    }

    /// Wait until the connection has finished.
    ///
    /// A local `close()` yields `Ok(())`; a close initiated by the peer or
    /// the transport yields `TransportTerminated`.
    pub async fn closed(&self) -> Result<(), ConnectionError> {
        let mut finished = self.inner.finished.subscribe();
        let termination = finished
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ConnectionError::NotOpen)?
            .clone();

        match termination {
            Some(Termination::Remote { code, reason }) => {
                Err(ConnectionError::TransportTerminated { code, reason })
            }
            _ => Ok(()),
        }
    }

    fn on_close(&self, code: u16, reason: String) {
        {
            let mut state = self.inner.state.lock();
            if self.inner.is_finishing.load(Ordering::SeqCst) {
                debug!("Link closed after local close ({})", code);
                return;
            }
            if matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
                return;
            }
            *state = ConnectionState::Closing;
        }

        warn!("Link closed by peer: {} {}", code, reason);
        self.teardown();
        // Runs on the reader task itself; release the handle without aborting
        self.inner.reader.lock().take();
        self.inner
            .finished
            .send_replace(Some(Termination::Remote { code, reason }));
    }

    fn teardown(&self) {
        if let Some(heartbeat) = self.inner.heartbeat.lock().take() {
            heartbeat.abort();
        }
        let cancelled = self.inner.simulator.stop_all();
        let dropped = self.inner.outbox.clear();
        self.inner.outgoing.lock().take();
        self.set_state(ConnectionState::Closed);

        info!(
            "Connection closed: {} sessions cancelled, {} pending calls dropped",
            cancelled, dropped
        );
        self.publish_connection_info();
    }

    // ========================================================================
    // Send path
    // ========================================================================

    /// Send a CALL, returning its message id.
    ///
    /// The call is tracked before it is transmitted; a payload rejected by the
    /// oracle leaves the ledger untouched and nothing is sent.
    pub fn send(&self, action: &str, payload: Value) -> Result<String, ConnectionError> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(ConnectionError::InvalidState(state));
        }

        let message_id = Uuid::new_v4().to_string();
        let call = Call::new(message_id.clone(), action, payload);
        self.inner.outbox.enqueue(call.clone())?;

        let sent = self
            .inner
            .oracle
            .validate_request(self.version(), action, &call.payload)
            .map_err(ConnectionError::from)
            .and_then(|()| call.to_text().map_err(ConnectionError::from))
            .and_then(|text| self.transmit(&message_id, Some(action), text));

        if let Err(e) = sent {
            warn!("Not sending {}: {}", action, e);
            self.inner.outbox.discard(&message_id);
            return Err(e);
        }
        Ok(message_id)
    }

    /// Serialize a typed request and send it
    pub fn send_payload<T: Serialize>(&self, action: &str, payload: &T) -> Result<String, ConnectionError> {
        self.send(action, serde_json::to_value(payload)?)
    }

    /// Re-send an admin-supplied CALL frame under a fresh message id
    pub fn inject_frame(&self, text: &str) -> Result<String, ConnectionError> {
        match OcppMessage::parse(text.as_bytes())? {
            OcppMessage::Call(call) => {
                info!("Injecting {} (was {})", call.action, call.message_id);
                self.send(&call.action, call.payload)
            }
            other => Err(FrameError::MalformedFrame(format!(
                "admin frame {} is not a CALL",
                other.message_id()
            ))
            .into()),
        }
    }

    fn transmit(&self, message_id: &str, action: Option<&str>, text: String) -> Result<(), ConnectionError> {
        {
            let outgoing = self.inner.outgoing.lock();
            let sender = outgoing.as_ref().ok_or(ConnectionError::NotOpen)?;
            debug!("Sending: {}", text);
            sender.send(text.clone()).map_err(|_| ConnectionError::NotOpen)?;
        }

        self.inner.mirror.publish(AdminEvent::OcppMessageSent {
            message_id: message_id.to_string(),
            action: action.map(str::to_string),
            frame: text,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    // ========================================================================
    // Receive path
    // ========================================================================

    /// Process one inbound text frame
    pub fn on_message(&self, text: &str) {
        debug!("Received: {}", text);
        self.inner.mirror.publish(AdminEvent::OcppMessageReceived {
            frame: text.to_string(),
            timestamp: Utc::now(),
        });

        let handled = match OcppMessage::parse(text.as_bytes()) {
            Ok(OcppMessage::Call(call)) => self.answer_call(call),
            Ok(OcppMessage::CallResult(result)) => self.accept_result(result),
            Ok(OcppMessage::CallError(error)) => self.accept_error(error),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = handled {
            warn!("Dropped inbound frame: {}", e);
        }
    }

    fn answer_call(&self, call: Call) -> Result<(), ConnectionError> {
        let handler = self.inner.handler;
        let version = self.version();

        if !handler.supports_call(&call.action) {
            warn!("{} {} is not implemented", version, call.action);
            return self.reply_error(CallFault::not_implemented(&call.action).into_call_error(&call.message_id));
        }

        if let Err(violation) = self
            .inner
            .oracle
            .validate_request(version, &call.action, &call.payload)
        {
            warn!("Inbound {} rejected: {}", call.action, violation.reason);
            let fault = CallFault::new(version.format_violation(), violation.reason);
            return self.reply_error(fault.into_call_error(&call.message_id));
        }

        let reply = match handler.handle_call(self, &call) {
            Ok(reply) => reply,
            Err(fault) => return self.reply_error(fault.into_call_error(&call.message_id)),
        };

        if let Err(violation) = self
            .inner
            .oracle
            .validate_response(version, &call.action, &reply.payload)
        {
            error!("Reply to {} failed validation: {}", call.action, violation);
            let fault = CallFault::internal(violation.to_string());
            return self.reply_error(fault.into_call_error(&call.message_id));
        }

        let text = CallResult::new(call.message_id.clone(), reply.payload).to_text()?;
        self.transmit(&call.message_id, None, text)?;

        if let Some(follow_up) = reply.then {
            follow_up(self);
        }
        Ok(())
    }

    fn reply_error(&self, error: CallError) -> Result<(), ConnectionError> {
        let text = error.to_text()?;
        self.transmit(&error.message_id, None, text)
    }

    fn accept_result(&self, result: CallResult) -> Result<(), ConnectionError> {
        let Some(original) = self.inner.outbox.take_by_id(&result.message_id) else {
            if self.inner.outbox.was_issued(&result.message_id) {
                debug!("Duplicate CALLRESULT for settled call {}", result.message_id);
                return Ok(());
            }
            return Err(ConnectionError::UnknownCorrelation(result.message_id));
        };

        self.inner
            .oracle
            .validate_response(self.version(), &original.action, &result.payload)?;

        debug!("{} answered ({})", original.action, result.message_id);
        self.inner.mirror.publish(AdminEvent::OcppCallResult {
            message_id: result.message_id.clone(),
            action: original.action.clone(),
            payload: result.payload.clone(),
        });

        self.inner.handler.handle_call_result(self, &original, &result);
        Ok(())
    }

    fn accept_error(&self, error: CallError) -> Result<(), ConnectionError> {
        let known = match self.inner.outbox.settle(&error.message_id) {
            Some(original) => {
                debug!("{} failed ({})", original.action, error.message_id);
                true
            }
            None => self.inner.outbox.was_issued(&error.message_id),
        };

        // An error frame is terminal for its id whether or not it is tracked
        self.inner.handler.handle_call_error(self, &error);
        if known {
            Ok(())
        } else {
            Err(ConnectionError::UnknownCorrelation(error.message_id))
        }
    }

    // ========================================================================
    // Timers and telemetry
    // ========================================================================

    /// (Re)arm the heartbeat; a zero interval disables it
    pub(crate) fn arm_heartbeat(&self, interval: Duration) {
        let previous = if interval.is_zero() || self.state() != ConnectionState::Open {
            self.inner.heartbeat.lock().take()
        } else {
            let weak = Arc::downgrade(&self.inner);
            let task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
                loop {
                    ticker.tick().await;
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    if let Err(e) = (Connection { inner }).heartbeat() {
                        warn!("Heartbeat not sent: {}", e);
                        break;
                    }
                }
            });
            debug!("Heartbeat every {:?}", interval);
            self.inner.heartbeat.lock().replace(task)
        };

        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Telemetry sink: turn a report into the version's telemetry call
    pub(crate) fn emit_telemetry(&self, report: &TelemetryReport) {
        let sent = self
            .inner
            .handler
            .telemetry(report)
            .map_err(ConnectionError::from)
            .and_then(|(action, payload)| self.send(action, payload));

        if let Err(e) = sent {
            warn!(
                "Telemetry for transaction {} not sent: {}",
                report.transaction_id, e
            );
        }
    }

    /// Update a connector and notify observers
    pub(crate) fn update_connector(&self, connector_id: u32, status: ConnectorStatus) -> bool {
        let updated = self.with_station(|station| station.set_status(connector_id, status));
        if updated {
            self.publish_state();
        }
        updated
    }

    // ========================================================================
    // Admin mirror
    // ========================================================================

    /// Publish connector and energy state to the mirror
    pub fn publish_state(&self) {
        let connectors: Vec<Connector> = self.with_station(|station| station.connectors().cloned().collect());
        let energy_kwh = connectors
            .iter()
            .filter_map(|c| c.transaction_id.clone())
            .map(|tx| {
                let energy = self.inner.simulator.current_energy(&tx);
                (tx, energy)
            })
            .collect();

        self.inner.mirror.publish(AdminEvent::StateUpdate {
            connectors,
            energy_kwh,
        });
    }

    fn publish_connection_info(&self) {
        self.inner.mirror.publish(AdminEvent::ConnectionInfo {
            url: self.inner.config.url(),
            identity: self.inner.config.identity.clone(),
            version: self.version(),
            state: self.state(),
        });
    }

    // ========================================================================
    // Local operations
    // ========================================================================

    pub fn boot_notification(&self) -> Result<String, ConnectionError> {
        self.inner.handler.boot_notification(self)
    }

    pub fn heartbeat(&self) -> Result<String, ConnectionError> {
        self.send("Heartbeat", Value::Object(serde_json::Map::new()))
    }

    pub fn status_notification(
        &self,
        connector_id: u32,
        status: ConnectorStatus,
    ) -> Result<String, ConnectionError> {
        self.inner.handler.status_notification(self, connector_id, status)
    }

    pub fn authorize(&self, id_tag: &str) -> Result<String, ConnectionError> {
        self.inner.handler.authorize(self, id_tag)
    }

    /// Start a transaction on a connector (the first free one when `None`)
    pub fn start_transaction(
        &self,
        connector_id: Option<u32>,
        id_tag: &str,
    ) -> Result<String, ConnectionError> {
        let connector_id = match connector_id {
            Some(id) => id,
            None => self
                .with_station(|station| station.free_connector())
                .ok_or(ConnectionError::NoFreeConnector)?,
        };
        self.inner.handler.start_transaction(self, connector_id, id_tag)
    }

    /// Stop a running transaction with its final meter reading
    pub fn stop_transaction(&self, transaction_id: &str) -> Result<String, ConnectionError> {
        self.inner.handler.stop_transaction(self, transaction_id)
    }
}

async fn read_loop(connection: Connection, mut incoming: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = incoming.recv().await {
        match event {
            TransportEvent::Message(text) => connection.on_message(&text),
            TransportEvent::Closed { code, reason } => {
                connection.on_close(code, reason);
                return;
            }
        }
    }
    connection.on_close(ABNORMAL_CLOSURE, "transport dropped".to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use serde_json::json;

    fn config(version: ProtocolVersion) -> ChargePointConfig {
        ChargePointConfig::new("ws://csms.test/ocpp", "CP001", version)
    }

    #[test]
    fn test_new_connection_is_idle() {
        let connection = Connection::new(config(ProtocolVersion::Ocpp16));
        assert_eq!(connection.state(), ConnectionState::Idle);
        assert!(connection.outbox().is_empty());
        assert_eq!(connection.station().connectors().count(), 1);
    }

    #[test]
    fn test_send_requires_open() {
        let connection = Connection::new(config(ProtocolVersion::Ocpp16));
        let err = connection.send("Heartbeat", json!({})).unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidState(ConnectionState::Idle)));
        assert!(connection.outbox().is_empty());
    }

    #[tokio::test]
    async fn test_connect_negotiates_subprotocol_and_boots() {
        let (transport, mut peer) = ChannelTransport::pair();
        let connection = Connection::new(
            config(ProtocolVersion::Ocpp201).with_password("secret"),
        );

        connection.connect(&transport).await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Open);

        let opened = transport.opened().unwrap();
        assert_eq!(opened.url, "ws://csms.test/ocpp/CP001");
        assert_eq!(opened.subprotocol, "ocpp2.0.1");
        assert!(opened.authorization.unwrap().starts_with("Basic "));

        let frame = peer.next_frame().await.unwrap();
        assert!(frame.contains("\"BootNotification\""));
        assert_eq!(connection.outbox().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_twice_is_invalid() {
        let (transport, _peer) = ChannelTransport::pair();
        let connection = Connection::new(config(ProtocolVersion::Ocpp16));
        connection.connect(&transport).await.unwrap();

        let err = connection.connect(&transport).await.unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidState(ConnectionState::Open)));
    }

    #[tokio::test]
    async fn test_failed_open_moves_to_closed() {
        let (transport, _peer) = ChannelTransport::pair();
        let first = Connection::new(config(ProtocolVersion::Ocpp16));
        first.connect(&transport).await.unwrap();

        // The pair has been consumed, so a second open fails
        let second = Connection::new(config(ProtocolVersion::Ocpp16));
        let err = second.connect(&transport).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Transport(TransportError::AlreadyOpened)));
        assert_eq!(second.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (transport, _peer) = ChannelTransport::pair();
        let connection = Connection::new(config(ProtocolVersion::Ocpp16));
        connection.connect(&transport).await.unwrap();

        connection.close();
        connection.close();

        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(connection.outbox().is_empty());
        assert!(connection.closed().await.is_ok());
    }

    #[tokio::test]
    async fn test_inject_rejects_non_call_frames() {
        let (transport, _peer) = ChannelTransport::pair();
        let connection = Connection::new(config(ProtocolVersion::Ocpp16));
        connection.connect(&transport).await.unwrap();

        let err = connection.inject_frame(r#"[3,"x",{}]"#).unwrap_err();
        assert!(matches!(err, ConnectionError::Frame(FrameError::MalformedFrame(_))));
    }
}
