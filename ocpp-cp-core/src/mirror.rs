//! Admin mirror
//!
//! Passive observer of everything the connection sends and receives. Events
//! are published fire-and-forget: a slow or absent observer never blocks or
//! fails the protocol path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::connection::ConnectionState;
use crate::ocpp::ProtocolVersion;
use crate::station::Connector;

/// Structured event for admin observers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminEvent {
    ConnectionInfo {
        url: String,
        identity: String,
        version: ProtocolVersion,
        state: ConnectionState,
    },
    OcppMessageSent {
        message_id: String,
        action: Option<String>,
        frame: String,
        timestamp: DateTime<Utc>,
    },
    OcppMessageReceived {
        frame: String,
        timestamp: DateTime<Utc>,
    },
    OcppCallResult {
        message_id: String,
        action: String,
        payload: Value,
    },
    StateUpdate {
        connectors: Vec<Connector>,
        energy_kwh: Vec<(String, f64)>,
    },
}

/// Sink for admin events
pub trait AdminMirror: Send + Sync {
    fn publish(&self, event: AdminEvent);
}

/// Mirror that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMirror;

impl AdminMirror for NullMirror {
    fn publish(&self, _event: AdminEvent) {}
}

/// Mirror fanning events out to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastMirror {
    tx: broadcast::Sender<AdminEvent>,
}

impl BroadcastMirror {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AdminEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastMirror {
    fn default() -> Self {
        Self::new(256)
    }
}

impl AdminMirror for BroadcastMirror {
    fn publish(&self, event: AdminEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}
