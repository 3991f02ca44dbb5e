//! # OCPP-J Charge Point Emulator
//!
//! Emulates the charge point side of OCPP-J (1.6 and 2.0.1) over a
//! persistent WebSocket: it issues calls, answers calls initiated by the
//! CSMS, correlates asynchronous responses with the calls that produced them,
//! and simulates charging sessions that report energy periodically.
//!
//! ## Architecture
//!
//! ```text
//! CSMS (Backend)
//!       │ WebSocket, subprotocol ocpp1.6 / ocpp2.0.1
//!       ▼
//! ┌──────────────────────────────────────────┐
//! │  Connection                              │
//! │  ┌──────────┐ ┌────────┐ ┌────────────┐  │
//! │  │ Codec    │ │ Outbox │ │ Oracle     │  │
//! │  └──────────┘ └────────┘ └────────────┘  │
//! │  ┌──────────────────┐ ┌───────────────┐  │
//! │  │ VersionHandler   │ │ Simulator     │  │
//! │  │ (1.6 | 2.0.1)    │ │ (per session) │  │
//! │  └──────────────────┘ └───────────────┘  │
//! └─────────────┬────────────────────────────┘
//!               │ AdminEvent
//!               ▼
//!         Admin mirror
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use ocpp_cp_core::{ChargePointConfig, Connection, ProtocolVersion, WsTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ChargePointConfig::new(
//!         "ws://localhost:8180/steve/websocket/CentralSystemService",
//!         "CP001",
//!         ProtocolVersion::Ocpp16,
//!     );
//!
//!     let connection = Connection::new(config);
//!     connection.connect(&WsTransport::new()).await?;
//!     connection.closed().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod handlers;
pub mod mirror;
pub mod ocpp;
pub mod oracle;
pub mod outbox;
pub mod simulator;
pub mod station;
pub mod transport;

pub use config::ChargePointConfig;
pub use connection::{Connection, ConnectionError, ConnectionState};
pub use handlers::{CallFault, Reply, VersionHandler};
pub use mirror::{AdminEvent, AdminMirror, BroadcastMirror, NullMirror};
pub use ocpp::{Call, CallError, CallResult, ErrorCode, FrameError, OcppMessage, ProtocolVersion};
pub use oracle::{SchemaOracle, SchemaViolation, TypedOracle};
pub use outbox::{Outbox, OutboxError};
pub use simulator::{SimulatorConfig, TelemetryReport, TransactionSimulator};
pub use station::{ConnectorStatus, PendingStart, Station};
pub use transport::{ChannelPeer, ChannelTransport, Credentials, Transport, TransportError, WsTransport};
