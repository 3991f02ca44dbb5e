//! OCPP-J protocol layer
//!
//! - `messages`: JSON-RPC framing (CALL, CALLRESULT, CALLERROR)
//! - `version`: the closed set of supported protocol versions
//! - `v16`: OCPP 1.6J payload types
//! - `v201`: OCPP 2.0.1 payload types

pub mod messages;
pub mod version;
pub mod v16;
pub mod v201;

pub use messages::*;
pub use version::{ProtocolVersion, UnsupportedVersion};
