//! Configuration for the emulated charge point
//!
//! Combines the CSMS endpoint, station identity and simulation settings.

use std::time::Duration;

use crate::ocpp::ProtocolVersion;
use crate::simulator::{SimulatorConfig, DEFAULT_PERIOD, DEFAULT_POWER_KW};
use crate::transport::{build_ocpp_url, Credentials};

/// Complete charge point configuration
#[derive(Debug, Clone)]
pub struct ChargePointConfig {
    /// CSMS WebSocket URL (without identity)
    pub endpoint: String,

    /// Charge point identity (appended to URL, Basic auth user)
    pub identity: String,

    /// Basic auth password (optional)
    pub password: Option<String>,

    /// Protocol version to negotiate
    pub version: ProtocolVersion,

    /// Vendor name for BootNotification
    pub vendor: String,

    /// Model name for BootNotification
    pub model: String,

    /// Serial number (optional)
    pub serial_number: Option<String>,

    /// Firmware version (optional)
    pub firmware_version: Option<String>,

    /// Number of connectors to report
    pub connector_count: u32,

    /// Charging power of simulated sessions (kW)
    pub power_kw: f64,

    /// Telemetry period of simulated sessions
    pub meter_interval: Duration,

    /// Heartbeat interval until the CSMS assigns one
    pub heartbeat_interval: Duration,

    /// Id tag used for locally started transactions
    pub id_tag: String,
}

impl Default for ChargePointConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8180/steve/websocket/CentralSystemService".to_string(),
            identity: "EK3-001".to_string(),
            password: None,
            version: ProtocolVersion::Ocpp16,
            vendor: "Elektrokombinacija".to_string(),
            model: "EK3-OCPP".to_string(),
            serial_number: None,
            firmware_version: Some("0.1.0".to_string()),
            connector_count: 1,
            power_kw: DEFAULT_POWER_KW,
            meter_interval: DEFAULT_PERIOD,
            heartbeat_interval: Duration::from_secs(300),
            id_tag: "EMULATOR".to_string(),
        }
    }
}

impl ChargePointConfig {
    /// Create config with basic parameters
    pub fn new(
        endpoint: impl Into<String>,
        identity: impl Into<String>,
        version: ProtocolVersion,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            identity: identity.into(),
            version,
            ..Default::default()
        }
    }

    /// Set vendor info
    pub fn with_vendor(mut self, vendor: impl Into<String>, model: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self.model = model.into();
        self
    }

    /// Set serial number
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    /// Set firmware version
    pub fn with_firmware(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = Some(version.into());
        self
    }

    /// Set Basic auth password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set connector count
    pub fn with_connector_count(mut self, count: u32) -> Self {
        self.connector_count = count;
        self
    }

    /// Set simulated charging power
    pub fn with_power_kw(mut self, power_kw: f64) -> Self {
        self.power_kw = power_kw;
        self
    }

    /// Set telemetry period
    pub fn with_meter_interval(mut self, interval: Duration) -> Self {
        self.meter_interval = interval;
        self
    }

    /// Set initial heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set id tag for local transactions
    pub fn with_id_tag(mut self, id_tag: impl Into<String>) -> Self {
        self.id_tag = id_tag.into();
        self
    }

    /// Full WebSocket URL including identity
    pub fn url(&self) -> String {
        build_ocpp_url(&self.endpoint, &self.identity)
    }

    /// Basic auth credentials, when a password is configured
    pub fn credentials(&self) -> Option<Credentials> {
        self.password.as_ref().map(|password| Credentials {
            identity: self.identity.clone(),
            password: password.clone(),
        })
    }

    /// Settings for the transaction simulator
    pub fn simulator(&self) -> SimulatorConfig {
        SimulatorConfig {
            power_kw: self.power_kw,
            period: self.meter_interval,
        }
    }
}
