//! OCPP Charge Point Node - CLI for the charge point emulator
//!
//! Connects one emulated charge point to a CSMS and keeps it running until
//! Ctrl-C or until the CSMS drops the link.
//!
//! # Usage
//!
//! ```bash
//! # OCPP 1.6 against a local SteVe
//! ocpp-cp-node --identity CP001
//!
//! # OCPP 2.0.1 with Basic auth, 11 kW sessions reporting every 30 s
//! ocpp-cp-node --identity CP002 --ocpp-version ocpp2.0.1 \
//!     --endpoint ws://localhost:9000/ocpp --password secret \
//!     --power-kw 11 --meter-interval 30
//!
//! # Start charging on connector 1 as soon as the CSMS accepts the boot
//! ocpp-cp-node --identity CP003 --auto-start
//! ```
//!
//! Each line typed on stdin is sent as an OCPP CALL frame, for example
//! `[2,"x","Authorize",{"idTag":"TAG-1"}]`. The message id is replaced.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ocpp_cp_core::{
    AdminEvent, BroadcastMirror, ChargePointConfig, Connection, ProtocolVersion, TypedOracle,
    WsTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Emulated OCPP-J charge point
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSMS WebSocket URL (the identity is appended)
    #[arg(
        long,
        env = "OCPP_ENDPOINT",
        default_value = "ws://localhost:8180/steve/websocket/CentralSystemService"
    )]
    endpoint: String,

    /// Charge point identity
    #[arg(short, long, env = "OCPP_IDENTITY", default_value = "EK3-001")]
    identity: String,

    /// Basic auth password
    #[arg(long, env = "OCPP_PASSWORD")]
    password: Option<String>,

    /// Protocol version (ocpp1.6 or ocpp2.0.1)
    #[arg(long, env = "OCPP_VERSION", default_value = "ocpp1.6")]
    ocpp_version: ProtocolVersion,

    /// Number of connectors
    #[arg(long, env = "CONNECTOR_COUNT", default_value = "1")]
    connectors: u32,

    /// Vendor name
    #[arg(long, env = "CP_VENDOR", default_value = "Elektrokombinacija")]
    vendor: String,

    /// Model name
    #[arg(long, env = "CP_MODEL", default_value = "EK3-OCPP")]
    model: String,

    /// Serial number
    #[arg(long, env = "CP_SERIAL")]
    serial: Option<String>,

    /// Charging power of simulated sessions in kW
    #[arg(long, env = "CHARGING_POWER_KW", default_value = "22")]
    power_kw: f64,

    /// Seconds between meter reports
    #[arg(long, env = "METER_INTERVAL_SECS", default_value = "60")]
    meter_interval: u64,

    /// Heartbeat interval until the CSMS assigns one
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value = "300")]
    heartbeat_interval: u64,

    /// Id tag for locally started transactions
    #[arg(long, env = "OCPP_ID_TAG", default_value = "EMULATOR")]
    id_tag: String,

    /// Start a transaction on connector 1 once the boot is accepted
    #[arg(long)]
    auto_start: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> ChargePointConfig {
        let mut config = ChargePointConfig::new(&self.endpoint, &self.identity, self.ocpp_version)
            .with_vendor(&self.vendor, &self.model)
            .with_connector_count(self.connectors)
            .with_power_kw(self.power_kw)
            .with_meter_interval(Duration::from_secs(self.meter_interval))
            .with_heartbeat_interval(Duration::from_secs(self.heartbeat_interval))
            .with_id_tag(&self.id_tag);

        if let Some(password) = &self.password {
            config = config.with_password(password);
        }
        if let Some(serial) = &self.serial {
            config = config.with_serial(serial);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let config = args.config();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           OCPP Charge Point Emulator                         ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Identity:   {:<48} ║", config.identity);
    println!("║  Version:    {:<48} ║", config.version);
    println!("║  URL:        {:<48} ║", truncate(&config.url(), 48));
    println!("║  Connectors: {:<48} ║", config.connector_count);
    println!("║  Power:      {:<48} ║", format!("{} kW", config.power_kw));
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mirror = BroadcastMirror::default();
    let events = mirror.subscribe();
    let connection = Connection::with_parts(config, Arc::new(TypedOracle), Arc::new(mirror));

    tokio::spawn(watch_events(connection.clone(), events, args.auto_start));
    tokio::spawn(read_admin_frames(connection.clone()));

    connection.connect(&WsTransport::new()).await?;

    tokio::select! {
        finished = connection.closed() => finished?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupted, closing");
            connection.close();
            connection.closed().await?;
        }
    }

    Ok(())
}

/// Log mirror events and trigger the auto-start transaction
async fn watch_events(connection: Connection, mut events: broadcast::Receiver<AdminEvent>, auto_start: bool) {
    let mut started = false;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Admin mirror lagged, {} events skipped", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match serde_json::to_string(&event) {
            Ok(json) => debug!("admin: {}", json),
            Err(e) => warn!("Unserializable admin event: {}", e),
        }

        if let AdminEvent::OcppCallResult { action, payload, .. } = &event {
            if auto_start && !started && action == "BootNotification" && payload["status"] == "Accepted" {
                started = true;
                let id_tag = connection.config().id_tag.clone();
                match connection.start_transaction(Some(1), &id_tag) {
                    Ok(id) => info!("Auto-start requested ({})", id),
                    Err(e) => error!("Auto-start failed: {}", e),
                }
            }
        }
    }
}

/// Send each stdin line as a CALL frame
async fn read_admin_frames(connection: Connection) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match connection.inject_frame(line.trim()) {
                Ok(id) => info!("Injected frame sent as {}", id),
                Err(e) => warn!("Frame not sent: {}", e),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("stdin closed: {}", e);
                break;
            }
        }
    }
}

/// Truncate string with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
