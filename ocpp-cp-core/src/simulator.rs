//! Charging session simulator
//!
//! Each active transaction owns a periodic task that reports the energy
//! delivered so far at a constant power rating. The session table and the
//! timers are governed by one lock: a tick only emits while its session is
//! still in the table, and `stop` removes the session and aborts its timer in
//! the same critical section, so once `stop` returns nothing more is emitted
//! for that transaction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Default charging power (kW)
pub const DEFAULT_POWER_KW: f64 = 22.0;

/// Default telemetry period
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// Shortest accepted telemetry period
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Simulator settings
#[derive(Debug, Clone, Copy)]
pub struct SimulatorConfig {
    /// Constant power delivered by every session
    pub power_kw: f64,
    /// Interval between telemetry reports
    pub period: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            power_kw: DEFAULT_POWER_KW,
            period: DEFAULT_PERIOD,
        }
    }
}

/// Energy delivered after `elapsed` at `power_kw`, in kWh
pub fn energy_kwh(elapsed: Duration, power_kw: f64) -> f64 {
    elapsed.as_secs_f64() * power_kw / 3600.0
}

/// Wire representation of an energy reading (kWh, three decimals)
pub fn format_energy(kwh: f64) -> String {
    format!("{:.3}", kwh)
}

/// One periodic telemetry sample
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryReport {
    pub transaction_id: String,
    pub connector_id: u32,
    pub energy_kwh: f64,
    pub energy_text: String,
    /// 1-based sample counter within the session
    pub seq_no: u64,
    pub timestamp: DateTime<Utc>,
}

/// Final figures of a stopped session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub energy_kwh: f64,
    /// Last sequence number handed out, periodic or triggered
    pub last_seq_no: u64,
}

/// Receiver of telemetry samples, called with the session table locked.
///
/// Returning `false` means the receiver is gone and the session's timer ends.
pub type TelemetrySink = Arc<dyn Fn(&TelemetryReport) -> bool + Send + Sync>;

struct TransactionSession {
    connector_id: u32,
    started_at: Instant,
    power_kw: f64,
    seq_no: u64,
    timer: JoinHandle<()>,
}

impl TransactionSession {
    fn energy_at(&self, now: Instant) -> f64 {
        energy_kwh(now.saturating_duration_since(self.started_at), self.power_kw)
    }

    fn report(&self, transaction_id: &str) -> TelemetryReport {
        let energy = self.energy_at(Instant::now());
        TelemetryReport {
            transaction_id: transaction_id.to_string(),
            connector_id: self.connector_id,
            energy_kwh: energy,
            energy_text: format_energy(energy),
            seq_no: self.seq_no,
            timestamp: Utc::now(),
        }
    }
}

type SessionTable = Arc<Mutex<HashMap<String, TransactionSession>>>;

/// Per-transaction periodic telemetry
pub struct TransactionSimulator {
    config: Mutex<SimulatorConfig>,
    sessions: SessionTable,
    sink: TelemetrySink,
}

impl TransactionSimulator {
    pub fn new(mut config: SimulatorConfig, sink: TelemetrySink) -> Self {
        config.period = config.period.max(MIN_PERIOD);
        Self {
            config: Mutex::new(config),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            sink,
        }
    }

    /// Current settings
    pub fn config(&self) -> SimulatorConfig {
        *self.config.lock()
    }

    /// Change the telemetry period for sessions started from now on
    pub fn set_period(&self, period: Duration) {
        self.config.lock().period = period.max(MIN_PERIOD);
    }

    /// Start simulating a session and arm its telemetry timer.
    ///
    /// Restarting an active transaction id replaces the old session.
    pub fn start(&self, transaction_id: impl Into<String>, connector_id: u32) {
        let transaction_id = transaction_id.into();
        let config = self.config();
        let started_at = Instant::now();

        let mut table = self.sessions.lock();
        if let Some(previous) = table.remove(&transaction_id) {
            previous.timer.abort();
        }

        let timer = tokio::spawn(run_timer(
            self.sessions.clone(),
            self.sink.clone(),
            transaction_id.clone(),
            started_at,
            config.period,
        ));

        table.insert(
            transaction_id.clone(),
            TransactionSession {
                connector_id,
                started_at,
                power_kw: config.power_kw,
                seq_no: 0,
                timer,
            },
        );

        info!(
            "Simulator: transaction {} started on connector {} at {} kW, every {:?}",
            transaction_id, connector_id, config.power_kw, config.period
        );
    }

    /// Stop a session, returning what it delivered.
    ///
    /// Unknown ids are a no-op.
    pub fn stop(&self, transaction_id: &str) -> Option<SessionSummary> {
        let mut table = self.sessions.lock();
        let session = table.remove(transaction_id)?;
        session.timer.abort();
        let summary = SessionSummary {
            energy_kwh: session.energy_at(Instant::now()),
            last_seq_no: session.seq_no,
        };

        info!(
            "Simulator: transaction {} stopped, {} kWh delivered",
            transaction_id,
            format_energy(summary.energy_kwh)
        );
        Some(summary)
    }

    /// Stop every session (connection teardown)
    pub fn stop_all(&self) -> usize {
        let mut table = self.sessions.lock();
        let count = table.len();
        for (transaction_id, session) in table.drain() {
            session.timer.abort();
            debug!("Simulator: cancelled transaction {}", transaction_id);
        }
        count
    }

    /// Energy delivered so far (kWh); zero for unknown ids
    pub fn current_energy(&self, transaction_id: &str) -> f64 {
        self.sessions
            .lock()
            .get(transaction_id)
            .map(|s| s.energy_at(Instant::now()))
            .unwrap_or(0.0)
    }

    /// Reading of a running session without consuming a sequence number.
    ///
    /// For messages that carry no sequence number (MeterValues).
    pub fn snapshot(&self, transaction_id: &str) -> Option<TelemetryReport> {
        let table = self.sessions.lock();
        table.get(transaction_id).map(|s| s.report(transaction_id))
    }

    /// Out-of-band sample taking the session's next sequence number.
    ///
    /// `emit` runs with the session table locked, like the periodic sink,
    /// so a timer tick cannot put a later number on the wire first.
    pub fn sample_now<R>(&self, transaction_id: &str, emit: impl FnOnce(&TelemetryReport) -> R) -> Option<R> {
        let mut table = self.sessions.lock();
        let session = table.get_mut(transaction_id)?;
        session.seq_no += 1;
        let report = session.report(transaction_id);
        Some(emit(&report))
    }

    pub fn is_active(&self, transaction_id: &str) -> bool {
        self.sessions.lock().contains_key(transaction_id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Connector the transaction is running on
    pub fn connector_of(&self, transaction_id: &str) -> Option<u32> {
        self.sessions.lock().get(transaction_id).map(|s| s.connector_id)
    }
}

async fn run_timer(
    sessions: SessionTable,
    sink: TelemetrySink,
    transaction_id: String,
    started_at: Instant,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(started_at + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut table = sessions.lock();
        let Some(session) = table.get_mut(&transaction_id) else {
            break;
        };

        session.seq_no += 1;
        let report = session.report(&transaction_id);

        debug!(
            "Simulator: transaction {} sample {} = {} kWh",
            transaction_id, report.seq_no, report.energy_text
        );
        if !sink(&report) {
            debug!("Simulator: receiver gone, timer for {} ends", transaction_id);
            table.remove(&transaction_id);
            break;
        }
    }
}
