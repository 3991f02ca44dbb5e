//! Charge point model
//!
//! Tracks what the CSMS can observe about the emulated station:
//! - Registration and heartbeat interval
//! - Connector status and the transaction running on each connector
//! - Configuration keys (GetConfiguration / GetVariables)

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

/// Configuration key holding the heartbeat interval (seconds)
pub const HEARTBEAT_INTERVAL: &str = "HeartbeatInterval";
/// Configuration key holding the telemetry period (seconds)
pub const METER_VALUE_SAMPLE_INTERVAL: &str = "MeterValueSampleInterval";
/// Read-only configuration key with the connector count
pub const NUMBER_OF_CONNECTORS: &str = "NumberOfConnectors";
/// Whether remote starts require a local Authorize first
pub const AUTHORIZE_REMOTE_TX_REQUESTS: &str = "AuthorizeRemoteTxRequests";

/// Version-independent connector status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectorStatus {
    Available,
    Preparing,
    Charging,
    Finishing,
    Unavailable,
    Faulted,
}

/// One physical connector
#[derive(Debug, Clone, Serialize)]
pub struct Connector {
    pub id: u32,
    pub status: ConnectorStatus,
    pub transaction_id: Option<String>,
    pub id_tag: Option<String>,
    /// Availability to apply once the running transaction has finished
    pub scheduled: Option<ConnectorStatus>,
    /// Remote start waiting for its id tag to be authorized
    pub pending_start: Option<PendingStart>,
}

/// Remote start held until the CSMS authorizes its id tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingStart {
    pub id_tag: String,
    pub remote_start_id: Option<i32>,
}

impl Connector {
    fn new(id: u32) -> Self {
        Self {
            id,
            status: ConnectorStatus::Available,
            transaction_id: None,
            id_tag: None,
            scheduled: None,
            pending_start: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.status == ConnectorStatus::Available
            && self.transaction_id.is_none()
            && self.pending_start.is_none()
    }
}

/// A configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub value: String,
    pub readonly: bool,
}

/// Outcome of a configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    Accepted,
    Rejected,
    Unknown,
}

/// Observable station state
#[derive(Debug, Clone)]
pub struct Station {
    pub registered: bool,
    connectors: BTreeMap<u32, Connector>,
    config: BTreeMap<String, ConfigEntry>,
}

impl Station {
    /// Create a station with connectors `1..=connector_count`
    pub fn new(connector_count: u32, heartbeat_interval_secs: u64, meter_interval_secs: u64) -> Self {
        let connectors = (1..=connector_count).map(|id| (id, Connector::new(id))).collect();

        let mut config = BTreeMap::new();
        let mut put = |key: &str, value: String, readonly: bool| {
            config.insert(key.to_string(), ConfigEntry { value, readonly });
        };
        put(HEARTBEAT_INTERVAL, heartbeat_interval_secs.to_string(), false);
        put(METER_VALUE_SAMPLE_INTERVAL, meter_interval_secs.to_string(), false);
        put(NUMBER_OF_CONNECTORS, connector_count.to_string(), true);
        put(AUTHORIZE_REMOTE_TX_REQUESTS, "false".to_string(), false);

        Self {
            registered: false,
            connectors,
            config,
        }
    }

    pub fn connector(&self, id: u32) -> Option<&Connector> {
        self.connectors.get(&id)
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors.values()
    }

    /// First connector with no transaction that is available
    pub fn free_connector(&self) -> Option<u32> {
        self.connectors.values().find(|c| c.is_free()).map(|c| c.id)
    }

    /// Update a connector's status; returns false for unknown connectors
    pub fn set_status(&mut self, connector_id: u32, status: ConnectorStatus) -> bool {
        match self.connectors.get_mut(&connector_id) {
            Some(connector) => {
                if connector.status != status {
                    debug!("Connector {}: {:?} -> {:?}", connector_id, connector.status, status);
                }
                connector.status = status;
                true
            }
            None => {
                warn!("Unknown connector {}", connector_id);
                false
            }
        }
    }

    /// Record a transaction on a connector and mark it charging
    pub fn attach_transaction(
        &mut self,
        connector_id: u32,
        transaction_id: impl Into<String>,
        id_tag: Option<String>,
    ) -> bool {
        let Some(connector) = self.connectors.get_mut(&connector_id) else {
            return false;
        };
        let transaction_id = transaction_id.into();
        info!("Connector {}: transaction {} attached", connector_id, transaction_id);
        connector.transaction_id = Some(transaction_id);
        connector.id_tag = id_tag;
        connector.status = ConnectorStatus::Charging;
        true
    }

    /// Clear a transaction, returning the connector it ran on
    pub fn detach_transaction(&mut self, transaction_id: &str) -> Option<u32> {
        let connector = self
            .connectors
            .values_mut()
            .find(|c| c.transaction_id.as_deref() == Some(transaction_id))?;
        connector.transaction_id = None;
        connector.id_tag = None;
        connector.status = ConnectorStatus::Finishing;
        Some(connector.id)
    }

    /// Connector running the transaction
    pub fn connector_for_transaction(&self, transaction_id: &str) -> Option<u32> {
        self.connectors
            .values()
            .find(|c| c.transaction_id.as_deref() == Some(transaction_id))
            .map(|c| c.id)
    }

    /// Id tag that started the transaction
    pub fn id_tag_for_transaction(&self, transaction_id: &str) -> Option<String> {
        self.connectors
            .values()
            .find(|c| c.transaction_id.as_deref() == Some(transaction_id))
            .and_then(|c| c.id_tag.clone())
    }

    /// Apply `status` once the connector's transaction has finished
    pub fn schedule_status(&mut self, connector_id: u32, status: ConnectorStatus) -> bool {
        match self.connectors.get_mut(&connector_id) {
            Some(connector) => {
                info!("Connector {}: {:?} scheduled after transaction", connector_id, status);
                connector.scheduled = Some(status);
                true
            }
            None => false,
        }
    }

    /// Move finished connectors to their next status (Available unless a
    /// change was scheduled), listing them
    pub fn release_finished(&mut self) -> Vec<(u32, ConnectorStatus)> {
        self.connectors
            .values_mut()
            .filter(|c| c.status == ConnectorStatus::Finishing && c.transaction_id.is_none())
            .map(|c| {
                c.status = c.scheduled.take().unwrap_or(ConnectorStatus::Available);
                (c.id, c.status)
            })
            .collect()
    }

    /// Reserve a connector for a remote start awaiting authorization
    pub fn hold_start(&mut self, connector_id: u32, pending: PendingStart) -> bool {
        let Some(connector) = self.connectors.get_mut(&connector_id) else {
            return false;
        };
        connector.status = ConnectorStatus::Preparing;
        connector.pending_start = Some(pending);
        true
    }

    /// Release the held start for `id_tag`, returning its connector
    pub fn take_pending_start(&mut self, id_tag: &str) -> Option<(u32, PendingStart)> {
        let connector = self
            .connectors
            .values_mut()
            .find(|c| c.pending_start.as_ref().is_some_and(|p| p.id_tag == id_tag))?;
        let pending = connector.pending_start.take()?;
        Some((connector.id, pending))
    }

    /// Transactions currently attached to connectors
    pub fn active_transactions(&self) -> Vec<(u32, String)> {
        self.connectors
            .values()
            .filter_map(|c| c.transaction_id.clone().map(|tx| (c.id, tx)))
            .collect()
    }

    pub fn config_get(&self, key: &str) -> Option<&ConfigEntry> {
        self.config.get(key)
    }

    pub fn config_entries(&self) -> impl Iterator<Item = (&String, &ConfigEntry)> {
        self.config.iter()
    }

    /// Change a configuration key
    pub fn config_set(&mut self, key: &str, value: &str) -> ConfigChange {
        let Some(entry) = self.config.get_mut(key) else {
            return ConfigChange::Unknown;
        };
        if entry.readonly {
            return ConfigChange::Rejected;
        }
        if key == AUTHORIZE_REMOTE_TX_REQUESTS && value != "true" && value != "false" {
            return ConfigChange::Rejected;
        }
        if is_interval_key(key) {
            match value.parse::<u64>() {
                Ok(0) if key == METER_VALUE_SAMPLE_INTERVAL => return ConfigChange::Rejected,
                Ok(_) => {}
                Err(_) => return ConfigChange::Rejected,
            }
        }

        info!("Configuration {} = {}", key, value);
        entry.value = value.to_string();
        ConfigChange::Accepted
    }

    /// Boolean configuration value; unknown keys read as false
    pub fn flag(&self, key: &str) -> bool {
        self.config.get(key).is_some_and(|e| e.value == "true")
    }

    /// Configured interval in seconds
    pub fn interval_secs(&self, key: &str) -> Option<u64> {
        self.config.get(key)?.value.parse().ok()
    }
}

fn is_interval_key(key: &str) -> bool {
    key == HEARTBEAT_INTERVAL || key == METER_VALUE_SAMPLE_INTERVAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_lifecycle() {
        let mut station = Station::new(2, 300, 60);

        assert_eq!(station.free_connector(), Some(1));
        assert!(station.attach_transaction(1, "42", Some("TAG".into())));
        assert_eq!(station.connector(1).unwrap().status, ConnectorStatus::Charging);
        assert_eq!(station.free_connector(), Some(2));
        assert_eq!(station.connector_for_transaction("42"), Some(1));
        assert_eq!(station.id_tag_for_transaction("42").as_deref(), Some("TAG"));

        assert_eq!(station.detach_transaction("42"), Some(1));
        assert_eq!(station.connector(1).unwrap().status, ConnectorStatus::Finishing);
        assert_eq!(station.detach_transaction("42"), None);

        assert_eq!(station.release_finished(), vec![(1, ConnectorStatus::Available)]);
        assert!(station.connector(1).unwrap().is_free());
        assert!(station.release_finished().is_empty());
    }

    #[test]
    fn test_scheduled_status_applies_after_transaction() {
        let mut station = Station::new(1, 300, 60);
        station.attach_transaction(1, "7", None);

        assert!(station.schedule_status(1, ConnectorStatus::Unavailable));
        assert_eq!(station.connector(1).unwrap().status, ConnectorStatus::Charging);

        station.detach_transaction("7");
        assert_eq!(station.release_finished(), vec![(1, ConnectorStatus::Unavailable)]);
        assert_eq!(station.connector(1).unwrap().scheduled, None);
        assert_eq!(station.free_connector(), None);
    }

    #[test]
    fn test_pending_start() {
        let mut station = Station::new(2, 300, 60);
        let pending = PendingStart {
            id_tag: "TAG".into(),
            remote_start_id: Some(3),
        };

        assert!(station.hold_start(1, pending.clone()));
        assert_eq!(station.connector(1).unwrap().status, ConnectorStatus::Preparing);
        assert_eq!(station.free_connector(), Some(2));

        assert!(station.take_pending_start("OTHER").is_none());
        assert_eq!(station.take_pending_start("TAG"), Some((1, pending)));
        assert!(station.take_pending_start("TAG").is_none());
    }

    #[test]
    fn test_unknown_connector() {
        let mut station = Station::new(1, 300, 60);
        assert!(!station.set_status(9, ConnectorStatus::Faulted));
        assert!(!station.attach_transaction(9, "1", None));
    }

    #[test]
    fn test_configuration() {
        let mut station = Station::new(2, 300, 60);

        assert_eq!(station.interval_secs(HEARTBEAT_INTERVAL), Some(300));
        assert_eq!(station.config_set(HEARTBEAT_INTERVAL, "30"), ConfigChange::Accepted);
        assert_eq!(station.interval_secs(HEARTBEAT_INTERVAL), Some(30));

        assert_eq!(station.config_set(HEARTBEAT_INTERVAL, "soon"), ConfigChange::Rejected);
        assert_eq!(station.config_set(METER_VALUE_SAMPLE_INTERVAL, "0"), ConfigChange::Rejected);
        assert_eq!(station.config_set(NUMBER_OF_CONNECTORS, "4"), ConfigChange::Rejected);
        assert_eq!(station.config_set("NoSuchKey", "1"), ConfigChange::Unknown);
        assert_eq!(station.config_get(NUMBER_OF_CONNECTORS).unwrap().value, "2");

        assert!(!station.flag(AUTHORIZE_REMOTE_TX_REQUESTS));
        assert_eq!(station.config_set(AUTHORIZE_REMOTE_TX_REQUESTS, "yes"), ConfigChange::Rejected);
        assert_eq!(station.config_set(AUTHORIZE_REMOTE_TX_REQUESTS, "true"), ConfigChange::Accepted);
        assert!(station.flag(AUTHORIZE_REMOTE_TX_REQUESTS));
    }
}
