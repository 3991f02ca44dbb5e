//! OCPP 1.6 behaviour
//!
//! Transaction ids are assigned by the central system in the
//! StartTransaction result; the simulated session starts only then.

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use super::{
    accept_registration, apply_availability, apply_setting, authorize_remote_starts,
    hold_for_authorization, known_connector, notify, parse, release_finished, release_held_start,
    report_status, CallFault, HandlerTable, Reply,
};
use crate::connection::{Connection, ConnectionError};
use crate::ocpp::v16::*;
use crate::ocpp::{Call, CallResult};
use crate::simulator::TelemetryReport;
use crate::station::{ConfigChange, ConnectorStatus, PendingStart};

pub(crate) static TABLE: HandlerTable = HandlerTable {
    calls: &[
        ("ChangeAvailability", change_availability),
        ("ChangeConfiguration", change_configuration),
        ("ClearCache", clear_cache),
        ("DataTransfer", data_transfer),
        ("GetConfiguration", get_configuration),
        ("RemoteStartTransaction", remote_start_transaction),
        ("RemoteStopTransaction", remote_stop_transaction),
        ("TriggerMessage", trigger_message),
        ("UnlockConnector", unlock_connector),
    ],
    results: &[
        ("Authorize", on_authorize),
        ("BootNotification", on_boot_notification),
        ("StartTransaction", on_start_transaction),
        ("StopTransaction", on_stop_transaction),
    ],
};

fn charge_point_status(status: ConnectorStatus) -> (ChargePointStatus, ChargePointErrorCode) {
    match status {
        ConnectorStatus::Available => (ChargePointStatus::Available, ChargePointErrorCode::NoError),
        ConnectorStatus::Preparing => (ChargePointStatus::Preparing, ChargePointErrorCode::NoError),
        ConnectorStatus::Charging => (ChargePointStatus::Charging, ChargePointErrorCode::NoError),
        ConnectorStatus::Finishing => (ChargePointStatus::Finishing, ChargePointErrorCode::NoError),
        ConnectorStatus::Unavailable => (ChargePointStatus::Unavailable, ChargePointErrorCode::NoError),
        ConnectorStatus::Faulted => (ChargePointStatus::Faulted, ChargePointErrorCode::OtherError),
    }
}

fn transaction_number(transaction_id: &str) -> Result<i64, ConnectionError> {
    transaction_id
        .parse()
        .map_err(|_| ConnectionError::UnknownTransaction(transaction_id.to_string()))
}

// ============================================================================
// Charge point initiated
// ============================================================================

pub(crate) fn boot_notification(connection: &Connection) -> Result<String, ConnectionError> {
    let config = connection.config();
    connection.send_payload(
        "BootNotification",
        &BootNotificationRequest {
            charge_point_vendor: config.vendor.clone(),
            charge_point_model: config.model.clone(),
            charge_point_serial_number: config.serial_number.clone(),
            firmware_version: config.firmware_version.clone(),
        },
    )
}

pub(crate) fn status_notification(
    connection: &Connection,
    connector_id: u32,
    status: ConnectorStatus,
) -> Result<String, ConnectionError> {
    let (status, error_code) = charge_point_status(status);
    connection.send_payload(
        "StatusNotification",
        &StatusNotificationRequest {
            connector_id,
            error_code,
            status,
            timestamp: Some(Utc::now()),
            info: None,
        },
    )
}

pub(crate) fn authorize(connection: &Connection, id_tag: &str) -> Result<String, ConnectionError> {
    connection.send_payload(
        "Authorize",
        &AuthorizeRequest {
            id_tag: id_tag.to_string(),
        },
    )
}

/// Ask the central system for a transaction on `connector_id`
pub(crate) fn start_transaction(
    connection: &Connection,
    connector_id: u32,
    id_tag: &str,
) -> Result<String, ConnectionError> {
    known_connector(connection, connector_id)?;
    let busy = connection.with_station(|s| {
        s.connector(connector_id)
            .is_some_and(|c| c.transaction_id.is_some())
    });
    if busy {
        return Err(ConnectionError::ConnectorBusy(connector_id));
    }

    report_status(connection, connector_id, ConnectorStatus::Preparing);
    connection.send_payload(
        "StartTransaction",
        &StartTransactionRequest {
            connector_id,
            id_tag: id_tag.to_string(),
            meter_start: 0,
            timestamp: Utc::now(),
            reservation_id: None,
        },
    )
}

/// Stop the simulated session, then report the final meter reading
pub(crate) fn stop_transaction(
    connection: &Connection,
    transaction_id: &str,
    reason: Option<StopReason>,
) -> Result<String, ConnectionError> {
    let number = transaction_number(transaction_id)?;
    let (connector_id, id_tag) = connection.with_station(|s| {
        (
            s.connector_for_transaction(transaction_id),
            s.id_tag_for_transaction(transaction_id),
        )
    });
    let connector_id =
        connector_id.ok_or_else(|| ConnectionError::UnknownTransaction(transaction_id.to_string()))?;

    let energy_kwh = connection
        .simulator()
        .stop(transaction_id)
        .map(|summary| summary.energy_kwh)
        .unwrap_or(0.0);
    connection.with_station(|s| s.detach_transaction(transaction_id));
    connection.publish_state();
    notify(connection, connector_id, ConnectorStatus::Finishing);

    connection.send_payload(
        "StopTransaction",
        &StopTransactionRequest {
            transaction_id: number,
            meter_stop: (energy_kwh * 1000.0).round() as i64,
            timestamp: Utc::now(),
            id_tag,
            reason: Some(reason.unwrap_or(StopReason::Local)),
        },
    )
}

/// MeterValues call for one telemetry sample
pub(crate) fn telemetry(report: &TelemetryReport) -> Result<(&'static str, Value), serde_json::Error> {
    let request = MeterValuesRequest {
        connector_id: report.connector_id,
        transaction_id: report.transaction_id.parse().ok(),
        meter_value: vec![MeterValue {
            timestamp: report.timestamp,
            sampled_value: vec![SampledValue {
                value: report.energy_text.clone(),
                context: Some(ReadingContext::SamplePeriodic),
                measurand: Some(Measurand::EnergyActiveImportRegister),
                phase: None,
                location: None,
                unit: Some(UnitOfMeasure::kWh),
            }],
        }],
    };
    Ok(("MeterValues", serde_json::to_value(request)?))
}

// ============================================================================
// Central system initiated
// ============================================================================

fn remote_start_transaction(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: RemoteStartTransactionRequest = parse(connection, call)?;

    let connector_id = connection.with_station(|s| match request.connector_id {
        Some(id) => s.connector(id).filter(|c| c.is_free()).map(|c| c.id),
        None => s.free_connector(),
    });
    let Some(connector_id) = connector_id else {
        info!("RemoteStartTransaction rejected: no free connector");
        return Reply::new(RemoteStartTransactionResponse {
            status: RemoteStartStopStatus::Rejected,
        });
    };

    // Reserve the connector before answering
    connection.update_connector(connector_id, ConnectorStatus::Preparing);
    info!("RemoteStartTransaction accepted on connector {}", connector_id);

    let id_tag = request.id_tag;
    let authorize_first = authorize_remote_starts(connection);
    Ok(Reply::new(RemoteStartTransactionResponse {
        status: RemoteStartStopStatus::Accepted,
    })?
    .then(move |connection| {
        let sent = if authorize_first {
            let pending = PendingStart {
                id_tag,
                remote_start_id: None,
            };
            hold_for_authorization(connection, connector_id, pending)
        } else {
            start_transaction(connection, connector_id, &id_tag)
        };
        if let Err(e) = sent {
            warn!("Remote start on connector {} abandoned: {}", connector_id, e);
            report_status(connection, connector_id, ConnectorStatus::Available);
        }
    }))
}

fn remote_stop_transaction(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: RemoteStopTransactionRequest = parse(connection, call)?;
    let transaction_id = request.transaction_id.to_string();

    if connection
        .with_station(|s| s.connector_for_transaction(&transaction_id))
        .is_none()
    {
        info!("RemoteStopTransaction rejected: unknown transaction {}", transaction_id);
        return Reply::new(RemoteStopTransactionResponse {
            status: RemoteStartStopStatus::Rejected,
        });
    }

    Ok(Reply::new(RemoteStopTransactionResponse {
        status: RemoteStartStopStatus::Accepted,
    })?
    .then(move |connection| {
        if let Err(e) = stop_transaction(connection, &transaction_id, Some(StopReason::Remote)) {
            warn!("StopTransaction not sent: {}", e);
        }
    }))
}

fn change_availability(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: ChangeAvailabilityRequest = parse(connection, call)?;

    let targets: Vec<(u32, bool)> = connection.with_station(|s| {
        s.connectors()
            .filter(|c| request.connector_id == 0 || c.id == request.connector_id)
            .map(|c| (c.id, c.transaction_id.is_some()))
            .collect()
    });
    if targets.is_empty() {
        return Reply::new(ChangeAvailabilityResponse {
            status: AvailabilityStatus::Rejected,
        });
    }

    let status = if targets.iter().any(|(_, busy)| *busy) {
        AvailabilityStatus::Scheduled
    } else {
        AvailabilityStatus::Accepted
    };
    let new_status = match request.availability {
        AvailabilityType::Inoperative => ConnectorStatus::Unavailable,
        AvailabilityType::Operative => ConnectorStatus::Available,
    };

    Ok(Reply::new(ChangeAvailabilityResponse { status })?
        .then(move |connection| apply_availability(connection, &targets, new_status)))
}

fn get_configuration(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: GetConfigurationRequest = parse(connection, call)?;

    let (known, unknown) = connection.with_station(|s| {
        let entry = |key: &str| {
            s.config_get(key).map(|e| KeyValue {
                key: key.to_string(),
                readonly: e.readonly,
                value: Some(e.value.clone()),
            })
        };
        match request.key {
            Some(keys) if !keys.is_empty() => {
                let mut known = Vec::new();
                let mut unknown = Vec::new();
                for key in keys {
                    match entry(&key) {
                        Some(kv) => known.push(kv),
                        None => unknown.push(key),
                    }
                }
                (known, unknown)
            }
            _ => (
                s.config_entries().filter_map(|(key, _)| entry(key)).collect(),
                Vec::new(),
            ),
        }
    });

    Reply::new(GetConfigurationResponse {
        configuration_key: Some(known),
        unknown_key: (!unknown.is_empty()).then_some(unknown),
    })
}

fn change_configuration(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: ChangeConfigurationRequest = parse(connection, call)?;

    let status = match apply_setting(connection, &request.key, &request.value) {
        ConfigChange::Accepted => ConfigurationStatus::Accepted,
        ConfigChange::Rejected => ConfigurationStatus::Rejected,
        ConfigChange::Unknown => ConfigurationStatus::NotSupported,
    };
    Reply::new(ChangeConfigurationResponse { status })
}

fn trigger_message(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: TriggerMessageRequest = parse(connection, call)?;
    let connector = request.connector_id;

    let supported = matches!(
        request.requested_message,
        MessageTrigger::BootNotification
            | MessageTrigger::Heartbeat
            | MessageTrigger::MeterValues
            | MessageTrigger::StatusNotification
    );
    if !supported {
        return Reply::new(TriggerMessageResponse {
            status: TriggerMessageStatus::NotImplemented,
        });
    }
    if let Some(id) = connector {
        if known_connector(connection, id).is_err() {
            return Reply::new(TriggerMessageResponse {
                status: TriggerMessageStatus::Rejected,
            });
        }
    }

    let requested = request.requested_message;
    Ok(Reply::new(TriggerMessageResponse {
        status: TriggerMessageStatus::Accepted,
    })?
    .then(move |connection| {
        let sent = match requested {
            MessageTrigger::BootNotification => connection.boot_notification().map(|_| ()),
            MessageTrigger::Heartbeat => connection.heartbeat().map(|_| ()),
            MessageTrigger::StatusNotification => {
                let targets: Vec<(u32, ConnectorStatus)> = connection.with_station(|s| {
                    s.connectors()
                        .filter(|c| connector.map_or(true, |id| id == c.id))
                        .map(|c| (c.id, c.status))
                        .collect()
                });
                for (connector_id, status) in targets {
                    notify(connection, connector_id, status);
                }
                Ok(())
            }
            _ => {
                let transactions = connection.with_station(|s| s.active_transactions());
                for (connector_id, transaction_id) in transactions {
                    if connector.map_or(true, |id| id == connector_id) {
                        if let Some(report) = connection.simulator().snapshot(&transaction_id) {
                            connection.emit_telemetry(&report);
                        }
                    }
                }
                Ok(())
            }
        };
        if let Err(e) = sent {
            warn!("Triggered {:?} not sent: {}", requested, e);
        }
    }))
}

fn clear_cache(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let _: ClearCacheRequest = parse(connection, call)?;
    Reply::new(ClearCacheResponse {
        status: ClearCacheStatus::Accepted,
    })
}

fn unlock_connector(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: UnlockConnectorRequest = parse(connection, call)?;

    let Some(transaction) = connection.with_station(|s| {
        s.connector(request.connector_id).map(|c| c.transaction_id.clone())
    }) else {
        return Reply::new(UnlockConnectorResponse {
            status: UnlockStatus::NotSupported,
        });
    };

    let reply = Reply::new(UnlockConnectorResponse {
        status: UnlockStatus::Unlocked,
    })?;
    Ok(match transaction {
        Some(transaction_id) => reply.then(move |connection| {
            if let Err(e) = stop_transaction(connection, &transaction_id, Some(StopReason::UnlockCommand)) {
                warn!("StopTransaction not sent: {}", e);
            }
        }),
        None => reply,
    })
}

fn data_transfer(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: DataTransferRequest = parse(connection, call)?;
    info!("DataTransfer from vendor {} ignored", request.vendor_id);
    Reply::new(DataTransferResponse {
        status: DataTransferStatus::UnknownVendorId,
        data: None,
    })
}

// ============================================================================
// Results
// ============================================================================

fn on_boot_notification(connection: &Connection, _original: &Call, result: &CallResult) {
    let response: BootNotificationResponse = match result.parse_payload() {
        Ok(response) => response,
        Err(e) => return warn!("Unreadable BootNotification result: {}", e),
    };

    match response.status {
        RegistrationStatus::Accepted => accept_registration(connection, response.interval),
        status => warn!("BootNotification {:?}, retry in {}s", status, response.interval),
    }
}

fn on_authorize(connection: &Connection, original: &Call, result: &CallResult) {
    let id_tag = original.payload["idTag"].as_str().unwrap_or_default();
    let status = match result.parse_payload::<AuthorizeResponse>() {
        Ok(response) => response.id_tag_info.status,
        Err(e) => {
            warn!("Unreadable Authorize result: {}", e);
            AuthorizationStatus::Invalid
        }
    };
    info!("Authorize {}: {:?}", id_tag, status);

    let Some((connector_id, _)) = release_held_start(connection, id_tag) else {
        return;
    };
    if status != AuthorizationStatus::Accepted {
        return report_status(connection, connector_id, ConnectorStatus::Available);
    }
    if let Err(e) = start_transaction(connection, connector_id, id_tag) {
        warn!("StartTransaction not sent: {}", e);
        report_status(connection, connector_id, ConnectorStatus::Available);
    }
}

fn on_start_transaction(connection: &Connection, original: &Call, result: &CallResult) {
    let (request, response) = match (
        original.parse_payload::<StartTransactionRequest>(),
        result.parse_payload::<StartTransactionResponse>(),
    ) {
        (Ok(request), Ok(response)) => (request, response),
        (Err(e), _) | (_, Err(e)) => return warn!("Unreadable StartTransaction exchange: {}", e),
    };

    if response.id_tag_info.status != AuthorizationStatus::Accepted {
        warn!(
            "Transaction for {} not authorized: {:?}",
            request.id_tag, response.id_tag_info.status
        );
        report_status(connection, request.connector_id, ConnectorStatus::Available);
        return;
    }

    let transaction_id = response.transaction_id.to_string();
    let attached = connection.with_station(|s| {
        s.attach_transaction(request.connector_id, transaction_id.clone(), Some(request.id_tag))
    });
    if !attached {
        return warn!("Transaction {} on unknown connector {}", transaction_id, request.connector_id);
    }

    connection.simulator().start(transaction_id, request.connector_id);
    notify(connection, request.connector_id, ConnectorStatus::Charging);
    connection.publish_state();
}

fn on_stop_transaction(connection: &Connection, _original: &Call, _result: &CallResult) {
    release_finished(connection);
}
