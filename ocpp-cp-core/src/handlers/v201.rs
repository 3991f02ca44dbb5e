//! OCPP 2.0.1 behaviour
//!
//! Each station connector is modelled as an EVSE with a single connector.
//! Transaction ids are generated locally and a transaction is reported as
//! a TransactionEvent sequence: Started (seqNo 0), Updated per telemetry
//! sample, Ended.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    accept_registration, apply_availability, apply_setting, authorize_remote_starts,
    hold_for_authorization, known_connector, notify, parse, release_finished, release_held_start,
    report_status, CallFault, HandlerTable, Reply,
};
use crate::connection::{Connection, ConnectionError};
use crate::ocpp::v201::ConnectorStatus as EvseStatus;
use crate::ocpp::v201::*;
use crate::ocpp::{Call, CallResult};
use crate::simulator::TelemetryReport;
use crate::station::{ConfigChange, ConnectorStatus, PendingStart};

pub(crate) static TABLE: HandlerTable = HandlerTable {
    calls: &[
        ("ChangeAvailability", change_availability),
        ("ClearCache", clear_cache),
        ("DataTransfer", data_transfer),
        ("GetVariables", get_variables),
        ("RequestStartTransaction", request_start_transaction),
        ("RequestStopTransaction", request_stop_transaction),
        ("SetChargingProfile", set_charging_profile),
        ("SetVariables", set_variables),
        ("TriggerMessage", trigger_message),
        ("UnlockConnector", unlock_connector),
    ],
    results: &[
        ("Authorize", on_authorize),
        ("BootNotification", on_boot_notification),
        ("TransactionEvent", on_transaction_event),
    ],
};

/// Token type reported for locally presented id tags
const LOCAL_TOKEN_TYPE: &str = "Local";

fn evse_status(status: ConnectorStatus) -> EvseStatus {
    match status {
        ConnectorStatus::Available => EvseStatus::Available,
        ConnectorStatus::Preparing | ConnectorStatus::Charging | ConnectorStatus::Finishing => {
            EvseStatus::Occupied
        }
        ConnectorStatus::Unavailable => EvseStatus::Unavailable,
        ConnectorStatus::Faulted => EvseStatus::Faulted,
    }
}

fn evse(connector_id: u32) -> EVSE {
    EVSE {
        id: connector_id,
        connector_id: Some(1),
    }
}

fn id_token(id_tag: &str) -> IdToken {
    IdToken {
        id_token: id_tag.to_string(),
        token_type: LOCAL_TOKEN_TYPE.to_string(),
    }
}

fn energy_reading(kwh: f64, context: ReadingContext, timestamp: DateTime<Utc>) -> MeterValue {
    MeterValue {
        timestamp,
        sampled_value: vec![SampledValue {
            value: kwh,
            context: Some(context),
            measurand: Some(Measurand::EnergyActiveImportRegister),
            phase: None,
            unit_of_measure: Some(UnitOfMeasure {
                unit: "kWh".to_string(),
                multiplier: None,
            }),
        }],
    }
}

/// Reading as sent on the wire: the three-decimal text parsed back.
///
/// 2.0.1 carries sampled values as JSON numbers, so trailing zeros of the
/// three-decimal form do not survive (22.000 kWh is sent as 22.0).
fn report_reading(report: &TelemetryReport, context: ReadingContext) -> MeterValue {
    let kwh = report.energy_text.parse().unwrap_or(report.energy_kwh);
    energy_reading(kwh, context, report.timestamp)
}

fn updated_event(report: &TelemetryReport, trigger_reason: TriggerReason, context: ReadingContext) -> TransactionEventRequest {
    TransactionEventRequest {
        event_type: TransactionEventType::Updated,
        timestamp: report.timestamp,
        trigger_reason,
        seq_no: report.seq_no,
        transaction_info: TransactionInfo {
            transaction_id: report.transaction_id.clone(),
            charging_state: Some(ChargingState::Charging),
            stopped_reason: None,
            remote_start_id: None,
        },
        evse: Some(evse(report.connector_id)),
        id_token: None,
        meter_value: Some(vec![report_reading(report, context)]),
    }
}

// ============================================================================
// Charging station initiated
// ============================================================================

pub(crate) fn boot_notification(connection: &Connection) -> Result<String, ConnectionError> {
    let config = connection.config();
    connection.send_payload(
        "BootNotification",
        &BootNotificationRequest {
            charging_station: ChargingStationInfo {
                model: config.model.clone(),
                vendor_name: config.vendor.clone(),
                serial_number: config.serial_number.clone(),
                firmware_version: config.firmware_version.clone(),
            },
            reason: BootReason::PowerUp,
        },
    )
}

pub(crate) fn status_notification(
    connection: &Connection,
    connector_id: u32,
    status: ConnectorStatus,
) -> Result<String, ConnectionError> {
    connection.send_payload(
        "StatusNotification",
        &StatusNotificationRequest {
            timestamp: Utc::now(),
            connector_status: evse_status(status),
            evse_id: connector_id,
            connector_id: 1,
        },
    )
}

pub(crate) fn authorize(connection: &Connection, id_tag: &str) -> Result<String, ConnectionError> {
    connection.send_payload(
        "Authorize",
        &AuthorizeRequest {
            id_token: id_token(id_tag),
        },
    )
}

/// Start a locally identified transaction and report it as Started
pub(crate) fn start_transaction(
    connection: &Connection,
    connector_id: u32,
    id_tag: &str,
    remote_start_id: Option<i32>,
) -> Result<String, ConnectionError> {
    known_connector(connection, connector_id)?;
    let transaction_id = Uuid::new_v4().to_string();
    let attached = connection.with_station(|s| {
        let busy = s
            .connector(connector_id)
            .is_some_and(|c| c.transaction_id.is_some());
        !busy && s.attach_transaction(connector_id, transaction_id.clone(), Some(id_tag.to_string()))
    });
    if !attached {
        return Err(ConnectionError::ConnectorBusy(connector_id));
    }

    let now = Utc::now();
    let sent = connection.send_payload(
        "TransactionEvent",
        &TransactionEventRequest {
            event_type: TransactionEventType::Started,
            timestamp: now,
            trigger_reason: if remote_start_id.is_some() {
                TriggerReason::RemoteStart
            } else {
                TriggerReason::Authorized
            },
            seq_no: 0,
            transaction_info: TransactionInfo {
                transaction_id: transaction_id.clone(),
                charging_state: Some(ChargingState::Charging),
                stopped_reason: None,
                remote_start_id,
            },
            evse: Some(evse(connector_id)),
            id_token: Some(id_token(id_tag)),
            meter_value: Some(vec![energy_reading(0.0, ReadingContext::TransactionBegin, now)]),
        },
    );

    let message_id = match sent {
        Ok(message_id) => message_id,
        Err(e) => {
            connection.with_station(|s| {
                s.detach_transaction(&transaction_id);
                s.release_finished();
            });
            return Err(e);
        }
    };

    info!("Transaction {} started on EVSE {}", transaction_id, connector_id);
    connection.simulator().start(transaction_id, connector_id);
    notify(connection, connector_id, ConnectorStatus::Charging);
    connection.publish_state();
    Ok(message_id)
}

/// Stop the simulated session, then report the transaction as Ended
pub(crate) fn stop_transaction(
    connection: &Connection,
    transaction_id: &str,
    reason: Option<StoppedReason>,
) -> Result<String, ConnectionError> {
    let connector_id = connection
        .with_station(|s| s.connector_for_transaction(transaction_id))
        .ok_or_else(|| ConnectionError::UnknownTransaction(transaction_id.to_string()))?;

    let (energy_kwh, last_seq_no) = connection
        .simulator()
        .stop(transaction_id)
        .map(|summary| (summary.energy_kwh, summary.last_seq_no))
        .unwrap_or((0.0, 0));
    connection.with_station(|s| s.detach_transaction(transaction_id));
    connection.publish_state();

    let reason = reason.unwrap_or(StoppedReason::Local);
    let now = Utc::now();
    let reading = crate::simulator::format_energy(energy_kwh)
        .parse()
        .unwrap_or(energy_kwh);

    connection.send_payload(
        "TransactionEvent",
        &TransactionEventRequest {
            event_type: TransactionEventType::Ended,
            timestamp: now,
            trigger_reason: match reason {
                StoppedReason::Remote => TriggerReason::RemoteStop,
                _ => TriggerReason::StopAuthorized,
            },
            seq_no: last_seq_no + 1,
            transaction_info: TransactionInfo {
                transaction_id: transaction_id.to_string(),
                charging_state: Some(ChargingState::EVConnected),
                stopped_reason: Some(reason),
                remote_start_id: None,
            },
            evse: Some(evse(connector_id)),
            id_token: None,
            meter_value: Some(vec![energy_reading(reading, ReadingContext::TransactionEnd, now)]),
        },
    )
}

/// TransactionEvent(Updated) for one telemetry sample
pub(crate) fn telemetry(report: &TelemetryReport) -> Result<(&'static str, Value), serde_json::Error> {
    let request = updated_event(report, TriggerReason::MeterValuePeriodic, ReadingContext::SamplePeriodic);
    Ok(("TransactionEvent", serde_json::to_value(request)?))
}

// ============================================================================
// CSMS initiated
// ============================================================================

fn request_start_transaction(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: RequestStartTransactionRequest = parse(connection, call)?;

    let connector_id = connection.with_station(|s| match request.evse_id {
        Some(id) => s.connector(id).filter(|c| c.is_free()).map(|c| c.id),
        None => s.free_connector(),
    });
    let Some(connector_id) = connector_id else {
        info!("RequestStartTransaction rejected: no free EVSE");
        return Reply::new(RequestStartTransactionResponse {
            status: GenericStatus::Rejected,
            transaction_id: None,
            status_info: None,
        });
    };

    connection.update_connector(connector_id, ConnectorStatus::Preparing);
    info!("RequestStartTransaction accepted on EVSE {}", connector_id);

    let id_tag = request.id_token.id_token;
    let remote_start_id = request.remote_start_id;
    let authorize_first = authorize_remote_starts(connection);
    Ok(Reply::new(RequestStartTransactionResponse {
        status: GenericStatus::Accepted,
        transaction_id: None,
        status_info: None,
    })?
    .then(move |connection| {
        let started = if authorize_first {
            let pending = PendingStart {
                id_tag,
                remote_start_id: Some(remote_start_id),
            };
            hold_for_authorization(connection, connector_id, pending)
        } else {
            start_transaction(connection, connector_id, &id_tag, Some(remote_start_id))
        };
        if let Err(e) = started {
            warn!("Transaction not started: {}", e);
            report_status(connection, connector_id, ConnectorStatus::Available);
        }
    }))
}

fn request_stop_transaction(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: RequestStopTransactionRequest = parse(connection, call)?;
    let transaction_id = request.transaction_id;

    if connection
        .with_station(|s| s.connector_for_transaction(&transaction_id))
        .is_none()
    {
        info!("RequestStopTransaction rejected: unknown transaction {}", transaction_id);
        return Reply::new(RequestStopTransactionResponse {
            status: GenericStatus::Rejected,
            status_info: None,
        });
    }

    Ok(Reply::new(RequestStopTransactionResponse {
        status: GenericStatus::Accepted,
        status_info: None,
    })?
    .then(move |connection| {
        if let Err(e) = stop_transaction(connection, &transaction_id, Some(StoppedReason::Remote)) {
            warn!("TransactionEvent(Ended) not sent: {}", e);
        }
    }))
}

fn change_availability(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: ChangeAvailabilityRequest = parse(connection, call)?;
    let evse_id = request.evse.as_ref().map(|e| e.id).filter(|id| *id != 0);

    let targets: Vec<(u32, bool)> = connection.with_station(|s| {
        s.connectors()
            .filter(|c| evse_id.map_or(true, |id| id == c.id))
            .map(|c| (c.id, c.transaction_id.is_some()))
            .collect()
    });
    if targets.is_empty() {
        return Reply::new(ChangeAvailabilityResponse {
            status: ChangeAvailabilityStatus::Rejected,
        });
    }

    let status = if targets.iter().any(|(_, busy)| *busy) {
        ChangeAvailabilityStatus::Scheduled
    } else {
        ChangeAvailabilityStatus::Accepted
    };
    let new_status = match request.operational_status {
        OperationalStatus::Inoperative => ConnectorStatus::Unavailable,
        OperationalStatus::Operative => ConnectorStatus::Available,
    };

    Ok(Reply::new(ChangeAvailabilityResponse { status })?
        .then(move |connection| apply_availability(connection, &targets, new_status)))
}

fn get_variables(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: GetVariablesRequest = parse(connection, call)?;

    let results = connection.with_station(|s| {
        request
            .get_variable_data
            .into_iter()
            .map(|data| {
                let entry = s.config_get(&data.variable.name);
                GetVariableResult {
                    attribute_status: if entry.is_some() {
                        GetVariableStatus::Accepted
                    } else {
                        GetVariableStatus::UnknownVariable
                    },
                    attribute_value: entry.map(|e| e.value.clone()),
                    component: data.component,
                    variable: data.variable,
                    attribute_type: data.attribute_type,
                }
            })
            .collect()
    });

    Reply::new(GetVariablesResponse {
        get_variable_result: results,
    })
}

fn set_variables(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: SetVariablesRequest = parse(connection, call)?;

    let results = request
        .set_variable_data
        .into_iter()
        .map(|data| {
            let status = match apply_setting(connection, &data.variable.name, &data.attribute_value) {
                ConfigChange::Accepted => SetVariableStatus::Accepted,
                ConfigChange::Rejected => SetVariableStatus::Rejected,
                ConfigChange::Unknown => SetVariableStatus::UnknownVariable,
            };
            SetVariableResult {
                attribute_status: status,
                component: data.component,
                variable: data.variable,
                attribute_type: data.attribute_type,
            }
        })
        .collect();

    Reply::new(SetVariablesResponse {
        set_variable_result: results,
    })
}

fn trigger_message(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: TriggerMessageRequest = parse(connection, call)?;
    let evse_id = request.evse.as_ref().map(|e| e.id);

    let supported = matches!(
        request.requested_message,
        MessageTrigger::BootNotification
            | MessageTrigger::Heartbeat
            | MessageTrigger::MeterValues
            | MessageTrigger::StatusNotification
            | MessageTrigger::TransactionEvent
    );
    if !supported {
        return Reply::new(TriggerMessageResponse {
            status: TriggerMessageStatus::NotImplemented,
        });
    }
    if let Some(id) = evse_id {
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
        let wanted = |id: u32| evse_id.map_or(true, |wanted| wanted == id);
        let sent = match requested {
            MessageTrigger::BootNotification => connection.boot_notification().map(|_| ()),
            MessageTrigger::Heartbeat => connection.heartbeat().map(|_| ()),
            MessageTrigger::StatusNotification => {
                let targets: Vec<(u32, ConnectorStatus)> = connection.with_station(|s| {
                    s.connectors()
                        .filter(|c| wanted(c.id))
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
                transactions
                    .into_iter()
                    .filter(|(connector_id, _)| wanted(*connector_id))
                    .try_for_each(|(_, transaction_id)| {
                        let simulator = connection.simulator();
                        let sent = if requested == MessageTrigger::MeterValues {
                            simulator.snapshot(&transaction_id).map(|report| {
                                connection.send_payload(
                                    "MeterValues",
                                    &MeterValuesRequest {
                                        evse_id: report.connector_id,
                                        meter_value: vec![report_reading(&report, ReadingContext::Trigger)],
                                    },
                                )
                            })
                        } else {
                            // Takes the next seqNo of the transaction
                            simulator.sample_now(&transaction_id, |report| {
                                connection.send_payload(
                                    "TransactionEvent",
                                    &updated_event(report, TriggerReason::Trigger, ReadingContext::Trigger),
                                )
                            })
                        };
                        sent.transpose().map(|_| ())
                    })
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
        status: GenericStatus::Accepted,
    })
}

fn unlock_connector(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: UnlockConnectorRequest = parse(connection, call)?;

    let occupied = connection.with_station(|s| {
        s.connector(request.evse_id)
            .filter(|_| request.connector_id == 1)
            .map(|c| c.transaction_id.is_some())
    });
    let status = match occupied {
        None => UnlockStatus::UnknownConnector,
        Some(true) => UnlockStatus::OngoingAuthorizedTransaction,
        Some(false) => UnlockStatus::Unlocked,
    };
    Reply::new(UnlockConnectorResponse { status })
}

fn set_charging_profile(connection: &Connection, call: &Call) -> Result<Reply, CallFault> {
    let request: SetChargingProfileRequest = parse(connection, call)?;

    let known = request.evse_id == 0 || known_connector(connection, request.evse_id).is_ok();
    let status = if known {
        let profile_id = request.charging_profile.get("id").cloned().unwrap_or_default();
        info!("Charging profile {} installed on EVSE {}", profile_id, request.evse_id);
        GenericStatus::Accepted
    } else {
        GenericStatus::Rejected
    };
    Reply::new(SetChargingProfileResponse {
        status,
        status_info: None,
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
    let token = original.payload["idToken"]["idToken"].as_str().unwrap_or_default();
    let status = match result.parse_payload::<AuthorizeResponse>() {
        Ok(response) => response.id_token_info.status,
        Err(e) => {
            warn!("Unreadable Authorize result: {}", e);
            AuthorizationStatus::Invalid
        }
    };
    info!("Authorize {}: {:?}", token, status);

    let Some((connector_id, pending)) = release_held_start(connection, token) else {
        return;
    };
    if status != AuthorizationStatus::Accepted {
        return report_status(connection, connector_id, ConnectorStatus::Available);
    }
    if let Err(e) = start_transaction(connection, connector_id, token, pending.remote_start_id) {
        warn!("Transaction not started: {}", e);
        report_status(connection, connector_id, ConnectorStatus::Available);
    }
}

fn on_transaction_event(connection: &Connection, original: &Call, _result: &CallResult) {
    let ended = original
        .parse_payload::<TransactionEventRequest>()
        .is_ok_and(|event| event.event_type == TransactionEventType::Ended);
    if ended {
        release_finished(connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::format_energy;

    fn report(seq_no: u64, kwh: f64) -> TelemetryReport {
        TelemetryReport {
            transaction_id: "b7a0c5d2".into(),
            connector_id: 2,
            energy_kwh: kwh,
            energy_text: format_energy(kwh),
            seq_no,
            timestamp: "2026-01-20T12:02:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_telemetry_is_updated_transaction_event() {
        let (action, payload) = telemetry(&report(2, 0.73333)).unwrap();

        assert_eq!(action, "TransactionEvent");
        assert_eq!(payload["eventType"], "Updated");
        assert_eq!(payload["triggerReason"], "MeterValuePeriodic");
        assert_eq!(payload["seqNo"], 2);
        assert_eq!(payload["transactionInfo"]["transactionId"], "b7a0c5d2");
        assert_eq!(payload["evse"]["id"], 2);

        let sample = &payload["meterValue"][0]["sampledValue"][0];
        assert_eq!(sample["value"], 0.733);
        assert_eq!(sample["context"], "Sample.Periodic");
        assert_eq!(sample["unitOfMeasure"]["unit"], "kWh");
    }

    #[test]
    fn test_readings_are_numbers() {
        let (_, payload) = telemetry(&report(60, 22.0)).unwrap();

        let value = &payload["meterValue"][0]["sampledValue"][0]["value"];
        assert!(value.is_f64());
        assert_eq!(value.to_string(), "22.0");
    }

    #[test]
    fn test_occupied_covers_transaction_states() {
        assert_eq!(evse_status(ConnectorStatus::Preparing), EvseStatus::Occupied);
        assert_eq!(evse_status(ConnectorStatus::Charging), EvseStatus::Occupied);
        assert_eq!(evse_status(ConnectorStatus::Finishing), EvseStatus::Occupied);
        assert_eq!(evse_status(ConnectorStatus::Available), EvseStatus::Available);
    }
}
