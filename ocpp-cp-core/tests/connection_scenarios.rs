//! End-to-end scenarios over the in-memory transport
//!
//! The test plays the CSMS through a `ChannelPeer`. Time is paused so
//! telemetry periods and heartbeats elapse instantly.

use std::sync::Arc;
use std::time::Duration;

use ocpp_cp_core::{
    AdminEvent, BroadcastMirror, ChannelPeer, ChannelTransport, ChargePointConfig, Connection,
    ConnectionError, ConnectionState, ConnectorStatus, ProtocolVersion, TypedOracle,
};
use serde_json::{json, Value};

const BOOT_TIME: &str = "2026-01-20T12:00:00Z";

fn config(version: ProtocolVersion) -> ChargePointConfig {
    ChargePointConfig::new("ws://csms.test/ocpp", "CP001", version)
}

async fn open(version: ProtocolVersion) -> (Connection, ChannelPeer) {
    let (transport, peer) = ChannelTransport::pair();
    let connection = Connection::new(config(version));
    connection.connect(&transport).await.unwrap();
    (connection, peer)
}

async fn next_json(peer: &mut ChannelPeer) -> Value {
    let text = peer.next_frame().await.expect("link closed");
    serde_json::from_str(&text).unwrap()
}

/// Let the reader task drain everything already delivered
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Accept the BootNotification and consume the StatusNotification that follows
async fn boot(peer: &mut ChannelPeer, interval: u64) {
    let boot = next_json(peer).await;
    assert_eq!(boot[0], 2);
    assert_eq!(boot[2], "BootNotification");

    peer.send_frame(
        json!([3, boot[1], {"status": "Accepted", "currentTime": BOOT_TIME, "interval": interval}])
            .to_string(),
    );

    let status = next_json(peer).await;
    assert_eq!(status[2], "StatusNotification");
}

async fn open_registered(version: ProtocolVersion) -> (Connection, ChannelPeer) {
    let (connection, mut peer) = open(version).await;
    boot(&mut peer, 3600).await;
    (connection, peer)
}

// ============================================================================
// Correlation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_call_is_tracked_before_it_is_observed() {
    let (connection, mut peer) = open(ProtocolVersion::Ocpp16).await;

    let boot = next_json(&mut peer).await;
    let id = boot[1].as_str().unwrap();
    assert_eq!(connection.outbox().get(id).unwrap().action, "BootNotification");
}

#[tokio::test(start_paused = true)]
async fn test_result_settles_pending_call() {
    let (connection, _peer) = open_registered(ProtocolVersion::Ocpp16).await;
    settle().await;

    // Only the StatusNotification is still pending
    assert_eq!(connection.outbox().len(), 1);
    assert!(connection.station().registered);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_result_is_dropped() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;
    settle().await;
    let pending = connection.outbox().len();

    peer.send_frame(r#"[3,"never-issued",{}]"#);
    settle().await;

    assert_eq!(connection.state(), ConnectionState::Open);
    assert_eq!(connection.outbox().len(), pending);
    assert!(peer.try_next_frame().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_result_is_dropped() {
    let (connection, mut peer) = open(ProtocolVersion::Ocpp16).await;
    let boot = next_json(&mut peer).await;
    let reply = json!([3, boot[1], {"status": "Pending", "currentTime": BOOT_TIME, "interval": 30}]).to_string();

    peer.send_frame(reply.clone());
    peer.send_frame(reply);
    settle().await;

    assert_eq!(connection.state(), ConnectionState::Open);
    assert!(connection.outbox().is_empty());
    assert!(!connection.station().registered);
}

#[tokio::test(start_paused = true)]
async fn test_call_error_settles_pending_call() {
    let (connection, mut peer) = open(ProtocolVersion::Ocpp16).await;
    let boot = next_json(&mut peer).await;

    peer.send_frame(json!([4, boot[1], "InternalError", "try later", {}]).to_string());
    peer.send_frame(r#"[4,"never-issued","GenericError","",{}]"#);
    settle().await;

    assert!(connection.outbox().is_empty());
    assert_eq!(connection.state(), ConnectionState::Open);
    assert!(peer.try_next_frame().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_is_dropped() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp201).await;

    peer.send_frame("{not json");
    peer.send_frame(r#"[9,"x"]"#);
    settle().await;

    assert_eq!(connection.state(), ConnectionState::Open);
    assert!(peer.try_next_frame().is_none());
}

// ============================================================================
// Inbound calls
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_is_not_implemented() {
    for version in [ProtocolVersion::Ocpp16, ProtocolVersion::Ocpp201] {
        let (connection, mut peer) = open_registered(version).await;

        let payload = match version {
            ProtocolVersion::Ocpp16 => json!({"type": "Hard"}),
            ProtocolVersion::Ocpp201 => json!({"type": "Immediate"}),
        };
        peer.send_frame(json!([2, "reset-1", "Reset", payload]).to_string());

        let reply = next_json(&mut peer).await;
        assert_eq!(reply[0], 4);
        assert_eq!(reply[1], "reset-1");
        assert_eq!(reply[2], "NotImplemented");
        assert_eq!(connection.state(), ConnectionState::Open);
    }
}

#[tokio::test(start_paused = true)]
async fn test_invalid_payload_gets_version_specific_format_error() {
    let (_c16, mut peer16) = open_registered(ProtocolVersion::Ocpp16).await;
    peer16.send_frame(r#"[2,"bad-1","RemoteStartTransaction",{"connectorId":1}]"#);
    let reply = next_json(&mut peer16).await;
    assert_eq!(reply[1], "bad-1");
    assert_eq!(reply[2], "FormationViolation");

    let (_c201, mut peer201) = open_registered(ProtocolVersion::Ocpp201).await;
    peer201.send_frame(r#"[2,"bad-2","RequestStartTransaction",{"remoteStartId":1}]"#);
    let reply = next_json(&mut peer201).await;
    assert_eq!(reply[1], "bad-2");
    assert_eq!(reply[2], "FormatViolation");
}

#[tokio::test(start_paused = true)]
async fn test_configuration_round_trip() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;

    peer.send_frame(r#"[2,"c1","ChangeConfiguration",{"key":"MeterValueSampleInterval","value":"30"}]"#);
    let reply = next_json(&mut peer).await;
    assert_eq!(reply, json!([3, "c1", {"status": "Accepted"}]));
    assert_eq!(connection.simulator().config().period, Duration::from_secs(30));

    peer.send_frame(r#"[2,"c2","ChangeConfiguration",{"key":"NumberOfConnectors","value":"8"}]"#);
    let reply = next_json(&mut peer).await;
    assert_eq!(reply[2]["status"], "Rejected");

    peer.send_frame(r#"[2,"c3","GetConfiguration",{"key":["MeterValueSampleInterval","Bogus"]}]"#);
    let reply = next_json(&mut peer).await;
    assert_eq!(reply[2]["configurationKey"][0]["value"], "30");
    assert_eq!(reply[2]["unknownKey"], json!(["Bogus"]));
}

#[tokio::test(start_paused = true)]
async fn test_get_and_set_variables() {
    let (_connection, mut peer) = open_registered(ProtocolVersion::Ocpp201).await;

    peer.send_frame(
        json!([2, "s1", "SetVariables", {"setVariableData": [
            {"attributeValue": "45", "component": {"name": "OCPPCommCtrlr"}, "variable": {"name": "HeartbeatInterval"}},
            {"attributeValue": "1", "component": {"name": "X"}, "variable": {"name": "Unknown"}}
        ]}])
        .to_string(),
    );
    let reply = next_json(&mut peer).await;
    let results = &reply[2]["setVariableResult"];
    assert_eq!(results[0]["attributeStatus"], "Accepted");
    assert_eq!(results[1]["attributeStatus"], "UnknownVariable");

    peer.send_frame(
        json!([2, "g1", "GetVariables", {"getVariableData": [
            {"component": {"name": "OCPPCommCtrlr"}, "variable": {"name": "HeartbeatInterval"}}
        ]}])
        .to_string(),
    );
    let reply = next_json(&mut peer).await;
    assert_eq!(reply[2]["getVariableResult"][0]["attributeValue"], "45");
}

// ============================================================================
// Outbound calls
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_outbound_schema_violation_sends_nothing() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;
    settle().await;
    let pending = connection.outbox().len();

    let err = connection
        .send("StartTransaction", json!({"connectorId": 1}))
        .unwrap_err();

    assert!(matches!(err, ConnectionError::Schema(_)));
    assert_eq!(connection.outbox().len(), pending);
    assert!(peer.try_next_frame().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_injected_frame_gets_fresh_id() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;

    let id = connection
        .inject_frame(r#"[2,"admin-1","Authorize",{"idTag":"ADMIN"}]"#)
        .unwrap();
    assert_ne!(id, "admin-1");

    let frame = next_json(&mut peer).await;
    assert_eq!(frame[1], id.as_str());
    assert_eq!(frame[2], "Authorize");
    assert_eq!(frame[3]["idTag"], "ADMIN");
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_uses_assigned_interval() {
    let (_connection, mut peer) = open(ProtocolVersion::Ocpp201).await;
    boot(&mut peer, 10).await;

    tokio::time::sleep(Duration::from_secs(10) + Duration::from_millis(1)).await;
    let heartbeat = next_json(&mut peer).await;
    assert_eq!(heartbeat[2], "Heartbeat");
    assert_eq!(heartbeat[3], json!({}));
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_ocpp16_remote_transaction() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;

    peer.send_frame(r#"[2,"rs-1","RemoteStartTransaction",{"idTag":"TAG-1","connectorId":1}]"#);
    assert_eq!(next_json(&mut peer).await, json!([3, "rs-1", {"status": "Accepted"}]));

    let preparing = next_json(&mut peer).await;
    assert_eq!(preparing[2], "StatusNotification");
    assert_eq!(preparing[3]["status"], "Preparing");

    let start = next_json(&mut peer).await;
    assert_eq!(start[2], "StartTransaction");
    assert_eq!(start[3]["idTag"], "TAG-1");
    peer.send_frame(
        json!([3, start[1], {"idTagInfo": {"status": "Accepted"}, "transactionId": 42}]).to_string(),
    );

    let charging = next_json(&mut peer).await;
    assert_eq!(charging[3]["status"], "Charging");
    assert!(connection.simulator().is_active("42"));

    tokio::time::sleep(Duration::from_secs(120) + Duration::from_millis(1)).await;
    let first = next_json(&mut peer).await;
    let second = next_json(&mut peer).await;
    for (frame, value) in [(&first, "0.367"), (&second, "0.733")] {
        assert_eq!(frame[2], "MeterValues");
        assert_eq!(frame[3]["transactionId"], 42);
        assert_eq!(frame[3]["meterValue"][0]["sampledValue"][0]["value"], value);
    }

    peer.send_frame(r#"[2,"rt-1","RemoteStopTransaction",{"transactionId":42}]"#);
    assert_eq!(next_json(&mut peer).await, json!([3, "rt-1", {"status": "Accepted"}]));
    assert!(!connection.simulator().is_active("42"));

    let finishing = next_json(&mut peer).await;
    assert_eq!(finishing[3]["status"], "Finishing");
    let stop = next_json(&mut peer).await;
    assert_eq!(stop[2], "StopTransaction");
    assert_eq!(stop[3]["transactionId"], 42);
    assert_eq!(stop[3]["meterStop"], 733);
    assert_eq!(stop[3]["reason"], "Remote");

    peer.send_frame(json!([3, stop[1], {}]).to_string());
    let available = next_json(&mut peer).await;
    assert_eq!(available[3]["status"], "Available");

    // Nothing more after the stop
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(peer.try_next_frame().is_none());
    assert_eq!(
        connection.station().connector(1).unwrap().status,
        ConnectorStatus::Available
    );
}

#[tokio::test(start_paused = true)]
async fn test_ocpp16_rejected_start_frees_connector() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;

    connection.start_transaction(Some(1), "BLOCKED").unwrap();
    let preparing = next_json(&mut peer).await;
    assert_eq!(preparing[3]["status"], "Preparing");
    let start = next_json(&mut peer).await;

    peer.send_frame(
        json!([3, start[1], {"idTagInfo": {"status": "Blocked"}, "transactionId": 0}]).to_string(),
    );
    let available = next_json(&mut peer).await;
    assert_eq!(available[3]["status"], "Available");
    assert_eq!(connection.simulator().active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ocpp201_remote_transaction() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp201).await;

    peer.send_frame(
        r#"[2,"rq-1","RequestStartTransaction",{"idToken":{"idToken":"TAG-2","type":"Central"},"remoteStartId":7,"evseId":1}]"#,
    );
    assert_eq!(next_json(&mut peer).await[2]["status"], "Accepted");

    let started = next_json(&mut peer).await;
    assert_eq!(started[2], "TransactionEvent");
    assert_eq!(started[3]["eventType"], "Started");
    assert_eq!(started[3]["seqNo"], 0);
    assert_eq!(started[3]["transactionInfo"]["remoteStartId"], 7);
    let transaction_id = started[3]["transactionInfo"]["transactionId"]
        .as_str()
        .unwrap()
        .to_string();

    let occupied = next_json(&mut peer).await;
    assert_eq!(occupied[2], "StatusNotification");
    assert_eq!(occupied[3]["connectorStatus"], "Occupied");

    tokio::time::sleep(Duration::from_secs(60) + Duration::from_millis(1)).await;
    let updated = next_json(&mut peer).await;
    assert_eq!(updated[3]["eventType"], "Updated");
    assert_eq!(updated[3]["triggerReason"], "MeterValuePeriodic");
    assert_eq!(updated[3]["seqNo"], 1);
    assert_eq!(updated[3]["meterValue"][0]["sampledValue"][0]["value"], 0.367);

    peer.send_frame(
        json!([2, "rq-2", "RequestStopTransaction", {"transactionId": transaction_id}]).to_string(),
    );
    assert_eq!(next_json(&mut peer).await[2]["status"], "Accepted");

    let ended = next_json(&mut peer).await;
    assert_eq!(ended[3]["eventType"], "Ended");
    assert_eq!(ended[3]["seqNo"], 2);
    assert_eq!(ended[3]["transactionInfo"]["stoppedReason"], "Remote");
    assert!(!connection.simulator().is_active(&transaction_id));

    peer.send_frame(json!([3, ended[1], {}]).to_string());
    let available = next_json(&mut peer).await;
    assert_eq!(available[3]["connectorStatus"], "Available");
}

#[tokio::test(start_paused = true)]
async fn test_remote_start_rejected_without_free_connector() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;
    connection.start_transaction(None, "LOCAL").unwrap();
    peer.drain_frames();

    peer.send_frame(r#"[2,"rs-2","RemoteStartTransaction",{"idTag":"TAG-3"}]"#);
    assert_eq!(next_json(&mut peer).await, json!([3, "rs-2", {"status": "Rejected"}]));
}

// ============================================================================
// Termination
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_remote_close_terminates() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;
    connection.start_transaction(Some(1), "TAG").unwrap();
    peer.drain_frames();

    peer.close(1001, "going away");
    let err = connection.closed().await.unwrap_err();

    match err {
        ConnectionError::TransportTerminated { code, reason } => {
            assert_eq!(code, 1001);
            assert_eq!(reason, "going away");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert!(connection.outbox().is_empty());
    assert!(connection.send("Heartbeat", json!({})).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_local_close_cancels_sessions() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp201).await;
    connection.start_transaction(Some(1), "TAG").unwrap();
    assert_eq!(connection.simulator().active_count(), 1);
    peer.drain_frames();

    connection.close();
    assert!(connection.closed().await.is_ok());
    assert_eq!(connection.simulator().active_count(), 0);
    assert_eq!(connection.state(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(peer.next_frame().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_close() {
    let (connection, _peer) = open(ProtocolVersion::Ocpp16).await;
    connection.close();

    let (transport, mut peer) = ChannelTransport::pair();
    connection.connect(&transport).await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Open);
    assert_eq!(next_json(&mut peer).await[2], "BootNotification");
}

// ============================================================================
// Admin mirror
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_mirror_sees_traffic() {
    let mirror = BroadcastMirror::new(64);
    let mut events = mirror.subscribe();
    let (transport, mut peer) = ChannelTransport::pair();
    let connection = Connection::with_parts(
        config(ProtocolVersion::Ocpp16),
        Arc::new(TypedOracle),
        Arc::new(mirror),
    );

    connection.connect(&transport).await.unwrap();
    let boot = next_json(&mut peer).await;
    peer.send_frame(
        json!([3, boot[1], {"status": "Accepted", "currentTime": BOOT_TIME, "interval": 3600}]).to_string(),
    );
    settle().await;

    let mut sent = Vec::new();
    let mut received = 0;
    let mut results = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            AdminEvent::OcppMessageSent { action, .. } => sent.push(action),
            AdminEvent::OcppMessageReceived { .. } => received += 1,
            AdminEvent::OcppCallResult { action, .. } => results.push(action),
            _ => {}
        }
    }

    assert_eq!(sent[0].as_deref(), Some("BootNotification"));
    assert!(sent.contains(&Some("StatusNotification".to_string())));
    assert_eq!(received, 1);
    assert_eq!(results, vec!["BootNotification".to_string()]);
}

// ============================================================================
// Triggered messages and scheduled changes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_triggered_transaction_events_keep_seq_no_increasing() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp201).await;
    connection.start_transaction(Some(1), "TAG").unwrap();

    let started = next_json(&mut peer).await;
    let transaction_id = started[3]["transactionInfo"]["transactionId"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(next_json(&mut peer).await[3]["connectorStatus"], "Occupied");
    let mut seq_nos = vec![started[3]["seqNo"].as_u64().unwrap()];

    peer.send_frame(r#"[2,"t1","TriggerMessage",{"requestedMessage":"TransactionEvent"}]"#);
    assert_eq!(next_json(&mut peer).await[2]["status"], "Accepted");
    let triggered = next_json(&mut peer).await;
    assert_eq!(triggered[3]["triggerReason"], "Trigger");
    seq_nos.push(triggered[3]["seqNo"].as_u64().unwrap());

    tokio::time::sleep(Duration::from_secs(60) + Duration::from_millis(1)).await;
    let periodic = next_json(&mut peer).await;
    assert_eq!(periodic[3]["triggerReason"], "MeterValuePeriodic");
    seq_nos.push(periodic[3]["seqNo"].as_u64().unwrap());

    peer.send_frame(r#"[2,"t2","TriggerMessage",{"requestedMessage":"TransactionEvent","evse":{"id":1}}]"#);
    assert_eq!(next_json(&mut peer).await[2]["status"], "Accepted");
    seq_nos.push(next_json(&mut peer).await[3]["seqNo"].as_u64().unwrap());

    connection.stop_transaction(&transaction_id).unwrap();
    let ended = next_json(&mut peer).await;
    assert_eq!(ended[3]["eventType"], "Ended");
    seq_nos.push(ended[3]["seqNo"].as_u64().unwrap());

    assert_eq!(seq_nos, vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_charging_profile_is_acknowledged() {
    let (_connection, mut peer) = open_registered(ProtocolVersion::Ocpp201).await;

    peer.send_frame(
        r#"[2,"p1","SetChargingProfile",{"evseId":1,"chargingProfile":{"id":5,"stackLevel":0}}]"#,
    );
    assert_eq!(next_json(&mut peer).await[2]["status"], "Accepted");

    peer.send_frame(r#"[2,"p2","SetChargingProfile",{"evseId":9,"chargingProfile":{"id":6}}]"#);
    assert_eq!(next_json(&mut peer).await[2]["status"], "Rejected");
}

#[tokio::test(start_paused = true)]
async fn test_remote_start_waits_for_authorization() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;

    peer.send_frame(r#"[2,"c1","ChangeConfiguration",{"key":"AuthorizeRemoteTxRequests","value":"true"}]"#);
    assert_eq!(next_json(&mut peer).await, json!([3, "c1", {"status": "Accepted"}]));

    peer.send_frame(r#"[2,"rs-1","RemoteStartTransaction",{"idTag":"TAG-A","connectorId":1}]"#);
    assert_eq!(next_json(&mut peer).await[2]["status"], "Accepted");

    let authorize = next_json(&mut peer).await;
    assert_eq!(authorize[2], "Authorize");
    assert_eq!(authorize[3]["idTag"], "TAG-A");
    assert!(connection.station().connector(1).unwrap().pending_start.is_some());

    peer.send_frame(json!([3, authorize[1], {"idTagInfo": {"status": "Accepted"}}]).to_string());
    let preparing = next_json(&mut peer).await;
    assert_eq!(preparing[3]["status"], "Preparing");
    let start = next_json(&mut peer).await;
    assert_eq!(start[2], "StartTransaction");
    assert_eq!(start[3]["idTag"], "TAG-A");
    assert!(connection.station().connector(1).unwrap().pending_start.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_remote_start_frees_connector() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;

    peer.send_frame(r#"[2,"c1","ChangeConfiguration",{"key":"AuthorizeRemoteTxRequests","value":"true"}]"#);
    next_json(&mut peer).await;
    peer.send_frame(r#"[2,"rs-1","RemoteStartTransaction",{"idTag":"TAG-B"}]"#);
    next_json(&mut peer).await;

    let authorize = next_json(&mut peer).await;
    peer.send_frame(json!([3, authorize[1], {"idTagInfo": {"status": "Blocked"}}]).to_string());

    let available = next_json(&mut peer).await;
    assert_eq!(available[2], "StatusNotification");
    assert_eq!(available[3]["status"], "Available");
    assert_eq!(connection.station().free_connector(), Some(1));
    settle().await;
    assert!(peer.try_next_frame().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_availability_change_waits_for_transaction_end() {
    let (connection, mut peer) = open_registered(ProtocolVersion::Ocpp16).await;

    connection.start_transaction(Some(1), "TAG").unwrap();
    next_json(&mut peer).await;
    let start = next_json(&mut peer).await;
    peer.send_frame(
        json!([3, start[1], {"idTagInfo": {"status": "Accepted"}, "transactionId": 9}]).to_string(),
    );
    assert_eq!(next_json(&mut peer).await[3]["status"], "Charging");

    peer.send_frame(r#"[2,"a1","ChangeAvailability",{"connectorId":1,"type":"Inoperative"}]"#);
    assert_eq!(next_json(&mut peer).await, json!([3, "a1", {"status": "Scheduled"}]));
    settle().await;
    assert!(peer.try_next_frame().is_none());
    assert_eq!(
        connection.station().connector(1).unwrap().status,
        ConnectorStatus::Charging
    );

    connection.stop_transaction("9").unwrap();
    assert_eq!(next_json(&mut peer).await[3]["status"], "Finishing");
    let stop = next_json(&mut peer).await;
    peer.send_frame(json!([3, stop[1], {}]).to_string());

    assert_eq!(next_json(&mut peer).await[3]["status"], "Unavailable");
    assert_eq!(
        connection.station().connector(1).unwrap().status,
        ConnectorStatus::Unavailable
    );
}
