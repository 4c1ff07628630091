use assert_matches::assert_matches;
use blelink::transport::{TransportPeer, channel};
use blelink::{
    Address, AddressType, ConnectionState, Engine, EngineError, EngineEvent, EventStream,
    Operation, PeripheralHandle, ScanOptions,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

const PUCK: &str = "e4b9efb29218";

fn puck() -> Address {
    PUCK.parse().expect("address should parse")
}

fn deliver(peer: &TransportPeer, event: Value) {
    peer.send_event(&event).expect("engine should be running");
}

fn status(address: &str, status: &str) -> Value {
    json!({"ble": {"status_updates": [{"address": address, "status": status}]}})
}

/// Waits until every frame delivered so far has been handled.
async fn settle(peer: &TransportPeer, events: &mut EventStream) {
    deliver(
        peer,
        json!({"ble": {"scan_results": [{"event_type": "inquiry_complete"}]}}),
    );
    while let Some(event) = events.next().await {
        if event == EngineEvent::ScanFinished {
            return;
        }
    }
    panic!("event stream closed before the engine settled");
}

async fn ready_engine() -> (Engine, TransportPeer) {
    let (transport, mut peer) = channel();
    let engine = Engine::spawn(transport);

    let init = tokio::spawn({
        let engine = engine.clone();
        async move { engine.initialize().await }
    });
    assert_eq!(
        Some(json!({"ble": {"initialize": {}}})),
        peer.next_command().await
    );
    deliver(&peer, json!({"ble": {"state_updates": [{"state": "powered_on"}]}}));
    init.await
        .expect("initialize task should not panic")
        .expect("initialize should succeed");

    (engine, peer)
}

async fn connected_puck(engine: &Engine, peer: &mut TransportPeer) -> PeripheralHandle {
    let connect = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .direct_connect_wait(puck(), AddressType::Random)
                .await
        }
    });
    assert_eq!(
        Some(json!({"ble": {"connect": {"address": PUCK, "address_type": "random"}}})),
        peer.next_command().await
    );
    deliver(peer, status(PUCK, "connected"));
    connect
        .await
        .expect("connect task should not panic")
        .expect("connect should succeed")
}

#[tokio::test]
async fn initialize_handshake_opens_the_command_gate() {
    let (engine, mut peer) = ready_engine().await;

    assert_eq!(
        Some(blelink::AdapterState::PoweredOn),
        engine.adapter_state().await.expect("engine should be running")
    );

    engine
        .start_scan(None, ScanOptions::default())
        .await
        .expect("scan should start");
    assert_eq!(
        Some(json!({"ble": {"scan": {"duration": 30, "duplicate": true}}})),
        peer.next_command().await
    );
}

#[tokio::test]
async fn concurrent_initialize_calls_share_one_handshake() {
    let (transport, mut peer) = channel();
    let engine = Engine::spawn(transport);

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.initialize().await }
    });
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.initialize().await }
    });
    assert_eq!(
        Some(json!({"ble": {"initialize": {}}})),
        peer.next_command().await
    );
    deliver(&peer, json!({"ble": {"state_updates": [{"state": "powered_on"}]}}));

    assert_eq!(Ok(()), first.await.expect("task should not panic"));
    assert_eq!(Ok(()), second.await.expect("task should not panic"));
    assert!(peer.try_next_frame().is_none());
}

#[tokio::test]
async fn unsupported_adapter_fails_initialize() {
    let (transport, mut peer) = channel();
    let engine = Engine::spawn(transport);

    let init = tokio::spawn({
        let engine = engine.clone();
        async move { engine.initialize().await }
    });
    peer.next_command().await;
    deliver(&peer, json!({"ble": {"state_updates": [{"state": "unsupported"}]}}));

    assert_matches!(
        init.await.expect("task should not panic"),
        Err(EngineError::OperationFailed {
            operation: Operation::Initialize,
            ..
        })
    );
    assert_eq!(
        Err(EngineError::NotInitialized),
        engine.stop_scan().await
    );
}

#[tokio::test]
async fn commands_fail_before_initialize() {
    let (transport, mut peer) = channel();
    let engine = Engine::spawn(transport);

    assert_matches!(
        engine.direct_connect(puck(), AddressType::Random).await,
        Err(EngineError::NotInitialized)
    );
    assert_eq!(Err(EngineError::NotInitialized), engine.stop_advertising().await);
    assert!(peer.try_next_frame().is_none());
}

#[tokio::test]
async fn repeated_scan_records_track_one_peripheral() {
    let (engine, mut peer) = ready_engine().await;
    let mut events = engine.events().await.expect("engine should be running");

    engine
        .start_scan(None, ScanOptions::default())
        .await
        .expect("scan should start");
    peer.next_command().await;

    let record = json!({
        "event_type": "inquiry_result",
        "address": "e5f678800700",
        "address_type": "public",
        "ble_event_type": "connectable_advertisement",
        "rssi": -64,
        "adv_data": [2, 1, 6, 5, 9, 80, 117, 99, 107],
        "scan_resp": []
    });
    deliver(
        &peer,
        json!({"ble": {"scan_results": [
            record,
            record,
            record,
            {"event_type": "inquiry_complete"}
        ]}}),
    );

    let mut discovered = 0;
    while let Some(event) = events.next().await {
        match event {
            EngineEvent::Discovered(snapshot) => {
                discovered += 1;
                assert_eq!(Some("Puck"), snapshot.local_name());
            }
            EngineEvent::ScanFinished => break,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(3, discovered);

    let peripherals = engine.peripherals().await.expect("engine should be running");
    assert_eq!(1, peripherals.len());
    let snapshot = &peripherals[0];
    assert_eq!(Some(AddressType::Public), snapshot.address_type());
    assert_eq!(Some(-64), snapshot.rssi());
    assert!(snapshot.is_connectable());
    assert_eq!(ConnectionState::Discovered, snapshot.state());
}

#[tokio::test]
async fn spaced_address_connects_with_random_type() {
    let (engine, mut peer) = ready_engine().await;
    let address: Address = "e4b9ef b29218".parse().expect("spaced address should parse");
    assert_eq!(puck(), address);

    let connect = tokio::spawn({
        let engine = engine.clone();
        async move { engine.direct_connect_wait(address, AddressType::Random).await }
    });
    assert_eq!(
        Some(json!({"ble": {"connect": {"address": "e4b9efb29218", "address_type": "random"}}})),
        peer.next_command().await
    );
    deliver(&peer, status(PUCK, "connected"));

    let handle = connect
        .await
        .expect("task should not panic")
        .expect("connect should succeed");
    assert_eq!(puck(), handle.address());
    assert_eq!(
        ConnectionState::Connected,
        handle.connection_state().await.expect("peripheral should be tracked")
    );
}

#[tokio::test]
async fn address_error_while_connecting_fails_the_connect() {
    let (engine, mut peer) = ready_engine().await;

    let connect = tokio::spawn({
        let engine = engine.clone();
        async move { engine.direct_connect_wait(puck(), AddressType::Random).await }
    });
    peer.next_command().await;
    deliver(
        &peer,
        json!({"ble": {"errors": [{"error_code": 133, "message": "gatt error", "address": PUCK}]}}),
    );

    assert_matches!(
        connect.await.expect("task should not panic"),
        Err(EngineError::OperationFailed {
            operation: Operation::Connect,
            ..
        })
    );
    let handle = engine.peripheral(puck()).await.expect("peripheral should be tracked");
    assert_eq!(
        ConnectionState::Disconnected,
        handle.connection_state().await.expect("engine should be running")
    );
}

#[tokio::test]
async fn connect_without_known_address_type_fails() {
    let (engine, peer) = ready_engine().await;
    let mut events = engine.events().await.expect("engine should be running");

    deliver(
        &peer,
        json!({"ble": {"scan_results": [{
            "event_type": "inquiry_result",
            "address": "e5f678800700",
            "rssi": -70,
            "adv_data": [2, 1, 6]
        }]}}),
    );
    assert_matches!(events.next().await, Some(EngineEvent::Discovered(_)));

    let address: Address = "e5f678800700".parse().expect("address should parse");
    let handle = engine
        .peripheral(address)
        .await
        .expect("scan should have created the peripheral");

    assert_eq!(
        Err(EngineError::InvalidAddressType { address }),
        handle.connect().await
    );
}

#[tokio::test]
async fn unknown_peripheral_lookup_fails() {
    let (engine, _peer) = ready_engine().await;

    assert_matches!(
        engine.peripheral(puck()).await,
        Err(EngineError::UnknownPeripheral { address }) if address == puck()
    );
}

#[tokio::test]
async fn failed_write_resolves_only_its_own_write() {
    let (engine, mut peer) = ready_engine().await;
    let handle = connected_puck(&engine, &mut peer).await;
    let service = handle.service("ff00");

    let first = tokio::spawn({
        let characteristic = service.characteristic("ff01");
        async move { characteristic.write(vec![0x01], false).await }
    });
    assert_eq!(
        Some(json!({"ble": {"write_characteristic": {
            "address": PUCK,
            "service_uuid": "ff00",
            "characteristic_uuid": "ff01",
            "data": [1],
            "needs_response": true
        }}})),
        peer.next_command().await
    );
    let second = tokio::spawn({
        let characteristic = service.characteristic("ff02");
        async move { characteristic.write(vec![0x02], true).await }
    });
    peer.next_command().await;

    deliver(
        &peer,
        json!({"ble": {"write_characteristic_results": [{
            "address": PUCK,
            "service_uuid": "ff00",
            "characteristic_uuid": "ff02",
            "result": "failed"
        }]}}),
    );
    assert_matches!(
        second.await.expect("task should not panic"),
        Err(EngineError::OperationFailed {
            operation: Operation::WriteCharacteristic,
            ..
        })
    );
    assert!(!first.is_finished());

    deliver(
        &peer,
        json!({"ble": {"write_characteristic_results": [{
            "address": PUCK,
            "service_uuid": "ff00",
            "characteristic_uuid": "ff01",
            "result": "success"
        }]}}),
    );
    assert_eq!(Ok(()), first.await.expect("task should not panic"));
}

#[tokio::test]
async fn second_read_while_one_is_pending_is_rejected() {
    let (engine, mut peer) = ready_engine().await;
    let handle = connected_puck(&engine, &mut peer).await;
    let characteristic = handle.service("ff00").characteristic("ff01");

    let first = tokio::spawn({
        let characteristic = characteristic.clone();
        async move { characteristic.read().await }
    });
    peer.next_command().await;

    assert_matches!(
        characteristic.read().await,
        Err(EngineError::OperationPending {
            operation: Operation::ReadCharacteristic,
            ..
        })
    );

    deliver(
        &peer,
        json!({"ble": {"read_characteristic_results": [{
            "address": PUCK,
            "service_uuid": "ff00",
            "characteristic_uuid": "ff01",
            "data": [5]
        }]}}),
    );
    assert_eq!(Ok(vec![5]), first.await.expect("task should not panic"));
}

#[tokio::test]
async fn unmatched_read_result_is_dropped() {
    let (engine, mut peer) = ready_engine().await;
    let handle = connected_puck(&engine, &mut peer).await;
    let mut events = engine.events().await.expect("engine should be running");
    let read_result = |data: Vec<u8>| {
        json!({"ble": {"read_characteristic_results": [{
            "address": PUCK,
            "service_uuid": "ff00",
            "characteristic_uuid": "ff01",
            "data": data
        }]}})
    };

    deliver(&peer, read_result(vec![9, 9]));
    settle(&peer, &mut events).await;

    let read = tokio::spawn({
        let characteristic = handle.service("ff00").characteristic("ff01");
        async move { characteristic.read().await }
    });
    assert_eq!(
        Some(json!({"ble": {"read_characteristic": {
            "address": PUCK,
            "service_uuid": "ff00",
            "characteristic_uuid": "ff01"
        }}})),
        peer.next_command().await
    );
    deliver(&peer, read_result(vec![1, 2]));

    assert_eq!(Ok(vec![1, 2]), read.await.expect("task should not panic"));
}

#[tokio::test]
async fn status_updates_apply_before_read_results_in_one_frame() {
    let (engine, mut peer) = ready_engine().await;
    let handle = connected_puck(&engine, &mut peer).await;

    let read = tokio::spawn({
        let characteristic = handle.service("ff00").characteristic("ff01");
        async move { characteristic.read().await }
    });
    peer.next_command().await;
    deliver(
        &peer,
        json!({"ble": {
            "read_characteristic_results": [{
                "address": PUCK,
                "service_uuid": "ff00",
                "characteristic_uuid": "ff01",
                "data": [1]
            }],
            "status_updates": [{"address": PUCK, "status": "disconnected"}]
        }}),
    );

    assert_eq!(
        Err(EngineError::LinkLost { address: puck() }),
        read.await.expect("task should not panic")
    );
}

#[tokio::test]
async fn malformed_record_does_not_strand_a_pending_read() {
    let (engine, mut peer) = ready_engine().await;
    let handle = connected_puck(&engine, &mut peer).await;

    let read = tokio::spawn({
        let characteristic = handle.service("ff00").characteristic("ff01");
        async move { characteristic.read().await }
    });
    peer.next_command().await;
    deliver(
        &peer,
        json!({"ble": {
            "status_updates": [{"status": "connecting"}],
            "read_characteristic_results": [{
                "address": PUCK,
                "service_uuid": "ff00",
                "characteristic_uuid": "ff01",
                "data": [104, 105]
            }]
        }}),
    );

    assert_eq!(Ok(vec![104, 105]), read.await.expect("task should not panic"));
    assert_eq!(
        ConnectionState::Connected,
        handle.connection_state().await.expect("engine should be running")
    );
}

#[tokio::test]
async fn unsolicited_disconnect_fails_pending_work_with_link_lost() {
    let (engine, mut peer) = ready_engine().await;
    let handle = connected_puck(&engine, &mut peer).await;
    let (reasons_tx, mut reasons) = mpsc::unbounded_channel();
    handle
        .on_disconnect(move |reason: Option<&str>| {
            let _ = reasons_tx.send(reason.map(str::to_owned));
        })
        .await
        .expect("peripheral should be tracked");

    let discovery = tokio::spawn({
        let handle = handle.clone();
        async move { handle.discover_services().await.map(|services| services.len()) }
    });
    assert_eq!(
        Some(json!({"ble": {"discover_services": {"address": PUCK}}})),
        peer.next_command().await
    );
    deliver(
        &peer,
        json!({"ble": {"status_updates": [{"address": PUCK, "status": "disconnected", "reason": "supervision timeout"}]}}),
    );

    assert_eq!(
        Err(EngineError::LinkLost { address: puck() }),
        discovery.await.expect("task should not panic")
    );
    assert_eq!(Some(Some("supervision timeout".to_string())), reasons.recv().await);
    assert_eq!(
        ConnectionState::Disconnected,
        handle.connection_state().await.expect("engine should be running")
    );
    assert_matches!(
        handle.service("ff00").characteristic("ff01").read().await,
        Err(EngineError::NotConnected { .. })
    );
}

#[tokio::test]
async fn scoped_lookup_caches_absent_services() {
    let (engine, mut peer) = ready_engine().await;
    let handle = connected_puck(&engine, &mut peer).await;

    let lookup = tokio::spawn({
        let handle = handle.clone();
        async move { handle.get_service("180f").await.map(|service| service.is_some()) }
    });
    assert_eq!(
        Some(json!({"ble": {"discover_services": {"address": PUCK, "service_uuid": "180f"}}})),
        peer.next_command().await
    );
    deliver(
        &peer,
        json!({"ble": {"service_discovery_finished": [{"address": PUCK, "service_uuid": "180f"}]}}),
    );
    assert_eq!(Ok(false), lookup.await.expect("task should not panic"));

    let again = handle
        .get_service("180F")
        .await
        .expect("cached lookup should succeed");
    assert!(again.is_none());
    assert!(peer.try_next_frame().is_none());
}

#[tokio::test]
async fn subscribed_notifications_reach_the_observer() {
    let (engine, mut peer) = ready_engine().await;
    let handle = connected_puck(&engine, &mut peer).await;
    let (notifications_tx, mut notifications) = mpsc::unbounded_channel();
    handle
        .on_notification(move |notification: &blelink::Notification| {
            let _ = notifications_tx.send(notification.data().to_vec());
        })
        .await
        .expect("peripheral should be tracked");

    let subscribe = tokio::spawn({
        let characteristic = handle.service("ff00").characteristic("ff01");
        async move { characteristic.subscribe().await }
    });
    assert_eq!(
        Some(json!({"ble": {"notify_characteristic": {
            "address": PUCK,
            "service_uuid": "ff00",
            "characteristic_uuid": "ff01",
            "enable": true
        }}})),
        peer.next_command().await
    );
    deliver(
        &peer,
        json!({"ble": {"notify_characteristic_results": [{
            "address": PUCK,
            "service_uuid": "ff00",
            "characteristic_uuid": "ff01",
            "result": "success"
        }]}}),
    );
    assert_eq!(Ok(()), subscribe.await.expect("task should not panic"));

    deliver(
        &peer,
        json!({"ble": {"notifications": [{
            "address": PUCK,
            "service_uuid": "ff00",
            "characteristic_uuid": "ff01",
            "data": [7, 255]
        }]}}),
    );
    assert_eq!(Some(vec![7, 255]), notifications.recv().await);
}

#[tokio::test]
async fn commands_reach_the_wire_in_call_order() {
    let (engine, mut peer) = ready_engine().await;
    let other: Address = "aabbccddeeff".parse().expect("address should parse");

    let (scan, connect, stop) = tokio::join!(
        engine.start_scan(None, ScanOptions::default()),
        engine.direct_connect(other, AddressType::Public),
        engine.stop_scan(),
    );
    scan.expect("scan should start");
    connect.expect("connect should be sent");
    stop.expect("scan should stop");

    assert_eq!(
        Some(json!({"ble": {"scan": {"duration": 30, "duplicate": true}}})),
        peer.next_command().await
    );
    assert_eq!(
        Some(json!({"ble": {"connect": {"address": "aabbccddeeff", "address_type": "public"}}})),
        peer.next_command().await
    );
    assert_eq!(
        Some(json!({"ble": {"scan_stop": {}}})),
        peer.next_command().await
    );
}

#[tokio::test]
async fn closed_transport_fails_in_flight_work_then_stops_the_engine() {
    let (engine, mut peer) = ready_engine().await;
    let handle = connected_puck(&engine, &mut peer).await;

    let read = tokio::spawn({
        let characteristic = handle.service("ff00").characteristic("ff01");
        async move { characteristic.read().await }
    });
    peer.next_command().await;
    drop(peer);

    assert_eq!(
        Err(EngineError::LinkLost { address: puck() }),
        read.await.expect("task should not panic")
    );
    assert_matches!(engine.peripherals().await, Err(EngineError::EngineStopped));
}

#[tokio::test]
async fn powered_off_drops_links() {
    let (engine, mut peer) = ready_engine().await;
    let handle = connected_puck(&engine, &mut peer).await;
    let mut events = engine.events().await.expect("engine should be running");

    deliver(&peer, json!({"ble": {"state_updates": [{"state": "powered_off"}]}}));
    assert_eq!(
        Some(EngineEvent::AdapterStateChanged(blelink::AdapterState::PoweredOff)),
        events.next().await
    );

    assert_eq!(
        ConnectionState::Disconnected,
        handle.connection_state().await.expect("engine should be running")
    );
    assert_eq!(Err(EngineError::NotInitialized), engine.stop_scan().await);
}
