use assert_matches::assert_matches;
use blelink::transport::{TransportPeer, channel};
use blelink::{
    Address, AdvertisementData, AdvertisementError, BleError, Engine, EngineConfig, EngineEvent,
    EventStream, ManufacturerData,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_stream::StreamExt;

fn address(raw: &str) -> Address {
    raw.parse().expect("address should parse")
}

fn ungated_engine() -> (Engine, TransportPeer) {
    let (transport, peer) = channel();
    let config = EngineConfig::builder()
        .require_initialization(false)
        .build();
    (Engine::spawn_with_config(transport, config), peer)
}

fn role_event(event: Value) -> Value {
    json!({"ble": {"peripheral_events": [event]}})
}

async fn next_event(events: &mut EventStream) -> EngineEvent {
    events.next().await.expect("event stream should stay open")
}

#[tokio::test]
async fn advertising_payload_is_encoded_on_the_wire() {
    let (engine, mut peer) = ungated_engine();
    let advertisement = AdvertisementData::builder()
        .flags(0x06)
        .service_uuids(vec!["180d".into()])
        .manufacturer_data(ManufacturerData {
            company_id: 0x0059,
            payload: vec![0x01, 0x02],
        })
        .build();
    let scan_response = AdvertisementData::builder().local_name("Puck").build();

    engine
        .start_advertising(&advertisement, Some(&scan_response))
        .await
        .expect("advertising should start");

    assert_eq!(
        Some(json!({"ble": {"advertisement_start": {
            "adv_data": [2, 1, 6, 3, 3, 13, 24, 5, 255, 89, 0, 1, 2],
            "scan_resp": [5, 9, 80, 117, 99, 107]
        }}})),
        peer.next_command().await
    );
}

#[tokio::test]
async fn oversized_advertisement_is_rejected_before_sending() {
    let (engine, mut peer) = ungated_engine();
    let advertisement = AdvertisementData::builder()
        .local_name("a name far too long to fit in one legacy advertisement")
        .build();

    assert_matches!(
        engine.start_advertising(&advertisement, None).await,
        Err(BleError::Advertisement(AdvertisementError::PayloadTooLong { .. }))
    );

    // The engine is still usable and nothing reached the wire.
    engine.stop_advertising().await.expect("engine should be running");
    assert!(peer.try_next_frame().is_none());
}

#[tokio::test]
async fn stop_advertising_is_sent_only_while_advertising() {
    let (engine, mut peer) = ungated_engine();
    let advertisement = AdvertisementData::builder().flags(0x06).build();

    engine.stop_advertising().await.expect("engine should be running");
    engine
        .start_advertising(&advertisement, None)
        .await
        .expect("advertising should start");
    engine.stop_advertising().await.expect("engine should be running");
    engine.stop_advertising().await.expect("engine should be running");

    assert_eq!(
        Some(json!({"ble": {"advertisement_start": {"adv_data": [2, 1, 6], "scan_resp": []}}})),
        peer.next_command().await
    );
    assert_eq!(
        Some(json!({"ble": {"advertisement_stop": {}}})),
        peer.next_command().await
    );
    assert!(peer.try_next_frame().is_none());
}

#[tokio::test]
async fn one_client_at_a_time_is_accepted() {
    let (engine, peer) = ungated_engine();
    let mut events = engine.events().await.expect("engine should be running");
    let first = address("e5f678800700");
    let second = address("aabbccddeeff");

    peer.send_event(&role_event(json!({"event": "accepted", "address": "e5f678800700"})))
        .expect("engine should be running");
    assert_eq!(EngineEvent::ClientConnected(first), next_event(&mut events).await);

    peer.send_event(&role_event(json!({"event": "accepted", "address": "aabbccddeeff"})))
        .expect("engine should be running");
    peer.send_event(&role_event(json!({"event": "mtu_changed", "mtu": 185})))
        .expect("engine should be running");
    // The rejected accept emits nothing, so the next event is the MTU change.
    assert_eq!(EngineEvent::MtuChanged(185), next_event(&mut events).await);

    assert_eq!(
        Some(first),
        engine.connected_client().await.expect("engine should be running")
    );
    assert_eq!(Some(185), engine.mtu().await.expect("engine should be running"));

    peer.send_event(&role_event(json!({"event": "disconnected", "address": "e5f678800700"})))
        .expect("engine should be running");
    assert_eq!(EngineEvent::ClientDisconnected(first), next_event(&mut events).await);

    peer.send_event(&role_event(json!({"event": "accepted", "address": "aabbccddeeff"})))
        .expect("engine should be running");
    assert_eq!(EngineEvent::ClientConnected(second), next_event(&mut events).await);
}

#[tokio::test]
async fn power_off_clears_the_connected_client() {
    let (engine, peer) = ungated_engine();
    let mut events = engine.events().await.expect("engine should be running");

    peer.send_event(&role_event(json!({"event": "accepted", "address": "e5f678800700"})))
        .expect("engine should be running");
    next_event(&mut events).await;
    peer.send_event(&json!({"ble": {"state_updates": [{"state": "powered_off"}]}}))
        .expect("engine should be running");
    assert_eq!(
        EngineEvent::AdapterStateChanged(blelink::AdapterState::PoweredOff),
        next_event(&mut events).await
    );

    assert_eq!(None, engine.connected_client().await.expect("engine should be running"));
}

#[tokio::test]
async fn new_subscriber_replaces_the_previous_one() {
    let (engine, peer) = ungated_engine();
    let mut stale = engine.events().await.expect("engine should be running");
    let mut fresh = engine.events().await.expect("engine should be running");

    peer.send_event(&role_event(json!({"event": "mtu_changed", "mtu": 23})))
        .expect("engine should be running");

    assert_eq!(EngineEvent::MtuChanged(23), next_event(&mut fresh).await);
    assert_eq!(None, stale.next().await);
}
