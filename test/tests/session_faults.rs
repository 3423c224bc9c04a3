/// SESSION FAULT TESTS
///
/// Failures scoped to one session: slow transports, rejected tokens and
/// handlers that fail. None of them may stop the room.

use std::sync::Arc;

use serde_json::json;

use roomsync_server::{
    shared::Value, AuthClaims, FaultEvent, JoinError, LeaveEvent, RoomConfig, RoomError,
    ServerConfig, TokenTable,
};
use roomsync_test::{player_path, PizzaRoom, RecordingTransport, RoomHarness};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn slow_client_is_dropped_after_overrun() {
    init();
    let config = ServerConfig {
        room: RoomConfig {
            outbound_queue_depth: 2,
            ..RoomConfig::default()
        },
        ..ServerConfig::default()
    };
    let mut harness = RoomHarness::new(PizzaRoom::seeded(1), config);
    let slow = harness
        .try_join(None, RecordingTransport::bounded(1))
        .unwrap();
    let mut fast = harness.join();
    harness.flush(&mut [&mut fast]);
    let _ = harness.room.take_events();

    for _ in 0..4 {
        harness.send(&fast.id.clone(), "increment", json!(null));
        harness.step();
    }

    assert_eq!(harness.room.session_state(&slow.id), None);
    let mut events = harness.room.take_events();
    let faults: Vec<_> = events.read::<FaultEvent>().collect();
    assert!(faults
        .iter()
        .any(|fault| matches!(fault, RoomError::TransportOverrun { session, .. } if *session == slow.id)));
    let leaves: Vec<_> = events.read::<LeaveEvent>().collect();
    assert_eq!(leaves, vec![(slow.id.clone(), false)]);

    fast.sync().unwrap();
    assert_eq!(
        fast.mirror.read(&format!("players.{}.score", fast.id)),
        Some(Value::Int(4))
    );
}

#[test]
fn named_tokens_set_player_names() {
    init();
    let identity = TokenTable::new()
        .with(
            "ada-token",
            AuthClaims::Named {
                name: "Ada".to_string(),
            },
        )
        .with("anon-token", AuthClaims::Anonymous);
    let config = ServerConfig {
        identity: Arc::new(identity),
        ..ServerConfig::default()
    };
    let mut harness = RoomHarness::new(PizzaRoom::seeded(1), config);

    let ada = harness
        .try_join(Some("ada-token"), RecordingTransport::new())
        .unwrap();
    let anon = harness
        .try_join(Some("anon-token"), RecordingTransport::new())
        .unwrap();
    let guest = harness.try_join(None, RecordingTransport::new()).unwrap();

    let state = harness.room.state();
    for (client, name) in [(&ada, "Ada"), (&anon, "Anonymous"), (&guest, "Guest")] {
        assert_eq!(
            state.read(player_path(&client.id).then("name")).unwrap(),
            Value::Str(name.to_string())
        );
    }
}

#[test]
fn rejected_token_leaves_no_trace() {
    init();
    let config = ServerConfig {
        identity: Arc::new(TokenTable::new()),
        ..ServerConfig::default()
    };
    let mut harness = RoomHarness::new(PizzaRoom::seeded(1), config);
    let transport = RecordingTransport::new();

    let result = harness.try_join(Some("forged"), transport.clone());

    assert!(matches!(result, Err(JoinError::AuthRejected { .. })));
    assert!(harness.room.clients().is_empty());
    let players = harness.room.state().node_at("players").unwrap();
    assert_eq!(harness.room.state().len(players).unwrap(), 0);
    harness.step();
    assert_eq!(transport.attempts(), 0);
}

#[test]
fn bad_payloads_fault_without_stopping_the_room() {
    init();
    let mut harness = RoomHarness::new(PizzaRoom::seeded(1), ServerConfig::default());
    let mut a = harness.join();
    let _ = harness.room.take_events();

    harness.send(&a.id.clone(), "removeView", json!("not an id"));
    harness.send(&a.id.clone(), "nonexistent", json!(null));
    harness.send(&a.id.clone(), "increment", json!(null));
    harness.flush(&mut [&mut a]);

    let faults: Vec<_> = harness.room.take_events().read::<FaultEvent>().collect();
    assert_eq!(faults.len(), 1);
    assert!(matches!(&faults[0], RoomError::HandlerFault { handler, .. } if handler == "removeView"));
    assert_eq!(
        a.mirror.read(&format!("players.{}.score", a.id)),
        Some(Value::Int(1))
    );
}
