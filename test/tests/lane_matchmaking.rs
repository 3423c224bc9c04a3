/// LANE AND MATCHMAKING TESTS
///
/// Rooms running on their own tokio tasks, reached through the matchmaker
/// the way a real client would reach them.

use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use roomsync_client::Mirror;
use roomsync_server::{
    shared::Value, AuthClaims, ClientEvent, ClientSession, JoinError, JoinOptions, Matchmaker,
    RoomConfig, RoomState, ServerConfig, TokenTable,
};
use roomsync_test::{PizzaRoom, PIZZA_ROOM};

const WAIT: Duration = Duration::from_secs(5);

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn matchmaker(room: RoomConfig) -> Matchmaker {
    init();
    let identity = TokenTable::new().with(
        "ada-token",
        AuthClaims::Named {
            name: "Ada".to_string(),
        },
    );
    let mut matchmaker = Matchmaker::new(ServerConfig {
        room,
        identity: std::sync::Arc::new(identity),
    });
    matchmaker.define(PIZZA_ROOM, PizzaRoom::new);
    matchmaker
}

fn fast_rooms() -> RoomConfig {
    RoomConfig {
        tick_interval: Duration::from_millis(10),
        idle_dispose_after: Duration::from_millis(100),
        ..RoomConfig::default()
    }
}

// Applies patches until `done` holds for the mirror
async fn sync_until(session: &mut ClientSession, mirror: &mut Mirror, done: impl Fn(&Mirror) -> bool) {
    timeout(WAIT, async {
        while !done(&*mirror) {
            match session.recv().await {
                Some(ClientEvent::Patch(patch)) => {
                    mirror.apply(&patch).expect("mirror refused a patch");
                }
                Some(ClientEvent::Message { .. }) => {}
                None => panic!("room stopped sending"),
            }
        }
    })
    .await
    .expect("timed out waiting for state");
}

#[tokio::test]
async fn clients_share_one_room() {
    let matchmaker = matchmaker(fast_rooms());

    let mut first = matchmaker
        .join_or_create(PIZZA_ROOM, Some("ada-token"), JoinOptions::new())
        .await
        .unwrap();
    let mut second = matchmaker
        .join_or_create(PIZZA_ROOM, None, JoinOptions::new())
        .await
        .unwrap();
    assert_eq!(first.room_id(), second.room_id());
    assert_eq!(matchmaker.rooms(PIZZA_ROOM).len(), 1);

    let ada_name = format!("players.{}.name", first.session_id());
    let mut mirror = Mirror::new();
    sync_until(&mut second, &mut mirror, |mirror| mirror.read(&ada_name).is_some()).await;
    assert_eq!(mirror.read(&ada_name), Some(Value::Str("Ada".to_string())));

    first.send("increment", json!(null)).unwrap();
    sync_until(&mut second, &mut mirror, |mirror| {
        mirror.read("highestScore") == Some(Value::Int(1))
    })
    .await;

    let mut first_mirror = Mirror::new();
    sync_until(&mut first, &mut first_mirror, |mirror| {
        mirror.read("highestScore") == Some(Value::Int(1))
    })
    .await;
}

#[tokio::test]
async fn unknown_tokens_are_rejected() {
    let matchmaker = matchmaker(fast_rooms());

    let result = matchmaker
        .join_or_create(PIZZA_ROOM, Some("forged"), JoinOptions::new())
        .await;

    assert!(matches!(result, Err(JoinError::AuthRejected { .. })));
}

#[tokio::test]
async fn unknown_room_types_are_rejected() {
    let matchmaker = matchmaker(fast_rooms());

    let result = matchmaker
        .join_or_create("lobby", None, JoinOptions::new())
        .await;

    assert!(matches!(result, Err(JoinError::UnknownRoomType { .. })));
}

#[tokio::test]
async fn full_rooms_spill_into_new_rooms() {
    let matchmaker = matchmaker(RoomConfig {
        max_clients: 1,
        ..fast_rooms()
    });

    let first = matchmaker
        .join_or_create(PIZZA_ROOM, None, JoinOptions::new())
        .await
        .unwrap();
    first
        .room()
        .wait_for(|status| status.clients == 1)
        .await;
    let second = matchmaker
        .join_or_create(PIZZA_ROOM, None, JoinOptions::new())
        .await
        .unwrap();

    assert_ne!(first.room_id(), second.room_id());
    assert_eq!(matchmaker.rooms(PIZZA_ROOM).len(), 2);
}

#[tokio::test]
async fn dropped_session_leaves_and_room_disposes() {
    let matchmaker = matchmaker(fast_rooms());

    let session = matchmaker
        .join_or_create(PIZZA_ROOM, None, JoinOptions::new())
        .await
        .unwrap();
    let room = session.room().clone();
    drop(session);

    let status = timeout(WAIT, room.wait_for(|status| status.state == RoomState::Disposed))
        .await
        .expect("room never disposed");
    assert_eq!(status.clients, 0);
    assert!(matchmaker.rooms(PIZZA_ROOM).is_empty());
}

#[tokio::test]
async fn left_room_is_replaced_after_disposal() {
    let matchmaker = matchmaker(fast_rooms());

    let session = matchmaker
        .join_or_create(PIZZA_ROOM, None, JoinOptions::new())
        .await
        .unwrap();
    let room = session.room().clone();
    session.leave().unwrap();
    timeout(WAIT, room.wait_for(|status| status.state == RoomState::Disposed))
        .await
        .expect("room never disposed");

    let next = matchmaker
        .join_or_create(PIZZA_ROOM, None, JoinOptions::new())
        .await
        .unwrap();
    assert_ne!(next.room_id(), room.room_id());
}

#[tokio::test]
async fn resync_sends_full_patch() {
    let matchmaker = matchmaker(fast_rooms());

    let mut session = matchmaker
        .join_or_create(PIZZA_ROOM, None, JoinOptions::new())
        .await
        .unwrap();
    let mut mirror = Mirror::new();
    sync_until(&mut session, &mut mirror, |mirror| mirror.root().is_some()).await;

    session.request_resync().unwrap();
    let full = timeout(WAIT, async {
        loop {
            match session.recv().await {
                Some(ClientEvent::Patch(patch)) if patch.is_full() => return patch,
                Some(_) => {}
                None => panic!("room stopped sending"),
            }
        }
    })
    .await
    .expect("no resync patch");

    let mut fresh = Mirror::new();
    fresh.apply(&full).unwrap();
    assert_eq!(fresh.nodes(), mirror.nodes());
}
