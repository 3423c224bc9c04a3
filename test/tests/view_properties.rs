/// VIEW PROPERTY TESTS
///
/// Removal ordering, idempotent view removal, shared grants between
/// sessions, and partial revocation of nested grants.

use serde_json::json;

use roomsync_server::{
    shared::{DeltaRecord, Key, NodeId, Patch, Value},
    FaultEvent, ServerConfig,
};
use roomsync_test::{child, PizzaRoom, RoomHarness, TestClient};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn remove_position(patch: &Patch, id: NodeId) -> Option<usize> {
    patch
        .records
        .iter()
        .position(|record| matches!(record, DeltaRecord::Remove { id: removed } if *removed == id))
}

fn remove_count(patches: &[Patch], id: NodeId) -> usize {
    patches
        .iter()
        .flat_map(|patch| patch.records_for(id))
        .filter(|record| record.is_remove())
        .count()
}

fn distributed(clients: usize) -> (RoomHarness<PizzaRoom>, Vec<TestClient>, Vec<NodeId>) {
    init();
    let mut harness = RoomHarness::new(PizzaRoom::seeded(3), ServerConfig::default());
    let mut joined: Vec<TestClient> = (0..clients).map(|_| harness.join()).collect();
    let sender = joined[0].id.clone();
    harness.send(&sender, "distributeViews", json!(null));
    harness.tick();
    for client in joined.iter_mut() {
        client.sync().unwrap();
    }

    let state = harness.room.state();
    let sequence = state.node_at("viewsHolder.perPlayerPizza").unwrap();
    let pizzas = state
        .values(sequence)
        .unwrap()
        .iter()
        .filter_map(Value::as_node)
        .collect();
    (harness, joined, pizzas)
}

#[test]
fn removals_list_children_before_ancestors() {
    let (mut harness, mut clients, pizzas) = distributed(1);
    let shared = pizzas[1];
    let ingredients = child(harness.room.state(), shared, "ingredients").unwrap();
    let ingredient = harness.room.state().get(ingredients, 0usize).unwrap().as_node().unwrap();

    let id = clients[0].id.clone();
    harness.send(&id, "removeView", json!(shared.to_u64()));
    harness.tick();
    clients[0].sync().unwrap();

    let patch = clients[0].last_patch().unwrap();
    let ingredient_at = remove_position(patch, ingredient).unwrap();
    let sequence_at = remove_position(patch, ingredients).unwrap();
    let pizza_at = remove_position(patch, shared).unwrap();
    assert!(ingredient_at < sequence_at);
    assert!(sequence_at < pizza_at);
    for node in [shared, ingredients, ingredient] {
        assert_eq!(remove_count(&clients[0].patches, node), 1);
    }
}

#[test]
fn removing_twice_matches_removing_once() {
    let (mut harness, mut clients, pizzas) = distributed(1);
    let shared = pizzas[1];
    let _ = harness.room.take_events();

    let id = clients[0].id.clone();
    harness.send(&id, "removeView", json!(shared.to_u64()));
    harness.send(&id, "removeView", json!(shared.to_u64()));
    harness.tick();
    harness.send(&id, "removeView", json!(shared.to_u64()));
    harness.tick();
    clients[0].sync().unwrap();

    assert_eq!(remove_count(&clients[0].patches, shared), 1);
    assert!(!harness.room.take_events().has::<FaultEvent>());
    assert!(!clients[0].mirror.contains(&shared));
}

#[test]
fn removing_a_never_granted_node_is_ignored() {
    let (mut harness, mut clients, pizzas) = distributed(2);
    let other_pizza = pizzas[1];
    let _ = harness.room.take_events();

    let id = clients[0].id.clone();
    harness.send(&id, "removeView", json!(other_pizza.to_u64()));
    harness.send(&id, "removeView", json!(987_654u64));
    harness.tick();
    clients[0].sync().unwrap();

    assert!(!harness.room.take_events().has::<FaultEvent>());
    assert!(clients[0].mirror.contains(&pizzas[0]));
}

#[test]
fn grants_are_counted_per_session() {
    let (mut harness, mut clients, pizzas) = distributed(2);
    let shared = pizzas[2];

    let id = clients[0].id.clone();
    harness.send(&id, "removeView", json!(shared.to_u64()));
    harness.tick();
    for client in clients.iter_mut() {
        client.sync().unwrap();
    }

    let first = harness.room.reachable_snapshot(&clients[0].id).unwrap();
    let second = harness.room.reachable_snapshot(&clients[1].id).unwrap();
    assert!(!first.contains_key(&shared));
    assert!(second.contains_key(&shared));
    assert!(clients[1].mirror.contains(&shared));
    assert!(harness.room.state().contains(&shared));
}

#[test]
fn revoking_a_pizza_keeps_directly_granted_ingredients() {
    let (mut harness, mut clients, pizzas) = distributed(1);
    let own = pizzas[0];
    let ingredients = child(harness.room.state(), own, "ingredients").unwrap();

    let id = clients[0].id.clone();
    harness.send(&id, "removeView", json!(own.to_u64()));
    harness.tick();
    clients[0].sync().unwrap();

    let mirror = &clients[0].mirror;
    assert!(!mirror.contains(&own));
    assert!(mirror.contains(&ingredients));
    assert_eq!(mirror.values(&ingredients).len(), 3);
}

#[test]
fn revoking_ingredients_keeps_them_visible_through_their_pizza() {
    let (mut harness, mut clients, pizzas) = distributed(1);
    let own = pizzas[0];
    let ingredients = child(harness.room.state(), own, "ingredients").unwrap();

    let id = clients[0].id.clone();
    harness.send(&id, "removeView", json!(ingredients.to_u64()));
    harness.tick();
    clients[0].sync().unwrap();

    let snapshot = harness.room.reachable_snapshot(&id).unwrap();
    assert!(snapshot.contains_key(&ingredients));
    assert_eq!(remove_count(&clients[0].patches, ingredients), 0);

    let mirror = &clients[0].mirror;
    assert!(mirror.contains(&own));
    assert!(mirror.contains(&ingredients));
    assert_eq!(mirror.values(&ingredients).len(), 3);
}

#[test]
fn hidden_references_read_as_null() {
    let (_harness, clients, _pizzas) = distributed(1);
    let mirror = &clients[0].mirror;

    assert_eq!(mirror.read("viewsHolder.hasBeenSet"), Some(Value::Bool(true)));
    assert_eq!(mirror.read("viewsHolder.perPlayerPizza"), Some(Value::Null));
    let holder = mirror.node_at("viewsHolder").unwrap();
    assert_eq!(
        mirror.node(&holder).unwrap().get(&Key::from("perPlayerPizza")),
        Some(&Value::Null)
    );
}
