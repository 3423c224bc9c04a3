/// PROPERTY-BASED TESTS: the ordering law
///
/// Random joins, leaves, messages and resync requests are applied to a room.
/// After every tick, each client's mirror (built only from the patches it
/// received) must equal the server's view of what that client can reach.

use proptest::prelude::*;
use serde_json::{json, Value};

use roomsync_server::{
    shared::{NodeId, Value as StateValue},
    FieldDef, FieldType, HandlerError, MessageRouter, RoomConfig, RoomContext, RoomLogic, Schema,
    ServerConfig, SessionId, StructDef,
};
use roomsync_test::{RecordingTransport, RoomHarness, TestClient};

const MESSAGES: &[&str] = &[
    "spawn", "drop", "bump", "tag", "stash", "show", "hide", "unstash", "pin", "unpin", "link",
];

/// A room whose handlers poke at every kind of structural change: shared
/// mapping entries, view-only stash items, cross references and sequences
struct Sandbox;

fn slot(payload: &Value) -> String {
    format!("k{}", payload.as_u64().unwrap_or(0) % 4)
}

// The stash item a payload points at, if the stash is not empty
fn stashed(
    ctx: &RoomContext<'_, Sandbox>,
    payload: &Value,
) -> Result<Option<(usize, NodeId)>, HandlerError> {
    let stash = ctx.state().node_at("stash")?;
    let len = ctx.state().len(stash)?;
    if len == 0 {
        return Ok(None);
    }
    let index = payload.as_u64().unwrap_or(0) as usize % len;
    Ok(ctx.state().get(stash, index)?.as_node().map(|item| (index, item)))
}

impl RoomLogic for Sandbox {
    type Options = ();

    fn schema() -> Schema {
        Schema::new("Root")
            .define(
                StructDef::new("Item")
                    .field(FieldDef::new("label", FieldType::Str).default("item"))
                    .field(FieldDef::new("value", FieldType::Int).default(0))
                    .field(FieldDef::new("tags", FieldType::sequence_of(FieldType::Str)).construct())
                    .field(FieldDef::new("link", FieldType::structure("Item"))),
            )
            .define(
                StructDef::new("Root")
                    .field(FieldDef::new("count", FieldType::Int).default(0))
                    .field(
                        FieldDef::new("items", FieldType::mapping_of(FieldType::structure("Item")))
                            .construct(),
                    )
                    .field(
                        FieldDef::new("stash", FieldType::sequence_of(FieldType::structure("Item")))
                            .construct()
                            .view_only(),
                    )
                    .field(FieldDef::new("pinned", FieldType::structure("Item"))),
            )
    }

    fn register(router: &mut MessageRouter<Self>) {
        router
            .register("spawn", |_, ctx, _, payload| {
                let state = ctx.state_mut();
                let item = state.create_struct("Item")?;
                state.set(item, "label", slot(payload))?;
                state.write(format!("items.{}", slot(payload)), item)?;
                state.increment("count", 1)?;
                Ok(())
            })
            .register("drop", |_, ctx, _, payload| {
                let items = ctx.state().node_at("items")?;
                ctx.state_mut().remove(items, slot(payload))?;
                Ok(())
            })
            .register("bump", |_, ctx, _, payload| {
                ctx.state_mut()
                    .increment(format!("items.{}.value", slot(payload)), 1)?;
                Ok(())
            })
            .register("tag", |_, ctx, _, payload| {
                let tags = ctx.state().node_at(format!("items.{}.tags", slot(payload)))?;
                ctx.state_mut().push(tags, slot(payload))?;
                Ok(())
            })
            .register("stash", |_, ctx, session, _| {
                let state = ctx.state_mut();
                let item = state.create_struct("Item")?;
                let stash = state.node_at("stash")?;
                state.push(stash, item)?;
                if let Some(mut view) = ctx.view(session) {
                    view.add(item)?;
                }
                Ok(())
            })
            .register("show", |_, ctx, session, payload| {
                if let Some((_, item)) = stashed(ctx, payload)? {
                    if let Some(mut view) = ctx.view(session) {
                        view.add(item)?;
                    }
                }
                Ok(())
            })
            .register("hide", |_, ctx, session, payload| {
                if let Some((_, item)) = stashed(ctx, payload)? {
                    if let Some(mut view) = ctx.view(session) {
                        view.remove(item);
                    }
                }
                Ok(())
            })
            .register("unstash", |_, ctx, _, payload| {
                if let Some((index, _)) = stashed(ctx, payload)? {
                    let stash = ctx.state().node_at("stash")?;
                    ctx.state_mut().remove(stash, index)?;
                }
                Ok(())
            })
            .register("pin", |_, ctx, _, payload| {
                if let Some((_, item)) = stashed(ctx, payload)? {
                    ctx.state_mut().write("pinned", item)?;
                }
                Ok(())
            })
            .register("unpin", |_, ctx, _, _| {
                ctx.state_mut().write("pinned", StateValue::Null)?;
                Ok(())
            })
            .register("link", |_, ctx, _, payload| {
                if let Some((_, item)) = stashed(ctx, payload)? {
                    ctx.state_mut()
                        .write(format!("items.{}.link", slot(payload)), item)?;
                }
                Ok(())
            });
    }

    fn on_join(
        &mut self,
        ctx: &mut RoomContext<'_, Self>,
        _session: &SessionId,
        _options: &(),
    ) -> Result<(), HandlerError> {
        ctx.state_mut().increment("count", 1)?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum Op {
    Join,
    Leave(usize, bool),
    Send(usize, &'static str, u8),
    Resync(usize),
    Tick,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Join),
        1 => (any::<usize>(), any::<bool>()).prop_map(|(client, consented)| Op::Leave(client, consented)),
        8 => (any::<usize>(), prop::sample::select(MESSAGES), any::<u8>())
            .prop_map(|(client, name, arg)| Op::Send(client, name, arg)),
        1 => any::<usize>().prop_map(Op::Resync),
        4 => Just(Op::Tick),
    ]
}

fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let config = ServerConfig {
        room: RoomConfig {
            max_clients: 6,
            ..RoomConfig::default()
        },
        ..ServerConfig::default()
    };
    let mut harness = RoomHarness::new(Sandbox, config);
    let mut clients: Vec<TestClient> = Vec::new();

    for op in ops {
        match op {
            Op::Join => {
                if let Ok(client) = harness.try_join(None, RecordingTransport::new()) {
                    clients.push(client);
                }
            }
            Op::Leave(index, consented) if !clients.is_empty() => {
                let client = clients.remove(index % clients.len());
                harness.room.leave(&client.id, consented);
            }
            Op::Send(index, name, arg) if !clients.is_empty() => {
                let id = clients[index % clients.len()].id.clone();
                harness.send(&id, name, json!(arg));
            }
            Op::Resync(index) if !clients.is_empty() => {
                let id = clients[index % clients.len()].id.clone();
                harness.room.request_resync(&id);
            }
            Op::Tick => {
                harness.step();
                for client in clients.iter_mut() {
                    client
                        .sync()
                        .map_err(|error| TestCaseError::fail(error.to_string()))?;
                    let expected = harness
                        .room
                        .reachable_snapshot(&client.id)
                        .ok_or_else(|| TestCaseError::fail("joined client has no session"))?;
                    prop_assert_eq!(client.mirror.nodes(), &expected);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

proptest! {
    /// Mirrors built from patches equal the reachable snapshot after every tick
    #[test]
    fn prop_mirror_matches_reachable_state(
        ops in prop::collection::vec(op_strategy(), 1..60)
    ) {
        run(ops)?;
    }

    /// Same law with a tick after every operation, so each patch is small
    #[test]
    fn prop_mirror_matches_after_each_operation(
        ops in prop::collection::vec(op_strategy(), 1..30)
    ) {
        let ops = ops.into_iter().flat_map(|op| [op, Op::Tick]).collect();
        run(ops)?;
    }
}
