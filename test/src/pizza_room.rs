use std::time::Duration;

use log::info;
use serde::Deserialize;
use serde_json::{json, Value};

use roomsync_server::{
    shared::{NodeId, Path},
    FieldDef, FieldType, HandlerError, MessageRouter, RoomContext, RoomLogic, Schema, SessionId,
    StateError, StateTree, StructDef,
};

/// Name the demo room is registered under with a matchmaker
pub const PIZZA_ROOM: &str = "my_room";

/// Recognizes no keys; anything a client sends is ignored
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PizzaOptions {}

/// The demo room: players with scores, and pizzas handed out through views
pub struct PizzaRoom {
    rng: fastrand::Rng,
}

impl Default for PizzaRoom {
    fn default() -> Self {
        Self::new()
    }
}

impl PizzaRoom {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    fn random_pizza(&mut self, state: &mut StateTree) -> Result<NodeId, StateError> {
        let pizza = state.create_struct("Pizza")?;
        state.set(pizza, "name", format!("Pizza {}", self.rng.u32(0..100)))?;
        state.set(pizza, "price", self.rng.i64(0..100))?;

        let tags = child(state, pizza, "tags")?;
        for tag in ["tag1", "tag2", "tag3"] {
            state.push(tags, tag)?;
        }

        let ingredients = child(state, pizza, "ingredients")?;
        for index in 0..3 {
            let ingredient = state.create_struct("PizzaIngredient")?;
            state.set(ingredient, "name", format!("Ingredient {}", index))?;
            state.set(ingredient, "price", self.rng.i64(0..100))?;
            state.set(ingredient, "isVegetarian", self.rng.bool())?;
            state.push(ingredients, ingredient)?;
        }
        Ok(pizza)
    }
}

/// Path of one player's entry, or of a field inside it
pub fn player_path(session: &SessionId) -> Path {
    Path::new().then("players").then(session)
}

/// The node a struct field refers to
pub fn child(state: &StateTree, node: NodeId, field: &str) -> Result<NodeId, StateError> {
    state
        .read_at(node, field)?
        .as_node()
        .ok_or_else(|| StateError::NotANode {
            path: format!("{}.{}", node, field),
        })
}

impl RoomLogic for PizzaRoom {
    type Options = PizzaOptions;

    fn schema() -> Schema {
        Schema::new("MyRoomState")
            .define(
                StructDef::new("Player")
                    .field(FieldDef::new("name", FieldType::Str))
                    .field(FieldDef::new("score", FieldType::Int).default(0))
                    .field(FieldDef::new("speaking", FieldType::Bool).default(false)),
            )
            .define(
                StructDef::new("PizzaIngredient")
                    .field(FieldDef::new("name", FieldType::Str).default("Ingredient"))
                    .field(FieldDef::new("price", FieldType::Int).default(20))
                    .field(FieldDef::new("isVegetarian", FieldType::Bool).default(true)),
            )
            .define(
                StructDef::new("Pizza")
                    .field(FieldDef::new("name", FieldType::Str))
                    .field(FieldDef::new("price", FieldType::Int))
                    .field(
                        FieldDef::new(
                            "ingredients",
                            FieldType::sequence_of(FieldType::structure("PizzaIngredient")),
                        )
                        .construct(),
                    )
                    .field(FieldDef::new("tags", FieldType::sequence_of(FieldType::Str)).construct()),
            )
            .define(
                StructDef::new("ViewsHolder")
                    .field(FieldDef::new("hasBeenSet", FieldType::Bool).default(false))
                    .field(
                        FieldDef::new(
                            "perPlayerPizza",
                            FieldType::sequence_of(FieldType::structure("Pizza")),
                        )
                        .construct()
                        .view_only(),
                    ),
            )
            .define(
                StructDef::new("MyRoomState")
                    .field(FieldDef::new("highestScore", FieldType::Int).default(0))
                    .field(
                        FieldDef::new("players", FieldType::mapping_of(FieldType::structure("Player")))
                            .construct(),
                    )
                    .field(FieldDef::new("viewsHolder", FieldType::structure("ViewsHolder")).construct()),
            )
    }

    fn register(router: &mut MessageRouter<Self>) {
        router
            .register("increment", |_, ctx, session, _| {
                let score = ctx
                    .state_mut()
                    .increment(player_path(session).then("score"), 1)?;
                let highest = ctx.state().read("highestScore")?;
                if highest.as_int() < score.as_int() {
                    ctx.state_mut().write("highestScore", score)?;
                }
                Ok(())
            })
            .register("speaking", |_, ctx, session, payload| {
                let speaking = payload.as_bool() == Some(true);
                ctx.state_mut()
                    .write(player_path(session).then("speaking"), speaking)?;
                Ok(())
            })
            .register("distributeViews", distribute_views)
            .register("removeView", |_, ctx, session, payload| {
                let Some(raw) = payload.as_u64() else {
                    return Err(HandlerError::InvalidPayload {
                        reason: format!("expected a node id, got {}", payload),
                    });
                };
                if let Some(mut view) = ctx.view(session) {
                    view.remove(NodeId::new(raw));
                }
                Ok(())
            });
    }

    fn on_join(
        &mut self,
        ctx: &mut RoomContext<'_, Self>,
        session: &SessionId,
        _options: &PizzaOptions,
    ) -> Result<(), HandlerError> {
        info!("{} joined!", session);
        let name = ctx
            .claims(session)
            .map(|claims| claims.display_name().to_string())
            .unwrap_or_default();

        let state = ctx.state_mut();
        let player = state.create_struct("Player")?;
        state.set(player, "name", name)?;
        state.write(player_path(session), player)?;
        Ok(())
    }

    fn on_leave(
        &mut self,
        ctx: &mut RoomContext<'_, Self>,
        session: &SessionId,
        consented: bool,
    ) -> Result<(), HandlerError> {
        info!("{} left! (consented: {})", session, consented);
        let players = ctx.state().node_at("players")?;
        ctx.state_mut().remove(players, session.as_str())?;
        Ok(())
    }

    fn on_dispose(&mut self, ctx: &mut RoomContext<'_, Self>) {
        info!("room {} disposing...", ctx.room_id());
    }
}

// Hands every client a pizza of its own plus one shared pizza, then edits
// and re-grants them on the room clock
fn distribute_views(
    room: &mut PizzaRoom,
    ctx: &mut RoomContext<'_, PizzaRoom>,
    sender: &SessionId,
    _payload: &Value,
) -> Result<(), HandlerError> {
    ctx.send(sender, "serverMsg", json!({ "yes": true }))?;
    ctx.broadcast("serverMsg", json!("yellow"));

    let views_holder = ctx.state_mut().create_struct("ViewsHolder")?;
    ctx.state_mut().set(views_holder, "hasBeenSet", true)?;
    ctx.state_mut().write("viewsHolder", views_holder)?;
    let per_player = child(ctx.state(), views_holder, "perPlayerPizza")?;

    let shared_pizza = {
        let state = ctx.state_mut();
        let pizza = state.create_struct("Pizza")?;
        state.set(pizza, "name", "Shared Pizza")?;
        state.set(pizza, "price", 100)?;
        let ingredients = child(state, pizza, "ingredients")?;
        let ingredient = state.create_struct("PizzaIngredient")?;
        state.push(ingredients, ingredient)?;
        pizza
    };

    for client in ctx.clients() {
        let pizza = room.random_pizza(ctx.state_mut())?;
        let ingredients = child(ctx.state(), pizza, "ingredients")?;
        if let Some(mut view) = ctx.view(&client) {
            view.add(shared_pizza)?.add(pizza)?.add(ingredients)?;
        }
        ctx.state_mut().push(per_player, pizza)?;

        ctx.after(Duration::from_secs(1), Some(client.clone()), move |_, ctx| {
            let state = ctx.state_mut();
            for value in state.values(ingredients)? {
                if let Some(ingredient) = value.as_node() {
                    state.set(ingredient, "name", "Updated ingredient name")?;
                    state.set(ingredient, "price", 333)?;
                }
            }
            Ok(())
        });
        ctx.after(Duration::from_secs(2), Some(client.clone()), move |_, ctx| {
            if let Some(mut view) = ctx.view(&client) {
                view.add(shared_pizza)?;
            }
            Ok(())
        });
    }

    ctx.state_mut().push(per_player, shared_pizza)?;
    Ok(())
}
