use std::time::{Duration, Instant};

use log::info;
use serde_json::json;
use tokio::time::sleep;

use roomsync_client::{Mirror, MirrorEvent};
use roomsync_server::{
    shared::{Key, Value},
    AuthClaims, ClientEvent, ClientSession, JoinError, JoinOptions, Matchmaker, RoomConfig,
    ServerConfig, TokenTable,
};
use roomsync_test::{PizzaRoom, PIZZA_ROOM};

struct Player {
    name: &'static str,
    session: ClientSession,
    mirror: Mirror,
}

pub struct App {
    matchmaker: Matchmaker,
    players: Vec<Player>,
}

impl App {
    pub fn default() -> Self {
        info!("Basic Roomsync Server Demo started");

        let identity = TokenTable::new().with(
            "alice-token",
            AuthClaims::Named {
                name: "Alice".to_string(),
            },
        );
        let config = ServerConfig {
            room: RoomConfig::default(),
            identity: std::sync::Arc::new(identity),
        };
        let mut matchmaker = Matchmaker::new(config);
        matchmaker.define(PIZZA_ROOM, PizzaRoom::new);

        App {
            matchmaker,
            players: Vec::new(),
        }
    }

    pub async fn run(&mut self) -> Result<(), JoinError> {
        self.join("alice", Some("alice-token")).await?;
        self.join("guest", None).await?;
        self.pump(Duration::from_millis(200)).await;

        self.players[0].session.send("increment", json!(null))?;
        self.players[1].session.send("speaking", json!(true))?;
        self.pump(Duration::from_millis(200)).await;

        self.players[0].session.send("distributeViews", json!(null))?;
        self.pump(Duration::from_millis(2500)).await;

        for player in &self.players {
            info!(
                "{} sees highestScore={:?} and {} nodes",
                player.name,
                player.mirror.read("highestScore"),
                player.mirror.len()
            );
            for pizza in pizzas(&player.mirror) {
                info!("{} sees pizza {}", player.name, pizza);
            }
        }

        for player in self.players.drain(..) {
            player.session.leave()?;
        }
        sleep(Duration::from_millis(100)).await;
        info!("Basic Roomsync Server Demo finished");
        Ok(())
    }

    async fn join(&mut self, name: &'static str, token: Option<&str>) -> Result<(), JoinError> {
        let session = self
            .matchmaker
            .join_or_create(PIZZA_ROOM, token, JoinOptions::new())
            .await?;
        info!(
            "{} joined room {} as {}",
            name,
            session.room_id(),
            session.session_id()
        );
        self.players.push(Player {
            name,
            session,
            mirror: Mirror::new(),
        });
        Ok(())
    }

    // Feeds every patch and message the players receive into their mirrors
    async fn pump(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            for player in self.players.iter_mut() {
                while let Some(event) = player.session.try_recv() {
                    receive(player, event);
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}

fn receive(player: &mut Player, event: ClientEvent) {
    match event {
        ClientEvent::Message { name, payload } => {
            info!("{} received message {}: {}", player.name, name, payload);
        }
        ClientEvent::Patch(patch) => match player.mirror.apply(&patch) {
            Ok(events) => {
                for event in events {
                    if let MirrorEvent::Changed { id, keys } = event {
                        info!("{} saw {} change: {:?}", player.name, id, keys);
                    }
                }
            }
            Err(error) => {
                info!("{} could not apply patch: {}", player.name, error);
                let _ = player.session.request_resync();
            }
        },
    }
}

fn pizzas(mirror: &Mirror) -> Vec<String> {
    mirror
        .nodes()
        .iter()
        .filter(|(_, node)| node.get(&Key::from("tags")).is_some())
        .map(|(id, node)| {
            let name = node
                .get(&Key::from("name"))
                .and_then(Value::as_str)
                .unwrap_or("?");
            format!("{} ({})", name, id)
        })
        .collect()
}
