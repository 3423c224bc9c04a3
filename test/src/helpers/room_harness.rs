use std::time::{Duration, Instant};

use serde_json::Value;

use roomsync_server::{JoinError, JoinOptions, Room, RoomLogic, ServerConfig, SessionId};

use super::{RecordingTransport, TestClient};

/// Drives one room by hand: a fake clock, explicit ticks and recording
/// transports in place of real connections
pub struct RoomHarness<L: RoomLogic> {
    pub room: Room<L>,
    now: Instant,
}

impl<L: RoomLogic> RoomHarness<L> {
    pub fn new(logic: L, config: ServerConfig) -> Self {
        let now = Instant::now();
        let room = Room::create("test-room", logic, &config, &Default::default(), now)
            .expect("room creation failed");
        Self { room, now }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn join(&mut self) -> TestClient {
        self.try_join(None, RecordingTransport::new())
            .expect("join failed")
    }

    pub fn try_join(
        &mut self,
        token: Option<&str>,
        transport: RecordingTransport,
    ) -> Result<TestClient, JoinError> {
        let id = self
            .room
            .join(token, &JoinOptions::new(), Box::new(transport.clone()))?;
        Ok(TestClient::new(id, transport))
    }

    pub fn send(&mut self, client: &SessionId, name: &str, payload: Value) {
        self.room.dispatch(client, name, &payload);
    }

    /// Runs one tick at the current time
    pub fn tick(&mut self) {
        self.room.tick(self.now);
    }

    /// Moves the clock forward one tick interval and ticks
    pub fn step(&mut self) {
        self.now += self.room.config().tick_interval;
        self.tick();
    }

    /// Ticks at every interval until `duration` has passed
    pub fn advance(&mut self, duration: Duration) {
        let deadline = self.now + duration;
        while self.now < deadline {
            self.step();
        }
    }

    /// Ticks, then syncs every given client's mirror
    pub fn flush(&mut self, clients: &mut [&mut TestClient]) {
        self.tick();
        for client in clients.iter_mut() {
            client.sync().expect("mirror refused a patch");
        }
    }
}
