use std::{collections::HashMap, sync::Mutex, time::Instant};

use log::{debug, info};

use crate::{
    config::ServerConfig,
    error::JoinError,
    room::{parse_options, JoinOptions, Room, RoomLogic, RoomState},
};

use super::{ClientSession, RoomHandle, RoomLane};

type RoomFactory =
    Box<dyn Fn(&str, &ServerConfig, &JoinOptions) -> Result<RoomHandle, JoinError> + Send + Sync>;

const ROOM_ID_LEN: usize = 9;

/// Places clients into rooms, creating rooms on demand
pub struct Matchmaker {
    config: ServerConfig,
    factories: HashMap<String, RoomFactory>,
    rooms: Mutex<HashMap<String, Vec<RoomHandle>>>,
}

impl Matchmaker {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            factories: HashMap::new(),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Makes `room_type` available; `logic` builds the logic of each new room
    pub fn define<L, F>(&mut self, room_type: &str, logic: F) -> &mut Self
    where
        L: RoomLogic,
        F: Fn() -> L + Send + Sync + 'static,
    {
        let factory = move |room_id: &str,
                            config: &ServerConfig,
                            options: &JoinOptions|
              -> Result<RoomHandle, JoinError> {
            let options: L::Options = parse_options(options)?;
            let room = Room::create(room_id, logic(), config, &options, Instant::now())?;
            Ok(RoomLane::spawn(room))
        };
        self.factories.insert(room_type.to_string(), Box::new(factory));

        self
    }

    /// Live rooms of a type, in creation order
    pub fn rooms(&self, room_type: &str) -> Vec<RoomHandle> {
        let mut rooms = self.lock_rooms();
        let list = rooms.entry(room_type.to_string()).or_default();
        list.retain(|room| !room.is_closed() && room.status().state != RoomState::Disposed);
        list.clone()
    }

    /// Creates a fresh room of `room_type` on its own lane
    pub fn create(&self, room_type: &str, options: &JoinOptions) -> Result<RoomHandle, JoinError> {
        let factory = self
            .factories
            .get(room_type)
            .ok_or_else(|| JoinError::UnknownRoomType {
                room_type: room_type.to_string(),
            })?;
        let room_id: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(ROOM_ID_LEN)
            .collect();
        let handle = factory(&room_id, &self.config, options)?;
        info!("Matchmaker: created {} room {}", room_type, room_id);
        self.lock_rooms()
            .entry(room_type.to_string())
            .or_default()
            .push(handle.clone());
        Ok(handle)
    }

    /// Joins the first open room of `room_type`, creating one if none takes
    /// joins. A room that turns out to be disposing or full by the time the
    /// join arrives is given up for a freshly created one, once.
    pub async fn join_or_create(
        &self,
        room_type: &str,
        token: Option<&str>,
        options: JoinOptions,
    ) -> Result<ClientSession, JoinError> {
        let room = match self.find_open(room_type) {
            Some(room) => room,
            None => self.create(room_type, &options)?,
        };

        match room.join(token, options.clone()).await {
            Ok((session, receiver)) => Ok(ClientSession::new(session, room, receiver)),
            Err(error) if is_retryable(&error) => {
                debug!(
                    "Matchmaker: room {} refused join ({}), retrying in a new room",
                    room.room_id(),
                    error
                );
                let room = self.create(room_type, &options)?;
                let (session, receiver) = room.join(token, options).await?;
                Ok(ClientSession::new(session, room, receiver))
            }
            Err(error) => Err(error),
        }
    }

    fn find_open(&self, room_type: &str) -> Option<RoomHandle> {
        self.rooms(room_type)
            .into_iter()
            .find(|room| room.status().accepts_joins)
    }

    fn lock_rooms(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<RoomHandle>>> {
        self.rooms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_retryable(error: &JoinError) -> bool {
    matches!(
        error,
        JoinError::RoomDisposalRace { .. }
            | JoinError::RoomDisposed { .. }
            | JoinError::RoomFull { .. }
            | JoinError::RoomLocked { .. }
            | JoinError::LaneClosed { .. }
    )
}
