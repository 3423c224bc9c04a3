use log::warn;
use serde_json::Value;
use tokio::sync::mpsc::{error::TryRecvError, Receiver};

use roomsync_shared::{decode_patch, Patch};

use crate::{error::JoinError, session::SessionId, transport::Outgoing};

use super::RoomHandle;

/// Something a joined client received from its room
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    Patch(Patch),
    Message { name: String, payload: Value },
}

/// The client's end of a joined session. Dropping it without calling
/// [`ClientSession::leave`] reports an abrupt disconnect to the room.
pub struct ClientSession {
    session_id: SessionId,
    room: RoomHandle,
    receiver: Receiver<Outgoing>,
    left: bool,
}

impl ClientSession {
    pub(crate) fn new(session_id: SessionId, room: RoomHandle, receiver: Receiver<Outgoing>) -> Self {
        Self {
            session_id,
            room,
            receiver,
            left: false,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn room_id(&self) -> &str {
        self.room.room_id()
    }

    pub fn room(&self) -> &RoomHandle {
        &self.room
    }

    pub fn send(&self, name: &str, payload: Value) -> Result<(), JoinError> {
        self.room.send(&self.session_id, name, payload)
    }

    pub fn request_resync(&self) -> Result<(), JoinError> {
        self.room.resync(&self.session_id)
    }

    /// Leaves the room gracefully
    pub fn leave(mut self) -> Result<(), JoinError> {
        self.left = true;
        self.room.leave(&self.session_id, true)
    }

    /// Waits for the next event. Returns `None` once the room stops sending.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        loop {
            let item = self.receiver.recv().await?;
            if let Some(event) = self.decode(item) {
                return Some(event);
            }
        }
    }

    /// The next event if one has already arrived
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        loop {
            let item = match self.receiver.try_recv() {
                Ok(item) => item,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            };
            if let Some(event) = self.decode(item) {
                return Some(event);
            }
        }
    }

    fn decode(&self, item: Outgoing) -> Option<ClientEvent> {
        match item {
            Outgoing::Message { name, payload } => Some(ClientEvent::Message { name, payload }),
            Outgoing::Patch(bytes) => match decode_patch(&bytes) {
                Ok(patch) => Some(ClientEvent::Patch(patch)),
                Err(error) => {
                    warn!(
                        "Session {}: undecodable patch ({}), requesting resync",
                        self.session_id, error
                    );
                    let _ = self.request_resync();
                    None
                }
            },
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if !self.left {
            let _ = self.room.leave(&self.session_id, false);
        }
    }
}
