use std::time::Instant;

use log::{info, warn};
use serde_json::Value;
use tokio::{
    sync::{
        mpsc::{self, Receiver, UnboundedReceiver, UnboundedSender},
        oneshot, watch,
    },
    time::{self, MissedTickBehavior},
};

use crate::{
    error::JoinError,
    room::{JoinOptions, Room, RoomLogic, RoomState},
    session::SessionId,
    transport::{ChannelTransport, Outgoing},
};

type JoinReply = oneshot::Sender<Result<(SessionId, Receiver<Outgoing>), JoinError>>;

pub(crate) enum Command {
    Join {
        token: Option<String>,
        options: JoinOptions,
        reply: JoinReply,
    },
    Message {
        session: SessionId,
        name: String,
        payload: Value,
    },
    Leave {
        session: SessionId,
        consented: bool,
    },
    Resync {
        session: SessionId,
    },
}

/// Snapshot of a room published by its lane after every command and tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomStatus {
    pub state: RoomState,
    pub clients: usize,
    pub locked: bool,
    pub accepts_joins: bool,
}

impl RoomStatus {
    fn of<L: RoomLogic>(room: &Room<L>) -> Self {
        Self {
            state: room.lifecycle(),
            clients: room.clients().len(),
            locked: room.is_locked(),
            accepts_joins: room.accepts_joins(),
        }
    }
}

/// Runs rooms on their own tasks. Everything a room does happens on that
/// task, one command or tick at a time.
pub struct RoomLane;

impl RoomLane {
    /// Moves `room` onto a new task of the current tokio runtime
    pub fn spawn<L: RoomLogic>(room: Room<L>) -> RoomHandle {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (status_sender, status) = watch::channel(RoomStatus::of(&room));
        let handle = RoomHandle {
            room_id: room.id().to_string(),
            commands,
            status,
        };
        tokio::spawn(run(room, receiver, status_sender));
        handle
    }
}

async fn run<L: RoomLogic>(
    mut room: Room<L>,
    mut commands: UnboundedReceiver<Command>,
    status: watch::Sender<RoomStatus>,
) {
    let mut interval = time::interval(room.config().tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => handle(&mut room, command),
                None => {
                    room.shutdown();
                    let _ = status.send(RoomStatus::of(&room));
                    break;
                }
            },
            _ = interval.tick() => room.tick(Instant::now()),
        }

        let _ = status.send(RoomStatus::of(&room));
        if room.lifecycle() == RoomState::Disposed {
            break;
        }
    }

    info!("Room {}: lane stopped", room.id());
}

fn handle<L: RoomLogic>(room: &mut Room<L>, command: Command) {
    match command {
        Command::Join {
            token,
            options,
            reply,
        } => {
            let (transport, receiver) = ChannelTransport::bounded(room.config().channel_capacity);
            let result = room
                .join(token.as_deref(), &options, Box::new(transport))
                .map(|session| (session, receiver));
            if reply.send(result).is_err() {
                warn!("Room {}: joining client went away before the reply", room.id());
            }
        }
        Command::Message {
            session,
            name,
            payload,
        } => room.dispatch(&session, &name, &payload),
        Command::Leave { session, consented } => room.leave(&session, consented),
        Command::Resync { session } => room.request_resync(&session),
    }
}

/// Cloneable address of a room running on a lane
#[derive(Clone)]
pub struct RoomHandle {
    room_id: String,
    commands: UnboundedSender<Command>,
    status: watch::Receiver<RoomStatus>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn status(&self) -> RoomStatus {
        self.status.borrow().clone()
    }

    /// Returns true once the lane has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub async fn join(
        &self,
        token: Option<&str>,
        options: JoinOptions,
    ) -> Result<(SessionId, Receiver<Outgoing>), JoinError> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Join {
            token: token.map(str::to_string),
            options,
            reply,
        })?;
        response.await.map_err(|_| self.closed())?
    }

    pub fn send(&self, session: &SessionId, name: &str, payload: Value) -> Result<(), JoinError> {
        self.command(Command::Message {
            session: session.clone(),
            name: name.to_string(),
            payload,
        })
    }

    pub fn leave(&self, session: &SessionId, consented: bool) -> Result<(), JoinError> {
        self.command(Command::Leave {
            session: session.clone(),
            consented,
        })
    }

    pub fn resync(&self, session: &SessionId) -> Result<(), JoinError> {
        self.command(Command::Resync {
            session: session.clone(),
        })
    }

    /// Waits until the published status satisfies `predicate`, or the lane
    /// stops. Returns the last status seen.
    pub async fn wait_for(&self, predicate: impl Fn(&RoomStatus) -> bool) -> RoomStatus {
        let mut status = self.status.clone();
        loop {
            {
                let current = status.borrow();
                if predicate(&current) {
                    return current.clone();
                }
            }
            if status.changed().await.is_err() {
                return status.borrow().clone();
            }
        }
    }

    fn command(&self, command: Command) -> Result<(), JoinError> {
        self.commands.send(command).map_err(|_| self.closed())
    }

    fn closed(&self) -> JoinError {
        JoinError::LaneClosed {
            room_id: self.room_id.clone(),
        }
    }
}
