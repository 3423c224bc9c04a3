use thiserror::Error;

use roomsync_shared::{NodeId, PathError};

use crate::session::SessionId;

/// Errors raised while validating a room's state schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Root type {type_name} is not defined")]
    MissingRoot { type_name: String },

    #[error("Struct {owner} refers to undefined type {type_name}")]
    UndefinedType { owner: String, type_name: String },

    #[error("Struct {type_name} is defined more than once")]
    DuplicateType { type_name: String },

    #[error("Struct {owner} declares field {field} more than once")]
    DuplicateField { owner: String, field: String },

    #[error("Field {owner}.{field} has an initializer that does not match its type")]
    InvalidInitializer { owner: String, field: String },

    #[error("Constructing {type_name} would construct itself again through {path}")]
    ConstructCycle { type_name: String, path: String },
}

/// Errors that can occur while reading or mutating the state tree
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("Node {id} does not exist")]
    NodeNotFound { id: NodeId },

    #[error("Struct type {type_name} is not defined in the schema")]
    UnknownType { type_name: String },

    #[error("Node {id} has no slot named {key}")]
    MissingKey { id: NodeId, key: String },

    #[error("Index {index} is out of bounds for sequence {id} of length {len}")]
    IndexOutOfBounds { id: NodeId, index: usize, len: usize },

    #[error("Segment '{segment}' is not a valid index into sequence {id}")]
    InvalidIndex { id: NodeId, segment: String },

    #[error("Cannot write {found} into {location}, expected {expected}")]
    TypeMismatch {
        location: String,
        expected: String,
        found: String,
    },

    #[error("Node {id} is not a {expected}")]
    WrongKind { id: NodeId, expected: &'static str },

    #[error("Path {path} does not lead through a node")]
    NotANode { path: String },

    #[error("Linking node {child} under {parent} would create a reference cycle")]
    Cycle { parent: NodeId, child: NodeId },

    #[error("Value at {location} is not numeric")]
    NotNumeric { location: String },

    #[error("The root node cannot be replaced or removed")]
    RootImmutable,

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Errors that can occur while editing a session's view
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("Cannot add node {id} to the view of {session} - node does not exist")]
    UnknownNode { id: NodeId, session: SessionId },
}

/// Error returned by room logic from a message, lifecycle or deferred handler
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error("Session {session} is not joined")]
    UnknownSession { session: SessionId },

    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("{0}")]
    Custom(String),
}

impl HandlerError {
    pub fn custom(reason: impl Into<String>) -> Self {
        HandlerError::Custom(reason.into())
    }
}

/// Reasons a join request is refused. No session exists afterwards.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JoinError {
    #[error("Authentication rejected: {reason}")]
    AuthRejected { reason: String },

    #[error("Invalid join options: {reason}")]
    InvalidOptions { reason: String },

    #[error("Room {room_id} is full ({max_clients} clients)")]
    RoomFull { room_id: String, max_clients: usize },

    #[error("Room {room_id} is disposing, retry against a new room")]
    RoomDisposalRace { room_id: String },

    #[error("Room {room_id} has been disposed")]
    RoomDisposed { room_id: String },

    #[error("Room {room_id} is locked")]
    RoomLocked { room_id: String },

    #[error("Join handler failed: {reason}")]
    HandlerFault { reason: String },

    #[error("No room type named {room_type} is defined")]
    UnknownRoomType { room_type: String },

    #[error("The lane of room {room_id} has shut down")]
    LaneClosed { room_id: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Failures scoped to a single room or session, recorded for observability.
/// None of these stop the room.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoomError {
    #[error("Handler '{handler}' failed for session {session:?}: {reason}")]
    HandlerFault {
        handler: String,
        session: Option<SessionId>,
        reason: String,
    },

    #[error("Session {session} could not drain {queued} queued outbound items and was dropped")]
    TransportOverrun { session: SessionId, queued: usize },

    #[error("Transport of session {session} closed")]
    TransportClosed { session: SessionId },

    #[error("Join rejected: {reason}")]
    AuthRejected { reason: String },
}
