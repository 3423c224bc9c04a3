//! # Roomsync Server
//! The authoritative side of a multiplayer room: a canonical state tree,
//! per-client views layered over globally shared state, and a delta engine
//! that ships each client ordered patches of exactly what it may see.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use roomsync_shared::{
        decode_patch, encode_patch, CodecError, DeltaRecord, Key, NodeId, NodeKind, NodeSnapshot,
        Patch, Path, PathError, Value, Version, PATCH_FORMAT_VERSION,
    };
}

pub mod transport;

mod config;
mod delta;
mod error;
mod events;
mod identity;
mod lane;
mod room;
mod router;
mod session;
mod state;
mod view;

pub use config::{RoomConfig, ServerConfig};
pub use delta::{DeltaEngine, ReachSet, ScopeState};
pub use error::{HandlerError, JoinError, RoomError, SchemaError, StateError, ViewError};
pub use events::{DisposeEvent, FaultEvent, JoinEvent, LeaveEvent, RoomEvent, RoomEvents};
pub use identity::{AuthRejected, GuestIdentity, IdentityProvider, TokenTable};
pub use lane::{ClientEvent, ClientSession, Matchmaker, RoomHandle, RoomLane, RoomStatus};
pub use room::{
    parse_options, Clock, JoinOptions, Room, RoomContext, RoomLogic, RoomState, Task, TimerId,
};
pub use router::{Dispatched, FallbackHandler, Handler, MessageRouter};
pub use session::{AuthClaims, Session, SessionId, SessionRegistry, SessionState};
pub use state::{
    FieldDef, FieldType, Holder, Initializer, IntoPath, Node, ReferenceGraph, Schema, StateTree,
    StructDef, Visibility,
};
pub use view::{ViewScopeMut, ViewScopeRef, ViewSet};
