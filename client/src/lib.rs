//! # Roomsync Client
//! The passive side of a room: a mirror that applies the ordered patches a
//! roomsync server sends and exposes the state this client may see.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use roomsync_shared::{
        decode_patch, CodecError, DeltaRecord, Key, NodeId, NodeKind, NodeSnapshot, Patch, Path,
        Value, Version,
    };
}

mod error;
mod mirror;

pub use error::MirrorError;
pub use mirror::{Mirror, MirrorEvent};
