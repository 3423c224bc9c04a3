//! # Roomsync Shared
//! Common functionality shared between roomsync-server & roomsync-client
//! crates: stable node identities, the values held by state nodes, and the
//! versioned patch format that carries state from a room to its clients.

#![deny(trivial_casts, trivial_numeric_casts, unstable_features, unused_import_braces)]

mod codec;
mod patch;
mod path;
mod types;
mod value;

pub use codec::{decode_patch, encode_patch, CodecError, PATCH_FORMAT_VERSION};
pub use patch::{DeltaRecord, NodeKind, NodeSnapshot, Patch};
pub use path::{Path, PathError};
pub use types::{NodeId, Version};
pub use value::{Key, Value};
