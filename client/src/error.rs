use thiserror::Error;

use roomsync_shared::{CodecError, NodeId, Version};

/// Reasons a patch could not be applied. The mirror is left exactly as it
/// was before the patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    #[error("Patch is based on {found:?} but the mirror is at {expected:?}, a resync is needed")]
    OutOfSync {
        expected: Option<Version>,
        found: Option<Version>,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Patch creates node {id} which the mirror already holds")]
    DuplicateNode { id: NodeId },

    #[error("Patch changes node {id} which the mirror does not hold")]
    UnknownNode { id: NodeId },

    #[error("Node {id} refers to {reference} which the mirror does not hold")]
    DanglingReference { id: NodeId, reference: NodeId },
}
