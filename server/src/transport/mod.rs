mod channel;

pub use channel::ChannelTransport;

use thiserror::Error;

/// Something the room sends to one client. Patches and messages share one
/// ordered stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Outgoing {
    /// An encoded patch, see `roomsync_shared::encode_patch`
    Patch(Vec<u8>),
    Message {
        name: String,
        payload: serde_json::Value,
    },
}

/// Why an outbound item could not be handed to the transport. The item is
/// returned to the caller.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Transport cannot accept more items right now")]
    Full(Outgoing),
    #[error("Transport is closed")]
    Closed(Outgoing),
}

/// The outbound half of one client's connection. Implementations never
/// block; a transport that cannot keep up reports [`SendError::Full`].
pub trait Transport: Send {
    fn try_send(&mut self, item: Outgoing) -> Result<(), SendError>;
}
