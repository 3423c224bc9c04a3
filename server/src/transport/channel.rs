use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

use super::{Outgoing, SendError, Transport};

/// Transport over a bounded in-process channel. The receiving half belongs
/// to whoever plays the client.
pub struct ChannelTransport {
    sender: Sender<Outgoing>,
}

impl ChannelTransport {
    pub fn bounded(capacity: usize) -> (Self, Receiver<Outgoing>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl Transport for ChannelTransport {
    fn try_send(&mut self, item: Outgoing) -> Result<(), SendError> {
        self.sender.try_send(item).map_err(|error| match error {
            TrySendError::Full(item) => SendError::Full(item),
            TrySendError::Closed(item) => SendError::Closed(item),
        })
    }
}
