use serde_json::Value;

use roomsync_client::{Mirror, MirrorError, MirrorEvent};
use roomsync_server::{
    shared::{decode_patch, Patch},
    transport::Outgoing,
    SessionId,
};

use super::RecordingTransport;

/// A joined client as a test sees it: the transport its room writes to and
/// the mirror those writes are applied to
pub struct TestClient {
    pub id: SessionId,
    pub transport: RecordingTransport,
    pub mirror: Mirror,
    pub patches: Vec<Patch>,
    pub messages: Vec<(String, Value)>,
}

impl TestClient {
    pub fn new(id: SessionId, transport: RecordingTransport) -> Self {
        Self {
            id,
            transport,
            mirror: Mirror::new(),
            patches: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Applies everything received since the last sync, in arrival order.
    /// Stops at the first patch the mirror refuses.
    pub fn sync(&mut self) -> Result<Vec<MirrorEvent>, MirrorError> {
        let mut events = Vec::new();
        for item in self.transport.take() {
            match item {
                Outgoing::Patch(bytes) => {
                    let patch = decode_patch(&bytes)?;
                    events.extend(self.mirror.apply(&patch)?);
                    self.patches.push(patch);
                }
                Outgoing::Message { name, payload } => self.messages.push((name, payload)),
            }
        }
        Ok(events)
    }

    pub fn last_patch(&self) -> Option<&Patch> {
        self.patches.last()
    }

    /// Messages received under `name`, oldest first
    pub fn messages_named(&self, name: &str) -> Vec<&Value> {
        self.messages
            .iter()
            .filter(|(received, _)| received == name)
            .map(|(_, payload)| payload)
            .collect()
    }
}
