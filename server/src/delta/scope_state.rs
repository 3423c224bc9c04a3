use std::{
    collections::{BTreeMap, BTreeSet},
    mem,
};

use roomsync_shared::{NodeId, NodeSnapshot, Version};

/// What one session's mirror is known to hold: the projection last sent for
/// every node it can see, plus the versions the patch chain has reached.
#[derive(Default)]
pub struct ScopeState {
    pub(crate) sent: BTreeMap<NodeId, NodeSnapshot>,
    pub(crate) synced: Option<Version>,
    pub(crate) last_sent: Option<Version>,
    refreshed: BTreeSet<NodeId>,
    resync: bool,
}

impl ScopeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the session's mirror holds the node
    pub fn knows(&self, node: &NodeId) -> bool {
        self.sent.contains_key(node)
    }

    pub fn sent(&self) -> &BTreeMap<NodeId, NodeSnapshot> {
        &self.sent
    }

    /// Tree version the last diff was computed at
    pub fn synced(&self) -> Option<Version> {
        self.synced
    }

    /// Version of the last non-empty patch, the base of the next one
    pub fn last_sent(&self) -> Option<Version> {
        self.last_sent
    }

    /// Owes the session the complete value of these nodes on the next diff
    pub fn refresh(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.refreshed.extend(nodes);
    }

    /// Makes the next diff a full resync
    pub fn request_resync(&mut self) {
        self.resync = true;
    }

    pub fn resync_pending(&self) -> bool {
        self.resync || self.last_sent.is_none()
    }

    pub(crate) fn take_refreshed(&mut self) -> BTreeSet<NodeId> {
        mem::take(&mut self.refreshed)
    }

    pub(crate) fn take_resync(&mut self) -> bool {
        mem::replace(&mut self.resync, false) || self.last_sent.is_none()
    }
}
