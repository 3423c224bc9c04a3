use std::collections::BTreeSet;

use log::debug;

use roomsync_shared::NodeId;

use crate::{
    error::ViewError,
    session::SessionId,
    state::{Holder, StateTree},
};

/// The nodes room logic has explicitly revealed to one session, on top of
/// the state every session shares.
///
/// Adding a container reveals its elements through the container's own
/// reachability only; they are not added here. Removing a container
/// likewise leaves individually added elements visible.
pub struct ViewSet {
    session: SessionId,
    entries: BTreeSet<NodeId>,
    refreshed: BTreeSet<NodeId>,
}

impl ViewSet {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            entries: BTreeSet::new(),
            refreshed: BTreeSet::new(),
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Reveals `node` to the session. The next patch carries the node's
    /// complete value, even if the session could already see it.
    pub fn add(&mut self, tree: &mut StateTree, node: NodeId) -> Result<(), ViewError> {
        if !tree.contains(&node) {
            return Err(ViewError::UnknownNode {
                id: node,
                session: self.session.clone(),
            });
        }

        tree.graph_mut()
            .add_holder(node, Holder::View(self.session.clone()));
        if self.entries.insert(node) {
            debug!("View of {}: added {}", self.session, node);
        }
        self.refreshed.insert(node);
        Ok(())
    }

    /// Revokes the direct grant for `node`. Returns false, and does nothing,
    /// when the node was never added.
    pub fn remove(&mut self, tree: &mut StateTree, node: NodeId) -> bool {
        if !self.entries.remove(&node) {
            return false;
        }
        self.refreshed.remove(&node);
        tree.graph_mut()
            .remove_holder(&node, &Holder::View(self.session.clone()));
        debug!("View of {}: removed {}", self.session, node);
        true
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.entries.contains(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every grant, releasing the session's holds on the nodes
    pub fn clear(&mut self, tree: &mut StateTree) -> Vec<NodeId> {
        let holder = Holder::View(self.session.clone());
        let removed: Vec<NodeId> = std::mem::take(&mut self.entries).into_iter().collect();
        for node in &removed {
            tree.graph_mut().remove_holder(node, &holder);
        }
        self.refreshed.clear();
        removed
    }

    /// Nodes added since the last call, whose full value is owed
    pub(crate) fn take_refreshed(&mut self) -> BTreeSet<NodeId> {
        std::mem::take(&mut self.refreshed)
    }
}
