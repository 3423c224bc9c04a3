use roomsync_shared::NodeId;

use crate::{error::ViewError, state::StateTree};

use super::ViewSet;

pub struct ViewScopeRef<'s> {
    view: &'s ViewSet,
}

impl<'s> ViewScopeRef<'s> {
    pub(crate) fn new(view: &'s ViewSet) -> Self {
        Self { view }
    }

    /// Returns true if the node was explicitly added to the session's view
    pub fn has(&self, node: &NodeId) -> bool {
        self.view.contains(node)
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.view.iter().copied().collect()
    }
}

pub struct ViewScopeMut<'s> {
    view: &'s mut ViewSet,
    tree: &'s mut StateTree,
}

impl<'s> ViewScopeMut<'s> {
    pub(crate) fn new(view: &'s mut ViewSet, tree: &'s mut StateTree) -> Self {
        Self { view, tree }
    }

    /// Returns true if the node was explicitly added to the session's view
    pub fn has(&self, node: &NodeId) -> bool {
        self.view.contains(node)
    }

    /// Adds a node to the session's view
    pub fn add(&mut self, node: NodeId) -> Result<&mut Self, ViewError> {
        self.view.add(self.tree, node)?;

        Ok(self)
    }

    /// Removes a node from the session's view. Removing a node that was
    /// never added is ignored.
    pub fn remove(&mut self, node: NodeId) -> &mut Self {
        self.view.remove(self.tree, node);

        self
    }

    /// Removes all nodes from the session's view
    pub fn clear(&mut self) -> &mut Self {
        self.view.clear(self.tree);

        self
    }
}
