use std::collections::{HashMap, HashSet};

use log::trace;

use roomsync_shared::NodeId;

use crate::session::SessionId;

/// Something keeping a node alive
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Holder {
    /// The state tree's root anchor
    Root,
    /// A struct, sequence or mapping with at least one slot referencing the node
    Parent(NodeId),
    /// A session that explicitly added the node to its view
    View(SessionId),
}

/// Identity and multiplicity of every node: which containers and which views
/// hold it. A node with no holders is orphaned and gets collected on the
/// next tick.
#[derive(Default)]
pub struct ReferenceGraph {
    holders: HashMap<NodeId, HashSet<Holder>>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn track(&mut self, node: NodeId) {
        self.holders.entry(node).or_default();
    }

    pub fn is_tracked(&self, node: &NodeId) -> bool {
        self.holders.contains_key(node)
    }

    /// Registers `holder` for `node`. Adding the same pair twice has no
    /// further effect.
    pub fn add_holder(&mut self, node: NodeId, holder: Holder) {
        trace!("ReferenceGraph: {:?} holds {}", holder, node);
        self.holders.entry(node).or_default().insert(holder);
    }

    /// Deregisters `holder` for `node`. Returns false, and changes nothing,
    /// when the pair was never registered.
    pub fn remove_holder(&mut self, node: &NodeId, holder: &Holder) -> bool {
        let Some(holders) = self.holders.get_mut(node) else {
            return false;
        };
        holders.remove(holder)
    }

    pub fn holders(&self, node: &NodeId) -> HashSet<Holder> {
        self.holders.get(node).cloned().unwrap_or_default()
    }

    pub fn has_holder(&self, node: &NodeId, holder: &Holder) -> bool {
        self.holders
            .get(node)
            .is_some_and(|holders| holders.contains(holder))
    }

    /// True when the node is tracked and nothing holds it
    pub fn is_orphaned(&self, node: &NodeId) -> bool {
        self.holders
            .get(node)
            .is_some_and(|holders| holders.is_empty())
    }

    /// Containers currently referencing the node
    pub fn parents(&self, node: &NodeId) -> Vec<NodeId> {
        let Some(holders) = self.holders.get(node) else {
            return Vec::new();
        };
        let mut parents: Vec<NodeId> = holders
            .iter()
            .filter_map(|holder| match holder {
                Holder::Parent(parent) => Some(*parent),
                _ => None,
            })
            .collect();
        parents.sort();
        parents
    }

    pub fn orphans(&self) -> Vec<NodeId> {
        let mut orphans: Vec<NodeId> = self
            .holders
            .iter()
            .filter(|(_, holders)| holders.is_empty())
            .map(|(node, _)| *node)
            .collect();
        orphans.sort();
        orphans
    }

    /// Drops the node's entry entirely. Only valid once the node left the tree.
    pub(crate) fn forget(&mut self, node: &NodeId) {
        self.holders.remove(node);
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}
