use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Key, NodeId, Value, Version};

/// Structural kind of a node; structs carry their schema type name
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Struct(String),
    Sequence,
    Mapping,
}

impl NodeKind {
    pub fn is_container(&self) -> bool {
        !matches!(self, NodeKind::Struct(_))
    }
}

/// The value of one node as a passive mirror holds it: its kind and the
/// slots it exposes to that mirror.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub kind: NodeKind,
    pub entries: BTreeMap<Key, Value>,
}

impl NodeSnapshot {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Identities this node refers to
    pub fn references(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.values().filter_map(Value::as_node)
    }
}

/// One change to a mirror, scoped to a single node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DeltaRecord {
    /// The node became visible; carries its complete current value
    Create {
        id: NodeId,
        kind: NodeKind,
        entries: Vec<(Key, Value)>,
    },
    /// Slots of an already visible node changed; `None` deletes the slot
    Change {
        id: NodeId,
        entries: Vec<(Key, Option<Value>)>,
    },
    /// The node is no longer visible
    Remove { id: NodeId },
}

impl DeltaRecord {
    pub fn id(&self) -> NodeId {
        match self {
            DeltaRecord::Create { id, .. }
            | DeltaRecord::Change { id, .. }
            | DeltaRecord::Remove { id } => *id,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, DeltaRecord::Create { .. })
    }

    pub fn is_change(&self) -> bool {
        matches!(self, DeltaRecord::Change { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, DeltaRecord::Remove { .. })
    }
}

/// Ordered records advancing one client's mirror from `base` to `version`.
///
/// Creations come first (children before the containers that reference
/// them), then changes, then removals (children before their containers).
/// A patch without a base is a full resync: the mirror discards its contents
/// before applying it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub root: NodeId,
    pub base: Option<Version>,
    pub version: Version,
    pub records: Vec<DeltaRecord>,
}

impl Patch {
    pub fn is_full(&self) -> bool {
        self.base.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Records touching the given node, in patch order
    pub fn records_for(&self, id: NodeId) -> impl Iterator<Item = &DeltaRecord> + '_ {
        self.records.iter().filter(move |record| record.id() == id)
    }
}
