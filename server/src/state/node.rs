use std::{collections::BTreeMap, sync::Arc};

use roomsync_shared::{Key, NodeId, NodeKind, NodeSnapshot, Value, Version};

use super::schema::{FieldType, StructDef, Visibility};

#[derive(Clone, Debug)]
pub(crate) struct Slot {
    pub value: Value,
    pub version: Version,
}

impl Slot {
    pub fn new(value: Value, version: Version) -> Self {
        Self { value, version }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum NodeBody {
    Struct {
        def: Arc<StructDef>,
        slots: Vec<Slot>,
    },
    Sequence {
        element: FieldType,
        items: Vec<Slot>,
    },
    Mapping {
        element: FieldType,
        entries: BTreeMap<String, Slot>,
    },
}

/// A structural node of the state tree
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    pub(crate) body: NodeBody,
    pub(crate) version: Version,
    pub(crate) subtree_version: Version,
}

impl Node {
    pub(crate) fn new(id: NodeId, body: NodeBody, version: Version) -> Self {
        Self {
            id,
            body,
            version,
            subtree_version: version,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        match &self.body {
            NodeBody::Struct { def, .. } => NodeKind::Struct(def.name.clone()),
            NodeBody::Sequence { .. } => NodeKind::Sequence,
            NodeBody::Mapping { .. } => NodeKind::Mapping,
        }
    }

    /// Version of the last change to this node's own slots
    pub fn version(&self) -> Version {
        self.version
    }

    /// Version of the last change to this node or anything beneath it
    pub fn subtree_version(&self) -> Version {
        self.subtree_version
    }

    pub fn type_name(&self) -> Option<&str> {
        match &self.body {
            NodeBody::Struct { def, .. } => Some(&def.name),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.body {
            NodeBody::Struct { slots, .. } => slots.len(),
            NodeBody::Sequence { items, .. } => items.len(),
            NodeBody::Mapping { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        match (&self.body, key) {
            (NodeBody::Struct { def, slots }, Key::Name(name)) => {
                let index = def.field_index(name)?;
                slots.get(index).map(|slot| &slot.value)
            }
            (NodeBody::Sequence { items, .. }, Key::Index(index)) => {
                items.get(*index as usize).map(|slot| &slot.value)
            }
            (NodeBody::Mapping { entries, .. }, Key::Name(name)) => {
                entries.get(name).map(|slot| &slot.value)
            }
            _ => None,
        }
    }

    /// Version at which the slot last changed
    pub fn slot_version(&self, key: &Key) -> Option<Version> {
        match (&self.body, key) {
            (NodeBody::Struct { def, slots }, Key::Name(name)) => {
                let index = def.field_index(name)?;
                slots.get(index).map(|slot| slot.version)
            }
            (NodeBody::Sequence { items, .. }, Key::Index(index)) => {
                items.get(*index as usize).map(|slot| slot.version)
            }
            (NodeBody::Mapping { entries, .. }, Key::Name(name)) => {
                entries.get(name).map(|slot| slot.version)
            }
            _ => None,
        }
    }

    /// Every slot with its key, in key order for containers and declaration
    /// order for structs
    pub fn entries(&self) -> Vec<(Key, &Value)> {
        match &self.body {
            NodeBody::Struct { def, slots } => def
                .fields
                .iter()
                .zip(slots.iter())
                .map(|(field, slot)| (Key::Name(field.name.clone()), &slot.value))
                .collect(),
            NodeBody::Sequence { items, .. } => items
                .iter()
                .enumerate()
                .map(|(index, slot)| (Key::from(index), &slot.value))
                .collect(),
            NodeBody::Mapping { entries, .. } => entries
                .iter()
                .map(|(name, slot)| (Key::Name(name.clone()), &slot.value))
                .collect(),
        }
    }

    pub fn references(&self, child: &NodeId) -> bool {
        self.slots().any(|slot| slot.value.as_node() == Some(*child))
    }

    /// Distinct children referenced from any slot
    pub fn children(&self) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = self.slots().filter_map(|slot| slot.value.as_node()).collect();
        children.sort();
        children.dedup();
        children
    }

    /// Children that become reachable whenever this node is reachable:
    /// every container element, and struct fields not restricted to views
    pub(crate) fn followed_children(&self) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = match &self.body {
            NodeBody::Struct { def, slots } => def
                .fields
                .iter()
                .zip(slots.iter())
                .filter(|(field, _)| field.visibility == Visibility::Shared)
                .filter_map(|(_, slot)| slot.value.as_node())
                .collect(),
            _ => self
                .slots()
                .filter_map(|slot| slot.value.as_node())
                .collect(),
        };
        children.sort();
        children.dedup();
        children
    }

    /// The node as seen by someone who can reach exactly the nodes accepted
    /// by `visible`. References to hidden nodes read as null in structs and
    /// sequences, and are left out of mappings.
    pub(crate) fn project(&self, visible: impl Fn(&NodeId) -> bool) -> NodeSnapshot {
        let mut snapshot = NodeSnapshot::new(self.kind());
        let is_mapping = matches!(self.body, NodeBody::Mapping { .. });
        for (key, value) in self.entries() {
            match value {
                Value::Node(child) if !visible(child) => {
                    if !is_mapping {
                        snapshot.entries.insert(key, Value::Null);
                    }
                }
                _ => {
                    snapshot.entries.insert(key, value.clone());
                }
            }
        }
        snapshot
    }

    fn slots(&self) -> Box<dyn Iterator<Item = &Slot> + '_> {
        match &self.body {
            NodeBody::Struct { slots, .. } => Box::new(slots.iter()),
            NodeBody::Sequence { items, .. } => Box::new(items.iter()),
            NodeBody::Mapping { entries, .. } => Box::new(entries.values()),
        }
    }
}
