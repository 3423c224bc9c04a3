use std::collections::BTreeMap;

use log::debug;

use roomsync_shared::{
    decode_patch, DeltaRecord, Key, NodeId, NodeKind, NodeSnapshot, Patch, Path, Value, Version,
};

use crate::MirrorError;

/// What applying a patch did to the mirror
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MirrorEvent {
    Created(NodeId),
    Changed { id: NodeId, keys: Vec<Key> },
    Removed(NodeId),
}

/// A passive copy of the state one client is allowed to see, kept current by
/// applying the patches its room sends
#[derive(Clone, Debug, Default)]
pub struct Mirror {
    root: Option<NodeId>,
    version: Option<Version>,
    nodes: BTreeMap<NodeId, NodeSnapshot>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Version of the last patch applied
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, NodeSnapshot> {
        &self.nodes
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeSnapshot> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Decodes and applies one encoded patch
    pub fn apply_bytes(&mut self, bytes: &[u8]) -> Result<Vec<MirrorEvent>, MirrorError> {
        let patch = decode_patch(bytes)?;
        self.apply(&patch)
    }

    /// Applies a patch all-or-nothing. A patch whose base is not the
    /// mirror's version is refused; a patch without a base replaces
    /// everything.
    pub fn apply(&mut self, patch: &Patch) -> Result<Vec<MirrorEvent>, MirrorError> {
        let mut nodes = if patch.is_full() {
            debug!("Mirror: full resync to {}", patch.version);
            BTreeMap::new()
        } else {
            if patch.base != self.version {
                return Err(MirrorError::OutOfSync {
                    expected: self.version,
                    found: patch.base,
                });
            }
            self.nodes.clone()
        };

        let mut events = Vec::with_capacity(patch.records.len());
        for record in &patch.records {
            match record {
                DeltaRecord::Create { id, kind, entries } => {
                    if nodes.contains_key(id) {
                        return Err(MirrorError::DuplicateNode { id: *id });
                    }
                    let mut snapshot = NodeSnapshot::new(kind.clone());
                    for (key, value) in entries {
                        check_reference(&nodes, *id, value)?;
                        snapshot.entries.insert(key.clone(), value.clone());
                    }
                    nodes.insert(*id, snapshot);
                    events.push(MirrorEvent::Created(*id));
                }
                DeltaRecord::Change { id, entries } => {
                    for (_, value) in entries {
                        if let Some(value) = value {
                            check_reference(&nodes, *id, value)?;
                        }
                    }
                    let Some(snapshot) = nodes.get_mut(id) else {
                        return Err(MirrorError::UnknownNode { id: *id });
                    };
                    for (key, value) in entries {
                        match value {
                            Some(value) => {
                                snapshot.entries.insert(key.clone(), value.clone());
                            }
                            None => {
                                snapshot.entries.remove(key);
                            }
                        }
                    }
                    events.push(MirrorEvent::Changed {
                        id: *id,
                        keys: entries.iter().map(|(key, _)| key.clone()).collect(),
                    });
                }
                DeltaRecord::Remove { id } => {
                    if nodes.remove(id).is_some() {
                        events.push(MirrorEvent::Removed(*id));
                    }
                }
            }
        }

        self.nodes = nodes;
        self.root = Some(patch.root);
        self.version = Some(patch.version);
        Ok(events)
    }

    /// Reads the value at `path` from the root, as this client sees it
    pub fn read(&self, path: &str) -> Option<Value> {
        let path = Path::parse(path).ok()?;
        let Some((parent, last)) = path.split_last() else {
            return self.root.map(Value::Node);
        };
        let container = self.resolve(&parent)?;
        let snapshot = self.nodes.get(&container)?;
        snapshot.get(&key_for(&snapshot.kind, last)?).cloned()
    }

    /// Identity of the node at `path` from the root
    pub fn node_at(&self, path: &str) -> Option<NodeId> {
        let path = Path::parse(path).ok()?;
        self.resolve(&path)
    }

    /// Values of a sequence in order, or of a mapping in key order
    pub fn values(&self, id: &NodeId) -> Vec<Value> {
        self.nodes
            .get(id)
            .map(|snapshot| snapshot.entries.values().cloned().collect())
            .unwrap_or_default()
    }

    fn resolve(&self, path: &Path) -> Option<NodeId> {
        let mut current = self.root?;
        for segment in path.segments() {
            let snapshot = self.nodes.get(&current)?;
            current = snapshot.get(&key_for(&snapshot.kind, segment)?)?.as_node()?;
        }
        Some(current)
    }
}

fn key_for(kind: &NodeKind, segment: &str) -> Option<Key> {
    match kind {
        NodeKind::Sequence => segment.parse::<usize>().ok().map(Key::from),
        _ => Some(Key::Name(segment.to_string())),
    }
}

fn check_reference(
    nodes: &BTreeMap<NodeId, NodeSnapshot>,
    id: NodeId,
    value: &Value,
) -> Result<(), MirrorError> {
    match value.as_node() {
        Some(reference) if !nodes.contains_key(&reference) => {
            Err(MirrorError::DanglingReference { id, reference })
        }
        _ => Ok(()),
    }
}
