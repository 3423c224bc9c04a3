use std::{
    collections::{HashMap, HashSet},
    mem,
    sync::Arc,
};

use log::debug;

use roomsync_shared::{Key, NodeId, Path, PathError, Value, Version};

use crate::error::{SchemaError, StateError};

use super::{
    node::{Node, NodeBody, Slot},
    reference_graph::{Holder, ReferenceGraph},
    schema::{FieldType, Initializer, Schema, StructDef},
};

/// Anything that can name a slot relative to a node
pub trait IntoPath {
    fn into_path(self) -> Result<Path, PathError>;
}

impl IntoPath for Path {
    fn into_path(self) -> Result<Path, PathError> {
        Ok(self)
    }
}

impl IntoPath for &Path {
    fn into_path(self) -> Result<Path, PathError> {
        Ok(self.clone())
    }
}

impl IntoPath for &str {
    fn into_path(self) -> Result<Path, PathError> {
        Path::parse(self)
    }
}

impl IntoPath for String {
    fn into_path(self) -> Result<Path, PathError> {
        Path::parse(&self)
    }
}

/// The canonical, versioned state of a room.
///
/// Structural nodes live in a flat table keyed by identity; containers hold
/// their children by reference, so the same node may sit in several
/// containers and in several views at once. Every mutation stamps the
/// touched slot, its node and all of the node's ancestors with the current
/// tick's version.
pub struct StateTree {
    types: HashMap<String, Arc<StructDef>>,
    nodes: HashMap<NodeId, Node>,
    graph: ReferenceGraph,
    root: NodeId,
    next_id: u64,
    version: Version,
    last_mutation: Version,
}

impl StateTree {
    pub fn new(schema: Schema) -> Result<Self, SchemaError> {
        schema.validate()?;

        let types = schema
            .structs()
            .iter()
            .map(|def| (def.name.clone(), Arc::new(def.clone())))
            .collect();

        let mut tree = Self {
            types,
            nodes: HashMap::new(),
            graph: ReferenceGraph::new(),
            root: NodeId::new(0),
            next_id: 0,
            version: Version::ZERO,
            last_mutation: Version::ZERO,
        };

        let root = tree
            .create_struct(schema.root())
            .map_err(|_| SchemaError::MissingRoot {
                type_name: schema.root().to_string(),
            })?;
        tree.graph.add_holder(root, Holder::Root);
        tree.root = root;

        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Version stamped onto mutations made during the current tick
    pub fn version(&self) -> Version {
        self.version
    }

    /// Version of the most recent mutation or collection anywhere in the tree
    pub fn last_mutation(&self) -> Version {
        self.last_mutation
    }

    pub fn graph(&self) -> &ReferenceGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut ReferenceGraph {
        &mut self.graph
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    // Construction

    /// Builds a struct of the given schema type with its declared defaults.
    /// The node is orphaned until it is linked into a container or added to
    /// a view.
    pub fn create_struct(&mut self, type_name: &str) -> Result<NodeId, StateError> {
        let Some(def) = self.types.get(type_name).cloned() else {
            return Err(StateError::UnknownType {
                type_name: type_name.to_string(),
            });
        };

        let mut slots = Vec::with_capacity(def.fields.len());
        let mut children = Vec::new();
        for field in &def.fields {
            let value = match &field.init {
                Initializer::Null => Value::Null,
                Initializer::Value(value) => field
                    .ty
                    .coerce_primitive(value.clone())
                    .unwrap_or(Value::Null),
                Initializer::Construct => {
                    let child = self.create_child(&field.ty)?;
                    children.push(child);
                    Value::Node(child)
                }
            };
            slots.push(Slot::new(value, self.version));
        }

        let id = self.insert_node(NodeBody::Struct { def, slots });
        for child in children {
            self.graph.add_holder(child, Holder::Parent(id));
        }
        Ok(id)
    }

    pub fn create_sequence(&mut self, element: FieldType) -> NodeId {
        self.insert_node(NodeBody::Sequence {
            element,
            items: Vec::new(),
        })
    }

    pub fn create_mapping(&mut self, element: FieldType) -> NodeId {
        self.insert_node(NodeBody::Mapping {
            element,
            entries: Default::default(),
        })
    }

    fn create_child(&mut self, ty: &FieldType) -> Result<NodeId, StateError> {
        match ty {
            FieldType::Struct(type_name) => self.create_struct(type_name),
            FieldType::Sequence(element) => Ok(self.create_sequence((**element).clone())),
            FieldType::Mapping(element) => Ok(self.create_mapping((**element).clone())),
            primitive => Err(StateError::TypeMismatch {
                location: "constructed field".to_string(),
                expected: "struct or collection".to_string(),
                found: primitive.to_string(),
            }),
        }
    }

    fn insert_node(&mut self, body: NodeBody) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, body, self.version));
        self.graph.track(id);
        self.last_mutation = self.version;
        id
    }

    // Reads

    pub fn read(&self, path: impl IntoPath) -> Result<Value, StateError> {
        self.read_at(self.root, path)
    }

    pub fn read_at(&self, from: NodeId, path: impl IntoPath) -> Result<Value, StateError> {
        let path = path.into_path()?;
        let Some((parent, last)) = path.split_last() else {
            self.node_ref(&from)?;
            return Ok(Value::Node(from));
        };
        let container = self.resolve(from, &parent)?;
        let key = self.key_for(container, last)?;
        self.slot_value(container, &key).cloned()
    }

    /// Identity of the node found at `path` from the root
    pub fn node_at(&self, path: impl IntoPath) -> Result<NodeId, StateError> {
        let path = path.into_path()?;
        self.resolve(self.root, &path)
    }

    pub fn get(&self, container: NodeId, key: impl Into<Key>) -> Result<Value, StateError> {
        let key = key.into();
        self.slot_type(container, &key)?;
        self.slot_value(container, &key).cloned()
    }

    pub fn len(&self, container: NodeId) -> Result<usize, StateError> {
        Ok(self.node_ref(&container)?.len())
    }

    /// Values of a sequence in order, or of a mapping in key order
    pub fn values(&self, container: NodeId) -> Result<Vec<Value>, StateError> {
        let node = self.node_ref(&container)?;
        match &node.body {
            NodeBody::Sequence { items, .. } => Ok(items.iter().map(|slot| slot.value.clone()).collect()),
            NodeBody::Mapping { entries, .. } => {
                Ok(entries.values().map(|slot| slot.value.clone()).collect())
            }
            NodeBody::Struct { .. } => Err(StateError::WrongKind {
                id: container,
                expected: "collection",
            }),
        }
    }

    pub fn keys(&self, mapping: NodeId) -> Result<Vec<String>, StateError> {
        let node = self.node_ref(&mapping)?;
        match &node.body {
            NodeBody::Mapping { entries, .. } => Ok(entries.keys().cloned().collect()),
            _ => Err(StateError::WrongKind {
                id: mapping,
                expected: "mapping",
            }),
        }
    }

    fn node_ref(&self, id: &NodeId) -> Result<&Node, StateError> {
        self.nodes
            .get(id)
            .ok_or(StateError::NodeNotFound { id: *id })
    }

    fn resolve(&self, from: NodeId, path: &Path) -> Result<NodeId, StateError> {
        self.node_ref(&from)?;
        let mut current = from;
        for segment in path.segments() {
            let key = self.key_for(current, segment)?;
            let value = self.slot_value(current, &key)?;
            current = value.as_node().ok_or_else(|| StateError::NotANode {
                path: path.to_string(),
            })?;
        }
        Ok(current)
    }

    fn key_for(&self, node: NodeId, segment: &str) -> Result<Key, StateError> {
        match &self.node_ref(&node)?.body {
            NodeBody::Sequence { .. } => segment
                .parse::<usize>()
                .map(Key::from)
                .map_err(|_| StateError::InvalidIndex {
                    id: node,
                    segment: segment.to_string(),
                }),
            _ => Ok(Key::Name(segment.to_string())),
        }
    }

    fn slot_value(&self, node: NodeId, key: &Key) -> Result<&Value, StateError> {
        let found = self.node_ref(&node)?;
        if let Some(value) = found.get(key) {
            return Ok(value);
        }
        match (&found.body, key) {
            (NodeBody::Sequence { items, .. }, Key::Index(index)) => {
                Err(StateError::IndexOutOfBounds {
                    id: node,
                    index: *index as usize,
                    len: items.len(),
                })
            }
            _ => Err(StateError::MissingKey {
                id: node,
                key: key.to_string(),
            }),
        }
    }

    fn slot_type(&self, container: NodeId, key: &Key) -> Result<FieldType, StateError> {
        let node = self.node_ref(&container)?;
        match (&node.body, key) {
            (NodeBody::Struct { def, .. }, Key::Name(name)) => def
                .field_def(name)
                .map(|field| field.ty.clone())
                .ok_or_else(|| StateError::MissingKey {
                    id: container,
                    key: name.clone(),
                }),
            (NodeBody::Sequence { element, .. }, Key::Index(_)) => Ok(element.clone()),
            (NodeBody::Mapping { element, .. }, Key::Name(_)) => Ok(element.clone()),
            (NodeBody::Sequence { .. }, Key::Name(name)) => Err(StateError::InvalidIndex {
                id: container,
                segment: name.clone(),
            }),
            (_, key) => Err(StateError::MissingKey {
                id: container,
                key: key.to_string(),
            }),
        }
    }

    // Mutations

    pub fn write(&mut self, path: impl IntoPath, value: impl Into<Value>) -> Result<(), StateError> {
        self.write_at(self.root, path, value)
    }

    pub fn write_at(
        &mut self,
        from: NodeId,
        path: impl IntoPath,
        value: impl Into<Value>,
    ) -> Result<(), StateError> {
        let path = path.into_path()?;
        let Some((parent, last)) = path.split_last() else {
            return Err(StateError::RootImmutable);
        };
        let container = self.resolve(from, &parent)?;
        let key = self.key_for(container, last)?;
        self.set(container, key, value)
    }

    /// Replaces one slot. Writing a sequence index equal to its length
    /// appends. Writing the value a slot already holds changes nothing.
    pub fn set(
        &mut self,
        container: NodeId,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<(), StateError> {
        let key = key.into();
        let expected = self.slot_type(container, &key)?;
        let value = self.check_value(&expected, value.into(), container, &key)?;
        if let Value::Node(child) = value {
            self.check_cycle(container, child)?;
        }

        let version = self.version;
        let node = self
            .nodes
            .get_mut(&container)
            .ok_or(StateError::NodeNotFound { id: container })?;
        let old = match (&mut node.body, &key) {
            (NodeBody::Struct { def, slots }, Key::Name(name)) => {
                let Some(index) = def.field_index(name) else {
                    return Err(StateError::MissingKey {
                        id: container,
                        key: name.clone(),
                    });
                };
                if slots[index].value == value {
                    return Ok(());
                }
                mem::replace(&mut slots[index], Slot::new(value.clone(), version)).value
            }
            (NodeBody::Sequence { items, .. }, Key::Index(index)) => {
                let index = *index as usize;
                if index < items.len() {
                    if items[index].value == value {
                        return Ok(());
                    }
                    mem::replace(&mut items[index], Slot::new(value.clone(), version)).value
                } else if index == items.len() {
                    items.push(Slot::new(value.clone(), version));
                    Value::Null
                } else {
                    return Err(StateError::IndexOutOfBounds {
                        id: container,
                        index,
                        len: items.len(),
                    });
                }
            }
            (NodeBody::Mapping { entries, .. }, Key::Name(name)) => {
                if entries.get(name).map(|slot| &slot.value) == Some(&value) {
                    return Ok(());
                }
                entries
                    .insert(name.clone(), Slot::new(value.clone(), version))
                    .map(|slot| slot.value)
                    .unwrap_or(Value::Null)
            }
            (_, key) => {
                return Err(StateError::MissingKey {
                    id: container,
                    key: key.to_string(),
                })
            }
        };

        self.relink(container, &old, &value);
        self.touch(container);
        Ok(())
    }

    /// Inserts into a container: sequences shift later elements up, mappings
    /// and structs behave like [`StateTree::set`]
    pub fn insert(
        &mut self,
        container: NodeId,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<(), StateError> {
        let key = key.into();
        let is_sequence = matches!(
            self.node_ref(&container)?.body,
            NodeBody::Sequence { .. }
        );
        if !is_sequence {
            return self.set(container, key, value);
        }

        let expected = self.slot_type(container, &key)?;
        let value = self.check_value(&expected, value.into(), container, &key)?;
        if let Value::Node(child) = value {
            self.check_cycle(container, child)?;
        }
        let Some(index) = key.index() else {
            return Err(StateError::InvalidIndex {
                id: container,
                segment: key.to_string(),
            });
        };

        let version = self.version;
        let node = self
            .nodes
            .get_mut(&container)
            .ok_or(StateError::NodeNotFound { id: container })?;
        if let NodeBody::Sequence { items, .. } = &mut node.body {
            if index > items.len() {
                return Err(StateError::IndexOutOfBounds {
                    id: container,
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, Slot::new(value.clone(), version));
            for slot in items[index..].iter_mut() {
                slot.version = version;
            }
        }

        self.relink(container, &Value::Null, &value);
        self.touch(container);
        Ok(())
    }

    /// Appends to a sequence, returning the new element's index
    pub fn push(&mut self, sequence: NodeId, value: impl Into<Value>) -> Result<usize, StateError> {
        let node = self.node_ref(&sequence)?;
        let NodeBody::Sequence { items, .. } = &node.body else {
            return Err(StateError::WrongKind {
                id: sequence,
                expected: "sequence",
            });
        };
        let index = items.len();
        self.insert(sequence, index, value)?;
        Ok(index)
    }

    /// Removes one slot. Sequences shift later elements down, mappings drop
    /// the key (a missing key is not an error), struct fields reset to null.
    pub fn remove(
        &mut self,
        container: NodeId,
        key: impl Into<Key>,
    ) -> Result<Option<Value>, StateError> {
        let key = key.into();
        self.slot_type(container, &key)?;

        let version = self.version;
        let node = self
            .nodes
            .get_mut(&container)
            .ok_or(StateError::NodeNotFound { id: container })?;
        let old = match (&mut node.body, &key) {
            (NodeBody::Struct { def, slots }, Key::Name(name)) => {
                let Some(index) = def.field_index(name) else {
                    return Ok(None);
                };
                if slots[index].value.is_null() {
                    return Ok(None);
                }
                mem::replace(&mut slots[index], Slot::new(Value::Null, version)).value
            }
            (NodeBody::Sequence { items, .. }, Key::Index(index)) => {
                let index = *index as usize;
                if index >= items.len() {
                    return Err(StateError::IndexOutOfBounds {
                        id: container,
                        index,
                        len: items.len(),
                    });
                }
                let removed = items.remove(index);
                for slot in items[index..].iter_mut() {
                    slot.version = version;
                }
                removed.value
            }
            (NodeBody::Mapping { entries, .. }, Key::Name(name)) => {
                let Some(removed) = entries.remove(name) else {
                    return Ok(None);
                };
                removed.value
            }
            _ => return Ok(None),
        };

        self.relink(container, &old, &Value::Null);
        self.touch(container);
        Ok(Some(old))
    }

    /// Empties a sequence or mapping, returning how many slots were removed
    pub fn clear(&mut self, container: NodeId) -> Result<usize, StateError> {
        let removed: Vec<Value> = {
            let node = self
                .nodes
                .get_mut(&container)
                .ok_or(StateError::NodeNotFound { id: container })?;
            match &mut node.body {
                NodeBody::Sequence { items, .. } => {
                    items.drain(..).map(|slot| slot.value).collect()
                }
                NodeBody::Mapping { entries, .. } => {
                    mem::take(entries).into_values().map(|slot| slot.value).collect()
                }
                NodeBody::Struct { .. } => {
                    return Err(StateError::WrongKind {
                        id: container,
                        expected: "collection",
                    })
                }
            }
        };
        if removed.is_empty() {
            return Ok(0);
        }
        for value in &removed {
            self.relink(container, value, &Value::Null);
        }
        self.touch(container);
        Ok(removed.len())
    }

    /// Adds `by` to a numeric slot and returns the new value. Integers wrap
    /// on overflow; nothing is clamped.
    pub fn increment(&mut self, path: impl IntoPath, by: i64) -> Result<Value, StateError> {
        let path = path.into_path()?;
        let Some((parent, last)) = path.split_last() else {
            return Err(StateError::RootImmutable);
        };
        let container = self.resolve(self.root, &parent)?;
        let key = self.key_for(container, last)?;
        let next = match self.slot_value(container, &key)? {
            Value::Int(value) => Value::Int(value.wrapping_add(by)),
            Value::Float(value) => Value::Float(value + by as f64),
            _ => {
                return Err(StateError::NotNumeric {
                    location: path.to_string(),
                })
            }
        };
        self.set(container, key, next.clone())?;
        Ok(next)
    }

    fn check_value(
        &self,
        expected: &FieldType,
        value: Value,
        container: NodeId,
        key: &Key,
    ) -> Result<Value, StateError> {
        let mismatch = |found: String| StateError::TypeMismatch {
            location: format!("{}.{}", container, key),
            expected: expected.to_string(),
            found,
        };

        if let Value::Node(child) = value {
            let node = self.node_ref(&child)?;
            let fits = match (expected, &node.body) {
                (FieldType::Struct(type_name), NodeBody::Struct { def, .. }) => {
                    def.name == *type_name
                }
                (FieldType::Sequence(wanted), NodeBody::Sequence { element, .. }) => {
                    **wanted == *element
                }
                (FieldType::Mapping(wanted), NodeBody::Mapping { element, .. }) => {
                    **wanted == *element
                }
                _ => false,
            };
            if !fits {
                return Err(mismatch(format!("{:?} {}", node.kind(), child)));
            }
            return Ok(value);
        }

        let found = describe(&value);
        expected
            .coerce_primitive(value)
            .ok_or_else(|| mismatch(found))
    }

    fn check_cycle(&self, container: NodeId, child: NodeId) -> Result<(), StateError> {
        let cycle = StateError::Cycle {
            parent: container,
            child,
        };
        if container == child {
            return Err(cycle);
        }
        let mut visited = HashSet::new();
        let mut stack = vec![child];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            for grandchild in node.children() {
                if grandchild == container {
                    return Err(cycle);
                }
                stack.push(grandchild);
            }
        }
        Ok(())
    }

    fn relink(&mut self, container: NodeId, old: &Value, new: &Value) {
        if let Value::Node(child) = new {
            self.graph.add_holder(*child, Holder::Parent(container));
        }
        if let Value::Node(old_child) = old {
            if Some(*old_child) == new.as_node() {
                return;
            }
            let still_referenced = self
                .nodes
                .get(&container)
                .is_some_and(|node| node.references(old_child));
            if !still_referenced {
                self.graph
                    .remove_holder(old_child, &Holder::Parent(container));
            }
        }
    }

    // Stamps the node's own version, then its subtree version and that of
    // every ancestor.
    fn touch(&mut self, id: NodeId) {
        let version = self.version;
        self.last_mutation = version;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.version = version;
        }
        let mut visited = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&current) {
                node.subtree_version = version;
            }
            stack.extend(self.graph.parents(&current));
        }
    }

    // Collection

    /// Deletes every node nothing holds anymore, cascading into children
    /// that lose their last holder. Returns the deleted identities.
    pub fn collect_garbage(&mut self) -> Vec<NodeId> {
        let mut collected = Vec::new();
        loop {
            let orphans: Vec<NodeId> = self
                .graph
                .orphans()
                .into_iter()
                .filter(|id| *id != self.root)
                .collect();
            if orphans.is_empty() {
                break;
            }
            for orphan in orphans {
                self.graph.forget(&orphan);
                if let Some(node) = self.nodes.remove(&orphan) {
                    for child in node.children() {
                        self.graph.remove_holder(&child, &Holder::Parent(orphan));
                    }
                }
                collected.push(orphan);
            }
        }
        if !collected.is_empty() {
            debug!("StateTree: collected {} orphaned node(s)", collected.len());
            self.last_mutation = self.version;
        }
        collected.sort();
        collected
    }

    /// Moves to the next tick's version
    pub(crate) fn advance(&mut self) -> Version {
        self.version = self.version.next();
        self.version
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Int(_) => "int".to_string(),
        Value::Float(_) => "number".to_string(),
        Value::Str(_) => "string".to_string(),
        Value::Node(id) => format!("node {}", id),
    }
}
