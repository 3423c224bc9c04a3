use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use roomsync_shared::{DeltaRecord, Key, NodeId, NodeSnapshot, Patch, Value};

use crate::{state::StateTree, view::ViewSet};

use super::ScopeState;

/// Set of nodes one session can reach
pub type ReachSet = BTreeSet<NodeId>;

/// Computes what each session can see and the ordered records that bring its
/// mirror up to date.
pub struct DeltaEngine;

impl DeltaEngine {
    /// Nodes every session sees: the closure of the root through shared
    /// fields and container membership
    pub fn shared_reach(tree: &StateTree) -> ReachSet {
        let mut reach = ReachSet::new();
        close_over(tree, &mut reach, [tree.root()]);
        reach
    }

    /// Shared reach plus the closure of the session's explicit view entries
    pub fn reach(tree: &StateTree, shared: &ReachSet, view: &ViewSet) -> ReachSet {
        let mut reach = shared.clone();
        close_over(tree, &mut reach, view.iter().copied());
        reach
    }

    /// The contents a correct mirror of `reach` holds
    pub fn snapshot(tree: &StateTree, reach: &ReachSet) -> BTreeMap<NodeId, NodeSnapshot> {
        let visible = |id: &NodeId| reach.contains(id);
        reach
            .iter()
            .filter_map(|id| tree.node(id).map(|node| (*id, node.project(visible))))
            .collect()
    }

    /// Builds the patch moving the session's mirror from what `scope` last
    /// sent to `reach` as of the tree's current version, and records the
    /// result in `scope`.
    pub fn diff(tree: &StateTree, reach: &ReachSet, scope: &mut ScopeState) -> Patch {
        let full = scope.take_resync();
        if full {
            scope.sent.clear();
        }
        let base = if full { None } else { scope.last_sent };
        let visible = |id: &NodeId| reach.contains(id);
        let refreshed = scope.take_refreshed();

        let entered: ReachSet = reach
            .iter()
            .filter(|id| !scope.sent.contains_key(id) && tree.contains(id))
            .copied()
            .collect();
        let left: ReachSet = scope
            .sent
            .keys()
            .filter(|id| !reach.contains(id))
            .copied()
            .collect();

        // Known nodes whose projection may differ from what was sent
        let mut candidates = ReachSet::new();
        for id in reach {
            if !scope.sent.contains_key(id) {
                continue;
            }
            let Some(node) = tree.node(id) else {
                continue;
            };
            let stale = scope.synced.map_or(true, |synced| node.version() >= synced);
            if stale || refreshed.contains(id) {
                candidates.insert(*id);
            }
        }
        for id in &entered {
            for parent in tree.graph().parents(id) {
                if reach.contains(&parent) && scope.sent.contains_key(&parent) {
                    candidates.insert(parent);
                }
            }
        }
        for (id, snapshot) in &scope.sent {
            if reach.contains(id) && snapshot.references().any(|child| left.contains(&child)) {
                candidates.insert(*id);
            }
        }

        let mut records = Vec::new();

        // Creations, children before the nodes referring to them
        let mut projected: BTreeMap<NodeId, NodeSnapshot> = entered
            .iter()
            .filter_map(|id| tree.node(id).map(|node| (*id, node.project(visible))))
            .collect();
        let created = post_order(&entered, |id| {
            projected
                .get(id)
                .map(|snapshot| snapshot.references().collect())
                .unwrap_or_default()
        });
        for id in created {
            let Some(snapshot) = projected.remove(&id) else {
                continue;
            };
            records.push(DeltaRecord::Create {
                id,
                kind: snapshot.kind.clone(),
                entries: snapshot
                    .entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            });
            scope.sent.insert(id, snapshot);
        }

        // Changes, in identity order
        for id in candidates {
            let Some(node) = tree.node(&id) else {
                continue;
            };
            let current = node.project(visible);
            let entries = match scope.sent.get(&id) {
                Some(_) if refreshed.contains(&id) => current
                    .entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Some(value.clone())))
                    .collect(),
                Some(previous) => changed_entries(previous, &current),
                None => continue,
            };
            if !entries.is_empty() {
                records.push(DeltaRecord::Change { id, entries });
            }
            scope.sent.insert(id, current);
        }

        // Removals, children before the containers that held them
        let removed = post_order(&left, |id| {
            scope
                .sent
                .get(id)
                .map(|snapshot| snapshot.references().collect())
                .unwrap_or_default()
        });
        for id in removed {
            scope.sent.remove(&id);
            records.push(DeltaRecord::Remove { id });
        }

        let version = tree.version();
        scope.synced = Some(version);
        if !records.is_empty() {
            scope.last_sent = Some(version);
            trace!("DeltaEngine: {} record(s) at {}", records.len(), version);
        }

        Patch {
            root: tree.root(),
            base,
            version,
            records,
        }
    }
}

fn close_over(tree: &StateTree, reach: &mut ReachSet, start: impl IntoIterator<Item = NodeId>) {
    let mut stack: Vec<NodeId> = start.into_iter().collect();
    while let Some(id) = stack.pop() {
        let Some(node) = tree.node(&id) else {
            continue;
        };
        if !reach.insert(id) {
            continue;
        }
        stack.extend(node.followed_children());
    }
}

// Orders `nodes` so that every node comes after the members of `nodes` it
// refers to. References leaving the set are ignored.
fn post_order(nodes: &ReachSet, references: impl Fn(&NodeId) -> Vec<NodeId>) -> Vec<NodeId> {
    let mut ordered = Vec::with_capacity(nodes.len());
    let mut visited = BTreeSet::new();
    for start in nodes {
        if visited.contains(start) {
            continue;
        }
        let mut stack = vec![(*start, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                ordered.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            for child in references(&id).into_iter().rev() {
                if nodes.contains(&child) && !visited.contains(&child) {
                    stack.push((child, false));
                }
            }
        }
    }
    ordered
}

fn changed_entries(previous: &NodeSnapshot, current: &NodeSnapshot) -> Vec<(Key, Option<Value>)> {
    let mut entries = Vec::new();
    for (key, value) in &current.entries {
        if previous.entries.get(key) != Some(value) {
            entries.push((key.clone(), Some(value.clone())));
        }
    }
    for key in previous.entries.keys() {
        if !current.entries.contains_key(key) {
            entries.push((key.clone(), None));
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}
