//! Immutable state snapshots
//!
//! The global state is a persistent tree of [`StateNode`]s. Each node holds
//! one module's [`LocalState`] plus the nodes of its children, in
//! declaration order. Nodes are shared through `Arc`; producing a new
//! snapshot only rebuilds the spine from the root to the changed module,
//! every other subtree is reused by reference.
//!
//! Serialized, a snapshot has the shape
//! `{ "data": .., "ui": .., "USER": { "data": .., "ui": .., "ARTICLE": {..} } }`
//! where the top level is the application root.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::sync::Arc;

use crate::module::LocalState;
use crate::tree::ModulePath;

/// A published snapshot of the whole tree
pub type GlobalState = Arc<StateNode>;

#[derive(Debug, Clone, PartialEq)]
pub struct StateNode {
    local: Arc<LocalState>,
    children: Vec<(String, Arc<StateNode>)>,
}

impl StateNode {
    pub(crate) fn new(local: Arc<LocalState>, children: Vec<(String, Arc<StateNode>)>) -> Self {
        Self { local, children }
    }

    pub fn local(&self) -> &LocalState {
        &self.local
    }

    pub(crate) fn local_arc(&self) -> &Arc<LocalState> {
        &self.local
    }

    pub fn data(&self) -> &Value {
        &self.local.data
    }

    pub fn ui(&self) -> &Value {
        &self.local.ui
    }

    /// Child slot by (uppercase) module name
    pub fn child(&self, name: &str) -> Option<&Arc<StateNode>> {
        self.children
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, node)| node)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Arc<StateNode>)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Slot at a name path below this node
    pub fn at(&self, path: &ModulePath) -> Option<&StateNode> {
        let mut node = self;
        for name in path.segments() {
            node = node.child(name)?;
        }
        Some(node)
    }

    /// Slot at the child positions `slots`, provided the key at every step
    /// matches the corresponding segment of `path`. A snapshot laid out by
    /// another tree yields `None` instead of a differently named slot.
    pub(crate) fn at_slots(&self, slots: &[usize], path: &ModulePath) -> Option<&StateNode> {
        if slots.len() != path.len() {
            return None;
        }
        let mut node = self;
        for (&idx, name) in slots.iter().zip(path.segments()) {
            let (key, child) = node.children.get(idx)?;
            if key != name {
                return None;
            }
            node = child;
        }
        Some(node)
    }

    /// Rebuild the spine along `slots`, replacing locals where
    /// `updates[depth]` is set. Siblings off the spine keep their `Arc`s.
    ///
    /// `updates` has one entry per depth from this node (0) down to the end
    /// of `slots`, which must already have been checked with `at_slots`.
    pub(crate) fn splice(
        self: &Arc<Self>,
        slots: &[usize],
        updates: &[Option<Arc<LocalState>>],
    ) -> Arc<StateNode> {
        if updates.iter().all(Option::is_none) {
            return Arc::clone(self);
        }
        let local = match updates.first() {
            Some(Some(local)) => Arc::clone(local),
            _ => Arc::clone(&self.local),
        };
        let mut children = self.children.clone();
        if let Some((&idx, rest)) = slots.split_first() {
            if let Some(entry) = children.get_mut(idx) {
                entry.1 = entry.1.splice(rest, updates.get(1..).unwrap_or_default());
            }
        }
        Arc::new(StateNode { local, children })
    }

    /// Render as a plain JSON value
    pub fn to_json(&self) -> Value {
        // Serializing a Value-only tree cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for StateNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.children.len()))?;
        map.serialize_entry("data", &self.local.data)?;
        map.serialize_entry("ui", &self.local.ui)?;
        for (name, child) in &self.children {
            map.serialize_entry(name, child.as_ref())?;
        }
        map.end()
    }
}
