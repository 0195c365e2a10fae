//! State reducer composer
//!
//! [`compose`] walks a [`CompositionTree`] once and produces a single
//! [`ComposedReducer`] for the whole application:
//!
//! `(GlobalState, Event) -> GlobalState`
//!
//! Routing is by namespace. The owning module's update runs first on its
//! own slice, then every ancestor that opted in with `reacts_to`, nearest
//! ancestor first up to the root. Each update only ever sees its own
//! [`LocalState`]. The results are spliced into a new snapshot that shares
//! every untouched subtree with the previous one.
//!
//! Events whose namespace nobody owns, and events that no update changes,
//! return the input snapshot itself (same `Arc`).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AccessError;
use crate::event::Event;
use crate::guard::{AccessorRef, Capability, Selector};
use crate::module::LocalState;
use crate::state::{GlobalState, StateNode};
use crate::tree::{CompositionTree, ModulePath, NodeId};

/// Result of applying one event
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Snapshot after the event (the input snapshot if nothing changed)
    pub state: GlobalState,
    /// Module owning the event's namespace, `None` if unhandled
    pub owner: Option<ModulePath>,
    /// Modules whose slice changed, in application order
    pub changed: Vec<ModulePath>,
}

impl DispatchOutcome {
    fn unhandled(state: &GlobalState) -> Self {
        Self {
            state: Arc::clone(state),
            owner: None,
            changed: Vec::new(),
        }
    }

    pub fn is_handled(&self) -> bool {
        self.owner.is_some()
    }

    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Owner of a namespace plus the ancestors reacting to it
#[derive(Debug, Clone)]
struct Route {
    chain: Vec<NodeId>,
}

struct Inner {
    tree: Arc<CompositionTree>,
    routes: HashMap<String, Route>,
    capabilities: HashMap<ModulePath, Capability>,
}

/// The application's single update function
#[derive(Clone)]
pub struct ComposedReducer {
    inner: Arc<Inner>,
}

/// Compose the update function for a finished tree
pub fn compose(tree: impl Into<Arc<CompositionTree>>) -> ComposedReducer {
    let tree = tree.into();
    let mut routes = HashMap::new();

    for node in tree.nodes() {
        let namespace = node.descriptor().namespace();
        let mut chain = vec![node.id()];
        chain.extend(
            tree.ancestors(node.id())
                .filter(|ancestor| ancestor.descriptor().reacts_to().contains(namespace))
                .map(|ancestor| ancestor.id()),
        );
        routes.insert(namespace.to_string(), Route { chain });
    }

    let capabilities = tree
        .nodes()
        .filter_map(|node| {
            let capability = Capability::new(Arc::clone(&tree), node.path().clone()).ok()?;
            Some((node.path().clone(), capability))
        })
        .collect();

    tracing::debug!(routes = routes.len(), "composed reducer");
    ComposedReducer {
        inner: Arc::new(Inner {
            tree,
            routes,
            capabilities,
        }),
    }
}

impl ComposedReducer {
    pub fn tree(&self) -> &Arc<CompositionTree> {
        &self.inner.tree
    }

    /// Snapshot built from every module's initial slice
    pub fn initial_state(&self) -> GlobalState {
        self.build_state(|_| None)
    }

    /// Snapshot for this tree that keeps the slices of `previous` wherever
    /// a module with the same path exists in both.
    pub fn carry_over(&self, previous: &StateNode) -> GlobalState {
        self.build_state(|path| previous.at(path).map(|node| Arc::clone(node.local_arc())))
    }

    fn build_state<F>(&self, existing: F) -> GlobalState
    where
        F: Fn(&ModulePath) -> Option<Arc<LocalState>>,
    {
        fn build<F>(tree: &CompositionTree, id: NodeId, existing: &F) -> Arc<StateNode>
        where
            F: Fn(&ModulePath) -> Option<Arc<LocalState>>,
        {
            let Some(node) = tree.node(id) else {
                return Arc::new(StateNode::new(Arc::new(LocalState::default()), Vec::new()));
            };
            let local = existing(node.path())
                .unwrap_or_else(|| Arc::clone(&node.descriptor().initial));
            let children = node
                .children()
                .iter()
                .filter_map(|&child| {
                    let name = tree.node(child)?.descriptor().name().to_string();
                    Some((name, build(tree, child, existing)))
                })
                .collect();
            Arc::new(StateNode::new(local, children))
        }
        build(&self.inner.tree, NodeId::ROOT, &existing)
    }

    /// Apply one event. Pure: the same `(state, event)` always yields an
    /// equal result.
    pub fn apply(&self, state: &GlobalState, event: &Event) -> DispatchOutcome {
        let tree = &self.inner.tree;
        let Some(route) = event
            .namespace()
            .and_then(|namespace| self.inner.routes.get(namespace))
        else {
            tracing::debug!(event = %event.id, "unhandled event");
            return DispatchOutcome::unhandled(state);
        };
        let Some(owner) = tree.node(route.chain[0]) else {
            return DispatchOutcome::unhandled(state);
        };
        if state.at_slots(owner.slots(), owner.path()).is_none() {
            tracing::warn!(
                event = %event.id,
                owner = %owner.path(),
                "snapshot has no matching slot for owning module, ignoring event"
            );
            return DispatchOutcome::unhandled(state);
        }

        if !tree.namespacer().contains(&event.id) {
            tracing::debug!(event = %event.id, "event id is not declared in emits");
        }

        let mut updates: Vec<Option<Arc<LocalState>>> = vec![None; owner.slots().len() + 1];
        let mut changed = Vec::new();

        for &id in &route.chain {
            let Some(node) = tree.node(id) else { continue };
            let Some(slot) = state.at_slots(node.slots(), node.path()) else {
                continue;
            };
            let current = slot.local();
            if let Some(next) = node.descriptor().run_update(current, event) {
                if next != *current {
                    updates[node.slots().len()] = Some(Arc::new(next));
                    changed.push(node.path().clone());
                }
            }
        }

        tracing::debug!(
            event = %event.id,
            owner = %owner.path(),
            changed = changed.len(),
            "applied event"
        );

        DispatchOutcome {
            state: state.splice(owner.slots(), &updates),
            owner: Some(owner.path().clone()),
            changed,
        }
    }

    /// [`apply`](Self::apply) returning only the new snapshot
    pub fn reduce(&self, state: &GlobalState, event: &Event) -> GlobalState {
        self.apply(state, event).state
    }

    /// Read capability for the module at `path`, built when the tree was
    /// composed
    pub fn capability(&self, path: &ModulePath) -> Result<Capability, AccessError> {
        self.inner
            .capabilities
            .get(path)
            .cloned()
            .ok_or_else(|| AccessError::UnknownModule(path.to_string()))
    }

    /// Selector for `accessor` as read from `path`
    pub fn selector(
        &self,
        path: &ModulePath,
        accessor: AccessorRef,
    ) -> Result<Selector, AccessError> {
        self.capability(path)?.selector(accessor)
    }
}

impl std::fmt::Debug for ComposedReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedReducer")
            .field("modules", &self.inner.tree.len())
            .field("routes", &self.inner.routes.len())
            .finish()
    }
}
