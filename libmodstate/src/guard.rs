//! Visibility guard
//!
//! Reads may only travel along a line of descent. A module may use any
//! accessor declared by itself or by one of its ancestors, and (because its
//! own slot contains theirs) accessors declared by its descendants. An
//! accessor owned by a sibling or cousin subtree is rejected with
//! [`AccessError::Visibility`].
//!
//! The rule is checked statically for declared `reads` when the tree is
//! built, once more when a [`Capability`] or [`Selector`] is created, and
//! again on every call, since selectors can be handed to code the builder
//! never saw.

use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::AccessError;
use crate::namespace::normalize_name;
use crate::state::StateNode;
use crate::tree::{CompositionTree, ModuleNode, ModulePath};

/// Reference to an accessor as `OWNER.accessor`, where `OWNER` is the
/// owning module's namespace (`APP` for the root)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccessorRef {
    pub owner: String,
    pub name: String,
}

impl AccessorRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        let owner: String = owner.into();
        Self {
            owner: owner.to_ascii_uppercase(),
            name: name.into(),
        }
    }
}

impl FromStr for AccessorRef {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AccessError::MalformedReference(s.to_string());
        let (owner, name) = s.trim().rsplit_once('.').ok_or_else(malformed)?;
        let owner = normalize_name(owner, "accessor reference").map_err(|_| malformed())?;
        if name.is_empty() {
            return Err(malformed());
        }
        Ok(AccessorRef {
            owner,
            name: name.to_string(),
        })
    }
}

impl fmt::Display for AccessorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

fn requester_node<'t>(
    tree: &'t CompositionTree,
    requesting: &ModulePath,
) -> Result<&'t ModuleNode, AccessError> {
    tree.resolve(requesting)
        .ok_or_else(|| AccessError::UnknownModule(requesting.to_string()))
}

/// Check that `requesting` may read `accessor`, returning the owner's node
fn authorize<'t>(
    tree: &'t CompositionTree,
    requesting: &ModulePath,
    accessor: &AccessorRef,
) -> Result<&'t ModuleNode, AccessError> {
    let requester = requester_node(tree, requesting)?;
    let owner = tree
        .by_namespace(&accessor.owner)
        .ok_or_else(|| AccessError::UnknownModule(accessor.owner.clone()))?;
    if owner.descriptor().accessor(&accessor.name).is_none() {
        return Err(AccessError::UnknownAccessor(accessor.to_string()));
    }
    if !owner.path().is_lineal(requester.path()) {
        tracing::debug!(
            requester = %requester.path(),
            accessor = %accessor,
            "rejected cross-branch read"
        );
        return Err(AccessError::Visibility {
            requester: requester.path().to_string(),
            accessor: accessor.to_string(),
        });
    }
    Ok(owner)
}

fn evaluate(
    owner: &ModuleNode,
    accessor: &AccessorRef,
    state: &StateNode,
) -> Result<Value, AccessError> {
    let slot = state
        .at(owner.path())
        .ok_or_else(|| AccessError::MissingSlot(owner.path().to_string()))?;
    let f = owner
        .descriptor()
        .accessor(&accessor.name)
        .ok_or_else(|| AccessError::UnknownAccessor(accessor.to_string()))?;
    Ok(f(slot))
}

/// Evaluate `accessor` on behalf of the module at `requesting`.
///
/// The accessor runs against its owner's slot in `state`.
pub fn resolve_accessor(
    tree: &CompositionTree,
    requesting: &ModulePath,
    accessor: &AccessorRef,
    state: &StateNode,
) -> Result<Value, AccessError> {
    let owner = authorize(tree, requesting, accessor)?;
    evaluate(owner, accessor, state)
}

/// Every accessor the module at `requesting` may read
pub fn readable_accessors(
    tree: &CompositionTree,
    requesting: &ModulePath,
) -> Result<BTreeSet<AccessorRef>, AccessError> {
    let requester = requester_node(tree, requesting)?;
    Ok(tree
        .nodes()
        .filter(|node| node.path().is_lineal(requester.path()))
        .flat_map(|node| {
            node.descriptor()
                .accessor_names()
                .map(|name| AccessorRef::new(node.descriptor().namespace(), name))
                .collect::<Vec<_>>()
        })
        .collect())
}

/// Read capability handed to one module.
///
/// Built once from the tree; it lists exactly the accessors on the module's
/// line of descent, so reads through it need no further tree walk.
#[derive(Clone)]
pub struct Capability {
    tree: Arc<CompositionTree>,
    requester: ModulePath,
    readable: BTreeSet<AccessorRef>,
}

impl Capability {
    pub fn new(tree: Arc<CompositionTree>, requester: ModulePath) -> Result<Self, AccessError> {
        let readable = readable_accessors(&tree, &requester)?;
        Ok(Self {
            tree,
            requester,
            readable,
        })
    }

    pub fn requester(&self) -> &ModulePath {
        &self.requester
    }

    pub fn can_read(&self, accessor: &AccessorRef) -> bool {
        self.readable.contains(accessor)
    }

    pub fn readable(&self) -> impl Iterator<Item = &AccessorRef> {
        self.readable.iter()
    }

    pub fn read(&self, accessor: &AccessorRef, state: &StateNode) -> Result<Value, AccessError> {
        if !self.can_read(accessor) {
            // Distinguish a forbidden accessor from one that does not exist.
            authorize(&self.tree, &self.requester, accessor)?;
        }
        let owner = self
            .tree
            .by_namespace(&accessor.owner)
            .ok_or_else(|| AccessError::UnknownModule(accessor.owner.clone()))?;
        evaluate(owner, accessor, state)
    }

    /// A selector bound to this capability's requester
    pub fn selector(&self, accessor: AccessorRef) -> Result<Selector, AccessError> {
        Selector::new(Arc::clone(&self.tree), self.requester.clone(), accessor)
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("requester", &self.requester)
            .field("readable", &self.readable)
            .finish()
    }
}

/// Accessor closed over its requester, safe to pass around
#[derive(Clone)]
pub struct Selector {
    tree: Arc<CompositionTree>,
    requester: ModulePath,
    accessor: AccessorRef,
}

impl Selector {
    pub fn new(
        tree: Arc<CompositionTree>,
        requester: ModulePath,
        accessor: AccessorRef,
    ) -> Result<Self, AccessError> {
        authorize(&tree, &requester, &accessor)?;
        Ok(Self {
            tree,
            requester,
            accessor,
        })
    }

    pub fn accessor(&self) -> &AccessorRef {
        &self.accessor
    }

    pub fn requester(&self) -> &ModulePath {
        &self.requester
    }

    /// Evaluate against a snapshot, re-checking visibility
    pub fn select(&self, state: &StateNode) -> Result<Value, AccessError> {
        resolve_accessor(&self.tree, &self.requester, &self.accessor, state)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("requester", &self.requester)
            .field("accessor", &self.accessor)
            .finish()
    }
}
