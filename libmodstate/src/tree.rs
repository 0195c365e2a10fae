//! Composition tree builder
//!
//! Turns a nested [`ModuleDecl`] into a validated, immutable
//! [`CompositionTree`]. Validation happens once, here, so a structurally
//! invalid tree never reaches dispatch:
//!
//! 1. names are normalized to uppercase (`InvalidName` otherwise),
//! 2. siblings must have distinct names (`DuplicateModule`),
//! 3. children are built completely before their parent is accepted.
//!
//! After the structure is in place the tree registers every namespace and
//! every declared event label with its [`Namespacer`], and checks the
//! declared ancestor reactions and accessor reads.
//!
//! Modules live in an index arena. Only the tree knows parents and
//! children; descriptors never point at each other.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::BuildError;
use crate::guard::AccessorRef;
use crate::module::{ModuleDecl, ModuleDescriptor};
use crate::namespace::{normalize_name, Namespacer, APP_NAMESPACE};

/// Position of a module as the names below the root, e.g. `USER.ARTICLE`.
/// The root itself is the empty path and displays as `APP`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    pub fn root() -> Self {
        ModulePath(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ModulePath(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        ModulePath(segments)
    }

    /// True if `self` is `other` or one of its ancestors
    pub fn is_prefix_of(&self, other: &ModulePath) -> bool {
        other.0.starts_with(&self.0)
    }

    /// True if one path is a prefix of the other (same line of descent)
    pub fn is_lineal(&self, other: &ModulePath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str(APP_NAMESPACE)
        } else {
            f.write_str(&self.0.join("."))
        }
    }
}

impl FromStr for ModulePath {
    type Err = BuildError;

    /// Parse `USER.ARTICLE` (case-insensitive); `APP`, `APP.USER` and the
    /// empty string are accepted for the root and its descendants.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(ModulePath::root());
        }
        let mut segments = Vec::new();
        for raw in trimmed.split('.') {
            segments.push(normalize_name(raw, trimmed)?);
        }
        if segments.first().map(String::as_str) == Some(APP_NAMESPACE) {
            segments.remove(0);
        }
        Ok(ModulePath(segments))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

/// A module's place in the arena
#[derive(Debug, Clone)]
pub struct ModuleNode {
    id: NodeId,
    descriptor: ModuleDescriptor,
    path: ModulePath,
    slots: Vec<usize>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ModuleNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn path(&self) -> &ModulePath {
        &self.path
    }

    /// Positional path from the root, used to walk snapshots in O(depth)
    pub(crate) fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Validated module hierarchy plus its lookup indexes
#[derive(Debug, Clone)]
pub struct CompositionTree {
    nodes: Vec<ModuleNode>,
    index: HashMap<ModulePath, NodeId>,
    namespaces: HashMap<String, NodeId>,
    namespacer: Namespacer,
}

/// Build a composition tree from the root declaration
pub fn build(root: ModuleDecl) -> Result<CompositionTree, BuildError> {
    CompositionTree::build(root)
}

/// Declaration that passed name and sibling checks, children first
struct Assembled {
    descriptor: ModuleDescriptor,
    emits: Vec<String>,
    children: Vec<Assembled>,
}

fn assemble(decl: ModuleDecl, parent: Option<&ModulePath>) -> Result<Assembled, BuildError> {
    let context = match parent {
        Some(p) => p.to_string(),
        None => "root".to_string(),
    };
    let name = normalize_name(&decl.name, &context)?;
    let path = match parent {
        Some(p) => {
            if name == APP_NAMESPACE {
                return Err(BuildError::InvalidName {
                    name: decl.name.clone(),
                    path: format!("{} (APP is reserved for the root)", context),
                });
            }
            p.join(&name)
        }
        None => ModulePath::root(),
    };

    let mut seen = HashSet::new();
    for child in &decl.children {
        let child_name = normalize_name(&child.name, &path.to_string())?;
        if !seen.insert(child_name.clone()) {
            return Err(BuildError::DuplicateModule {
                path: path.join(&child_name).to_string(),
            });
        }
    }

    let mut accessors = BTreeMap::new();
    for (accessor, f) in decl.accessors {
        if accessor.is_empty() || accessor.contains('.') || accessor.contains(char::is_whitespace) {
            return Err(BuildError::InvalidName {
                name: accessor,
                path: path.to_string(),
            });
        }
        if accessors.insert(accessor.clone(), f).is_some() {
            return Err(BuildError::DuplicateAccessor {
                module: path.to_string(),
                accessor,
            });
        }
    }

    let children = decl
        .children
        .into_iter()
        .map(|child| assemble(child, Some(&path)))
        .collect::<Result<Vec<_>, _>>()?;

    let namespace = if parent.is_some() {
        name.clone()
    } else {
        APP_NAMESPACE.to_string()
    };

    Ok(Assembled {
        descriptor: ModuleDescriptor {
            name,
            namespace,
            initial: std::sync::Arc::new(decl.initial),
            update: decl.update,
            accessors,
            emits: Default::default(),
            reacts_to: decl.reacts_to.into_iter().collect(),
            reads: decl.reads,
        },
        emits: decl.emits,
        children,
    })
}

impl CompositionTree {
    pub fn build(root: ModuleDecl) -> Result<Self, BuildError> {
        let assembled = assemble(root, None)?;

        let mut tree = CompositionTree {
            nodes: Vec::new(),
            index: HashMap::new(),
            namespaces: HashMap::new(),
            namespacer: Namespacer::new(),
        };
        let mut pending_emits = Vec::new();
        tree.attach(assembled, None, ModulePath::root(), Vec::new(), &mut pending_emits);

        tree.register_namespaces()?;
        for (id, labels) in pending_emits {
            tree.register_emits(id, labels)?;
        }
        tree.check_reactions()?;
        tree.check_reads()?;

        tracing::debug!(
            modules = tree.nodes.len(),
            events = tree.namespacer.event_ids().count(),
            "composition tree built"
        );
        Ok(tree)
    }

    fn attach(
        &mut self,
        assembled: Assembled,
        parent: Option<NodeId>,
        path: ModulePath,
        slots: Vec<usize>,
        pending_emits: &mut Vec<(NodeId, Vec<String>)>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ModuleNode {
            id,
            descriptor: assembled.descriptor,
            path: path.clone(),
            slots: slots.clone(),
            parent,
            children: Vec::new(),
        });
        self.index.insert(path.clone(), id);
        pending_emits.push((id, assembled.emits));

        for (position, child) in assembled.children.into_iter().enumerate() {
            let child_path = path.join(&child.descriptor.name);
            let mut child_slots = slots.clone();
            child_slots.push(position);
            let child_id = self.attach(child, Some(id), child_path, child_slots, pending_emits);
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    fn register_namespaces(&mut self) -> Result<(), BuildError> {
        for node in &self.nodes {
            let namespace = node.descriptor.namespace.clone();
            if let Some(&existing) = self.namespaces.get(&namespace) {
                return Err(BuildError::DuplicateNamespace {
                    namespace,
                    first: self.nodes[existing.0].path.to_string(),
                    second: node.path.to_string(),
                });
            }
            self.namespacer.register_namespace(&namespace);
            self.namespaces.insert(namespace, node.id);
        }
        Ok(())
    }

    fn register_emits(&mut self, id: NodeId, labels: Vec<String>) -> Result<(), BuildError> {
        let namespace = self.nodes[id.0].descriptor.namespace.clone();
        for label in labels {
            let event_id = self.namespacer.derive_event_id(&namespace, &label)?;
            self.nodes[id.0].descriptor.emits.insert(event_id);
        }
        Ok(())
    }

    fn check_reactions(&mut self) -> Result<(), BuildError> {
        for i in 0..self.nodes.len() {
            let raw: Vec<String> = self.nodes[i].descriptor.reacts_to.iter().cloned().collect();
            let mut normalized = std::collections::BTreeSet::new();
            for namespace in raw {
                let module = self.nodes[i].path.to_string();
                let invalid = || BuildError::InvalidReaction {
                    module: module.clone(),
                    namespace: namespace.clone(),
                };
                let target = normalize_name(&namespace, &module)
                    .ok()
                    .and_then(|ns| self.namespaces.get(&ns).map(|&id| (ns, id)))
                    .ok_or_else(invalid)?;
                let target_path = &self.nodes[(target.1).0].path;
                let own_path = &self.nodes[i].path;
                if !(own_path.is_prefix_of(target_path) && target_path.len() > own_path.len()) {
                    return Err(invalid());
                }
                normalized.insert(target.0);
            }
            self.nodes[i].descriptor.reacts_to = normalized;
        }
        Ok(())
    }

    fn check_reads(&self) -> Result<(), BuildError> {
        for node in &self.nodes {
            for reference in &node.descriptor.reads {
                let module = node.path.to_string();
                let unknown = || BuildError::UnknownAccessor {
                    module: module.clone(),
                    accessor: reference.clone(),
                };
                let accessor: AccessorRef = reference.parse().map_err(|_| unknown())?;
                let owner = self.by_namespace(&accessor.owner).ok_or_else(unknown)?;
                if owner.descriptor.accessor(&accessor.name).is_none() {
                    return Err(unknown());
                }
                if !owner.path.is_lineal(&node.path) {
                    return Err(BuildError::Visibility {
                        module,
                        accessor: accessor.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &ModuleNode {
        &self.nodes[NodeId::ROOT.0]
    }

    pub fn node(&self, id: NodeId) -> Option<&ModuleNode> {
        self.nodes.get(id.0)
    }

    /// All modules in pre-order (root first)
    pub fn nodes(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Module at a name path
    pub fn resolve(&self, path: &ModulePath) -> Option<&ModuleNode> {
        self.index.get(path).and_then(|&id| self.node(id))
    }

    /// Module owning an event namespace (`APP` is the root)
    pub fn by_namespace(&self, namespace: &str) -> Option<&ModuleNode> {
        self.namespaces.get(namespace).and_then(|&id| self.node(id))
    }

    /// Ancestors of a module, nearest first, ending at the root
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &ModuleNode> {
        let mut next = self.node(id).and_then(|n| n.parent);
        std::iter::from_fn(move || {
            let node = self.node(next?)?;
            next = node.parent;
            Some(node)
        })
    }

    pub fn namespacer(&self) -> &Namespacer {
        &self.namespacer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ModuleDecl {
        ModuleDecl::app()
            .emits("user_fetch")
            .child(
                ModuleDecl::new("user")
                    .emits("LOADING_START")
                    .child(ModuleDecl::new("article").accessor("articleCount", |_| json!(0))),
            )
            .child(ModuleDecl::new("Payment"))
    }

    #[test]
    fn test_build_normalizes_and_indexes() {
        let tree = build(sample()).unwrap();
        assert_eq!(tree.len(), 4);

        let article = tree.resolve(&"user.article".parse().unwrap()).unwrap();
        assert_eq!(article.descriptor().name(), "ARTICLE");
        assert_eq!(article.path().to_string(), "USER.ARTICLE");
        assert_eq!(article.slots(), &[0, 0]);

        let payment = tree.by_namespace("PAYMENT").unwrap();
        assert_eq!(payment.slots(), &[1]);
        assert_eq!(tree.by_namespace("APP").unwrap().id(), NodeId::ROOT);
    }

    #[test]
    fn test_emits_are_registered() {
        let tree = build(sample()).unwrap();
        let ids: Vec<String> = tree.namespacer().event_ids().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["APP/USER_FETCH", "USER/LOADING_START"]);
        assert!(tree.root().descriptor().emits().iter().any(|id| id == "APP/USER_FETCH"));
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let tree = build(sample()).unwrap();
        let article = tree.by_namespace("ARTICLE").unwrap();
        let names: Vec<&str> = tree
            .ancestors(article.id())
            .map(|n| n.descriptor().namespace())
            .collect();
        assert_eq!(names, vec!["USER", "APP"]);
        assert_eq!(tree.ancestors(NodeId::ROOT).count(), 0);
    }

    #[test]
    fn test_invalid_name() {
        let decl = ModuleDecl::app().child(ModuleDecl::new("user-profile"));
        assert!(matches!(
            build(decl),
            Err(BuildError::InvalidName { name, .. }) if name == "user-profile"
        ));
    }

    #[test]
    fn test_app_is_reserved_below_root() {
        let decl = ModuleDecl::app().child(ModuleDecl::new("app"));
        assert!(matches!(build(decl), Err(BuildError::InvalidName { .. })));
    }

    #[test]
    fn test_duplicate_siblings_after_normalization() {
        let decl = ModuleDecl::app().child(
            ModuleDecl::new("user")
                .child(ModuleDecl::new("list"))
                .child(ModuleDecl::new("LIST")),
        );
        assert_eq!(
            build(decl).unwrap_err(),
            BuildError::DuplicateModule {
                path: "USER.LIST".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_namespace_across_branches() {
        let decl = ModuleDecl::app()
            .child(ModuleDecl::new("user").child(ModuleDecl::new("list")))
            .child(ModuleDecl::new("payment").child(ModuleDecl::new("list")));
        assert_eq!(
            build(decl).unwrap_err(),
            BuildError::DuplicateNamespace {
                namespace: "LIST".to_string(),
                first: "USER.LIST".to_string(),
                second: "PAYMENT.LIST".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_emitted_label() {
        let decl = ModuleDecl::app().child(ModuleDecl::new("user").emits("FETCH").emits("fetch"));
        assert_eq!(
            build(decl).unwrap_err(),
            BuildError::DuplicateEvent("USER/FETCH".to_string())
        );
    }

    #[test]
    fn test_duplicate_accessor() {
        let decl = ModuleDecl::app()
            .accessor("count", |_| json!(1))
            .accessor("count", |_| json!(2));
        assert!(matches!(build(decl), Err(BuildError::DuplicateAccessor { .. })));
    }

    #[test]
    fn test_child_errors_surface_before_parent_reads() {
        // The broken grandchild is reported even though the root also
        // declares an unknown read.
        let decl = ModuleDecl::app()
            .reads("NOPE.x")
            .child(ModuleDecl::new("user").child(ModuleDecl::new("")));
        assert!(matches!(build(decl), Err(BuildError::InvalidName { .. })));
    }

    #[test]
    fn test_reactions_must_target_descendants() {
        let ok = ModuleDecl::app()
            .reacts_to("article")
            .child(ModuleDecl::new("user").child(ModuleDecl::new("article")));
        let tree = build(ok).unwrap();
        assert!(tree.root().descriptor().reacts_to().contains("ARTICLE"));

        let sibling = ModuleDecl::app()
            .child(ModuleDecl::new("user").reacts_to("payment"))
            .child(ModuleDecl::new("payment"));
        assert!(matches!(build(sibling), Err(BuildError::InvalidReaction { .. })));

        let own = ModuleDecl::app().child(ModuleDecl::new("user").reacts_to("user"));
        assert!(matches!(build(own), Err(BuildError::InvalidReaction { .. })));

        let unknown = ModuleDecl::app().reacts_to("ghost");
        assert!(matches!(build(unknown), Err(BuildError::InvalidReaction { .. })));
    }

    #[test]
    fn test_reads_are_checked_statically() {
        let base = || {
            ModuleDecl::app()
                .accessor("isReady", |_| json!(true))
                .child(ModuleDecl::new("user").child(
                    ModuleDecl::new("article").accessor("articleCount", |_| json!(0)),
                ))
                .child(ModuleDecl::new("payment"))
        };

        assert!(build(base().reads("ARTICLE.articleCount")).is_ok());

        let decl = ModuleDecl::app()
            .accessor("isReady", |_| json!(true))
            .child(
                ModuleDecl::new("user")
                    .reads("APP.isReady")
                    .child(ModuleDecl::new("article").accessor("articleCount", |_| json!(0))),
            )
            .child(ModuleDecl::new("payment").reads("ARTICLE.articleCount"));
        assert_eq!(
            build(decl).unwrap_err(),
            BuildError::Visibility {
                module: "PAYMENT".to_string(),
                accessor: "ARTICLE.articleCount".to_string(),
            }
        );

        assert!(matches!(
            build(base().reads("ARTICLE.missing")),
            Err(BuildError::UnknownAccessor { .. })
        ));
        assert!(matches!(
            build(base().reads("no-dot")),
            Err(BuildError::UnknownAccessor { .. })
        ));
    }

    #[test]
    fn test_module_path_parsing_and_relations() {
        let article: ModulePath = "APP.user.article".parse().unwrap();
        let user: ModulePath = "USER".parse().unwrap();
        let payment: ModulePath = "payment".parse().unwrap();

        assert_eq!(article, ModulePath::from_segments(["USER", "ARTICLE"]));
        assert!(user.is_prefix_of(&article));
        assert!(article.is_lineal(&user));
        assert!(!payment.is_lineal(&article));
        assert!(ModulePath::root().is_prefix_of(&payment));
        assert!(!article.is_prefix_of(&user));
        assert_eq!("APP".parse::<ModulePath>().unwrap(), ModulePath::root());
        assert_eq!(ModulePath::root().to_string(), "APP");
    }
}
