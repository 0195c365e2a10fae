//! Module declarations and descriptors
//!
//! A [`ModuleDecl`] is what feature authors write: a name, an update
//! function, named accessors, child declarations and the event labels the
//! module emits. The builder turns declarations into normalized
//! [`ModuleDescriptor`]s arranged in a
//! [`CompositionTree`](crate::tree::CompositionTree).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::event::{Event, EventId};
use crate::state::StateNode;

/// The slice of state a module owns: domain `data` plus view-facing `ui` flags.
///
/// Child slots are not part of it; an update function can only ever touch
/// its own `data` and `ui`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalState {
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default = "empty_object")]
    pub ui: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Default for LocalState {
    fn default() -> Self {
        Self {
            data: empty_object(),
            ui: empty_object(),
        }
    }
}

impl LocalState {
    pub fn new(data: Value, ui: Value) -> Self {
        Self { data, ui }
    }

    /// Look up a value by pointer rooted at the slice, e.g. `/ui/isLoading`
    /// or `/data/articles/0`. The bare pointers `/data` and `/ui` return the
    /// sections themselves.
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        let (section, rest) = self.section(pointer)?;
        if rest.is_empty() {
            Some(section)
        } else {
            section.pointer(rest)
        }
    }

    /// Set a value by pointer, creating intermediate objects as needed.
    ///
    /// Returns `false` if the pointer does not start with `/data` or `/ui`,
    /// or crosses a non-container value.
    pub fn set(&mut self, pointer: &str, value: Value) -> bool {
        let Some((head, rest)) = split_section(pointer) else {
            return false;
        };
        let section = match head {
            "data" => &mut self.data,
            "ui" => &mut self.ui,
            _ => return false,
        };
        set_pointer(section, rest, value)
    }

    /// Read a boolean flag from `ui`, treating missing as `false`.
    pub fn ui_flag(&self, key: &str) -> bool {
        self.ui.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn section<'s, 'p>(&'s self, pointer: &'p str) -> Option<(&'s Value, &'p str)> {
        let (head, rest) = split_section(pointer)?;
        match head {
            "data" => Some((&self.data, rest)),
            "ui" => Some((&self.ui, rest)),
            _ => None,
        }
    }
}

/// Split `/data/a/b` into `("data", "/a/b")`.
fn split_section(pointer: &str) -> Option<(&str, &str)> {
    let body = pointer.strip_prefix('/')?;
    match body.find('/') {
        Some(idx) => Some((&body[..idx], &body[idx..])),
        None => Some((body, "")),
    }
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn set_pointer(target: &mut Value, pointer: &str, value: Value) -> bool {
    if pointer.is_empty() {
        *target = value;
        return true;
    }
    let tokens: Vec<String> = pointer.split('/').skip(1).map(unescape).collect();
    let (last, parents) = match tokens.split_last() {
        Some(split) => split,
        None => return false,
    };

    let mut cursor = target;
    for token in parents {
        if cursor.is_null() {
            *cursor = empty_object();
        }
        cursor = match cursor {
            Value::Object(map) => map.entry(token.clone()).or_insert(Value::Null),
            Value::Array(items) => match token.parse::<usize>() {
                Ok(i) if i < items.len() => &mut items[i],
                _ => return false,
            },
            _ => return false,
        };
    }

    if cursor.is_null() {
        *cursor = empty_object();
    }
    match cursor {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            true
        }
        Value::Array(items) => match last.parse::<usize>() {
            Ok(i) if i < items.len() => {
                items[i] = value;
                true
            }
            Ok(i) if i == items.len() => {
                items.push(value);
                true
            }
            _ if last == "-" => {
                items.push(value);
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// A module's update function.
///
/// Must be pure and total: it receives only the module's own slice and
/// returns `Some(new_state)` when the event changes it, or `None` to leave
/// the slice untouched (the answer for every event it does not recognize).
pub trait Update: Send + Sync {
    fn update(&self, state: &LocalState, event: &Event) -> Option<LocalState>;
}

impl<F> Update for F
where
    F: Fn(&LocalState, &Event) -> Option<LocalState> + Send + Sync,
{
    fn update(&self, state: &LocalState, event: &Event) -> Option<LocalState> {
        self(state, event)
    }
}

/// Pure read function evaluated against its owning module's slot (which
/// includes the slots of that module's descendants).
pub type AccessorFn = Arc<dyn Fn(&StateNode) -> Value + Send + Sync>;

/// A module as written by its author, before validation
#[derive(Clone)]
pub struct ModuleDecl {
    pub(crate) name: String,
    pub(crate) initial: LocalState,
    pub(crate) update: Option<Arc<dyn Update>>,
    pub(crate) accessors: Vec<(String, AccessorFn)>,
    pub(crate) children: Vec<ModuleDecl>,
    pub(crate) emits: Vec<String>,
    pub(crate) reacts_to: Vec<String>,
    pub(crate) reads: Vec<String>,
}

impl ModuleDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: LocalState::default(),
            update: None,
            accessors: Vec::new(),
            children: Vec::new(),
            emits: Vec::new(),
            reacts_to: Vec::new(),
            reads: Vec::new(),
        }
    }

    /// Root declaration for the application itself (namespace `APP`)
    pub fn app() -> Self {
        Self::new(crate::namespace::APP_NAMESPACE)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial(mut self, initial: LocalState) -> Self {
        self.initial = initial;
        self
    }

    pub fn update<U: Update + 'static>(mut self, update: U) -> Self {
        self.update = Some(Arc::new(update));
        self
    }

    pub(crate) fn update_arc(mut self, update: Arc<dyn Update>) -> Self {
        self.update = Some(update);
        self
    }

    pub fn accessor<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&StateNode) -> Value + Send + Sync + 'static,
    {
        self.accessors.push((name.into(), Arc::new(accessor)));
        self
    }

    pub fn child(mut self, child: ModuleDecl) -> Self {
        self.children.push(child);
        self
    }

    /// Declare a local event label this module produces
    pub fn emits(mut self, label: impl Into<String>) -> Self {
        self.emits.push(label.into());
        self
    }

    /// Opt in to events of a descendant namespace
    pub fn reacts_to(mut self, namespace: impl Into<String>) -> Self {
        self.reacts_to.push(namespace.into());
        self
    }

    /// Declare a dependency on `OWNER.accessor`, checked at build time
    pub fn reads(mut self, accessor: impl Into<String>) -> Self {
        self.reads.push(accessor.into());
        self
    }
}

impl fmt::Debug for ModuleDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDecl")
            .field("name", &self.name)
            .field("accessors", &self.accessors.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("children", &self.children)
            .field("emits", &self.emits)
            .finish_non_exhaustive()
    }
}

/// A validated module inside a composition tree
#[derive(Clone)]
pub struct ModuleDescriptor {
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) initial: Arc<LocalState>,
    pub(crate) update: Option<Arc<dyn Update>>,
    pub(crate) accessors: BTreeMap<String, AccessorFn>,
    pub(crate) emits: BTreeSet<EventId>,
    pub(crate) reacts_to: BTreeSet<String>,
    pub(crate) reads: Vec<String>,
}

impl ModuleDescriptor {
    /// Uppercase module name, also the state-tree key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Event namespace (`APP` for the root, the name otherwise)
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn initial(&self) -> &LocalState {
        &self.initial
    }

    pub fn accessor(&self, name: &str) -> Option<&AccessorFn> {
        self.accessors.get(name)
    }

    pub fn accessor_names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    pub fn emits(&self) -> &BTreeSet<EventId> {
        &self.emits
    }

    pub fn reacts_to(&self) -> &BTreeSet<String> {
        &self.reacts_to
    }

    pub(crate) fn run_update(&self, state: &LocalState, event: &Event) -> Option<LocalState> {
        self.update.as_ref().and_then(|u| u.update(state, event))
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("accessors", &self.accessors.keys().collect::<Vec<_>>())
            .field("emits", &self.emits)
            .field("reacts_to", &self.reacts_to)
            .finish_non_exhaustive()
    }
}
