//! Declarative module trees from TOML
//!
//! Lets a tree be described without writing Rust: update logic is a list of
//! rule handlers and accessors are pointer reads. The result is an ordinary
//! [`ModuleDecl`], validated by the same builder as hand-written modules.
//!
//! ```toml
//! name = "app"
//! emits = ["USER_FETCH"]
//!
//! [[children]]
//! name = "user"
//! emits = ["LOADING_START", "FETCH_SUCCESS"]
//!
//! [children.initial.ui]
//! isLoading = false
//!
//! [[children.on]]
//! event = "LOADING_START"
//! ops = [{ op = "set", path = "/ui/isLoading", value = true }]
//!
//! [[children.on]]
//! event = "FETCH_SUCCESS"
//! ops = [
//!     { op = "set_payload", path = "/data/profile" },
//!     { op = "set", path = "/ui/isLoading", value = false },
//! ]
//!
//! [children.accessors]
//! isLoading = { pointer = "/ui/isLoading" }
//! ```
//!
//! A handler's `event` is either a bare label (resolved in the module's own
//! namespace) or a full id such as `ARTICLE/FETCH` for ancestor reactions.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{DeclareError, Result};
use crate::event::Event;
use crate::module::{LocalState, ModuleDecl, Update};
use crate::namespace::{normalize_label, normalize_name, APP_NAMESPACE};
use crate::state::StateNode;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub emits: Vec<String>,
    #[serde(default)]
    pub reacts_to: Vec<String>,
    #[serde(default)]
    pub reads: Vec<String>,
    #[serde(default)]
    pub initial: LocalState,
    #[serde(default)]
    pub on: Vec<HandlerSpec>,
    #[serde(default)]
    pub accessors: BTreeMap<String, AccessorSpec>,
    #[serde(default)]
    pub children: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerSpec {
    pub event: String,
    pub ops: Vec<Op>,
}

/// One state edit. Paths are pointers rooted at the slice (`/data/..`,
/// `/ui/..`); `from` is a pointer into the event payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Set {
        path: String,
        value: Value,
    },
    SetPayload {
        path: String,
        #[serde(default)]
        from: Option<String>,
    },
    MergePayload {
        path: String,
    },
    AppendPayload {
        path: String,
    },
    Toggle {
        path: String,
    },
    Increment {
        path: String,
        #[serde(default = "one")]
        by: i64,
    },
    Reset,
}

fn one() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessorSpec {
    /// Value at a pointer in the owner's slice (`null` if absent)
    Pointer(String),
    /// Length of the array or object at a pointer (0 if absent)
    Count(String),
    /// Whether the value at a pointer is present and truthy
    Flag(String),
}

impl AccessorSpec {
    fn pointer(&self) -> &str {
        match self {
            AccessorSpec::Pointer(p) | AccessorSpec::Count(p) | AccessorSpec::Flag(p) => p.as_str(),
        }
    }

    fn evaluate(&self, node: &StateNode) -> Value {
        let value = node.local().get(self.pointer());
        match self {
            AccessorSpec::Pointer(_) => value.cloned().unwrap_or(Value::Null),
            AccessorSpec::Count(_) => Value::from(match value {
                Some(Value::Array(items)) => items.len(),
                Some(Value::Object(map)) => map.len(),
                _ => 0,
            }),
            AccessorSpec::Flag(_) => Value::Bool(match value {
                None | Some(Value::Null) => false,
                Some(Value::Bool(b)) => *b,
                Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Array(items)) => !items.is_empty(),
                Some(Value::Object(map)) => !map.is_empty(),
            }),
        }
    }
}

/// Update function interpreting [`HandlerSpec`]s
#[derive(Debug, Clone)]
pub struct RuleUpdate {
    initial: LocalState,
    handlers: Vec<(String, Vec<Op>)>,
}

impl RuleUpdate {
    fn apply_op(&self, state: &mut LocalState, op: &Op, event: &Event) {
        let applied = match op {
            Op::Set { path, value } => state.set(path, value.clone()),
            Op::SetPayload { path, from } => {
                let value = match from {
                    Some(pointer) => event.payload.pointer(pointer).cloned().unwrap_or(Value::Null),
                    None => event.payload.clone(),
                };
                state.set(path, value)
            }
            Op::MergePayload { path } => {
                let mut target = state.get(path).cloned().unwrap_or(Value::Null);
                match (&mut target, &event.payload) {
                    (Value::Object(existing), Value::Object(incoming)) => {
                        for (key, value) in incoming {
                            existing.insert(key.clone(), value.clone());
                        }
                    }
                    (slot, incoming) => *slot = incoming.clone(),
                }
                state.set(path, target)
            }
            Op::AppendPayload { path } => {
                let mut items = match state.get(path) {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                };
                items.push(event.payload.clone());
                state.set(path, Value::Array(items))
            }
            Op::Toggle { path } => {
                let current = state.get(path).and_then(Value::as_bool).unwrap_or(false);
                state.set(path, Value::Bool(!current))
            }
            Op::Increment { path, by } => {
                let current = state.get(path).and_then(Value::as_i64).unwrap_or(0);
                state.set(path, Value::from(current.saturating_add(*by)))
            }
            Op::Reset => {
                *state = self.initial.clone();
                true
            }
        };
        if !applied {
            tracing::warn!(event = %event.id, ?op, "state edit skipped: path not writable");
        }
    }
}

impl Update for RuleUpdate {
    fn update(&self, state: &LocalState, event: &Event) -> Option<LocalState> {
        let mut next: Option<LocalState> = None;
        for (id, ops) in &self.handlers {
            if event.id != *id {
                continue;
            }
            let working = next.get_or_insert_with(|| state.clone());
            for op in ops {
                self.apply_op(working, op, event);
            }
        }
        next
    }
}

fn check_pointer(pointer: &str) -> std::result::Result<(), DeclareError> {
    let valid = ["/data", "/ui"]
        .iter()
        .any(|section| pointer == *section || pointer.starts_with(&format!("{}/", section)));
    if valid {
        Ok(())
    } else {
        Err(DeclareError::InvalidPointer(pointer.to_string()))
    }
}

fn op_path(op: &Op) -> Option<&str> {
    match op {
        Op::Set { path, .. }
        | Op::SetPayload { path, .. }
        | Op::MergePayload { path }
        | Op::AppendPayload { path }
        | Op::Toggle { path }
        | Op::Increment { path, .. } => Some(path.as_str()),
        Op::Reset => None,
    }
}

impl ModuleSpec {
    /// Convert into a declaration. `is_root` selects the `APP` namespace
    /// for bare handler labels.
    pub fn into_decl(self, is_root: bool) -> std::result::Result<ModuleDecl, DeclareError> {
        let namespace = if is_root {
            APP_NAMESPACE.to_string()
        } else {
            self.name.trim().to_ascii_uppercase()
        };

        let mut handlers = Vec::with_capacity(self.on.len());
        for handler in self.on {
            for path in handler.ops.iter().filter_map(op_path) {
                check_pointer(path)?;
            }
            let id = handler_id(&namespace, &self.reacts_to, &handler.event)?;
            handlers.push((id, handler.ops));
        }

        let mut decl = ModuleDecl::new(self.name).initial(self.initial.clone());
        if !handlers.is_empty() {
            let update: Arc<dyn Update> = Arc::new(RuleUpdate {
                initial: self.initial,
                handlers,
            });
            decl = decl.update_arc(update);
        }
        for (name, spec) in self.accessors {
            check_pointer(spec.pointer())?;
            decl = decl.accessor(name, move |node: &StateNode| spec.evaluate(node));
        }
        for label in self.emits {
            decl = decl.emits(label);
        }
        for namespace in self.reacts_to {
            decl = decl.reacts_to(namespace);
        }
        for reference in self.reads {
            decl = decl.reads(reference);
        }
        for child in self.children {
            decl = decl.child(child.into_decl(false)?);
        }
        Ok(decl)
    }
}

/// Normalize a handler's `event` into a full uppercase id.
///
/// Bare labels belong to `namespace`; `NS/LABEL` ids must name the module's
/// own namespace or one listed in `reacts_to`.
fn handler_id(
    namespace: &str,
    reacts_to: &[String],
    event: &str,
) -> std::result::Result<String, DeclareError> {
    let invalid = || DeclareError::InvalidHandler {
        module: namespace.to_string(),
        event: event.to_string(),
    };
    let (target, label) = match event.trim().split_once('/') {
        Some((target, label)) => (normalize_name(target, namespace).map_err(|_| invalid())?, label),
        None => (namespace.to_string(), event),
    };
    let label = normalize_label(&target, label).map_err(|_| invalid())?;

    let reachable = target == namespace
        || reacts_to
            .iter()
            .filter_map(|raw| normalize_name(raw, namespace).ok())
            .any(|ns| ns == target);
    if !reachable {
        return Err(DeclareError::UnreachableHandler {
            module: namespace.to_string(),
            event: format!("{}/{}", target, label),
        });
    }
    Ok(format!("{}/{}", target, label))
}

/// Parse a TOML declaration into the root module declaration
pub fn parse_declaration(source: &str) -> Result<ModuleDecl> {
    let spec: ModuleSpec = toml::from_str(source).map_err(DeclareError::Parse)?;
    Ok(spec.into_decl(true)?)
}

/// Read and parse a declaration file
pub fn load_declaration(path: &Path) -> Result<ModuleDecl> {
    let source = std::fs::read_to_string(path).map_err(DeclareError::Read)?;
    parse_declaration(&source)
}
