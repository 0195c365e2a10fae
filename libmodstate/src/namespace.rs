//! Event namespacing
//!
//! Every module owns one namespace (its uppercase name; the root owns
//! `APP`). Event ids are derived as `NAMESPACE/LOCAL_LABEL` and registered
//! once; deriving the same id twice while a tree is being built is a
//! collision and fails the build.

use std::collections::BTreeSet;

use crate::error::BuildError;
use crate::event::EventId;

/// Namespace of the application root
pub const APP_NAMESPACE: &str = "APP";

/// Normalize a module name to its uppercase form.
///
/// Names must be non-empty, start with an ASCII letter and contain only
/// ASCII letters, digits and underscores. `path` is only used for the error.
pub fn normalize_name(raw: &str, path: &str) -> Result<String, BuildError> {
    let trimmed = raw.trim();
    let valid = trimmed
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(BuildError::InvalidName {
            name: raw.to_string(),
            path: path.to_string(),
        });
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Normalize a local event label (`VERB_NOUN` style tokens)
pub fn normalize_label(namespace: &str, raw: &str) -> Result<String, BuildError> {
    let trimmed = raw.trim();
    let valid = !trimmed.is_empty()
        && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(BuildError::InvalidLabel {
            namespace: namespace.to_string(),
            label: raw.to_string(),
        });
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Registry of namespaces and derived event ids
#[derive(Debug, Clone)]
pub struct Namespacer {
    namespaces: BTreeSet<String>,
    events: BTreeSet<EventId>,
}

impl Default for Namespacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespacer {
    /// A registry that already knows the `APP` namespace
    pub fn new() -> Self {
        let mut namespaces = BTreeSet::new();
        namespaces.insert(APP_NAMESPACE.to_string());
        Self {
            namespaces,
            events: BTreeSet::new(),
        }
    }

    /// Register a module namespace. Returns `false` if it was already known.
    pub fn register_namespace(&mut self, namespace: &str) -> bool {
        self.namespaces.insert(namespace.to_string())
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }

    /// Derive and register `module/label`.
    ///
    /// # Errors
    ///
    /// - `UnknownNamespace` if `module` was never registered
    /// - `InvalidLabel` for empty or non `[A-Za-z0-9_]` labels
    /// - `DuplicateEvent` if the id was derived before
    pub fn derive_event_id(&mut self, module: &str, label: &str) -> Result<EventId, BuildError> {
        if !self.has_namespace(module) {
            return Err(BuildError::UnknownNamespace(module.to_string()));
        }
        let label = normalize_label(module, label)?;
        let id = EventId::from_parts(module, &label);
        if !self.events.insert(id.clone()) {
            return Err(BuildError::DuplicateEvent(id.to_string()));
        }
        tracing::trace!(event = %id, "registered event id");
        Ok(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.contains(id)
    }

    /// Registered ids in lexical order
    pub fn event_ids(&self) -> impl Iterator<Item = &EventId> {
        self.events.iter()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_event_id() {
        let mut namespacer = Namespacer::new();
        assert!(namespacer.register_namespace("USER"));

        let id = namespacer.derive_event_id("USER", "FETCH").unwrap();
        assert_eq!(id, "USER/FETCH");
        assert!(namespacer.contains("USER/FETCH"));
    }

    #[test]
    fn test_derive_twice_is_duplicate() {
        let mut namespacer = Namespacer::new();
        namespacer.register_namespace("USER");
        namespacer.derive_event_id("USER", "FETCH").unwrap();

        let err = namespacer.derive_event_id("USER", "FETCH").unwrap_err();
        assert_eq!(err, BuildError::DuplicateEvent("USER/FETCH".to_string()));
    }

    #[test]
    fn test_label_is_uppercased_before_collision_check() {
        let mut namespacer = Namespacer::new();
        namespacer.derive_event_id(APP_NAMESPACE, "user_fetch").unwrap();
        assert!(matches!(
            namespacer.derive_event_id(APP_NAMESPACE, "USER_FETCH"),
            Err(BuildError::DuplicateEvent(id)) if id == "APP/USER_FETCH"
        ));
    }

    #[test]
    fn test_app_namespace_is_builtin() {
        let mut namespacer = Namespacer::new();
        let id = namespacer.derive_event_id("APP", "USER_FETCH_SUCCESS").unwrap();
        assert_eq!(id, "APP/USER_FETCH_SUCCESS");
    }

    #[test]
    fn test_unknown_namespace() {
        let mut namespacer = Namespacer::new();
        assert_eq!(
            namespacer.derive_event_id("PAYMENT", "CHARGE").unwrap_err(),
            BuildError::UnknownNamespace("PAYMENT".to_string())
        );
    }

    #[test]
    fn test_invalid_labels() {
        let mut namespacer = Namespacer::new();
        for label in ["", "   ", "HAS SPACE", "A/B", "DASH-ED"] {
            assert!(matches!(
                namespacer.derive_event_id("APP", label),
                Err(BuildError::InvalidLabel { .. })
            ));
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("user", "APP").unwrap(), "USER");
        assert_eq!(normalize_name(" article_list2 ", "APP").unwrap(), "ARTICLE_LIST2");
        for bad in ["", "2FA", "user-profile", "a.b", "_x"] {
            assert!(matches!(
                normalize_name(bad, "APP"),
                Err(BuildError::InvalidName { .. })
            ));
        }
    }
}
