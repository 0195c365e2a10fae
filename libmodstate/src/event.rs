//! Mutation events
//!
//! An event is an id string plus an arbitrary JSON payload. Ids follow the
//! `NAMESPACE/LOCAL_LABEL` convention (for example `USER/ARTICLES_FETCH` or
//! `APP/USER_FETCH_SUCCESS`); the namespace routes the event to the module
//! that owns it. Any string is accepted at dispatch time, ids that do not
//! route anywhere are simply ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;

/// Separator between namespace and local label
pub const SEPARATOR: char = '/';

/// A registered, well-formed event id.
///
/// Only the [`Namespacer`](crate::namespace::Namespacer) hands these out, so
/// holding one means the id passed validation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl Borrow<str> for EventId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl EventId {
    pub(crate) fn from_parts(namespace: &str, label: &str) -> Self {
        EventId(format!("{}{}{}", namespace, SEPARATOR, label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> &str {
        split_id(&self.0).map(|(ns, _)| ns).unwrap_or_default()
    }

    pub fn label(&self) -> &str {
        split_id(&self.0).map(|(_, label)| label).unwrap_or_default()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EventId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for EventId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EventId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A dispatched mutation event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Event without payload
    pub fn bare(id: impl Into<String>) -> Self {
        Self::new(id, Value::Null)
    }

    /// Text before the first `/`, if the id has a non-empty one
    pub fn namespace(&self) -> Option<&str> {
        split_id(&self.id).map(|(ns, _)| ns)
    }

    /// Text after the first `/`
    pub fn label(&self) -> Option<&str> {
        split_id(&self.id).map(|(_, label)| label)
    }
}

impl From<EventId> for Event {
    fn from(id: EventId) -> Self {
        Event::bare(id.0)
    }
}

fn split_id(id: &str) -> Option<(&str, &str)> {
    let (namespace, label) = id.split_once(SEPARATOR)?;
    if namespace.is_empty() {
        return None;
    }
    Some((namespace, label))
}
