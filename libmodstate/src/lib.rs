//! modstate - hierarchical module-state composition
//!
//! Applications are assembled from independently written modules. Each
//! module owns one slice of the global state tree, an update function for
//! its own namespaced events and a set of read accessors. This crate:
//!
//! - builds and validates the module tree ([`tree`]),
//! - derives collision-free `NAMESPACE/LABEL` event ids ([`namespace`]),
//! - composes one pure update function for the whole tree ([`compose`]),
//! - lets modules read only along their line of descent ([`guard`]),
//! - runs the single-writer dispatch loop ([`store`]).
//!
//! # Example
//!
//! ```
//! use libmodstate::{build, compose, Event, LocalState, ModuleDecl, Store};
//! use serde_json::json;
//!
//! let app = ModuleDecl::app().child(
//!     ModuleDecl::new("user")
//!         .emits("LOADING_START")
//!         .update(|state: &LocalState, event: &Event| {
//!             (event.label()? == "LOADING_START").then(|| {
//!                 let mut next = state.clone();
//!                 next.ui["isLoading"] = json!(true);
//!                 next
//!             })
//!         }),
//! );
//!
//! let mut store = Store::new(compose(build(app)?));
//! store.dispatch("USER/LOADING_START", json!(null));
//! assert_eq!(store.state().child("USER").unwrap().ui()["isLoading"], json!(true));
//! # Ok::<(), libmodstate::BuildError>(())
//! ```

pub mod compose;
pub mod config;
pub mod declare;
pub mod error;
pub mod event;
pub mod guard;
pub mod logging;
pub mod module;
pub mod namespace;
pub mod notify;
pub mod state;
pub mod store;
pub mod tree;

// Re-export commonly used types
pub use compose::{compose, ComposedReducer, DispatchOutcome};
pub use config::Config;
pub use error::{AccessError, BuildError, ModstateError, Result};
pub use event::{Event, EventId};
pub use guard::{resolve_accessor, AccessorRef, Capability, Selector};
pub use module::{LocalState, ModuleDecl, ModuleDescriptor, Update};
pub use namespace::{Namespacer, APP_NAMESPACE};
pub use state::{GlobalState, StateNode};
pub use store::{DispatchHandle, ListenerId, Store};
pub use tree::{build, CompositionTree, ModulePath};
