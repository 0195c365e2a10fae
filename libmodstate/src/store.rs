//! Running-phase store
//!
//! The store owns the current snapshot and the composed reducer. It is the
//! single writer: events are applied one at a time, in submission order.
//!
//! Work that has to happen asynchronously (fetching, timers) lives outside
//! the core. Such collaborators get a [`DispatchHandle`] and submit
//! follow-up events (`USER/FETCH_SUCCESS`, `USER/FETCH_FAILURE`, ...) into
//! the store's queue; the queue is drained, FIFO, before the next direct
//! dispatch or on [`Store::run_pending`].

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde_json::Value;

use crate::compose::{compose, ComposedReducer, DispatchOutcome};
use crate::config::StoreConfig;
use crate::error::{AccessError, DispatchError};
use crate::event::Event;
use crate::guard::AccessorRef;
use crate::notify::{NotifyBus, StoreEvent, StoreEventReceiver};
use crate::state::GlobalState;
use crate::tree::{CompositionTree, ModulePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&GlobalState, &DispatchOutcome) + Send>;

/// Cloneable sender for follow-up events
#[derive(Clone, Debug)]
pub struct DispatchHandle {
    sender: Sender<Event>,
    limit: usize,
}

impl DispatchHandle {
    /// Queue an event for the store. Never blocks.
    pub fn dispatch(&self, id: impl Into<String>, payload: Value) -> Result<(), DispatchError> {
        self.send(Event::new(id, payload))
    }

    pub fn send(&self, event: Event) -> Result<(), DispatchError> {
        self.sender.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => DispatchError::QueueFull(self.limit),
            TrySendError::Disconnected(_) => DispatchError::Closed,
        })
    }
}

pub struct Store {
    reducer: ComposedReducer,
    state: GlobalState,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    queue_tx: Sender<Event>,
    queue_rx: Receiver<Event>,
    queue_limit: usize,
    bus: NotifyBus,
}

impl Store {
    pub fn new(reducer: ComposedReducer) -> Self {
        Self::with_config(reducer, &StoreConfig::default())
    }

    pub fn with_config(reducer: ComposedReducer, config: &StoreConfig) -> Self {
        let queue_limit = config.queue_limit.max(1);
        let (queue_tx, queue_rx) = crossbeam_channel::bounded(queue_limit);
        let state = reducer.initial_state();
        Self {
            reducer,
            state,
            listeners: Vec::new(),
            next_listener: 0,
            queue_tx,
            queue_rx,
            queue_limit,
            bus: NotifyBus::new(config.notify_capacity),
        }
    }

    /// Build, compose and start in one step
    pub fn from_tree(tree: CompositionTree) -> Self {
        Self::new(compose(tree))
    }

    /// Current snapshot (cheap `Arc` clone)
    pub fn state(&self) -> GlobalState {
        self.state.clone()
    }

    pub fn reducer(&self) -> &ComposedReducer {
        &self.reducer
    }

    /// Apply an event. Unknown ids are accepted and ignored.
    ///
    /// Events already waiting in the queue were submitted earlier, so they
    /// are applied first.
    pub fn dispatch(&mut self, id: impl Into<String>, payload: Value) -> DispatchOutcome {
        self.dispatch_event(Event::new(id, payload))
    }

    pub fn dispatch_event(&mut self, event: Event) -> DispatchOutcome {
        self.run_pending();
        self.apply(event)
    }

    /// Drain queued events in FIFO order; returns how many were applied
    pub fn run_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.queue_rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, event: Event) -> DispatchOutcome {
        let outcome = self.reducer.apply(&self.state, &event);

        match &outcome.owner {
            Some(owner) => {
                self.state = outcome.state.clone();
                self.bus.emit(StoreEvent::Applied {
                    event_id: event.id.clone(),
                    owner: owner.to_string(),
                    changed: outcome.changed.iter().map(ToString::to_string).collect(),
                });
                for (_, listener) in self.listeners.iter_mut() {
                    listener(&self.state, &outcome);
                }
            }
            None => {
                self.bus.emit(StoreEvent::Unhandled {
                    event_id: event.id.clone(),
                });
            }
        }
        outcome
    }

    /// Handle for collaborators that dispatch later
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            sender: self.queue_tx.clone(),
            limit: self.queue_limit,
        }
    }

    pub fn pending(&self) -> usize {
        self.queue_rx.len()
    }

    /// Register a listener called after every handled event
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&GlobalState, &DispatchOutcome) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener; `false` if it was already gone
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        before != self.listeners.len()
    }

    /// Broadcast receiver for async consumers
    pub fn events(&self) -> StoreEventReceiver {
        self.bus.subscribe()
    }

    /// Resolve an accessor for the module at `requesting`
    pub fn select(
        &self,
        requesting: &ModulePath,
        accessor: &AccessorRef,
    ) -> Result<Value, AccessError> {
        crate::guard::resolve_accessor(self.reducer.tree(), requesting, accessor, &self.state)
    }

    /// Swap in a reducer composed from a new tree.
    ///
    /// Slices whose module path exists in both trees are kept; new modules
    /// start from their initial state and removed ones are dropped.
    pub fn replace_tree(&mut self, tree: CompositionTree) {
        self.run_pending();
        let reducer = compose(tree);
        let state = reducer.carry_over(&self.state);
        let modules = reducer.tree().len();
        self.reducer = reducer;
        self.state = state;
        tracing::info!(modules, "replaced composition tree");
        self.bus.emit(StoreEvent::TreeReplaced { modules });
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("reducer", &self.reducer)
            .field("listeners", &self.listeners.len())
            .field("pending", &self.queue_rx.len())
            .finish()
    }
}
