// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) between an output and an input.
//!
//! A [`Connection`] subscribes to its output and forwards every value into its
//! input after validating it against the input's schema. Its lifecycle is
//! `Constructing -> Live -> Disposed`; disposal is terminal.
//!
//! While live, a connection is owned by its output (`from.connections()`)
//! and referenced weakly by its input (`to.connection()`). It holds its input
//! strongly and its output weakly, so ports and connections never keep each
//! other alive in a cycle. Disposal removes both references and resets the
//! input to its default value.

use crate::error::{PropagationError, TypeMismatch};
use crate::events::{CircuitEvent, EventBus};
use crate::ids::IdGenerator;
use crate::port::{Input, Output, PortId, WeakOutput};
use crate::stream::{Subject, Subscription};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Draw an ID from a generator
    pub fn generate(ids: &dyn IdGenerator) -> Self {
        Self(ids.next_uuid())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Being wired up
    Constructing,
    /// Forwarding values
    Live,
    /// Terminal
    Disposed,
}

/// Called with `(from, to)` when a forwarded value fails validation
pub type ValidationFailObserver = Rc<dyn Fn(PortId, PortId)>;

/// Optional settings for [`Connection::with_options`]
#[derive(Clone, Default)]
pub struct ConnectOptions {
    /// Connection ID; a random v4 UUID when `None`.
    ///
    /// Callers drawing identifiers from an [`IdGenerator`] pass one here,
    /// e.g. with [`ConnectOptions::with_ids`].
    pub id: Option<ConnectionId>,
    /// Observer for validation failures
    pub on_validation_fail: Option<ValidationFailObserver>,
    /// Bus receiving lifecycle events
    pub events: Option<EventBus>,
}

impl ConnectOptions {
    /// Use a specific connection ID
    pub fn with_id(mut self, id: ConnectionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Draw the connection ID from a generator
    pub fn with_ids(self, ids: &dyn IdGenerator) -> Self {
        self.with_id(ConnectionId::generate(ids))
    }

    /// Observe validation failures
    pub fn on_validation_fail(mut self, observer: impl Fn(PortId, PortId) + 'static) -> Self {
        self.on_validation_fail = Some(Rc::new(observer));
        self
    }

    /// Report lifecycle events to a bus
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }
}

struct ConnectionInner {
    id: ConnectionId,
    from: WeakOutput,
    from_id: PortId,
    to: Input,
    state: Cell<ConnectionState>,
    subscription: RefCell<Option<Subscription>>,
    forwarded: Subject<Value>,
    on_validation_fail: Option<ValidationFailObserver>,
    events: Option<EventBus>,
}

/// A directed, validated edge from one output to one input
#[derive(Clone)]
pub struct Connection(Rc<ConnectionInner>);

/// Non-owning reference to a [`Connection`]
#[derive(Clone)]
pub(crate) struct WeakConnection(Weak<ConnectionInner>);

impl WeakConnection {
    pub(crate) fn upgrade(&self) -> Option<Connection> {
        self.0.upgrade().map(Connection)
    }
}

impl Connection {
    /// Connect `from` to `to` with default options and a random ID
    pub fn new(from: &Output, to: &Input) -> Result<Self, PropagationError> {
        Self::with_options(from, to, ConnectOptions::default())
    }

    /// Connect `from` to `to`.
    ///
    /// A connection already targeting `to` is disposed first. The new
    /// connection immediately forwards the output's last value.
    ///
    /// An `Err` reports faults raised while wiring. If the fault was the
    /// initial value failing validation, the new connection has already
    /// disposed itself. Faults from further downstream leave it live and
    /// forwarding, reachable through `to.connection()`.
    pub fn with_options(from: &Output, to: &Input, options: ConnectOptions) -> Result<Self, PropagationError> {
        let mut faults = PropagationError::default();

        if let Some(previous) = to.connection() {
            tracing::debug!(connection = %previous.id(), input = %to.id(), "replacing connection");
            faults.absorb(previous.dispose());
        }

        let connection = Self(Rc::new(ConnectionInner {
            id: options.id.unwrap_or_default(),
            from: from.downgrade(),
            from_id: from.id(),
            to: to.clone(),
            state: Cell::new(ConnectionState::Constructing),
            subscription: RefCell::new(None),
            forwarded: Subject::new(),
            on_validation_fail: options.on_validation_fail,
            events: options.events,
        }));

        from.attach(connection.clone());
        to.set_connection(Some(&connection));
        connection.0.state.set(ConnectionState::Live);
        tracing::debug!(connection = %connection.id(), from = %from.id(), to = %to.id(), "connection live");
        connection.notify(|connection, from, to| CircuitEvent::ConnectionCreated { connection, from, to });

        let weak = Rc::downgrade(&connection.0);
        let (subscription, replayed) = from.stream().subscribe_replayed(move |value| match weak.upgrade() {
            Some(inner) => Connection(inner).forward(value),
            None => Ok(()),
        });
        if connection.is_live() {
            *connection.0.subscription.borrow_mut() = Some(subscription);
        }
        faults.absorb(replayed);

        faults.into_result().map(|()| connection)
    }

    pub(crate) fn downgrade(&self) -> WeakConnection {
        WeakConnection(Rc::downgrade(&self.0))
    }

    /// Connection ID
    pub fn id(&self) -> ConnectionId {
        self.0.id
    }

    /// Source output, `None` once it has been dropped
    pub fn from(&self) -> Option<Output> {
        self.0.from.upgrade()
    }

    /// ID of the source output
    pub fn from_id(&self) -> PortId {
        self.0.from_id
    }

    /// Target input
    pub fn to(&self) -> &Input {
        &self.0.to
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.0.state.get()
    }

    /// Whether values are being forwarded
    pub fn is_live(&self) -> bool {
        self.state() == ConnectionState::Live
    }

    /// Whether the connection has been disposed
    pub fn is_disposed(&self) -> bool {
        self.state() == ConnectionState::Disposed
    }

    /// Observe values as they pass through the connection.
    ///
    /// The stream completes when the connection is disposed.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription, PropagationError>
    where
        F: Fn(&Value) -> Result<(), PropagationError> + 'static,
    {
        self.0.forwarded.subscribe(callback)
    }

    fn forward(&self, value: &Value) -> Result<(), PropagationError> {
        if !self.is_live() {
            return Ok(());
        }
        let (from, to) = (self.from_id(), self.to().id());

        match self.to().schema().validate(value) {
            Ok(accepted) => {
                tracing::trace!(connection = %self.id(), value = %accepted, "forwarding");
                let mut faults = PropagationError::default();
                faults.absorb(self.0.forwarded.next(accepted.clone()));
                faults.absorb(self.to().emit(accepted));
                faults.into_result()
            }
            Err(mismatch) => {
                tracing::warn!(
                    connection = %self.id(),
                    %from,
                    %to,
                    "received a value with an incompatible type: {mismatch}"
                );
                if let Some(observer) = &self.0.on_validation_fail {
                    observer(from, to);
                }
                self.notify(|connection, from, to| CircuitEvent::ValidationFailed { connection, from, to });

                let mut faults = PropagationError::from(TypeMismatch {
                    connection: Some(self.id()),
                    from: Some(from),
                    to,
                    mismatch,
                });
                faults.absorb(self.dispose());
                Err(faults)
            }
        }
    }

    /// Dispose the connection; idempotent.
    ///
    /// The input is reset to its default value, which propagates downstream
    /// like any other change. Faults from that propagation are returned.
    pub fn dispose(&self) -> Result<(), PropagationError> {
        if self.is_disposed() {
            return Ok(());
        }
        self.0.state.set(ConnectionState::Disposed);

        self.0.forwarded.complete();
        let subscription = self.0.subscription.borrow_mut().take();
        if let Some(mut subscription) = subscription {
            subscription.unsubscribe();
        }

        let to = self.to();
        if let Some(from) = self.from() {
            from.detach(self.id());
        }
        if to.connection().is_some_and(|current| current == *self) {
            to.set_connection(None);
        }
        tracing::debug!(connection = %self.id(), from = %self.from_id(), to = %to.id(), "connection disposed");
        self.notify(|connection, from, to| CircuitEvent::ConnectionDisposed { connection, from, to });

        to.emit(to.default_value().clone())
    }

    fn notify(&self, event: impl FnOnce(ConnectionId, PortId, PortId) -> CircuitEvent) {
        if let Some(events) = &self.0.events {
            events.emit(event(self.id(), self.from_id(), self.to().id()));
        }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.0.id)
            .field("from", &self.0.from_id)
            .field("to", &self.0.to.id())
            .field("state", &self.state())
            .finish()
    }
}
