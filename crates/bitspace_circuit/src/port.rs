// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed, observable node endpoints.
//!
//! An [`Input`] is a sink: it always holds a value (its default until
//! something else arrives) and at most one [`Connection`]. An [`Output`] is a
//! source whose values are derived from its node's inputs. It caches the last
//! value and replays it to every new subscriber, so a connection created after
//! the graph already produced values still receives the current one.
//!
//! Both are cheap handles over shared state; cloning yields the same port.
//! An output owns its outgoing connections. Inputs and connections only
//! refer back to what feeds them, so dropping a node's ports frees its wires.

use crate::connection::{Connection, ConnectionId, WeakConnection};
use crate::error::{PropagationError, TypeMismatch};
use crate::ids::IdGenerator;
use crate::schema::Schema;
use crate::stream::{combine_latest, Subject, Subscription};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId(pub Uuid);

impl PortId {
    /// Create a new random port ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Draw an ID from a generator
    pub fn generate(ids: &dyn IdGenerator) -> Self {
        Self(ids.next_uuid())
    }
}

impl Default for PortId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct InputInner {
    id: PortId,
    name: String,
    schema: Arc<Schema>,
    default_value: Value,
    stream: Subject<Value>,
    connection: RefCell<Option<WeakConnection>>,
}

/// Value sink of a node
#[derive(Clone)]
pub struct Input(Rc<InputInner>);

impl Input {
    /// Create an input holding `default_value`
    pub fn new(id: PortId, name: impl Into<String>, schema: Arc<Schema>, default_value: Value) -> Self {
        Self(Rc::new(InputInner {
            id,
            name: name.into(),
            schema,
            stream: Subject::with_value(default_value.clone()),
            default_value,
            connection: RefCell::new(None),
        }))
    }

    /// Port ID
    pub fn id(&self) -> PortId {
        self.0.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Declared schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.0.schema
    }

    /// Value restored whenever the input is disconnected
    pub fn default_value(&self) -> &Value {
        &self.0.default_value
    }

    /// Current value
    pub fn value(&self) -> Value {
        self.0
            .stream
            .value()
            .unwrap_or_else(|| self.0.default_value.clone())
    }

    /// Assign a value from outside the graph, e.g. a literal edited in the UI.
    ///
    /// The value is validated against the input's schema. A rejected value
    /// leaves the current value untouched.
    pub fn next(&self, value: Value) -> Result<(), PropagationError> {
        match self.0.schema.validate(&value) {
            Ok(accepted) => self.emit(accepted),
            Err(mismatch) => Err(TypeMismatch {
                connection: None,
                from: None,
                to: self.id(),
                mismatch,
            }
            .into()),
        }
    }

    /// Broadcast an already validated value
    pub(crate) fn emit(&self, value: Value) -> Result<(), PropagationError> {
        tracing::trace!(input = %self.0.id, %value, "input updated");
        self.0.stream.next(value)
    }

    /// Observe the input's values, starting with the current one
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription, PropagationError>
    where
        F: Fn(&Value) -> Result<(), PropagationError> + 'static,
    {
        self.0.stream.subscribe(callback)
    }

    /// Underlying stream, used to derive outputs
    pub fn stream(&self) -> &Subject<Value> {
        &self.0.stream
    }

    /// The live connection targeting this input
    pub fn connection(&self) -> Option<Connection> {
        self.0.connection.borrow().as_ref().and_then(WeakConnection::upgrade)
    }

    /// Whether a connection targets this input
    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    /// The input only refers back to its connection; the source output owns it
    pub(crate) fn set_connection(&self, connection: Option<&Connection>) {
        *self.0.connection.borrow_mut() = connection.map(Connection::downgrade);
    }

    /// Whether both handles refer to the same input
    pub fn ptr_eq(&self, other: &Input) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("schema", &self.0.schema.name)
            .field("value", &self.value())
            .field("connected", &self.is_connected())
            .finish()
    }
}

struct OutputInner {
    id: PortId,
    name: String,
    schema: Arc<Schema>,
    stream: Subject<Value>,
    connections: RefCell<Vec<Connection>>,
    upstream: RefCell<Vec<Subscription>>,
}

/// Value source of a node
#[derive(Clone)]
pub struct Output(Rc<OutputInner>);

impl Output {
    /// Create a source output that is driven with [`Output::next`]
    pub fn new(id: PortId, name: impl Into<String>, schema: Arc<Schema>) -> Self {
        Self(Rc::new(OutputInner {
            id,
            name: name.into(),
            schema,
            stream: Subject::replaying(),
            connections: RefCell::new(Vec::new()),
            upstream: RefCell::new(Vec::new()),
        }))
    }

    /// Create an output computing `derive` over the latest input values.
    ///
    /// Inputs always hold a value, so the output has computed its first value
    /// by the time this returns.
    pub fn derived<F>(
        id: PortId,
        name: impl Into<String>,
        schema: Arc<Schema>,
        sources: &[Input],
        derive: F,
    ) -> Result<Self, PropagationError>
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        let output = Self::new(id, name, schema);
        let streams: Vec<Subject<Value>> = sources.iter().map(|input| input.stream().clone()).collect();
        let subscriptions = combine_latest(&streams, &output.0.stream, derive)?;
        *output.0.upstream.borrow_mut() = subscriptions;
        Ok(output)
    }

    /// Create an output folding input values into its own previous value.
    ///
    /// Every combined emission computes `fold(previous, inputs)`, starting
    /// from `seed`.
    pub fn accumulated<F>(
        id: PortId,
        name: impl Into<String>,
        schema: Arc<Schema>,
        sources: &[Input],
        seed: Value,
        fold: F,
    ) -> Result<Self, PropagationError>
    where
        F: Fn(&Value, &[Value]) -> Value + 'static,
    {
        let previous = RefCell::new(seed);
        Self::derived(id, name, schema, sources, move |values| {
            let next = fold(&previous.borrow(), values);
            *previous.borrow_mut() = next.clone();
            next
        })
    }

    /// Port ID
    pub fn id(&self) -> PortId {
        self.0.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Declared schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.0.schema
    }

    /// Last computed value
    pub fn value(&self) -> Option<Value> {
        self.0.stream.value()
    }

    /// Emit a value to every connection and observer
    pub fn next(&self, value: Value) -> Result<(), PropagationError> {
        tracing::trace!(output = %self.0.id, %value, "output emitted");
        self.0.stream.next(value)
    }

    /// Observe the output's values, starting with the last computed one
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription, PropagationError>
    where
        F: Fn(&Value) -> Result<(), PropagationError> + 'static,
    {
        self.0.stream.subscribe(callback)
    }

    /// Underlying stream
    pub fn stream(&self) -> &Subject<Value> {
        &self.0.stream
    }

    /// Live outgoing connections, in creation order
    pub fn connections(&self) -> Vec<Connection> {
        self.0.connections.borrow().clone()
    }

    /// Number of live outgoing connections
    pub fn connection_count(&self) -> usize {
        self.0.connections.borrow().len()
    }

    pub(crate) fn attach(&self, connection: Connection) {
        self.0.connections.borrow_mut().push(connection);
    }

    pub(crate) fn detach(&self, id: ConnectionId) {
        self.0.connections.borrow_mut().retain(|c| c.id() != id);
    }

    /// Whether both handles refer to the same output
    pub fn ptr_eq(&self, other: &Output) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakOutput {
        WeakOutput(Rc::downgrade(&self.0))
    }
}

/// Non-owning reference to an [`Output`]
#[derive(Clone)]
pub(crate) struct WeakOutput(Weak<OutputInner>);

impl WeakOutput {
    pub(crate) fn upgrade(&self) -> Option<Output> {
        self.0.upgrade().map(Output)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("schema", &self.0.schema.name)
            .field("value", &self.value())
            .field("connections", &self.connection_count())
            .finish()
    }
}
