// SPDX-License-Identifier: MIT OR Apache-2.0
//! Circuit: a live graph of nodes and connections.

use crate::connection::{ConnectOptions, Connection, ConnectionId, ValidationFailObserver};
use crate::error::PropagationError;
use crate::events::{CircuitEvent, EventBus};
use crate::ids::{IdGenerator, RandomIds};
use crate::node::{Node, NodeError, NodeId};
use crate::port::{Input, Output, PortId};
use crate::registry::NodeRegistry;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// A live node graph
pub struct Circuit {
    /// Circuit name
    pub name: String,
    ids: Rc<dyn IdGenerator>,
    nodes: IndexMap<NodeId, Node>,
    connections: IndexMap<ConnectionId, Connection>,
    events: EventBus,
    on_validation_fail: Option<ValidationFailObserver>,
}

impl Circuit {
    /// Create an empty circuit with random identifiers
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_ids(name, Rc::new(RandomIds))
    }

    /// Create an empty circuit drawing identifiers from `ids`
    pub fn with_ids(name: impl Into<String>, ids: Rc<dyn IdGenerator>) -> Self {
        Self {
            name: name.into(),
            ids,
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
            events: EventBus::new(),
            on_validation_fail: None,
        }
    }

    /// Identifier source shared by nodes and connections of this circuit
    pub fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    /// Structural change notifications
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Observe validation failures on every connection created from now on
    pub fn set_validation_observer(&mut self, observer: impl Fn(PortId, PortId) + 'static) {
        self.on_validation_fail = Some(Rc::new(observer));
    }

    /// Add a node to the circuit
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.events.emit(CircuitEvent::NodeAdded {
            node: id,
            kind: node.kind().to_string(),
        });
        self.nodes.insert(id, node);
        id
    }

    /// Instantiate a registered node type and add it
    pub fn create_node(&mut self, registry: &NodeRegistry, kind: &str) -> Result<NodeId, CircuitError> {
        let node = registry
            .create_node(kind, self.ids())
            .ok_or_else(|| CircuitError::UnknownNodeType(kind.to_string()))??;
        Ok(self.add_node(node))
    }

    /// Remove a node, disposing every connection touching it
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Option<Node>, PropagationError> {
        let Some(node) = self.nodes.shift_remove(&node_id) else {
            return Ok(None);
        };
        let result = node.disconnect_all();
        self.prune();
        self.events.emit(CircuitEvent::NodeRemoved { node: node_id });
        result.map(|()| Some(node))
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get an input of a node
    pub fn input(&self, node_id: NodeId, key: &str) -> Result<&Input, CircuitError> {
        let node = self.node(node_id).ok_or(CircuitError::NodeNotFound(node_id))?;
        node.input(key).ok_or_else(|| CircuitError::PortNotFound {
            node: node_id,
            port: key.to_string(),
        })
    }

    /// Get an output of a node
    pub fn output(&self, node_id: NodeId, key: &str) -> Result<&Output, CircuitError> {
        let node = self.node(node_id).ok_or(CircuitError::NodeNotFound(node_id))?;
        node.output(key).ok_or_else(|| CircuitError::PortNotFound {
            node: node_id,
            port: key.to_string(),
        })
    }

    /// Connect an output to an input.
    ///
    /// An existing connection to the input is replaced. Self-loops and
    /// connections that would close a cycle are rejected, since propagation
    /// is synchronous.
    pub fn connect(
        &mut self,
        from_node: NodeId,
        output: &str,
        to_node: NodeId,
        input: &str,
    ) -> Result<ConnectionId, CircuitError> {
        let from = self.output(from_node, output)?.clone();
        let to = self.input(to_node, input)?.clone();

        if from_node == to_node {
            return Err(CircuitError::SelfLoop);
        }
        if self.reaches(to_node, from_node) {
            return Err(CircuitError::Cycle);
        }

        let id = ConnectionId::generate(self.ids());
        let mut options = ConnectOptions::default()
            .with_id(id)
            .with_events(self.events.clone());
        options.on_validation_fail = self.on_validation_fail.clone();

        let result = Connection::with_options(&from, &to, options);
        if let Some(connection) = to.connection().filter(|c| c.id() == id) {
            self.connections.insert(id, connection);
        }
        self.prune();
        result.map(|_| id).map_err(CircuitError::from)
    }

    /// Dispose a connection
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Result<Option<Connection>, PropagationError> {
        let Some(connection) = self.connections.shift_remove(&connection_id) else {
            return Ok(None);
        };
        let result = connection.dispose();
        self.prune();
        result.map(|()| Some(connection))
    }

    /// Get a live connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id).filter(|c| c.is_live())
    }

    /// Get all live connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(|c| c.is_live())
    }

    /// Get the number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections().count()
    }

    /// Forget connections that were disposed behind the circuit's back,
    /// e.g. by a validation failure or by being replaced
    pub fn prune(&mut self) {
        self.connections.retain(|_, c| c.is_live());
    }

    fn port_owners(&self) -> HashMap<PortId, NodeId> {
        self.nodes
            .values()
            .flat_map(|node| node.inputs().values().map(move |input| (input.id(), node.id())))
            .collect()
    }

    /// Nodes fed directly by `node_id`
    fn downstream(&self, node_id: NodeId, owners: &HashMap<PortId, NodeId>) -> Vec<NodeId> {
        self.node(node_id)
            .map(|node| {
                node.outputs()
                    .values()
                    .flat_map(Output::connections)
                    .filter_map(|c| owners.get(&c.to().id()).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `target` can be reached from `start` along live connections
    fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        let owners = self.port_owners();
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(node_id) = stack.pop() {
            if node_id == target {
                return true;
            }
            if visited.insert(node_id) {
                stack.extend(self.downstream(node_id, &owners));
            }
        }
        false
    }

    /// Get nodes in topological order, upstream first
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let owners = self.port_owners();
        let mut visited = HashSet::new();
        let mut temp_mark = HashSet::new();
        let mut order = Vec::new();

        for node_id in self.nodes.keys() {
            if !visited.contains(node_id) {
                self.visit(*node_id, &owners, &mut visited, &mut temp_mark, &mut order)?;
            }
        }

        order.reverse();
        Ok(order)
    }

    fn visit(
        &self,
        node_id: NodeId,
        owners: &HashMap<PortId, NodeId>,
        visited: &mut HashSet<NodeId>,
        temp_mark: &mut HashSet<NodeId>,
        order: &mut Vec<NodeId>,
    ) -> Result<(), CycleError> {
        if temp_mark.contains(&node_id) {
            return Err(CycleError);
        }
        if visited.contains(&node_id) {
            return Ok(());
        }

        temp_mark.insert(node_id);
        for next in self.downstream(node_id, owners) {
            self.visit(next, owners, visited, temp_mark, order)?;
        }
        temp_mark.remove(&node_id);
        visited.insert(node_id);
        order.push(node_id);

        Ok(())
    }
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl std::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Circuit")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("connections", &self.connection_count())
            .finish()
    }
}

/// Error when changing a circuit
#[derive(Debug, thiserror::Error)]
pub enum CircuitError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port not found
    #[error("Port `{port}` not found on node {node}")]
    PortNotFound {
        /// Node searched
        node: NodeId,
        /// Port key
        port: String,
    },

    /// Node type not registered
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// Connection would close a cycle
    #[error("Connection would create a cycle")]
    Cycle,

    /// Node construction failed
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Values faulted while wiring
    #[error(transparent)]
    Propagation(#[from] PropagationError),
}

/// Error when the circuit contains a cycle
#[derive(Debug, thiserror::Error)]
#[error("Circuit contains a cycle")]
pub struct CycleError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::schema::Schema;
    use crate::stream::Subscription;
    use crate::value::Value;
    use std::cell::RefCell;

    fn circuit() -> Circuit {
        Circuit::with_ids("Test", Rc::new(SequentialIds::default()))
    }

    fn addition(circuit: &mut Circuit) -> NodeId {
        let number = Schema::number("Number").shared();
        let node = Node::builder("addition", circuit.ids())
            .input("a", "A", number.clone(), Value::from(0))
            .input("b", "B", number.clone(), Value::from(0))
            .output("output", "Output", number, &["a", "b"], |values| {
                Value::Number(values.iter().filter_map(Value::as_number).sum())
            })
            .build()
            .unwrap();
        circuit.add_node(node)
    }

    fn text_sink(circuit: &mut Circuit) -> NodeId {
        let string = Schema::string("String").shared();
        let node = Node::builder("text", circuit.ids())
            .input("text", "Text", string, Value::from(""))
            .output("length", "Length", Schema::number("Number").shared(), &["text"], |values| {
                Value::Number(values[0].as_str().map_or(0, |s| s.chars().count()) as f64)
            })
            .build()
            .unwrap();
        circuit.add_node(node)
    }

    fn relay(circuit: &mut Circuit, initial: Value) -> NodeId {
        let any = Schema::any("Any").shared();
        let node = Node::builder("relay", circuit.ids())
            .input("value", "Value", any.clone(), initial)
            .output("value", "Value", any, &["value"], |v| v[0].clone())
            .build()
            .unwrap();
        circuit.add_node(node)
    }

    fn values_of(output: &Output) -> (Rc<RefCell<Vec<Value>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let subscription = output
            .subscribe(move |v| {
                sink.borrow_mut().push(v.clone());
                Ok(())
            })
            .unwrap();
        (seen, subscription)
    }

    #[test]
    fn test_addition_scenario() {
        let mut circuit = circuit();
        let sum = addition(&mut circuit);

        circuit.input(sum, "a").unwrap().next(Value::from(3)).unwrap();
        circuit.input(sum, "b").unwrap().next(Value::from(4)).unwrap();
        assert_eq!(circuit.output(sum, "output").unwrap().value(), Some(Value::from(7)));
    }

    #[test]
    fn test_connect_links_endpoints() {
        let mut circuit = circuit();
        let a = addition(&mut circuit);
        let b = addition(&mut circuit);

        let id = circuit.connect(a, "output", b, "a").unwrap();
        let connection = circuit.connection(id).unwrap();
        let to = circuit.input(b, "a").unwrap();
        let from = circuit.output(a, "output").unwrap();
        assert_eq!(to.connection().as_ref(), Some(connection));
        assert!(from.connections().contains(connection));
        assert_eq!(circuit.connection_count(), 1);
    }

    #[test]
    fn test_values_cascade_through_chain() {
        let mut circuit = circuit();
        let first = addition(&mut circuit);
        let second = addition(&mut circuit);
        circuit.connect(first, "output", second, "a").unwrap();

        circuit.input(second, "b").unwrap().next(Value::from(10)).unwrap();
        circuit.input(first, "a").unwrap().next(Value::from(1)).unwrap();
        circuit.input(first, "b").unwrap().next(Value::from(2)).unwrap();
        assert_eq!(circuit.output(second, "output").unwrap().value(), Some(Value::from(13)));
    }

    #[test]
    fn test_type_mismatch_scenario() {
        let mut circuit = circuit();
        let failures = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&failures);
        circuit.set_validation_observer(move |from, to| sink.borrow_mut().push((from, to)));

        let sum = addition(&mut circuit);
        let text = text_sink(&mut circuit);
        let (length, _watch) = values_of(circuit.output(text, "length").unwrap());

        let err = match circuit.connect(sum, "output", text, "text") {
            Err(CircuitError::Propagation(err)) => err,
            other => panic!("expected a propagation fault, got {other:?}"),
        };
        let from = circuit.output(sum, "output").unwrap().id();
        let to = circuit.input(text, "text").unwrap();
        assert_eq!(err.first().unwrap().to, to.id());
        assert_eq!(*failures.borrow(), vec![(from, to.id())]);
        assert!(to.connection().is_none());
        assert_eq!(to.value(), Value::from(""));
        assert_eq!(circuit.connection_count(), 0);
        assert_eq!(length.borrow().last(), Some(&Value::from(0)));
    }

    #[test]
    fn test_mismatch_on_later_emission() {
        let mut circuit = circuit();
        let any = Schema::any("Any").shared();
        let relay = Node::builder("relay", circuit.ids())
            .input("value", "Value", any.clone(), Value::from("start"))
            .output("value", "Value", any, &["value"], |v| v[0].clone())
            .build()
            .unwrap();
        let relay = circuit.add_node(relay);
        let text = text_sink(&mut circuit);

        circuit.connect(relay, "value", text, "text").unwrap();
        assert_eq!(circuit.input(text, "text").unwrap().value(), Value::from("start"));

        let err = circuit.input(relay, "value").unwrap().next(Value::from(5)).unwrap_err();
        assert_eq!(err.faults().len(), 1);
        circuit.prune();
        assert_eq!(circuit.connection_count(), 0);
        assert_eq!(circuit.input(text, "text").unwrap().value(), Value::from(""));
    }

    #[test]
    fn test_downstream_fault_on_connect_keeps_connection_forwarding() {
        let mut circuit = circuit();
        let source = relay(&mut circuit, Value::from("text"));
        let middle = relay(&mut circuit, Value::from(0));
        let sum = addition(&mut circuit);
        circuit.connect(middle, "value", sum, "a").unwrap();

        let err = circuit.connect(source, "value", middle, "value").unwrap_err();
        assert!(matches!(err, CircuitError::Propagation(_)));
        assert_eq!(circuit.connection_count(), 1);
        let upstream = circuit.input(middle, "value").unwrap().connection().unwrap();
        assert!(circuit.connection(upstream.id()).is_some());

        circuit.input(source, "value").unwrap().next(Value::from(6)).unwrap();
        assert_eq!(circuit.input(middle, "value").unwrap().value(), Value::from(6));
    }

    #[test]
    fn test_dropping_circuit_frees_wired_ports() {
        let mut circuit = circuit();
        let marker = Rc::new(());
        let held = Rc::clone(&marker);
        let number = Schema::number("Number").shared();
        let watched = Node::builder("watched", circuit.ids())
            .input("a", "A", number.clone(), Value::from(0))
            .output("a", "A", number, &["a"], move |v| {
                let _ = Rc::strong_count(&held);
                v[0].clone()
            })
            .build()
            .unwrap();
        let observer = Rc::new(());
        let observed = Rc::clone(&observer);
        circuit.set_validation_observer(move |_, _| {
            let _ = Rc::strong_count(&observed);
        });

        let upstream = addition(&mut circuit);
        let watched = circuit.add_node(watched);
        circuit.connect(upstream, "output", watched, "a").unwrap();

        let (marker_ref, observer_ref) = (Rc::downgrade(&marker), Rc::downgrade(&observer));
        drop((marker, observer));
        assert!(marker_ref.upgrade().is_some());
        drop(circuit);
        assert!(marker_ref.upgrade().is_none());
        assert!(observer_ref.upgrade().is_none());
    }

    #[test]
    fn test_replace_scenario() {
        let mut circuit = circuit();
        let o = addition(&mut circuit);
        let o2 = addition(&mut circuit);
        let target = addition(&mut circuit);

        let x = circuit.connect(o, "output", target, "a").unwrap();
        let x_handle = circuit.connection(x).unwrap().clone();
        let y = circuit.connect(o2, "output", target, "a").unwrap();

        assert!(x_handle.is_disposed());
        assert!(circuit.connection(x).is_none());
        assert!(circuit.connection(y).unwrap().is_live());
        assert!(!circuit.output(o, "output").unwrap().connections().contains(&x_handle));
        assert_eq!(circuit.input(target, "a").unwrap().connection().map(|c| c.id()), Some(y));
    }

    #[test]
    fn test_sibling_receives_value_when_other_fails() {
        let mut circuit = circuit();
        let any = Schema::any("Any").shared();
        let relay = Node::builder("relay", circuit.ids())
            .input("value", "Value", any.clone(), Value::from("x"))
            .output("value", "Value", any.clone(), &["value"], |v| v[0].clone())
            .build()
            .unwrap();
        let relay = circuit.add_node(relay);
        let strict = text_sink(&mut circuit);
        let loose = Node::builder("relay", circuit.ids())
            .input("value", "Value", any.clone(), Value::Null)
            .output("value", "Value", any, &["value"], |v| v[0].clone())
            .build()
            .unwrap();
        let loose = circuit.add_node(loose);

        let c1 = circuit.connect(relay, "value", strict, "text").unwrap();
        let c2 = circuit.connect(relay, "value", loose, "value").unwrap();

        assert!(circuit.input(relay, "value").unwrap().next(Value::from(1)).is_err());
        assert!(circuit.connection(c1).is_none());
        assert!(circuit.connection(c2).unwrap().is_live());
        assert_eq!(circuit.input(loose, "value").unwrap().value(), Value::from(1));

        circuit.input(relay, "value").unwrap().next(Value::from(2)).unwrap();
        assert_eq!(circuit.input(loose, "value").unwrap().value(), Value::from(2));
    }

    #[test]
    fn test_fan_out_disconnect_leaves_others() {
        let mut circuit = circuit();
        let source = addition(&mut circuit);
        let left = addition(&mut circuit);
        let right = addition(&mut circuit);
        let c1 = circuit.connect(source, "output", left, "a").unwrap();
        let c2 = circuit.connect(source, "output", right, "a").unwrap();
        assert_eq!(circuit.output(source, "output").unwrap().connection_count(), 2);

        circuit.disconnect(c1).unwrap();
        assert!(circuit.connection(c2).is_some());
        circuit.input(source, "a").unwrap().next(Value::from(8)).unwrap();
        assert_eq!(circuit.input(right, "a").unwrap().value(), Value::from(8));
        assert_eq!(circuit.input(left, "a").unwrap().value(), Value::from(0));
    }

    #[test]
    fn test_disconnect_reset_reaches_downstream() {
        let mut circuit = circuit();
        let first = addition(&mut circuit);
        let second = addition(&mut circuit);
        circuit.input(first, "a").unwrap().next(Value::from(5)).unwrap();
        let id = circuit.connect(first, "output", second, "a").unwrap();
        assert_eq!(circuit.output(second, "output").unwrap().value(), Some(Value::from(5)));

        let removed = circuit.disconnect(id).unwrap().unwrap();
        assert!(removed.is_disposed());
        assert!(circuit.disconnect(id).unwrap().is_none());
        assert_eq!(circuit.output(second, "output").unwrap().value(), Some(Value::from(0)));
    }

    #[test]
    fn test_cycles_and_self_loops_rejected() {
        let mut circuit = circuit();
        let a = addition(&mut circuit);
        let b = addition(&mut circuit);
        let c = addition(&mut circuit);
        circuit.connect(a, "output", b, "a").unwrap();
        circuit.connect(b, "output", c, "a").unwrap();

        assert!(matches!(circuit.connect(c, "output", a, "b"), Err(CircuitError::Cycle)));
        assert!(matches!(circuit.connect(a, "output", a, "b"), Err(CircuitError::SelfLoop)));
        assert!(matches!(
            circuit.connect(a, "missing", b, "b"),
            Err(CircuitError::PortNotFound { .. })
        ));
    }

    #[test]
    fn test_topological_order() {
        let mut circuit = circuit();
        let c = addition(&mut circuit);
        let a = addition(&mut circuit);
        let b = addition(&mut circuit);
        circuit.connect(a, "output", b, "a").unwrap();
        circuit.connect(b, "output", c, "a").unwrap();

        let order = circuit.topological_order().unwrap();
        let position = |id| order.iter().position(|n| *n == id).unwrap();
        assert!(position(a) < position(b));
        assert!(position(b) < position(c));
    }

    #[test]
    fn test_remove_node_disposes_connections() {
        let mut circuit = circuit();
        let a = addition(&mut circuit);
        let b = addition(&mut circuit);
        circuit.input(a, "a").unwrap().next(Value::from(2)).unwrap();
        circuit.connect(a, "output", b, "a").unwrap();

        let target = circuit.input(b, "a").unwrap().clone();
        let removed = circuit.remove_node(a).unwrap().unwrap();
        assert_eq!(removed.id(), a);
        assert_eq!(circuit.node_count(), 1);
        assert_eq!(circuit.connection_count(), 0);
        assert!(!target.is_connected());
        assert_eq!(target.value(), Value::from(0));
    }

    #[test]
    fn test_events_report_structure_changes() {
        let mut circuit = circuit();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _listener = circuit.events().listen(move |event| sink.borrow_mut().push(event.clone()));

        let a = addition(&mut circuit);
        let b = addition(&mut circuit);
        let id = circuit.connect(a, "output", b, "a").unwrap();
        circuit.remove_node(b).unwrap();

        let events = seen.borrow();
        assert!(matches!(events[0], CircuitEvent::NodeAdded { node, .. } if node == a));
        assert!(matches!(events[2], CircuitEvent::ConnectionCreated { connection, .. } if connection == id));
        assert!(matches!(events[3], CircuitEvent::ConnectionDisposed { connection, .. } if connection == id));
        assert_eq!(events[4], CircuitEvent::NodeRemoved { node: b });
    }
}
