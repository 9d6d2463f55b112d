// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions.
//!
//! A [`Node`] is a pure computation unit: a fixed set of named inputs and
//! outputs whose output values are derived from the inputs. The port maps are
//! established by [`NodeBuilder::build`] and never change afterwards.

use crate::connection::Connection;
use crate::error::PropagationError;
use crate::ids::IdGenerator;
use crate::port::{Input, Output, PortId};
use crate::schema::{Mismatch, Schema};
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Draw an ID from a generator
    pub fn generate(ids: &dyn IdGenerator) -> Self {
        Self(ids.next_uuid())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A node instance
pub struct Node {
    id: NodeId,
    kind: String,
    name: String,
    inputs: IndexMap<String, Input>,
    outputs: IndexMap<String, Output>,
}

impl Node {
    /// Start building a node of the given type discriminator
    pub fn builder<'a>(kind: impl Into<String>, ids: &'a dyn IdGenerator) -> NodeBuilder<'a> {
        NodeBuilder::new(kind, ids)
    }

    /// Instance ID
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Type discriminator, opaque to the engine
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inputs by key
    pub fn inputs(&self) -> &IndexMap<String, Input> {
        &self.inputs
    }

    /// Outputs by key
    pub fn outputs(&self) -> &IndexMap<String, Output> {
        &self.outputs
    }

    /// Get an input by key
    pub fn input(&self, key: &str) -> Option<&Input> {
        self.inputs.get(key)
    }

    /// Get an output by key
    pub fn output(&self, key: &str) -> Option<&Output> {
        self.outputs.get(key)
    }

    /// Whether a port with this ID belongs to the node
    pub fn owns_port(&self, port_id: PortId) -> bool {
        self.inputs.values().any(|p| p.id() == port_id) || self.outputs.values().any(|p| p.id() == port_id)
    }

    /// Live connections touching any of the node's ports
    pub fn connections(&self) -> Vec<Connection> {
        let incoming = self.inputs.values().filter_map(Input::connection);
        let outgoing = self.outputs.values().flat_map(Output::connections);
        incoming.chain(outgoing).collect()
    }

    /// Dispose every connection touching the node
    pub fn disconnect_all(&self) -> Result<(), PropagationError> {
        let mut faults = PropagationError::default();
        for connection in self.connections() {
            faults.absorb(connection.dispose());
        }
        faults.into_result()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Error when building a node
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Two ports share a key
    #[error("Duplicate port key: {0}")]
    DuplicatePort(String),

    /// An output derives from an input that was never declared
    #[error("Output `{output}` derives from unknown input `{input}`")]
    UnknownInput {
        /// Output key
        output: String,
        /// Missing input key
        input: String,
    },

    /// A default value does not satisfy its input's schema
    #[error("Default of input `{input}` is invalid: {mismatch}")]
    InvalidDefault {
        /// Input key
        input: String,
        /// Schema diagnostics
        mismatch: Mismatch,
    },

    /// Computing the initial output values faulted
    #[error("Initial propagation failed: {0}")]
    Propagation(#[from] PropagationError),
}

type OutputFactory = Box<dyn FnOnce(PortId, &IndexMap<String, Input>) -> Result<Output, NodeError>>;

/// Builder fixing a node's inputs and outputs
pub struct NodeBuilder<'a> {
    ids: &'a dyn IdGenerator,
    kind: String,
    name: Option<String>,
    id: Option<NodeId>,
    inputs: IndexMap<String, Input>,
    outputs: Vec<(String, OutputFactory)>,
    error: Option<NodeError>,
}

impl<'a> NodeBuilder<'a> {
    /// Create a builder; IDs are drawn from `ids`
    pub fn new(kind: impl Into<String>, ids: &'a dyn IdGenerator) -> Self {
        Self {
            ids,
            kind: kind.into(),
            name: None,
            id: None,
            inputs: IndexMap::new(),
            outputs: Vec::new(),
            error: None,
        }
    }

    /// Set the display name (defaults to the type discriminator)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Use a specific instance ID
    pub fn id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Declare an input
    pub fn input(mut self, key: impl Into<String>, name: impl Into<String>, schema: Arc<Schema>, default_value: Value) -> Self {
        let key = key.into();
        if self.error.is_some() {
            return self;
        }
        if self.inputs.contains_key(&key) {
            self.error = Some(NodeError::DuplicatePort(key));
            return self;
        }
        match schema.validate(&default_value) {
            Ok(default_value) => {
                let input = Input::new(PortId::generate(self.ids), name, schema, default_value);
                self.inputs.insert(key, input);
            }
            Err(mismatch) => self.error = Some(NodeError::InvalidDefault { input: key, mismatch }),
        }
        self
    }

    /// Declare an output computed from the named inputs
    pub fn output<F>(self, key: impl Into<String>, name: impl Into<String>, schema: Arc<Schema>, sources: &[&str], derive: F) -> Self
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        let key = key.into();
        let name = name.into();
        let sources = owned(sources);
        let output_key = key.clone();
        self.push_output(key, move |id, inputs| {
            let sources = resolve(&output_key, &sources, inputs)?;
            Ok(Output::derived(id, name, schema, &sources, derive)?)
        })
    }

    /// Declare an output folding the named inputs into its previous value
    pub fn accumulate<F>(
        self,
        key: impl Into<String>,
        name: impl Into<String>,
        schema: Arc<Schema>,
        sources: &[&str],
        seed: Value,
        fold: F,
    ) -> Self
    where
        F: Fn(&Value, &[Value]) -> Value + 'static,
    {
        let key = key.into();
        let name = name.into();
        let sources = owned(sources);
        let output_key = key.clone();
        self.push_output(key, move |id, inputs| {
            let sources = resolve(&output_key, &sources, inputs)?;
            Ok(Output::accumulated(id, name, schema, &sources, seed, fold)?)
        })
    }

    /// Declare an output driven from outside with [`Output::next`]
    pub fn source(self, key: impl Into<String>, name: impl Into<String>, schema: Arc<Schema>) -> Self {
        let name = name.into();
        self.push_output(key.into(), move |id, _| Ok(Output::new(id, name, schema)))
    }

    fn push_output<F>(mut self, key: String, factory: F) -> Self
    where
        F: FnOnce(PortId, &IndexMap<String, Input>) -> Result<Output, NodeError> + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        if self.outputs.iter().any(|(k, _)| *k == key) {
            self.error = Some(NodeError::DuplicatePort(key));
            return self;
        }
        self.outputs.push((key, Box::new(factory)));
        self
    }

    /// Create the node and compute its initial output values
    pub fn build(self) -> Result<Node, NodeError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let id = self.id.unwrap_or_else(|| NodeId::generate(self.ids));
        let mut outputs = IndexMap::with_capacity(self.outputs.len());
        for (key, factory) in self.outputs {
            let output = factory(PortId::generate(self.ids), &self.inputs)?;
            outputs.insert(key, output);
        }
        tracing::debug!(node = %id, kind = %self.kind, inputs = self.inputs.len(), outputs = outputs.len(), "node built");

        Ok(Node {
            id,
            name: self.name.unwrap_or_else(|| self.kind.clone()),
            kind: self.kind,
            inputs: self.inputs,
            outputs,
        })
    }
}

fn owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| (*k).to_string()).collect()
}

fn resolve(output: &str, sources: &[String], inputs: &IndexMap<String, Input>) -> Result<Vec<Input>, NodeError> {
    sources
        .iter()
        .map(|key| {
            inputs.get(key).cloned().ok_or_else(|| NodeError::UnknownInput {
                output: output.to_string(),
                input: key.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;

    fn number() -> Arc<Schema> {
        Schema::number("Number").shared()
    }

    fn addition(ids: &dyn IdGenerator) -> Node {
        Node::builder("addition", ids)
            .name("Addition")
            .input("a", "A", number(), Value::from(0))
            .input("b", "B", number(), Value::from(0))
            .output("output", "Output", number(), &["a", "b"], |values| {
                Value::Number(values.iter().filter_map(Value::as_number).sum())
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_node_creation() {
        let ids = SequentialIds::default();
        let node = addition(&ids);
        assert_eq!(node.kind(), "addition");
        assert_eq!(node.name(), "Addition");
        assert_eq!(node.inputs().keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(node.outputs().keys().collect::<Vec<_>>(), ["output"]);
        assert!(node.owns_port(node.input("a").unwrap().id()));
        assert!(!node.owns_port(PortId::new()));
    }

    #[test]
    fn test_sum_of_two_inputs() {
        let ids = SequentialIds::default();
        let node = addition(&ids);
        let output = node.output("output").unwrap();
        assert_eq!(output.value(), Some(Value::from(0)));

        node.input("a").unwrap().next(Value::from(3)).unwrap();
        node.input("b").unwrap().next(Value::from(4)).unwrap();
        assert_eq!(output.value(), Some(Value::from(7)));
    }

    #[test]
    fn test_same_inputs_give_same_outputs() {
        let run = || {
            let ids = SequentialIds::default();
            let node = addition(&ids);
            let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
            let sink = std::rc::Rc::clone(&seen);
            let _watch = node
                .output("output")
                .unwrap()
                .subscribe(move |v| {
                    sink.borrow_mut().push(v.clone());
                    Ok(())
                })
                .unwrap();
            for (key, value) in [("a", 1), ("b", 2), ("a", 5), ("b", -1)] {
                node.input(key).unwrap().next(Value::from(value)).unwrap();
            }
            let values = seen.borrow().clone();
            (node.id(), values)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_unknown_source_input() {
        let ids = SequentialIds::default();
        let err = Node::builder("broken", &ids)
            .input("a", "A", number(), Value::from(0))
            .output("out", "Out", number(), &["a", "missing"], |v| v[0].clone())
            .build()
            .unwrap_err();
        assert!(matches!(err, NodeError::UnknownInput { input, .. } if input == "missing"));
    }

    #[test]
    fn test_invalid_default_rejected() {
        let ids = SequentialIds::default();
        let err = Node::builder("broken", &ids)
            .input("a", "A", number(), Value::from("zero"))
            .build()
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidDefault { .. }));
    }

    #[test]
    fn test_duplicate_port_rejected() {
        let ids = SequentialIds::default();
        let err = Node::builder("broken", &ids)
            .input("a", "A", number(), Value::from(0))
            .input("a", "A again", number(), Value::from(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, NodeError::DuplicatePort(key) if key == "a"));
    }

    #[test]
    fn test_source_output_has_no_value_until_driven() {
        let ids = SequentialIds::default();
        let node = Node::builder("time", &ids)
            .source("tick", "Tick", number())
            .build()
            .unwrap();
        let tick = node.output("tick").unwrap();
        assert_eq!(tick.value(), None);
        tick.next(Value::from(1)).unwrap();
        assert_eq!(tick.value(), Some(Value::from(1)));
    }
}
