// SPDX-License-Identifier: MIT OR Apache-2.0
//! Circuit descriptions and the builder that instantiates them.
//!
//! A description lists nodes under stable, human-chosen ids and the edges
//! between their ports. It is stored as RON:
//!
//! ```ron
//! (
//!     name: "Sum",
//!     nodes: [
//!         (id: "x", kind: "literal", values: { "value": Number(3.0) }),
//!         (id: "sum", kind: "addition"),
//!     ],
//!     connections: [
//!         (from: (node: "x", port: "value"), to: (node: "sum", port: "a")),
//!     ],
//! )
//! ```

use bitspace_circuit::{Circuit, CircuitError, IdGenerator, NodeId, NodeRegistry, PropagationError, RandomIds, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Error when building a circuit from a description
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// RON parse error
    #[error("Failed to parse description: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// RON serialization error
    #[error("Failed to serialize description: {0}")]
    Serialize(#[from] ron::Error),

    /// Two nodes share a stable id
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// An edge names a node that is not described
    #[error("Unknown node id: {0}")]
    UnknownNode(String),

    /// A literal value was rejected by its input
    #[error("Invalid value for `{node}.{input}`: {source}")]
    InvalidValue {
        /// Stable node id
        node: String,
        /// Input key
        input: String,
        /// Validation fault
        source: PropagationError,
    },

    /// The circuit rejected a change
    #[error(transparent)]
    Circuit(#[from] CircuitError),
}

/// One port of one described node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Stable node id
    pub node: String,
    /// Port key
    pub port: String,
}

/// A described node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    /// Stable id, unique within the description
    pub id: String,
    /// Registered node type
    pub kind: String,
    /// Literal input values by input key
    #[serde(default)]
    pub values: IndexMap<String, Value>,
}

/// A described edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescription {
    /// Source output
    pub from: Endpoint,
    /// Target input
    pub to: Endpoint,
}

/// Node list plus edge list
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitDescription {
    /// Circuit name
    pub name: String,
    /// Nodes, instantiated in order
    pub nodes: Vec<NodeDescription>,
    /// Edges, wired in order
    pub connections: Vec<ConnectionDescription>,
}

/// A built circuit and the mapping from stable ids to node instances
#[derive(Debug)]
pub struct BuiltCircuit {
    /// The live circuit
    pub circuit: Circuit,
    /// Stable id to instance id
    pub node_ids: IndexMap<String, NodeId>,
    /// Edges whose first value faulted, with the faults they raised
    pub edge_faults: Vec<(ConnectionDescription, PropagationError)>,
}

impl BuiltCircuit {
    /// Instance id of a described node
    pub fn node_id(&self, stable_id: &str) -> Option<NodeId> {
        self.node_ids.get(stable_id).copied()
    }
}

impl CircuitDescription {
    /// Parse a RON description
    pub fn from_ron(source: &str) -> Result<Self, BuildError> {
        Ok(ron::from_str(source)?)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, BuildError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Build with random identifiers
    pub fn build(&self, registry: &NodeRegistry) -> Result<BuiltCircuit, BuildError> {
        self.build_with_ids(registry, Rc::new(RandomIds))
    }

    /// Build, drawing identifiers from `ids`.
    ///
    /// Literal values are applied before any edge is wired, so a connected
    /// input ends up holding the forwarded value.
    pub fn build_with_ids(&self, registry: &NodeRegistry, ids: Rc<dyn IdGenerator>) -> Result<BuiltCircuit, BuildError> {
        self.build_into(registry, Circuit::with_ids(self.name.clone(), ids))
    }

    /// Build into a prepared, usually empty, circuit.
    ///
    /// Observers set on `circuit` beforehand see every described edge. An
    /// edge whose first value faults is recorded in
    /// [`BuiltCircuit::edge_faults`] and the remaining edges are still wired.
    pub fn build_into(&self, registry: &NodeRegistry, mut circuit: Circuit) -> Result<BuiltCircuit, BuildError> {
        let mut node_ids = IndexMap::with_capacity(self.nodes.len());

        for description in &self.nodes {
            if node_ids.contains_key(&description.id) {
                return Err(BuildError::DuplicateNode(description.id.clone()));
            }
            let node_id = circuit.create_node(registry, &description.kind)?;
            for (key, value) in &description.values {
                circuit
                    .input(node_id, key)?
                    .next(value.clone())
                    .map_err(|source| BuildError::InvalidValue {
                        node: description.id.clone(),
                        input: key.clone(),
                        source,
                    })?;
            }
            node_ids.insert(description.id.clone(), node_id);
        }

        let resolve = |endpoint: &Endpoint| {
            node_ids
                .get(&endpoint.node)
                .copied()
                .ok_or_else(|| BuildError::UnknownNode(endpoint.node.clone()))
        };
        let mut edge_faults = Vec::new();
        for edge in &self.connections {
            let (from, to) = (resolve(&edge.from)?, resolve(&edge.to)?);
            match circuit.connect(from, &edge.from.port, to, &edge.to.port) {
                Ok(_) => {}
                Err(CircuitError::Propagation(fault)) => {
                    tracing::warn!(
                        from = %edge.from.node,
                        to = %edge.to.node,
                        input = %edge.to.port,
                        "edge faulted while wiring: {fault}"
                    );
                    edge_faults.push((edge.clone(), fault));
                }
                Err(err) => return Err(err.into()),
            }
        }

        tracing::info!(
            circuit = %circuit.name,
            nodes = circuit.node_count(),
            connections = circuit.connection_count(),
            faulted = edge_faults.len(),
            "circuit built"
        );
        Ok(BuiltCircuit {
            circuit,
            node_ids,
            edge_faults,
        })
    }
}
