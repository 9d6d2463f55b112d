// SPDX-License-Identifier: MIT OR Apache-2.0
//! Build a described circuit, apply overrides and collect output values.

use crate::config::RunnerConfig;
use bitspace_circuit::circuit::CycleError;
use bitspace_circuit::{Circuit, CircuitError, PortId, PropagationError, Value};
use bitspace_nodes::{create_default_registry, BuildError, CircuitDescription};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

/// Error while running a circuit
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Description could not be read
    #[error("Failed to read circuit {path}: {source}")]
    Io {
        /// Description path
        path: PathBuf,
        /// IO error
        source: std::io::Error,
    },

    /// Description could not be built
    #[error(transparent)]
    Build(#[from] BuildError),

    /// An override names an unknown node
    #[error("Override targets unknown node `{0}`")]
    UnknownNode(String),

    /// An override names an unknown input
    #[error(transparent)]
    Circuit(#[from] CircuitError),

    /// Circuit could not be ordered
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Output values of one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReport {
    /// Stable id from the description
    pub id: String,
    /// Node type
    pub kind: String,
    /// `(output key, last value)`
    pub outputs: Vec<(String, Option<Value>)>,
}

/// Result of a run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Nodes in topological order
    pub nodes: Vec<NodeReport>,
    /// `(from, to)` of every wire that rejected a value
    pub validation_failures: Vec<(PortId, PortId)>,
    /// Faults raised while wiring edges and by overrides
    pub faults: Vec<PropagationError>,
}

/// Run the circuit described by `config`
pub fn run(config: &RunnerConfig) -> Result<RunReport, RunnerError> {
    let source = std::fs::read_to_string(&config.circuit).map_err(|source| RunnerError::Io {
        path: config.circuit.clone(),
        source,
    })?;
    run_description(config, &CircuitDescription::from_ron(&source)?)
}

/// Run an already parsed description
pub fn run_description(config: &RunnerConfig, description: &CircuitDescription) -> Result<RunReport, RunnerError> {
    let registry = create_default_registry();
    let mut circuit = Circuit::new(description.name.clone());
    let failures = Rc::new(RefCell::new(Vec::new()));
    if config.report_validation_failures {
        let sink = Rc::clone(&failures);
        circuit.set_validation_observer(move |from, to| {
            tracing::warn!(%from, %to, "wire rejected a value");
            sink.borrow_mut().push((from, to));
        });
    }
    let mut built = description.build_into(&registry, circuit)?;

    let mut faults: Vec<PropagationError> = built.edge_faults.drain(..).map(|(_, fault)| fault).collect();
    for assignment in &config.overrides {
        let node = built
            .node_id(&assignment.node)
            .ok_or_else(|| RunnerError::UnknownNode(assignment.node.clone()))?;
        let input = built.circuit.input(node, &assignment.input)?;
        tracing::debug!(node = %assignment.node, input = %assignment.input, value = %assignment.value, "applying override");
        if let Err(fault) = input.next(assignment.value.clone()) {
            tracing::warn!(node = %assignment.node, input = %assignment.input, "override faulted: {fault}");
            faults.push(fault);
        }
    }
    built.circuit.prune();

    let stable_ids: std::collections::HashMap<_, _> = built.node_ids.iter().map(|(stable, id)| (*id, stable.clone())).collect();
    let mut nodes = Vec::with_capacity(built.circuit.node_count());
    for node_id in built.circuit.topological_order()? {
        let Some(node) = built.circuit.node(node_id) else {
            continue;
        };
        nodes.push(NodeReport {
            id: stable_ids.get(&node_id).cloned().unwrap_or_else(|| node_id.to_string()),
            kind: node.kind().to_string(),
            outputs: node
                .outputs()
                .iter()
                .map(|(key, output)| (key.clone(), output.value()))
                .collect(),
        });
    }

    let validation_failures = failures.borrow().clone();
    Ok(RunReport {
        nodes,
        validation_failures,
        faults,
    })
}
