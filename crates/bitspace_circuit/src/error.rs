// SPDX-License-Identifier: MIT OR Apache-2.0
//! Faults raised while values propagate through a circuit.

use crate::connection::ConnectionId;
use crate::port::PortId;
use crate::schema::Mismatch;
use std::fmt;

/// A value failed the schema of the input it was sent to
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("type mismatch on input {to:?}: {mismatch}")]
pub struct TypeMismatch {
    /// Connection that carried the value, `None` for direct assignment
    pub connection: Option<ConnectionId>,
    /// Output the value came from, `None` for direct assignment
    pub from: Option<PortId>,
    /// Input that rejected the value
    pub to: PortId,
    /// Schema diagnostics
    #[source]
    pub mismatch: Mismatch,
}

/// Every fault raised during one propagation step.
///
/// Propagation never stops at the first fault: sibling subscribers still
/// receive the value, and the faults they produce are collected here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationError {
    faults: Vec<TypeMismatch>,
}

impl PropagationError {
    /// All collected faults, in the order they occurred
    pub fn faults(&self) -> &[TypeMismatch] {
        &self.faults
    }

    /// The first fault
    pub fn first(&self) -> Option<&TypeMismatch> {
        self.faults.first()
    }

    /// Whether no fault was collected
    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    /// Append the faults of another error
    pub fn merge(&mut self, other: PropagationError) {
        self.faults.extend(other.faults);
    }

    /// Absorb the error side of a result
    pub fn absorb(&mut self, result: Result<(), PropagationError>) {
        if let Err(err) = result {
            self.merge(err);
        }
    }

    /// `Ok` when empty, `Err(self)` otherwise
    pub fn into_result(self) -> Result<(), PropagationError> {
        if self.faults.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<TypeMismatch> for PropagationError {
    fn from(fault: TypeMismatch) -> Self {
        Self { faults: vec![fault] }
    }
}

impl fmt::Display for PropagationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.faults.as_slice() {
            [] => write!(f, "no propagation faults"),
            [single] => write!(f, "{single}"),
            [first, rest @ ..] => write!(f, "{first} (and {} more)", rest.len()),
        }
    }
}

impl std::error::Error for PropagationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.faults
            .first()
            .map(|fault| fault as &(dyn std::error::Error + 'static))
    }
}
