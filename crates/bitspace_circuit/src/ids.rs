// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identifier generation.
//!
//! Nodes, ports and connections draw their UUIDs from an [`IdGenerator`].
//! Production code uses [`RandomIds`]; tests use [`SequentialIds`] so that
//! identifiers are reproducible between runs.

use std::cell::Cell;
use uuid::Uuid;

/// Source of fresh identifiers
pub trait IdGenerator {
    /// Produce a new, never before returned UUID
    fn next_uuid(&self) -> Uuid;
}

/// Random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic UUIDs counting up from a start value
#[derive(Debug)]
pub struct SequentialIds {
    next: Cell<u128>,
}

impl SequentialIds {
    /// Start counting at `start`
    pub fn starting_at(start: u128) -> Self {
        Self {
            next: Cell::new(start),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator for SequentialIds {
    fn next_uuid(&self) -> Uuid {
        let id = self.next.get();
        self.next.set(id.wrapping_add(1));
        Uuid::from_u128(id)
    }
}
