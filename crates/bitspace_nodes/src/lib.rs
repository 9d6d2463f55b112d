// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node catalog and circuit builder for Bitspace.
//!
//! This crate provides the collaborators around the engine:
//! - The schema set used by the catalog (`Number`, `String`, `Color`, ...)
//! - Math, color, text and utility nodes
//! - A default [`NodeRegistry`] with every catalog node
//! - RON circuit descriptions and the builder that instantiates them

pub mod color;
pub mod description;
pub mod math;
pub mod schemas;
pub mod utility;

pub use description::{BuildError, BuiltCircuit, CircuitDescription, ConnectionDescription, Endpoint, NodeDescription};

use bitspace_circuit::NodeRegistry;

/// Create a registry holding every catalog node
pub fn create_default_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    math::register(&mut registry);
    color::register(&mut registry);
    utility::register(&mut registry);
    registry
}
