// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed reactive dataflow engine for Bitspace.
//!
//! Nodes expose named, schema-typed inputs and outputs. Connections wire an
//! output to an input and forward every value after validating it against the
//! input's schema. Values propagate synchronously and depth-first, so a change
//! has reached every downstream port by the time the call that caused it
//! returns.
//!
//! ## Architecture
//!
//! - [`stream::Subject`]: multicast publisher with last-value replay
//! - [`Input`] / [`Output`]: typed endpoints built on subjects
//! - [`Connection`]: validated, disposable edge with replace-on-connect
//! - [`Node`]: fixed port maps with pure output derivations
//! - [`Circuit`]: graph container with cycle checks and change events
//!
//! The engine is single-threaded: handles are `Rc`-based and not `Send`.

pub mod circuit;
pub mod connection;
pub mod error;
pub mod events;
pub mod ids;
pub mod node;
pub mod port;
pub mod registry;
pub mod schema;
pub mod stream;
pub mod value;

pub use circuit::{Circuit, CircuitError};
pub use connection::{ConnectOptions, Connection, ConnectionId, ConnectionState};
pub use error::{PropagationError, TypeMismatch};
pub use events::{CircuitEvent, EventBus};
pub use ids::{IdGenerator, RandomIds, SequentialIds};
pub use node::{Node, NodeBuilder, NodeError, NodeId};
pub use port::{Input, Output, PortId};
pub use registry::{NodeCategory, NodeRegistry, NodeType};
pub use schema::{Mismatch, Schema, SchemaKind};
pub use value::Value;
