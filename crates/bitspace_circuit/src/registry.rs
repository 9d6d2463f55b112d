// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry mapping node type discriminators to constructors.

use crate::ids::IdGenerator;
use crate::node::{Node, NodeError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Input nodes (constants, parameters)
    Input,
    /// Output nodes (result, preview)
    Output,
    /// Math operations
    Math,
    /// Color operations
    Color,
    /// String operations
    String,
    /// Utility nodes
    Utility,
    /// Custom/user-defined
    Custom,
}

/// Constructs a fresh node instance
pub type NodeConstructor = Rc<dyn Fn(&dyn IdGenerator) -> Result<Node, NodeError>>;

/// Node type definition
#[derive(Clone)]
pub struct NodeType {
    /// Unique type discriminator
    pub kind: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Constructor
    pub constructor: NodeConstructor,
}

impl NodeType {
    /// Create a node type definition
    pub fn new<F>(kind: impl Into<String>, name: impl Into<String>, category: NodeCategory, constructor: F) -> Self
    where
        F: Fn(&dyn IdGenerator) -> Result<Node, NodeError> + 'static,
    {
        Self {
            kind: kind.into(),
            name: name.into(),
            category,
            description: String::new(),
            constructor: Rc::new(constructor),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl std::fmt::Debug for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeType")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Registry of available node types
#[derive(Debug, Default)]
pub struct NodeRegistry {
    types: IndexMap<String, NodeType>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type, replacing any type with the same discriminator
    pub fn register(&mut self, node_type: NodeType) {
        self.types.insert(node_type.kind.clone(), node_type);
    }

    /// Get a node type by discriminator
    pub fn get(&self, kind: &str) -> Option<&NodeType> {
        self.types.get(kind)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Get types by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeType> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Instantiate a node of the given type; `None` if the type is unknown
    pub fn create_node(&self, kind: &str, ids: &dyn IdGenerator) -> Option<Result<Node, NodeError>> {
        self.get(kind).map(|node_type| (node_type.constructor)(ids))
    }
}
