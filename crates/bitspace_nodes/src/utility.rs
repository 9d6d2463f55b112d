// SPDX-License-Identifier: MIT OR Apache-2.0
//! Literal, text and logic nodes.

use crate::schemas::{any, boolean, number, string};
use bitspace_circuit::{IdGenerator, Node, NodeCategory, NodeError, NodeRegistry, NodeType, Value};

/// Holds a literal value and exposes it on its output
pub fn literal(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    Node::builder("literal", ids)
        .name("Value")
        .input("value", "Value", any(), Value::Null)
        .output("value", "Value", any(), &["value"], |values| values[0].clone())
        .build()
}

/// Textual rendering of any value
pub fn to_text(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    Node::builder("to_text", ids)
        .name("To Text")
        .input("value", "Value", any(), Value::Null)
        .output("text", "Text", string(), &["value"], |values| match &values[0] {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        })
        .build()
}

/// Join two strings
pub fn concat(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    Node::builder("concat", ids)
        .name("Concat")
        .input("a", "A", string(), Value::from(""))
        .input("b", "B", string(), Value::from(""))
        .output("output", "Output", string(), &["a", "b"], |values| {
            Value::String(values.iter().filter_map(Value::as_str).collect())
        })
        .build()
}

/// Number of characters in a string
pub fn length(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    Node::builder("length", ids)
        .name("Length")
        .input("text", "Text", string(), Value::from(""))
        .output("length", "Length", number(), &["text"], |values| {
            Value::Number(values[0].as_str().map_or(0, |s| s.chars().count()) as f64)
        })
        .build()
}

/// Pick `a` when the condition holds, `b` otherwise
pub fn select(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    Node::builder("select", ids)
        .name("Select")
        .input("condition", "Condition", boolean(), Value::Bool(false))
        .input("a", "A", any(), Value::Null)
        .input("b", "B", any(), Value::Null)
        .output("output", "Output", any(), &["condition", "a", "b"], |values| {
            if values[0].as_bool().unwrap_or(false) {
                values[1].clone()
            } else {
                values[2].clone()
            }
        })
        .build()
}

/// Register every utility node
pub fn register(registry: &mut NodeRegistry) {
    registry.register(NodeType::new("literal", "Value", NodeCategory::Input, literal).with_description("A literal value"));
    registry.register(
        NodeType::new("to_text", "To Text", NodeCategory::String, to_text).with_description("Renders any value as text"),
    );
    registry.register(NodeType::new("concat", "Concat", NodeCategory::String, concat).with_description("Joins two strings"));
    registry.register(NodeType::new("length", "Length", NodeCategory::String, length).with_description("Counts characters"));
    registry.register(
        NodeType::new("select", "Select", NodeCategory::Utility, select).with_description("Chooses between two values"),
    );
}
