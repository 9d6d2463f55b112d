// SPDX-License-Identifier: MIT OR Apache-2.0
//! Arithmetic nodes.

use crate::schemas::number;
use bitspace_circuit::{IdGenerator, Node, NodeCategory, NodeError, NodeRegistry, NodeType, Value};

fn numbers(values: &[Value]) -> impl Iterator<Item = f64> + '_ {
    values.iter().map(|v| v.as_number().unwrap_or_default())
}

fn binary(kind: &str, name: &str, ids: &dyn IdGenerator, op: fn(f64, f64) -> f64) -> Result<Node, NodeError> {
    Node::builder(kind, ids)
        .name(name)
        .input("a", "A", number(), Value::from(0))
        .input("b", "B", number(), Value::from(0))
        .output("output", "Output", number(), &["a", "b"], move |values| {
            let mut operands = numbers(values);
            let a = operands.next().unwrap_or_default();
            let b = operands.next().unwrap_or_default();
            Value::Number(op(a, b))
        })
        .build()
}

/// `a + b`
pub fn addition(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    binary("addition", "Addition", ids, |a, b| a + b)
}

/// `a - b`
pub fn subtraction(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    binary("subtraction", "Subtraction", ids, |a, b| a - b)
}

/// `a * b`
pub fn multiplication(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    binary("multiplication", "Multiplication", ids, |a, b| a * b)
}

/// `a / b`; division by zero yields zero
pub fn division(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    binary("division", "Division", ids, |a, b| if b == 0.0 { 0.0 } else { a / b })
}

/// Running total of every value received on `step`
pub fn counter(ids: &dyn IdGenerator) -> Result<Node, NodeError> {
    Node::builder("counter", ids)
        .name("Counter")
        .input("step", "Step", number(), Value::from(0))
        .accumulate("total", "Total", number(), &["step"], Value::from(0), |previous, values| {
            let previous = previous.as_number().unwrap_or_default();
            Value::Number(previous + numbers(values).sum::<f64>())
        })
        .build()
}

/// Register every math node
pub fn register(registry: &mut NodeRegistry) {
    registry.register(NodeType::new("addition", "Addition", NodeCategory::Math, addition).with_description("Adds two numbers"));
    registry.register(
        NodeType::new("subtraction", "Subtraction", NodeCategory::Math, subtraction).with_description("Subtracts B from A"),
    );
    registry.register(
        NodeType::new("multiplication", "Multiplication", NodeCategory::Math, multiplication)
            .with_description("Multiplies two numbers"),
    );
    registry.register(NodeType::new("division", "Division", NodeCategory::Math, division).with_description("Divides A by B"));
    registry.register(NodeType::new("counter", "Counter", NodeCategory::Math, counter).with_description("Sums every step it receives"));
}
