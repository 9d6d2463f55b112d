// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime schemas used to type-tag ports.
//!
//! A [`Schema`] is a named validator over [`Value`]s. Validation may coerce:
//! object schemas drop fields that are not part of their shape, and union
//! schemas return whatever their first accepting alternative produced.
//! Ports share schemas through [`Arc`], so one schema may type many ports.

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Why a value was rejected by a schema
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{schema}: {reason}{}", at_path(.path))]
pub struct Mismatch {
    /// Name of the rejecting schema
    pub schema: String,
    /// Field path inside the value (empty for the root)
    pub path: String,
    /// Human readable reason
    pub reason: String,
}

fn at_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" at `{path}`")
    }
}

impl Mismatch {
    fn new(schema: &str, reason: impl Into<String>) -> Self {
        Self {
            schema: schema.to_string(),
            path: String::new(),
            reason: reason.into(),
        }
    }

    fn at(mut self, segment: &str) -> Self {
        self.path = if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{segment}.{}", self.path)
        };
        self
    }
}

/// The tagged shape of a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaKind {
    /// Accepts every value
    Any,
    /// Booleans
    Boolean,
    /// Finite or infinite numbers (never NaN), optionally bounded inclusively
    Number {
        /// Lower bound
        min: Option<f64>,
        /// Upper bound
        max: Option<f64>,
    },
    /// Strings with optional prefix and length (in chars) constraints
    String {
        /// Required prefix
        starts_with: Option<String>,
        /// Minimum length
        min_len: Option<usize>,
        /// Maximum length
        max_len: Option<usize>,
    },
    /// Homogeneous list
    List(Box<Schema>),
    /// Object with a fixed shape
    Object(IndexMap<String, Schema>),
    /// `Null` or the inner schema
    Optional(Box<Schema>),
    /// First accepting alternative wins
    Union(Vec<Schema>),
}

/// A named runtime type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name for diagnostics
    pub name: String,
    /// Validation rules
    pub kind: SchemaKind,
}

impl Schema {
    /// Create a schema
    pub fn new(name: impl Into<String>, kind: SchemaKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Schema accepting anything
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, SchemaKind::Any)
    }

    /// Schema accepting booleans
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, SchemaKind::Boolean)
    }

    /// Schema accepting any number
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, SchemaKind::Number { min: None, max: None })
    }

    /// Schema accepting numbers in `[min, max]`
    pub fn number_in(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(
            name,
            SchemaKind::Number {
                min: Some(min),
                max: Some(max),
            },
        )
    }

    /// Schema accepting any string
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(
            name,
            SchemaKind::String {
                starts_with: None,
                min_len: None,
                max_len: None,
            },
        )
    }

    /// Object schema built from `(field, schema)` pairs
    pub fn object<K, I>(name: impl Into<String>, fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        Self::new(
            name,
            SchemaKind::Object(fields.into_iter().map(|(k, s)| (k.into(), s)).collect()),
        )
    }

    /// Union of alternatives, tried in order
    pub fn union(name: impl Into<String>, alternatives: impl IntoIterator<Item = Schema>) -> Self {
        Self::new(name, SchemaKind::Union(alternatives.into_iter().collect()))
    }

    /// Wrap into a shareable handle
    pub fn shared(self) -> Arc<Schema> {
        Arc::new(self)
    }

    /// Check whether the schema accepts a value
    pub fn accepts(&self, value: &Value) -> bool {
        self.validate(value).is_ok()
    }

    /// Validate a value, returning the (possibly coerced) accepted value
    pub fn validate(&self, value: &Value) -> Result<Value, Mismatch> {
        match &self.kind {
            SchemaKind::Any => Ok(value.clone()),
            SchemaKind::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => Err(self.expected("boolean", other)),
            },
            SchemaKind::Number { min, max } => {
                let Value::Number(n) = value else {
                    return Err(self.expected("number", value));
                };
                if n.is_nan() {
                    return Err(Mismatch::new(&self.name, "expected number, received NaN"));
                }
                if let Some(min) = min {
                    if n < min {
                        return Err(Mismatch::new(&self.name, format!("{n} is less than {min}")));
                    }
                }
                if let Some(max) = max {
                    if n > max {
                        return Err(Mismatch::new(&self.name, format!("{n} is greater than {max}")));
                    }
                }
                Ok(value.clone())
            }
            SchemaKind::String {
                starts_with,
                min_len,
                max_len,
            } => {
                let Value::String(s) = value else {
                    return Err(self.expected("string", value));
                };
                if let Some(prefix) = starts_with {
                    if !s.starts_with(prefix.as_str()) {
                        return Err(Mismatch::new(
                            &self.name,
                            format!("expected string starting with {prefix:?}"),
                        ));
                    }
                }
                let len = s.chars().count();
                if let Some(min_len) = min_len {
                    if len < *min_len {
                        return Err(Mismatch::new(
                            &self.name,
                            format!("string shorter than {min_len} characters"),
                        ));
                    }
                }
                if let Some(max_len) = max_len {
                    if len > *max_len {
                        return Err(Mismatch::new(
                            &self.name,
                            format!("string longer than {max_len} characters"),
                        ));
                    }
                }
                Ok(value.clone())
            }
            SchemaKind::List(item) => {
                let Value::List(items) = value else {
                    return Err(self.expected("list", value));
                };
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| item.validate(v).map_err(|m| m.at(&i.to_string())))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
            SchemaKind::Object(shape) => {
                let Value::Object(fields) = value else {
                    return Err(self.expected("object", value));
                };
                let mut coerced = IndexMap::with_capacity(shape.len());
                for (name, field_schema) in shape {
                    let field = fields.get(name).unwrap_or(&Value::Null);
                    let accepted = field_schema.validate(field).map_err(|m| m.at(name))?;
                    coerced.insert(name.clone(), accepted);
                }
                Ok(Value::Object(coerced))
            }
            SchemaKind::Optional(inner) => match value {
                Value::Null => Ok(Value::Null),
                other => inner.validate(other),
            },
            SchemaKind::Union(alternatives) => alternatives
                .iter()
                .find_map(|alternative| alternative.validate(value).ok())
                .ok_or_else(|| {
                    let names: Vec<&str> = alternatives.iter().map(|a| a.name.as_str()).collect();
                    Mismatch::new(
                        &self.name,
                        format!(
                            "{} matched none of [{}]",
                            value.kind_name(),
                            names.join(", ")
                        ),
                    )
                }),
        }
    }

    fn expected(&self, expected: &str, received: &Value) -> Mismatch {
        Mismatch::new(
            &self.name,
            format!("expected {expected}, received {}", received.kind_name()),
        )
    }
}
