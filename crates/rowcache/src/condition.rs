//! Condition and update operator types.
//!
//! The dynamic map forms accepted by the query builder (`{"$in": [...]}`,
//! `{"$like": "..."}`, `{"$incr": n}`) resolve into these closed enums with
//! one exhaustive renderer each; unknown operator tags are rejected with the
//! contract-mandated named errors.

use crate::error::{Error, Result};
use crate::escape::{escape_id, escape_value};
use serde_json::Value;

/// A single-field condition operator.
#[derive(Debug, Clone)]
pub enum CondValue {
    /// `` `field`=value ``
    Eq(Value),
    /// `` `field` IN (a, b, c) ``
    In(Vec<Value>),
    /// `` `field` LIKE 'pattern' ``
    Like(String),
}

impl CondValue {
    /// Create an `IN` condition.
    pub fn in_list(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::In(values.into_iter().map(Into::into).collect())
    }

    /// Create a `LIKE` condition.
    pub fn like(pattern: impl Into<String>) -> Self {
        Self::Like(pattern.into())
    }

    /// Resolve a raw condition value for `field`.
    ///
    /// A single-key map dispatches as an operator (unknown tags are named
    /// errors) unless `is_json_field` says the field stores JSON, in which
    /// case the map is plain data. Everything else is an equality.
    pub fn from_field_value(field: &str, value: &Value, is_json_field: bool) -> Result<Self> {
        if !is_json_field {
            if let Value::Object(map) = value {
                let mut entries = map.iter();
                if let (Some((op, inner)), None) = (entries.next(), entries.next()) {
                    return match op.as_str() {
                        "$in" => match inner {
                            Value::Array(items) => Ok(Self::In(items.clone())),
                            _ => Err(Error::validation(format!(
                                "value for condition type $in in field {field} must be an array"
                            ))),
                        },
                        "$like" => match inner {
                            Value::String(s) => Ok(Self::Like(s.clone())),
                            _ => Err(Error::validation(format!(
                                "value for condition type $like in {field} must be a string"
                            ))),
                        },
                        other => Err(Error::validation(format!(
                            "condition type {other} does not supported"
                        ))),
                    };
                }
            }
        }
        Ok(Self::Eq(value.clone()))
    }

    /// Render this condition as a SQL fragment.
    pub fn render(&self, field: &str) -> String {
        let id = escape_id(field);
        match self {
            Self::Eq(value) => format!("{id}={}", escape_value(value)),
            Self::In(items) => {
                let list = items
                    .iter()
                    .map(escape_value)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{id} IN ({list})")
            }
            Self::Like(pattern) => {
                format!("{id} LIKE {}", escape_value(&Value::String(pattern.clone())))
            }
        }
    }
}

/// A single-field update operator.
#[derive(Debug, Clone)]
pub enum SetValue {
    /// `` `field`=value ``
    Assign(Value),
    /// `` `field`=`field`+n ``
    Incr(Value),
}

impl SetValue {
    /// Create an increment assignment.
    pub fn incr(amount: impl Into<Value>) -> Self {
        Self::Incr(amount.into())
    }

    /// Resolve a raw update value, dispatching single-key maps as operators
    /// by the same rule as [`CondValue::from_field_value`].
    pub fn from_field_value(value: &Value, is_json_field: bool) -> Result<Self> {
        if !is_json_field {
            if let Value::Object(map) = value {
                let mut entries = map.iter();
                if let (Some((op, inner)), None) = (entries.next(), entries.next()) {
                    return match op.as_str() {
                        "$incr" => Ok(Self::Incr(inner.clone())),
                        other => Err(Error::validation(format!(
                            "update type {other} does not supported"
                        ))),
                    };
                }
            }
        }
        Ok(Self::Assign(value.clone()))
    }

    /// Render this assignment as a SQL fragment.
    pub fn render(&self, field: &str) -> String {
        let id = escape_id(field);
        match self {
            Self::Assign(value) => format!("{id}={}", escape_value(value)),
            Self::Incr(amount) => format!("{id}={id}+{}", escape_value(amount)),
        }
    }
}
