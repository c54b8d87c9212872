//! Per-table field codec registry.
//!
//! A [`Schema`] maps field names to a closed set of codec kinds and applies
//! them at the four data boundaries: input formatting before SQL generation,
//! output formatting after a store read, and whole-row serialize/deserialize
//! for cache storage.

use crate::Row;
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Caller-supplied codec function for [`FieldType::Custom`].
pub type CodecFn = dyn Fn(&Value) -> Result<Value> + Send + Sync;

/// The closed set of field codec kinds.
///
/// Resolved once at registration; fields absent from the schema pass through
/// output formatting unchanged and are stripped from input.
#[derive(Clone)]
pub enum FieldType {
    /// No transformation in either direction.
    Any,
    /// Stored as JSON text: input is JSON-encoded, output is parsed.
    Json,
    /// Stored as `0`/`1`: input folds truthy values, output yields a boolean.
    Bool,
    /// Stored as-is, normalized to an RFC 3339 UTC string when a cached row
    /// is deserialized.
    Date,
    /// Caller-supplied input/output pair.
    Custom {
        input: Arc<CodecFn>,
        output: Arc<CodecFn>,
    },
}

impl FieldType {
    /// Build a custom codec from an input/output closure pair.
    pub fn custom<I, O>(input: I, output: O) -> Self
    where
        I: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
        O: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Custom {
            input: Arc::new(input),
            output: Arc::new(output),
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Json => f.write_str("Json"),
            Self::Bool => f.write_str("Bool"),
            Self::Date => f.write_str("Date"),
            Self::Custom { .. } => f.write_str("Custom"),
        }
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "json" => Ok(Self::Json),
            "bool" => Ok(Self::Bool),
            "date" => Ok(Self::Date),
            other => Err(Error::config(format!("unsupported field type \"{other}\""))),
        }
    }
}

/// Field codec registry for one table.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: HashMap<String, FieldType>,
}

impl Schema {
    /// Create a schema from field definitions.
    pub fn new(fields: impl IntoIterator<Item = (String, FieldType)>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Whether `name` is registered with the `json` codec. Condition and
    /// update rendering uses this to treat single-key maps under json fields
    /// as data rather than operators.
    pub fn is_json_field(&self, name: &str) -> bool {
        matches!(self.fields.get(name), Some(FieldType::Json))
    }

    /// Whether `name` is registered at all.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Format caller-supplied data before it reaches SQL generation.
    ///
    /// Fields without a schema entry are dropped; this is the mechanism that
    /// strips unknown caller keys from write payloads.
    pub fn format_input(&self, row: &Row) -> Result<Row> {
        let mut out = Row::new();
        for (name, value) in row {
            let Some(field) = self.fields.get(name) else {
                continue;
            };
            out.insert(name.clone(), self.apply_input(field, value)?);
        }
        Ok(out)
    }

    /// [`Schema::format_input`] over a list of rows.
    pub fn format_input_list(&self, rows: &[Row]) -> Result<Vec<Row>> {
        rows.iter().map(|row| self.format_input(row)).collect()
    }

    /// Format a store-returned row for the caller. Never drops fields;
    /// database rows are trusted.
    pub fn format_output(&self, row: &Row) -> Result<Row> {
        let mut out = Row::new();
        for (name, value) in row {
            let formatted = match self.fields.get(name) {
                Some(field) => self.apply_output(field, name, value)?,
                None => value.clone(),
            };
            out.insert(name.clone(), formatted);
        }
        Ok(out)
    }

    /// [`Schema::format_output`] over a list of rows.
    pub fn format_output_list(&self, rows: &[Row]) -> Result<Vec<Row>> {
        rows.iter().map(|row| self.format_output(row)).collect()
    }

    /// Encode a whole row as JSON text for cache storage.
    ///
    /// The per-field cache encoder is identity for every codec kind (`date`
    /// stores whatever the row carries), so this is a single JSON pass.
    pub fn serialize(&self, row: &Row) -> Result<String> {
        Ok(serde_json::to_string(row)?)
    }

    /// Decode cache text back into a row, applying per-field decoders.
    pub fn deserialize(&self, text: &str) -> Result<Row> {
        let parsed: Row = serde_json::from_str(text)?;
        let mut out = Row::new();
        for (name, value) in parsed {
            let decoded = match self.fields.get(&name) {
                Some(FieldType::Date) => decode_date(&name, &value)?,
                _ => value,
            };
            out.insert(name, decoded);
        }
        Ok(out)
    }

    fn apply_input(&self, field: &FieldType, value: &Value) -> Result<Value> {
        match field {
            FieldType::Any | FieldType::Date => Ok(value.clone()),
            FieldType::Json => Ok(Value::String(serde_json::to_string(value)?)),
            FieldType::Bool => Ok(Value::from(bool_input(value))),
            FieldType::Custom { input, .. } => input(value),
        }
    }

    fn apply_output(&self, field: &FieldType, name: &str, value: &Value) -> Result<Value> {
        match field {
            FieldType::Any | FieldType::Date => Ok(value.clone()),
            FieldType::Json => decode_json(name, value),
            FieldType::Bool => Ok(Value::Bool(truthy(value))),
            FieldType::Custom { output, .. } => output(value),
        }
    }
}

/// Truthy folding for the `bool` input codec: `null`, `false`, `0` and the
/// usual "off" strings become `0`, everything else `1`.
fn bool_input(value: &Value) -> u64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => u64::from(*b),
        Value::Number(n) => u64::from(n.as_f64() != Some(0.0)),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "" | "no" | "off" | "false" | "0" => 0,
            _ => 1,
        },
        Value::Array(_) | Value::Object(_) => 1,
    }
}

/// Truthiness for the `bool` output codec.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Decode a `json` field from its stored text form.
///
/// `null` passes through (the column was never set), an empty string decodes
/// to `{}`, anything that is not a string is a decode error.
fn decode_json(field: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) if s.is_empty() => Ok(Value::Object(Row::new())),
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| Error::decode(field, format!("failed to parse JSON {s:?}: {e}"))),
        other => Err(Error::decode(
            field,
            format!("invalid input type for json field: {other}"),
        )),
    }
}

/// Decode a `date` field: numbers are epoch milliseconds, strings parse as
/// RFC 3339 or `YYYY-MM-DD HH:MM:SS`. Normalizes to an RFC 3339 UTC string.
fn decode_date(field: &str, value: &Value) -> Result<Value> {
    let datetime = match value {
        Value::Null => return Ok(Value::Null),
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .ok_or_else(|| Error::decode(field, format!("invalid date timestamp: {n}")))?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| Error::decode(field, format!("invalid date timestamp: {millis}")))?
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|n| n.and_utc())
            })
            .map_err(|e| Error::decode(field, format!("invalid date value {s:?}: {e}")))?,
        other => {
            return Err(Error::decode(
                field,
                format!("invalid input type for date field: {other}"),
            ));
        }
    };
    Ok(Value::String(
        datetime.to_rfc3339_opts(SecondsFormat::Secs, true),
    ))
}
