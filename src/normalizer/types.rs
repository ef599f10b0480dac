use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One element of the bulk snapshot, kept as the untouched JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCard {
    pub fields: Map<String, Value>,
}

impl RawCard {
    /// Returns `None` for elements that are not JSON objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// A non-empty string field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// How a card name matched a query. Prefix matches order before substring matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchRank {
    Prefix,
    Substring,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizeError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid timestamp in '{field}': {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}
