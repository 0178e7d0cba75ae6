//! Filters over stored events and snapshot documents.
//!
//! A [`Filter`] is a conjunction of conditions on dot-separated paths into the
//! JSON form of a record (`eventName`, `body.datetime`, `state.updatedDatetime`, ...).
//! The in-memory store evaluates it directly; the Postgres store translates it
//! into `jsonb` predicates.

use core::cmp::Ordering;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Comparison applied by one [`Condition`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// `value` is a boolean: whether the path must be present.
    Exists,
    /// `value` is an array; matches if the path equals any element.
    In,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub path: String,
    pub op: Op,
    pub value: JsonValue,
}

/// Conjunction of conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

/// Order of events by `eventCreatedAt`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_match_all(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn with(mut self, path: impl Into<String>, op: Op, value: impl Into<JsonValue>) -> Self {
        self.conditions.push(Condition {
            path: path.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn equals(self, path: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.with(path, Op::Eq, value)
    }

    pub fn not_equals(self, path: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.with(path, Op::Ne, value)
    }

    pub fn gt(self, path: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.with(path, Op::Gt, value)
    }

    pub fn gte(self, path: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.with(path, Op::Gte, value)
    }

    pub fn lt(self, path: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.with(path, Op::Lt, value)
    }

    pub fn lte(self, path: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.with(path, Op::Lte, value)
    }

    pub fn exists(self, path: impl Into<String>, present: bool) -> Self {
        self.with(path, Op::Exists, present)
    }

    pub fn is_in(self, path: impl Into<String>, values: Vec<JsonValue>) -> Self {
        self.with(path, Op::In, JsonValue::Array(values))
    }

    /// Evaluate against the JSON form of a record.
    pub fn matches(&self, doc: &JsonValue) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

impl Condition {
    pub fn matches(&self, doc: &JsonValue) -> bool {
        let found = lookup(doc, &self.path);
        match self.op {
            Op::Exists => found.is_some() == self.value.as_bool().unwrap_or(true),
            Op::Eq => found.is_some_and(|v| json_eq(v, &self.value)),
            Op::Ne => !found.is_some_and(|v| json_eq(v, &self.value)),
            Op::In => match (&self.value, found) {
                (JsonValue::Array(options), Some(v)) => options.iter().any(|o| json_eq(v, o)),
                _ => false,
            },
            Op::Gt => ordered(found, &self.value, |o| o == Ordering::Greater),
            Op::Gte => ordered(found, &self.value, |o| o != Ordering::Less),
            Op::Lt => ordered(found, &self.value, |o| o == Ordering::Less),
            Op::Lte => ordered(found, &self.value, |o| o != Ordering::Greater),
        }
    }
}

/// Resolve a dot-separated path. Missing segments and explicit nulls are absent.
pub fn lookup<'a>(doc: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            JsonValue::Object(fields) => fields.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

fn ordered(found: Option<&JsonValue>, expected: &JsonValue, accept: impl Fn(Ordering) -> bool) -> bool {
    found
        .and_then(|v| compare(v, expected))
        .is_some_and(accept)
}

/// Total order within one JSON scalar kind; `None` across kinds.
///
/// Two RFC 3339 strings compare as instants (fractional precision varies in
/// serialized timestamps); other strings compare lexicographically.
pub fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => Some(x.cmp(&y)),
                _ => Some(x.cmp(y)),
            }
        }
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(_), JsonValue::Number(_)) | (JsonValue::String(_), JsonValue::String(_)) => {
            compare(a, b) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}
