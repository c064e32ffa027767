//! Structural Interpolation
//!
//! Tween values are a small dynamic union: numbers, dates, lists, and maps.
//! Interpolation between two values resolves the pair's shape exactly once
//! into an [`Interpolator`] plan; each animation frame then just evaluates
//! the plan, with no per-step type inspection.
//!
//! Shapes are driven by the *target* value: a list interpolates over the
//! target's length and a map over the target's keys, and the source must
//! supply a counterpart for each. Any mismatch is a [`TweenError`] at plan
//! build time, never mid-animation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreValue;

/// A value a tweened store can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TweenValue {
    /// A plain number.
    Number(f64),
    /// A point in time, as milliseconds since the Unix epoch.
    Date(i64),
    /// Element-wise interpolated list.
    List(Vec<TweenValue>),
    /// Key-wise interpolated map, in insertion order.
    Map(IndexMap<String, TweenValue>),
}

impl TweenValue {
    /// Short label for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            TweenValue::Number(_) => "number",
            TweenValue::Date(_) => "date",
            TweenValue::List(_) => "list",
            TweenValue::Map(_) => "map",
        }
    }

    /// The contained number, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            TweenValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl StoreValue for TweenValue {
    fn value_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TweenValue::Number(a), TweenValue::Number(b)) => a.value_eq(b),
            (TweenValue::Date(a), TweenValue::Date(b)) => a == b,
            (TweenValue::List(a), TweenValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.value_eq(y))
            }
            (TweenValue::Map(a), TweenValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.value_eq(vb))
            }
            _ => false,
        }
    }
}

impl From<f64> for TweenValue {
    fn from(value: f64) -> Self {
        TweenValue::Number(value)
    }
}

impl From<i32> for TweenValue {
    fn from(value: i32) -> Self {
        TweenValue::Number(value.into())
    }
}

impl From<Vec<TweenValue>> for TweenValue {
    fn from(values: Vec<TweenValue>) -> Self {
        TweenValue::List(values)
    }
}

impl TryFrom<serde_json::Value> for TweenValue {
    type Error = TweenError;

    /// Settings payloads arrive as JSON; numbers, arrays, and objects map
    /// directly. Strings, booleans, and null have no interpolation and are
    /// rejected.
    fn try_from(value: serde_json::Value) -> Result<Self, TweenError> {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(TweenValue::Number)
                .ok_or(TweenError::Unsupported("number out of range")),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(TweenValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(TweenValue::List),
            serde_json::Value::Object(entries) => entries
                .into_iter()
                .map(|(key, value)| TweenValue::try_from(value).map(|v| (key, v)))
                .collect::<Result<IndexMap<_, _>, _>>()
                .map(TweenValue::Map),
            serde_json::Value::String(_) => Err(TweenError::Unsupported("string")),
            serde_json::Value::Bool(_) => Err(TweenError::Unsupported("boolean")),
            serde_json::Value::Null => Err(TweenError::Unsupported("null")),
        }
    }
}

impl From<&TweenValue> for serde_json::Value {
    fn from(value: &TweenValue) -> Self {
        match value {
            TweenValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            TweenValue::Date(ms) => serde_json::Value::Number((*ms).into()),
            TweenValue::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            TweenValue::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), serde_json::Value::from(value)))
                    .collect(),
            ),
        }
    }
}

/// Why a tween request was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TweenError {
    /// Source and target have different shapes.
    #[error("cannot interpolate between {from} and {to}")]
    ShapeMismatch {
        from: &'static str,
        to: &'static str,
    },

    /// The source list is shorter than the target.
    #[error("cannot interpolate a list of {from} elements toward {to}")]
    ShortList { from: usize, to: usize },

    /// The source map lacks a key the target has.
    #[error("interpolation source is missing key `{0}`")]
    MissingKey(String),

    /// The value cannot be animated at all.
    #[error("unsupported value for interpolation: {0}")]
    Unsupported(&'static str),
}

/// A resolved interpolation plan mirroring the target's shape.
pub enum Interpolator {
    Number { a: f64, d: f64 },
    Date { a: f64, d: f64 },
    List(Vec<Interpolator>),
    Map(Vec<(String, Interpolator)>),
    /// Supplied by a custom interpolate option.
    Custom(Box<dyn Fn(f64) -> TweenValue + Send + Sync>),
}

impl Interpolator {
    /// Resolve the plan for a sweep from `from` to `to`.
    pub fn between(from: &TweenValue, to: &TweenValue) -> Result<Self, TweenError> {
        match (from, to) {
            (TweenValue::Number(a), TweenValue::Number(b)) => Ok(Interpolator::Number {
                a: *a,
                d: b - a,
            }),
            (TweenValue::Date(a), TweenValue::Date(b)) => Ok(Interpolator::Date {
                a: *a as f64,
                d: (b - a) as f64,
            }),
            (TweenValue::List(from_items), TweenValue::List(to_items)) => {
                if from_items.len() < to_items.len() {
                    return Err(TweenError::ShortList {
                        from: from_items.len(),
                        to: to_items.len(),
                    });
                }
                to_items
                    .iter()
                    .enumerate()
                    .map(|(index, target)| Interpolator::between(&from_items[index], target))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Interpolator::List)
            }
            (TweenValue::Map(from_entries), TweenValue::Map(to_entries)) => to_entries
                .iter()
                .map(|(key, target)| {
                    let source = from_entries
                        .get(key)
                        .ok_or_else(|| TweenError::MissingKey(key.clone()))?;
                    Interpolator::between(source, target).map(|plan| (key.clone(), plan))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Interpolator::Map),
            (from, to) => Err(TweenError::ShapeMismatch {
                from: from.kind(),
                to: to.kind(),
            }),
        }
    }

    /// Evaluate the plan at eased progress `t`.
    pub fn at(&self, t: f64) -> TweenValue {
        match self {
            Interpolator::Number { a, d } => TweenValue::Number(a + d * t),
            Interpolator::Date { a, d } => TweenValue::Date((a + d * t).round() as i64),
            Interpolator::List(plans) => {
                TweenValue::List(plans.iter().map(|plan| plan.at(t)).collect())
            }
            Interpolator::Map(plans) => TweenValue::Map(
                plans
                    .iter()
                    .map(|(key, plan)| (key.clone(), plan.at(t)))
                    .collect(),
            ),
            Interpolator::Custom(f) => f(t),
        }
    }
}

impl std::fmt::Debug for Interpolator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interpolator::Number { a, d } => {
                f.debug_struct("Number").field("a", a).field("d", d).finish()
            }
            Interpolator::Date { a, d } => {
                f.debug_struct("Date").field("a", a).field("d", d).finish()
            }
            Interpolator::List(plans) => f.debug_tuple("List").field(&plans.len()).finish(),
            Interpolator::Map(plans) => f.debug_tuple("Map").field(&plans.len()).finish(),
            Interpolator::Custom(_) => f.write_str("Custom"),
        }
    }
}
