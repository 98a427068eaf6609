//! Cell values carried through every dataset stage.
//!
//! A [`Value`] is either a scalar, a native nested structure (list or map), or the
//! explicit [`Value::Unparseable`] marker produced by the structural normalizer when a
//! serialized payload could not be decoded by any parser in the chain.
//!
//! # Serialized form
//! Values serialize to plain JSON. The only non-JSON case, the unparseable marker, is
//! written as a single-key object `{"__unparseable__": "<raw text>"}` so cache and sink
//! artifacts round-trip it losslessly.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved key / token used to represent [`Value::Unparseable`] outside the process.
pub const UNPARSEABLE_MARKER: &str = "__unparseable__";

/// A single table cell.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A serialized nested payload that no parser could decode. Holds the raw text.
    Unparseable(String),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `true` for lists and maps.
    #[must_use]
    pub const fn is_nested(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_))
    }

    #[must_use]
    pub const fn is_unparseable(&self) -> bool {
        matches!(self, Self::Unparseable(_))
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of ints and floats. Strings are not coerced here; see
    /// [`Value::coerce_f64`].
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Lenient numeric coercion: numbers pass, numeric strings are parsed, everything
    /// else (including booleans and unparseable text) is `None`.
    #[must_use]
    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            Self::Int(_) | Self::Float(_) => self.as_f64().filter(|f| f.is_finite()),
            Self::Str(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Follow a path of map keys into a nested value.
    #[must_use]
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(self, |cur, key| cur.as_map()?.get(*key))
    }

    /// Canonical text rendering, used for category labels and flat file cells.
    ///
    /// Nulls render empty, nested values render as compact JSON, and the unparseable
    /// marker renders as [`UNPARSEABLE_MARKER`].
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => render_float(*f),
            Self::Str(s) => s.clone(),
            Self::List(_) | Self::Map(_) => self.to_json().to_string(),
            Self::Unparseable(_) => UNPARSEABLE_MARKER.to_string(),
        }
    }

    /// Convert into a `serde_json::Value`, encoding the marker as a reserved object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::Number((*i).into()),
            Self::Float(f) => Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<Map<_, _>>(),
            ),
            Self::Unparseable(raw) => {
                let mut obj = Map::new();
                obj.insert(UNPARSEABLE_MARKER.to_string(), serde_json::Value::String(raw.clone()));
                serde_json::Value::Object(obj)
            }
        }
    }

    /// Inverse of [`Value::to_json`].
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            serde_json::Value::Object(mut obj) => {
                if obj.len() == 1
                    && obj.get(UNPARSEABLE_MARKER).is_some_and(serde_json::Value::is_string)
                    && let Some(serde_json::Value::String(raw)) = obj.remove(UNPARSEABLE_MARKER)
                {
                    return Self::Unparseable(raw);
                }
                Self::Map(obj.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }
}

/// Floats keep a decimal point so they stay distinguishable from ints in flat files.
fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from_json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Self::Null, Self::Int)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
