//! Tagged values captured by instrumentation calls.
//!
//! [`TraceValue`] is the wire-level representation of a snippet variable at
//! the moment of a `capture_step` call. It is deliberately small: scalars,
//! null, homogeneous-or-not lists, and an opaque object descriptor for
//! everything else.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered mapping from variable name to captured value.
///
/// Insertion order follows the order of the key/value arguments in the
/// instrumentation call. A repeated key keeps its first position but takes
/// the last value.
pub type Variables = IndexMap<String, TraceValue>;

/// A captured runtime value.
///
/// Serialized adjacently tagged, e.g. `{"type":"int","value":3}` or
/// `{"type":"null"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TraceValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    Null,
    List(Vec<TraceValue>),
    /// Descriptor for values with no structured representation.
    Object(String),
}

impl TraceValue {
    /// Returns the string content when this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TraceValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, as used in the serialized tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            TraceValue::Str(_) => "str",
            TraceValue::Int(_) => "int",
            TraceValue::Float(_) => "float",
            TraceValue::Bool(_) => "bool",
            TraceValue::Char(_) => "char",
            TraceValue::Null => "null",
            TraceValue::List(_) => "list",
            TraceValue::Object(_) => "object",
        }
    }
}

impl fmt::Display for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceValue::Str(s) => write!(f, "{s}"),
            TraceValue::Int(v) => write!(f, "{v}"),
            TraceValue::Float(v) => write!(f, "{v}"),
            TraceValue::Bool(v) => write!(f, "{v}"),
            TraceValue::Char(c) => write!(f, "{c}"),
            TraceValue::Null => write!(f, "null"),
            TraceValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            TraceValue::Object(desc) => write!(f, "{desc}"),
        }
    }
}

/// Builds a [`Variables`] map from an alternating key/value sequence.
///
/// Keys that are not strings are converted with their display form. A
/// trailing key without a value is ignored.
pub fn from_alternating(items: Vec<TraceValue>) -> Variables {
    let mut vars = Variables::new();
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let key = match key {
            TraceValue::Str(s) => s,
            other => other.to_string(),
        };
        vars.insert(key, value);
    }
    vars
}

// Conversions used by the in-process instrumentation API.

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for TraceValue {
            fn from(v: $t) -> Self {
                TraceValue::Int(v as i64)
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! impl_from_wide_int {
    ($($t:ty),*) => {
        $(impl From<$t> for TraceValue {
            fn from(v: $t) -> Self {
                match i64::try_from(v) {
                    Ok(v) => TraceValue::Int(v),
                    Err(_) => TraceValue::Object(v.to_string()),
                }
            }
        })*
    };
}

impl_from_wide_int!(u64, usize, isize, i128, u128);

impl From<f32> for TraceValue {
    fn from(v: f32) -> Self {
        TraceValue::Float(v as f64)
    }
}

impl From<f64> for TraceValue {
    fn from(v: f64) -> Self {
        TraceValue::Float(v)
    }
}

impl From<bool> for TraceValue {
    fn from(v: bool) -> Self {
        TraceValue::Bool(v)
    }
}

impl From<char> for TraceValue {
    fn from(v: char) -> Self {
        TraceValue::Char(v)
    }
}

impl From<&str> for TraceValue {
    fn from(v: &str) -> Self {
        TraceValue::Str(v.to_string())
    }
}

impl From<String> for TraceValue {
    fn from(v: String) -> Self {
        TraceValue::Str(v)
    }
}

impl<T: Into<TraceValue>> From<Option<T>> for TraceValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(TraceValue::Null, Into::into)
    }
}

impl<T: Into<TraceValue>> From<Vec<T>> for TraceValue {
    fn from(v: Vec<T>) -> Self {
        TraceValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Clone + Into<TraceValue>> From<&[T]> for TraceValue {
    fn from(v: &[T]) -> Self {
        TraceValue::List(v.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Clone + Into<TraceValue>> From<&Vec<T>> for TraceValue {
    fn from(v: &Vec<T>) -> Self {
        TraceValue::from(v.as_slice())
    }
}

impl<T: Clone + Into<TraceValue>, const N: usize> From<[T; N]> for TraceValue {
    fn from(v: [T; N]) -> Self {
        TraceValue::List(v.into_iter().map(Into::into).collect())
    }
}
