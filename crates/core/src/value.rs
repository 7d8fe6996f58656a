//! Value type definitions.
//!
//! This module defines the `Value` enum which represents any constant item
//! a query can mention: literals, bound external variables, and the keys
//! pushed into an index scan.

use crate::types::ItemType;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

/// A constant item.
#[derive(Clone, Debug)]
pub enum Value {
    /// SQL null
    Null,
    /// JSON null
    JsonNull,
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Integer(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 64-bit floating point
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Timestamp stored as milliseconds since the epoch
    Timestamp(i64),
    /// Binary data
    Binary(Vec<u8>),
    /// Array of items
    Array(Vec<Value>),
    /// Map from string keys to items
    Map(BTreeMap<String, Value>),
    /// The empty sequence
    Empty,
}

impl Value {
    /// Returns the item type of this value.
    pub fn item_type(&self) -> ItemType {
        match self {
            Value::Null => ItemType::Any,
            Value::JsonNull => ItemType::Json,
            Value::Boolean(_) => ItemType::Boolean,
            Value::Integer(_) => ItemType::Integer,
            Value::Long(_) => ItemType::Long,
            Value::Double(_) => ItemType::Double,
            Value::String(_) => ItemType::String,
            Value::Timestamp(_) => ItemType::Timestamp,
            Value::Binary(_) => ItemType::Binary,
            Value::Array(items) => {
                let elem = items
                    .iter()
                    .map(Value::item_type)
                    .reduce(|a, b| a.union(&b))
                    .unwrap_or(ItemType::Any);
                ItemType::array(elem)
            }
            Value::Map(entries) => {
                let value = entries
                    .values()
                    .map(Value::item_type)
                    .reduce(|a, b| a.union(&b))
                    .unwrap_or(ItemType::Any);
                ItemType::map(value)
            }
            Value::Empty => ItemType::Empty,
        }
    }

    /// Returns true if this value is SQL null or JSON null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::JsonNull)
    }

    /// Returns true if this value is the empty sequence.
    #[inline]
    pub fn is_empty_seq(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Returns true for atomic (non-container) values.
    pub fn is_atomic(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Map(_) | Value::Empty)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as an i64 if it is an integral number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as an f64 if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Compares two atomic values the way a value comparison operator does.
    ///
    /// Numbers of different widths compare by numeric value. Returns None
    /// when the values are not comparable (different kinds, nulls, or
    /// containers).
    pub fn compare_atomic(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
            (Value::Double(a), b) if b.as_f64().is_some() => a.partial_cmp(&b.as_f64()?),
            (a, Value::Double(b)) if a.as_f64().is_some() => a.as_f64()?.partial_cmp(b),
            (a, b) => Some(a.as_i64()?.cmp(&b.as_i64()?)),
        }
    }

    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Empty => 0,
            Value::Null => 1,
            Value::JsonNull => 2,
            Value::Boolean(_) => 3,
            Value::Integer(_) | Value::Long(_) | Value::Double(_) => 4,
            Value::String(_) => 5,
            Value::Timestamp(_) => 6,
            Value::Binary(_) => 7,
            Value::Array(_) => 8,
            Value::Map(_) => 9,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order used for deduplication and structural comparison. Numbers
/// compare by value; NaN sorts after every other number.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            (Value::Double(a), _) if a.is_nan() && other.as_f64().is_some() => Ordering::Greater,
            (_, Value::Double(b)) if b.is_nan() && self.as_f64().is_some() => Ordering::Less,
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => match self.compare_atomic(other) {
                Some(ord) => ord,
                None => self.type_order().cmp(&other.type_order()),
            },
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_order().hash(state);
        match self {
            Value::Null | Value::JsonNull | Value::Empty => {}
            Value::Boolean(b) => b.hash(state),
            // Equal numbers of different widths must hash alike.
            Value::Integer(_) | Value::Long(_) | Value::Double(_) => {
                let f = self.as_f64().unwrap_or(0.0);
                if f.is_finite() && libm::trunc(f) == f {
                    (f as i64).hash(state)
                } else {
                    f.to_bits().hash(state)
                }
            }
            Value::String(s) => s.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::Binary(b) => b.hash(state),
            Value::Array(items) => items.hash(state),
            Value::Map(entries) => entries.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::JsonNull => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Long(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{:?}", d),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Timestamp(t) => write!(f, "TIMESTAMP({})", t),
            Value::Binary(b) => write!(f, "BINARY({} bytes)", b.len()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Empty => write!(f, "EMPTY"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
