//! Item type and quantifier definitions.
//!
//! Every expression in a compiled query has a static type made of an item
//! type (what each produced item looks like) and a quantifier (how many items
//! the expression may produce).

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// The type of a single item.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// Any item at all.
    Any,
    /// Any atomic item.
    AnyAtomic,
    /// Boolean item.
    Boolean,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 64-bit floating point number.
    Double,
    /// Any numeric item.
    Number,
    /// UTF-8 string.
    String,
    /// Timestamp stored as milliseconds since the epoch.
    Timestamp,
    /// Binary data.
    Binary,
    /// Schemaless JSON data.
    Json,
    /// Record with an ordered set of named fields.
    Record(Vec<(String, ItemType)>),
    /// Array whose elements have the given type.
    Array(Box<ItemType>),
    /// Map from string keys to values of the given type.
    Map(Box<ItemType>),
    /// The type of the empty sequence.
    Empty,
}

impl ItemType {
    /// Creates an array type.
    pub fn array(elem: ItemType) -> Self {
        ItemType::Array(Box::new(elem))
    }

    /// Creates a map type.
    pub fn map(value: ItemType) -> Self {
        ItemType::Map(Box::new(value))
    }

    /// Returns true for atomic (non-container) types.
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            ItemType::AnyAtomic
                | ItemType::Boolean
                | ItemType::Integer
                | ItemType::Long
                | ItemType::Double
                | ItemType::Number
                | ItemType::String
                | ItemType::Timestamp
                | ItemType::Binary
        )
    }

    /// Returns true for numeric types.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ItemType::Integer | ItemType::Long | ItemType::Double | ItemType::Number
        )
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, ItemType::Array(_))
    }

    #[inline]
    pub fn is_map(&self) -> bool {
        matches!(self, ItemType::Map(_))
    }

    #[inline]
    pub fn is_record(&self) -> bool {
        matches!(self, ItemType::Record(_))
    }

    /// Returns true if the type carries no static information.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, ItemType::Any | ItemType::AnyAtomic | ItemType::Json)
    }

    /// Returns the element type of an array or the value type of a map.
    pub fn element_type(&self) -> ItemType {
        match self {
            ItemType::Array(elem) | ItemType::Map(elem) => (**elem).clone(),
            ItemType::Json => ItemType::Json,
            ItemType::Empty => ItemType::Empty,
            _ => ItemType::Any,
        }
    }

    /// Returns the type of the named field when this item is navigated by
    /// a field step, or None if the step can never select anything.
    pub fn field_type(&self, name: &str) -> Option<ItemType> {
        match self {
            ItemType::Record(fields) => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t.clone()),
            ItemType::Map(value) => Some((**value).clone()),
            ItemType::Json => Some(ItemType::Json),
            ItemType::Any => Some(ItemType::Any),
            // Field steps over arrays apply to each element.
            ItemType::Array(elem) => elem.field_type(name),
            ItemType::Empty => Some(ItemType::Empty),
            _ => None,
        }
    }

    /// Returns true if items of this type can be compared with items of
    /// `other` by a value or sequence comparison.
    pub fn is_comparable_with(&self, other: &ItemType) -> bool {
        if self.is_wildcard() || other.is_wildcard() {
            return true;
        }
        if matches!(self, ItemType::Empty) || matches!(other, ItemType::Empty) {
            return true;
        }
        if self.is_numeric() && other.is_numeric() {
            return true;
        }
        match (self, other) {
            (ItemType::Boolean, ItemType::Boolean)
            | (ItemType::String, ItemType::String)
            | (ItemType::Timestamp, ItemType::Timestamp)
            | (ItemType::Binary, ItemType::Binary) => true,
            (ItemType::Array(a), ItemType::Array(b)) => a.is_comparable_with(b),
            (ItemType::Map(a), ItemType::Map(b)) => a.is_comparable_with(b),
            (ItemType::Record(_), ItemType::Record(_)) => true,
            _ => false,
        }
    }

    /// Returns true if every item of this type is also an item of `other`.
    pub fn is_subtype_of(&self, other: &ItemType) -> bool {
        if self == other || matches!(other, ItemType::Any) || matches!(self, ItemType::Empty) {
            return true;
        }
        match other {
            ItemType::AnyAtomic => self.is_atomic(),
            ItemType::Number => self.is_numeric(),
            ItemType::Long => matches!(self, ItemType::Integer),
            ItemType::Json => matches!(
                self,
                ItemType::Integer
                    | ItemType::Long
                    | ItemType::Double
                    | ItemType::Number
                    | ItemType::String
                    | ItemType::Boolean
            ),
            ItemType::Array(b) => match self {
                ItemType::Array(a) => a.is_subtype_of(b),
                _ => false,
            },
            ItemType::Map(b) => match self {
                ItemType::Map(a) => a.is_subtype_of(b),
                _ => false,
            },
            _ => false,
        }
    }

    /// Returns the least common supertype of two item types.
    pub fn union(&self, other: &ItemType) -> ItemType {
        if self.is_subtype_of(other) {
            return other.clone();
        }
        if other.is_subtype_of(self) {
            return self.clone();
        }
        if self.is_numeric() && other.is_numeric() {
            return ItemType::Number;
        }
        if self.is_atomic() && other.is_atomic() {
            return ItemType::AnyAtomic;
        }
        match (self, other) {
            (ItemType::Array(a), ItemType::Array(b)) => ItemType::array(a.union(b)),
            (ItemType::Map(a), ItemType::Map(b)) => ItemType::map(a.union(b)),
            _ => ItemType::Any,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Any => write!(f, "ANY"),
            ItemType::AnyAtomic => write!(f, "ANY_ATOMIC"),
            ItemType::Boolean => write!(f, "BOOLEAN"),
            ItemType::Integer => write!(f, "INTEGER"),
            ItemType::Long => write!(f, "LONG"),
            ItemType::Double => write!(f, "DOUBLE"),
            ItemType::Number => write!(f, "NUMBER"),
            ItemType::String => write!(f, "STRING"),
            ItemType::Timestamp => write!(f, "TIMESTAMP"),
            ItemType::Binary => write!(f, "BINARY"),
            ItemType::Json => write!(f, "JSON"),
            ItemType::Record(fields) => {
                write!(f, "RECORD(")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", name, ty)?;
                }
                write!(f, ")")
            }
            ItemType::Array(elem) => write!(f, "ARRAY({})", elem),
            ItemType::Map(value) => write!(f, "MAP({})", value),
            ItemType::Empty => write!(f, "EMPTY"),
        }
    }
}

/// Cardinality of the sequence an expression produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Quantifier {
    /// Exactly one item.
    #[default]
    One,
    /// Zero or one item.
    Optional,
    /// Zero or more items.
    Star,
    /// One or more items.
    Plus,
}

impl Quantifier {
    /// Returns true if the quantifier allows at most one item.
    #[inline]
    pub fn is_scalar(self) -> bool {
        matches!(self, Quantifier::One | Quantifier::Optional)
    }

    /// Returns true if the quantifier allows zero items.
    #[inline]
    pub fn allows_empty(self) -> bool {
        matches!(self, Quantifier::Optional | Quantifier::Star)
    }

    /// Quantifier of an expression that yields either of two sequences.
    pub fn union(self, other: Quantifier) -> Quantifier {
        use Quantifier::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Star, _) | (_, Star) => Star,
            (One, Optional) | (Optional, One) => Optional,
            (One, Plus) | (Plus, One) => Plus,
            _ => Star,
        }
    }

    /// Quantifier of an expression that yields, for each item of a sequence
    /// quantified by `self`, a sequence quantified by `other`.
    pub fn product(self, other: Quantifier) -> Quantifier {
        use Quantifier::*;
        match (self, other) {
            (One, q) | (q, One) => q,
            (Optional, Optional) => Optional,
            (Plus, Plus) => Plus,
            _ => Star,
        }
    }
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quantifier::One => "",
            Quantifier::Optional => "?",
            Quantifier::Star => "*",
            Quantifier::Plus => "+",
        };
        f.write_str(s)
    }
}

/// Static type of an expression: item type plus quantifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExprType {
    pub item: ItemType,
    pub quant: Quantifier,
}

impl ExprType {
    pub fn new(item: ItemType, quant: Quantifier) -> Self {
        Self { item, quant }
    }

    /// Exactly one item of the given type.
    pub fn one(item: ItemType) -> Self {
        Self::new(item, Quantifier::One)
    }

    /// At most one item of the given type.
    pub fn optional(item: ItemType) -> Self {
        Self::new(item, Quantifier::Optional)
    }

    /// Any number of items of the given type.
    pub fn star(item: ItemType) -> Self {
        Self::new(item, Quantifier::Star)
    }

    /// The type of the empty sequence.
    pub fn empty() -> Self {
        Self::new(ItemType::Empty, Quantifier::Optional)
    }

    /// The type of a boolean predicate.
    pub fn boolean() -> Self {
        Self::one(ItemType::Boolean)
    }

    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.quant.is_scalar()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self.item, ItemType::Empty)
    }

    /// Returns the same item type with a different quantifier.
    pub fn with_quant(&self, quant: Quantifier) -> Self {
        Self::new(self.item.clone(), quant)
    }

    /// Least common supertype of two expression types.
    pub fn union(&self, other: &ExprType) -> ExprType {
        if self.is_empty() {
            return other.with_quant(other.quant.union(Quantifier::Optional));
        }
        if other.is_empty() {
            return self.with_quant(self.quant.union(Quantifier::Optional));
        }
        ExprType::new(self.item.union(&other.item), self.quant.union(other.quant))
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.item, self.quant)
    }
}
