//! Top-level field definition for a table schema.

use crate::types::ItemType;
use alloc::string::String;

/// A top-level field of a table row.
#[derive(Clone, Debug)]
pub struct FieldDef {
    /// Field name.
    name: String,
    /// Item type of the field.
    item_type: ItemType,
    /// Whether this field may hold SQL null.
    nullable: bool,
    /// Field position in the row (0-based).
    position: usize,
}

impl FieldDef {
    /// Creates a new field definition. Fields are nullable unless they are
    /// part of the primary key.
    pub fn new(name: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            name: name.into(),
            item_type,
            nullable: true,
            position: 0,
        }
    }

    /// Sets whether this field is nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub(crate) fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn item_type(&self) -> &ItemType {
        &self.item_type
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns whether this field can be a primary key component.
    pub fn is_key_candidate(&self) -> bool {
        self.item_type.is_atomic() && !matches!(self.item_type, ItemType::Binary)
    }
}

impl PartialEq for FieldDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.item_type == other.item_type
    }
}
