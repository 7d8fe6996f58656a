//! Secondary index definitions.
//!
//! An index is declared over one or more paths into the table row. A path
//! is a sequence of steps:
//!
//! ```text
//! address.city        field steps
//! phones[].kind       array elements, then a field of each element
//! props.keys()        the keys of a map
//! props.values().v    a field of each map value
//! ```
//!
//! An index is *multi-key* when any of its paths fans out over the elements
//! of an array or the entries of a map, since one row can then produce many
//! index entries. It is *map-both* when it indexes the keys and the values of
//! the same map.

use crate::error::{Error, Result};
use crate::types::ItemType;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

/// One step of an index path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// Navigate into a named field of a record or a map entry.
    Field(String),
    /// All elements of an array (`[]`).
    Elements,
    /// All keys of a map (`.keys()`).
    Keys,
    /// All values of a map (`.values()`, or `[]` applied to a map).
    Values,
}

impl PathStep {
    /// Returns true for steps that fan out over a container.
    #[inline]
    pub fn is_multi_key(&self) -> bool {
        !matches!(self, PathStep::Field(_))
    }
}

/// A parsed index path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexPath {
    steps: Vec<PathStep>,
}

impl IndexPath {
    /// Creates a path from explicit steps.
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    /// Parses a textual index path such as `a.b[].c` or `m.keys()`.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(Error::invalid_schema("Index path cannot be empty"));
        }
        let mut steps = Vec::new();
        for token in text.split('.') {
            match token {
                "keys()" => steps.push(PathStep::Keys),
                "values()" => steps.push(PathStep::Values),
                _ => {
                    let name = token.trim_end_matches("[]");
                    let brackets = (token.len() - name.len()) / 2;
                    if name.is_empty()
                        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                        || token.len() != name.len() + brackets * 2
                    {
                        return Err(Error::invalid_schema(format!(
                            "Invalid step '{}' in index path {}",
                            token, text
                        )));
                    }
                    steps.push(PathStep::Field(name.to_string()));
                    for _ in 0..brackets {
                        steps.push(PathStep::Elements);
                    }
                }
            }
        }
        if steps.first().map_or(true, PathStep::is_multi_key) {
            return Err(Error::invalid_schema(format!(
                "Index path must start with a field name: {}",
                text
            )));
        }
        Ok(Self { steps })
    }

    #[inline]
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Returns the top-level field this path starts from.
    pub fn root_field(&self) -> &str {
        match self.steps.first() {
            Some(PathStep::Field(name)) => name,
            _ => "",
        }
    }

    /// Returns true if the path fans out over a container.
    pub fn is_multi_key(&self) -> bool {
        self.steps.iter().any(PathStep::is_multi_key)
    }

    /// Returns true if the path is a single top-level field.
    pub fn is_top_level_field(&self) -> bool {
        self.steps.len() == 1
    }

    /// Returns the prefix leading to the map whose keys this path indexes.
    pub fn keys_prefix(&self) -> Option<&[PathStep]> {
        match self.steps.last() {
            Some(PathStep::Keys) => Some(&self.steps[..self.steps.len() - 1]),
            _ => None,
        }
    }

    /// Returns the map prefix and the suffix after a values step.
    pub fn split_at_values(&self) -> Option<(&[PathStep], &[PathStep])> {
        let pos = self.steps.iter().position(|s| *s == PathStep::Values)?;
        Some((&self.steps[..pos], &self.steps[pos + 1..]))
    }

    pub(crate) fn steps_mut(&mut self) -> &mut Vec<PathStep> {
        &mut self.steps
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                PathStep::Field(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
                PathStep::Elements => write!(f, "[]")?,
                PathStep::Keys => write!(f, ".keys()")?,
                PathStep::Values => write!(f, ".values()")?,
            }
        }
        Ok(())
    }
}

/// A secondary index definition.
#[derive(Clone, Debug)]
pub struct IndexDef {
    /// Index name.
    name: String,
    /// Table name this index belongs to.
    table_name: String,
    /// Indexed paths, in declaration order.
    paths: Vec<IndexPath>,
    /// Resolved item type of each indexed path.
    field_types: Vec<ItemType>,
}

impl IndexDef {
    /// Creates a new index definition. Field types are resolved when the
    /// index is attached to a table.
    pub fn new(name: impl Into<String>, table_name: impl Into<String>, paths: Vec<IndexPath>) -> Self {
        let field_types = paths.iter().map(|_| ItemType::Any).collect();
        Self {
            name: name.into(),
            table_name: table_name.into(),
            paths,
            field_types,
        }
    }

    pub(crate) fn with_field_types(mut self, field_types: Vec<ItemType>) -> Self {
        self.field_types = field_types;
        self
    }

    pub(crate) fn paths_mut(&mut self) -> &mut Vec<IndexPath> {
        &mut self.paths
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the normalized name (table.index).
    pub fn normalized_name(&self) -> String {
        format!("{}.{}", self.table_name, self.name)
    }

    #[inline]
    pub fn paths(&self) -> &[IndexPath] {
        &self.paths
    }

    #[inline]
    pub fn num_fields(&self) -> usize {
        self.paths.len()
    }

    /// Returns the resolved item type of the field at `pos`.
    pub fn field_type(&self, pos: usize) -> &ItemType {
        self.field_types.get(pos).unwrap_or(&ItemType::Any)
    }

    /// Returns true if any indexed path fans out over a container.
    pub fn is_multi_key(&self) -> bool {
        self.paths.iter().any(IndexPath::is_multi_key)
    }

    /// Returns true if the field at `pos` fans out over a container.
    pub fn is_multi_key_field(&self, pos: usize) -> bool {
        self.paths.get(pos).map_or(false, IndexPath::is_multi_key)
    }

    /// Returns the position of the `keys()` field of a map-both index, that
    /// is a keys path whose map is also indexed through a values path.
    pub fn map_keys_position(&self) -> Option<usize> {
        self.paths.iter().position(|p| match p.keys_prefix() {
            Some(prefix) => self.paths.iter().any(|other| {
                other
                    .split_at_values()
                    .map_or(false, |(map, _)| map == prefix)
            }),
            None => false,
        })
    }

    /// Returns true if the index covers both the keys and values of a map.
    pub fn is_map_both(&self) -> bool {
        self.map_keys_position().is_some()
    }
}

impl PartialEq for IndexDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.table_name == other.table_name
    }
}
