//! Table definition.

use super::field::FieldDef;
use super::index::{IndexDef, IndexPath, PathStep};
use crate::error::{Error, Result};
use crate::types::ItemType;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// A table definition in the metadata snapshot.
#[derive(Clone, Debug)]
pub struct TableDef {
    /// Table name.
    name: String,
    /// Top-level fields.
    fields: Vec<FieldDef>,
    /// Primary key field names, in key order.
    primary_key: Vec<String>,
    /// Number of leading primary key fields that form the shard key.
    shard_key_len: usize,
    /// Secondary indexes.
    indexes: Vec<IndexDef>,
}

impl TableDef {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Gets a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Gets a field position by name.
    pub fn get_field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    /// Returns the primary key field names in key order.
    #[inline]
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Returns the position of a field within the primary key.
    pub fn primary_key_position(&self, name: &str) -> Option<usize> {
        self.primary_key.iter().position(|k| k == name)
    }

    /// Returns the row positions of the primary key fields, in key order.
    pub fn primary_key_field_positions(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|k| self.get_field_position(k))
            .collect()
    }

    #[inline]
    pub fn shard_key_len(&self) -> usize {
        self.shard_key_len
    }

    #[inline]
    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    /// Gets a secondary index by name.
    pub fn get_index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name() == name)
    }

    /// Returns the record type of a row of this table.
    pub fn row_type(&self) -> ItemType {
        ItemType::Record(
            self.fields
                .iter()
                .map(|f| (f.name().to_string(), f.item_type().clone()))
                .collect(),
        )
    }

    /// Resolves the item type an index path selects, normalizing `[]` over
    /// a map into a values step.
    fn resolve_path(&self, path: &mut IndexPath) -> Result<ItemType> {
        let text = path.to_string();
        let mut current = self.row_type();
        for step in path.steps_mut().iter_mut() {
            let mut map_elements = false;
            let next = match (&*step, &current) {
                (_, ItemType::Json) => ItemType::Json,
                (PathStep::Field(name), ItemType::Record(_) | ItemType::Map(_)) => current
                    .field_type(name)
                    .ok_or_else(|| Error::column_not_found(&self.name, name.as_str()))?,
                (PathStep::Elements, ItemType::Array(elem)) => (**elem).clone(),
                (PathStep::Elements, ItemType::Map(value)) => {
                    map_elements = true;
                    (**value).clone()
                }
                (PathStep::Values, ItemType::Map(value)) => (**value).clone(),
                (PathStep::Keys, ItemType::Map(_)) => ItemType::String,
                _ => {
                    return Err(Error::invalid_schema(format!(
                        "Index path {} does not match the type of table {}",
                        text, self.name
                    )))
                }
            };
            if map_elements {
                *step = PathStep::Values;
            }
            current = next;
        }
        if !(current.is_atomic() || current == ItemType::Json) {
            return Err(Error::invalid_schema(format!(
                "Index path {} does not select atomic values",
                text
            )));
        }
        Ok(current)
    }
}

/// Builder for creating table definitions.
pub struct TableBuilder {
    name: String,
    fields: Vec<FieldDef>,
    primary_key: Vec<String>,
    shard_key_len: Option<usize>,
    indexes: Vec<(String, Vec<String>)>,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            fields: Vec::new(),
            primary_key: Vec::new(),
            shard_key_len: None,
            indexes: Vec::new(),
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let mut chars = name.chars();
        match chars.next() {
            None => return Err(Error::invalid_schema("Name cannot be empty")),
            Some(first) if !first.is_ascii_alphabetic() && first != '_' => {
                return Err(Error::invalid_schema(format!(
                    "Name must start with letter or underscore: {}",
                    name
                )))
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a top-level field.
    pub fn add_field(mut self, name: impl Into<String>, item_type: ItemType) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        if self.fields.iter().any(|f| f.name() == name) {
            return Err(Error::invalid_schema(format!("Field already exists: {}", name)));
        }
        self.fields.push(FieldDef::new(name, item_type));
        Ok(self)
    }

    /// Marks fields as not nullable.
    pub fn add_not_null(mut self, names: &[&str]) -> Self {
        for name in names {
            if let Some(f) = self.fields.iter_mut().find(|f| f.name() == *name) {
                *f = f.clone().nullable(false);
            }
        }
        self
    }

    /// Sets the primary key.
    pub fn primary_key(mut self, names: &[&str]) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::invalid_schema("Primary key cannot be empty"));
        }
        for name in names {
            match self.fields.iter().find(|f| f.name() == *name) {
                None => {
                    return Err(Error::invalid_schema(format!("Field not found: {}", name)))
                }
                Some(f) if !f.is_key_candidate() => {
                    return Err(Error::invalid_schema(format!(
                        "Field cannot be a primary key component: {}",
                        name
                    )))
                }
                Some(_) => {}
            }
        }
        self.primary_key = names.iter().map(|n| n.to_string()).collect();
        Ok(self.add_not_null(names))
    }

    /// Sets the shard key, which must be a prefix of the primary key.
    pub fn shard_key(mut self, names: &[&str]) -> Result<Self> {
        let is_prefix = names.len() <= self.primary_key.len()
            && names
                .iter()
                .zip(self.primary_key.iter())
                .all(|(a, b)| *a == b.as_str());
        if names.is_empty() || !is_prefix {
            return Err(Error::invalid_schema(
                "Shard key must be a non-empty prefix of the primary key",
            ));
        }
        self.shard_key_len = Some(names.len());
        Ok(self)
    }

    /// Adds a secondary index over the given paths.
    pub fn add_index(mut self, name: impl Into<String>, paths: &[&str]) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        if paths.is_empty() {
            return Err(Error::invalid_schema(format!("Index {} has no fields", name)));
        }
        if self.indexes.iter().any(|(n, _)| *n == name) {
            return Err(Error::invalid_schema(format!("Index already exists: {}", name)));
        }
        self.indexes
            .push((name, paths.iter().map(|p| p.to_string()).collect()));
        Ok(self)
    }

    /// Builds the table definition, resolving every index path against the
    /// row type.
    pub fn build(self) -> Result<TableDef> {
        if self.primary_key.is_empty() {
            return Err(Error::invalid_schema(format!(
                "Table {} has no primary key",
                self.name
            )));
        }
        let fields = self
            .fields
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.with_position(i))
            .collect();
        let mut table = TableDef {
            name: self.name,
            fields,
            shard_key_len: self.shard_key_len.unwrap_or(self.primary_key.len()),
            primary_key: self.primary_key,
            indexes: Vec::new(),
        };

        let mut indexes = Vec::with_capacity(self.indexes.len());
        for (name, texts) in self.indexes {
            let paths = texts
                .iter()
                .map(|t| IndexPath::parse(t))
                .collect::<Result<Vec<_>>>()?;
            let mut index = IndexDef::new(name, table.name.clone(), paths);
            let mut types = Vec::with_capacity(index.num_fields());
            for path in index.paths_mut().iter_mut() {
                types.push(table.resolve_path(path)?);
            }
            indexes.push(index.with_field_types(types));
        }
        table.indexes = indexes;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDef {
        TableBuilder::new("users")
            .unwrap()
            .add_field("id", ItemType::Integer)
            .unwrap()
            .add_field("name", ItemType::String)
            .unwrap()
            .add_field("tags", ItemType::array(ItemType::String))
            .unwrap()
            .add_field("props", ItemType::map(ItemType::Long))
            .unwrap()
            .primary_key(&["id"])
            .unwrap()
            .add_index("idx_name", &["name"])
            .unwrap()
            .add_index("idx_tags", &["tags[]"])
            .unwrap()
            .add_index("idx_props", &["props.keys()", "props[]"])
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_table_basics() {
        let t = users();
        assert_eq!(t.name(), "users");
        assert_eq!(t.fields().len(), 4);
        assert_eq!(t.primary_key(), &["id".to_string()]);
        assert_eq!(t.shard_key_len(), 1);
        assert!(!t.get_field("id").unwrap().is_nullable());
        assert_eq!(t.get_field_position("tags"), Some(2));
        assert_eq!(t.primary_key_field_positions(), alloc::vec![0]);
    }

    #[test]
    fn test_index_resolution() {
        let t = users();
        let tags = t.get_index("idx_tags").unwrap();
        assert!(tags.is_multi_key());
        assert_eq!(tags.field_type(0), &ItemType::String);

        // `props[]` over a map is normalized to a values step.
        let props = t.get_index("idx_props").unwrap();
        assert_eq!(props.paths()[1].steps()[1], PathStep::Values);
        assert!(props.is_map_both());
        assert_eq!(props.field_type(1), &ItemType::Long);
    }

    #[test]
    fn test_invalid_definitions() {
        let base = || {
            TableBuilder::new("t")
                .unwrap()
                .add_field("id", ItemType::Integer)
                .unwrap()
                .add_field("arr", ItemType::array(ItemType::Integer))
                .unwrap()
        };
        assert!(TableBuilder::new("1bad").is_err());
        assert!(base().add_field("id", ItemType::Long).is_err());
        assert!(base().primary_key(&["arr"]).is_err());
        assert!(base().build().is_err());
        // Index over a whole array without [] selects a non-atomic value.
        let res = base()
            .primary_key(&["id"])
            .unwrap()
            .add_index("idx_arr", &["arr"])
            .unwrap()
            .build();
        assert!(res.is_err());
        assert!(base()
            .primary_key(&["id"])
            .unwrap()
            .shard_key(&["arr"])
            .is_err());
    }
}
