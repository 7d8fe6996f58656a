//! Compilation context: the metadata snapshot and per-compilation options.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use shardql_core::schema::TableDef;
use shardql_core::{Error, Result};

/// Weights used by the index analyzer to score a candidate index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoreWeights {
    /// Per pushed equality predicate.
    pub equality: i32,
    /// Per pushed range bound on a simple index field.
    pub range: i32,
    /// Per pushed range bound on a multi-key index field.
    pub multikey_range: i32,
    /// Per filtering predicate on a simple index field.
    pub filtering: i32,
    /// Per filtering predicate on a multi-key index field.
    pub multikey_filtering: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            equality: 32,
            range: 16,
            multikey_range: 8,
            filtering: 16,
            multikey_filtering: 8,
        }
    }
}

/// Options controlling a single compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    /// When set, comparing incomparable types is an error; otherwise the
    /// comparison folds to false.
    pub strict_mode: bool,
    /// Index scoring weights.
    pub weights: ScoreWeights,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            strict_mode: true,
            weights: ScoreWeights::default(),
        }
    }
}

impl CompileOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets strict mode.
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Overrides the scoring weights.
    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }
}

/// Read-only metadata snapshot consulted during compilation.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableDef>,
}

impl Catalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Registers a table definition, replacing any previous one.
    pub fn register_table(&mut self, table: TableDef) {
        self.tables.insert(table.name().to_string(), table);
    }

    /// Builder-style variant of `register_table`.
    pub fn with_table(mut self, table: TableDef) -> Self {
        self.register_table(table);
        self
    }

    /// Gets a table definition.
    pub fn get_table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    /// Gets a table definition or fails with an unknown-table error.
    pub fn table(&self, name: &str) -> Result<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::table_not_found(name))
    }

    /// Iterates over all registered tables.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardql_core::schema::TableBuilder;
    use shardql_core::ItemType;

    #[test]
    fn test_catalog_lookup() {
        let table = TableBuilder::new("users")
            .unwrap()
            .add_field("id", ItemType::Integer)
            .unwrap()
            .primary_key(&["id"])
            .unwrap()
            .build()
            .unwrap();
        let catalog = Catalog::new().with_table(table);

        assert!(catalog.get_table("users").is_some());
        assert!(catalog.table("users").is_ok());
        assert!(matches!(
            catalog.table("orders"),
            Err(Error::TableNotFound { .. })
        ));
        assert_eq!(catalog.tables().count(), 1);
    }

    #[test]
    fn test_default_options() {
        let opts = CompileOptions::default();
        assert!(opts.strict_mode);
        assert_eq!(opts.weights.equality, 32);
        assert_eq!(opts.weights.multikey_range, 8);

        let lenient = CompileOptions::new().with_strict_mode(false);
        assert!(!lenient.strict_mode);
    }
}
