//! Schema module.
//!
//! This module contains the table metadata the compiler consults: top-level
//! fields, primary and shard keys, and secondary index definitions.

mod field;
mod index;
mod table;

pub use field::FieldDef;
pub use index::{IndexDef, IndexPath, PathStep};
pub use table::{TableBuilder, TableDef};
