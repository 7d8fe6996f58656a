//! shardql Core - Core types and metadata definitions for the shardql query compiler.
//!
//! This crate provides the foundational types shared by every compiler stage:
//!
//! - `ItemType`, `Quantifier`, `ExprType`: the static type model of expressions
//! - `Value`: constant items (literals, bound keys)
//! - `schema`: table metadata (fields, primary/shard key, secondary indexes)
//! - `Error`: error taxonomy with source locations
//!
//! # Example
//!
//! ```rust
//! use shardql_core::ItemType;
//! use shardql_core::schema::TableBuilder;
//!
//! let table = TableBuilder::new("users")
//!     .unwrap()
//!     .add_field("id", ItemType::Integer)
//!     .unwrap()
//!     .add_field("tags", ItemType::array(ItemType::String))
//!     .unwrap()
//!     .primary_key(&["id"])
//!     .unwrap()
//!     .add_index("idx_tags", &["tags[]"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! assert!(table.get_index("idx_tags").unwrap().is_multi_key());
//! ```

#![no_std]

extern crate alloc;

mod error;
pub mod schema;
mod types;
mod value;

pub use error::{Error, ErrorCategory, Location, Result};
pub use types::{ExprType, ItemType, Quantifier};
pub use value::Value;
