//! shardql Query - Query compiler for the shardql sharded document store.
//!
//! This crate turns a translated query into an executable plan:
//!
//! - `expr`: Expression graph with parent back-references and memoized types
//! - `functions`: Built-in function registry
//! - `context`: Metadata catalog and compile options
//! - `optimizer`: Index analysis, index selection and distribution passes
//! - `codegen`: Register allocation and physical plan generation
//! - `control`: Query control block driving the compilation pipeline

#![no_std]

extern crate alloc;

pub mod codegen;
pub mod context;
pub mod control;
pub mod expr;
pub mod functions;
pub mod optimizer;

pub use context::{Catalog, CompileOptions, ScoreWeights};
pub use control::{DdlOperation, DdlStatement, QueryControlBlock, QueryFrontend, Translation};
