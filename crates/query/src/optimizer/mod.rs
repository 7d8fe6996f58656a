//! Query optimizer module.

mod distributor;
mod index_analyzer;
mod index_selection;
mod pass;
mod path;
mod predicate;

pub use distributor::Distributor;
pub use index_selection::IndexSelection;
pub use pass::OptimizerPass;

use crate::context::{Catalog, CompileOptions};
use crate::expr::ExprGraph;
use alloc::boxed::Box;
use alloc::vec::Vec;
use shardql_core::Result;
use tracing::debug;

/// Query optimizer that applies optimization passes in order.
pub struct Optimizer<'a> {
    passes: Vec<Box<dyn OptimizerPass + 'a>>,
}

impl<'a> Optimizer<'a> {
    /// Creates an optimizer with the default passes:
    /// 1. IndexSelection - Choose an index per table scan and push predicates into it
    /// 2. Distributor - Split query blocks at the receive boundary
    pub fn new(catalog: &'a Catalog, options: &'a CompileOptions) -> Self {
        Self {
            passes: alloc::vec![
                Box::new(IndexSelection::new(catalog, options)),
                Box::new(Distributor::new(catalog)),
            ],
        }
    }

    /// Creates an optimizer with custom passes.
    pub fn with_passes(passes: Vec<Box<dyn OptimizerPass + 'a>>) -> Self {
        Self { passes }
    }

    /// Returns the passes in application order.
    pub fn passes(&self) -> impl Iterator<Item = &(dyn OptimizerPass + 'a)> {
        self.passes.iter().map(|p| p.as_ref())
    }

    /// Optimizes the graph in place. Stops at the first failing pass.
    pub fn optimize(&self, graph: &mut ExprGraph) -> Result<()> {
        graph.infer_types();
        for pass in &self.passes {
            debug!(pass = pass.name(), "running optimizer pass");
            pass.apply(graph)?;
        }
        Ok(())
    }
}
