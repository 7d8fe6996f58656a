//! Optimizer pass trait.

use crate::expr::ExprGraph;
use shardql_core::Result;

/// An optimization pass that rewrites an expression graph in place.
///
/// A pass that fails may leave the graph partially rewritten.
pub trait OptimizerPass {
    /// Rewrites the given graph.
    fn apply(&self, graph: &mut ExprGraph) -> Result<()>;

    /// Returns the name of this pass.
    fn name(&self) -> &'static str {
        "unnamed"
    }
}
