//! Expression graph: node kinds, arena, type inference, structural
//! matching and construction helpers.

mod builder;
mod graph;
mod matching;
mod node;
mod typing;

pub(crate) use builder::validate_hints;
pub use builder::SfwBuilder;
pub use graph::{ExprGraph, ExprNode};
pub use node::{
    DistributionKind, ExprId, ExprKind, FieldRange, FromClause, HintTarget, IndexHint,
    MapFilterKind, ReceiveExpr, SelectField, SfwExpr, SortKey, SortSpec, TableScan, VarExpr,
    VarKind,
};
