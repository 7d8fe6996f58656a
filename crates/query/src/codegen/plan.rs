//! Compiled plan steps.

use crate::expr::{DistributionKind, ExprId, MapFilterKind, SortSpec};
use crate::functions::FuncCode;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use shardql_core::{ExprType, Value};

/// How a query-block step orders its output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKind {
    /// No ORDER BY.
    None,
    /// The index scan already returns rows in the requested order.
    Index,
    /// The step sorts its output on the order-by keys.
    Explicit,
}

/// Key range of an index scan. The bound values are inputs of the scan
/// step, after its equality keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub pos: usize,
    pub has_start: bool,
    pub start_inclusive: bool,
    pub has_end: bool,
    pub end_inclusive: bool,
}

/// What a plan step computes. Input steps are held by the `PlanStep`, in
/// the order the fields below describe.
#[derive(Clone, Debug, PartialEq)]
pub enum StepKind {
    Const(Value),
    /// Reads the register of a FROM or context variable.
    VarRef { name: String },
    /// Reads the value bound to an external variable.
    ExternalVar { id: usize, name: String, declared: ExprType },
    /// Inputs: the record.
    Field { name: String },
    /// Inputs: array, then optional low and high bounds.
    Slice { ctx_regs: Vec<usize>, has_low: bool, has_high: bool },
    /// Inputs: array, then the optional predicate.
    Filter { ctx_regs: Vec<usize>, has_pred: bool },
    /// Inputs: map, then the optional predicate.
    MapFilter { kind: MapFilterKind, ctx_regs: Vec<usize>, has_pred: bool },
    /// Inputs: the arguments.
    Func(FuncCode),
    /// Inputs: alternating conditions and results, then the optional
    /// else branch.
    Case { num_branches: usize, has_else: bool },
    Cast(ExprType),
    Promote(ExprType),
    IsOfType { targets: Vec<ExprType>, negated: bool },
    ArrayConstr { conditional: bool },
    /// Inputs: alternating keys and values.
    MapConstr,
    /// Inputs: equality keys, then the range bounds, then the filter.
    TableScan {
        table: String,
        index: Option<String>,
        num_eq: usize,
        range: Option<RangeSpec>,
        has_filter: bool,
        covering: bool,
        dedup: bool,
        reverse: bool,
    },
    /// Inputs: FROM domains, WHERE, select fields, order-by keys, offset,
    /// limit.
    Sfw {
        var_regs: Vec<usize>,
        has_where: bool,
        /// Names of the select fields; empty for `SELECT *`.
        columns: Vec<String>,
        sort: SortKind,
        sort_specs: Vec<SortSpec>,
        has_offset: bool,
        has_limit: bool,
    },
    /// Inputs: the server-side plan.
    Receive {
        distribution: DistributionKind,
        sort_positions: Vec<usize>,
        sort_specs: Vec<SortSpec>,
        pk_positions: Vec<usize>,
    },
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Const(v) => write!(f, "CONST {}", v),
            StepKind::VarRef { name } => write!(f, "VAR {}", name),
            StepKind::ExternalVar { id, name, declared } => {
                write!(f, "EXTERNAL #{} {} {}", id, name, declared)
            }
            StepKind::Field { name } => write!(f, "FIELD {}", name),
            StepKind::Slice { .. } => write!(f, "SLICE"),
            StepKind::Filter { .. } => write!(f, "ARRAY_FILTER"),
            StepKind::MapFilter { kind, .. } => match kind {
                MapFilterKind::Keys => write!(f, "KEYS"),
                MapFilterKind::Values => write!(f, "VALUES"),
            },
            StepKind::Func(code) => write!(f, "FUNC {}", code.name()),
            StepKind::Case { .. } => write!(f, "CASE"),
            StepKind::Cast(t) => write!(f, "CAST {}", t),
            StepKind::Promote(t) => write!(f, "PROMOTE {}", t),
            StepKind::IsOfType { negated, .. } => {
                write!(f, "{}", if *negated { "IS NOT OF" } else { "IS OF" })
            }
            StepKind::ArrayConstr { .. } => write!(f, "ARRAY"),
            StepKind::MapConstr => write!(f, "MAP"),
            StepKind::TableScan {
                table,
                index,
                num_eq,
                range,
                has_filter,
                covering,
                dedup,
                reverse,
            } => {
                write!(f, "SCAN {} via {}", table, index.as_deref().unwrap_or("primary"))?;
                if *num_eq > 0 {
                    write!(f, " eq={}", num_eq)?;
                }
                if let Some(r) = range {
                    write!(
                        f,
                        " range@{}{}{}",
                        r.pos,
                        match (r.has_start, r.start_inclusive) {
                            (false, _) => "(-",
                            (true, true) => "[x",
                            (true, false) => "(x",
                        },
                        match (r.has_end, r.end_inclusive) {
                            (false, _) => ",-)",
                            (true, true) => ",y]",
                            (true, false) => ",y)",
                        }
                    )?;
                }
                for (set, label) in [
                    (*has_filter, " filter"),
                    (*covering, " covering"),
                    (*dedup, " dedup"),
                    (*reverse, " reverse"),
                ] {
                    if set {
                        f.write_str(label)?;
                    }
                }
                Ok(())
            }
            StepKind::Sfw {
                columns,
                sort,
                has_offset,
                has_limit,
                ..
            } => {
                write!(f, "SFW")?;
                if columns.is_empty() {
                    write!(f, " *")?;
                } else {
                    write!(f, " [{}]", columns.join(", "))?;
                }
                match sort {
                    SortKind::None => {}
                    SortKind::Index => write!(f, " sort=index")?,
                    SortKind::Explicit => write!(f, " sort=explicit")?,
                }
                if *has_offset {
                    write!(f, " offset")?;
                }
                if *has_limit {
                    write!(f, " limit")?;
                }
                Ok(())
            }
            StepKind::Receive {
                distribution,
                sort_positions,
                pk_positions,
                ..
            } => {
                write!(f, "RECEIVE {}", distribution)?;
                if !sort_positions.is_empty() {
                    write!(f, " merge={:?}", sort_positions)?;
                }
                if !pk_positions.is_empty() {
                    write!(f, " dedup={:?}", pk_positions)?;
                }
                Ok(())
            }
        }
    }
}

/// One step of a compiled plan.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanStep {
    /// The expression node this step was compiled from.
    pub node: ExprId,
    pub kind: StepKind,
    pub inputs: Vec<PlanStep>,
    /// Register the step writes its result to.
    pub result_reg: usize,
    /// One register per field, for steps that produce tuples.
    pub tuple_regs: Vec<usize>,
}

impl PlanStep {
    /// Returns the number of steps in this subtree.
    pub fn num_steps(&self) -> usize {
        1 + self.inputs.iter().map(PlanStep::num_steps).sum::<usize>()
    }

    /// Calls `f` on every step of this subtree, in pre-order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a PlanStep)) {
        f(self);
        for input in &self.inputs {
            input.visit(f);
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:width$}{} -> ${}", "", self.kind, self.result_reg, width = depth * 2)?;
        if !self.tuple_regs.is_empty() {
            write!(f, " {:?}", self.tuple_regs)?;
        }
        writeln!(f)?;
        for input in &self.inputs {
            input.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
