//! Bottom-up plan generation.

use super::plan::{PlanStep, RangeSpec, SortKind, StepKind};
use super::registers::RegisterAllocator;
use crate::expr::{ExprGraph, ExprId, ExprKind, VarKind};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use shardql_core::{Error, ExprType, ItemType, Result};
use tracing::debug;

/// A placeholder the caller binds before execution.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalVarInfo {
    pub id: usize,
    pub name: String,
    pub declared: ExprType,
}

/// The output of code generation.
#[derive(Clone, Debug)]
pub struct CompiledQuery {
    pub root: PlanStep,
    pub result_type: ExprType,
    pub num_registers: usize,
    pub num_steps: usize,
    pub external_vars: Vec<ExternalVarInfo>,
}

enum Visit {
    Enter(ExprId),
    Exit(ExprId),
}

/// Compiles an optimized expression graph into plan steps.
///
/// Nodes are compiled in post order. Finished steps are pushed on a
/// working stack, and each node pops as many steps as it has children.
pub struct CodeGenerator<'g> {
    graph: &'g ExprGraph,
    regs: RegisterAllocator,
}

impl<'g> CodeGenerator<'g> {
    pub fn new(graph: &'g ExprGraph) -> Self {
        Self {
            graph,
            regs: RegisterAllocator::new(),
        }
    }

    pub fn generate(mut self) -> Result<CompiledQuery> {
        let graph = self.graph;
        let root = graph
            .root()
            .ok_or_else(|| Error::internal("expression graph has no root"))?;

        let mut work = alloc::vec![Visit::Enter(root)];
        let mut stack: Vec<PlanStep> = Vec::new();
        while let Some(visit) = work.pop() {
            match visit {
                Visit::Enter(id) => {
                    self.enter(id)?;
                    work.push(Visit::Exit(id));
                    for child in graph.children(id).into_iter().rev() {
                        work.push(Visit::Enter(child));
                    }
                }
                Visit::Exit(id) => {
                    let arity = graph.children(id).len();
                    let mut inputs = Vec::with_capacity(arity);
                    for _ in 0..arity {
                        let step = stack.pop().ok_or_else(|| {
                            Error::internal(format!("working stack underflow at node {}", id))
                        })?;
                        inputs.push(step);
                    }
                    inputs.reverse();
                    let step = self.compile(id, inputs)?;
                    stack.push(step);
                }
            }
        }

        let root_step = stack
            .pop()
            .ok_or_else(|| Error::internal("code generation produced no plan"))?;
        if !stack.is_empty() {
            return Err(Error::internal(format!(
                "{} steps left on the working stack",
                stack.len()
            )));
        }

        let external_vars = graph
            .external_vars()
            .iter()
            .filter_map(|&var| {
                let v = graph.var(var)?;
                match &v.kind {
                    VarKind::External { id, declared } => Some(ExternalVarInfo {
                        id: *id,
                        name: v.name.clone(),
                        declared: declared.clone(),
                    }),
                    _ => None,
                }
            })
            .collect();

        let num_steps = root_step.num_steps();
        let num_registers = self.regs.num_registers();
        debug!(registers = num_registers, steps = num_steps, "generated plan");
        Ok(CompiledQuery {
            root: root_step,
            result_type: graph.expr_type(root),
            num_registers,
            num_steps,
            external_vars,
        })
    }

    /// Allocates the registers of the variables a node declares before its
    /// children, which reference them, are compiled.
    fn enter(&mut self, id: ExprId) -> Result<()> {
        match self.graph.kind(id) {
            ExprKind::Sfw(sfw) => {
                for from in &sfw.from {
                    self.regs.alloc(from.var)?;
                }
            }
            kind => {
                for &ctx in kind.ctx_vars() {
                    self.regs.alloc(ctx)?;
                }
            }
        }
        Ok(())
    }

    fn compile(&mut self, id: ExprId, inputs: Vec<PlanStep>) -> Result<PlanStep> {
        let graph = self.graph;
        let result_reg = self.regs.alloc(id)?;
        let mut tuple_regs = Vec::new();
        let kind = match graph.kind(id) {
            ExprKind::Const(v) => StepKind::Const(v.clone()),
            ExprKind::Var(var) => match &var.kind {
                VarKind::External { id, declared } => StepKind::ExternalVar {
                    id: *id,
                    name: var.name.clone(),
                    declared: declared.clone(),
                },
                _ => StepKind::VarRef {
                    name: var.name.clone(),
                },
            },
            ExprKind::FieldStep { name, .. } => StepKind::Field { name: name.clone() },
            ExprKind::ArraySlice {
                low,
                high,
                ctx_vars,
                ..
            } => StepKind::Slice {
                ctx_regs: self.var_regs(ctx_vars)?,
                has_low: low.is_some(),
                has_high: high.is_some(),
            },
            ExprKind::ArrayFilter { pred, ctx_vars, .. } => StepKind::Filter {
                ctx_regs: self.var_regs(ctx_vars)?,
                has_pred: pred.is_some(),
            },
            ExprKind::MapFilter {
                kind,
                pred,
                ctx_vars,
                ..
            } => StepKind::MapFilter {
                kind: *kind,
                ctx_regs: self.var_regs(ctx_vars)?,
                has_pred: pred.is_some(),
            },
            ExprKind::FuncCall { func, .. } => StepKind::Func(*func),
            ExprKind::Case {
                when_then,
                else_expr,
            } => StepKind::Case {
                num_branches: when_then.len(),
                has_else: else_expr.is_some(),
            },
            ExprKind::Cast { target, .. } => StepKind::Cast(target.clone()),
            ExprKind::Promote { target, .. } => StepKind::Promote(target.clone()),
            ExprKind::IsOfType {
                targets, negated, ..
            } => StepKind::IsOfType {
                targets: targets.clone(),
                negated: *negated,
            },
            ExprKind::ArrayConstr { conditional, .. } => StepKind::ArrayConstr {
                conditional: *conditional,
            },
            ExprKind::MapConstr { .. } => StepKind::MapConstr,
            ExprKind::BaseTable(scan) => {
                let num_fields = match &scan.row_type {
                    ItemType::Record(fields) => fields.len(),
                    _ => 0,
                };
                tuple_regs = self.regs.alloc_tuple(id, num_fields)?;
                StepKind::TableScan {
                    table: scan.table.clone(),
                    index: scan.index.clone(),
                    num_eq: scan.eq_keys.len(),
                    range: scan.range.as_ref().map(|r| RangeSpec {
                        pos: r.pos,
                        has_start: r.start.is_some(),
                        start_inclusive: r.start_inclusive,
                        has_end: r.end.is_some(),
                        end_inclusive: r.end_inclusive,
                    }),
                    has_filter: scan.filter.is_some(),
                    covering: scan.uses_covering_index,
                    dedup: scan.eliminate_dups,
                    reverse: scan.reverse,
                }
            }
            ExprKind::Sfw(sfw) => {
                if !sfw.select_star {
                    tuple_regs = self.regs.alloc_tuple(id, sfw.select.len())?;
                }
                let vars: Vec<ExprId> = sfw.from.iter().map(|f| f.var).collect();
                let sort = if !sfw.has_sort() {
                    SortKind::None
                } else if sfw.sort_by_index {
                    SortKind::Index
                } else {
                    SortKind::Explicit
                };
                StepKind::Sfw {
                    var_regs: self.var_regs(&vars)?,
                    has_where: sfw.where_expr.is_some(),
                    columns: sfw.select.iter().map(|f| f.name.clone()).collect(),
                    sort,
                    sort_specs: sfw.sort.iter().map(|k| k.spec).collect(),
                    has_offset: sfw.offset.is_some(),
                    has_limit: sfw.limit.is_some(),
                }
            }
            ExprKind::Receive(recv) => StepKind::Receive {
                distribution: recv.distribution,
                sort_positions: recv.sort_positions.clone(),
                sort_specs: recv.sort_specs.clone(),
                pk_positions: recv.pk_positions.clone(),
            },
        };
        Ok(PlanStep {
            node: id,
            kind,
            inputs,
            result_reg,
            tuple_regs,
        })
    }

    fn var_regs(&self, vars: &[ExprId]) -> Result<Vec<usize>> {
        vars.iter()
            .map(|&v| {
                self.regs
                    .get(v)
                    .ok_or_else(|| Error::internal(format!("variable {} has no register", v)))
            })
            .collect()
    }
}
