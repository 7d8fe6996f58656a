//! Static type inference over the expression graph.
//!
//! Types are memoized per node. When a node changes, `refresh_type`
//! recomputes it and ripples the change upward: to parents, to the FROM
//! variable bound over a changed domain, and to the context variables of
//! a path step whose input changed. Propagation stops at the first node
//! whose type is unchanged.

use super::graph::ExprGraph;
use super::node::{ExprId, ExprKind, MapFilterKind, VarKind};
use crate::functions::FuncCode;
use alloc::vec::Vec;
use shardql_core::{ExprType, ItemType, Quantifier};

impl ExprGraph {
    /// Returns the memoized type of a node, inferring and storing it (and
    /// the types of its descendants) if necessary.
    pub fn type_of(&mut self, id: ExprId) -> ExprType {
        if let Some(ty) = &self.node(id).ty {
            return ty.clone();
        }
        for child in self.children(id) {
            self.type_of(child);
        }
        for dep in self.var_dependencies(id) {
            self.type_of(dep);
        }
        let ty = self.compute_type(id);
        self.set_cached_type(id, Some(ty.clone()));
        ty
    }

    /// Returns the memoized type if present, otherwise computes it without
    /// storing anything.
    pub fn expr_type(&self, id: ExprId) -> ExprType {
        match &self.node(id).ty {
            Some(ty) => ty.clone(),
            None => self.compute_type(id),
        }
    }

    /// Returns the memoized type without computing it.
    pub fn cached_type(&self, id: ExprId) -> Option<&ExprType> {
        self.node(id).ty.as_ref()
    }

    /// Infers the types of every node reachable from the root.
    pub fn infer_types(&mut self) -> Option<ExprType> {
        let root = self.root()?;
        Some(self.type_of(root))
    }

    /// Recomputes the type of `id` and propagates any change upward.
    pub fn refresh_type(&mut self, id: ExprId) {
        let mut work = alloc::vec![id];
        while let Some(id) = work.pop() {
            if !self.is_live(id) {
                continue;
            }
            let new_ty = self.compute_type(id);
            if self.cached_type(id) == Some(&new_ty) {
                continue;
            }
            self.set_cached_type(id, Some(new_ty));
            work.extend(self.type_dependents(id));
        }
    }

    /// Nodes a variable's type is derived from.
    fn var_dependencies(&self, id: ExprId) -> Vec<ExprId> {
        let Some(var) = self.var(id) else {
            return Vec::new();
        };
        match var.kind {
            VarKind::TableRow => self.var_domain(id).into_iter().collect(),
            VarKind::CtxItem | VarKind::CtxElement => var
                .decl
                .and_then(|d| self.step_input(d))
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Nodes whose type depends on the type of `id`.
    fn type_dependents(&self, id: ExprId) -> Vec<ExprId> {
        let mut out: Vec<ExprId> = self.parents(id).to_vec();
        for &parent in self.parents(id) {
            match self.kind(parent) {
                ExprKind::Sfw(sfw) => out.extend(
                    sfw.from
                        .iter()
                        .filter(|f| f.domain == id)
                        .map(|f| f.var),
                ),
                kind => {
                    if self.step_input(parent) == Some(id) {
                        out.extend(kind.ctx_vars().iter().copied());
                    }
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    fn step_input(&self, step: ExprId) -> Option<ExprId> {
        match self.kind(step) {
            ExprKind::ArraySlice { input, .. }
            | ExprKind::ArrayFilter { input, .. }
            | ExprKind::MapFilter { input, .. } => Some(*input),
            _ => None,
        }
    }

    fn set_cached_type(&mut self, id: ExprId, ty: Option<ExprType>) {
        self.node_mut(id).ty = ty;
    }

    /// Computes the type of a node from the types of its inputs.
    fn compute_type(&self, id: ExprId) -> ExprType {
        match self.kind(id) {
            ExprKind::Sfw(sfw) => {
                let item = if sfw.select_star {
                    sfw.first_var()
                        .map(|v| self.expr_type(v).item)
                        .unwrap_or(ItemType::Any)
                } else {
                    ItemType::Record(
                        sfw.select
                            .iter()
                            .map(|f| (f.name.clone(), self.expr_type(f.expr).item))
                            .collect(),
                    )
                };
                ExprType::star(item)
            }
            ExprKind::BaseTable(scan) => ExprType::star(scan.row_type.clone()),
            ExprKind::Var(var) => match &var.kind {
                VarKind::TableRow => self
                    .var_domain(id)
                    .map(|d| self.expr_type(d).with_quant(Quantifier::One))
                    .unwrap_or_else(|| ExprType::one(ItemType::Any)),
                VarKind::CtxItem => self.ctx_input_type(var.decl).with_quant(Quantifier::One),
                VarKind::CtxElement => {
                    ExprType::one(element_item(&self.ctx_input_type(var.decl).item))
                }
                VarKind::CtxKey => ExprType::one(ItemType::String),
                VarKind::CtxElementPos => ExprType::one(ItemType::Long),
                VarKind::External { declared, .. } => declared.clone(),
            },
            ExprKind::FieldStep { input, name } => {
                let input_ty = self.expr_type(*input);
                match input_ty.item.field_type(name) {
                    None => ExprType::empty(),
                    Some(item) => {
                        let quant = match &input_ty.item {
                            ItemType::Record(_) => input_ty.quant,
                            ItemType::Array(_) => input_ty.quant.product(Quantifier::Star),
                            _ => input_ty.quant.product(Quantifier::Optional),
                        };
                        ExprType::new(item, quant)
                    }
                }
            }
            ExprKind::ArraySlice { input, .. } | ExprKind::ArrayFilter { input, .. } => {
                ExprType::star(element_item(&self.expr_type(*input).item))
            }
            ExprKind::MapFilter { input, kind, .. } => match kind {
                MapFilterKind::Keys => ExprType::star(ItemType::String),
                MapFilterKind::Values => {
                    ExprType::star(self.expr_type(*input).item.element_type())
                }
            },
            ExprKind::FuncCall { func, args } => self.func_type(*func, args),
            ExprKind::Const(value) => {
                if value.is_empty_seq() {
                    ExprType::empty()
                } else {
                    ExprType::one(value.item_type())
                }
            }
            ExprKind::Case {
                when_then,
                else_expr,
            } => {
                let mut ty: Option<ExprType> = None;
                for (_, then) in when_then {
                    let t = self.expr_type(*then);
                    ty = Some(match ty {
                        None => t,
                        Some(acc) => acc.union(&t),
                    });
                }
                let acc = ty.unwrap_or_else(ExprType::empty);
                match else_expr {
                    Some(e) => acc.union(&self.expr_type(*e)),
                    None => acc.union(&ExprType::empty()),
                }
            }
            ExprKind::Cast { target, .. } | ExprKind::Promote { target, .. } => target.clone(),
            ExprKind::IsOfType { .. } => ExprType::boolean(),
            ExprKind::Receive(recv) => self.expr_type(recv.input),
            ExprKind::ArrayConstr { args, .. } => {
                let elem = args
                    .iter()
                    .map(|a| self.expr_type(*a).item)
                    .reduce(|a, b| a.union(&b))
                    .unwrap_or(ItemType::Any);
                ExprType::one(ItemType::array(elem))
            }
            ExprKind::MapConstr { args } => {
                let value = args
                    .iter()
                    .skip(1)
                    .step_by(2)
                    .map(|a| self.expr_type(*a).item)
                    .reduce(|a, b| a.union(&b))
                    .unwrap_or(ItemType::Any);
                ExprType::one(ItemType::map(value))
            }
        }
    }

    fn ctx_input_type(&self, decl: Option<ExprId>) -> ExprType {
        decl.and_then(|d| self.step_input(d))
            .map(|input| self.expr_type(input))
            .unwrap_or_else(|| ExprType::one(ItemType::Any))
    }

    fn func_type(&self, func: FuncCode, args: &[ExprId]) -> ExprType {
        if func.is_boolean() {
            return ExprType::boolean();
        }
        let arg_types: Vec<ExprType> = args.iter().map(|a| self.expr_type(*a)).collect();
        let quant = if arg_types.iter().any(|t| t.quant.allows_empty()) {
            Quantifier::Optional
        } else {
            Quantifier::One
        };
        match func {
            FuncCode::FnSize => ExprType::optional(ItemType::Integer),
            FuncCode::FnConcat => ExprType::new(ItemType::String, quant),
            _ => {
                let item = arg_types
                    .iter()
                    .map(|t| t.item.clone())
                    .reduce(|a, b| a.union(&b))
                    .unwrap_or(ItemType::Number);
                ExprType::new(item, quant)
            }
        }
    }
}

/// Item type of the elements a filter or slice step iterates over. Items
/// that are not arrays are treated as single-element arrays.
fn element_item(item: &ItemType) -> ItemType {
    match item {
        ItemType::Array(elem) => (**elem).clone(),
        other => other.clone(),
    }
}
