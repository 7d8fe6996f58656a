//! Construction helpers for expression graphs.
//!
//! The query translator builds graphs through these helpers; tests and
//! benchmarks use them in its place.

use super::graph::ExprGraph;
use super::node::{
    ExprId, ExprKind, FromClause, HintTarget, IndexHint, MapFilterKind, SelectField, SfwExpr,
    SortKey, SortSpec, TableScan, VarExpr, VarKind,
};
use crate::context::Catalog;
use crate::functions::{self, CompOp, FuncCode};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use shardql_core::{Error, ExprType, Location, Result, Value};

impl ExprGraph {
    /// Adds a literal.
    pub fn constant(&mut self, value: impl Into<Value>) -> ExprId {
        self.add(ExprKind::Const(value.into()))
    }

    /// Adds the empty sequence.
    pub fn empty_seq(&mut self) -> ExprId {
        self.add(ExprKind::Const(Value::Empty))
    }

    /// `input.name`
    pub fn field(&mut self, input: ExprId, name: impl Into<String>) -> ExprId {
        self.add(ExprKind::FieldStep {
            input,
            name: name.into(),
        })
    }

    /// `input[]`
    pub fn elements(&mut self, input: ExprId) -> ExprId {
        self.add(ExprKind::ArrayFilter {
            input,
            pred: None,
            ctx_vars: Vec::new(),
        })
    }

    /// `input[pred]`, where `pred` is built from the `$element` variable.
    pub fn array_filter(
        &mut self,
        input: ExprId,
        pred: impl FnOnce(&mut Self, ExprId) -> ExprId,
    ) -> ExprId {
        let elem = self.ctx_var("$element", VarKind::CtxElement);
        let pred = pred(self, elem);
        let step = self.add(ExprKind::ArrayFilter {
            input,
            pred: Some(pred),
            ctx_vars: alloc::vec![elem],
        });
        self.declare(elem, step);
        step
    }

    /// `input[low:high]`
    pub fn slice(&mut self, input: ExprId, low: Option<ExprId>, high: Option<ExprId>) -> ExprId {
        self.add(ExprKind::ArraySlice {
            input,
            low,
            high,
            ctx_vars: Vec::new(),
        })
    }

    /// `input.keys()`
    pub fn map_keys(&mut self, input: ExprId) -> ExprId {
        self.add(ExprKind::MapFilter {
            input,
            kind: MapFilterKind::Keys,
            pred: None,
            ctx_vars: Vec::new(),
        })
    }

    /// `input.values()`
    pub fn map_values(&mut self, input: ExprId) -> ExprId {
        self.add(ExprKind::MapFilter {
            input,
            kind: MapFilterKind::Values,
            pred: None,
            ctx_vars: Vec::new(),
        })
    }

    /// `input.keys(pred)` / `input.values(pred)`, where `pred` is built
    /// from the `$key` and `$value` variables.
    pub fn map_filter(
        &mut self,
        input: ExprId,
        kind: MapFilterKind,
        pred: impl FnOnce(&mut Self, ExprId, ExprId) -> ExprId,
    ) -> ExprId {
        let key = self.ctx_var("$key", VarKind::CtxKey);
        let value = self.ctx_var("$value", VarKind::CtxElement);
        let pred = pred(self, key, value);
        let step = self.add(ExprKind::MapFilter {
            input,
            kind,
            pred: Some(pred),
            ctx_vars: alloc::vec![key, value],
        });
        self.declare(key, step);
        self.declare(value, step);
        step
    }

    fn ctx_var(&mut self, name: &str, kind: VarKind) -> ExprId {
        self.add(ExprKind::Var(VarExpr {
            name: name.to_string(),
            kind,
            decl: None,
        }))
    }

    fn declare(&mut self, var: ExprId, decl: ExprId) {
        if let Some(v) = self.var_mut(var) {
            v.decl = Some(decl);
        }
    }

    /// Calls a built-in function without arity checks.
    pub fn func(&mut self, func: FuncCode, args: Vec<ExprId>) -> ExprId {
        self.add(ExprKind::FuncCall { func, args })
    }

    /// Calls a built-in function by name.
    pub fn call(&mut self, name: &str, args: Vec<ExprId>) -> Result<ExprId> {
        let def = functions::lookup(name)
            .ok_or_else(|| Error::unsupported(format!("unknown function {}", name)))?;
        if !def.accepts(args.len()) {
            return Err(Error::unsupported(format!(
                "function {} does not accept {} arguments",
                name,
                args.len()
            )));
        }
        Ok(self.func(def.code, args))
    }

    /// A value (`any == false`) or any (`any == true`) comparison.
    pub fn compare(&mut self, op: CompOp, any: bool, left: ExprId, right: ExprId) -> ExprId {
        self.func(FuncCode::from_comparison(op, any), alloc::vec![left, right])
    }

    pub fn eq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(CompOp::Eq, false, left, right)
    }

    pub fn ne(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(CompOp::Ne, false, left, right)
    }

    pub fn lt(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(CompOp::Lt, false, left, right)
    }

    pub fn le(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(CompOp::Le, false, left, right)
    }

    pub fn gt(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(CompOp::Gt, false, left, right)
    }

    pub fn ge(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(CompOp::Ge, false, left, right)
    }

    /// Conjunction; a single argument is returned unchanged.
    pub fn and(&mut self, args: Vec<ExprId>) -> ExprId {
        if args.len() == 1 {
            return args[0];
        }
        self.func(FuncCode::OpAnd, args)
    }

    /// Disjunction; a single argument is returned unchanged.
    pub fn or(&mut self, args: Vec<ExprId>) -> ExprId {
        if args.len() == 1 {
            return args[0];
        }
        self.func(FuncCode::OpOr, args)
    }

    pub fn not(&mut self, arg: ExprId) -> ExprId {
        self.func(FuncCode::OpNot, alloc::vec![arg])
    }

    pub fn case(&mut self, when_then: Vec<(ExprId, ExprId)>, else_expr: Option<ExprId>) -> ExprId {
        self.add(ExprKind::Case {
            when_then,
            else_expr,
        })
    }

    pub fn cast(&mut self, input: ExprId, target: ExprType) -> ExprId {
        self.add(ExprKind::Cast { input, target })
    }

    pub fn promote(&mut self, input: ExprId, target: ExprType) -> ExprId {
        self.add(ExprKind::Promote { input, target })
    }

    pub fn is_of_type(&mut self, input: ExprId, targets: Vec<ExprType>, negated: bool) -> ExprId {
        self.add(ExprKind::IsOfType {
            input,
            targets,
            negated,
        })
    }

    pub fn array_constr(&mut self, args: Vec<ExprId>) -> ExprId {
        self.add(ExprKind::ArrayConstr {
            args,
            conditional: false,
        })
    }

    pub fn map_constr(&mut self, entries: Vec<(ExprId, ExprId)>) -> ExprId {
        let args = entries.into_iter().flat_map(|(k, v)| [k, v]).collect();
        self.add(ExprKind::MapConstr { args })
    }

    /// Attaches a source location to a node and returns it.
    pub fn located(&mut self, id: ExprId, location: Location) -> ExprId {
        self.set_location(id, Some(location));
        id
    }
}

/// Builder for a select-from-where query block.
///
/// Table names are resolved against the catalog when they are added, so
/// unknown tables and columns are reported before any rewriting starts.
pub struct SfwBuilder<'g, 'c> {
    graph: &'g mut ExprGraph,
    catalog: &'c Catalog,
    from: Vec<FromClause>,
    from_tables: Vec<Option<String>>,
    conjuncts: Vec<ExprId>,
    select: Vec<SelectField>,
    select_star: bool,
    sort: Vec<SortKey>,
    offset: Option<ExprId>,
    limit: Option<ExprId>,
    location: Option<Location>,
}

impl<'g, 'c> SfwBuilder<'g, 'c> {
    pub fn new(graph: &'g mut ExprGraph, catalog: &'c Catalog) -> Self {
        Self {
            graph,
            catalog,
            from: Vec::new(),
            from_tables: Vec::new(),
            conjuncts: Vec::new(),
            select: Vec::new(),
            select_star: false,
            sort: Vec::new(),
            offset: None,
            limit: None,
            location: None,
        }
    }

    /// The graph under construction, for building sub-expressions.
    pub fn graph(&mut self) -> &mut ExprGraph {
        self.graph
    }

    /// Sets the location reported for errors raised by this block.
    pub fn at(&mut self, location: Location) -> &mut Self {
        self.location = Some(location);
        self
    }

    /// Adds the table scan of the block and returns its row variable.
    pub fn from_table(&mut self, table: &str, alias: &str) -> Result<ExprId> {
        self.from_table_with_hints(table, alias, Vec::new())
    }

    /// Adds the table scan of the block with index hints.
    pub fn from_table_with_hints(
        &mut self,
        table: &str,
        alias: &str,
        hints: Vec<IndexHint>,
    ) -> Result<ExprId> {
        if !self.from.is_empty() {
            return Err(Error::unsupported("the table must be the first FROM entry").at(self.location));
        }
        let def = self
            .catalog
            .table(table)
            .map_err(|e| e.at(self.location))?;
        validate_hints(def.name(), &hints, |name| def.get_index(name).is_some())
            .map_err(|e| e.at(self.location))?;

        let table_name = def.name().to_string();
        let mut scan = TableScan::new(table_name.clone(), def.row_type());
        scan.hints = hints;
        let domain = self.graph.add(ExprKind::BaseTable(scan));
        let var = self.add_from(domain, alias);
        self.from_tables.push(Some(table_name));
        Ok(var)
    }

    /// Adds a FROM entry over an arbitrary expression, such as the
    /// elements of an array of a previous row variable.
    pub fn from_expr(&mut self, domain: ExprId, alias: &str) -> Result<ExprId> {
        if self.from.is_empty() {
            return Err(Error::unsupported("a query block must start with a table").at(self.location));
        }
        let var = self.add_from(domain, alias);
        self.from_tables.push(None);
        Ok(var)
    }

    fn add_from(&mut self, domain: ExprId, alias: &str) -> ExprId {
        let var = self.graph.add(ExprKind::Var(VarExpr {
            name: format!("${}", alias),
            kind: VarKind::TableRow,
            decl: None,
        }));
        self.from.push(FromClause { domain, var });
        var
    }

    /// `var.name` for a top-level column, checked against the table.
    pub fn column(&mut self, var: ExprId, name: &str) -> Result<ExprId> {
        let pos = self.from.iter().position(|f| f.var == var);
        if let Some(Some(table)) = pos.and_then(|p| self.from_tables.get(p)) {
            let def = self.catalog.table(table)?;
            if def.get_field(name).is_none() {
                return Err(Error::column_not_found(table.as_str(), name).at(self.location));
            }
        }
        Ok(self.graph.field(var, name))
    }

    /// Adds a WHERE conjunct. Nested conjunctions are flattened.
    pub fn where_(&mut self, pred: ExprId) -> &mut Self {
        match self.graph.kind(pred) {
            ExprKind::FuncCall {
                func: FuncCode::OpAnd,
                args,
            } if self.graph.parents(pred).is_empty() => {
                let args = args.clone();
                for a in &args {
                    self.graph.unlink(pred, *a);
                }
                if let ExprKind::FuncCall { args, .. } = self.graph.kind_mut(pred) {
                    args.clear();
                }
                self.graph.destroy(pred);
                self.conjuncts.extend(args);
            }
            _ => self.conjuncts.push(pred),
        }
        self
    }

    /// Adds a named select-list entry.
    pub fn select(&mut self, name: &str, expr: ExprId) -> Result<&mut Self> {
        if self.select.iter().any(|f| f.name == name) {
            let loc = self.graph.location(expr).or(self.location);
            return Err(Error::duplicate_column(name).at(loc));
        }
        self.select.push(SelectField {
            name: name.to_string(),
            expr,
        });
        Ok(self)
    }

    /// `SELECT *`
    pub fn select_star(&mut self) -> &mut Self {
        self.select_star = true;
        self
    }

    pub fn order_by(&mut self, expr: ExprId, spec: SortSpec) -> &mut Self {
        self.sort.push(SortKey { expr, spec });
        self
    }

    pub fn offset(&mut self, expr: ExprId) -> &mut Self {
        self.offset = Some(expr);
        self
    }

    pub fn limit(&mut self, expr: ExprId) -> &mut Self {
        self.limit = Some(expr);
        self
    }

    /// Adds the query block to the graph and returns it.
    pub fn build(self) -> Result<ExprId> {
        if self.from.is_empty() {
            return Err(Error::unsupported("query block without FROM").at(self.location));
        }
        let where_expr = match self.conjuncts.len() {
            0 => None,
            _ => Some(self.graph.and(self.conjuncts)),
        };
        let select_star = self.select_star || self.select.is_empty();
        let vars: Vec<ExprId> = self.from.iter().map(|f| f.var).collect();
        let sfw = self.graph.add_at(
            ExprKind::Sfw(SfwExpr {
                from: self.from,
                where_expr,
                select: if select_star { Vec::new() } else { self.select },
                select_star,
                sort: self.sort,
                sort_by_index: false,
                offset: self.offset,
                limit: self.limit,
            }),
            self.location,
        );
        for var in vars {
            self.graph.declare(var, sfw);
        }
        Ok(sfw)
    }
}

/// Checks a table's hints: no hint may repeat, at most one index may be
/// forced, and every named index must exist.
pub(crate) fn validate_hints(
    table: &str,
    hints: &[IndexHint],
    index_exists: impl Fn(&str) -> bool,
) -> Result<()> {
    for (i, hint) in hints.iter().enumerate() {
        if hints[..i].contains(hint) {
            return Err(Error::duplicate_hint(hint.to_string()));
        }
        if let HintTarget::Index(name) = hint.target() {
            if !index_exists(name) {
                return Err(Error::index_not_found(table, name.as_str()));
            }
        }
    }
    if hints.iter().filter(|h| h.is_force()).count() > 1 {
        return Err(Error::duplicate_hint("FORCE_INDEX"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use shardql_core::schema::TableBuilder;
    use shardql_core::ItemType;

    fn catalog() -> Catalog {
        let table = TableBuilder::new("users")
            .unwrap()
            .add_field("id", ItemType::Integer)
            .unwrap()
            .add_field("name", ItemType::String)
            .unwrap()
            .add_field("tags", ItemType::array(ItemType::String))
            .unwrap()
            .primary_key(&["id"])
            .unwrap()
            .add_index("idx_name", &["name"])
            .unwrap()
            .build()
            .unwrap();
        Catalog::new().with_table(table)
    }

    #[test]
    fn test_build_simple_block() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b.from_table("users", "u").unwrap();
        let id = b.column(t, "id").unwrap();
        let five = b.graph().constant(5);
        let pred = b.graph().eq(id, five);
        b.where_(pred);
        let name = b.column(t, "name").unwrap();
        b.select("name", name).unwrap();
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        assert_eq!(g.var(t).unwrap().decl, Some(sfw));
        assert_eq!(g.where_conjuncts(sfw), vec![pred]);
        assert_eq!(
            g.type_of(sfw),
            ExprType::star(ItemType::Record(vec![("name".into(), ItemType::String)]))
        );
    }

    #[test]
    fn test_unknown_table_and_column() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        b.at(Location::new(1, 15, 1, 20));
        let err = b.from_table("orders", "o").unwrap_err();
        assert!(matches!(err, Error::TableNotFound { .. }));
        assert_eq!(err.location(), Some(Location::new(1, 15, 1, 20)));

        let t = b.from_table("users", "u").unwrap();
        assert!(matches!(
            b.column(t, "email"),
            Err(Error::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_select_name() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b.from_table("users", "u").unwrap();
        let id = b.column(t, "id").unwrap();
        let name = b.column(t, "name").unwrap();
        b.select("x", id).unwrap();
        assert!(matches!(
            b.select("x", name),
            Err(Error::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_where_flattens_conjunctions() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b.from_table("users", "u").unwrap();
        let id = b.column(t, "id").unwrap();
        let c1 = b.graph().constant(1);
        let p1 = b.graph().gt(id, c1);
        let id2 = b.column(t, "id").unwrap();
        let c2 = b.graph().constant(9);
        let p2 = b.graph().lt(id2, c2);
        let both = b.graph().and(vec![p1, p2]);
        b.where_(both);
        let sfw = b.build().unwrap();
        assert_eq!(g.where_conjuncts(sfw), vec![p1, p2]);
        assert!(!g.is_live(both));
    }

    #[test]
    fn test_hint_validation() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let idx = |n: &str| HintTarget::Index(n.into());

        let mut b = SfwBuilder::new(&mut g, &catalog);
        let err = b
            .from_table_with_hints(
                "users",
                "u",
                vec![IndexHint::Prefer(idx("idx_name")), IndexHint::Prefer(idx("idx_name"))],
            )
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHint { .. }));

        let err = b
            .from_table_with_hints(
                "users",
                "u",
                vec![
                    IndexHint::Force(idx("idx_name")),
                    IndexHint::Force(HintTarget::Primary),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHint { .. }));

        let err = b
            .from_table_with_hints("users", "u", vec![IndexHint::Force(idx("idx_nope"))])
            .unwrap_err();
        assert!(matches!(err, Error::IndexNotFound { .. }));
    }

    #[test]
    fn test_call_checks_arity() {
        let mut g = ExprGraph::new();
        let a = g.constant(1);
        assert!(g.call("size", vec![a]).is_ok());
        assert!(g.call("size", vec![a, a]).is_err());
        assert!(g.call("frobnicate", vec![a]).is_err());
    }
}
