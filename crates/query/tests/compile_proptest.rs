//! Property-based tests for the compilation pipeline.
//!
//! These tests compile randomly shaped single-table queries and check
//! properties that must hold for every plan.

use proptest::prelude::*;
use shardql_core::schema::{TableBuilder, TableDef};
use shardql_core::{ItemType, Result, Value};
use shardql_query::codegen::{CompiledQuery, PlanStep};
use shardql_query::expr::{ExprGraph, ExprId, ExprKind, SfwBuilder, SortSpec};
use shardql_query::functions::{CompOp, FuncCode};
use shardql_query::{Catalog, CompileOptions, QueryControlBlock, QueryFrontend, Translation};
use std::collections::HashMap;

/// One WHERE conjunct: column index, operator, literal.
#[derive(Clone, Debug)]
struct Conjunct {
    column: usize,
    op: CompOp,
    value: i32,
}

#[derive(Clone, Debug)]
struct QueryShape {
    conjuncts: Vec<Conjunct>,
    order_by: Option<(usize, bool)>,
    offset: Option<i32>,
    limit: Option<i32>,
}

const COLUMNS: [&str; 4] = ["id", "a", "b", "c"];

fn table() -> TableDef {
    TableBuilder::new("t")
        .unwrap()
        .add_field("id", ItemType::Integer)
        .unwrap()
        .add_field("a", ItemType::Integer)
        .unwrap()
        .add_field("b", ItemType::Integer)
        .unwrap()
        .add_field("c", ItemType::Integer)
        .unwrap()
        .primary_key(&["id"])
        .unwrap()
        .add_index("idx_a", &["a"])
        .unwrap()
        .add_index("idx_b_c", &["b", "c"])
        .unwrap()
        .build()
        .unwrap()
}

fn op_strategy() -> impl Strategy<Value = CompOp> {
    prop_oneof![
        Just(CompOp::Eq),
        Just(CompOp::Ne),
        Just(CompOp::Gt),
        Just(CompOp::Ge),
        Just(CompOp::Lt),
        Just(CompOp::Le),
    ]
}

fn conjunct_strategy() -> impl Strategy<Value = Conjunct> {
    (0..COLUMNS.len(), op_strategy(), -20i32..20).prop_map(|(column, op, value)| Conjunct {
        column,
        op,
        value,
    })
}

fn shape_strategy() -> impl Strategy<Value = QueryShape> {
    (
        prop::collection::vec(conjunct_strategy(), 0..5),
        prop::option::of((0..COLUMNS.len(), any::<bool>())),
        prop::option::of(0i32..100),
        prop::option::of(0i32..100),
    )
        .prop_map(|(conjuncts, order_by, offset, limit)| QueryShape {
            conjuncts,
            order_by,
            offset,
            limit,
        })
}

struct ShapeFrontend<'s>(&'s QueryShape);

impl QueryFrontend for ShapeFrontend<'_> {
    type ParseTree = ();

    fn parse(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn translate(&self, _tree: (), catalog: &Catalog) -> Result<Translation> {
        let shape = self.0;
        let mut graph = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut graph, catalog);
        let t = b.from_table("t", "t")?;
        for c in &shape.conjuncts {
            let col = b.column(t, COLUMNS[c.column])?;
            let g = b.graph();
            let lit = g.constant(c.value);
            let pred = g.compare(c.op, false, col, lit);
            b.where_(pred);
        }
        if let Some((column, desc)) = shape.order_by {
            let col = b.column(t, COLUMNS[column])?;
            let spec = if desc { SortSpec::desc() } else { SortSpec::asc() };
            b.order_by(col, spec);
        }
        if let Some(k) = shape.offset {
            let e = b.graph().constant(k);
            b.offset(e);
        }
        if let Some(n) = shape.limit {
            let e = b.graph().constant(n);
            b.limit(e);
        }
        let sfw = b.build()?;
        graph.set_root(sfw);
        Ok(Translation::Query(graph))
    }
}

fn compile(catalog: &Catalog, shape: &QueryShape) -> (Option<CompiledQuery>, Option<ExprGraph>) {
    let mut qcb = QueryControlBlock::new(catalog, CompileOptions::default());
    qcb.compile(&ShapeFrontend(shape), "query");
    let graph = qcb.graph().cloned();
    (qcb.into_compiled(), graph)
}

fn collect_steps<'a>(plan: &'a PlanStep) -> Vec<&'a PlanStep> {
    let mut out = Vec::new();
    plan.visit(&mut |s| out.push(s));
    out
}

fn literal(g: &ExprGraph, id: ExprId) -> Option<Value> {
    match g.kind(id) {
        ExprKind::Const(v) => Some(v.clone()),
        _ => None,
    }
}

proptest! {
    /// No two nodes write the same register, and compiling the same query
    /// twice assigns the same registers.
    #[test]
    fn prop_register_injectivity(shape in shape_strategy()) {
        let catalog = Catalog::new().with_table(table());
        let (compiled, _) = compile(&catalog, &shape);
        let compiled = compiled.expect("query compiles");

        let mut owner: HashMap<usize, ExprId> = HashMap::new();
        for step in collect_steps(&compiled.root) {
            let prev = owner.insert(step.result_reg, step.node);
            prop_assert!(prev.map_or(true, |n| n == step.node),
                "register {} written by two nodes", step.result_reg);
            prop_assert!(step.result_reg < compiled.num_registers);
        }
        for step in collect_steps(&compiled.root) {
            for reg in &step.tuple_regs {
                let prev = owner.insert(*reg, step.node);
                prop_assert!(prev.map_or(true, |n| n == step.node),
                    "tuple register {} shared", reg);
            }
        }

        let (again, _) = compile(&catalog, &shape);
        prop_assert_eq!(Some(compiled.root), again.map(|c| c.root));
    }

    /// Analysis is deterministic: fresh compilations of the same query make
    /// the same index choice with the same bounds and filters.
    #[test]
    fn prop_analysis_idempotent(shape in shape_strategy()) {
        let catalog = Catalog::new().with_table(table());
        let (first, g1) = compile(&catalog, &shape);
        let (second, g2) = compile(&catalog, &shape);
        let (first, second) = (first.expect("compiles"), second.expect("compiles"));
        prop_assert_eq!(first.root.to_string(), second.root.to_string());
        prop_assert_eq!(first.num_steps, second.num_steps);

        let (g1, g2) = (g1.expect("graph"), g2.expect("graph"));
        let scans = |g: &ExprGraph| -> Vec<_> {
            g.live_ids()
                .filter_map(|id| g.scan(id).cloned())
                .map(|s| (s.index, s.eq_keys.len(), s.range.map(|r| r.pos), s.filter.is_some()))
                .collect()
        };
        prop_assert_eq!(scans(&g1), scans(&g2));
    }

    /// Across partitions, the server returns offset + limit rows and the
    /// client applies the exact offset and limit.
    #[test]
    fn prop_offset_limit_reshaping(k in 0i32..10_000, n in 0i32..10_000) {
        let catalog = Catalog::new().with_table(table());
        let shape = QueryShape {
            conjuncts: Vec::new(),
            order_by: None,
            offset: Some(k),
            limit: Some(n),
        };
        let (compiled, graph) = compile(&catalog, &shape);
        prop_assert!(compiled.is_some());
        let g = graph.expect("graph");

        let client = g.root().expect("root");
        let client_block = g.sfw(client).expect("client block");
        prop_assert_eq!(literal(&g, client_block.offset.expect("offset")), Some(Value::Integer(k)));
        prop_assert_eq!(literal(&g, client_block.limit.expect("limit")), Some(Value::Integer(n)));

        let server = match g.kind(client_block.first_domain().expect("domain")) {
            ExprKind::Receive(r) => r.input,
            other => panic!("expected receive, got {}", other.name()),
        };
        let server_block = g.sfw(server).expect("server block");
        prop_assert!(server_block.offset.is_none());
        prop_assert_eq!(
            literal(&g, server_block.limit.expect("server limit")),
            Some(Value::Long(k as i64 + n as i64))
        );
    }
}

#[test]
fn non_literal_window_is_added_at_run_time() {
    let catalog = Catalog::new().with_table(table());
    let mut graph = ExprGraph::new();
    let mut b = SfwBuilder::new(&mut graph, &catalog);
    b.from_table("t", "t").unwrap();
    let g = b.graph();
    let k = g.add_external_var("$k", shardql_core::ExprType::one(ItemType::Integer));
    let n = g.constant(10);
    b.offset(k).limit(n);
    let sfw = b.build().unwrap();
    graph.set_root(sfw);

    let mut qcb = QueryControlBlock::new(&catalog, CompileOptions::default());
    assert!(qcb.compile_graph(graph));
    let g = qcb.graph().unwrap();
    let server_limit = g.sfw(sfw).unwrap().limit.unwrap();
    match g.kind(server_limit) {
        ExprKind::FuncCall {
            func: FuncCode::OpAdd,
            args,
        } => assert_eq!(args.len(), 2),
        other => panic!("expected an addition, got {}", other.name()),
    }
}
