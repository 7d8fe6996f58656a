//! End-to-end compilation tests through the query control block.

use shardql_core::schema::{TableBuilder, TableDef};
use shardql_core::{Error, ErrorCategory, ExprType, ItemType, Result, Value};
use shardql_query::codegen::{PlanStep, SortKind, StepKind};
use shardql_query::expr::{
    DistributionKind, ExprGraph, ExprId, ExprKind, HintTarget, IndexHint, SfwBuilder, SortSpec,
    TableScan,
};
use shardql_query::functions::FuncCode;
use shardql_query::{Catalog, CompileOptions, QueryControlBlock, QueryFrontend, Translation};

/// Front end whose translation runs a builder closure over one query block.
struct BuildFrontend<F>(F);

impl<F> QueryFrontend for BuildFrontend<F>
where
    F: Fn(&mut SfwBuilder<'_, '_>) -> Result<()>,
{
    type ParseTree = ();

    fn parse(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn translate(&self, _tree: (), catalog: &Catalog) -> Result<Translation> {
        let mut graph = ExprGraph::new();
        let mut builder = SfwBuilder::new(&mut graph, catalog);
        (self.0)(&mut builder)?;
        let sfw = builder.build()?;
        graph.set_root(sfw);
        Ok(Translation::Query(graph))
    }
}

/// T(id INT, a INT, b INT, PRIMARY KEY(id)), idx_a(a)
fn table_t() -> TableDef {
    TableBuilder::new("T")
        .unwrap()
        .add_field("id", ItemType::Integer)
        .unwrap()
        .add_field("a", ItemType::Integer)
        .unwrap()
        .add_field("b", ItemType::Integer)
        .unwrap()
        .primary_key(&["id"])
        .unwrap()
        .add_index("idx_a", &["a"])
        .unwrap()
        .build()
        .unwrap()
}

/// U(id INT, a INT, b INT, PRIMARY KEY(id)), idx_a(a), idx_b(b)
fn table_u() -> TableDef {
    TableBuilder::new("U")
        .unwrap()
        .add_field("id", ItemType::Integer)
        .unwrap()
        .add_field("a", ItemType::Integer)
        .unwrap()
        .add_field("b", ItemType::Integer)
        .unwrap()
        .primary_key(&["id"])
        .unwrap()
        .add_index("idx_a", &["a"])
        .unwrap()
        .add_index("idx_b", &["b"])
        .unwrap()
        .build()
        .unwrap()
}

/// docs(sid INT, id INT, tags ARRAY(STRING), PRIMARY KEY(SHARD(sid), id)), idx_tags(tags[])
fn table_docs() -> TableDef {
    TableBuilder::new("docs")
        .unwrap()
        .add_field("sid", ItemType::Integer)
        .unwrap()
        .add_field("id", ItemType::Integer)
        .unwrap()
        .add_field("tags", ItemType::array(ItemType::String))
        .unwrap()
        .primary_key(&["sid", "id"])
        .unwrap()
        .shard_key(&["sid"])
        .unwrap()
        .add_index("idx_tags", &["tags[]"])
        .unwrap()
        .build()
        .unwrap()
}

fn catalog() -> Catalog {
    Catalog::new()
        .with_table(table_t())
        .with_table(table_u())
        .with_table(table_docs())
}

fn compile_with<'c, F>(catalog: &'c Catalog, options: CompileOptions, build: F) -> QueryControlBlock<'c>
where
    F: Fn(&mut SfwBuilder<'_, '_>) -> Result<()>,
{
    let mut qcb = QueryControlBlock::new(catalog, options);
    qcb.compile(&BuildFrontend(build), "query");
    qcb
}

fn compile<'c, F>(catalog: &'c Catalog, build: F) -> QueryControlBlock<'c>
where
    F: Fn(&mut SfwBuilder<'_, '_>) -> Result<()>,
{
    compile_with(catalog, CompileOptions::default(), build)
}

/// Returns the query block that runs next to the data.
fn server_block(g: &ExprGraph) -> ExprId {
    let mut id = g.root().unwrap();
    loop {
        match g.kind(id) {
            ExprKind::Receive(r) => id = r.input,
            ExprKind::Sfw(sfw) => {
                let domain = sfw.first_domain().unwrap();
                match g.kind(domain) {
                    ExprKind::Receive(r) => id = r.input,
                    _ => return id,
                }
            }
            other => panic!("no query block under {}", other.name()),
        }
    }
}

fn scan_of(g: &ExprGraph, sfw: ExprId) -> TableScan {
    let domain = g.sfw(sfw).unwrap().first_domain().unwrap();
    g.scan(domain).unwrap().clone()
}

fn count_steps(plan: &PlanStep, pred: impl Fn(&StepKind) -> bool) -> usize {
    let mut n = 0;
    plan.visit(&mut |s| {
        if pred(&s.kind) {
            n += 1;
        }
    });
    n
}

fn literal(g: &ExprGraph, id: ExprId) -> Option<Value> {
    match g.kind(id) {
        ExprKind::Const(v) => Some(v.clone()),
        _ => None,
    }
}

#[test]
fn scenario_a_index_equality_with_residual_filter() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        let t = b.from_table("T", "t")?;
        let a = b.column(t, "a")?;
        let bcol = b.column(t, "b")?;
        let g = b.graph();
        let five = g.constant(5);
        let ten = g.constant(10);
        let p1 = g.eq(a, five);
        let p2 = g.eq(bcol, ten);
        b.where_(p1).where_(p2);
        Ok(())
    });
    assert!(qcb.succeeded(), "{:?}", qcb.error());

    let g = qcb.graph().unwrap();
    let sfw = server_block(g);
    let scan = scan_of(g, sfw);
    assert_eq!(scan.index.as_deref(), Some("idx_a"));
    assert_eq!(scan.eq_keys.len(), 1);
    assert_eq!(literal(g, scan.eq_keys[0]), Some(Value::Integer(5)));
    assert!(!scan.uses_covering_index);

    let conjuncts = g.where_conjuncts(sfw);
    assert_eq!(conjuncts.len(), 1);
    match g.kind(conjuncts[0]) {
        ExprKind::FuncCall {
            func: FuncCode::OpEq,
            args,
        } => assert_eq!(literal(g, args[1]), Some(Value::Integer(10))),
        other => panic!("unexpected residual predicate {}", other.name()),
    }

    let plan = qcb.plan().unwrap();
    assert!(matches!(
        plan.kind,
        StepKind::Receive {
            distribution: DistributionKind::AllShards,
            ..
        }
    ));
    assert!(matches!(
        plan.inputs[0].kind,
        StepKind::Sfw {
            has_where: true,
            ..
        }
    ));
    assert_eq!(
        count_steps(plan, |k| matches!(k, StepKind::TableScan { .. })),
        1
    );
}

#[test]
fn scenario_b_contradicting_primary_key_equalities() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        let t = b.from_table("T", "t")?;
        let id = b.column(t, "id")?;
        let g = b.graph();
        let one = g.constant(1);
        let two = g.constant(2);
        let p1 = g.eq(id, one);
        let p2 = g.eq(id, two);
        b.where_(p1).where_(p2);
        Ok(())
    });
    assert!(qcb.succeeded(), "{:?}", qcb.error());
    let plan = qcb.plan().unwrap();
    assert_eq!(plan.kind, StepKind::Const(Value::Empty));
    assert_eq!(qcb.step_count(), 1);
    assert_eq!(qcb.result_type(), Some(&ExprType::empty()));
}

#[test]
fn scenario_c_sort_index_with_offset_and_limit() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        let t = b.from_table("T", "t")?;
        let a = b.column(t, "a")?;
        let g = b.graph();
        let off = g.constant(5);
        let lim = g.constant(10);
        b.order_by(a, SortSpec::asc()).offset(off).limit(lim);
        Ok(())
    });
    assert!(qcb.succeeded(), "{:?}", qcb.error());
    let g = qcb.graph().unwrap();

    let client = g.root().unwrap();
    let client_block = g.sfw(client).unwrap();
    assert_eq!(
        literal(g, client_block.offset.unwrap()),
        Some(Value::Integer(5))
    );
    assert_eq!(
        literal(g, client_block.limit.unwrap()),
        Some(Value::Integer(10))
    );
    let names: Vec<&str> = client_block.select.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "a", "b"]);

    let recv = match g.kind(client_block.first_domain().unwrap()) {
        ExprKind::Receive(r) => r.clone(),
        other => panic!("expected receive, got {}", other.name()),
    };
    assert_eq!(recv.distribution, DistributionKind::AllShards);
    assert_eq!(recv.sort_positions, vec![1]);
    assert_eq!(recv.sort_specs, vec![SortSpec::asc()]);

    let server = server_block(g);
    let server_block = g.sfw(server).unwrap();
    assert!(server_block.sort_by_index);
    assert!(server_block.offset.is_none());
    assert_eq!(
        literal(g, server_block.limit.unwrap()),
        Some(Value::Long(15))
    );
    assert_eq!(scan_of(g, server).index.as_deref(), Some("idx_a"));

    let plan = qcb.plan().unwrap();
    assert!(matches!(
        plan.kind,
        StepKind::Sfw {
            has_offset: true,
            has_limit: true,
            sort: SortKind::None,
            ..
        }
    ));
    assert_eq!(
        count_steps(plan, |k| matches!(
            k,
            StepKind::Sfw {
                sort: SortKind::Index,
                has_offset: false,
                ..
            }
        )),
        1
    );
}

#[test]
fn complete_primary_key_wins_and_drops_sort() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        let t = b.from_table("T", "t")?;
        let id = b.column(t, "id")?;
        let a = b.column(t, "a")?;
        let g = b.graph();
        let one = g.constant(1);
        let five = g.constant(5);
        let p1 = g.eq(id, one);
        let p2 = g.eq(a, five);
        b.where_(p1).where_(p2).order_by(a, SortSpec::desc());
        Ok(())
    });
    assert!(qcb.succeeded(), "{:?}", qcb.error());
    let g = qcb.graph().unwrap();
    let root = g.root().unwrap();
    match g.kind(root) {
        ExprKind::Receive(r) => assert_eq!(r.distribution, DistributionKind::SinglePartition),
        other => panic!("expected receive, got {}", other.name()),
    }
    let sfw = server_block(g);
    assert!(!g.sfw(sfw).unwrap().has_sort());
    let scan = scan_of(g, sfw);
    assert!(scan.is_primary());
    assert_eq!(literal(g, scan.eq_keys[0]), Some(Value::Integer(1)));
    assert_eq!(
        count_steps(qcb.plan().unwrap(), |k| matches!(
            k,
            StepKind::Sfw {
                sort: SortKind::Explicit,
                ..
            }
        )),
        0
    );
}

#[test]
fn contradicting_secondary_equalities_yield_empty_plan() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        let t = b.from_table("T", "t")?;
        let a = b.column(t, "a")?;
        let g = b.graph();
        let one = g.constant(1);
        let two = g.constant(2);
        let p1 = g.eq(a, one);
        let p2 = g.eq(a, two);
        b.where_(p1).where_(p2);
        Ok(())
    });
    assert!(qcb.succeeded(), "{:?}", qcb.error());
    let plan = qcb.plan().unwrap();
    assert_eq!(plan.kind, StepKind::Const(Value::Empty));
    assert_eq!(
        count_steps(plan, |k| matches!(k, StepKind::TableScan { .. })),
        0
    );
}

#[test]
fn multikey_any_comparison_eliminates_duplicates() {
    let catalog = catalog();
    for op in [FuncCode::OpAnyEq, FuncCode::OpAnyGt] {
        let qcb = compile(&catalog, |b| {
            let d = b.from_table("docs", "d")?;
            let tags = b.column(d, "tags")?;
            let g = b.graph();
            let elems = g.elements(tags);
            let m = g.constant("m");
            let p = g.func(op, vec![elems, m]);
            b.where_(p);
            Ok(())
        });
        assert!(qcb.succeeded(), "{:?}", qcb.error());
        let g = qcb.graph().unwrap();
        let sfw = server_block(g);
        let scan = scan_of(g, sfw);
        assert_eq!(scan.index.as_deref(), Some("idx_tags"));
        assert!(scan.eliminate_dups, "{:?} must remove duplicates", op);

        let client = g.root().unwrap();
        let recv = match g.kind(g.sfw(client).unwrap().first_domain().unwrap()) {
            ExprKind::Receive(r) => r.clone(),
            other => panic!("expected receive, got {}", other.name()),
        };
        assert_eq!(recv.pk_positions.len(), 2);
    }
}

fn incomparable_query(b: &mut SfwBuilder<'_, '_>) -> Result<()> {
    let t = b.from_table("T", "t")?;
    let a = b.column(t, "a")?;
    let g = b.graph();
    let x = g.constant("x");
    let p = g.eq(a, x);
    b.where_(p);
    Ok(())
}

#[test]
fn strict_mode_rejects_incomparable_literal() {
    let catalog = catalog();
    let strict = compile(&catalog, incomparable_query);
    assert!(!strict.succeeded());
    let err = strict.error().unwrap();
    assert!(matches!(err, Error::IncomparableTypes { .. }));
    assert_eq!(err.category(), ErrorCategory::Semantic);
    assert!(strict.plan().is_none());

    let lenient = compile_with(
        &catalog,
        CompileOptions::new().with_strict_mode(false),
        incomparable_query,
    );
    assert!(lenient.succeeded(), "{:?}", lenient.error());
    assert_eq!(lenient.plan().unwrap().kind, StepKind::Const(Value::Empty));
}

/// `b` has no index and `a` drives the sort through `idx_a`.
fn unindexed_incomparable_query(b: &mut SfwBuilder<'_, '_>) -> Result<()> {
    let t = b.from_table("T", "t")?;
    let bcol = b.column(t, "b")?;
    let a = b.column(t, "a")?;
    let g = b.graph();
    let x = g.constant("x");
    let p = g.eq(bcol, x);
    b.where_(p).order_by(a, SortSpec::asc());
    Ok(())
}

#[test]
fn incomparable_literal_on_unindexed_column_with_order_by() {
    let catalog = catalog();
    let strict = compile(&catalog, unindexed_incomparable_query);
    assert!(matches!(strict.error(), Some(Error::IncomparableTypes { .. })));

    let lenient = compile_with(
        &catalog,
        CompileOptions::new().with_strict_mode(false),
        unindexed_incomparable_query,
    );
    assert!(lenient.succeeded(), "{:?}", lenient.error());
    assert_eq!(lenient.plan().unwrap().kind, StepKind::Const(Value::Empty));
}

#[test]
fn forced_index_conflicting_with_sort_index_fails() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        let u = b.from_table_with_hints("U", "u", vec![IndexHint::Force(HintTarget::Primary)])?;
        let bcol = b.column(u, "b")?;
        b.order_by(bcol, SortSpec::asc());
        Ok(())
    });
    assert!(!qcb.succeeded());
    match qcb.error().unwrap() {
        Error::ForcedIndexConflict {
            forced, sort_index, ..
        } => {
            assert_eq!(forced, "primary");
            assert_eq!(sort_index, "idx_b");
        }
        other => panic!("unexpected error {}", other),
    }
    // The failed stage leaves no plan and code generation is skipped.
    assert_eq!(qcb.step_count(), 0);
}

#[test]
fn forced_index_is_used_without_sort() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        let u = b.from_table_with_hints(
            "U",
            "u",
            vec![IndexHint::Force(HintTarget::Index("idx_b".into()))],
        )?;
        let a = b.column(u, "a")?;
        let g = b.graph();
        let five = g.constant(5);
        let p = g.eq(a, five);
        b.where_(p);
        Ok(())
    });
    assert!(qcb.succeeded(), "{:?}", qcb.error());
    let g = qcb.graph().unwrap();
    let sfw = server_block(g);
    assert_eq!(scan_of(g, sfw).index.as_deref(), Some("idx_b"));
    assert_eq!(g.where_conjuncts(sfw).len(), 1);
}

#[test]
fn duplicate_hint_is_reported_by_translation() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        b.from_table_with_hints(
            "U",
            "u",
            vec![
                IndexHint::Prefer(HintTarget::Index("idx_a".into())),
                IndexHint::Prefer(HintTarget::Index("idx_a".into())),
            ],
        )?;
        Ok(())
    });
    assert!(!qcb.succeeded());
    assert!(matches!(qcb.error(), Some(Error::DuplicateHint { .. })));
    assert!(qcb.graph().is_none());
}

#[test]
fn unknown_table_is_semantic_error() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        b.from_table("missing", "m")?;
        Ok(())
    });
    let err = qcb.error().unwrap();
    assert!(matches!(err, Error::TableNotFound { .. }));
    assert_eq!(err.category(), ErrorCategory::Semantic);
}

#[test]
fn external_variable_is_pushed_and_reported() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        let t = b.from_table("T", "t")?;
        let a = b.column(t, "a")?;
        let g = b.graph();
        let x = g.add_external_var("$x", ExprType::one(ItemType::Integer));
        let p = g.eq(a, x);
        b.where_(p);
        Ok(())
    });
    assert!(qcb.succeeded(), "{:?}", qcb.error());
    let g = qcb.graph().unwrap();
    let sfw = server_block(g);
    let scan = scan_of(g, sfw);
    assert_eq!(scan.index.as_deref(), Some("idx_a"));
    assert!(matches!(g.kind(scan.eq_keys[0]), ExprKind::Var(_)));
    assert!(g.where_conjuncts(sfw).is_empty());

    let vars = qcb.external_vars();
    assert_eq!(vars.len(), 1);
    assert_eq!(vars[0].name, "$x");
    assert_eq!(vars[0].declared, ExprType::one(ItemType::Integer));
    assert_eq!(
        count_steps(qcb.plan().unwrap(), |k| matches!(
            k,
            StepKind::ExternalVar { .. }
        )),
        1
    );
}

#[test]
fn plan_display_is_an_indented_tree() {
    let catalog = catalog();
    let qcb = compile(&catalog, |b| {
        let t = b.from_table("T", "t")?;
        let a = b.column(t, "a")?;
        let g = b.graph();
        let five = g.constant(5);
        let p = g.eq(a, five);
        b.where_(p);
        Ok(())
    });
    let text = qcb.display_plan().unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("RECEIVE ALL_SHARDS"));
    assert!(lines[1].starts_with("  SFW *"));
    assert!(lines[2].starts_with("    SCAN T via idx_a eq=1"));
    assert!(lines[3].starts_with("      CONST 5"));
    assert_eq!(lines.len(), qcb.step_count());
}
