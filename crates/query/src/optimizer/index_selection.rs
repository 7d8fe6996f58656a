//! Index selection optimization pass.

use super::index_analyzer::{check_comparisons, IndexAnalyzer};
use super::OptimizerPass;
use crate::context::{Catalog, CompileOptions};
use crate::expr::{validate_hints, ExprGraph, ExprId, HintTarget, IndexHint};
use alloc::vec::Vec;
use core::cmp::{Ordering, Reverse};
use shardql_core::schema::{IndexDef, TableDef};
use shardql_core::{Error, Result};
use tracing::debug;

/// Index selection.
///
/// For every query block that scans a table, picks the index the scan
/// goes through and pushes the matching predicates into it. The shortcuts
/// below are tried in order before indexes are compared by score:
/// - a complete primary key selects the primary index and drops the sort;
/// - a forced index is used as is; it is an error when it cannot deliver
///   the ORDER BY and another index can;
/// - a complete shard key selects the primary index;
/// - an index whose order matches the ORDER BY is used to deliver it.
pub struct IndexSelection<'a> {
    catalog: &'a Catalog,
    options: &'a CompileOptions,
}

impl<'a> IndexSelection<'a> {
    pub fn new(catalog: &'a Catalog, options: &'a CompileOptions) -> Self {
        Self { catalog, options }
    }

    fn select(&self, graph: &mut ExprGraph, sfw: ExprId) -> Result<()> {
        let Some(block) = graph.sfw(sfw) else {
            return Ok(());
        };
        let (Some(scan_id), Some(row_var)) = (block.first_domain(), block.first_var()) else {
            return Ok(());
        };
        let Some(scan) = graph.scan(scan_id) else {
            return Ok(());
        };
        let location = graph.location(scan_id);
        let table = self.catalog.table(&scan.table).map_err(|e| e.at(location))?;
        let hints = scan.hints.clone();
        validate_hints(table.name(), &hints, |name| table.get_index(name).is_some())
            .map_err(|e| e.at(location))?;

        if check_comparisons(graph, sfw, row_var, self.options.strict_mode)? {
            replace_with_empty(graph, sfw);
            return Ok(());
        }

        let candidates: Vec<Option<&IndexDef>> = core::iter::once(None)
            .chain(table.indexes().iter().map(Some))
            .collect();
        let sort_index = candidates
            .iter()
            .copied()
            .find_map(|c| {
                let candidate = IndexAnalyzer::new(table, c, self.options, sfw, row_var);
                index_order(graph, sfw, &candidate).map(|reverse| (c, reverse))
            });

        let mut primary = IndexAnalyzer::new(table, None, self.options, sfw, row_var);
        primary.analyze(graph)?;
        if primary.is_always_false() {
            replace_with_empty(graph, sfw);
            return Ok(());
        }

        if primary.is_complete_key() {
            debug!(table = table.name(), "complete primary key");
            primary.apply(graph)?;
            clear_sort(graph, sfw);
            return Ok(());
        }

        if let Some(forced) = hints.iter().find(|h| h.is_force()) {
            let index = match forced.target() {
                HintTarget::Primary => None,
                HintTarget::Index(name) => table.get_index(name),
            };
            let forced_analyzer = IndexAnalyzer::new(table, index, self.options, sfw, row_var);
            let forced_order = index_order(graph, sfw, &forced_analyzer);
            if let (None, Some((sort_idx, _))) = (forced_order, sort_index) {
                return Err(
                    Error::forced_index_conflict(index_label(index), index_label(sort_idx))
                        .at(location),
                );
            }
            return self.use_index(graph, table, index, sfw, row_var, forced_order);
        }

        if primary.is_complete_shard_key() {
            debug!(table = table.name(), "complete shard key");
            primary.apply(graph)?;
            if let Some((None, reverse)) = sort_index {
                set_sort_by_index(graph, sfw, scan_id, reverse);
            }
            return Ok(());
        }

        if let Some((index, reverse)) = sort_index {
            debug!(index = index_label(index), "index delivers the requested order");
            return self.use_index(graph, table, index, sfw, row_var, Some(reverse));
        }

        let mut analyzers = Vec::with_capacity(candidates.len());
        analyzers.push(primary);
        for index in table.indexes() {
            let mut analyzer = IndexAnalyzer::new(table, Some(index), self.options, sfw, row_var);
            analyzer.analyze(graph)?;
            if analyzer.is_always_false() {
                replace_with_empty(graph, sfw);
                return Ok(());
            }
            analyzers.push(analyzer);
        }

        let preferred = |a: &IndexAnalyzer<'_>| {
            hints
                .iter()
                .any(|h| !h.is_force() && hint_names(h, a.name()))
        };
        let mut best = 0;
        for i in 1..analyzers.len() {
            if compare(&analyzers[i], &analyzers[best], &preferred) == Ordering::Greater {
                best = i;
            }
        }
        debug!(
            table = table.name(),
            index = index_label(analyzers[best].index()),
            score = analyzers[best].score(),
            "selected index"
        );
        analyzers[best].apply(graph)
    }

    fn use_index(
        &self,
        graph: &mut ExprGraph,
        table: &TableDef,
        index: Option<&IndexDef>,
        sfw: ExprId,
        row_var: ExprId,
        sort_reverse: Option<bool>,
    ) -> Result<()> {
        let mut analyzer = IndexAnalyzer::new(table, index, self.options, sfw, row_var);
        analyzer.analyze(graph)?;
        if analyzer.is_always_false() {
            replace_with_empty(graph, sfw);
            return Ok(());
        }
        analyzer.apply(graph)?;
        if let Some(reverse) = sort_reverse {
            if let Some(scan) = graph.sfw(sfw).and_then(|s| s.first_domain()) {
                set_sort_by_index(graph, sfw, scan, reverse);
            }
        }
        Ok(())
    }
}

impl OptimizerPass for IndexSelection<'_> {
    fn apply(&self, graph: &mut ExprGraph) -> Result<()> {
        for sfw in graph.query_blocks() {
            if graph.is_live(sfw) {
                self.select(graph, sfw)?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "index_selection"
    }
}

/// Total order over analyzed candidates; `Greater` means `a` is better.
pub(crate) fn compare(
    a: &IndexAnalyzer<'_>,
    b: &IndexAnalyzer<'_>,
    preferred: &dyn Fn(&IndexAnalyzer<'_>) -> bool,
) -> Ordering {
    match (a.is_complete_key(), b.is_complete_key()) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    let (pa, pb) = (preferred(a), preferred(b));
    if a.is_covering() != b.is_covering() {
        if pa != pb {
            return pa.cmp(&pb);
        }
        let covering_wins = if a.is_covering() {
            a.num_pushed() >= b.num_pushed()
        } else {
            b.num_pushed() >= a.num_pushed()
        };
        return if covering_wins == a.is_covering() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }

    if a.score() != b.score() {
        return a.score().cmp(&b.score());
    }
    let tie_key = |x: &IndexAnalyzer<'_>, hinted: bool| {
        (
            x.is_primary() && x.score() == 0,
            hinted,
            !x.is_multi_key(),
            Reverse(x.num_fields()),
        )
    };
    tie_key(a, pa).cmp(&tie_key(b, pb))
}

/// Returns `Some(reverse)` if scanning the index yields rows in the order
/// the query block requests.
fn index_order(graph: &ExprGraph, sfw: ExprId, candidate: &IndexAnalyzer<'_>) -> Option<bool> {
    let block = graph.sfw(sfw)?;
    let desc = block.sort.first()?.spec.desc;
    if candidate.is_multi_key() {
        return None;
    }
    for (i, key) in block.sort.iter().enumerate() {
        if key.spec.desc != desc || !key.spec.has_natural_nulls() {
            return None;
        }
        if candidate.field_position(graph, key.expr) != Some(i) {
            return None;
        }
    }
    Some(desc)
}

fn hint_names(hint: &IndexHint, index: Option<&str>) -> bool {
    match (hint.target(), index) {
        (HintTarget::Primary, None) => true,
        (HintTarget::Index(name), Some(index)) => name == index,
        _ => false,
    }
}

fn index_label(index: Option<&IndexDef>) -> &str {
    index.map_or("primary", IndexDef::name)
}

fn replace_with_empty(graph: &mut ExprGraph, sfw: ExprId) {
    debug!(block = %sfw, "query block is always empty");
    let empty = graph.empty_seq();
    graph.replace(sfw, empty, true);
}

fn clear_sort(graph: &mut ExprGraph, sfw: ExprId) {
    let keys = match graph.sfw_mut(sfw) {
        Some(block) => {
            block.sort_by_index = false;
            core::mem::take(&mut block.sort)
        }
        None => return,
    };
    for key in keys {
        graph.unlink(sfw, key.expr);
        if graph.parents(key.expr).is_empty() {
            graph.destroy(key.expr);
        }
    }
}

fn set_sort_by_index(graph: &mut ExprGraph, sfw: ExprId, scan: ExprId, reverse: bool) {
    if let Some(block) = graph.sfw_mut(sfw) {
        block.sort_by_index = true;
    }
    if let Some(scan) = graph.scan_mut(scan) {
        scan.reverse = reverse;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ExprKind, SfwBuilder, SortSpec};
    use alloc::string::String;
    use alloc::vec;
    use shardql_core::schema::TableBuilder;
    use shardql_core::{ItemType, Value};

    fn catalog() -> Catalog {
        let t = TableBuilder::new("t")
            .unwrap()
            .add_field("sid", ItemType::Integer)
            .unwrap()
            .add_field("id", ItemType::Integer)
            .unwrap()
            .add_field("a", ItemType::Integer)
            .unwrap()
            .add_field("b", ItemType::Integer)
            .unwrap()
            .add_field("tags", ItemType::array(ItemType::String))
            .unwrap()
            .add_field("note", ItemType::String)
            .unwrap()
            .primary_key(&["sid", "id"])
            .unwrap()
            .shard_key(&["sid"])
            .unwrap()
            .add_index("idx_a", &["a"])
            .unwrap()
            .add_index("idx_b", &["b"])
            .unwrap()
            .add_index("idx_tags", &["tags[]"])
            .unwrap()
            .build()
            .unwrap();
        Catalog::new().with_table(t)
    }

    fn scan_of(graph: &ExprGraph, sfw: ExprId) -> crate::expr::TableScan {
        let domain = graph.sfw(sfw).unwrap().first_domain().unwrap();
        graph.scan(domain).unwrap().clone()
    }

    fn run(catalog: &Catalog, graph: &mut ExprGraph) -> Result<()> {
        let options = CompileOptions::default();
        IndexSelection::new(catalog, &options).apply(graph)
    }

    #[test]
    fn test_complete_primary_key_drops_sort() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b.from_table("t", "t").unwrap();
        let sid = b.column(t, "sid").unwrap();
        let id = b.column(t, "id").unwrap();
        let a = b.column(t, "a").unwrap();
        let g2 = b.graph();
        let one = g2.constant(1);
        let two = g2.constant(2);
        let p1 = g2.eq(sid, one);
        let p2 = g2.eq(id, two);
        b.where_(p1).where_(p2).order_by(a, SortSpec::asc());
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        run(&catalog, &mut g).unwrap();
        let scan = scan_of(&g, sfw);
        assert!(scan.is_primary());
        assert_eq!(scan.eq_keys.len(), 2);
        assert!(scan.single_partition);
        assert!(!g.sfw(sfw).unwrap().has_sort());
    }

    #[test]
    fn test_best_score_wins() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b.from_table("t", "t").unwrap();
        let a = b.column(t, "a").unwrap();
        let g2 = b.graph();
        let five = g2.constant(5);
        let p = g2.gt(a, five);
        b.where_(p);
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        run(&catalog, &mut g).unwrap();
        assert_eq!(scan_of(&g, sfw).index.as_deref(), Some("idx_a"));
        assert!(g.sfw(sfw).unwrap().where_expr.is_none());
    }

    #[test]
    fn test_sort_compatible_index() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b.from_table("t", "t").unwrap();
        let bcol = b.column(t, "b").unwrap();
        b.order_by(bcol, SortSpec::desc());
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        run(&catalog, &mut g).unwrap();
        let scan = scan_of(&g, sfw);
        assert_eq!(scan.index.as_deref(), Some("idx_b"));
        assert!(scan.reverse);
        assert!(g.sfw(sfw).unwrap().sort_by_index);
    }

    #[test]
    fn test_forced_index_conflicts_with_sort_index() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b
            .from_table_with_hints(
                "t",
                "t",
                vec![IndexHint::Force(HintTarget::Index(String::from("idx_a")))],
            )
            .unwrap();
        let bcol = b.column(t, "b").unwrap();
        b.order_by(bcol, SortSpec::asc());
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        let err = run(&catalog, &mut g).unwrap_err();
        assert!(matches!(err, Error::ForcedIndexConflict { .. }));
    }

    #[test]
    fn test_forced_index_is_used() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b
            .from_table_with_hints(
                "t",
                "t",
                vec![IndexHint::Force(HintTarget::Index(String::from("idx_b")))],
            )
            .unwrap();
        let a = b.column(t, "a").unwrap();
        let g2 = b.graph();
        let five = g2.constant(5);
        let p = g2.eq(a, five);
        b.where_(p);
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        run(&catalog, &mut g).unwrap();
        assert_eq!(scan_of(&g, sfw).index.as_deref(), Some("idx_b"));
    }

    #[test]
    fn test_contradiction_replaces_block() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b.from_table("t", "t").unwrap();
        let a = b.column(t, "a").unwrap();
        let g2 = b.graph();
        let one = g2.constant(1);
        let two = g2.constant(2);
        let p1 = g2.eq(a, one);
        let p2 = g2.eq(a, two);
        b.where_(p1).where_(p2);
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        run(&catalog, &mut g).unwrap();
        let root = g.root().unwrap();
        assert!(matches!(g.kind(root), ExprKind::Const(Value::Empty)));
        assert!(!g.is_live(sfw));
    }

    #[test]
    fn test_prefer_hint_breaks_ties() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b
            .from_table_with_hints(
                "t",
                "t",
                vec![IndexHint::Prefer(HintTarget::Index(String::from("idx_b")))],
            )
            .unwrap();
        let a = b.column(t, "a").unwrap();
        let bcol = b.column(t, "b").unwrap();
        let g2 = b.graph();
        let one = g2.constant(1);
        let two = g2.constant(2);
        let p1 = g2.gt(a, one);
        let p2 = g2.gt(bcol, two);
        b.where_(p1).where_(p2);
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        run(&catalog, &mut g).unwrap();
        assert_eq!(scan_of(&g, sfw).index.as_deref(), Some("idx_b"));
    }

    /// `WHERE note < 3`, with an optional complete primary key and
    /// ORDER BY b.
    fn unindexed_mismatch(catalog: &Catalog, full_key: bool, order_by: bool) -> (ExprGraph, ExprId) {
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, catalog);
        let t = b.from_table("t", "t").unwrap();
        let note = b.column(t, "note").unwrap();
        let three = b.graph().constant(3);
        let p = b.graph().lt(note, three);
        b.where_(p);
        if full_key {
            for (col, v) in [("sid", 1), ("id", 2)] {
                let c = b.column(t, col).unwrap();
                let lit = b.graph().constant(v);
                let p = b.graph().eq(c, lit);
                b.where_(p);
            }
        }
        if order_by {
            let bcol = b.column(t, "b").unwrap();
            b.order_by(bcol, SortSpec::asc());
        }
        let sfw = b.build().unwrap();
        g.set_root(sfw);
        (g, sfw)
    }

    #[test]
    fn test_strict_mode_checks_every_comparison() {
        let catalog = catalog();
        for (full_key, order_by) in [(false, false), (false, true), (true, false), (true, true)] {
            let (mut g, _) = unindexed_mismatch(&catalog, full_key, order_by);
            let err = run(&catalog, &mut g).unwrap_err();
            assert!(
                matches!(err, Error::IncomparableTypes { .. }),
                "full_key={} order_by={}",
                full_key,
                order_by
            );
        }
    }

    #[test]
    fn test_lenient_mode_empties_block_with_incomparable_comparison() {
        let catalog = catalog();
        let lenient = CompileOptions::default().with_strict_mode(false);
        for order_by in [false, true] {
            let (mut g, sfw) = unindexed_mismatch(&catalog, false, order_by);
            IndexSelection::new(&catalog, &lenient).apply(&mut g).unwrap();
            let root = g.root().unwrap();
            assert!(matches!(g.kind(root), ExprKind::Const(Value::Empty)));
            assert!(!g.is_live(sfw));
        }
    }

    #[test]
    fn test_forced_index_delivering_order() {
        let t = TableBuilder::new("t")
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
            .add_index("idx_ab", &["a", "b"])
            .unwrap()
            .build()
            .unwrap();
        let catalog = Catalog::new().with_table(t);
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b
            .from_table_with_hints(
                "t",
                "t",
                vec![IndexHint::Force(HintTarget::Index(String::from("idx_ab")))],
            )
            .unwrap();
        let a = b.column(t, "a").unwrap();
        b.order_by(a, SortSpec::desc());
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        run(&catalog, &mut g).unwrap();
        let scan = scan_of(&g, sfw);
        assert_eq!(scan.index.as_deref(), Some("idx_ab"));
        assert!(scan.reverse);
        assert!(g.sfw(sfw).unwrap().sort_by_index);
    }
}
