//! Analysis of one candidate index for a query block.
//!
//! The analyzer collects the WHERE conjuncts that compare an index field
//! with a row-independent expression, resolves conflicts between them and
//! decides which of them become key bounds (equalities on a prefix of the
//! index fields, then at most one range) and which filter index entries.
//! `apply` then rewrites the query block to scan the index.

use super::path::{extract_path, match_index_path, PathMatch, QueryPath, QueryStep};
use super::predicate::{resolve_pair, PredInfo, PredStatus, Resolution};
use crate::context::CompileOptions;
use crate::expr::{ExprGraph, ExprId, ExprKind, FieldRange, VarKind};
use crate::functions::{CompOp, FuncCode};
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use shardql_core::schema::{IndexDef, IndexPath, PathStep, TableDef};
use shardql_core::{Error, ItemType, Quantifier, Result, Value};
use tracing::{debug, trace};

/// Where the equality key on an index field comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeySource {
    Pred(usize),
    /// The literal key selected through a map-both index.
    MapKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RangeBounds {
    pos: usize,
    min: Option<usize>,
    max: Option<usize>,
}

/// Analyzer for the primary index (`index == None`) or a secondary index.
pub(crate) struct IndexAnalyzer<'a> {
    table: &'a TableDef,
    index: Option<&'a IndexDef>,
    options: &'a CompileOptions,
    sfw: ExprId,
    row_var: ExprId,
    paths: Vec<IndexPath>,
    field_types: Vec<ItemType>,
    multi_key: Vec<bool>,

    preds: Vec<PredInfo>,
    map_key: Option<String>,
    eq: Vec<KeySource>,
    range: Option<RangeBounds>,
    filtering: Vec<usize>,
    /// Conjuncts that are not comparisons on index fields but can be
    /// evaluated on index entries.
    index_filters: Vec<ExprId>,
    /// Unnesting variables whose every reference is pushed to the index.
    pushed_vars: Vec<ExprId>,
    /// Unnesting variables still referenced after pushing; their
    /// predicates stay in the WHERE clause.
    retained_vars: Vec<ExprId>,
    always_false: bool,
    covering: bool,
    eliminate_dups: bool,
    score: i32,
}

impl<'a> IndexAnalyzer<'a> {
    pub fn new(
        table: &'a TableDef,
        index: Option<&'a IndexDef>,
        options: &'a CompileOptions,
        sfw: ExprId,
        row_var: ExprId,
    ) -> Self {
        let (paths, field_types, multi_key) = match index {
            Some(index) => (
                index.paths().to_vec(),
                (0..index.num_fields())
                    .map(|i| index.field_type(i).clone())
                    .collect(),
                (0..index.num_fields())
                    .map(|i| index.is_multi_key_field(i))
                    .collect(),
            ),
            None => {
                let pk = table.primary_key();
                (
                    pk.iter()
                        .map(|name| IndexPath::new(alloc::vec![PathStep::Field(name.clone())]))
                        .collect(),
                    pk.iter()
                        .map(|name| {
                            table
                                .get_field(name)
                                .map_or(ItemType::Any, |f| f.item_type().clone())
                        })
                        .collect(),
                    alloc::vec![false; pk.len()],
                )
            }
        };
        Self {
            table,
            index,
            options,
            sfw,
            row_var,
            paths,
            field_types,
            multi_key,
            preds: Vec::new(),
            map_key: None,
            eq: Vec::new(),
            range: None,
            filtering: Vec::new(),
            index_filters: Vec::new(),
            pushed_vars: Vec::new(),
            retained_vars: Vec::new(),
            always_false: false,
            covering: false,
            eliminate_dups: false,
            score: 0,
        }
    }

    /// Index name, `None` for the primary index.
    #[inline]
    pub fn name(&self) -> Option<&'a str> {
        self.index.map(IndexDef::name)
    }

    #[inline]
    pub fn index(&self) -> Option<&'a IndexDef> {
        self.index
    }

    #[inline]
    pub fn is_primary(&self) -> bool {
        self.index.is_none()
    }

    #[inline]
    pub fn score(&self) -> i32 {
        self.score
    }

    #[inline]
    pub fn is_always_false(&self) -> bool {
        self.always_false
    }

    #[inline]
    pub fn is_covering(&self) -> bool {
        self.covering
    }

    #[inline]
    pub fn eliminates_dups(&self) -> bool {
        self.eliminate_dups
    }

    /// Returns true if equalities cover every index field.
    #[inline]
    pub fn is_complete_key(&self) -> bool {
        !self.paths.is_empty() && self.eq.len() == self.paths.len()
    }

    /// Returns true if this is the primary index and its equalities cover
    /// the shard key.
    pub fn is_complete_shard_key(&self) -> bool {
        self.is_primary() && self.eq.len() >= self.table.shard_key_len()
    }

    pub fn is_multi_key(&self) -> bool {
        self.multi_key.iter().any(|m| *m)
    }

    #[inline]
    pub fn num_fields(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    pub fn num_eq(&self) -> usize {
        self.eq.len()
    }

    /// Number of predicates used as key bounds.
    pub fn num_pushed(&self) -> usize {
        let range = self
            .range
            .map_or(0, |r| r.min.is_some() as usize + r.max.is_some() as usize);
        self.eq.len() + range
    }

    /// Returns the conjuncts used as filters on index entries.
    pub fn filtering_preds(&self) -> Vec<ExprId> {
        self.filtering
            .iter()
            .map(|&i| self.preds[i].pred)
            .chain(self.index_filters.iter().copied())
            .collect()
    }

    /// Returns the literal equality key values, where known.
    pub fn eq_values(&self) -> Vec<Option<Value>> {
        self.eq
            .iter()
            .map(|src| match src {
                KeySource::Pred(i) => self.preds[*i].value.clone(),
                KeySource::MapKey => self.map_key.clone().map(Value::String),
            })
            .collect()
    }

    /// Returns the position of the non-multi-key index field `expr`
    /// selects exactly, if any.
    pub fn field_position(&self, graph: &ExprGraph, expr: ExprId) -> Option<usize> {
        let q = extract_path(graph, expr, self.row_var)?;
        if q.unnest_var.is_some() {
            return None;
        }
        self.paths.iter().enumerate().position(|(i, p)| {
            !self.multi_key[i] && match_index_path(&q, p, false).map_or(false, |m| m.is_exact())
        })
    }

    fn display_name(&self) -> &str {
        self.name().unwrap_or("primary")
    }

    /// Analyzes the query block's WHERE clause against this index.
    pub fn analyze(&mut self, graph: &ExprGraph) -> Result<()> {
        for conjunct in graph.where_conjuncts(self.sfw) {
            self.collect(graph, conjunct)?;
            if self.always_false {
                break;
            }
        }
        if !self.always_false {
            self.choose_map_key();
            self.restrict_multi_key();
            self.resolve_conflicts();
        }
        if self.always_false {
            debug!(index = self.display_name(), "WHERE clause is always false");
            return Ok(());
        }

        self.choose_bounds();
        self.classify_unnest_vars(graph);
        self.collect_index_filters(graph);
        self.covering = self.check_covering(graph);
        self.eliminate_dups = self.needs_dedup();
        self.score = self.compute_score();

        debug!(
            index = self.display_name(),
            score = self.score,
            eq = self.num_eq(),
            range = self.range.is_some(),
            filters = self.filtering.len() + self.index_filters.len(),
            covering = self.covering,
            dedup = self.eliminates_dups(),
            "analyzed index"
        );
        trace!(index = self.display_name(), keys = ?self.eq_values(), "equality keys");
        Ok(())
    }

    fn collect(&mut self, graph: &ExprGraph, conjunct: ExprId) -> Result<()> {
        let ExprKind::FuncCall { func, args } = graph.kind(conjunct) else {
            return Ok(());
        };
        let Some((op, any)) = func.comparison() else {
            return Ok(());
        };
        if args.len() != 2 {
            return Ok(());
        }
        for (path_expr, const_expr, op) in [(args[0], args[1], op), (args[1], args[0], op.swap())] {
            if !is_row_independent(graph, const_expr) {
                continue;
            }
            let Some(qpath) = extract_path(graph, path_expr, self.row_var) else {
                continue;
            };
            let matches = self.match_positions(&qpath);
            let Some((ipos, m)) = matches.first().cloned() else {
                continue;
            };
            if matches.len() > 1 && matches.iter().any(|(_, m)| m.map_key.is_some()) {
                return Err(Error::ambiguous_map_key(qpath.to_string()).at(graph.location(conjunct)));
            }
            // A value comparison raises an error at runtime when the path
            // selects more than one item.
            if !any && !graph.expr_type(path_expr).is_scalar() {
                return Ok(());
            }
            // Incomparable operands are caught by `check_comparisons`
            // before any index is analyzed.
            if !self.field_types[ipos].is_comparable_with(&graph.expr_type(const_expr).item) {
                return Ok(());
            }
            let value = match graph.kind(const_expr) {
                ExprKind::Const(v) if v.is_null() || !v.is_atomic() => return Ok(()),
                ExprKind::Const(v) => Some(v.clone()),
                _ => None,
            };
            trace!(index = self.display_name(), pos = ipos, path = %qpath, op = %op, "matched predicate");
            self.preds.push(PredInfo {
                pred: conjunct,
                const_expr,
                value,
                op,
                any,
                ipos,
                map_key: m.map_key,
                partial: m.partial,
                unnest_var: qpath.unnest_var,
                status: PredStatus::Keep,
            });
            return Ok(());
        }
        Ok(())
    }

    fn match_positions(&self, q: &QueryPath) -> Vec<(usize, PathMatch)> {
        let values_pos = self.map_values_position();
        self.paths
            .iter()
            .enumerate()
            .filter_map(|(i, path)| {
                match_index_path(q, path, Some(i) == values_pos).map(|m| (i, m))
            })
            .collect()
    }

    /// Position of the values field of a map-both index.
    fn map_values_position(&self) -> Option<usize> {
        let index = self.index?;
        let kpos = index.map_keys_position()?;
        let prefix = self.paths[kpos].keys_prefix()?;
        self.paths
            .iter()
            .position(|p| p.split_at_values().map_or(false, |(map, _)| map == prefix))
    }

    /// Keeps only the predicates of the best scoring map key.
    fn choose_map_key(&mut self) {
        let Some(kpos) = self.index.and_then(IndexDef::map_keys_position) else {
            return;
        };
        let vpos = self.map_values_position();
        let w = self.options.weights;
        let mut scores: BTreeMap<&str, i32> = BTreeMap::new();
        for p in self.preds.iter().filter(|p| p.is_keep()) {
            if let Some(key) = &p.map_key {
                *scores.entry(key.as_str()).or_default() += if p.is_filter_only() {
                    w.multikey_filtering
                } else if p.is_eq() {
                    w.equality
                } else {
                    w.range
                };
            }
        }
        // Ties go to the smallest key.
        let mut best: Option<(&str, i32)> = None;
        for (key, score) in scores {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((key, score));
            }
        }
        let Some(best) = best.map(|(k, _)| k.to_string()) else {
            return;
        };
        debug!(index = self.display_name(), key = %best, "selected map key");

        for p in self.preds.iter_mut() {
            match &p.map_key {
                Some(key) if *key != best => p.status = PredStatus::Skip,
                Some(_) => {}
                None if p.ipos == kpos => {
                    let same_key = p.is_eq()
                        && !p.partial
                        && p.value.as_ref().and_then(Value::as_str) == Some(best.as_str());
                    p.status = if same_key {
                        PredStatus::AlwaysTrue
                    } else {
                        PredStatus::Skip
                    };
                }
                None if Some(p.ipos) == vpos => p.status = PredStatus::Skip,
                None => {}
            }
        }
        self.map_key = Some(best);
    }

    /// Predicates on multi-key fields that any entry may satisfy can only
    /// constrain one field; all of them yield to predicates on an
    /// unnested element.
    fn restrict_multi_key(&mut self) {
        let multi_key = &self.multi_key;
        let independent =
            |p: &PredInfo| p.is_keep() && multi_key[p.ipos] && p.unnest_var.is_none() && p.map_key.is_none();
        let has_unnested = self
            .preds
            .iter()
            .any(|p| p.is_keep() && multi_key[p.ipos] && p.unnest_var.is_some());
        let first = self.preds.iter().filter(|p| independent(*p)).map(|p| p.ipos).min();
        for p in self.preds.iter_mut() {
            if independent(&*p) && (has_unnested || Some(p.ipos) != first) {
                p.status = PredStatus::Skip;
            }
        }
    }

    fn resolve_conflicts(&mut self) {
        let n = self.preds.len();
        for i in 0..n {
            for j in i + 1..n {
                let (a, b) = (&self.preds[i], &self.preds[j]);
                if !a.is_keep()
                    || !b.is_keep()
                    || a.is_filter_only()
                    || b.is_filter_only()
                    || a.partial
                    || b.partial
                    || a.ipos != b.ipos
                    || a.map_key != b.map_key
                {
                    continue;
                }
                let independent =
                    self.multi_key[a.ipos] && (a.any || b.any || a.unnest_var != b.unnest_var);
                let res = resolve_pair(a, b, independent);
                trace!(index = self.display_name(), pos = a.ipos, ?res, "resolved predicate pair");
                match res {
                    Resolution::Both => {}
                    Resolution::First(status) => self.preds[i].status = status,
                    Resolution::Second(status) => self.preds[j].status = status,
                    Resolution::CollapseFirst => {
                        self.preds[i].op = CompOp::Eq;
                        self.preds[j].status = PredStatus::AlwaysTrue;
                    }
                    Resolution::CollapseSecond => {
                        self.preds[j].op = CompOp::Eq;
                        self.preds[i].status = PredStatus::AlwaysTrue;
                    }
                    Resolution::AlwaysFalse => {
                        self.preds[i].status = PredStatus::AlwaysFalse;
                        self.preds[j].status = PredStatus::AlwaysFalse;
                        self.always_false = true;
                        return;
                    }
                }
            }
        }
    }

    /// Picks equalities on a prefix of the index fields, then at most one
    /// range on the next field. Remaining candidates filter entries.
    fn choose_bounds(&mut self) {
        let kpos = self.index.and_then(IndexDef::map_keys_position);
        for pos in 0..self.paths.len() {
            if Some(pos) == kpos && self.map_key.is_some() {
                self.eq.push(KeySource::MapKey);
                continue;
            }
            let bound = |p: &PredInfo| p.is_keep() && p.ipos == pos && !p.is_filter_only();
            if let Some(i) = self.preds.iter().position(|p| bound(p) && p.is_eq()) {
                self.eq.push(KeySource::Pred(i));
                continue;
            }
            let min = self.preds.iter().position(|p| bound(p) && p.is_lower());
            let max = self.preds.iter().position(|p| bound(p) && p.is_upper());
            if min.is_some() || max.is_some() {
                self.range = Some(RangeBounds { pos, min, max });
            }
            break;
        }

        // Predicates on a map key only select the right entries when the
        // key itself is bound.
        if self.map_key.is_some() && !self.eq.contains(&KeySource::MapKey) {
            for p in self.preds.iter_mut() {
                if p.map_key.is_some() || (p.status == PredStatus::AlwaysTrue && Some(p.ipos) == kpos) {
                    p.status = PredStatus::Skip;
                }
            }
            self.map_key = None;
        }

        // A partial match cannot be evaluated on an index entry.
        let bounds = self.bound_preds();
        for (i, p) in self.preds.iter_mut().enumerate() {
            if p.partial && p.is_keep() && !bounds.contains(&i) {
                p.status = PredStatus::Skip;
            }
        }
        self.filtering = (0..self.preds.len())
            .filter(|i| self.preds[*i].is_keep() && !bounds.contains(i))
            .collect();
    }

    fn bound_preds(&self) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .eq
            .iter()
            .filter_map(|src| match src {
                KeySource::Pred(i) => Some(*i),
                KeySource::MapKey => None,
            })
            .collect();
        if let Some(r) = self.range {
            out.extend(r.min);
            out.extend(r.max);
        }
        out
    }

    /// Predicates taken over by the index: bounds, filters and the
    /// predicates they imply.
    fn pushed_preds(&self) -> Vec<usize> {
        let mut out = self.bound_preds();
        out.extend(self.filtering.iter().copied());
        out.extend(
            self.preds
                .iter()
                .enumerate()
                .filter(|(_, p)| p.status == PredStatus::AlwaysTrue)
                .map(|(i, _)| i),
        );
        out
    }

    fn classify_unnest_vars(&mut self, graph: &ExprGraph) {
        let mut counts: Vec<(ExprId, usize)> = Vec::new();
        for i in self.pushed_preds() {
            if let Some(var) = self.preds[i].unnest_var {
                match counts.iter_mut().find(|(v, _)| *v == var) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((var, 1)),
                }
            }
        }
        for (var, n) in counts {
            if graph.parents(var).len() > n {
                self.retained_vars.push(var);
            } else {
                self.pushed_vars.push(var);
            }
        }
    }

    /// Returns true if the conjunct must stay in the WHERE clause even
    /// though the index uses it.
    fn is_retained(&self, p: &PredInfo) -> bool {
        p.partial || p.unnest_var.map_or(false, |v| self.retained_vars.contains(&v))
    }

    /// Conjuncts removed from the WHERE clause by `apply`.
    fn consumed_conjuncts(&self) -> Vec<ExprId> {
        let mut out: Vec<ExprId> = self
            .pushed_preds()
            .into_iter()
            .map(|i| &self.preds[i])
            .filter(|p| p.status == PredStatus::AlwaysTrue || !self.is_retained(p))
            .map(|p| p.pred)
            .collect();
        out.extend(self.index_filters.iter().copied());
        out
    }

    fn collect_index_filters(&mut self, graph: &ExprGraph) {
        let used: Vec<ExprId> = self
            .preds
            .iter()
            .filter(|p| p.status != PredStatus::Skip)
            .map(|p| p.pred)
            .collect();
        for conjunct in graph.where_conjuncts(self.sfw) {
            if used.contains(&conjunct) || self.index_filters.contains(&conjunct) {
                continue;
            }
            let refs_row = graph.any_in_subtree(conjunct, |id, _| id == self.row_var);
            if refs_row && self.is_index_evaluable(graph, conjunct) {
                self.index_filters.push(conjunct);
            }
        }
    }

    fn is_index_evaluable(&self, graph: &ExprGraph, expr: ExprId) -> bool {
        if let Some(q) = extract_path(graph, expr, self.row_var) {
            return q.unnest_var.is_none() && self.is_resident(&q);
        }
        match graph.kind(expr) {
            ExprKind::Var(var) => !matches!(var.kind, VarKind::TableRow),
            ExprKind::Sfw(_) | ExprKind::BaseTable(_) | ExprKind::Receive(_) => false,
            _ => graph
                .children(expr)
                .into_iter()
                .all(|c| self.is_index_evaluable(graph, c)),
        }
    }

    /// Returns true if index entries hold the value the path selects.
    /// Secondary index entries carry the primary key.
    fn is_resident(&self, q: &QueryPath) -> bool {
        if let [step] = q.steps.as_slice() {
            if let QueryStep::Field(name) = &step.step {
                if self.table.primary_key_position(name).is_some() {
                    return true;
                }
            }
        }
        self.paths.iter().enumerate().any(|(i, p)| {
            !self.multi_key[i] && match_index_path(q, p, false).map_or(false, |m| m.is_exact())
        })
    }

    fn check_covering(&self, graph: &ExprGraph) -> bool {
        if self.is_primary() || self.is_multi_key() {
            return false;
        }
        let Some(sfw) = graph.sfw(self.sfw) else {
            return false;
        };
        if sfw.select_star || sfw.from.len() > 1 {
            return false;
        }
        let consumed = self.consumed_conjuncts();
        let remaining = graph
            .where_conjuncts(self.sfw)
            .into_iter()
            .filter(|c| !consumed.contains(c));
        sfw.select
            .iter()
            .map(|f| f.expr)
            .chain(sfw.sort.iter().map(|k| k.expr))
            .chain(remaining)
            .all(|e| self.is_index_evaluable(graph, e))
    }

    fn needs_dedup(&self) -> bool {
        if !self.is_multi_key() {
            return false;
        }
        if !self.retained_vars.is_empty() {
            return true;
        }
        let pushed = self.pushed_preds();
        let pushed_any = pushed.iter().any(|&i| {
            let p = &self.preds[i];
            p.status == PredStatus::Keep && (p.any || p.partial)
        });
        let multikey_range = self.range.map_or(false, |r| self.multi_key[r.pos]);
        // Each entry stands for one array element or map entry.
        let entry_driven = self.eq.contains(&KeySource::MapKey)
            || pushed.iter().any(|&i| {
                let p = &self.preds[i];
                p.status == PredStatus::Keep && self.multi_key[p.ipos] && p.unnest_var.is_some()
            });
        pushed_any || multikey_range || !entry_driven
    }

    fn compute_score(&self) -> i32 {
        if self.is_complete_key() {
            return i32::MAX;
        }
        let w = self.options.weights;
        let mut score = self.eq.len() as i32 * w.equality;
        if let Some(r) = self.range {
            let per_bound = if self.multi_key[r.pos] {
                w.multikey_range
            } else {
                w.range
            };
            score += per_bound * (r.min.is_some() as i32 + r.max.is_some() as i32);
        }
        for &i in &self.filtering {
            score += if self.multi_key[self.preds[i].ipos] {
                w.multikey_filtering
            } else {
                w.filtering
            };
        }
        score + self.index_filters.len() as i32 * w.filtering
    }

    /// Rewrites the query block to scan this index.
    pub fn apply(&self, graph: &mut ExprGraph) -> Result<()> {
        let scan = graph
            .sfw(self.sfw)
            .and_then(|s| s.first_domain())
            .filter(|d| graph.scan(*d).is_some())
            .ok_or_else(|| Error::internal("query block does not scan a table"))?;

        let mut eq_keys = Vec::with_capacity(self.eq.len());
        for src in &self.eq {
            let key = match src {
                KeySource::Pred(i) => self.preds[*i].const_expr,
                KeySource::MapKey => match &self.map_key {
                    Some(key) => graph.constant(key.clone()),
                    None => return Err(Error::internal("map key bound without a key")),
                },
            };
            eq_keys.push(key);
        }

        let range = self.range.map(|r| {
            let min = r.min.map(|i| &self.preds[i]);
            let max = r.max.map(|i| &self.preds[i]);
            FieldRange {
                pos: r.pos,
                start: min.map(|p| p.const_expr),
                start_inclusive: min.map_or(false, |p| p.op.is_inclusive()),
                end: max.map(|p| p.const_expr),
                end_inclusive: max.map_or(false, |p| p.op.is_inclusive()),
            }
        });

        let filters = self.filtering_preds();
        let filter = match filters.len() {
            0 => None,
            1 => Some(filters[0]),
            _ => Some(graph.add(ExprKind::FuncCall {
                func: FuncCode::OpAnd,
                args: filters,
            })),
        };

        let single_partition = self.is_complete_shard_key();
        let scan_node = graph
            .scan_mut(scan)
            .ok_or_else(|| Error::internal("query block does not scan a table"))?;
        scan_node.index = self.name().map(ToString::to_string);
        scan_node.eq_keys = eq_keys.clone();
        scan_node.range = range.clone();
        scan_node.filter = filter;
        scan_node.uses_covering_index = self.covering;
        scan_node.eliminate_dups = self.eliminate_dups;
        scan_node.single_partition = single_partition;

        // Link the scan's new children before the WHERE clause gives up
        // the conjuncts it shares with them.
        for key in eq_keys {
            graph.link(scan, key);
        }
        if let Some(range) = &range {
            for bound in range.start.iter().chain(range.end.iter()) {
                graph.link(scan, *bound);
            }
        }
        if let Some(filter) = filter {
            graph.link(scan, filter);
        }

        let consumed = self.consumed_conjuncts();
        let remaining: Vec<ExprId> = graph
            .where_conjuncts(self.sfw)
            .into_iter()
            .filter(|c| !consumed.contains(c))
            .collect();
        graph.set_where(self.sfw, remaining);

        self.drop_unused_vars(graph);
        debug!(
            table = self.table.name(),
            index = self.display_name(),
            covering = self.covering,
            dedup = self.eliminate_dups,
            single_partition,
            "applied index"
        );
        Ok(())
    }

    /// Removes FROM variables, other than the row variable, that are no
    /// longer referenced and either range over a single item or had all
    /// their references pushed to the index.
    fn drop_unused_vars(&self, graph: &mut ExprGraph) {
        let from = match graph.sfw(self.sfw) {
            Some(s) => s.from.clone(),
            None => return,
        };
        for (idx, clause) in from.iter().enumerate().skip(1).rev() {
            if !graph.parents(clause.var).is_empty() {
                continue;
            }
            let single = graph.expr_type(clause.domain).quant == Quantifier::One;
            if !(single || self.pushed_vars.contains(&clause.var)) {
                continue;
            }
            if let Some(s) = graph.sfw_mut(self.sfw) {
                s.from.remove(idx);
            }
            graph.unlink(self.sfw, clause.domain);
            if graph.parents(clause.domain).is_empty() {
                graph.destroy(clause.domain);
            }
            let name = graph.var(clause.var).map(|v| v.name.clone()).unwrap_or_default();
            graph.destroy(clause.var);
            debug!(var = %name, "dropped unused FROM variable");
        }
    }
}

/// Returns true if the expression does not depend on any row: it only
/// references literals and external variables.
/// Checks the operand types of every WHERE comparison between a path over
/// `row_var` and a row-independent expression.
///
/// In strict mode an incomparable pair is an error. Otherwise returns true
/// when such a pair exists, since the block then returns no rows.
pub(crate) fn check_comparisons(
    graph: &ExprGraph,
    sfw: ExprId,
    row_var: ExprId,
    strict: bool,
) -> Result<bool> {
    for conjunct in graph.where_conjuncts(sfw) {
        let ExprKind::FuncCall { func, args } = graph.kind(conjunct) else {
            continue;
        };
        if func.comparison().is_none() || args.len() != 2 {
            continue;
        }
        for (path_expr, const_expr) in [(args[0], args[1]), (args[1], args[0])] {
            if !is_row_independent(graph, const_expr)
                || extract_path(graph, path_expr, row_var).is_none()
            {
                continue;
            }
            let path_ty = graph.expr_type(path_expr).item;
            let const_ty = graph.expr_type(const_expr).item;
            if path_ty.is_comparable_with(&const_ty) {
                break;
            }
            if strict {
                return Err(Error::incomparable(path_ty.to_string(), const_ty.to_string())
                    .at(graph.location(conjunct)));
            }
            debug!(left = %path_ty, right = %const_ty, "comparison of incomparable types");
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn is_row_independent(graph: &ExprGraph, expr: ExprId) -> bool {
    !graph.any_in_subtree(expr, |_, kind| match kind {
        ExprKind::Var(var) => !matches!(var.kind, VarKind::External { .. }),
        ExprKind::Sfw(_) | ExprKind::BaseTable(_) | ExprKind::Receive(_) => true,
        _ => false,
    })
}
