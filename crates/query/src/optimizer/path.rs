//! Query paths and their correspondence to index paths.
//!
//! A query path is the chain of navigation steps between a row variable
//! and the expression a predicate compares. It is matched against the
//! paths of an index to decide whether the predicate constrains an index
//! field.

use crate::expr::{ExprGraph, ExprId, ExprKind, MapFilterKind, VarKind};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use shardql_core::schema::{IndexPath, PathStep};
use shardql_core::ItemType;

/// One navigation step of a query path.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum QueryStep {
    Field(String),
    /// Array elements; `restricted` when a predicate or slice bounds
    /// select only some of them.
    Elements { restricted: bool },
    Keys { restricted: bool },
    Values { restricted: bool },
}

#[derive(Clone, Debug)]
pub(crate) struct StepInfo {
    pub step: QueryStep,
    /// Item type of the step's input.
    pub input: ItemType,
}

/// A path rooted at the row variable of a query block.
#[derive(Clone, Debug)]
pub(crate) struct QueryPath {
    pub steps: Vec<StepInfo>,
    /// Item type the whole path selects.
    pub result: ItemType,
    /// The FROM variable, other than the row variable, the path goes
    /// through, when it navigates from an unnested array.
    pub unnest_var: Option<ExprId>,
}

impl fmt::Display for QueryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for s in &self.steps {
            match &s.step {
                QueryStep::Field(name) => write!(f, ".{}", name)?,
                QueryStep::Elements { restricted: false } => write!(f, "[]")?,
                QueryStep::Elements { restricted: true } => write!(f, "[..]")?,
                QueryStep::Keys { .. } => write!(f, ".keys()")?,
                QueryStep::Values { .. } => write!(f, ".values()")?,
            }
        }
        Ok(())
    }
}

/// Result of matching a query path against an index path.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PathMatch {
    /// A restricted step matched an unrestricted index step: the index
    /// field holds a superset of the values the query path selects.
    pub partial: bool,
    /// Map key the query path selects where the index has a values step.
    pub map_key: Option<String>,
}

impl PathMatch {
    #[inline]
    pub fn is_exact(&self) -> bool {
        !self.partial && self.map_key.is_none()
    }
}

/// Extracts the path from `row_var` to `expr`. FROM variables of the same
/// query block that range over a path of `row_var` are followed through
/// their domains.
pub(crate) fn extract_path(graph: &ExprGraph, expr: ExprId, row_var: ExprId) -> Option<QueryPath> {
    let block = graph.var(row_var)?.decl;
    let result = graph.expr_type(expr).item;
    let mut steps = Vec::new();
    let mut unnest_var = None;
    let mut cur = expr;
    loop {
        let (step, input) = match graph.kind(cur) {
            ExprKind::FieldStep { input, name } => (QueryStep::Field(name.clone()), *input),
            ExprKind::ArrayFilter { input, pred, .. } => {
                let restricted = pred.is_some();
                if graph.expr_type(*input).item.is_map() {
                    (QueryStep::Values { restricted }, *input)
                } else {
                    (QueryStep::Elements { restricted }, *input)
                }
            }
            ExprKind::ArraySlice {
                input, low, high, ..
            } => (
                QueryStep::Elements {
                    restricted: low.is_some() || high.is_some(),
                },
                *input,
            ),
            ExprKind::MapFilter {
                input, kind, pred, ..
            } => {
                let restricted = pred.is_some();
                match kind {
                    MapFilterKind::Keys => (QueryStep::Keys { restricted }, *input),
                    MapFilterKind::Values => (QueryStep::Values { restricted }, *input),
                }
            }
            ExprKind::Var(_) if cur == row_var => break,
            ExprKind::Var(var)
                if var.kind == VarKind::TableRow && var.decl == block && unnest_var.is_none() =>
            {
                unnest_var = Some(cur);
                cur = graph.var_domain(cur)?;
                continue;
            }
            _ => return None,
        };
        steps.push(StepInfo {
            step,
            input: graph.expr_type(input).item,
        });
        cur = input;
    }
    steps.reverse();
    Some(QueryPath {
        steps,
        result,
        unnest_var,
    })
}

/// Matches a query path against an index path.
///
/// The following relaxations apply:
/// - an index `[]` step with no counterpart in the query is implied when
///   the query navigates an array at that point;
/// - a restricted query step matches the corresponding unrestricted index
///   step, making the match partial;
/// - with `allow_map_key`, a field step over a map matches an index values
///   step and records the field name as the map key.
pub(crate) fn match_index_path(
    query: &QueryPath,
    index: &IndexPath,
    allow_map_key: bool,
) -> Option<PathMatch> {
    let isteps = index.steps();
    let mut result = PathMatch {
        partial: false,
        map_key: None,
    };
    let mut i = 0;
    let mut j = 0;
    let mut tail = query.result.clone();
    while j < isteps.len() {
        let Some(q) = query.steps.get(i) else {
            // Trailing implicit elements over an array result.
            if isteps[j] == PathStep::Elements && tail.is_array() {
                tail = tail.element_type();
                j += 1;
                continue;
            }
            return None;
        };
        match (&isteps[j], &q.step) {
            (PathStep::Field(a), QueryStep::Field(b)) if a == b => {
                i += 1;
                j += 1;
            }
            (PathStep::Elements, QueryStep::Field(_)) if q.input.is_array() => {
                j += 1;
            }
            (PathStep::Elements, QueryStep::Elements { restricted })
            | (PathStep::Values, QueryStep::Values { restricted })
            | (PathStep::Keys, QueryStep::Keys { restricted }) => {
                result.partial |= *restricted;
                i += 1;
                j += 1;
            }
            (PathStep::Values, QueryStep::Field(key))
                if allow_map_key && q.input.is_map() && result.map_key.is_none() =>
            {
                result.map_key = Some(key.clone());
                i += 1;
                j += 1;
            }
            _ => return None,
        }
    }
    if i == query.steps.len() {
        Some(result)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Catalog;
    use crate::expr::SfwBuilder;
    use shardql_core::schema::TableBuilder;

    fn catalog() -> Catalog {
        let table = TableBuilder::new("t")
            .unwrap()
            .add_field("id", ItemType::Integer)
            .unwrap()
            .add_field("arr", ItemType::array(ItemType::Long))
            .unwrap()
            .add_field(
                "recs",
                ItemType::array(ItemType::Record(alloc::vec![("c".into(), ItemType::String)])),
            )
            .unwrap()
            .add_field("m", ItemType::map(ItemType::Long))
            .unwrap()
            .primary_key(&["id"])
            .unwrap()
            .build()
            .unwrap();
        Catalog::new().with_table(table)
    }

    fn parse(text: &str) -> IndexPath {
        IndexPath::parse(text).unwrap()
    }

    #[test]
    fn test_exact_and_implicit_matches() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b.from_table("t", "t").unwrap();
        let arr = b.column(t, "arr").unwrap();
        let recs = b.column(t, "recs").unwrap();
        let sfw = b.build().unwrap();
        g.set_root(sfw);
        let elems = g.elements(arr);
        let c = g.field(recs, "c");

        let q = extract_path(&g, elems, t).unwrap();
        let m = match_index_path(&q, &parse("arr[]"), false).unwrap();
        assert!(m.is_exact());

        // `t.arr` compared with =any still reaches the index elements.
        let q = extract_path(&g, arr, t).unwrap();
        assert!(match_index_path(&q, &parse("arr[]"), false).is_some());
        assert!(match_index_path(&q, &parse("arr"), false).is_some());

        // `t.recs.c` implies `recs[].c`.
        let q = extract_path(&g, c, t).unwrap();
        assert!(match_index_path(&q, &parse("recs[].c"), false).unwrap().is_exact());
        assert!(match_index_path(&q, &parse("recs[]"), false).is_none());
    }

    #[test]
    fn test_partial_and_map_key_matches() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b.from_table("t", "t").unwrap();
        let arr = b.column(t, "arr").unwrap();
        let m = b.column(t, "m").unwrap();
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        let one = g.constant(1);
        let sliced = g.slice(arr, Some(one), None);
        let q = extract_path(&g, sliced, t).unwrap();
        let res = match_index_path(&q, &parse("arr[]"), false).unwrap();
        assert!(res.partial);

        let mk = g.field(m, "k1");
        let q = extract_path(&g, mk, t).unwrap();
        let values = IndexPath::new(alloc::vec![PathStep::Field("m".into()), PathStep::Values]);
        assert!(match_index_path(&q, &values, false).is_none());
        let res = match_index_path(&q, &values, true).unwrap();
        assert_eq!(res.map_key.as_deref(), Some("k1"));

        let keys = g.map_keys(m);
        let q = extract_path(&g, keys, t).unwrap();
        assert!(match_index_path(&q, &parse("m.keys()"), false).unwrap().is_exact());
    }

    #[test]
    fn test_non_paths_are_rejected() {
        let catalog = catalog();
        let mut g = ExprGraph::new();
        let mut b = SfwBuilder::new(&mut g, &catalog);
        let t = b.from_table("t", "t").unwrap();
        let id = b.column(t, "id").unwrap();
        let sfw = b.build().unwrap();
        g.set_root(sfw);

        let one = g.constant(1);
        let sum = g.func(crate::functions::FuncCode::OpAdd, alloc::vec![id, one]);
        assert!(extract_path(&g, sum, t).is_none());
        assert!(extract_path(&g, one, t).is_none());
        let q = extract_path(&g, id, t).unwrap();
        assert_eq!(alloc::format!("{}", q), "$.id");
    }
}
