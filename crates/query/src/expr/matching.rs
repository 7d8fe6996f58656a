//! Structural equality of expressions.

use super::graph::ExprGraph;
use super::node::{ExprId, ExprKind, VarKind};
use alloc::vec::Vec;

impl ExprGraph {
    /// Returns true if two expressions are structurally equal.
    ///
    /// Query blocks and table scans only match themselves. Map
    /// constructors compare their entries as an unordered multiset.
    pub fn match_exprs(&self, a: ExprId, b: ExprId) -> bool {
        if a == b {
            return true;
        }
        match (self.kind(a), self.kind(b)) {
            (ExprKind::Var(va), ExprKind::Var(vb)) => {
                // Context variables are only reachable below the steps
                // that declare them, and those steps are compared too.
                va.kind.is_context() && va.kind == vb.kind
                    || matches!(
                        (&va.kind, &vb.kind),
                        (VarKind::External { id: x, .. }, VarKind::External { id: y, .. }) if x == y
                    )
            }
            (ExprKind::Const(x), ExprKind::Const(y)) => {
                x == y && x.item_type() == y.item_type()
            }
            (
                ExprKind::FieldStep { input: ia, name: na },
                ExprKind::FieldStep { input: ib, name: nb },
            ) => na == nb && self.match_exprs(*ia, *ib),
            (
                ExprKind::ArraySlice {
                    input: ia,
                    low: la,
                    high: ha,
                    ..
                },
                ExprKind::ArraySlice {
                    input: ib,
                    low: lb,
                    high: hb,
                    ..
                },
            ) => {
                self.match_exprs(*ia, *ib)
                    && self.match_opt(*la, *lb)
                    && self.match_opt(*ha, *hb)
            }
            (
                ExprKind::ArrayFilter {
                    input: ia, pred: pa, ..
                },
                ExprKind::ArrayFilter {
                    input: ib, pred: pb, ..
                },
            ) => self.match_exprs(*ia, *ib) && self.match_opt(*pa, *pb),
            (
                ExprKind::MapFilter {
                    input: ia,
                    kind: ka,
                    pred: pa,
                    ..
                },
                ExprKind::MapFilter {
                    input: ib,
                    kind: kb,
                    pred: pb,
                    ..
                },
            ) => ka == kb && self.match_exprs(*ia, *ib) && self.match_opt(*pa, *pb),
            (
                ExprKind::FuncCall { func: fa, args: aa },
                ExprKind::FuncCall { func: fb, args: ab },
            ) => fa == fb && self.match_all(aa, ab),
            (
                ExprKind::Case {
                    when_then: wa,
                    else_expr: ea,
                },
                ExprKind::Case {
                    when_then: wb,
                    else_expr: eb,
                },
            ) => {
                wa.len() == wb.len()
                    && wa
                        .iter()
                        .zip(wb.iter())
                        .all(|(x, y)| self.match_exprs(x.0, y.0) && self.match_exprs(x.1, y.1))
                    && self.match_opt(*ea, *eb)
            }
            (
                ExprKind::Cast {
                    input: ia,
                    target: ta,
                },
                ExprKind::Cast {
                    input: ib,
                    target: tb,
                },
            )
            | (
                ExprKind::Promote {
                    input: ia,
                    target: ta,
                },
                ExprKind::Promote {
                    input: ib,
                    target: tb,
                },
            ) => ta == tb && self.match_exprs(*ia, *ib),
            (
                ExprKind::IsOfType {
                    input: ia,
                    targets: ta,
                    negated: na,
                },
                ExprKind::IsOfType {
                    input: ib,
                    targets: tb,
                    negated: nb,
                },
            ) => na == nb && ta == tb && self.match_exprs(*ia, *ib),
            (ExprKind::Receive(ra), ExprKind::Receive(rb)) => {
                ra.distribution == rb.distribution && self.match_exprs(ra.input, rb.input)
            }
            (
                ExprKind::ArrayConstr {
                    args: aa,
                    conditional: ca,
                },
                ExprKind::ArrayConstr {
                    args: ab,
                    conditional: cb,
                },
            ) => ca == cb && self.match_all(aa, ab),
            (ExprKind::MapConstr { args: aa }, ExprKind::MapConstr { args: ab }) => {
                self.match_map_entries(aa, ab)
            }
            _ => false,
        }
    }

    fn match_opt(&self, a: Option<ExprId>, b: Option<ExprId>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(x), Some(y)) => self.match_exprs(x, y),
            _ => false,
        }
    }

    fn match_all(&self, a: &[ExprId], b: &[ExprId]) -> bool {
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| self.match_exprs(*x, *y))
    }

    /// Matches key/value pairs regardless of their order; every pair of `a`
    /// must consume a distinct matching pair of `b`.
    fn match_map_entries(&self, a: &[ExprId], b: &[ExprId]) -> bool {
        if a.len() != b.len() || a.len() % 2 != 0 {
            return false;
        }
        let mut used: Vec<bool> = alloc::vec![false; b.len() / 2];
        for pair in a.chunks(2) {
            let found = b.chunks(2).enumerate().position(|(i, other)| {
                !used[i]
                    && self.match_exprs(pair[0], other[0])
                    && self.match_exprs(pair[1], other[1])
            });
            match found {
                Some(i) => used[i] = true,
                None => return false,
            }
        }
        true
    }
}
