//! Index-relevant predicates and the resolution of conflicts between
//! predicates on the same index field.

use crate::expr::ExprId;
use crate::functions::CompOp;
use alloc::string::String;
use core::cmp::Ordering;
use shardql_core::Value;

/// What the analyzer decided to do with a predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PredStatus {
    /// Candidate for pushing into the index scan.
    Keep,
    /// Implied by another predicate; can be removed from the WHERE clause.
    AlwaysTrue,
    /// Contradicts another predicate; the query block selects nothing.
    AlwaysFalse,
    /// Not pushed; stays in the WHERE clause.
    Skip,
}

/// A comparison between an index field and an expression that does not
/// depend on the row.
#[derive(Clone, Debug)]
pub(crate) struct PredInfo {
    /// The WHERE conjunct.
    pub pred: ExprId,
    /// The operand that does not depend on the row.
    pub const_expr: ExprId,
    /// Value of `const_expr` when it is a literal.
    pub value: Option<Value>,
    /// Operator with the path on the left.
    pub op: CompOp,
    /// Sequence (any) comparison.
    pub any: bool,
    /// Index field position.
    pub ipos: usize,
    /// Map key selected through a map-both index.
    pub map_key: Option<String>,
    /// The path only partially matches the index field.
    pub partial: bool,
    /// Unnesting variable the path navigates from.
    pub unnest_var: Option<ExprId>,
    pub status: PredStatus,
}

impl PredInfo {
    #[inline]
    pub fn is_keep(&self) -> bool {
        self.status == PredStatus::Keep
    }

    #[inline]
    pub fn is_eq(&self) -> bool {
        self.op == CompOp::Eq
    }

    #[inline]
    pub fn is_lower(&self) -> bool {
        self.op.is_lower_bound()
    }

    #[inline]
    pub fn is_upper(&self) -> bool {
        self.op.is_upper_bound()
    }

    /// Returns true if the predicate can only be used to filter index
    /// entries, never as a key bound.
    ///
    /// A partial match can still bound the scan: the entries it selects
    /// are a superset of the matching rows, and the conjunct stays in the
    /// WHERE clause.
    #[inline]
    pub fn is_filter_only(&self) -> bool {
        self.op == CompOp::Ne
    }
}

/// Outcome of resolving two predicates on the same index field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Both remain candidates.
    Both,
    /// The first predicate gets the given status.
    First(PredStatus),
    /// The second predicate gets the given status.
    Second(PredStatus),
    /// The first predicate becomes an equality; the second is implied.
    CollapseFirst,
    /// The second predicate becomes an equality; the first is implied.
    CollapseSecond,
    /// The predicates contradict each other.
    AlwaysFalse,
}

/// Resolves two predicates on the same index field.
///
/// With `independent`, the predicates may be satisfied by different
/// entries of a multi-key field and cannot constrain the same entry.
pub(crate) fn resolve_pair(a: &PredInfo, b: &PredInfo, independent: bool) -> Resolution {
    let values = match (&a.value, &b.value) {
        (Some(x), Some(y)) => Some((x, y)),
        _ => None,
    };

    if independent {
        if let Some((x, y)) = values {
            if a.op == b.op && x == y {
                return Resolution::Second(PredStatus::AlwaysTrue);
            }
        }
        return prefer_eq(a, b).unwrap_or(Resolution::Second(PredStatus::Skip));
    }

    let Some((x, y)) = values else {
        if let Some(res) = prefer_eq(a, b) {
            return res;
        }
        if a.is_eq() || a.is_lower() == b.is_lower() {
            return Resolution::Second(PredStatus::Skip);
        }
        return Resolution::Both;
    };

    let Some(ord) = x.compare_atomic(y) else {
        return Resolution::AlwaysFalse;
    };
    match (a.op, b.op) {
        (CompOp::Eq, CompOp::Eq) => {
            if ord == Ordering::Equal {
                Resolution::Second(PredStatus::AlwaysTrue)
            } else {
                Resolution::AlwaysFalse
            }
        }
        // The field equals x; b holds iff x <op> y.
        (CompOp::Eq, op) => implied_or_false(op.holds(ord), Resolution::Second(PredStatus::AlwaysTrue)),
        (op, CompOp::Eq) => implied_or_false(
            op.holds(ord.reverse()),
            Resolution::First(PredStatus::AlwaysTrue),
        ),
        (p, q) if p.is_lower_bound() && q.is_lower_bound() => {
            // The larger bound wins; on a tie the exclusive one.
            let a_stricter = ord == Ordering::Greater || ord == Ordering::Equal && p == CompOp::Gt;
            if a_stricter {
                Resolution::Second(PredStatus::AlwaysTrue)
            } else {
                Resolution::First(PredStatus::AlwaysTrue)
            }
        }
        (p, q) if p.is_upper_bound() && q.is_upper_bound() => {
            let a_stricter = ord == Ordering::Less || ord == Ordering::Equal && p == CompOp::Lt;
            if a_stricter {
                Resolution::Second(PredStatus::AlwaysTrue)
            } else {
                Resolution::First(PredStatus::AlwaysTrue)
            }
        }
        (p, q) if p.is_lower_bound() => match ord {
            // a: field > x, b: field < y
            Ordering::Less => Resolution::Both,
            Ordering::Greater => Resolution::AlwaysFalse,
            Ordering::Equal if p.is_inclusive() && q.is_inclusive() => Resolution::CollapseFirst,
            Ordering::Equal => Resolution::AlwaysFalse,
        },
        (p, q) => match ord {
            // a: field < x, b: field > y
            Ordering::Greater => Resolution::Both,
            Ordering::Less => Resolution::AlwaysFalse,
            Ordering::Equal if p.is_inclusive() && q.is_inclusive() => Resolution::CollapseSecond,
            Ordering::Equal => Resolution::AlwaysFalse,
        },
    }
}

fn prefer_eq(a: &PredInfo, b: &PredInfo) -> Option<Resolution> {
    match (a.is_eq(), b.is_eq()) {
        (true, false) => Some(Resolution::Second(PredStatus::Skip)),
        (false, true) => Some(Resolution::First(PredStatus::Skip)),
        _ => None,
    }
}

#[inline]
fn implied_or_false(holds: bool, implied: Resolution) -> Resolution {
    if holds {
        implied
    } else {
        Resolution::AlwaysFalse
    }
}
