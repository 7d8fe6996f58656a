//! Expression node kinds.

use crate::functions::FuncCode;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use shardql_core::{ExprType, ItemType, Value};

/// Handle of a node in an `ExprGraph`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a variable.
#[derive(Clone, Debug, PartialEq)]
pub enum VarKind {
    /// Bound by a FROM clause; ranges over the items of its domain.
    TableRow,
    /// The input item of a path step (`$`).
    CtxItem,
    /// The current element of an array filter (`$element`).
    CtxElement,
    /// The current key of a map filter (`$key`).
    CtxKey,
    /// The position of the current element (`$pos`).
    CtxElementPos,
    /// A variable bound by the caller at execution time.
    External { id: usize, declared: ExprType },
}

impl VarKind {
    #[inline]
    pub fn is_context(&self) -> bool {
        matches!(
            self,
            VarKind::CtxItem | VarKind::CtxElement | VarKind::CtxKey | VarKind::CtxElementPos
        )
    }
}

/// A variable reference. Every reference to the variable is a parent of
/// this node.
#[derive(Clone, Debug)]
pub struct VarExpr {
    pub name: String,
    pub kind: VarKind,
    /// The node that declares this variable: the query block for FROM
    /// variables, the path step for context variables.
    pub decl: Option<ExprId>,
}

/// One FROM-clause entry: a domain expression and the variable bound to it.
#[derive(Clone, Debug)]
pub struct FromClause {
    pub domain: ExprId,
    pub var: ExprId,
}

/// A named select-list entry.
#[derive(Clone, Debug)]
pub struct SelectField {
    pub name: String,
    pub expr: ExprId,
}

/// Sort direction and null placement of one order-by key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub desc: bool,
    pub nulls_first: bool,
}

impl SortSpec {
    /// Ascending, nulls last.
    pub fn asc() -> Self {
        Self {
            desc: false,
            nulls_first: false,
        }
    }

    /// Descending, nulls first.
    pub fn desc() -> Self {
        Self {
            desc: true,
            nulls_first: true,
        }
    }

    /// Returns true if nulls are placed where an index scan in this
    /// direction puts them.
    pub fn has_natural_nulls(&self) -> bool {
        self.desc == self.nulls_first
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} NULLS {}",
            if self.desc { "DESC" } else { "ASC" },
            if self.nulls_first { "FIRST" } else { "LAST" }
        )
    }
}

/// An order-by key.
#[derive(Clone, Debug)]
pub struct SortKey {
    pub expr: ExprId,
    pub spec: SortSpec,
}

/// A select-from-where query block.
#[derive(Clone, Debug, Default)]
pub struct SfwExpr {
    pub from: Vec<FromClause>,
    pub where_expr: Option<ExprId>,
    pub select: Vec<SelectField>,
    /// `SELECT *`: the block returns the FROM variable's items unchanged.
    pub select_star: bool,
    pub sort: Vec<SortKey>,
    /// Set when the chosen index delivers the requested order.
    pub sort_by_index: bool,
    pub offset: Option<ExprId>,
    pub limit: Option<ExprId>,
}

impl SfwExpr {
    /// Returns the domain of the first FROM clause.
    pub fn first_domain(&self) -> Option<ExprId> {
        self.from.first().map(|f| f.domain)
    }

    /// Returns the variable of the first FROM clause.
    pub fn first_var(&self) -> Option<ExprId> {
        self.from.first().map(|f| f.var)
    }

    #[inline]
    pub fn has_sort(&self) -> bool {
        !self.sort.is_empty()
    }
}

/// Which index a hint names.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HintTarget {
    Primary,
    Index(String),
}

impl HintTarget {
    /// Returns the index name, `None` for the primary index.
    pub fn index_name(&self) -> Option<&str> {
        match self {
            HintTarget::Primary => None,
            HintTarget::Index(name) => Some(name),
        }
    }
}

impl fmt::Display for HintTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HintTarget::Primary => write!(f, "primary"),
            HintTarget::Index(name) => write!(f, "{}", name),
        }
    }
}

/// An index hint attached to a table scan.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexHint {
    Prefer(HintTarget),
    Force(HintTarget),
}

impl IndexHint {
    pub fn target(&self) -> &HintTarget {
        match self {
            IndexHint::Prefer(t) | IndexHint::Force(t) => t,
        }
    }

    #[inline]
    pub fn is_force(&self) -> bool {
        matches!(self, IndexHint::Force(_))
    }
}

impl fmt::Display for IndexHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexHint::Prefer(HintTarget::Primary) => write!(f, "PREFER_PRIMARY_INDEX"),
            IndexHint::Prefer(t) => write!(f, "PREFER_INDEXES({})", t),
            IndexHint::Force(HintTarget::Primary) => write!(f, "FORCE_PRIMARY_INDEX"),
            IndexHint::Force(t) => write!(f, "FORCE_INDEX({})", t),
        }
    }
}

/// A key range on one index field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRange {
    /// Index field position the range applies to.
    pub pos: usize,
    pub start: Option<ExprId>,
    pub start_inclusive: bool,
    pub end: Option<ExprId>,
    pub end_inclusive: bool,
}

/// A scan over a table, through its primary index or a secondary index.
#[derive(Clone, Debug)]
pub struct TableScan {
    pub table: String,
    /// Secondary index used by the scan; `None` scans the primary index.
    pub index: Option<String>,
    /// Equality keys, one per leading index field.
    pub eq_keys: Vec<ExprId>,
    pub range: Option<FieldRange>,
    /// Predicate evaluated on index entries before rows are fetched.
    pub filter: Option<ExprId>,
    pub uses_covering_index: bool,
    pub eliminate_dups: bool,
    /// Scan the index backwards.
    pub reverse: bool,
    /// The primary-key equalities cover the shard key.
    pub single_partition: bool,
    pub hints: Vec<IndexHint>,
    pub row_type: ItemType,
}

impl TableScan {
    /// Creates a full scan of the primary index.
    pub fn new(table: impl Into<String>, row_type: ItemType) -> Self {
        Self {
            table: table.into(),
            index: None,
            eq_keys: Vec::new(),
            range: None,
            filter: None,
            uses_covering_index: false,
            eliminate_dups: false,
            reverse: false,
            single_partition: false,
            hints: Vec::new(),
            row_type,
        }
    }

    #[inline]
    pub fn is_primary(&self) -> bool {
        self.index.is_none()
    }
}

/// How rows reach the receive boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DistributionKind {
    /// All rows come from one partition.
    SinglePartition,
    /// Every partition is scanned through the primary index.
    AllPartitions,
    /// Every shard is scanned through a secondary index.
    AllShards,
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DistributionKind::SinglePartition => "SINGLE_PARTITION",
            DistributionKind::AllPartitions => "ALL_PARTITIONS",
            DistributionKind::AllShards => "ALL_SHARDS",
        };
        write!(f, "{}", s)
    }
}

/// The boundary between server-side and client-side evaluation.
#[derive(Clone, Debug)]
pub struct ReceiveExpr {
    pub input: ExprId,
    pub distribution: DistributionKind,
    /// Positions of the sort columns in the input records.
    pub sort_positions: Vec<usize>,
    pub sort_specs: Vec<SortSpec>,
    /// Positions of the primary-key columns, when duplicates must be removed.
    pub pk_positions: Vec<usize>,
}

impl ReceiveExpr {
    pub fn new(input: ExprId, distribution: DistributionKind) -> Self {
        Self {
            input,
            distribution,
            sort_positions: Vec::new(),
            sort_specs: Vec::new(),
            pk_positions: Vec::new(),
        }
    }
}

/// Kind of a map filter step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapFilterKind {
    Keys,
    Values,
}

/// An expression node.
#[derive(Clone, Debug)]
pub enum ExprKind {
    Sfw(SfwExpr),
    BaseTable(TableScan),
    Var(VarExpr),
    /// `input.name`
    FieldStep { input: ExprId, name: String },
    /// `input[low:high]`
    ArraySlice {
        input: ExprId,
        low: Option<ExprId>,
        high: Option<ExprId>,
        ctx_vars: Vec<ExprId>,
    },
    /// `input[pred]`; without a predicate, all elements (`input[]`).
    ArrayFilter {
        input: ExprId,
        pred: Option<ExprId>,
        ctx_vars: Vec<ExprId>,
    },
    /// `input.keys(pred)` / `input.values(pred)`
    MapFilter {
        input: ExprId,
        kind: MapFilterKind,
        pred: Option<ExprId>,
        ctx_vars: Vec<ExprId>,
    },
    FuncCall { func: FuncCode, args: Vec<ExprId> },
    /// A literal; `Value::Empty` is the empty sequence.
    Const(Value),
    Case {
        when_then: Vec<(ExprId, ExprId)>,
        else_expr: Option<ExprId>,
    },
    Cast { input: ExprId, target: ExprType },
    IsOfType {
        input: ExprId,
        targets: Vec<ExprType>,
        negated: bool,
    },
    Promote { input: ExprId, target: ExprType },
    Receive(ReceiveExpr),
    ArrayConstr { args: Vec<ExprId>, conditional: bool },
    /// Arguments alternate key, value.
    MapConstr { args: Vec<ExprId> },
}

impl ExprKind {
    /// Returns the child slots of this node, in evaluation order. A child
    /// referenced from two slots appears twice.
    pub fn children(&self) -> Vec<ExprId> {
        let mut out = Vec::new();
        match self {
            ExprKind::Sfw(sfw) => {
                out.extend(sfw.from.iter().map(|f| f.domain));
                out.extend(sfw.where_expr);
                out.extend(sfw.select.iter().map(|f| f.expr));
                out.extend(sfw.sort.iter().map(|k| k.expr));
                out.extend(sfw.offset);
                out.extend(sfw.limit);
            }
            ExprKind::BaseTable(scan) => {
                out.extend(scan.eq_keys.iter().copied());
                if let Some(range) = &scan.range {
                    out.extend(range.start);
                    out.extend(range.end);
                }
                out.extend(scan.filter);
            }
            ExprKind::Var(_) | ExprKind::Const(_) => {}
            ExprKind::FieldStep { input, .. }
            | ExprKind::Cast { input, .. }
            | ExprKind::IsOfType { input, .. }
            | ExprKind::Promote { input, .. } => out.push(*input),
            ExprKind::ArraySlice {
                input, low, high, ..
            } => {
                out.push(*input);
                out.extend(*low);
                out.extend(*high);
            }
            ExprKind::ArrayFilter { input, pred, .. } | ExprKind::MapFilter { input, pred, .. } => {
                out.push(*input);
                out.extend(*pred);
            }
            ExprKind::FuncCall { args, .. }
            | ExprKind::ArrayConstr { args, .. }
            | ExprKind::MapConstr { args } => out.extend(args.iter().copied()),
            ExprKind::Case {
                when_then,
                else_expr,
            } => {
                for (w, t) in when_then {
                    out.push(*w);
                    out.push(*t);
                }
                out.extend(*else_expr);
            }
            ExprKind::Receive(recv) => out.push(recv.input),
        }
        out
    }

    /// Calls `f` on every child slot.
    pub fn for_each_child_mut(&mut self, mut f: impl FnMut(&mut ExprId)) {
        match self {
            ExprKind::Sfw(sfw) => {
                sfw.from.iter_mut().for_each(|c| f(&mut c.domain));
                sfw.where_expr.iter_mut().for_each(&mut f);
                sfw.select.iter_mut().for_each(|c| f(&mut c.expr));
                sfw.sort.iter_mut().for_each(|k| f(&mut k.expr));
                sfw.offset.iter_mut().for_each(&mut f);
                sfw.limit.iter_mut().for_each(&mut f);
            }
            ExprKind::BaseTable(scan) => {
                scan.eq_keys.iter_mut().for_each(&mut f);
                if let Some(range) = &mut scan.range {
                    range.start.iter_mut().for_each(&mut f);
                    range.end.iter_mut().for_each(&mut f);
                }
                scan.filter.iter_mut().for_each(&mut f);
            }
            ExprKind::Var(_) | ExprKind::Const(_) => {}
            ExprKind::FieldStep { input, .. }
            | ExprKind::Cast { input, .. }
            | ExprKind::IsOfType { input, .. }
            | ExprKind::Promote { input, .. } => f(input),
            ExprKind::ArraySlice {
                input, low, high, ..
            } => {
                f(input);
                low.iter_mut().for_each(&mut f);
                high.iter_mut().for_each(&mut f);
            }
            ExprKind::ArrayFilter { input, pred, .. } | ExprKind::MapFilter { input, pred, .. } => {
                f(input);
                pred.iter_mut().for_each(&mut f);
            }
            ExprKind::FuncCall { args, .. }
            | ExprKind::ArrayConstr { args, .. }
            | ExprKind::MapConstr { args } => args.iter_mut().for_each(&mut f),
            ExprKind::Case {
                when_then,
                else_expr,
            } => {
                for (w, t) in when_then.iter_mut() {
                    f(w);
                    f(t);
                }
                else_expr.iter_mut().for_each(&mut f);
            }
            ExprKind::Receive(recv) => f(&mut recv.input),
        }
    }

    /// Returns the context variables declared by a path step.
    pub fn ctx_vars(&self) -> &[ExprId] {
        match self {
            ExprKind::ArraySlice { ctx_vars, .. }
            | ExprKind::ArrayFilter { ctx_vars, .. }
            | ExprKind::MapFilter { ctx_vars, .. } => ctx_vars,
            _ => &[],
        }
    }

    /// Short name of the node kind, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Sfw(_) => "SFW",
            ExprKind::BaseTable(_) => "BASE_TABLE",
            ExprKind::Var(_) => "VAR",
            ExprKind::FieldStep { .. } => "FIELD_STEP",
            ExprKind::ArraySlice { .. } => "ARRAY_SLICE",
            ExprKind::ArrayFilter { .. } => "ARRAY_FILTER",
            ExprKind::MapFilter { .. } => "MAP_FILTER",
            ExprKind::FuncCall { .. } => "FUNC_CALL",
            ExprKind::Const(_) => "CONST",
            ExprKind::Case { .. } => "CASE",
            ExprKind::Cast { .. } => "CAST",
            ExprKind::IsOfType { .. } => "IS_OF_TYPE",
            ExprKind::Promote { .. } => "PROMOTE",
            ExprKind::Receive(_) => "RECEIVE",
            ExprKind::ArrayConstr { .. } => "ARRAY_CONSTR",
            ExprKind::MapConstr { .. } => "MAP_CONSTR",
        }
    }
}
