//! Built-in function registry.
//!
//! The registry is a `static` table built at compile time. It is never
//! mutated, so it can be shared by concurrent compilations without
//! synchronization.

use core::fmt;

/// Identifies a built-in function or operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FuncCode {
    OpAnd,
    OpOr,
    OpNot,
    OpEq,
    OpNe,
    OpGt,
    OpGe,
    OpLt,
    OpLe,
    OpAnyEq,
    OpAnyNe,
    OpAnyGt,
    OpAnyGe,
    OpAnyLt,
    OpAnyLe,
    OpAdd,
    OpSub,
    OpMul,
    OpDiv,
    OpNegate,
    FnSize,
    FnExists,
    FnNotExists,
    FnIsNull,
    FnIsNotNull,
    FnConcat,
}

/// A comparison operator, independent of value vs. any semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompOp {
    /// Returns the operator obtained by swapping the operands.
    pub fn swap(self) -> CompOp {
        match self {
            CompOp::Gt => CompOp::Lt,
            CompOp::Ge => CompOp::Le,
            CompOp::Lt => CompOp::Gt,
            CompOp::Le => CompOp::Ge,
            op => op,
        }
    }

    /// Returns true for `>` and `>=`.
    #[inline]
    pub fn is_lower_bound(self) -> bool {
        matches!(self, CompOp::Gt | CompOp::Ge)
    }

    /// Returns true for `<` and `<=`.
    #[inline]
    pub fn is_upper_bound(self) -> bool {
        matches!(self, CompOp::Lt | CompOp::Le)
    }

    /// Returns true if the operator includes equality.
    #[inline]
    pub fn is_inclusive(self) -> bool {
        matches!(self, CompOp::Eq | CompOp::Ge | CompOp::Le)
    }

    /// Evaluates the operator given the ordering of `left` relative to `right`.
    pub fn holds(self, ord: core::cmp::Ordering) -> bool {
        use core::cmp::Ordering::*;
        match self {
            CompOp::Eq => ord == Equal,
            CompOp::Ne => ord != Equal,
            CompOp::Gt => ord == Greater,
            CompOp::Ge => ord != Less,
            CompOp::Lt => ord == Less,
            CompOp::Le => ord != Greater,
        }
    }
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompOp::Eq => "=",
            CompOp::Ne => "!=",
            CompOp::Gt => ">",
            CompOp::Ge => ">=",
            CompOp::Lt => "<",
            CompOp::Le => "<=",
        };
        write!(f, "{}", s)
    }
}

/// Static description of a built-in function.
#[derive(Debug)]
pub struct FunctionDef {
    pub code: FuncCode,
    pub name: &'static str,
    pub min_args: usize,
    /// `usize::MAX` for variadic functions.
    pub max_args: usize,
}

impl FunctionDef {
    /// Returns true if the function accepts `n` arguments.
    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min_args && n <= self.max_args
    }
}

const fn def(code: FuncCode, name: &'static str, min_args: usize, max_args: usize) -> FunctionDef {
    FunctionDef {
        code,
        name,
        min_args,
        max_args,
    }
}

static FUNCTIONS: [FunctionDef; 26] = [
    def(FuncCode::OpAnd, "and", 2, usize::MAX),
    def(FuncCode::OpOr, "or", 2, usize::MAX),
    def(FuncCode::OpNot, "not", 1, 1),
    def(FuncCode::OpEq, "=", 2, 2),
    def(FuncCode::OpNe, "!=", 2, 2),
    def(FuncCode::OpGt, ">", 2, 2),
    def(FuncCode::OpGe, ">=", 2, 2),
    def(FuncCode::OpLt, "<", 2, 2),
    def(FuncCode::OpLe, "<=", 2, 2),
    def(FuncCode::OpAnyEq, "=any", 2, 2),
    def(FuncCode::OpAnyNe, "!=any", 2, 2),
    def(FuncCode::OpAnyGt, ">any", 2, 2),
    def(FuncCode::OpAnyGe, ">=any", 2, 2),
    def(FuncCode::OpAnyLt, "<any", 2, 2),
    def(FuncCode::OpAnyLe, "<=any", 2, 2),
    def(FuncCode::OpAdd, "+", 2, usize::MAX),
    def(FuncCode::OpSub, "-", 2, 2),
    def(FuncCode::OpMul, "*", 2, usize::MAX),
    def(FuncCode::OpDiv, "/", 2, 2),
    def(FuncCode::OpNegate, "negate", 1, 1),
    def(FuncCode::FnSize, "size", 1, 1),
    def(FuncCode::FnExists, "exists", 1, 1),
    def(FuncCode::FnNotExists, "not_exists", 1, 1),
    def(FuncCode::FnIsNull, "is_null", 1, 1),
    def(FuncCode::FnIsNotNull, "is_not_null", 1, 1),
    def(FuncCode::FnConcat, "concat", 1, usize::MAX),
];

/// Returns every built-in function.
pub fn builtin_functions() -> &'static [FunctionDef] {
    &FUNCTIONS
}

/// Looks up a built-in function by name.
pub fn lookup(name: &str) -> Option<&'static FunctionDef> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

impl FuncCode {
    /// Returns the static definition of this function.
    pub fn def(self) -> &'static FunctionDef {
        // The table is indexed by discriminant.
        &FUNCTIONS[self as usize]
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.def().name
    }

    /// Returns the comparison operator and whether it has any-semantics.
    pub fn comparison(self) -> Option<(CompOp, bool)> {
        let res = match self {
            FuncCode::OpEq => (CompOp::Eq, false),
            FuncCode::OpNe => (CompOp::Ne, false),
            FuncCode::OpGt => (CompOp::Gt, false),
            FuncCode::OpGe => (CompOp::Ge, false),
            FuncCode::OpLt => (CompOp::Lt, false),
            FuncCode::OpLe => (CompOp::Le, false),
            FuncCode::OpAnyEq => (CompOp::Eq, true),
            FuncCode::OpAnyNe => (CompOp::Ne, true),
            FuncCode::OpAnyGt => (CompOp::Gt, true),
            FuncCode::OpAnyGe => (CompOp::Ge, true),
            FuncCode::OpAnyLt => (CompOp::Lt, true),
            FuncCode::OpAnyLe => (CompOp::Le, true),
            _ => return None,
        };
        Some(res)
    }

    /// Builds the code of a comparison operator.
    pub fn from_comparison(op: CompOp, any: bool) -> FuncCode {
        match (op, any) {
            (CompOp::Eq, false) => FuncCode::OpEq,
            (CompOp::Ne, false) => FuncCode::OpNe,
            (CompOp::Gt, false) => FuncCode::OpGt,
            (CompOp::Ge, false) => FuncCode::OpGe,
            (CompOp::Lt, false) => FuncCode::OpLt,
            (CompOp::Le, false) => FuncCode::OpLe,
            (CompOp::Eq, true) => FuncCode::OpAnyEq,
            (CompOp::Ne, true) => FuncCode::OpAnyNe,
            (CompOp::Gt, true) => FuncCode::OpAnyGt,
            (CompOp::Ge, true) => FuncCode::OpAnyGe,
            (CompOp::Lt, true) => FuncCode::OpAnyLt,
            (CompOp::Le, true) => FuncCode::OpAnyLe,
        }
    }

    #[inline]
    pub fn is_comparison(self) -> bool {
        self.comparison().is_some()
    }

    /// Returns true for functions producing a boolean.
    pub fn is_boolean(self) -> bool {
        self.is_comparison()
            || matches!(
                self,
                FuncCode::OpAnd
                    | FuncCode::OpOr
                    | FuncCode::OpNot
                    | FuncCode::FnExists
                    | FuncCode::FnNotExists
                    | FuncCode::FnIsNull
                    | FuncCode::FnIsNotNull
            )
    }

    #[inline]
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            FuncCode::OpAdd | FuncCode::OpSub | FuncCode::OpMul | FuncCode::OpDiv | FuncCode::OpNegate
        )
    }
}

impl fmt::Display for FuncCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_indexed_by_code() {
        for (i, f) in builtin_functions().iter().enumerate() {
            assert_eq!(f.code as usize, i, "{} out of place", f.name);
            assert_eq!(f.code.def().name, f.name);
        }
    }

    #[test]
    fn test_lookup() {
        let size = lookup("size").unwrap();
        assert_eq!(size.code, FuncCode::FnSize);
        assert!(size.accepts(1));
        assert!(!size.accepts(2));
        assert!(lookup("and").unwrap().accepts(5));
        assert!(lookup("no_such_fn").is_none());
    }

    #[test]
    fn test_comparison_codes() {
        assert_eq!(FuncCode::OpAnyGe.comparison(), Some((CompOp::Ge, true)));
        assert_eq!(FuncCode::from_comparison(CompOp::Lt, false), FuncCode::OpLt);
        assert!(FuncCode::OpAdd.comparison().is_none());
        assert!(FuncCode::FnIsNull.is_boolean());
        assert!(!FuncCode::OpAdd.is_boolean());
    }

    #[test]
    fn test_comp_op_algebra() {
        use core::cmp::Ordering;
        assert_eq!(CompOp::Gt.swap(), CompOp::Lt);
        assert_eq!(CompOp::Eq.swap(), CompOp::Eq);
        assert!(CompOp::Ge.holds(Ordering::Equal));
        assert!(!CompOp::Gt.holds(Ordering::Equal));
        assert!(CompOp::Le.is_upper_bound());
        assert!(CompOp::Gt.is_lower_bound());
    }
}
