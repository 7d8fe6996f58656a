//! Query control block: drives a query through parsing, translation,
//! optimization and code generation, and holds the result.

use crate::codegen::{CodeGenerator, CompiledQuery, ExternalVarInfo, PlanStep};
use crate::context::{Catalog, CompileOptions};
use crate::expr::ExprGraph;
use crate::optimizer::{Optimizer, OptimizerPass};
use alloc::string::{String, ToString};
use core::fmt;
use shardql_core::{Error, ExprType, Result};
use tracing::{debug, warn};

/// Kind of a schema statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DdlOperation {
    CreateTable,
    DropTable,
    AlterTable,
    CreateIndex,
    DropIndex,
}

impl fmt::Display for DdlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DdlOperation::CreateTable => "CREATE TABLE",
            DdlOperation::DropTable => "DROP TABLE",
            DdlOperation::AlterTable => "ALTER TABLE",
            DdlOperation::CreateIndex => "CREATE INDEX",
            DdlOperation::DropIndex => "DROP INDEX",
        };
        write!(f, "{}", s)
    }
}

/// A schema statement, handed off to the caller for execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DdlStatement {
    pub operation: DdlOperation,
    /// Name of the table or index the statement applies to.
    pub target: String,
}

/// Output of the front end's translation step.
#[derive(Debug)]
pub enum Translation {
    Query(ExprGraph),
    Statement(DdlStatement),
}

/// Parser and translator of the query language.
pub trait QueryFrontend {
    type ParseTree;

    /// Parses query text.
    fn parse(&self, text: &str) -> Result<Self::ParseTree>;

    /// Translates a parse tree into an expression graph or a schema
    /// statement, resolving names against the catalog.
    fn translate(&self, tree: Self::ParseTree, catalog: &Catalog) -> Result<Translation>;
}

const QUERY_STAGES: [&str; 3] = ["index_selection", "distributor", "codegen"];

/// Compilation state of one query.
///
/// The stages run in a fixed order and each one is skipped once an earlier
/// stage has failed; the first error is kept. The graph is rewritten in
/// place, so after a failure it may be partially optimized.
pub struct QueryControlBlock<'a> {
    catalog: &'a Catalog,
    options: CompileOptions,
    graph: Option<ExprGraph>,
    compiled: Option<CompiledQuery>,
    ddl: Option<DdlStatement>,
    error: Option<Error>,
}

impl<'a> QueryControlBlock<'a> {
    pub fn new(catalog: &'a Catalog, options: CompileOptions) -> Self {
        Self {
            catalog,
            options,
            graph: None,
            compiled: None,
            ddl: None,
            error: None,
        }
    }

    /// Compiles query text. Returns true on success.
    pub fn compile<F: QueryFrontend>(&mut self, frontend: &F, text: &str) -> bool {
        self.reset();
        let translation = match frontend.parse(text) {
            Ok(tree) => match frontend.translate(tree, self.catalog) {
                Ok(translation) => Some(translation),
                Err(e) => self.fail("translate", e),
            },
            Err(e) => self.fail("parse", e),
        };
        match translation {
            Some(Translation::Statement(ddl)) => {
                debug!(operation = %ddl.operation, target = %ddl.target, "schema statement");
                self.ddl = Some(ddl);
                return true;
            }
            Some(Translation::Query(graph)) => self.graph = Some(graph),
            None => {}
        }
        self.run_query_stages();
        self.succeeded()
    }

    /// Compiles an already translated expression graph. Returns true on
    /// success.
    pub fn compile_graph(&mut self, graph: ExprGraph) -> bool {
        self.reset();
        self.graph = Some(graph);
        self.run_query_stages();
        self.succeeded()
    }

    fn reset(&mut self) {
        self.graph = None;
        self.compiled = None;
        self.ddl = None;
        self.error = None;
    }

    fn run_query_stages(&mut self) {
        let Some(mut graph) = self.graph.take() else {
            for stage in QUERY_STAGES {
                warn!(stage, "skipping stage after earlier failure");
            }
            return;
        };
        graph.infer_types();

        let options = self.options.clone();
        let optimizer = Optimizer::new(self.catalog, &options);
        for pass in optimizer.passes() {
            self.run_pass(pass, &mut graph);
        }

        if self.error.is_some() {
            warn!(stage = "codegen", "skipping stage after earlier failure");
        } else {
            match CodeGenerator::new(&graph).generate() {
                Ok(compiled) => self.compiled = Some(compiled),
                Err(e) => {
                    self.fail::<()>("codegen", e);
                }
            }
        }
        self.graph = Some(graph);
    }

    fn run_pass(&mut self, pass: &dyn OptimizerPass, graph: &mut ExprGraph) {
        if self.error.is_some() {
            warn!(stage = pass.name(), "skipping stage after earlier failure");
            return;
        }
        debug!(pass = pass.name(), "running optimizer pass");
        if let Err(e) = pass.apply(graph) {
            self.fail::<()>(pass.name(), e);
        }
    }

    fn fail<T>(&mut self, stage: &'static str, error: Error) -> Option<T> {
        debug!(stage, %error, "compilation failed");
        if self.error.is_none() {
            self.error = Some(error);
        }
        None
    }

    /// Returns true if the last compilation produced a plan or a schema
    /// statement.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && (self.compiled.is_some() || self.ddl.is_some())
    }

    /// The first error of the last compilation.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn compiled(&self) -> Option<&CompiledQuery> {
        self.compiled.as_ref()
    }

    pub fn into_compiled(self) -> Option<CompiledQuery> {
        self.compiled
    }

    pub fn plan(&self) -> Option<&PlanStep> {
        self.compiled.as_ref().map(|c| &c.root)
    }

    /// Textual dump of the plan.
    pub fn display_plan(&self) -> Option<String> {
        self.plan().map(|p| p.to_string())
    }

    /// The optimized expression graph.
    pub fn graph(&self) -> Option<&ExprGraph> {
        self.graph.as_ref()
    }

    pub fn result_type(&self) -> Option<&ExprType> {
        self.compiled.as_ref().map(|c| &c.result_type)
    }

    pub fn register_count(&self) -> usize {
        self.compiled.as_ref().map_or(0, |c| c.num_registers)
    }

    pub fn step_count(&self) -> usize {
        self.compiled.as_ref().map_or(0, |c| c.num_steps)
    }

    /// External variables the caller must bind before execution.
    pub fn external_vars(&self) -> &[ExternalVarInfo] {
        self.compiled
            .as_ref()
            .map_or(&[][..], |c| c.external_vars.as_slice())
    }

    pub fn ddl_statement(&self) -> Option<&DdlStatement> {
        self.ddl.as_ref()
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<DdlStatement>);

    impl QueryFrontend for Fixed {
        type ParseTree = ();

        fn parse(&self, text: &str) -> Result<()> {
            if text.is_empty() {
                Err(Error::unsupported("empty query"))
            } else {
                Ok(())
            }
        }

        fn translate(&self, _tree: (), _catalog: &Catalog) -> Result<Translation> {
            match &self.0 {
                Some(ddl) => Ok(Translation::Statement(ddl.clone())),
                None => {
                    let mut g = ExprGraph::new();
                    let c = g.constant(1);
                    g.set_root(c);
                    Ok(Translation::Query(g))
                }
            }
        }
    }

    #[test]
    fn test_ddl_hand_off() {
        let catalog = Catalog::new();
        let mut qcb = QueryControlBlock::new(&catalog, CompileOptions::default());
        let ddl = DdlStatement {
            operation: DdlOperation::DropTable,
            target: "t".into(),
        };
        assert!(qcb.compile(&Fixed(Some(ddl.clone())), "DROP TABLE t"));
        assert_eq!(qcb.ddl_statement(), Some(&ddl));
        assert!(qcb.plan().is_none());
    }

    #[test]
    fn test_parse_error_skips_later_stages() {
        let catalog = Catalog::new();
        let mut qcb = QueryControlBlock::new(&catalog, CompileOptions::default());
        assert!(!qcb.compile(&Fixed(None), ""));
        assert!(qcb.error().is_some());
        assert!(qcb.graph().is_none());
        assert_eq!(qcb.step_count(), 0);
    }

    #[test]
    fn test_constant_query() {
        let catalog = Catalog::new();
        let mut qcb = QueryControlBlock::new(&catalog, CompileOptions::default());
        assert!(qcb.compile(&Fixed(None), "SELECT 1"));
        assert_eq!(qcb.step_count(), 1);
        assert_eq!(qcb.register_count(), 1);
        assert_eq!(qcb.display_plan().as_deref(), Some("CONST 1 -> $0\n"));
    }

    #[test]
    fn test_recompile_resets_state() {
        let catalog = Catalog::new();
        let mut qcb = QueryControlBlock::new(&catalog, CompileOptions::default());
        assert!(!qcb.compile(&Fixed(None), ""));
        assert!(qcb.compile(&Fixed(None), "SELECT 1"));
        assert!(qcb.error().is_none());
    }

    #[test]
    fn test_stages_follow_optimizer_passes() {
        let catalog = Catalog::new();
        let options = CompileOptions::default();
        let optimizer = Optimizer::new(&catalog, &options);
        let names: alloc::vec::Vec<&str> = optimizer.passes().map(|p| p.name()).collect();
        assert_eq!(names.as_slice(), &QUERY_STAGES[..QUERY_STAGES.len() - 1]);
        assert_eq!(QUERY_STAGES.last(), Some(&"codegen"));
    }
}
