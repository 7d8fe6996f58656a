//! Code generation: register allocation and plan steps.

mod generator;
mod plan;
mod registers;

pub use generator::{CodeGenerator, CompiledQuery, ExternalVarInfo};
pub use plan::{PlanStep, RangeSpec, SortKind, StepKind};
pub use registers::RegisterAllocator;
