//! # lcc-backend - Analysis and Register Allocation for the L Compiler
//!
//! The back half of a compiler for L, a small imperative/object-oriented
//! language. It consumes the flat IR command stream produced by IR
//! generation, one routine at a time, and produces:
//!
//! - the control flow graph of the routine (with a Graphviz DOT rendering),
//! - diagnostics from a forward initialization analysis (variables possibly
//!   read before they are written, unreachable code, loops),
//! - a mapping from IR temporaries to machine registers, computed by
//!   liveness analysis, an interference graph and Kempe graph coloring.
//!
//! There is no spilling: when the temporaries do not fit in the register
//! budget, the routine fails with [`Error::RegisterAllocationFailed`].
//!
//! ## Quick Start
//!
//! ```rust
//! use lcc_backend::compiler::{Backend, BackendOptions, BinOp, IrCommand, IrRoutine, TempFactory};
//!
//! # fn main() -> lcc_backend::Result<()> {
//! let mut temps = TempFactory::new();
//! let (a, b, sum) = (temps.fresh(), temps.fresh(), temps.fresh());
//!
//! let routine = IrRoutine::new(
//!     "main",
//!     vec![
//!         IrCommand::ConstInt { dst: a, value: 5 },
//!         IrCommand::ConstInt { dst: b, value: 7 },
//!         IrCommand::Binop { op: BinOp::Add, dst: sum, lhs: a, rhs: b },
//!         IrCommand::Return { value: sum },
//!     ],
//! );
//!
//! let backend = Backend::new(BackendOptions::default())?;
//! let output = backend.compile_routine(&routine)?;
//!
//! // a and b are live at the same time, so they need different registers
//! assert_ne!(output.assignment[&a], output.assignment[&b]);
//! assert_eq!(output.analysis.uninitialized_report(), "!OK");
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! IrRoutine ─► ControlFlowGraph ─┬─► InitializationAnalysis ─► AnalysisReport
//!                                └─► LivenessAnalysis ─► InterferenceGraph ─► RegisterAllocation
//! ```
//!
//! Each stage is usable on its own; see [`compiler`] for the individual
//! modules. Logging goes through `tracing`; the library installs no
//! subscriber.

#![allow(clippy::needless_range_loop)] // Index needed to address parallel per-node vectors

/// Version of the back end
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;

// Re-export main types
pub use compiler::{
    Backend, BackendOptions, ControlFlowGraph, InterferenceGraph, IrCommand, IrRoutine,
    RegisterAllocation, RegisterAllocator, RoutineOutput, Temp,
};
pub use error::{Error, ErrorSeverity, Result};
