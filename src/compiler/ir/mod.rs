//! # Intermediate Representation consumed by the back end
//!
//! IR generation (outside this crate) lowers each routine to a flat list of
//! three-address commands. This module defines that list and the small
//! amount of metadata every later stage needs from it.
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── instruction.rs  # Temp, BinOp, CommandKind, IrCommand enum
//! ├── program.rs      # IrRoutine (ordered command stream for one routine)
//! └── temp.rs         # TempFactory, LabelFactory generators
//! ```
//!
//! ## Key Types
//!
//! - [`Temp`] - IR temporary, the unit of register allocation
//! - [`IrCommand`] - closed set of commands; `uses()`/`defines()` drive liveness
//! - [`IrRoutine`] - one routine's command stream, enumerated with `commands()`

mod instruction;
mod program;
mod temp;

pub use instruction::{BinOp, CommandKind, IrCommand, Temp};
pub use program::IrRoutine;
pub use temp::{LabelFactory, TempFactory};
