//! Error types for the L compiler back end

use crate::compiler::cfg::NodeId;
use crate::compiler::ir::Temp;
use thiserror::Error;

/// Back-end errors
///
/// Register allocation running out of colors is *not* an error at the
/// allocator level (see [`crate::compiler::RegisterAllocation`]); it only
/// becomes [`Error::RegisterAllocationFailed`] once the driver decides to
/// abort code generation for the routine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // CFG construction
    /// Jump to a label that is not defined in the same command stream
    ///
    /// **Triggered by:** `Jump L` or `JumpIfEqToZero t L` with no `L:` in the routine
    /// **Prevention:** IR generation must emit every label it jumps to
    #[error("Unresolved jump target '{label}' at node {node}")]
    UnresolvedLabel {
        /// Label name referenced by the jump
        label: String,
        /// Node holding the jump
        node: NodeId,
    },

    /// The same label is defined twice in one command stream
    #[error("Label '{label}' defined at node {first} and again at node {second}")]
    DuplicateLabel {
        /// Label name
        label: String,
        /// First definition
        first: NodeId,
        /// Second definition
        second: NodeId,
    },

    // Internal engine errors
    /// Work-list iteration hit its safety bound
    ///
    /// Only a non-monotone transfer function can cause this, so it is an
    /// engine defect and never a converged result.
    #[error("Dataflow analysis '{analysis}' did not reach a fixpoint within {limit} iterations")]
    FixpointNotReached {
        /// Analysis name
        analysis: &'static str,
        /// Iteration bound that was exhausted
        limit: usize,
    },

    /// Select phase found no free register for a node simplified with degree < K
    #[error("No free register for {temp} during select ({neighbors} colored neighbors, {registers} registers)")]
    ColoringInvariantViolated {
        /// Temporary being colored
        temp: Temp,
        /// Number of already-colored neighbors
        neighbors: usize,
        /// Register budget K
        registers: usize,
    },

    // Allocation
    /// Register allocation failed, code generation for the routine must stop
    #[error("Register allocation failed for routine {routine} (peak pressure {peak_pressure}, {registers} registers)")]
    RegisterAllocationFailed {
        /// Routine name
        routine: String,
        /// Highest number of simultaneously live temporaries
        peak_pressure: usize,
        /// Register budget K
        registers: usize,
    },

    // Configuration
    /// Backend options are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The compilation unit cannot be completed
    Fatal,
    /// A defect inside the back end itself
    Internal,
}

impl Error {
    /// Create a configuration error with a message
    pub fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfiguration(msg.into())
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::FixpointNotReached { .. } => ErrorSeverity::Internal,
            Error::ColoringInvariantViolated { .. } => ErrorSeverity::Internal,

            Error::UnresolvedLabel { .. }
            | Error::DuplicateLabel { .. }
            | Error::RegisterAllocationFailed { .. }
            | Error::InvalidConfiguration(_) => ErrorSeverity::Fatal,
        }
    }

    /// True for engine defects, as opposed to problems with the input
    pub fn is_internal(&self) -> bool {
        self.classify() == ErrorSeverity::Internal
    }
}

/// Result type for back-end operations
pub type Result<T> = std::result::Result<T, Error>;
