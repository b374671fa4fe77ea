//! IR routine: the ordered command stream for one function

use super::instruction::{IrCommand, Temp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Command stream of a single routine, as produced by IR generation
///
/// Immutable once built; every back-end stage reads it through
/// [`IrRoutine::commands`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrRoutine {
    /// Routine name (used in diagnostics)
    pub name: String,
    commands: Vec<IrCommand>,
}

impl IrRoutine {
    /// Wrap an ordered command list
    pub fn new(name: impl Into<String>, commands: Vec<IrCommand>) -> Self {
        Self {
            name: name.into(),
            commands,
        }
    }

    /// All commands in program order
    pub fn commands(&self) -> &[IrCommand] {
        &self.commands
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when the routine has no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Every temporary read or written anywhere in the routine
    pub fn temps(&self) -> BTreeSet<Temp> {
        let mut temps = BTreeSet::new();
        for cmd in &self.commands {
            temps.extend(cmd.uses());
            temps.extend(cmd.defines());
        }
        temps
    }
}

impl FromIterator<IrCommand> for IrRoutine {
    fn from_iter<I: IntoIterator<Item = IrCommand>>(iter: I) -> Self {
        Self::new("<anonymous>", iter.into_iter().collect())
    }
}
