//! Temporary and label generators
//!
//! Each IR-generation stage owns its own factories and threads them through
//! explicitly, so two routines (or two tests) never share a counter.

use super::instruction::Temp;

/// Mints fresh temporaries with increasing serial numbers
#[derive(Debug, Clone, Default)]
pub struct TempFactory {
    // One past the last serial handed out; wider than `Temp` so it can
    // record exhaustion of the serial space
    next: u64,
}

impl TempFactory {
    /// Create a factory whose first temporary is `Temp_0`
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory that continues after `start - 1`
    pub fn starting_at(start: u32) -> Self {
        Self {
            next: u64::from(start),
        }
    }

    /// Return an unused temporary, or `None` once every `u32` serial is taken
    pub fn try_fresh(&mut self) -> Option<Temp> {
        let serial = u32::try_from(self.next).ok()?;
        self.next += 1;
        Some(Temp(serial))
    }

    /// Return an unused temporary
    ///
    /// # Panics
    ///
    /// Panics after `u32::MAX + 1` temporaries; use [`TempFactory::try_fresh`]
    /// to handle exhaustion.
    pub fn fresh(&mut self) -> Temp {
        match self.try_fresh() {
            Some(temp) => temp,
            None => panic!("temporary serial space exhausted"),
        }
    }

    /// Serial the next temporary will get (`u32::MAX + 1` once exhausted)
    pub fn issued(&self) -> u64 {
        self.next
    }
}

/// Mints unique label names of the form `Label_<n>_<hint>`
#[derive(Debug, Clone, Default)]
pub struct LabelFactory {
    next: usize,
}

impl LabelFactory {
    /// Create a factory starting at `Label_0_*`
    pub fn new() -> Self {
        Self::default()
    }

    /// Return an unused label name carrying `hint` for readability
    pub fn fresh(&mut self, hint: &str) -> String {
        let label = format!("Label_{}_{}", self.next, hint);
        self.next += 1;
        label
    }
}
