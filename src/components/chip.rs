use serde::{Deserialize, Serialize};

use crate::error::SubsystemError;
use crate::subsystem::{Subsystem, SubsystemState};

#[derive(Serialize, Deserialize)]
struct ChipState {
    ticks: u64,
}

/// Placeholder for a chip whose emulation lives elsewhere. It only counts the
/// cycles it has been given, which is enough to check scheduling and snapshots.
pub struct CountingChip {
    name: String,
    ticks: u64,
}

impl CountingChip {
    pub fn new(name: String) -> Self {
        CountingChip { name, ticks: 0 }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Subsystem for CountingChip {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self) -> Result<(), SubsystemError> {
        self.ticks += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.ticks = 0;
    }

    fn serialize(&self) -> SubsystemState {
        serde_json::json!({ "ticks": self.ticks }).to_string()
    }

    fn deserialize(&mut self, state: &str) -> Result<(), SubsystemError> {
        let state: ChipState =
            serde_json::from_str(state).map_err(|e| SubsystemError::new(&self.name, e.to_string()))?;
        self.ticks = state.ticks;
        Ok(())
    }
}
