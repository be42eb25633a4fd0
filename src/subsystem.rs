//! # Subsystem contract
//!
//! Every emulated chip is driven through [`Subsystem`]: advance one cycle, reset to
//! power-on state, and save/restore its own opaque state. The run loop never looks
//! inside a subsystem; the only extra capabilities it needs are bus access for the
//! keyboard buffer ([`Bus`]) and the program counter for breakpoints ([`Cpu`]).

use std::fmt;

use crate::error::SubsystemError;

/// A subsystem's saved state. Opaque to the run loop and stored verbatim in snapshots.
pub type SubsystemState = String;

pub trait Subsystem: Send {
    fn name(&self) -> &str;

    /// Advance exactly one cycle.
    fn tick(&mut self) -> Result<(), SubsystemError>;

    fn reset(&mut self);

    fn serialize(&self) -> SubsystemState;

    /// Restore from a value previously produced by `serialize`.
    fn deserialize(&mut self, state: &str) -> Result<(), SubsystemError>;
}

/// The address bus as seen by the CPU ("wires").
pub trait Bus: Subsystem {
    fn cpu_read(&mut self, address: u16) -> u8;
    fn cpu_write(&mut self, address: u16, value: u8);
}

pub trait Cpu: Subsystem {
    fn program_counter(&self) -> u16;
}

/// Names of the machine's subsystem slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemId {
    Wires,
    Ram,
    Vic,
    Sid,
    Cpu,
    Cias,
    Tape,
}

impl SubsystemId {
    /// Order in which subsystems are ticked within one cycle.
    pub const TICK_ORDER: [SubsystemId; 5] = [
        SubsystemId::Cpu,
        SubsystemId::Vic,
        SubsystemId::Cias,
        SubsystemId::Sid,
        SubsystemId::Tape,
    ];

    /// Order of `reset` and of snapshot fields.
    pub const ALL: [SubsystemId; 7] = [
        SubsystemId::Wires,
        SubsystemId::Ram,
        SubsystemId::Vic,
        SubsystemId::Sid,
        SubsystemId::Cpu,
        SubsystemId::Cias,
        SubsystemId::Tape,
    ];

    /// Field name used in snapshots
    pub fn name(&self) -> &'static str {
        match self {
            SubsystemId::Wires => "wires",
            SubsystemId::Ram => "ram",
            SubsystemId::Vic => "vic",
            SubsystemId::Sid => "sid",
            SubsystemId::Cpu => "cpu",
            SubsystemId::Cias => "cias",
            SubsystemId::Tape => "tape",
        }
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
