//! # Machine state
//!
//! The aggregate the run loop drives: the cycle counter plus one slot per subsystem.
//! A cycle bumps the counter and then ticks the subsystems in
//! [`SubsystemId::TICK_ORDER`]; nothing outside this module can observe a machine
//! halfway through a cycle.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::SubsystemError;
use crate::profile::RunProfile;
use crate::subsystem::{Bus, Cpu, Subsystem, SubsystemId, SubsystemState};
use crate::types::{RunloopState, StopReason, CYCLES_PER_FRAME};

/// The chips that make up a machine, one per slot.
pub struct Subsystems {
    pub wires: Box<dyn Bus>,
    pub ram: Box<dyn Subsystem>,
    pub vic: Box<dyn Subsystem>,
    pub sid: Box<dyn Subsystem>,
    pub cpu: Box<dyn Cpu>,
    pub cias: Box<dyn Subsystem>,
    pub tape: Box<dyn Subsystem>,
}

pub struct Machine {
    cycle: u64,
    wires: Box<dyn Bus>,
    ram: Box<dyn Subsystem>,
    vic: Box<dyn Subsystem>,
    sid: Box<dyn Subsystem>,
    cpu: Box<dyn Cpu>,
    cias: Box<dyn Subsystem>,
    tape: Box<dyn Subsystem>,
}

/// How a frame ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    Completed,
    Halted(StopReason),
}

impl Machine {
    pub fn new(parts: Subsystems) -> Self {
        Machine {
            cycle: 0,
            wires: parts.wires,
            ram: parts.ram,
            vic: parts.vic,
            sid: parts.sid,
            cpu: parts.cpu,
            cias: parts.cias,
            tape: parts.tape,
        }
    }

    /// Cycles executed since the last reset
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn program_counter(&self) -> u16 {
        self.cpu.program_counter()
    }

    pub fn cpu(&self) -> &dyn Cpu {
        self.cpu.as_ref()
    }

    pub fn wires_mut(&mut self) -> &mut dyn Bus {
        self.wires.as_mut()
    }

    pub fn runloop_state(&self) -> RunloopState {
        RunloopState { cycle: self.cycle }
    }

    pub(crate) fn restore_runloop_state(&mut self, state: RunloopState) {
        self.cycle = state.cycle;
    }

    /// Power-on reset of every subsystem, in slot order.
    pub fn reset(&mut self) {
        self.cycle = 0;
        for id in SubsystemId::ALL {
            self.reset_subsystem(id);
        }
    }

    /// Advance the whole machine by one cycle.
    pub fn step_cycle(&mut self) -> Result<(), SubsystemError> {
        self.cycle += 1;
        for id in SubsystemId::TICK_ORDER {
            self.tick_subsystem(id)?;
        }
        Ok(())
    }

    /// Run one full frame with no stop condition.
    pub fn step_frame(&mut self) -> Result<(), SubsystemError> {
        for _ in 0..CYCLES_PER_FRAME {
            self.step_cycle()?;
        }
        Ok(())
    }

    /// Run up to one frame, checking the stop flag and the profile's condition after
    /// every cycle.
    pub(crate) fn run_frame(
        &mut self,
        profile: &RunProfile,
        stop: &AtomicBool,
    ) -> Result<FrameOutcome, SubsystemError> {
        for _ in 0..CYCLES_PER_FRAME {
            self.step_cycle()?;

            if stop.load(Ordering::Acquire) {
                return Ok(FrameOutcome::Halted(StopReason::Stopped));
            }
            if profile.should_stop(self) {
                return Ok(FrameOutcome::Halted(StopReason::Predicate));
            }
        }
        Ok(FrameOutcome::Completed)
    }

    pub fn subsystem_name(&self, id: SubsystemId) -> &str {
        match id {
            SubsystemId::Wires => self.wires.name(),
            SubsystemId::Ram => self.ram.name(),
            SubsystemId::Vic => self.vic.name(),
            SubsystemId::Sid => self.sid.name(),
            SubsystemId::Cpu => self.cpu.name(),
            SubsystemId::Cias => self.cias.name(),
            SubsystemId::Tape => self.tape.name(),
        }
    }

    pub fn serialize_subsystem(&self, id: SubsystemId) -> SubsystemState {
        match id {
            SubsystemId::Wires => self.wires.serialize(),
            SubsystemId::Ram => self.ram.serialize(),
            SubsystemId::Vic => self.vic.serialize(),
            SubsystemId::Sid => self.sid.serialize(),
            SubsystemId::Cpu => self.cpu.serialize(),
            SubsystemId::Cias => self.cias.serialize(),
            SubsystemId::Tape => self.tape.serialize(),
        }
    }

    pub fn deserialize_subsystem(
        &mut self,
        id: SubsystemId,
        state: &str,
    ) -> Result<(), SubsystemError> {
        match id {
            SubsystemId::Wires => self.wires.deserialize(state),
            SubsystemId::Ram => self.ram.deserialize(state),
            SubsystemId::Vic => self.vic.deserialize(state),
            SubsystemId::Sid => self.sid.deserialize(state),
            SubsystemId::Cpu => self.cpu.deserialize(state),
            SubsystemId::Cias => self.cias.deserialize(state),
            SubsystemId::Tape => self.tape.deserialize(state),
        }
    }

    fn tick_subsystem(&mut self, id: SubsystemId) -> Result<(), SubsystemError> {
        match id {
            SubsystemId::Wires => self.wires.tick(),
            SubsystemId::Ram => self.ram.tick(),
            SubsystemId::Vic => self.vic.tick(),
            SubsystemId::Sid => self.sid.tick(),
            SubsystemId::Cpu => self.cpu.tick(),
            SubsystemId::Cias => self.cias.tick(),
            SubsystemId::Tape => self.tape.tick(),
        }
    }

    fn reset_subsystem(&mut self, id: SubsystemId) {
        match id {
            SubsystemId::Wires => self.wires.reset(),
            SubsystemId::Ram => self.ram.reset(),
            SubsystemId::Vic => self.vic.reset(),
            SubsystemId::Sid => self.sid.reset(),
            SubsystemId::Cpu => self.cpu.reset(),
            SubsystemId::Cias => self.cias.reset(),
            SubsystemId::Tape => self.tape.reset(),
        }
    }
}
