//! Reference subsystems: enough of a machine to drive the run loop without the real
//! chip emulations.

pub mod chip;
pub mod cpu;
pub mod memory;

pub use chip::CountingChip;
pub use cpu::KernalIdleCpu;
pub use memory::{MemoryBus, Ram, SharedMemory};

use crate::machine::{Machine, Subsystems};
use crate::system_config::RunloopConfig;

/// Build a machine from the reference subsystems, sharing one 64 KiB memory.
pub fn reference_machine(config: &RunloopConfig) -> Machine {
    let memory = SharedMemory::new();

    Machine::new(Subsystems {
        wires: Box::new(MemoryBus::new("WIRES".to_string(), memory.clone())),
        ram: Box::new(Ram::new("RAM".to_string(), memory.clone())),
        vic: Box::new(CountingChip::new("VIC".to_string())),
        sid: Box::new(CountingChip::new("SID".to_string())),
        cpu: Box::new(KernalIdleCpu::new(
            "CPU_6510".to_string(),
            memory,
            config.keyboard,
            config.await_keyboard_pc,
        )),
        cias: Box::new(CountingChip::new("CIAS".to_string())),
        tape: Box::new(CountingChip::new("TAPE".to_string())),
    })
}
