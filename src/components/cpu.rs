//! A stand-in CPU that reproduces the KERNAL's observable behaviour at the prompt:
//! it boots for a while, then spins in the keyboard wait loop and takes one key out
//! of the keyboard buffer per pass. No instructions are executed.

use log::debug;
use serde::{Deserialize, Serialize};

use super::memory::SharedMemory;
use crate::error::SubsystemError;
use crate::keyboard::KeyboardLayout;
use crate::subsystem::{Cpu, Subsystem, SubsystemState};
use crate::types::CYCLES_PER_FRAME;

/// KERNAL cold start entry point
pub const RESET_PC: u16 = 0xFCE2;

/// Cycles spent between each step of the wait loop
const CYCLES_PER_STEP: u8 = 2;

/// Keys echoed back are kept up to this many
const ECHO_LIMIT: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CpuState {
    pc: u16,
    boot_remaining: u64,
    loop_step: usize,
    step_cycles: u8,
    echo: Vec<u8>,
}

pub struct KernalIdleCpu {
    name: String,
    memory: SharedMemory,
    layout: KeyboardLayout,
    wait_loop: [u16; 4],
    boot_cycles: u64,
    state: CpuState,
}

impl KernalIdleCpu {
    pub fn new(name: String, memory: SharedMemory, layout: KeyboardLayout, await_keyboard_pc: u16) -> Self {
        let mut cpu = KernalIdleCpu {
            name,
            memory,
            layout,
            wait_loop: [
                await_keyboard_pc,
                await_keyboard_pc.wrapping_add(2),
                await_keyboard_pc.wrapping_add(4),
                await_keyboard_pc.wrapping_add(6),
            ],
            boot_cycles: 2 * CYCLES_PER_FRAME,
            state: CpuState::default(),
        };
        cpu.reset();
        cpu
    }

    /// Change how long the boot sequence takes. Applies from the next reset.
    pub fn with_boot_cycles(mut self, cycles: u64) -> Self {
        self.boot_cycles = cycles;
        self.reset();
        self
    }

    pub fn is_booted(&self) -> bool {
        self.state.boot_remaining == 0
    }

    /// Keys taken from the keyboard buffer since reset, oldest first.
    pub fn echo(&self) -> &[u8] {
        &self.state.echo
    }

    /// Remove the first key from the keyboard buffer, shifting the rest down.
    fn take_key(&mut self) {
        let len = self.memory.read(self.layout.length_addr);
        if len == 0 {
            return;
        }

        let base = self.layout.buffer_addr;
        let key = self.memory.read(base);
        for i in 1..u16::from(len) {
            let next = self.memory.read(base.wrapping_add(i));
            self.memory.write(base.wrapping_add(i - 1), next);
        }
        self.memory.write(self.layout.length_addr, len - 1);

        debug!("{} took key ${:02X}", self.name, key);
        if self.state.echo.len() == ECHO_LIMIT {
            self.state.echo.remove(0);
        }
        self.state.echo.push(key);
    }
}

impl Subsystem for KernalIdleCpu {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self) -> Result<(), SubsystemError> {
        if self.state.boot_remaining > 0 {
            self.state.boot_remaining -= 1;
            if self.state.boot_remaining == 0 {
                self.state.pc = self.wait_loop[0];
            } else {
                let elapsed = self.boot_cycles - self.state.boot_remaining;
                self.state.pc = RESET_PC.wrapping_add((elapsed % 64) as u16);
            }
            return Ok(());
        }

        self.state.step_cycles += 1;
        if self.state.step_cycles < CYCLES_PER_STEP {
            return Ok(());
        }
        self.state.step_cycles = 0;
        self.state.loop_step = (self.state.loop_step + 1) % self.wait_loop.len();
        self.state.pc = self.wait_loop[self.state.loop_step];

        if self.state.loop_step == 0 {
            self.take_key();
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = CpuState {
            pc: RESET_PC,
            boot_remaining: self.boot_cycles,
            ..CpuState::default()
        };
        if self.boot_cycles == 0 {
            self.state.pc = self.wait_loop[0];
        }
    }

    fn serialize(&self) -> SubsystemState {
        serde_json::to_string(&self.state).unwrap_or_default()
    }

    fn deserialize(&mut self, state: &str) -> Result<(), SubsystemError> {
        self.state =
            serde_json::from_str(state).map_err(|e| SubsystemError::new(&self.name, e.to_string()))?;
        Ok(())
    }
}

impl Cpu for KernalIdleCpu {
    fn program_counter(&self) -> u16 {
        self.state.pc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_config::AWAIT_KEYBOARD_PC;

    fn cpu(memory: &SharedMemory, boot_cycles: u64) -> KernalIdleCpu {
        KernalIdleCpu::new("CPU".to_string(), memory.clone(), KeyboardLayout::default(), AWAIT_KEYBOARD_PC)
            .with_boot_cycles(boot_cycles)
    }

    #[test]
    fn test_boots_into_wait_loop() {
        let memory = SharedMemory::new();
        let mut cpu = cpu(&memory, 100);
        assert_eq!(cpu.program_counter(), RESET_PC);

        for _ in 0..99 {
            cpu.tick().unwrap();
            assert_ne!(cpu.program_counter(), AWAIT_KEYBOARD_PC);
        }
        cpu.tick().unwrap();
        assert!(cpu.is_booted());
        assert_eq!(cpu.program_counter(), AWAIT_KEYBOARD_PC);
    }

    #[test]
    fn test_wait_loop_returns_to_start() {
        let memory = SharedMemory::new();
        let mut cpu = cpu(&memory, 0);
        assert_eq!(cpu.program_counter(), AWAIT_KEYBOARD_PC);

        let mut seen = Vec::new();
        for _ in 0..8 {
            cpu.tick().unwrap();
            seen.push(cpu.program_counter());
        }
        // Sits on the loop head for one more cycle, goes round, comes back
        assert_eq!(seen[0], AWAIT_KEYBOARD_PC);
        assert!(seen[1..7].iter().all(|&pc| pc != AWAIT_KEYBOARD_PC));
        assert_eq!(seen[7], AWAIT_KEYBOARD_PC);
    }

    #[test]
    fn test_drains_keyboard_buffer_in_order() {
        let memory = SharedMemory::new();
        let layout = KeyboardLayout::default();
        let mut cpu = cpu(&memory, 0);

        memory.write(layout.buffer_addr, b'H');
        memory.write(layout.buffer_addr + 1, b'I');
        memory.write(layout.length_addr, 2);

        for _ in 0..8 {
            cpu.tick().unwrap();
        }
        assert_eq!(memory.read(layout.length_addr), 1);
        assert_eq!(memory.read(layout.buffer_addr), b'I');

        for _ in 0..8 {
            cpu.tick().unwrap();
        }
        assert_eq!(memory.read(layout.length_addr), 0);
        assert_eq!(cpu.echo(), b"HI");
    }

    #[test]
    fn test_state_round_trip() {
        let memory = SharedMemory::new();
        let mut cpu = cpu(&memory, 10);
        for _ in 0..25 {
            cpu.tick().unwrap();
        }
        let saved = cpu.serialize();
        let pc = cpu.program_counter();

        cpu.reset();
        assert_eq!(cpu.program_counter(), RESET_PC);
        cpu.deserialize(&saved).unwrap();
        assert_eq!(cpu.program_counter(), pc);
        assert_eq!(cpu.serialize(), saved);
    }
}
