use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::SubsystemError;
use crate::subsystem::{Bus, Subsystem, SubsystemState};

pub const MEMORY_SIZE: usize = 0x10000;

/// 64 KiB of RAM shared between the bus and the chips that read it directly.
#[derive(Clone)]
pub struct SharedMemory {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedMemory {
    pub fn new() -> Self {
        SharedMemory {
            bytes: Arc::new(Mutex::new(vec![0; MEMORY_SIZE])),
        }
    }

    pub fn read(&self, address: u16) -> u8 {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)[usize::from(address)]
    }

    pub fn write(&self, address: u16, value: u8) {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)[usize::from(address)] = value;
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut bytes)
    }
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize)]
struct WiresState {
    cpu_port: u8,
}

/// The CPU's view of the address space ("wires"). Flat RAM plus the 6510 port
/// register at $0001.
pub struct MemoryBus {
    name: String,
    memory: SharedMemory,
    cpu_port: u8,
}

impl MemoryBus {
    pub const POWER_ON_PORT: u8 = 0x37;

    pub fn new(name: String, memory: SharedMemory) -> Self {
        MemoryBus {
            name,
            memory,
            cpu_port: Self::POWER_ON_PORT,
        }
    }

    pub fn cpu_port(&self) -> u8 {
        self.cpu_port
    }
}

impl Subsystem for MemoryBus {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self) -> Result<(), SubsystemError> {
        Ok(())
    }

    fn reset(&mut self) {
        self.cpu_port = Self::POWER_ON_PORT;
    }

    fn serialize(&self) -> SubsystemState {
        serde_json::json!({ "cpu_port": self.cpu_port }).to_string()
    }

    fn deserialize(&mut self, state: &str) -> Result<(), SubsystemError> {
        let state: WiresState =
            serde_json::from_str(state).map_err(|e| SubsystemError::new(&self.name, e.to_string()))?;
        self.cpu_port = state.cpu_port;
        Ok(())
    }
}

impl Bus for MemoryBus {
    fn cpu_read(&mut self, address: u16) -> u8 {
        match address {
            0x0001 => self.cpu_port,
            _ => self.memory.read(address),
        }
    }

    fn cpu_write(&mut self, address: u16, value: u8) {
        if address == 0x0001 {
            self.cpu_port = value;
        }
        self.memory.write(address, value);
    }
}

/// Snapshot slot for the RAM contents, saved as a hex string.
pub struct Ram {
    name: String,
    memory: SharedMemory,
}

impl Ram {
    pub fn new(name: String, memory: SharedMemory) -> Self {
        Ram { name, memory }
    }
}

fn decode_hex(name: &str, text: &str) -> Result<Vec<u8>, SubsystemError> {
    if text.len() != MEMORY_SIZE * 2 {
        return Err(SubsystemError::new(
            name,
            format!("expected {} hex digits, got {}", MEMORY_SIZE * 2, text.len()),
        ));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| SubsystemError::new(name, format!("bad hex at offset {}", i)))
        })
        .collect()
}

impl Subsystem for Ram {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self) -> Result<(), SubsystemError> {
        Ok(())
    }

    fn reset(&mut self) {
        self.memory.with_bytes(|bytes| bytes.fill(0));
    }

    fn serialize(&self) -> SubsystemState {
        self.memory.with_bytes(|bytes| {
            let mut text = String::with_capacity(bytes.len() * 2);
            for byte in bytes.iter() {
                let _ = write!(text, "{:02x}", byte);
            }
            text
        })
    }

    fn deserialize(&mut self, state: &str) -> Result<(), SubsystemError> {
        let decoded = decode_hex(&self.name, state)?;
        self.memory.with_bytes(|bytes| bytes.copy_from_slice(&decoded));
        Ok(())
    }
}
