//! # Keyboard injection
//!
//! Text is delivered by writing straight into the KERNAL keyboard buffer: one write
//! for the character, one for the new buffer length. The KERNAL drains the buffer
//! on its own while it waits for input.

use serde::{Deserialize, Serialize};

use crate::error::RunloopError;
use crate::subsystem::Bus;

/// Where the keyboard buffer lives on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardLayout {
    /// Zero-page cell holding the number of pending keys
    pub length_addr: u16,
    /// First byte of the buffer
    pub buffer_addr: u16,
    pub capacity: u8,
}

impl Default for KeyboardLayout {
    fn default() -> Self {
        KeyboardLayout {
            length_addr: 0x00C6,
            buffer_addr: 0x0277,
            capacity: 10,
        }
    }
}

impl KeyboardLayout {
    pub fn pending(&self, bus: &mut dyn Bus) -> u8 {
        bus.cpu_read(self.length_addr)
    }

    pub fn free(&self, bus: &mut dyn Bus) -> usize {
        usize::from(self.capacity).saturating_sub(usize::from(self.pending(bus)))
    }

    /// Append one key if there is room. Returns false when the buffer is full.
    pub fn push_key(&self, bus: &mut dyn Bus, code: u8) -> bool {
        let len = self.pending(bus);
        if len >= self.capacity {
            return false;
        }
        bus.cpu_write(self.buffer_addr.wrapping_add(u16::from(len)), code);
        bus.cpu_write(self.length_addr, len + 1);
        true
    }
}

/// Type `text` verbatim (ASCII codes, no conversion).
///
/// Fails without writing anything if the text does not fit in the free space.
pub fn type_text(bus: &mut dyn Bus, layout: &KeyboardLayout, text: &str) -> Result<(), RunloopError> {
    let codes = text
        .chars()
        .map(ascii_code)
        .collect::<Result<Vec<u8>, _>>()?;

    let available = layout.free(bus);
    if codes.len() > available {
        return Err(RunloopError::BufferOverflow {
            requested: codes.len(),
            available,
        });
    }

    for code in codes {
        layout.push_key(bus, code);
    }
    Ok(())
}

pub fn ascii_code(c: char) -> Result<u8, RunloopError> {
    u8::try_from(c).map_err(|_| RunloopError::UnencodableChar(c))
}

/// Convert an ASCII character to the machine's native character code.
pub fn to_petscii(c: char) -> Result<u8, RunloopError> {
    let code = ascii_code(c)?;
    Ok(match code {
        b'A'..=b'Z' => code - 64 + 192,
        b'a'..=b'z' => code - 96 + 64,
        b'\n' => b'\r',
        _ => code,
    })
}
