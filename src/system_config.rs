//! # JSON Configuration
//!
//! Session parameters for the run loop, loaded from a JSON file. Every field is
//! optional; missing fields take the defaults below.
//!
//! ```json
//! {
//!   "default_fps": 50.0,
//!   "speed_multiplier": 1.0,
//!   "frames_per_waypoint": 50,
//!   "type_backoff_ms": 10,
//!   "await_keyboard_pc": 58829,
//!   "keyboard": {"length_addr": 198, "buffer_addr": 631, "capacity": 10}
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RunloopError;
use crate::keyboard::KeyboardLayout;
use crate::types::{DEFAULT_FPS, FRAMES_PER_WAYPOINT};

/// Program counter of the KERNAL loop that waits for a key press
pub const AWAIT_KEYBOARD_PC: u16 = 0xE5CD;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunloopConfig {
    /// Frame rate used by `run()` when the profile does not set one
    pub default_fps: f64,
    /// Initial speed multiplier applied on top of the profile's frame rate
    pub speed_multiplier: f64,
    pub frames_per_waypoint: u32,
    /// Delay between keyboard buffer polls while `type_pet` waits for space
    pub type_backoff_ms: u64,
    pub await_keyboard_pc: u16,
    pub keyboard: KeyboardLayout,
}

impl Default for RunloopConfig {
    fn default() -> Self {
        Self {
            default_fps: DEFAULT_FPS,
            speed_multiplier: 1.0,
            frames_per_waypoint: FRAMES_PER_WAYPOINT,
            type_backoff_ms: 10,
            await_keyboard_pc: AWAIT_KEYBOARD_PC,
            keyboard: KeyboardLayout::default(),
        }
    }
}

impl RunloopConfig {
    pub fn from_json_str(json: &str) -> Result<Self, RunloopError> {
        let config: RunloopConfig = serde_json::from_str(json)
            .map_err(|e| RunloopError::Config(format!("Failed to parse JSON config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &str) -> Result<Self, RunloopError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RunloopError::Config(format!("Failed to read config file '{}': {}", path, e)))?;
        Self::from_json_str(&content)
    }

    pub fn type_backoff(&self) -> Duration {
        Duration::from_millis(self.type_backoff_ms)
    }

    fn validate(&self) -> Result<(), RunloopError> {
        if !(self.default_fps > 0.0) {
            return Err(RunloopError::Config(format!(
                "default_fps must be positive, got {}",
                self.default_fps
            )));
        }
        if !(self.speed_multiplier > 0.0 && self.speed_multiplier.is_finite()) {
            return Err(RunloopError::Config(format!(
                "speed_multiplier must be positive, got {}",
                self.speed_multiplier
            )));
        }
        if self.frames_per_waypoint == 0 {
            return Err(RunloopError::Config("frames_per_waypoint must be at least 1".to_string()));
        }
        Ok(())
    }
}
