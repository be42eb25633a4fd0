//! # Rusty C64 Run Loop
//!
//! Scheduling and synchronisation core of a Commodore 64 emulator.
//!
//! This library provides:
//! - A real-time run loop that ticks the machine one PAL frame (312 × 63 cycles) at a time
//! - Run profiles with stop conditions, frame-rate targets and an unbounded mode
//! - Realised FPS sampling over waypoints of 50 frames
//! - Keyboard injection through the KERNAL keyboard buffer, with PETSCII conversion
//! - JSON snapshots of the whole machine
//! - A subsystem contract so the chip emulations can be plugged in from elsewhere

pub mod components;
pub mod console;
pub mod error;
pub mod hooks;
pub mod keyboard;
pub mod machine;
pub mod profile;
pub mod runloop;
pub mod snapshot;
pub mod subsystem;
pub mod system_config;
pub mod types;
pub mod waypoint;

// Re-export commonly used items for easier importing
pub use error::{RunloopError, SnapshotError, SubsystemError};
pub use hooks::{Hooks, NoHooks};
pub use machine::{Machine, Subsystems};
pub use profile::RunProfile;
pub use runloop::{RunHandle, Runloop};
pub use snapshot::Snapshot;
pub use subsystem::{Bus, Cpu, Subsystem, SubsystemId, SubsystemState};
pub use system_config::RunloopConfig;
pub use types::{RunState, RunloopState, StopReason, TargetFps};
