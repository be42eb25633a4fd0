//! Callbacks the embedding host may provide. Every method defaults to a no-op.

use crate::error::RunloopError;

pub trait Hooks: Send + Sync {
    fn did_start(&self) {}

    fn did_stop(&self) {}

    /// Realised frames per second, reported once per waypoint.
    fn update_fps(&self, _fps: u32) {}

    fn report_error(&self, _error: &RunloopError) {}

    fn set_title(&self, _title: &str) {}
}

/// Hooks for a host that wants none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl Hooks for NoHooks {}
