//! Run profiles: when a run episode should stop and how fast it should go.

use std::fmt;

use crate::machine::Machine;
use crate::types::TargetFps;

/// Condition checked after every cycle. Must not mutate scheduling state.
pub type StopCondition = Box<dyn Fn(&Machine) -> bool + Send + Sync>;

/// Parameters of one run episode. The default runs forever at 50 fps.
#[derive(Default)]
pub struct RunProfile {
    stop_when: Option<StopCondition>,
    fps: Option<TargetFps>,
}

impl RunProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop once `condition` holds after a cycle.
    pub fn stop_when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Machine) -> bool + Send + Sync + 'static,
    {
        self.stop_when = Some(Box::new(condition));
        self
    }

    pub fn fps(mut self, fps: impl Into<TargetFps>) -> Self {
        self.fps = Some(fps.into());
        self
    }

    /// Run unpaced, as fast as the host allows.
    pub fn unbounded(self) -> Self {
        self.fps(TargetFps::Unbounded)
    }

    pub fn target_fps(&self) -> TargetFps {
        self.fps.unwrap_or_default()
    }

    /// The profile's frame rate, or `default_fps` if it never set one.
    pub fn target_fps_or(&self, default_fps: f64) -> TargetFps {
        self.fps.unwrap_or(TargetFps::Limited(default_fps))
    }

    pub fn should_stop(&self, machine: &Machine) -> bool {
        match &self.stop_when {
            Some(condition) => condition(machine),
            None => false,
        }
    }

    /// Stop when the program counter reaches `pc`.
    pub fn until_pc(pc: u16) -> Self {
        Self::new().stop_when(move |machine| machine.program_counter() == pc)
    }

    /// Stop as soon as the program counter is anywhere but `pc`.
    pub fn away_from_pc(pc: u16) -> Self {
        Self::new().stop_when(move |machine| machine.program_counter() != pc)
    }

    /// Stop once the cycle counter reaches `cycle`.
    pub fn until_cycle(cycle: u64) -> Self {
        Self::new().stop_when(move |machine| machine.cycle() >= cycle)
    }
}

impl fmt::Debug for RunProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunProfile")
            .field("stop_when", &self.stop_when.as_ref().map(|_| "<condition>"))
            .field("fps", &self.fps)
            .finish()
    }
}
