use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// PAL raster lines per video frame
pub const ROWS_PER_FRAME: u64 = 312;

/// CPU cycles per raster line (PAL)
pub const CYCLES_PER_ROW: u64 = 63;

/// Cycles executed by one frame tick
pub const CYCLES_PER_FRAME: u64 = ROWS_PER_FRAME * CYCLES_PER_ROW;

/// Frame rate the run loop paces at unless a profile asks otherwise
pub const DEFAULT_FPS: f64 = 50.0;

/// Longest wall-clock pause between two frames. Slower rates are clamped to it.
pub const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(3600);

/// Frames counted between two FPS samples
pub const FRAMES_PER_WAYPOINT: u32 = 50;

/// Target frame rate of a run episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetFps {
    /// Paced at this many frames per second (before the speed multiplier)
    Limited(f64),
    /// As fast as possible, no wall-clock pacing
    Unbounded,
}

impl TargetFps {
    /// Wall-clock time per frame at the given speed multiplier, or `None` when unpaced.
    /// Never longer than [`MAX_FRAME_INTERVAL`].
    pub fn frame_interval(&self, speed: f64) -> Option<Duration> {
        match *self {
            TargetFps::Limited(fps) => {
                let rate = fps * speed;
                if rate.is_infinite() {
                    return None;
                }
                let seconds = (1.0 / rate).min(MAX_FRAME_INTERVAL.as_secs_f64());
                Some(Duration::try_from_secs_f64(seconds).unwrap_or(MAX_FRAME_INTERVAL))
            }
            TargetFps::Unbounded => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        match *self {
            TargetFps::Limited(fps) => fps > 0.0,
            TargetFps::Unbounded => true,
        }
    }
}

impl Default for TargetFps {
    fn default() -> Self {
        TargetFps::Limited(DEFAULT_FPS)
    }
}

impl From<f64> for TargetFps {
    fn from(fps: f64) -> Self {
        if fps.is_infinite() && fps > 0.0 {
            TargetFps::Unbounded
        } else {
            TargetFps::Limited(fps)
        }
    }
}

impl fmt::Display for TargetFps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetFps::Limited(fps) => write!(f, "{} fps", fps),
            TargetFps::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Why a run episode ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The profile's stop condition became true
    Predicate,
    /// `stop()` was called, or the machine was restored from a snapshot
    Stopped,
    /// `stop_after_frame()` took effect at the end of a frame
    FrameBoundary,
    /// A subsystem faulted during a frame
    Fault(String),
    /// A newer `run()` replaced this episode
    Superseded,
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

/// The run loop's own slice of machine state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunloopState {
    pub cycle: u64,
}
