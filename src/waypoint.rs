//! Frames-per-second sampling. Purely observational: it never touches the machine.

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Waypoint {
    frames_per_sample: u32,
    frames_since: u32,
    started_at: Instant,
}

impl Waypoint {
    pub fn new(frames_per_sample: u32, now: Instant) -> Self {
        Waypoint {
            frames_per_sample: frames_per_sample.max(1),
            frames_since: 0,
            started_at: now,
        }
    }

    /// Count a completed frame. Every `frames_per_sample` frames this returns the
    /// realised rate since the previous sample and starts a new one.
    pub fn frame_completed(&mut self, now: Instant) -> Option<u32> {
        self.frames_since += 1;
        if self.frames_since < self.frames_per_sample {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        self.started_at = now;
        self.frames_since = 0;

        if elapsed <= 0.0 {
            return None;
        }
        Some((f64::from(self.frames_per_sample) / elapsed).round() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sample_every_n_frames() {
        let start = Instant::now();
        let mut waypoint = Waypoint::new(50, start);

        for i in 1..50 {
            assert_eq!(waypoint.frame_completed(start + Duration::from_millis(20 * i)), None);
        }
        assert_eq!(waypoint.frame_completed(start + Duration::from_secs(1)), Some(50));
    }

    #[test]
    fn test_sample_resets_window() {
        let start = Instant::now();
        let mut waypoint = Waypoint::new(2, start);

        assert_eq!(waypoint.frame_completed(start), None);
        assert_eq!(waypoint.frame_completed(start + Duration::from_millis(100)), Some(20));
        assert_eq!(waypoint.frame_completed(start + Duration::from_millis(150)), None);
        assert_eq!(waypoint.frame_completed(start + Duration::from_millis(200)), Some(20));
    }

    #[test]
    fn test_zero_elapsed_is_not_reported() {
        let start = Instant::now();
        let mut waypoint = Waypoint::new(1, start);
        assert_eq!(waypoint.frame_completed(start), None);
    }
}
