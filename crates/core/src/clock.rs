//! Frame clock for pacing statistics.

use std::time::{Duration, Instant};

/// Smoothing factor applied to the per-frame FPS estimate.
const FPS_SMOOTHING: f32 = 0.1;

/// Measures frame deltas and keeps a smoothed frames-per-second estimate.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    frames: u64,
    fps: f32,
}

impl FrameClock {
    /// Create a new clock, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Total time since the clock was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record one frame and return the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.record(delta);
        delta
    }

    fn record(&mut self, delta: Duration) {
        self.frames += 1;
        let secs = delta.as_secs_f32();
        if secs <= f32::EPSILON {
            return;
        }
        let instant = 1.0 / secs;
        self.fps = if self.frames == 1 {
            instant
        } else {
            self.fps + (instant - self.fps) * FPS_SMOOTHING
        };
    }

    /// Number of ticks recorded.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Smoothed frames per second.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Reset the clock to the current time.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_frames() {
        let mut clock = FrameClock::new();
        clock.tick();
        clock.tick();
        assert_eq!(clock.frames(), 2);
    }

    #[test]
    fn test_fps_smoothing() {
        let mut clock = FrameClock::new();
        clock.record(Duration::from_millis(10));
        assert!((clock.fps() - 100.0).abs() < 0.01);

        clock.record(Duration::from_millis(20));
        // 100 + (50 - 100) * 0.1
        assert!((clock.fps() - 95.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_delta_keeps_estimate() {
        let mut clock = FrameClock::new();
        clock.record(Duration::from_millis(10));
        clock.record(Duration::ZERO);
        assert_eq!(clock.frames(), 2);
        assert!((clock.fps() - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_reset() {
        let mut clock = FrameClock::new();
        clock.tick();
        clock.reset();
        assert_eq!(clock.frames(), 0);
        assert_eq!(clock.fps(), 0.0);
    }
}
