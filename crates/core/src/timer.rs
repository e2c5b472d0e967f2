//! High-resolution timer and fixed-step accumulator.

use std::time::{Duration, Instant};

/// Measures the time between frames.
#[derive(Debug)]
pub struct Timer {
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        Self {
            last_tick: Instant::now(),
        }
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        self.last_tick = Instant::now();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates frame time and hands out fixed-length update ticks.
///
/// Frame time is clamped to `max_frame` so a long stall (window drag,
/// breakpoint) does not trigger a burst of catch-up ticks.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: Duration,
    max_frame: Duration,
    accumulator: Duration,
}

impl FixedTimestep {
    /// Create an accumulator ticking `hz` times per second.
    ///
    /// `hz` of zero is treated as one.
    pub fn new(hz: u32) -> Self {
        let step = Duration::from_secs_f64(1.0 / f64::from(hz.max(1)));
        Self {
            step,
            max_frame: Duration::from_millis(250),
            accumulator: Duration::ZERO,
        }
    }

    /// Length of one tick.
    #[inline]
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Add frame time and return how many fixed ticks are now due.
    pub fn advance(&mut self, frame_time: Duration) -> u32 {
        self.accumulator += frame_time.min(self.max_frame);
        let mut ticks = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            ticks += 1;
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_timestep_counts_whole_ticks() {
        let mut fixed = FixedTimestep::new(50);
        assert_eq!(fixed.step(), Duration::from_millis(20));

        assert_eq!(fixed.advance(Duration::from_millis(10)), 0);
        assert_eq!(fixed.advance(Duration::from_millis(10)), 1);
        assert_eq!(fixed.advance(Duration::from_millis(45)), 2);
        // 5ms carried over
        assert_eq!(fixed.advance(Duration::from_millis(15)), 1);
    }

    #[test]
    fn test_fixed_timestep_clamps_long_frames() {
        let mut fixed = FixedTimestep::new(100);
        // 250ms clamp at 10ms per tick
        assert_eq!(fixed.advance(Duration::from_secs(10)), 25);
    }

    #[test]
    fn test_fixed_timestep_zero_hz() {
        let fixed = FixedTimestep::new(0);
        assert_eq!(fixed.step(), Duration::from_secs(1));
    }
}
