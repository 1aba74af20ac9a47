//! Per-frame timing metrics.

use murmuration_core::FrameId;
use murmuration_pool::PoolStats;

/// Number of recent frames folded into the smoothed frame time.
const SMOOTHING_FRAMES: usize = 10;

/// Fixed ring of recent frame deltas, averaged for display.
///
/// The window starts zero-filled, so the average ramps up over the
/// first few frames rather than spiking.
#[derive(Clone, Debug)]
pub struct FrameTimeWindow {
    samples: [f32; SMOOTHING_FRAMES],
    cursor: usize,
}

impl Default for FrameTimeWindow {
    fn default() -> Self {
        Self {
            samples: [0.0; SMOOTHING_FRAMES],
            cursor: 0,
        }
    }
}

impl FrameTimeWindow {
    /// Record one frame delta in seconds.
    pub fn push(&mut self, dt: f32) {
        self.samples[self.cursor] = dt;
        self.cursor = (self.cursor + 1) % SMOOTHING_FRAMES;
    }

    /// Mean of the window, in seconds.
    pub fn average(&self) -> f32 {
        self.samples.iter().sum::<f32>() / SMOOTHING_FRAMES as f32
    }
}

/// Timing and counter data for the most recent frame.
///
/// Durations are in microseconds; the driver fills this after every
/// [`step`](crate::Simulation::step).
#[derive(Clone, Debug, Default)]
pub struct FrameMetrics {
    /// Frame this data describes.
    pub frame: FrameId,
    /// Clamped delta actually integrated, in seconds.
    pub dt: f32,
    /// Raw clock delta before the minimum clamp, in seconds.
    pub raw_dt: f32,
    /// Boid kernel wall time.
    pub update_us: u64,
    /// Hash rebuild wall time.
    pub rebuild_us: u64,
    /// Instance-transform preparation wall time.
    pub transforms_us: u64,
    /// Whole-frame wall time.
    pub total_us: u64,
    /// Ten-frame moving average of `dt`, in seconds.
    pub smoothed_frame_time: f32,
    /// Cumulative pool counters at frame end.
    pub pool: PoolStats,
}
