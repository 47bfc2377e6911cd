//! Playback scheduling.
//!
//! Both schedulers are plain state machines driven by caller-supplied
//! instants. They own no timers; an async driver ticks them and cancels its
//! own timer on stop.

pub mod interpolate;
pub mod scheduler;
pub mod sink;
pub mod steps;

pub use interpolate::{interpolate_frames, locate, sample, Located};
pub use scheduler::{LandmarkScheduler, Tick, MIN_TOTAL_MS};
pub use sink::{BoneHandle, BoneRig, MemoryBone, MemoryRig, PoseSink};
pub use steps::{ease_out_quad, StepScheduler, StepTick, Tween};

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Finished,
}

/// Milliseconds from `start` to `now`, zero if `now` is earlier.
pub(crate) fn elapsed_ms(start: Instant, now: Instant) -> f64 {
    now.saturating_duration_since(start).as_nanos() as f64 / 1_000_000.0
}
