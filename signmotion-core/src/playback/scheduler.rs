//! Wall-clock scheduler for landmark sequences.

use super::interpolate::sample;
use super::{elapsed_ms, PlaybackState};
use crate::frame::LandmarkFrame;
use std::time::Instant;
use tracing::debug;

/// Shortest total playback time; single-frame and very short sequences are
/// held at least this long.
pub const MIN_TOTAL_MS: f64 = 500.0;

/// Outcome of a scheduler tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Not playing; nothing to render. Stale ticks land here.
    Inactive,
    /// Interpolated frame to render.
    Frame(LandmarkFrame),
    /// Final frame. Reported exactly once per run.
    Finished(LandmarkFrame),
}

#[derive(Debug, Clone)]
pub struct LandmarkScheduler {
    frames: Vec<LandmarkFrame>,
    min_total_ms: f64,
    state: PlaybackState,
    start: Option<Instant>,
}

impl LandmarkScheduler {
    pub fn new(frames: Vec<LandmarkFrame>) -> Self {
        Self {
            frames,
            min_total_ms: MIN_TOTAL_MS,
            state: PlaybackState::Idle,
            start: None,
        }
    }

    pub fn with_min_total(mut self, min_total_ms: f64) -> Self {
        self.min_total_ms = min_total_ms.max(0.0);
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn frames(&self) -> &[LandmarkFrame] {
        &self.frames
    }

    /// Run length: the last timestamp, but never shorter than the minimum.
    pub fn total_ms(&self) -> f64 {
        self.frames
            .last()
            .map(|f| f.timestamp_ms)
            .unwrap_or(0.0)
            .max(self.min_total_ms)
    }

    /// Resting pose shown while idle.
    pub fn rest_frame(&self) -> Option<&LandmarkFrame> {
        self.frames.first()
    }

    /// Start or stop playback. Returns `true` when the state changed.
    ///
    /// Starting from Idle or Finished restarts at frame 0; starting while
    /// already playing is a no-op. An empty sequence never plays.
    pub fn set_playing(&mut self, playing: bool, now: Instant) -> bool {
        match (playing, self.state) {
            (true, PlaybackState::Playing) => false,
            (true, _) => {
                if self.frames.is_empty() {
                    debug!("Ignoring play request for empty landmark sequence");
                    return false;
                }
                self.state = PlaybackState::Playing;
                self.start = Some(now);
                true
            }
            (false, PlaybackState::Playing) => {
                self.state = PlaybackState::Idle;
                self.start = None;
                true
            }
            (false, _) => false,
        }
    }

    pub fn tick(&mut self, now: Instant) -> Tick {
        let (PlaybackState::Playing, Some(start)) = (self.state, self.start) else {
            return Tick::Inactive;
        };
        let elapsed = elapsed_ms(start, now);

        if elapsed >= self.total_ms() {
            let Some(last) = self.frames.last() else {
                self.state = PlaybackState::Idle;
                return Tick::Inactive;
            };
            // Leaving Playing ends the run; later ticks are Inactive.
            let last = last.clone();
            self.state = PlaybackState::Finished;
            self.start = None;
            return Tick::Finished(last);
        }

        match sample(&self.frames, elapsed) {
            Some(frame) => Tick::Frame(frame),
            None => Tick::Inactive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Vec3;
    use std::time::Duration;

    fn seq() -> Vec<LandmarkFrame> {
        vec![
            LandmarkFrame::new(0.0).with_pose(vec![Vec3::new(0.0, 0.0, 0.0)]),
            LandmarkFrame::new(1000.0).with_pose(vec![Vec3::new(1.0, 1.0, 1.0)]),
        ]
    }

    #[test]
    fn test_midpoint_at_half_time() {
        let t0 = Instant::now();
        let mut scheduler = LandmarkScheduler::new(seq());
        assert!(scheduler.set_playing(true, t0));
        match scheduler.tick(t0 + Duration::from_millis(500)) {
            Tick::Frame(frame) => assert_eq!(frame.pose.unwrap()[0], Vec3::new(0.5, 0.5, 0.5)),
            other => panic!("unexpected tick {:?}", other),
        }
    }

    #[test]
    fn test_finishes_once() {
        let t0 = Instant::now();
        let mut scheduler = LandmarkScheduler::new(seq());
        scheduler.set_playing(true, t0);
        assert!(matches!(scheduler.tick(t0 + Duration::from_millis(1000)), Tick::Finished(_)));
        assert_eq!(scheduler.state(), PlaybackState::Finished);
        assert_eq!(scheduler.tick(t0 + Duration::from_millis(1100)), Tick::Inactive);
        assert_eq!(scheduler.tick(t0 + Duration::from_millis(5000)), Tick::Inactive);

        // A fresh run reports its own finish.
        let t1 = t0 + Duration::from_millis(6000);
        assert!(scheduler.set_playing(true, t1));
        assert!(matches!(scheduler.tick(t1 + Duration::from_millis(1000)), Tick::Finished(_)));
        assert_eq!(scheduler.tick(t1 + Duration::from_millis(1001)), Tick::Inactive);
    }

    #[test]
    fn test_single_frame_held_for_minimum() {
        let t0 = Instant::now();
        let mut scheduler = LandmarkScheduler::new(vec![LandmarkFrame::new(0.0)]);
        scheduler.set_playing(true, t0);
        assert!(matches!(scheduler.tick(t0 + Duration::from_millis(499)), Tick::Frame(_)));
        assert!(matches!(scheduler.tick(t0 + Duration::from_millis(500)), Tick::Finished(_)));
    }

    #[test]
    fn test_play_while_playing_is_noop() {
        let t0 = Instant::now();
        let mut scheduler = LandmarkScheduler::new(seq());
        scheduler.set_playing(true, t0);
        assert!(!scheduler.set_playing(true, t0 + Duration::from_millis(400)));
        // Still timed from the original start.
        assert!(matches!(scheduler.tick(t0 + Duration::from_millis(1000)), Tick::Finished(_)));
    }

    #[test]
    fn test_stop_then_restart_from_zero() {
        let t0 = Instant::now();
        let mut scheduler = LandmarkScheduler::new(seq());
        scheduler.set_playing(true, t0);
        scheduler.tick(t0 + Duration::from_millis(800));
        assert!(scheduler.set_playing(false, t0 + Duration::from_millis(800)));
        assert_eq!(scheduler.tick(t0 + Duration::from_millis(900)), Tick::Inactive);
        assert_eq!(scheduler.rest_frame().map(|f| f.timestamp_ms), Some(0.0));

        let t1 = t0 + Duration::from_millis(900);
        scheduler.set_playing(true, t1);
        match scheduler.tick(t1) {
            Tick::Frame(frame) => assert_eq!(frame.pose.unwrap()[0], Vec3::new(0.0, 0.0, 0.0)),
            other => panic!("unexpected tick {:?}", other),
        }
    }

    #[test]
    fn test_empty_sequence_never_plays() {
        let mut scheduler = LandmarkScheduler::new(Vec::new());
        assert!(!scheduler.set_playing(true, Instant::now()));
        assert_eq!(scheduler.state(), PlaybackState::Idle);
        assert_eq!(scheduler.tick(Instant::now()), Tick::Inactive);
    }
}
