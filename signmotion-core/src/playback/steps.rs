//! Step scheduler for bone-rotation sequences.
//!
//! Each frame becomes a step that starts at the sum of all earlier durations.
//! Firing a step starts one tween per bone, from the bone's current rotation to
//! the step's target over the step's duration.

use super::sink::BoneRig;
use super::{elapsed_ms, PlaybackState};
use crate::frame::{BoneRotationFrame, EulerRotation};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// `power2.out` easing.
pub fn ease_out_quad(p: f64) -> f64 {
    let p = p.clamp(0.0, 1.0);
    1.0 - (1.0 - p) * (1.0 - p)
}

/// A single bone's transition toward a target rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Tween {
    pub from: EulerRotation,
    pub to: EulerRotation,
    pub start_ms: f64,
    pub duration_ms: f64,
}

impl Tween {
    pub fn progress(&self, elapsed_ms: f64) -> f64 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        ((elapsed_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0)
    }

    pub fn value_at(&self, elapsed_ms: f64) -> EulerRotation {
        let p = self.progress(elapsed_ms);
        if p >= 1.0 {
            return self.to;
        }
        self.from.lerp(self.to, ease_out_quad(p))
    }

    pub fn is_done(&self, elapsed_ms: f64) -> bool {
        self.progress(elapsed_ms) >= 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTick {
    Inactive,
    /// Still playing; `fired` steps started during this tick.
    Advanced { fired: usize },
    /// All steps reached. Reported exactly once per run.
    Finished,
}

#[derive(Debug, Clone)]
pub struct StepScheduler {
    frames: Vec<BoneRotationFrame>,
    step_starts: Vec<f64>,
    finish_at: f64,
    next_step: usize,
    tweens: BTreeMap<String, Tween>,
    start: Option<Instant>,
    state: PlaybackState,
}

impl StepScheduler {
    pub fn new(frames: Vec<BoneRotationFrame>) -> Self {
        let mut step_starts = Vec::with_capacity(frames.len());
        let mut cursor = 0.0;
        for frame in &frames {
            step_starts.push(cursor);
            cursor += frame.duration_ms.max(0.0);
        }

        Self {
            frames,
            step_starts,
            finish_at: cursor,
            next_step: 0,
            tweens: BTreeMap::new(),
            start: None,
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn step_starts(&self) -> &[f64] {
        &self.step_starts
    }

    pub fn finish_at_ms(&self) -> f64 {
        self.finish_at
    }

    /// Index of the next step to fire.
    pub fn step_index(&self) -> usize {
        self.next_step
    }

    pub fn active_tweens(&self) -> usize {
        self.tweens.len()
    }

    /// Begin a run from step 0. Any tweens left from a previous run are
    /// dropped before the first step fires.
    pub fn start(&mut self, now: Instant, rig: &mut dyn BoneRig) -> StepTick {
        self.tweens.clear();
        self.next_step = 0;
        if self.frames.is_empty() {
            debug!("Ignoring play request for empty bone sequence");
            self.state = PlaybackState::Idle;
            self.start = None;
            return StepTick::Inactive;
        }
        self.state = PlaybackState::Playing;
        self.start = Some(now);
        self.tick(now, rig)
    }

    pub fn stop(&mut self) {
        self.tweens.clear();
        self.start = None;
        self.state = PlaybackState::Idle;
    }

    /// When the next step is due, or the finish time once all steps fired.
    pub fn next_deadline(&self) -> Option<Instant> {
        let start = self.start?;
        if self.state != PlaybackState::Playing {
            return None;
        }
        let at_ms = self
            .step_starts
            .get(self.next_step)
            .copied()
            .unwrap_or(self.finish_at);
        Some(start + Duration::from_nanos((at_ms * 1_000_000.0).round() as u64))
    }

    pub fn tick(&mut self, now: Instant, rig: &mut dyn BoneRig) -> StepTick {
        let (PlaybackState::Playing, Some(start)) = (self.state, self.start) else {
            return StepTick::Inactive;
        };
        let elapsed = elapsed_ms(start, now);
        let finished = elapsed >= self.finish_at;

        // Running tweens settle first so a newly fired step eases from where
        // the bone actually is at this instant.
        self.advance(elapsed, rig);

        let mut fired = 0;
        while self.next_step < self.frames.len()
            && (finished || self.step_starts[self.next_step] <= elapsed)
        {
            self.fire(self.next_step, rig);
            self.next_step += 1;
            fired += 1;
        }

        if finished {
            for (name, tween) in std::mem::take(&mut self.tweens) {
                if let Some(bone) = rig.bone_by_name(&name) {
                    bone.set_rotation(tween.to);
                }
            }
            self.state = PlaybackState::Finished;
            self.start = None;
            debug!("Bone sequence finished after {} steps", self.frames.len());
            return StepTick::Finished;
        }

        if fired > 0 {
            self.advance(elapsed, rig);
        }
        StepTick::Advanced { fired }
    }

    fn fire(&mut self, step: usize, rig: &mut dyn BoneRig) {
        let frame = &self.frames[step];
        let start_ms = self.step_starts[step];
        for (name, target) in &frame.bone_rotations {
            let Some(bone) = rig.bone_by_name(name) else {
                trace!("Bone '{}' not found in rig, skipping", name);
                continue;
            };
            // A newer step replaces whatever tween the bone was running.
            self.tweens.insert(
                name.clone(),
                Tween {
                    from: bone.rotation(),
                    to: *target,
                    start_ms,
                    duration_ms: frame.duration_ms.max(0.0),
                },
            );
        }
    }

    fn advance(&mut self, elapsed: f64, rig: &mut dyn BoneRig) {
        self.tweens.retain(|name, tween| {
            if let Some(bone) = rig.bone_by_name(name) {
                bone.set_rotation(tween.value_at(elapsed));
            }
            !tween.is_done(elapsed)
        });
    }
}
