//! Real-time playback driver.
//!
//! Runs the sans-IO schedulers from `signmotion-core` on a tokio interval.
//! Each play starts a new run; a run's task only touches the rig or sink and
//! only reports its finish while it is still the current run.

use crate::config::PlaybackConfig;
use parking_lot::Mutex;
use signmotion_core::{
    BoneRig, BoneRotationFrame, LandmarkFrame, LandmarkScheduler, MotionSequence, PoseSink,
    Retargeter, StepScheduler, StepTick, Tick,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub type SharedRig = Arc<Mutex<dyn BoneRig + Send>>;
pub type SharedPoseSink = Arc<Mutex<dyn PoseSink + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Started { run: u64 },
    Finished { run: u64 },
}

#[derive(Clone)]
enum Program {
    Landmarks {
        frames: Vec<LandmarkFrame>,
        sink: SharedPoseSink,
    },
    Bones {
        frames: Vec<BoneRotationFrame>,
        rig: SharedRig,
    },
}

#[derive(Default)]
struct PlayerState {
    run: u64,
    playing: bool,
    program: Option<Program>,
    task: Option<JoinHandle<()>>,
}

/// Scheduler clock; follows tokio's clock so paused-time tests work.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

pub struct AnimationPlayer {
    config: PlaybackConfig,
    retargeter: Retargeter,
    state: Arc<Mutex<PlayerState>>,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl AnimationPlayer {
    pub fn new(config: PlaybackConfig) -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                retargeter: Retargeter::default(),
                state: Arc::new(Mutex::new(PlayerState::default())),
                events,
            },
            rx,
        )
    }

    pub fn with_retargeter(mut self, retargeter: Retargeter) -> Self {
        self.retargeter = retargeter;
        self
    }

    /// Play a landmark sequence into `sink`. Returns `false` for an empty
    /// sequence.
    pub fn play_landmarks(&self, frames: Vec<LandmarkFrame>, sink: SharedPoseSink) -> bool {
        if frames.is_empty() {
            debug!("Ignoring empty landmark sequence");
            return false;
        }
        self.start(Program::Landmarks { frames, sink })
    }

    /// Play a bone-rotation sequence on `rig`. Returns `false` for an empty
    /// sequence.
    pub fn play_bones(&self, frames: Vec<BoneRotationFrame>, rig: SharedRig) -> bool {
        if frames.is_empty() {
            debug!("Ignoring empty bone sequence");
            return false;
        }
        self.start(Program::Bones { frames, rig })
    }

    /// Play either representation. Landmark sequences are retargeted onto
    /// the rig when `retarget_landmarks` is set, otherwise they go to `sink`.
    pub fn play(&self, sequence: MotionSequence, rig: SharedRig, sink: Option<SharedPoseSink>) -> bool {
        match sequence {
            MotionSequence::BoneRotations(frames) => self.play_bones(frames, rig),
            MotionSequence::Landmarks(frames) if self.config.retarget_landmarks => {
                let bones = self.retargeter.sequence_to_bones(&frames);
                self.play_bones(bones, rig)
            }
            MotionSequence::Landmarks(frames) => match sink {
                Some(sink) => self.play_landmarks(frames, sink),
                None => {
                    warn!("No pose sink for landmark playback");
                    false
                }
            },
        }
    }

    /// Stop the current run. Landmark playback returns to its first frame.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.run += 1;
        state.playing = false;
        if let Some(task) = state.task.take() {
            task.abort();
        }
        if let Some(Program::Landmarks { frames, sink }) = &state.program {
            if let Some(rest) = frames.first() {
                sink.lock().present(rest);
            }
        }
    }

    /// Restart the last program from frame 0.
    pub fn replay(&self) -> bool {
        let program = self.state.lock().program.clone();
        self.stop();
        match program {
            Some(program) => self.start(program),
            None => false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn current_run(&self) -> u64 {
        self.state.lock().run
    }

    fn start(&self, program: Program) -> bool {
        let mut state = self.state.lock();
        state.run += 1;
        if let Some(task) = state.task.take() {
            task.abort();
        }

        let run = Run {
            id: state.run,
            state: Arc::clone(&self.state),
            events: self.events.clone(),
        };
        let interval = self.config.tick_interval();
        let task = match program.clone() {
            Program::Landmarks { frames, sink } => {
                let scheduler = LandmarkScheduler::new(frames).with_min_total(self.config.min_total_ms);
                tokio::spawn(run.landmarks(scheduler, sink, interval))
            }
            Program::Bones { frames, rig } => tokio::spawn(run.bones(StepScheduler::new(frames), rig, interval)),
        };

        state.program = Some(program);
        state.playing = true;
        state.task = Some(task);
        let _ = self.events.send(PlayerEvent::Started { run: state.run });
        info!("Playback run {} started", state.run);
        true
    }
}

impl Drop for AnimationPlayer {
    fn drop(&mut self) {
        if let Some(task) = self.state.lock().task.take() {
            task.abort();
        }
    }
}

/// Handle a playback task holds for its own run.
struct Run {
    id: u64,
    state: Arc<Mutex<PlayerState>>,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl Run {
    fn ticker(interval: Duration) -> tokio::time::Interval {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Run `f` while holding the player lock, only if this run is current.
    fn if_current(&self, f: impl FnOnce(&mut PlayerState)) -> bool {
        let mut state = self.state.lock();
        if state.run != self.id {
            return false;
        }
        f(&mut state);
        true
    }

    fn finish(&self) {
        self.if_current(|state| {
            state.playing = false;
            state.task = None;
            let _ = self.events.send(PlayerEvent::Finished { run: self.id });
            debug!("Playback run {} finished", self.id);
        });
    }

    async fn landmarks(self, mut scheduler: LandmarkScheduler, sink: SharedPoseSink, interval: Duration) {
        let mut ticker = Self::ticker(interval);
        scheduler.set_playing(true, now());

        loop {
            ticker.tick().await;
            let tick = scheduler.tick(now());
            let (frame, finished) = match tick {
                Tick::Frame(frame) => (frame, false),
                Tick::Finished(frame) => (frame, true),
                Tick::Inactive => return,
            };

            if !self.if_current(|_| sink.lock().present(&frame)) {
                return;
            }
            if finished {
                self.finish();
                return;
            }
        }
    }

    async fn bones(self, mut scheduler: StepScheduler, rig: SharedRig, interval: Duration) {
        let mut ticker = Self::ticker(interval);
        let mut first = true;

        loop {
            ticker.tick().await;
            let mut outcome = StepTick::Inactive;
            let current = self.if_current(|_| {
                let mut rig = rig.lock();
                outcome = if first {
                    scheduler.start(now(), &mut *rig)
                } else {
                    scheduler.tick(now(), &mut *rig)
                };
            });
            first = false;

            if !current {
                return;
            }
            match outcome {
                StepTick::Advanced { .. } => {}
                StepTick::Finished => {
                    self.finish();
                    return;
                }
                StepTick::Inactive => return,
            }
        }
    }
}
