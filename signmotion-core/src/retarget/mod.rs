//! Landmark → bone-rotation retargeting.
//!
//! A [`Retargeter`] pairs an [`ArmSolver`] with a [`BoneMap`]. The default
//! retargeter uses the [`IkSolver`] and falls back to the [`DirectionSolver`]
//! per limb when the IK solve fails.

pub mod bone_map;
pub mod direction;
pub mod ik;

pub use bone_map::{BoneMap, RigBone};
pub use direction::DirectionSolver;
pub use ik::IkSolver;

use crate::error::Result;
use crate::frame::{BoneRotationFrame, EulerRotation, LandmarkFrame, Vec3};
use crate::landmarks::Side;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Lower bound on a step duration derived from timestamp deltas.
pub const MIN_STEP_MS: f64 = 30.0;

/// Duration given to the last frame of a multi-frame sequence.
pub const TRAILING_STEP_MS: f64 = 300.0;

/// Duration given to a single-frame sequence so it is visibly held.
pub const SINGLE_FRAME_HOLD_MS: f64 = 500.0;

/// Rotations solved for one arm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimbRotations {
    pub upper: EulerRotation,
    pub lower: EulerRotation,
    pub hand: EulerRotation,
}

/// Solves arm (and optionally hand) rotations from landmarks.
pub trait ArmSolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Solve one arm from a pose with at least 25 points.
    fn solve_arm(&self, pose: &[Vec3], side: Side) -> Result<LimbRotations>;

    /// Solve the hand bone from a 21-point hand. `Ok(None)` means the solver
    /// has nothing finer than the pose-derived rotation.
    fn solve_hand(&self, _hand: &[Vec3], _side: Side) -> Result<Option<EulerRotation>> {
        Ok(None)
    }
}

/// Retargeting method selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetargetMethod {
    #[default]
    Ik,
    Direction,
}

pub struct Retargeter {
    solver: Box<dyn ArmSolver>,
    fallback: Option<DirectionSolver>,
    bone_map: BoneMap,
}

impl Retargeter {
    pub fn new(solver: Box<dyn ArmSolver>, bone_map: BoneMap) -> Self {
        Self {
            solver,
            fallback: None,
            bone_map,
        }
    }

    /// IK solve with per-limb direction fallback.
    pub fn ik(bone_map: BoneMap) -> Self {
        Self {
            solver: Box::new(IkSolver::default()),
            fallback: Some(DirectionSolver),
            bone_map,
        }
    }

    pub fn direction(bone_map: BoneMap) -> Self {
        Self::new(Box::new(DirectionSolver), bone_map)
    }

    pub fn for_method(method: RetargetMethod, bone_map: BoneMap) -> Self {
        match method {
            RetargetMethod::Ik => Self::ik(bone_map),
            RetargetMethod::Direction => Self::direction(bone_map),
        }
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    pub fn bone_map(&self) -> &BoneMap {
        &self.bone_map
    }

    /// Convert one frame. Duration is always 0; the sequence converter fills
    /// it in. Frames without a usable pose produce no arm rotations.
    pub fn frame_to_bones(&self, frame: &LandmarkFrame) -> BoneRotationFrame {
        let mut rotations = BTreeMap::new();

        match frame.valid_pose() {
            Some(pose) => {
                for side in Side::BOTH {
                    if let Some(limb) = self.solve_limb(pose, side) {
                        self.insert(&mut rotations, RigBone::upper_arm(side), limb.upper);
                        self.insert(&mut rotations, RigBone::lower_arm(side), limb.lower);
                        self.insert(&mut rotations, RigBone::hand(side), limb.hand);
                    }
                }
            }
            None => {
                if let Some(pose) = &frame.pose {
                    trace!("Pose at {}ms has {} points, skipping arm solve", frame.timestamp_ms, pose.len());
                }
            }
        }

        // Hand-specific solve overrides the pose-derived hand when it succeeds.
        for side in Side::BOTH {
            let hand = match side {
                Side::Left => frame.valid_left_hand(),
                Side::Right => frame.valid_right_hand(),
            };
            let Some(hand) = hand else { continue };
            match self.solver.solve_hand(hand, side) {
                Ok(Some(rotation)) => self.insert(&mut rotations, RigBone::hand(side), rotation),
                Ok(None) => {}
                Err(e) => debug!("{} hand solve failed at {}ms: {}", side.as_str(), frame.timestamp_ms, e),
            }
        }

        BoneRotationFrame::pose(rotations)
    }

    /// Convert a sequence, deriving each step's duration from the timestamp
    /// delta to the next frame.
    pub fn sequence_to_bones(&self, sequence: &[LandmarkFrame]) -> Vec<BoneRotationFrame> {
        match sequence {
            [] => Vec::new(),
            [single] => vec![self.frame_to_bones(single).with_duration(SINGLE_FRAME_HOLD_MS)],
            frames => frames
                .iter()
                .enumerate()
                .map(|(i, frame)| {
                    let duration = match frames.get(i + 1) {
                        Some(next) => step_duration(frame.timestamp_ms, next.timestamp_ms),
                        None => TRAILING_STEP_MS,
                    };
                    self.frame_to_bones(frame).with_duration(duration)
                })
                .collect(),
        }
    }

    fn solve_limb(&self, pose: &[Vec3], side: Side) -> Option<LimbRotations> {
        match self.solver.solve_arm(pose, side) {
            Ok(limb) => Some(limb),
            Err(e) => {
                debug!("{} {} arm solve failed: {}", self.solver.name(), side.as_str(), e);
                let fallback = self.fallback.as_ref()?;
                fallback.solve_arm(pose, side).ok()
            }
        }
    }

    fn insert(&self, rotations: &mut BTreeMap<String, EulerRotation>, bone: RigBone, rotation: EulerRotation) {
        if let Some(name) = self.bone_map.target(bone) {
            rotations.insert(name.to_string(), rotation);
        }
    }
}

impl Default for Retargeter {
    fn default() -> Self {
        Self::ik(BoneMap::default())
    }
}

impl std::fmt::Debug for Retargeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retargeter")
            .field("solver", &self.solver.name())
            .field("fallback", &self.fallback.is_some())
            .field("bone_map", &self.bone_map)
            .finish()
    }
}

fn step_duration(current_ms: f64, next_ms: f64) -> f64 {
    let delta = next_ms - current_ms;
    // NaN deltas fall through to the floor as well.
    if delta > MIN_STEP_MS {
        delta
    } else {
        MIN_STEP_MS
    }
}

/// Convert one frame with the default retargeter.
pub fn frame_to_bones(frame: &LandmarkFrame) -> BoneRotationFrame {
    Retargeter::default().frame_to_bones(frame)
}

/// Convert a sequence with the default retargeter.
pub fn sequence_to_bones(sequence: &[LandmarkFrame]) -> Vec<BoneRotationFrame> {
    Retargeter::default().sequence_to_bones(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::landmarks::pose;

    /// A neutral standing pose with both arms in T-pose.
    fn t_pose() -> Vec<Vec3> {
        let mut points = vec![Vec3::new(0.5, 0.5, 0.0); 33];
        points[pose::LEFT_SHOULDER] = Vec3::new(0.6, 0.3, 0.0);
        points[pose::LEFT_ELBOW] = Vec3::new(0.7, 0.3, 0.0);
        points[pose::LEFT_WRIST] = Vec3::new(0.8, 0.3, 0.0);
        points[pose::LEFT_PINKY] = Vec3::new(0.85, 0.3, -0.01);
        points[pose::LEFT_INDEX] = Vec3::new(0.85, 0.3, 0.01);
        points[pose::RIGHT_SHOULDER] = Vec3::new(0.4, 0.3, 0.0);
        points[pose::RIGHT_ELBOW] = Vec3::new(0.3, 0.3, 0.0);
        points[pose::RIGHT_WRIST] = Vec3::new(0.2, 0.3, 0.0);
        points[pose::RIGHT_PINKY] = Vec3::new(0.15, 0.3, -0.01);
        points[pose::RIGHT_INDEX] = Vec3::new(0.15, 0.3, 0.01);
        points
    }

    struct FailingSolver;

    impl ArmSolver for FailingSolver {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn solve_arm(&self, _pose: &[Vec3], _side: Side) -> Result<LimbRotations> {
            Err(Error::Solve("unavailable".to_string()))
        }

        fn solve_hand(&self, _hand: &[Vec3], _side: Side) -> Result<Option<EulerRotation>> {
            Err(Error::Solve("unavailable".to_string()))
        }
    }

    #[test]
    fn test_short_pose_yields_empty_rotations() {
        let frame = LandmarkFrame::new(0.0).with_pose(vec![Vec3::default(); 24]);
        let bones = frame_to_bones(&frame);
        assert!(bones.is_empty());
        assert_eq!(bones.duration_ms, 0.0);
    }

    #[test]
    fn test_valid_pose_fills_all_mapped_bones() {
        let frame = LandmarkFrame::new(0.0).with_pose(t_pose());
        let bones = frame_to_bones(&frame);
        for name in ["RightArm", "LeftArm", "RightForeArm", "LeftForeArm", "RightHand", "LeftHand"] {
            assert!(bones.bone_rotations.contains_key(name), "missing {}", name);
        }
        assert_eq!(bones.kind.as_deref(), Some("pose"));
    }

    #[test]
    fn test_solver_failure_without_fallback_drops_limb() {
        let retargeter = Retargeter::new(Box::new(FailingSolver), BoneMap::default());
        let frame = LandmarkFrame::new(0.0).with_pose(t_pose());
        assert!(retargeter.frame_to_bones(&frame).is_empty());
    }

    #[test]
    fn test_hand_solve_failure_keeps_pose_hand() {
        let retargeter = Retargeter {
            solver: Box::new(FailingSolver),
            fallback: Some(DirectionSolver),
            bone_map: BoneMap::default(),
        };
        let frame = LandmarkFrame::new(0.0)
            .with_pose(t_pose())
            .with_hands(Some(vec![Vec3::default(); 21]), None);
        let bones = retargeter.frame_to_bones(&frame);
        let expected = DirectionSolver.solve_arm(&t_pose(), Side::Left).unwrap();
        assert_eq!(bones.bone_rotations["LeftHand"], expected.hand);
    }

    #[test]
    fn test_unmapped_bones_are_dropped() {
        let map = BoneMap::from_pairs([(RigBone::RightUpperArm, "R_Upper")]);
        let retargeter = Retargeter::ik(map);
        let bones = retargeter.frame_to_bones(&LandmarkFrame::new(0.0).with_pose(t_pose()));
        assert_eq!(bones.bone_rotations.len(), 1);
        assert!(bones.bone_rotations.contains_key("R_Upper"));
    }

    #[test]
    fn test_sequence_durations() {
        let frames = vec![
            LandmarkFrame::new(0.0).with_pose(t_pose()),
            LandmarkFrame::new(400.0).with_pose(t_pose()),
        ];
        let bones = sequence_to_bones(&frames);
        let durations: Vec<f64> = bones.iter().map(|b| b.duration_ms).collect();
        assert_eq!(durations, vec![400.0, 300.0]);
    }

    #[test]
    fn test_sequence_duration_floor() {
        let frames = vec![
            LandmarkFrame::new(100.0),
            LandmarkFrame::new(100.0),
            LandmarkFrame::new(50.0),
            LandmarkFrame::new(60.0),
        ];
        let bones = sequence_to_bones(&frames);
        let durations: Vec<f64> = bones.iter().map(|b| b.duration_ms).collect();
        assert_eq!(durations, vec![30.0, 30.0, 30.0, 300.0]);
    }

    #[test]
    fn test_single_frame_is_held() {
        let bones = sequence_to_bones(&[LandmarkFrame::new(0.0).with_pose(t_pose())]);
        assert_eq!(bones.len(), 1);
        assert_eq!(bones[0].duration_ms, SINGLE_FRAME_HOLD_MS);
    }

    #[test]
    fn test_empty_sequence() {
        assert!(sequence_to_bones(&[]).is_empty());
    }
}
