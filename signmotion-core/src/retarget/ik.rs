//! Inverse-kinematics arm and hand solve.
//!
//! Landmarks are moved into rig space (x toward the subject's left, y up, z
//! toward the camera). In rig space the rest pose is a T-pose: the left arm
//! points along +X and the right arm along -X. Each bone's rotation is the
//! shortest arc from its rest direction to the observed direction, expressed
//! in its parent's frame, and returned as XYZ-order Euler angles.

use super::{ArmSolver, LimbRotations};
use crate::error::{Error, Result};
use crate::frame::{EulerRotation, Vec3};
use crate::landmarks::{hand, Side};
use nalgebra::{Matrix3, Rotation3, Unit, UnitQuaternion, Vector3};
use std::f64::consts::PI;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct IkSolver {
    /// Scale applied to landmark depth before solving. MediaPipe depth is
    /// noisier than x/y, so it is damped by default.
    pub depth_scale: f64,
}

impl Default for IkSolver {
    fn default() -> Self {
        Self { depth_scale: 0.5 }
    }
}

impl IkSolver {
    pub fn new(depth_scale: f64) -> Self {
        Self { depth_scale }
    }

    fn to_rig_space(&self, point: Vec3) -> Result<Vector3<f64>> {
        if !point.is_finite() {
            return Err(Error::InvalidFrame("non-finite landmark".to_string()));
        }
        Ok(Vector3::new(point.x, -point.y, -point.z * self.depth_scale))
    }

    fn segment(&self, from: Vec3, to: Vec3, label: &str) -> Result<Unit<Vector3<f64>>> {
        let v = self.to_rig_space(to)? - self.to_rig_space(from)?;
        Unit::try_new(v, EPSILON).ok_or_else(|| Error::Solve(format!("degenerate {} segment", label)))
    }
}

fn rest_direction(side: Side) -> Unit<Vector3<f64>> {
    Unit::new_normalize(Vector3::new(side.sign(), 0.0, 0.0))
}

/// Shortest-arc rotation between two unit vectors, including the antiparallel
/// case that `rotation_between` leaves undefined.
fn arc(from: &Unit<Vector3<f64>>, to: &Unit<Vector3<f64>>) -> UnitQuaternion<f64> {
    UnitQuaternion::rotation_between_axis(from, to)
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI))
}

/// XYZ-order Euler angles (`R = Rx · Ry · Rz`), the default order of
/// three.js-style scene graphs.
pub fn euler_xyz(rotation: &UnitQuaternion<f64>) -> EulerRotation {
    let m = rotation.to_rotation_matrix();
    let m = m.matrix();
    let m13 = m[(0, 2)].clamp(-1.0, 1.0);
    let y = m13.asin();
    let (x, z) = if m13.abs() < 0.999_999_9 {
        ((-m[(1, 2)]).atan2(m[(2, 2)]), (-m[(0, 1)]).atan2(m[(0, 0)]))
    } else {
        (m[(2, 1)].atan2(m[(1, 1)]), 0.0)
    };
    EulerRotation::new(x, y, z)
}

fn finite(rotation: EulerRotation, label: &str) -> Result<EulerRotation> {
    if rotation.is_finite() {
        Ok(rotation)
    } else {
        Err(Error::Solve(format!("non-finite {} rotation", label)))
    }
}

/// Orthonormal palm basis from a forward (wrist → knuckles) and an across
/// (pinky → index) direction. Columns are forward, palm normal, across.
fn palm_basis(forward: Vector3<f64>, across: Vector3<f64>) -> Option<Rotation3<f64>> {
    let forward = forward.try_normalize(EPSILON)?;
    let normal = forward.cross(&across).try_normalize(EPSILON)?;
    let across = normal.cross(&forward);
    Some(Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[forward, normal, across])))
}

impl ArmSolver for IkSolver {
    fn name(&self) -> &'static str {
        "ik"
    }

    fn solve_arm(&self, pose: &[Vec3], side: Side) -> Result<LimbRotations> {
        let (shoulder_idx, elbow_idx, wrist_idx) = side.arm_indices();
        let (pinky_idx, index_idx) = side.hand_indices();
        let point = |idx: usize| {
            pose.get(idx)
                .copied()
                .ok_or_else(|| Error::InvalidFrame(format!("pose has {} points", pose.len())))
        };
        let (shoulder, elbow, wrist) = (point(shoulder_idx)?, point(elbow_idx)?, point(wrist_idx)?);

        let rest = rest_direction(side);

        let upper_dir = self.segment(shoulder, elbow, "upper arm")?;
        let upper_q = arc(&rest, &upper_dir);

        // Forearm is solved in the upper arm's frame.
        let lower_world = self.segment(elbow, wrist, "forearm")?;
        let lower_local = Unit::new_normalize(upper_q.inverse_transform_vector(&lower_world));
        let lower_q = arc(&rest, &lower_local);

        // Hand aims at the knuckle midpoint when the pose carries hand points;
        // otherwise it stays aligned with the forearm.
        let hand_q = match (pose.get(pinky_idx), pose.get(index_idx)) {
            (Some(&pinky), Some(&index)) => {
                let knuckles = Vec3::new(
                    (pinky.x + index.x) / 2.0,
                    (pinky.y + index.y) / 2.0,
                    (pinky.z + index.z) / 2.0,
                );
                match self.segment(wrist, knuckles, "hand") {
                    Ok(hand_world) => {
                        let parent = upper_q * lower_q;
                        let hand_local = Unit::new_normalize(parent.inverse_transform_vector(&hand_world));
                        arc(&rest, &hand_local)
                    }
                    Err(_) => UnitQuaternion::identity(),
                }
            }
            _ => UnitQuaternion::identity(),
        };

        Ok(LimbRotations {
            upper: finite(euler_xyz(&upper_q), "upper arm")?,
            lower: finite(euler_xyz(&lower_q), "forearm")?,
            hand: finite(euler_xyz(&hand_q), "hand")?,
        })
    }

    fn solve_hand(&self, points: &[Vec3], side: Side) -> Result<Option<EulerRotation>> {
        let point = |idx: usize| {
            points
                .get(idx)
                .copied()
                .ok_or_else(|| Error::InvalidFrame(format!("hand has {} points", points.len())))
                .and_then(|p| self.to_rig_space(p))
        };
        let wrist = point(hand::WRIST)?;
        let index = point(hand::INDEX_MCP)?;
        let middle = point(hand::MIDDLE_MCP)?;
        let pinky = point(hand::PINKY_MCP)?;

        let observed = palm_basis(middle - wrist, index - pinky)
            .ok_or_else(|| Error::Solve(format!("degenerate {} palm", side.as_str())))?;
        let rest = palm_basis(Vector3::new(side.sign(), 0.0, 0.0), Vector3::z())
            .ok_or_else(|| Error::Solve("degenerate rest palm".to_string()))?;

        let rotation = UnitQuaternion::from_rotation_matrix(&(observed * rest.inverse()));
        finite(euler_xyz(&rotation), "hand").map(Some)
    }
}
