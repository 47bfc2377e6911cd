//! Direction-vector retargeting.
//!
//! Each bone is aimed along the normalized vector between its two joints.
//! Avatar forward is -Z and up is +Y, so `yaw = atan2(x, -z)` and
//! `pitch = asin(y)`. Roll is always zero: this is an approximation of the
//! bind pose, not an exact mapping.

use super::{ArmSolver, LimbRotations};
use crate::error::{Error, Result};
use crate::frame::{EulerRotation, Vec3};
use crate::landmarks::Side;

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectionSolver;

impl DirectionSolver {
    /// Euler angles (`x` = pitch, `y` = yaw, `z` = 0) for a direction.
    pub fn direction_to_euler(direction: Vec3) -> EulerRotation {
        let yaw = direction.x.atan2(-direction.z);
        let pitch = direction.y.clamp(-1.0, 1.0).asin();
        EulerRotation::new(pitch, yaw, 0.0)
    }
}

impl ArmSolver for DirectionSolver {
    fn name(&self) -> &'static str {
        "direction"
    }

    fn solve_arm(&self, pose: &[Vec3], side: Side) -> Result<LimbRotations> {
        let (shoulder, elbow, wrist) = side.arm_indices();
        let (Some(&shoulder), Some(&elbow), Some(&wrist)) = (pose.get(shoulder), pose.get(elbow), pose.get(wrist)) else {
            return Err(Error::InvalidFrame(format!("pose has {} points", pose.len())));
        };

        let upper = Self::direction_to_euler(elbow.sub(shoulder).normalize());
        let lower = Self::direction_to_euler(wrist.sub(elbow).normalize());

        // Hands follow the forearm.
        Ok(LimbRotations { upper, lower, hand: lower })
    }
}
