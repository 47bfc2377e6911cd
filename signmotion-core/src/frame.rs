//! Frame model: landmark frames, bone-rotation frames and motion sequences.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum pose length required by the arm solve (MediaPipe indices 0-24).
pub const MIN_POSE_POINTS: usize = 25;

/// Number of points in a MediaPipe hand.
pub const HAND_POINTS: usize = 21;

/// A normalized landmark. x/y are in [0, 1] image space (y grows downward),
/// z is signed depth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction. A zero vector stays zero.
    pub fn normalize(self) -> Vec3 {
        let len = self.length();
        let len = if len == 0.0 || !len.is_finite() { 1.0 } else { len };
        Vec3::new(self.x / len, self.y / len, self.z / len)
    }

    pub fn lerp(self, other: Vec3, t: f64) -> Vec3 {
        Vec3::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One instant of motion capture.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub timestamp_ms: f64,
    #[serde(default)]
    pub pose: Option<Vec<Vec3>>,
    #[serde(default)]
    pub left_hand: Option<Vec<Vec3>>,
    #[serde(default)]
    pub right_hand: Option<Vec<Vec3>>,
    #[serde(default)]
    pub face: Option<Vec<Vec3>>,
}

impl LandmarkFrame {
    pub fn new(timestamp_ms: f64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }

    pub fn with_pose(mut self, pose: Vec<Vec3>) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn with_hands(mut self, left: Option<Vec<Vec3>>, right: Option<Vec<Vec3>>) -> Self {
        self.left_hand = left;
        self.right_hand = right;
        self
    }

    /// The pose, if it has enough points for the arm solve.
    pub fn valid_pose(&self) -> Option<&[Vec3]> {
        self.pose
            .as_deref()
            .filter(|pose| pose.len() >= MIN_POSE_POINTS)
    }

    pub fn has_valid_pose(&self) -> bool {
        self.valid_pose().is_some()
    }

    pub fn valid_left_hand(&self) -> Option<&[Vec3]> {
        valid_hand(self.left_hand.as_deref())
    }

    pub fn valid_right_hand(&self) -> Option<&[Vec3]> {
        valid_hand(self.right_hand.as_deref())
    }
}

fn valid_hand(hand: Option<&[Vec3]>) -> Option<&[Vec3]> {
    hand.filter(|points| points.len() == HAND_POINTS)
}

/// Euler rotation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerRotation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EulerRotation {
    pub const ZERO: EulerRotation = EulerRotation { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn lerp(self, other: EulerRotation, t: f64) -> EulerRotation {
        EulerRotation::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A named-bone snapshot plus the time it takes to reach it from the
/// previous frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoneRotationFrame {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "boneRotations", default)]
    pub bone_rotations: BTreeMap<String, EulerRotation>,
    #[serde(default)]
    pub duration_ms: f64,
}

impl BoneRotationFrame {
    pub fn pose(bone_rotations: BTreeMap<String, EulerRotation>) -> Self {
        Self {
            kind: Some("pose".to_string()),
            bone_rotations,
            duration_ms: 0.0,
        }
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms.max(0.0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bone_rotations.is_empty()
    }
}

/// Ordered motion data in one of the two supported representations.
///
/// Deserialization picks the representation from the frame shape: frames
/// carrying `timestamp_ms` are landmark frames, frames carrying
/// `boneRotations` are legacy bone-rotation frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MotionSequence {
    Landmarks(Vec<LandmarkFrame>),
    BoneRotations(Vec<BoneRotationFrame>),
}

impl Default for MotionSequence {
    fn default() -> Self {
        MotionSequence::Landmarks(Vec::new())
    }
}

impl MotionSequence {
    /// Parse a sequence from a bare frame array, a `{ "sequence": [...] }`
    /// payload, or a message carrying `motion_sequence`.
    pub fn from_json(input: &str) -> crate::Result<Self> {
        Self::from_value(serde_json::from_str(input)?)
    }

    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        let frames = match value {
            serde_json::Value::Object(mut map) => {
                if let Some(payload) = map.remove("motion_sequence") {
                    return Self::from_value(payload);
                }
                map.remove("sequence")
                    .unwrap_or_else(|| serde_json::Value::Array(Vec::new()))
            }
            other => other,
        };
        Ok(serde_json::from_value(frames)?)
    }

    pub fn len(&self) -> usize {
        match self {
            MotionSequence::Landmarks(frames) => frames.len(),
            MotionSequence::BoneRotations(frames) => frames.len(),
        }
    }

    /// An empty sequence means "no motion data".
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total authored duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        match self {
            MotionSequence::Landmarks(frames) => {
                frames.last().map(|f| f.timestamp_ms).unwrap_or(0.0)
            }
            MotionSequence::BoneRotations(frames) => frames.iter().map(|f| f.duration_ms).sum(),
        }
    }
}

/// Wire wrapper: `motion_sequence: { sequence: [...] }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionPayload {
    #[serde(default)]
    pub sequence: MotionSequence,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_landmark_sequence_detected() {
        let payload: MotionPayload = serde_json::from_value(json!({
            "sequence": [
                {"timestamp_ms": 0, "pose": [{"x": 0.1, "y": 0.2, "z": 0.0}], "left_hand": null},
                {"timestamp_ms": 33, "pose": null}
            ]
        }))
        .unwrap();
        match payload.sequence {
            MotionSequence::Landmarks(frames) => {
                assert_eq!(frames.len(), 2);
                assert_eq!(frames[1].timestamp_ms, 33.0);
                assert!(frames[1].pose.is_none());
            }
            other => panic!("expected landmarks, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_sequence_detected() {
        let sequence: MotionSequence = serde_json::from_value(json!([
            {"boneRotations": {"RightArm": {"x": -0.5, "y": 0.0, "z": 0.2}}, "duration_ms": 400}
        ]))
        .unwrap();
        match sequence {
            MotionSequence::BoneRotations(frames) => {
                assert_eq!(frames[0].duration_ms, 400.0);
                assert_eq!(frames[0].bone_rotations["RightArm"].x, -0.5);
            }
            other => panic!("expected bone rotations, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_payload_is_no_motion() {
        let payload: MotionPayload = serde_json::from_value(json!({})).unwrap();
        assert!(payload.sequence.is_empty());
    }

    #[test]
    fn test_from_json_accepts_wrappers() {
        let bare = MotionSequence::from_json(r#"[{"timestamp_ms": 0}, {"timestamp_ms": 40}]"#).unwrap();
        assert_eq!(bare.len(), 2);

        let wrapped = MotionSequence::from_json(r#"{"sequence": [{"timestamp_ms": 0}]}"#).unwrap();
        assert_eq!(wrapped.len(), 1);

        let message = MotionSequence::from_json(
            r#"{"status": "completed", "motion_sequence": {"sequence": [{"boneRotations": {}, "duration_ms": 0}]}}"#,
        )
        .unwrap();
        assert!(matches!(message, MotionSequence::BoneRotations(_)));

        assert!(MotionSequence::from_json("not json").is_err());
    }

    #[test]
    fn test_hand_validity() {
        let frame = LandmarkFrame::new(0.0).with_hands(
            Some(vec![Vec3::default(); HAND_POINTS]),
            Some(vec![Vec3::default(); 5]),
        );
        assert!(frame.valid_left_hand().is_some());
        assert!(frame.valid_right_hand().is_none());
        assert!(!frame.has_valid_pose());
    }

    #[test]
    fn test_normalize_zero_vector() {
        let v = Vec3::default().normalize();
        assert_eq!(v, Vec3::default());
    }
}
