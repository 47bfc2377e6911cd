//! MediaPipe landmark indices used by the solvers.

pub mod pose {
    pub const NOSE: usize = 0;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_PINKY: usize = 17;
    pub const RIGHT_PINKY: usize = 18;
    pub const LEFT_INDEX: usize = 19;
    pub const RIGHT_INDEX: usize = 20;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
}

pub mod hand {
    pub const WRIST: usize = 0;
    pub const INDEX_MCP: usize = 5;
    pub const MIDDLE_MCP: usize = 9;
    pub const RING_MCP: usize = 13;
    pub const PINKY_MCP: usize = 17;
}

/// Which side of the body a limb belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// (shoulder, elbow, wrist) pose indices for this side.
    pub fn arm_indices(self) -> (usize, usize, usize) {
        match self {
            Side::Left => (pose::LEFT_SHOULDER, pose::LEFT_ELBOW, pose::LEFT_WRIST),
            Side::Right => (pose::RIGHT_SHOULDER, pose::RIGHT_ELBOW, pose::RIGHT_WRIST),
        }
    }

    /// (pinky, index) pose indices for this side's hand.
    pub fn hand_indices(self) -> (usize, usize) {
        match self {
            Side::Left => (pose::LEFT_PINKY, pose::LEFT_INDEX),
            Side::Right => (pose::RIGHT_PINKY, pose::RIGHT_INDEX),
        }
    }

    /// +1 for the left side, -1 for the right. The left arm rests along +X.
    pub fn sign(self) -> f64 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "Left",
            Side::Right => "Right",
        }
    }
}
