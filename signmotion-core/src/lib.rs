pub mod error;
pub mod frame;
pub mod landmarks;
pub mod playback;
pub mod retarget;

pub use error::{Error, Result};
pub use frame::{
    BoneRotationFrame, EulerRotation, LandmarkFrame, MotionPayload, MotionSequence, Vec3,
    HAND_POINTS, MIN_POSE_POINTS,
};
pub use landmarks::Side;
pub use playback::{
    BoneHandle, BoneRig, LandmarkScheduler, MemoryRig, PlaybackState, PoseSink, StepScheduler,
    StepTick, Tick,
};
pub use retarget::{
    frame_to_bones, sequence_to_bones, ArmSolver, BoneMap, DirectionSolver, IkSolver,
    RetargetMethod, Retargeter, RigBone,
};
