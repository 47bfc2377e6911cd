//! Render-side seams. The scene graph, model loading and drawing live
//! outside this crate; playback only needs to find a bone by name and set its
//! local rotation, or hand an interpolated landmark frame to a drawer.

use crate::frame::{EulerRotation, LandmarkFrame};
use std::collections::BTreeMap;

/// A single skeleton bone whose local rotation can be read and written.
pub trait BoneHandle {
    fn rotation(&self) -> EulerRotation;
    fn set_rotation(&mut self, rotation: EulerRotation);
}

/// Name-based bone lookup on a loaded skeleton.
pub trait BoneRig {
    fn bone_by_name(&mut self, name: &str) -> Option<&mut dyn BoneHandle>;
}

/// Receives interpolated landmark frames, e.g. to draw a stick figure.
pub trait PoseSink {
    fn present(&mut self, frame: &LandmarkFrame);
}

impl PoseSink for Vec<LandmarkFrame> {
    fn present(&mut self, frame: &LandmarkFrame) {
        self.push(frame.clone());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryBone {
    rotation: EulerRotation,
    writes: usize,
}

impl MemoryBone {
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl BoneHandle for MemoryBone {
    fn rotation(&self) -> EulerRotation {
        self.rotation
    }

    fn set_rotation(&mut self, rotation: EulerRotation) {
        self.rotation = rotation;
        self.writes += 1;
    }
}

/// In-memory skeleton keyed by bone name.
#[derive(Debug, Clone, Default)]
pub struct MemoryRig {
    bones: BTreeMap<String, MemoryBone>,
}

impl MemoryRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A rig with the given bones, all at rest.
    pub fn with_bones<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bones: names
                .into_iter()
                .map(|name| (name.into(), MemoryBone::default()))
                .collect(),
        }
    }

    pub fn add_bone(&mut self, name: impl Into<String>) {
        self.bones.entry(name.into()).or_default();
    }

    pub fn rotation(&self, name: &str) -> Option<EulerRotation> {
        self.bones.get(name).map(|bone| bone.rotation)
    }

    pub fn bone(&self, name: &str) -> Option<&MemoryBone> {
        self.bones.get(name)
    }

    pub fn bone_names(&self) -> impl Iterator<Item = &str> {
        self.bones.keys().map(String::as_str)
    }

    /// Current rotation of every bone.
    pub fn snapshot(&self) -> BTreeMap<String, EulerRotation> {
        self.bones
            .iter()
            .map(|(name, bone)| (name.clone(), bone.rotation))
            .collect()
    }
}

impl BoneRig for MemoryRig {
    fn bone_by_name(&mut self, name: &str) -> Option<&mut dyn BoneHandle> {
        self.bones
            .get_mut(name)
            .map(|bone| bone as &mut dyn BoneHandle)
    }
}
