//! Anatomical bone names and their binding to a target skeleton.

use crate::landmarks::Side;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bones the solvers produce rotations for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RigBone {
    RightUpperArm,
    LeftUpperArm,
    RightLowerArm,
    LeftLowerArm,
    RightHand,
    LeftHand,
}

impl RigBone {
    pub const ALL: [RigBone; 6] = [
        RigBone::RightUpperArm,
        RigBone::LeftUpperArm,
        RigBone::RightLowerArm,
        RigBone::LeftLowerArm,
        RigBone::RightHand,
        RigBone::LeftHand,
    ];

    pub fn upper_arm(side: Side) -> Self {
        match side {
            Side::Left => RigBone::LeftUpperArm,
            Side::Right => RigBone::RightUpperArm,
        }
    }

    pub fn lower_arm(side: Side) -> Self {
        match side {
            Side::Left => RigBone::LeftLowerArm,
            Side::Right => RigBone::RightLowerArm,
        }
    }

    pub fn hand(side: Side) -> Self {
        match side {
            Side::Left => RigBone::LeftHand,
            Side::Right => RigBone::RightHand,
        }
    }
}

/// Table binding solver bones to target skeleton bone names.
///
/// Alternate skeletons are supported by substituting the table, either in
/// code through [`BoneMap::with_target`] or from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoneMap {
    targets: BTreeMap<RigBone, String>,
}

impl BoneMap {
    /// An empty table; every solved bone is dropped until bound.
    pub fn empty() -> Self {
        Self {
            targets: BTreeMap::new(),
        }
    }

    /// Bone names of Ready Player Me GLB avatars.
    pub fn ready_player_me() -> Self {
        Self::from_pairs([
            (RigBone::RightUpperArm, "RightArm"),
            (RigBone::LeftUpperArm, "LeftArm"),
            (RigBone::RightLowerArm, "RightForeArm"),
            (RigBone::LeftLowerArm, "LeftForeArm"),
            (RigBone::RightHand, "RightHand"),
            (RigBone::LeftHand, "LeftHand"),
        ])
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (RigBone, S)>,
        S: Into<String>,
    {
        Self {
            targets: pairs.into_iter().map(|(bone, name)| (bone, name.into())).collect(),
        }
    }

    pub fn with_target(mut self, bone: RigBone, name: impl Into<String>) -> Self {
        self.targets.insert(bone, name.into());
        self
    }

    pub fn target(&self, bone: RigBone) -> Option<&str> {
        self.targets.get(&bone).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target names must be non-empty and unique, otherwise two solved bones
    /// would write the same key.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for (bone, name) in &self.targets {
            if name.trim().is_empty() {
                return Err(format!("Bone map target for {:?} is empty", bone));
            }
            if !seen.insert(name.as_str()) {
                return Err(format!("Bone map target '{}' is bound twice", name));
            }
        }
        Ok(())
    }
}

impl Default for BoneMap {
    fn default() -> Self {
        Self::ready_player_me()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_player_me_table() {
        let map = BoneMap::ready_player_me();
        assert_eq!(map.len(), RigBone::ALL.len());
        assert_eq!(map.target(RigBone::RightUpperArm), Some("RightArm"));
        assert_eq!(map.target(RigBone::LeftLowerArm), Some("LeftForeArm"));
        assert_eq!(map.target(RigBone::LeftHand), Some("LeftHand"));
        assert!(map.validate().is_ok());
    }

    #[test]
    fn test_substitute_skeleton() {
        let map = BoneMap::ready_player_me().with_target(RigBone::RightUpperArm, "mixamorig:RightArm");
        assert_eq!(map.target(RigBone::RightUpperArm), Some("mixamorig:RightArm"));
    }

    #[test]
    fn test_duplicate_targets_rejected() {
        let map = BoneMap::from_pairs([(RigBone::RightHand, "Hand"), (RigBone::LeftHand, "Hand")]);
        assert!(map.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_table() {
        let map: BoneMap =
            serde_json::from_str(r#"{"RightUpperArm": "upperarm_r", "LeftUpperArm": "upperarm_l"}"#).unwrap();
        assert_eq!(map.target(RigBone::LeftUpperArm), Some("upperarm_l"));
        assert_eq!(map.target(RigBone::RightHand), None);
    }
}
