//! Joint tables for the supported body trackers.
//!
//! The parent table is only used to draw bones; the pose engine works on
//! joint indices alone.

use crate::core::types::JointMask;
use serde::{Deserialize, Serialize};

/// A joint of a tracker's skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointDef {
    pub name: &'static str,
    /// Index of the joint this one hangs from; `None` for the root
    pub parent: Option<usize>,
}

const fn joint(name: &'static str, parent: Option<usize>) -> JointDef {
    JointDef { name, parent }
}

/// Which skeleton layout a backend produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// Azure Kinect Body Tracking SDK, 32 joints
    AzureKinect,
    /// Kinect for Windows v2, 25 joints
    KinectV2,
}

impl TopologyKind {
    pub fn topology(self) -> &'static Topology {
        match self {
            TopologyKind::AzureKinect => &AZURE_KINECT,
            TopologyKind::KinectV2 => &KINECT_V2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "azure_kinect" | "azure" | "k4a" => Some(TopologyKind::AzureKinect),
            "kinect_v2" | "kinect2" | "k4w" => Some(TopologyKind::KinectV2),
            _ => None,
        }
    }
}

/// A tracker's joint list, in the index order its frames use.
#[derive(Debug)]
pub struct Topology {
    pub kind: TopologyKind,
    pub joints: &'static [JointDef],
}

impl Topology {
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joint_name(&self, index: usize) -> Option<&'static str> {
        self.joints.get(index).map(|j| j.name)
    }

    /// Look a joint up by name, ignoring case and accepting `-` for `_`.
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase().replace('-', "_");
        self.joints.iter().position(|j| j.name == wanted)
    }

    /// `(child, parent)` pairs, one per bone.
    pub fn bones(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.joints
            .iter()
            .enumerate()
            .filter_map(|(child, j)| j.parent.map(|parent| (child, parent)))
    }

    /// Mask with every joint included except the named ones.
    ///
    /// Returns the first unknown name as the error.
    pub fn mask_excluding<S: AsRef<str>>(&self, names: &[S]) -> Result<JointMask, String> {
        let indices = self.resolve(names)?;
        Ok(JointMask::excluding(self.joint_count(), &indices))
    }

    /// Mask with only the named joints included.
    pub fn mask_including<S: AsRef<str>>(&self, names: &[S]) -> Result<JointMask, String> {
        let mut mask = JointMask::none(self.joint_count());
        for index in self.resolve(names)? {
            mask.set(index, true);
        }
        Ok(mask)
    }

    fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>, String> {
        names
            .iter()
            .map(|name| {
                self.joint_index(name.as_ref())
                    .ok_or_else(|| name.as_ref().to_string())
            })
            .collect()
    }
}

pub static AZURE_KINECT: Topology = Topology {
    kind: TopologyKind::AzureKinect,
    joints: &[
        joint("pelvis", None),
        joint("spine_navel", Some(0)),
        joint("spine_chest", Some(1)),
        joint("neck", Some(2)),
        joint("clavicle_left", Some(2)),
        joint("shoulder_left", Some(4)),
        joint("elbow_left", Some(5)),
        joint("wrist_left", Some(6)),
        joint("hand_left", Some(7)),
        joint("handtip_left", Some(8)),
        joint("thumb_left", Some(7)),
        joint("clavicle_right", Some(2)),
        joint("shoulder_right", Some(11)),
        joint("elbow_right", Some(12)),
        joint("wrist_right", Some(13)),
        joint("hand_right", Some(14)),
        joint("handtip_right", Some(15)),
        joint("thumb_right", Some(14)),
        joint("hip_left", Some(0)),
        joint("knee_left", Some(18)),
        joint("ankle_left", Some(19)),
        joint("foot_left", Some(20)),
        joint("hip_right", Some(0)),
        joint("knee_right", Some(22)),
        joint("ankle_right", Some(23)),
        joint("foot_right", Some(24)),
        joint("head", Some(3)),
        joint("nose", Some(26)),
        joint("eye_left", Some(26)),
        joint("ear_left", Some(26)),
        joint("eye_right", Some(26)),
        joint("ear_right", Some(26)),
    ],
};

pub static KINECT_V2: Topology = Topology {
    kind: TopologyKind::KinectV2,
    joints: &[
        joint("spine_base", None),
        joint("spine_mid", Some(0)),
        joint("neck", Some(20)),
        joint("head", Some(2)),
        joint("shoulder_left", Some(20)),
        joint("elbow_left", Some(4)),
        joint("wrist_left", Some(5)),
        joint("hand_left", Some(6)),
        joint("shoulder_right", Some(20)),
        joint("elbow_right", Some(8)),
        joint("wrist_right", Some(9)),
        joint("hand_right", Some(10)),
        joint("hip_left", Some(0)),
        joint("knee_left", Some(12)),
        joint("ankle_left", Some(13)),
        joint("foot_left", Some(14)),
        joint("hip_right", Some(0)),
        joint("knee_right", Some(16)),
        joint("ankle_right", Some(17)),
        joint("foot_right", Some(18)),
        joint("spine_shoulder", Some(1)),
        joint("handtip_left", Some(7)),
        joint("thumb_left", Some(6)),
        joint("handtip_right", Some(11)),
        joint("thumb_right", Some(10)),
    ],
};
