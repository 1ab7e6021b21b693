//! Skeleton data model shared by the tracking backends and the pose engine.
//!
//! A frame is a fixed-length list of joints in topology order. Joint `i`
//! always refers to the same anatomical joint, in every frame and in the
//! parent table of the backend's [`Topology`](crate::backend::Topology).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracking confidence reported for a single joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Joint is out of range or occluded with no estimate
    None,
    /// Joint position is predicted rather than observed
    Low,
    Medium,
    High,
}

/// Lowest confidence at which a joint may take part in a comparison.
pub const USABLE_CONFIDENCE: Confidence = Confidence::Medium;

impl Confidence {
    /// Whether a joint at this confidence can be judged at all.
    pub fn is_usable(self) -> bool {
        self >= USABLE_CONFIDENCE
    }
}

/// Orientation of a single joint, with the confidence the tracker gave it.
///
/// The position is carried for the renderer only and never takes part in
/// pose comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointOrientation {
    /// Quaternion components, in the order the tracker reports them
    pub orientation: [f32; 4],
    pub confidence: Confidence,
    /// Joint position in tracker space (millimetres for the Kinect trackers)
    #[serde(default)]
    pub position: [f32; 3],
}

impl JointOrientation {
    pub fn new(orientation: [f32; 4], confidence: Confidence) -> Self {
        Self {
            orientation,
            confidence,
            position: [0.0; 3],
        }
    }

    /// Attach a tracker-space position to this joint.
    pub fn with_position(mut self, position: [f32; 3]) -> Self {
        self.position = position;
        self
    }

    pub fn is_usable(&self) -> bool {
        self.confidence.is_usable()
    }

    /// Euclidean norm of the component-wise orientation difference.
    pub fn distance(&self, other: &JointOrientation) -> f32 {
        self.orientation
            .iter()
            .zip(other.orientation.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// One sampled skeleton: every joint of the topology at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonFrame {
    /// When the tracker produced this frame
    pub timestamp: DateTime<Utc>,
    pub joints: Vec<JointOrientation>,
}

impl SkeletonFrame {
    pub fn new(joints: Vec<JointOrientation>) -> Self {
        Self {
            timestamp: Utc::now(),
            joints,
        }
    }

    pub fn with_timestamp(joints: Vec<JointOrientation>, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, joints }
    }

    /// A frame with every joint at the same orientation and confidence.
    pub fn uniform(joint_count: usize, orientation: [f32; 4], confidence: Confidence) -> Self {
        Self::new(vec![
            JointOrientation::new(orientation, confidence);
            joint_count
        ])
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joint(&self, index: usize) -> Option<&JointOrientation> {
        self.joints.get(index)
    }

    /// Mark every joint as fully tracked.
    ///
    /// Used for poses loaded from disk, where confidence is not stored.
    pub fn trusted(mut self) -> Self {
        for joint in &mut self.joints {
            joint.confidence = Confidence::High;
        }
        self
    }
}

/// Which joints take part in a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointMask(Vec<bool>);

impl JointMask {
    /// Include every joint.
    pub fn all(joint_count: usize) -> Self {
        Self(vec![true; joint_count])
    }

    /// Include no joint. Every comparison under this mask passes.
    pub fn none(joint_count: usize) -> Self {
        Self(vec![false; joint_count])
    }

    pub fn from_flags(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    /// Include every joint except the given indices.
    pub fn excluding(joint_count: usize, excluded: &[usize]) -> Self {
        let mut mask = Self::all(joint_count);
        for &index in excluded {
            mask.set(index, false);
        }
        mask
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn includes(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    /// Include or exclude one joint. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, included: bool) {
        if let Some(flag) = self.0.get_mut(index) {
            *flag = included;
        }
    }

    /// Indices of included joints, in increasing order.
    pub fn included(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, &included)| included.then_some(i))
    }

    pub fn included_count(&self) -> usize {
        self.0.iter().filter(|&&included| included).count()
    }

    pub fn flags(&self) -> &[bool] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_cutoff() {
        assert!(!Confidence::None.is_usable());
        assert!(!Confidence::Low.is_usable());
        assert!(Confidence::Medium.is_usable());
        assert!(Confidence::High.is_usable());
    }

    #[test]
    fn test_joint_distance() {
        let a = JointOrientation::new([1.0, 0.0, 0.0, 0.0], Confidence::High);
        let b = JointOrientation::new([1.0, 3.0, 4.0, 0.0], Confidence::High);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_trusted_marks_all_joints_high() {
        let frame = SkeletonFrame::uniform(4, [1.0, 0.0, 0.0, 0.0], Confidence::None).trusted();
        assert!(frame.joints.iter().all(|j| j.confidence == Confidence::High));
    }

    #[test]
    fn test_mask_excluding() {
        let mask = JointMask::excluding(5, &[1, 3, 9]);
        assert_eq!(mask.len(), 5);
        assert_eq!(mask.included().collect::<Vec<_>>(), vec![0, 2, 4]);
        assert_eq!(mask.included_count(), 3);
        assert!(!mask.includes(9));
    }

    #[test]
    fn test_frame_json_without_position() {
        let json = r#"{
            "timestamp": "2024-01-22T10:00:00Z",
            "joints": [{"orientation": [1.0, 0.0, 0.0, 0.0], "confidence": "medium"}]
        }"#;
        let frame: SkeletonFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.joint_count(), 1);
        assert_eq!(frame.joints[0].position, [0.0; 3]);
        assert!(frame.joints[0].is_usable());
    }
}
