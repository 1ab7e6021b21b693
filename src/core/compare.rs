//! Pose comparison under a joint mask and a distance threshold.

use crate::core::types::{JointMask, SkeletonFrame};
use serde::{Deserialize, Serialize};

/// Threshold used when the operator has not chosen one.
pub const DEFAULT_THRESHOLD: f32 = 1.0;

/// Everything a comparison needs besides the two frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareSettings {
    pub mask: JointMask,
    /// Largest orientation distance at which a joint still matches
    pub threshold: f32,
}

impl CompareSettings {
    pub fn new(mask: JointMask, threshold: f32) -> Self {
        Self { mask, threshold }
    }

    /// Compare every joint at the default threshold.
    pub fn all_joints(joint_count: usize) -> Self {
        Self::new(JointMask::all(joint_count), DEFAULT_THRESHOLD)
    }

    pub fn compare(&self, lhs: &SkeletonFrame, rhs: &SkeletonFrame) -> Option<usize> {
        compare(lhs, rhs, &self.mask, self.threshold)
    }

    pub fn matches(&self, lhs: &SkeletonFrame, rhs: &SkeletonFrame) -> bool {
        self.compare(lhs, rhs).is_none()
    }
}

/// Compare two frames joint by joint.
///
/// Returns the lowest-index masked joint that fails, or `None` when every
/// masked joint matches. A joint fails when either frame lacks it or tracks
/// it below [`USABLE_CONFIDENCE`](crate::core::types::USABLE_CONFIDENCE), or
/// when its orientation distance exceeds `threshold`.
pub fn compare(
    lhs: &SkeletonFrame,
    rhs: &SkeletonFrame,
    mask: &JointMask,
    threshold: f32,
) -> Option<usize> {
    mask.included().find(|&index| {
        let (Some(a), Some(b)) = (lhs.joint(index), rhs.joint(index)) else {
            return true;
        };
        if !a.is_usable() || !b.is_usable() {
            return true;
        }
        a.distance(b) > threshold
    })
}

/// Largest orientation distance over the masked joints that both frames
/// track usably. Zero when there are none.
pub fn max_deviation(lhs: &SkeletonFrame, rhs: &SkeletonFrame, mask: &JointMask) -> f32 {
    mask.included()
        .filter_map(|index| {
            let a = lhs.joint(index)?;
            let b = rhs.joint(index)?;
            (a.is_usable() && b.is_usable()).then(|| a.distance(b))
        })
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::topology::AZURE_KINECT;
    use crate::core::types::{Confidence, JointOrientation};

    const IDENTITY: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

    fn frame(n: usize) -> SkeletonFrame {
        SkeletonFrame::uniform(n, IDENTITY, Confidence::High)
    }

    /// Move joint `index` away from identity by `distance`.
    fn displaced(mut frame: SkeletonFrame, index: usize, distance: f32) -> SkeletonFrame {
        frame.joints[index].orientation = [1.0, distance, 0.0, 0.0];
        frame
    }

    #[test]
    fn test_frame_matches_itself() {
        let f = displaced(frame(32), 7, 0.3);
        for threshold in [0.0, 0.5, 1.0, 10.0] {
            assert_eq!(compare(&f, &f, &JointMask::all(32), threshold), None);
            assert_eq!(compare(&f, &f, &JointMask::none(32), threshold), None);
        }
    }

    #[test]
    fn test_first_failing_joint_is_reported() {
        let a = frame(10);
        let b = displaced(displaced(frame(10), 6, 2.0), 3, 2.0);
        assert_eq!(compare(&a, &b, &JointMask::all(10), 1.0), Some(3));
    }

    #[test]
    fn test_distance_at_threshold_passes() {
        let a = frame(4);
        let b = displaced(frame(4), 2, 0.5);
        assert_eq!(compare(&a, &b, &JointMask::all(4), 0.5), None);
        assert_eq!(compare(&a, &b, &JointMask::all(4), 0.49), Some(2));
    }

    #[test]
    fn test_unusable_joint_fails_even_when_identical() {
        let mut a = frame(6);
        a.joints[4].confidence = Confidence::Low;
        assert_eq!(compare(&a, &frame(6), &JointMask::all(6), 1.0), Some(4));
        assert_eq!(compare(&frame(6), &a, &JointMask::all(6), 1.0), Some(4));
        assert_eq!(compare(&a, &a, &JointMask::all(6), 1.0), Some(4));
    }

    #[test]
    fn test_excluded_joint_is_ignored_regardless_of_confidence() {
        let mut a = frame(6);
        a.joints[4] = JointOrientation::new([9.0, 9.0, 9.0, 9.0], Confidence::None);
        let mask = JointMask::excluding(6, &[4]);
        assert_eq!(compare(&a, &frame(6), &mask, 1.0), None);
    }

    #[test]
    fn test_missing_joint_fails() {
        let short = frame(3);
        assert_eq!(compare(&short, &frame(5), &JointMask::all(5), 1.0), Some(3));
    }

    #[test]
    fn test_excluding_joints_never_breaks_a_pass_or_moves_earlier_failure() {
        let a = frame(8);
        let b = displaced(displaced(frame(8), 2, 3.0), 5, 3.0);
        let full = JointMask::all(8);
        assert_eq!(compare(&a, &b, &full, 1.0), Some(2));

        for excluded in 0..8 {
            let mask = JointMask::excluding(8, &[excluded]);
            let result = compare(&a, &b, &mask, 1.0);
            match excluded {
                2 => assert_eq!(result, Some(5)),
                _ => assert_eq!(result, Some(2)),
            }
        }
        let mask = JointMask::excluding(8, &[2, 5]);
        assert_eq!(compare(&a, &b, &mask, 1.0), None);
    }

    #[test]
    fn test_threshold_monotonicity() {
        let a = frame(5);
        let b = displaced(displaced(frame(5), 1, 0.4), 3, 0.8);
        let mask = JointMask::all(5);
        let mut passed = false;
        for step in 0..=20 {
            let threshold = step as f32 * 0.1;
            let pass = compare(&a, &b, &mask, threshold).is_none();
            assert!(!passed || pass, "pass turned into failure at {threshold}");
            passed |= pass;
        }
        assert!(passed);
    }

    #[test]
    fn test_hand_joints_excluded_scenario() {
        let hands = [
            "hand_left",
            "handtip_left",
            "thumb_left",
            "hand_right",
            "handtip_right",
            "thumb_right",
        ];
        let mask = AZURE_KINECT.mask_excluding(&hands).unwrap();
        let a = frame(AZURE_KINECT.joint_count());
        let mut b = a.clone();
        for name in hands {
            let index = AZURE_KINECT.joint_index(name).unwrap();
            b.joints[index].orientation = [1.0, 3.0, 4.0, 0.0];
            assert!((a.joints[index].distance(&b.joints[index]) - 5.0).abs() < 1e-6);
        }
        assert_eq!(compare(&a, &b, &mask, DEFAULT_THRESHOLD), None);
        assert!(compare(&a, &b, &JointMask::all(32), DEFAULT_THRESHOLD).is_some());
    }

    #[test]
    fn test_max_deviation_skips_unusable_joints() {
        let a = frame(4);
        let mut b = displaced(displaced(frame(4), 1, 0.25), 2, 4.0);
        b.joints[2].confidence = Confidence::None;
        assert!((max_deviation(&a, &b, &JointMask::all(4)) - 0.25).abs() < 1e-6);
    }
}
