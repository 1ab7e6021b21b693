//! Statistics describing how steady a pose was when it locked.

use crate::core::compare::{max_deviation, CompareSettings};
use crate::core::types::SkeletonFrame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Summary of the window that produced a locked pose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettleReport {
    /// Frames in the window at lock time
    pub frame_count: usize,
    /// Mean over frames of the largest joint deviation from the locked pose
    pub mean_deviation: f64,
    /// Standard deviation of the per-frame largest deviation
    pub deviation_spread: f64,
    /// Largest joint deviation seen in any frame
    pub max_deviation: f64,
    /// Time between the first and last frame of the window, in milliseconds
    pub held_for_ms: i64,
}

impl SettleReport {
    /// Measure every frame of `window` against `pose` under `settings`.
    pub fn measure<'a, I>(pose: &SkeletonFrame, window: I, settings: &CompareSettings) -> Self
    where
        I: IntoIterator<Item = &'a SkeletonFrame>,
    {
        let mut first: Option<DateTime<Utc>> = None;
        let mut last: Option<DateTime<Utc>> = None;
        let deviations: Vec<f64> = window
            .into_iter()
            .map(|frame| {
                first.get_or_insert(frame.timestamp);
                last = Some(frame.timestamp);
                max_deviation(pose, frame, &settings.mask) as f64
            })
            .collect();

        if deviations.is_empty() {
            return Self::default();
        }

        let spread = if deviations.len() > 1 {
            deviations.iter().std_dev()
        } else {
            0.0
        };
        let held_for_ms = match (first, last) {
            (Some(first), Some(last)) => (last - first).num_milliseconds(),
            _ => 0,
        };

        Self {
            frame_count: deviations.len(),
            mean_deviation: deviations.iter().mean(),
            deviation_spread: spread,
            max_deviation: deviations.iter().copied().fold(0.0, f64::max),
            held_for_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Confidence;
    use chrono::Duration;

    #[test]
    fn test_report_of_identical_frames() {
        let start = Utc::now();
        let frames: Vec<SkeletonFrame> = (0..5)
            .map(|i| {
                let mut frame = SkeletonFrame::uniform(3, [1.0, 0.0, 0.0, 0.0], Confidence::High);
                frame.timestamp = start + Duration::milliseconds(33 * i);
                frame
            })
            .collect();
        let settings = CompareSettings::all_joints(3);
        let report = SettleReport::measure(&frames[0], &frames, &settings);

        assert_eq!(report.frame_count, 5);
        assert_eq!(report.mean_deviation, 0.0);
        assert_eq!(report.deviation_spread, 0.0);
        assert_eq!(report.max_deviation, 0.0);
        assert_eq!(report.held_for_ms, 132);
    }

    #[test]
    fn test_report_tracks_largest_deviation() {
        let pose = SkeletonFrame::uniform(2, [1.0, 0.0, 0.0, 0.0], Confidence::High);
        let mut wobble = pose.clone();
        wobble.joints[1].orientation = [1.0, 0.2, 0.0, 0.0];
        let settings = CompareSettings::all_joints(2);
        let report = SettleReport::measure(&pose, [&pose, &wobble], &settings);

        assert_eq!(report.frame_count, 2);
        assert!((report.max_deviation - 0.2).abs() < 1e-6);
        assert!((report.mean_deviation - 0.1).abs() < 1e-6);
        assert!(report.deviation_spread > 0.0);
    }

    #[test]
    fn test_empty_window() {
        let pose = SkeletonFrame::uniform(2, [1.0, 0.0, 0.0, 0.0], Confidence::High);
        let window: Vec<SkeletonFrame> = Vec::new();
        let report = SettleReport::measure(&pose, &window, &CompareSettings::all_joints(2));
        assert_eq!(report, SettleReport::default());
    }
}
