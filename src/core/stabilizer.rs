//! Settle detection over the live frame stream.
//!
//! While searching, frames collect in a window that only keeps the longest
//! run of recent frames still matching the newest one. Once that run is
//! longer than the stability count, its oldest frame becomes the current
//! pose and every later frame is compared against it.

use crate::core::compare::CompareSettings;
use crate::core::settle::SettleReport;
use crate::core::types::SkeletonFrame;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Matching frames needed beyond the first before a pose locks.
pub const STABILITY_FRAMES: usize = 30;

/// Whether the stabilizer holds a pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilizerState {
    Searching,
    Locked,
}

/// Live comparison result shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LiveStatus {
    /// Nothing to compare against yet
    Searching,
    /// The live frame matches on every masked joint
    Matched,
    /// The live frame fails, first at this joint
    Failed { joint: usize },
}

impl LiveStatus {
    pub fn from_comparison(failing_joint: Option<usize>) -> Self {
        match failing_joint {
            Some(joint) => LiveStatus::Failed { joint },
            None => LiveStatus::Matched,
        }
    }

    pub fn failing_joint(&self) -> Option<usize> {
        match self {
            LiveStatus::Failed { joint } => Some(*joint),
            _ => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, LiveStatus::Matched)
    }
}

/// What a single frame did to the stabilizer.
#[derive(Debug, Clone, PartialEq)]
pub enum StabilizerUpdate {
    /// Still searching; the window holds this many consistent frames
    Searching { window_len: usize },
    /// This frame completed the window and a pose locked
    Locked(SettleReport),
    /// A pose was already locked; the frame was compared against it
    Tracking(LiveStatus),
}

/// Sliding-window settle detector holding at most one current pose.
#[derive(Debug, Clone)]
pub struct PoseStabilizer {
    stability_frames: usize,
    window: VecDeque<SkeletonFrame>,
    current_pose: Option<SkeletonFrame>,
    status: LiveStatus,
    last_report: Option<SettleReport>,
}

impl PoseStabilizer {
    pub fn new(stability_frames: usize) -> Self {
        Self {
            stability_frames: stability_frames.max(1),
            window: VecDeque::with_capacity(stability_frames + 1),
            current_pose: None,
            status: LiveStatus::Searching,
            last_report: None,
        }
    }

    /// Feed one tracked frame.
    pub fn push(&mut self, frame: SkeletonFrame, settings: &CompareSettings) -> StabilizerUpdate {
        if let Some(ref pose) = self.current_pose {
            self.status = LiveStatus::from_comparison(settings.compare(pose, &frame));
            return StabilizerUpdate::Tracking(self.status);
        }

        self.window.push_back(frame);
        self.trim(settings);

        if self.window.len() <= self.stability_frames {
            return StabilizerUpdate::Searching {
                window_len: self.window.len(),
            };
        }

        // The window is non-empty here, so there is a front and a back.
        let (Some(pose), Some(newest)) = (self.window.front(), self.window.back()) else {
            return StabilizerUpdate::Searching { window_len: 0 };
        };
        let report = SettleReport::measure(pose, &self.window, settings);
        self.status = LiveStatus::from_comparison(settings.compare(pose, newest));
        self.current_pose = Some(pose.clone());
        self.last_report = Some(report.clone());
        StabilizerUpdate::Locked(report)
    }

    /// Drop frames from the front until the oldest matches the newest.
    fn trim(&mut self, settings: &CompareSettings) {
        while let (Some(oldest), Some(newest)) = (self.window.front(), self.window.back()) {
            if settings.matches(oldest, newest) {
                break;
            }
            self.window.pop_front();
        }
    }

    /// Discard the current pose and start searching again.
    pub fn clear(&mut self) {
        self.window.clear();
        self.current_pose = None;
        self.status = LiveStatus::Searching;
        self.last_report = None;
    }

    pub fn state(&self) -> StabilizerState {
        if self.current_pose.is_some() {
            StabilizerState::Locked
        } else {
            StabilizerState::Searching
        }
    }

    pub fn current_pose(&self) -> Option<&SkeletonFrame> {
        self.current_pose.as_ref()
    }

    pub fn status(&self) -> LiveStatus {
        self.status
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn stability_frames(&self) -> usize {
        self.stability_frames
    }

    /// Report of the most recent lock, until the next clear.
    pub fn last_report(&self) -> Option<&SettleReport> {
        self.last_report.as_ref()
    }
}

impl Default for PoseStabilizer {
    fn default() -> Self {
        Self::new(STABILITY_FRAMES)
    }
}
