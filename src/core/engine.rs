//! The pose engine: everything the acquisition thread and the operator share.
//!
//! One [`PoseEngine`] sits behind one mutex ([`SharedEngine`]). The
//! acquisition thread locks it once per tracked frame; operator commands lock
//! it briefly between frames.

use crate::backend::topology::Topology;
use crate::core::compare::CompareSettings;
use crate::core::library::{LibraryError, PoseLibrary, PoseRecord};
use crate::core::settle::SettleReport;
use crate::core::snapshot::RenderSnapshot;
use crate::core::stabilizer::{LiveStatus, PoseStabilizer, StabilizerState, StabilizerUpdate};
use crate::core::trigger::{KeyTrigger, TriggerTracker};
use crate::core::types::{JointMask, SkeletonFrame};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// What live frames are used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Settle on poses so the operator can bind them
    #[default]
    Record,
    /// Match live frames against bound poses and fire their keys
    Execute,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "record" => Some(Mode::Record),
            "execute" | "exec" => Some(Mode::Execute),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Record => write!(f, "record"),
            Mode::Execute => write!(f, "execute"),
        }
    }
}

/// Result of feeding one tracked frame to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub status: LiveStatus,
    /// Present when this frame locked a pose
    pub locked: Option<SettleReport>,
    pub triggers: Vec<KeyTrigger>,
}

/// Point-in-time view of the engine for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub mode: Mode,
    pub state: StabilizerState,
    pub live: LiveStatus,
    pub window_len: usize,
    pub stability_frames: usize,
    pub library_size: usize,
    pub threshold: f32,
    pub included_joints: usize,
    /// The acquisition loop ended on a tracker error
    pub feed_stopped: bool,
    pub last_settle: Option<SettleReport>,
    /// Key of the bound pose currently matching (execute mode)
    pub active_key: Option<i32>,
}

/// Errors from changing engine settings.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    InvalidThreshold(f32),
    MaskLength { expected: usize, found: usize },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidThreshold(t) => {
                write!(f, "Threshold must be a non-negative number, got {t}")
            }
            EngineError::MaskLength { expected, found } => {
                write!(f, "Joint mask has {found} entries, expected {expected}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Stabilizer, library and comparison settings for one tracked body.
pub struct PoseEngine {
    topology: &'static Topology,
    settings: CompareSettings,
    mode: Mode,
    stabilizer: PoseStabilizer,
    library: PoseLibrary,
    triggers: TriggerTracker,
    latest: Option<SkeletonFrame>,
    feed_stopped: bool,
}

impl PoseEngine {
    pub fn new(
        topology: &'static Topology,
        settings: CompareSettings,
        stability_frames: usize,
    ) -> Self {
        Self {
            topology,
            settings,
            mode: Mode::Record,
            stabilizer: PoseStabilizer::new(stability_frames),
            library: PoseLibrary::new(),
            triggers: TriggerTracker::new(),
            latest: None,
            feed_stopped: false,
        }
    }

    /// Feed one tracked frame.
    pub fn ingest(&mut self, frame: SkeletonFrame) -> FrameOutcome {
        let outcome = match self.mode {
            Mode::Record => {
                let update = self.stabilizer.push(frame.clone(), &self.settings);
                let locked = match update {
                    StabilizerUpdate::Locked(report) => {
                        info!(
                            frames = report.frame_count,
                            mean_deviation = report.mean_deviation,
                            max_deviation = report.max_deviation,
                            "Pose locked"
                        );
                        Some(report)
                    }
                    StabilizerUpdate::Searching { window_len } => {
                        debug!(window_len, "Searching for a steady pose");
                        None
                    }
                    StabilizerUpdate::Tracking(_) => None,
                };
                FrameOutcome {
                    status: self.stabilizer.status(),
                    locked,
                    triggers: Vec::new(),
                }
            }
            Mode::Execute => {
                let matched = self.library.find_match(&frame, &self.settings);
                let record = matched.and_then(|i| self.library.get(i).map(|r| (i, r)));
                let triggers = self.triggers.update(record, frame.timestamp);
                FrameOutcome {
                    status: if matched.is_some() {
                        LiveStatus::Matched
                    } else {
                        LiveStatus::Searching
                    },
                    locked: None,
                    triggers,
                }
            }
        };

        self.latest = Some(frame);
        outcome
    }

    /// The tracker saw nobody this tick.
    ///
    /// The stabilizer window is left alone; a held key is released.
    pub fn body_lost(&mut self, at: DateTime<Utc>) -> Vec<KeyTrigger> {
        self.triggers.reset(at).into_iter().collect()
    }

    /// Bind the current pose to `key`. Returns `false` when no pose is locked.
    pub fn save(&mut self, key: i32, hold_time_ms: u32, is_click: bool) -> bool {
        let saved = self
            .library
            .save(&mut self.stabilizer, key, hold_time_ms, is_click);
        if saved {
            info!(key, hold_time_ms, is_click, total = self.library.len(), "Pose saved");
        }
        saved
    }

    /// Drop the current pose and start searching again.
    pub fn clear(&mut self) {
        self.stabilizer.clear();
    }

    /// Drop every bound pose and the current pose.
    pub fn clear_all(&mut self) -> Vec<KeyTrigger> {
        self.library.clear_all(&mut self.stabilizer);
        self.triggers.reset(Utc::now()).into_iter().collect()
    }

    /// Drop one bound pose.
    pub fn remove(&mut self, index: usize) -> (Option<PoseRecord>, Vec<KeyTrigger>) {
        let removed = self.library.remove(index);
        // Record indices shift, so the active match is no longer valid.
        let released = match removed {
            Some(_) => self.triggers.reset(Utc::now()).into_iter().collect(),
            None => Vec::new(),
        };
        (removed, released)
    }

    pub fn set_threshold(&mut self, threshold: f32) -> Result<(), EngineError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(EngineError::InvalidThreshold(threshold));
        }
        self.settings.threshold = threshold;
        Ok(())
    }

    pub fn set_joint_mask(&mut self, mask: JointMask) -> Result<(), EngineError> {
        if mask.len() != self.topology.joint_count() {
            return Err(EngineError::MaskLength {
                expected: self.topology.joint_count(),
                found: mask.len(),
            });
        }
        self.settings.mask = mask;
        Ok(())
    }

    /// Switch modes. The stabilizer starts over and any held key is released.
    pub fn set_mode(&mut self, mode: Mode) -> Vec<KeyTrigger> {
        if mode == self.mode {
            return Vec::new();
        }
        info!(%mode, "Switching mode");
        self.mode = mode;
        self.stabilizer.clear();
        self.triggers.reset(Utc::now()).into_iter().collect()
    }

    pub fn import(&mut self, path: &Path) -> Result<usize, LibraryError> {
        let added = self.library.import(path, self.topology.joint_count())?;
        info!(path = %path.display(), added, "Imported poses");
        Ok(added)
    }

    pub fn export(&self, path: &Path) -> Result<(), LibraryError> {
        self.library.export(path)?;
        info!(path = %path.display(), records = self.library.len(), "Exported poses");
        Ok(())
    }

    pub fn set_feed_stopped(&mut self, stopped: bool) {
        self.feed_stopped = stopped;
    }

    pub fn feed_stopped(&self) -> bool {
        self.feed_stopped
    }

    /// Live status as shown to the operator: the stabilizer's in record mode,
    /// whether a bound pose is active in execute mode.
    pub fn live_status(&self) -> LiveStatus {
        match self.mode {
            Mode::Record => self.stabilizer.status(),
            Mode::Execute if self.triggers.active_key().is_some() => LiveStatus::Matched,
            Mode::Execute => LiveStatus::Searching,
        }
    }

    /// Render data for the latest tracked frame.
    pub fn snapshot(&self) -> Option<RenderSnapshot> {
        let frame = self.latest.as_ref()?;
        Some(RenderSnapshot::build(frame, self.topology, self.live_status()))
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            mode: self.mode,
            state: self.stabilizer.state(),
            live: self.live_status(),
            window_len: self.stabilizer.window_len(),
            stability_frames: self.stabilizer.stability_frames(),
            library_size: self.library.len(),
            threshold: self.settings.threshold,
            included_joints: self.settings.mask.included_count(),
            feed_stopped: self.feed_stopped,
            last_settle: self.stabilizer.last_report().cloned(),
            active_key: self.triggers.active_key(),
        }
    }

    pub fn topology(&self) -> &'static Topology {
        self.topology
    }

    pub fn settings(&self) -> &CompareSettings {
        &self.settings
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn library(&self) -> &PoseLibrary {
        &self.library
    }

    /// Borrow of the current pose, valid until the engine is next mutated.
    pub fn current_pose(&self) -> Option<&SkeletonFrame> {
        self.stabilizer.current_pose()
    }
}

/// The pose file a run loads at start and writes back at exit.
///
/// When the load fails the file is kept as it is for the operator to fix,
/// and the library is written next to it instead.
#[derive(Debug, Clone)]
pub struct PoseFile {
    path: PathBuf,
    load_failed: bool,
}

impl PoseFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            load_failed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Import the file into `engine`. A missing file loads nothing.
    pub fn load_into(&mut self, engine: &mut PoseEngine) -> Result<usize, LibraryError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let result = engine.import(&self.path);
        self.load_failed = result.is_err();
        result
    }

    /// Where [`save_from`](Self::save_from) writes.
    pub fn save_path(&self) -> PathBuf {
        if !self.load_failed {
            return self.path.clone();
        }
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "poses".into());
        name.push(".new");
        self.path.with_file_name(name)
    }

    /// Export the engine's library and return the path written.
    pub fn save_from(&self, engine: &PoseEngine) -> Result<PathBuf, LibraryError> {
        let target = self.save_path();
        if self.load_failed {
            warn!(
                kept = %self.path.display(),
                written = %target.display(),
                "Pose file failed to load earlier, writing alongside it"
            );
        }
        engine.export(&target)?;
        Ok(target)
    }
}

/// The engine as shared between the acquisition thread and the operator.
pub type SharedEngine = Arc<Mutex<PoseEngine>>;

pub fn create_shared_engine(engine: PoseEngine) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Lock the engine, recovering it if a previous holder panicked.
pub fn lock_engine(engine: &SharedEngine) -> MutexGuard<'_, PoseEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::topology::AZURE_KINECT;
    use crate::core::trigger::TriggerAction;
    use crate::core::types::Confidence;
    use chrono::Duration;

    fn engine() -> PoseEngine {
        PoseEngine::new(
            &AZURE_KINECT,
            CompareSettings::all_joints(AZURE_KINECT.joint_count()),
            crate::core::stabilizer::STABILITY_FRAMES,
        )
    }

    fn steady() -> SkeletonFrame {
        SkeletonFrame::uniform(32, [1.0, 0.0, 0.0, 0.0], Confidence::High)
    }

    fn lock(engine: &mut PoseEngine) {
        for _ in 0..31 {
            engine.ingest(steady());
        }
        assert_eq!(engine.status().state, StabilizerState::Locked);
    }

    #[test]
    fn test_record_mode_locks_and_saves() {
        let mut engine = engine();
        assert!(!engine.save(65, 0, true));
        assert!(engine.snapshot().is_none());

        let mut locked = None;
        for _ in 0..31 {
            let outcome = engine.ingest(steady());
            if outcome.locked.is_some() {
                locked = outcome.locked;
            }
        }
        assert!(locked.is_some());
        assert!(engine.snapshot().is_some());

        assert!(engine.save(65, 0, true));
        let status = engine.status();
        assert_eq!(status.library_size, 1);
        assert_eq!(status.state, StabilizerState::Searching);
        assert_eq!(status.window_len, 0);
    }

    #[test]
    fn test_clear_all_drops_library_and_pose() {
        let mut engine = engine();
        lock(&mut engine);
        engine.save(1, 0, true);
        lock(&mut engine);

        engine.clear_all();
        assert_eq!(engine.status().library_size, 0);
        assert!(engine.current_pose().is_none());
    }

    #[test]
    fn test_settings_validation() {
        let mut engine = engine();
        assert!(engine.set_threshold(-0.1).is_err());
        assert!(engine.set_threshold(f32::NAN).is_err());
        assert!(engine.set_threshold(0.25).is_ok());
        assert_eq!(engine.settings().threshold, 0.25);

        assert_eq!(
            engine.set_joint_mask(JointMask::all(25)),
            Err(EngineError::MaskLength {
                expected: 32,
                found: 25
            })
        );
        assert!(engine.set_joint_mask(JointMask::none(32)).is_ok());
        assert_eq!(engine.status().included_joints, 0);
    }

    #[test]
    fn test_execute_mode_fires_bound_key() {
        let mut engine = engine();
        lock(&mut engine);
        assert!(engine.save(32, 0, false));

        engine.set_mode(Mode::Execute);
        let start = Utc::now();
        let mut frame = steady();
        frame.timestamp = start;
        let outcome = engine.ingest(frame);
        assert_eq!(outcome.status, LiveStatus::Matched);
        assert_eq!(outcome.triggers.len(), 1);
        assert_eq!(outcome.triggers[0].action, TriggerAction::Press);

        let mut away = SkeletonFrame::uniform(32, [0.0, 0.0, 0.0, 5.0], Confidence::High);
        away.timestamp = start + Duration::milliseconds(33);
        let outcome = engine.ingest(away);
        assert_eq!(outcome.status, LiveStatus::Searching);
        assert_eq!(outcome.triggers[0].action, TriggerAction::Release);
    }

    #[test]
    fn test_body_lost_releases_held_key() {
        let mut engine = engine();
        lock(&mut engine);
        engine.save(32, 0, false);
        engine.set_mode(Mode::Execute);
        engine.ingest(steady());

        let released = engine.body_lost(Utc::now());
        assert_eq!(released.len(), 1);
        assert!(engine.body_lost(Utc::now()).is_empty());
    }

    #[test]
    fn test_mode_switch_clears_stabilizer() {
        let mut engine = engine();
        lock(&mut engine);
        engine.set_mode(Mode::Execute);
        assert!(engine.current_pose().is_none());
        assert_eq!(engine.mode(), Mode::Execute);
        assert!(engine.set_mode(Mode::Execute).is_empty());
    }

    #[test]
    fn test_status_live_follows_active_match_in_execute_mode() {
        let mut engine = engine();
        lock(&mut engine);
        engine.save(32, 0, false);
        engine.set_mode(Mode::Execute);
        assert_eq!(engine.status().live, LiveStatus::Searching);

        engine.ingest(steady());
        assert_eq!(engine.status().live, LiveStatus::Matched);
        assert_eq!(engine.snapshot().map(|s| s.status), Some(LiveStatus::Matched));

        engine.body_lost(Utc::now());
        assert_eq!(engine.status().live, LiveStatus::Searching);
    }

    fn temp_pose_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pose-binder-{name}-{}.txt", std::process::id()))
    }

    #[test]
    fn test_failed_load_leaves_pose_file_untouched() {
        let path = temp_pose_path("broken");
        let mut text = String::from("65\n");
        for _ in 0..32 {
            text.push_str("1,0,0,0\n");
        }
        text.push_str("66\n1,0,0,0\n");
        std::fs::write(&path, &text).unwrap();

        let mut engine = engine();
        let mut pose_file = PoseFile::new(&path);
        assert!(pose_file.load_into(&mut engine).is_err());
        assert_eq!(engine.library().len(), 0);

        let written = pose_file.save_from(&engine).unwrap();
        assert_ne!(written, path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
        assert_eq!(std::fs::read_to_string(&written).unwrap(), "");

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&written);
    }

    #[test]
    fn test_pose_file_round_trip() {
        let path = temp_pose_path("roundtrip");
        let _ = std::fs::remove_file(&path);

        let mut engine = engine();
        let mut pose_file = PoseFile::new(&path);
        assert_eq!(pose_file.load_into(&mut engine).unwrap(), 0);
        lock(&mut engine);
        engine.save(7, 0, true);
        assert_eq!(pose_file.save_from(&engine).unwrap(), path);

        let mut next = self::engine();
        let mut reopened = PoseFile::new(&path);
        assert_eq!(reopened.load_into(&mut next).unwrap(), 1);
        assert_eq!(reopened.save_path(), path);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("Record"), Some(Mode::Record));
        assert_eq!(Mode::parse("exec"), Some(Mode::Execute));
        assert_eq!(Mode::parse("play"), None);
    }
}
