//! Configuration for the pose binder.

use crate::backend::topology::{Topology, TopologyKind};
use crate::core::compare::{CompareSettings, DEFAULT_THRESHOLD};
use crate::core::engine::Mode;
use crate::core::stabilizer::STABILITY_FRAMES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Joints left out of comparisons unless configured otherwise.
///
/// Hand and finger orientations jitter far more than the rest of the body.
pub const DEFAULT_EXCLUDED_JOINTS: &[&str] = &[
    "hand_left",
    "handtip_left",
    "thumb_left",
    "hand_right",
    "handtip_right",
    "thumb_right",
];

/// Main configuration for the pose binder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Largest per-joint distance that still counts as the same pose
    pub threshold: f32,

    /// Window length that must be exceeded before a pose locks
    pub stability_frames: usize,

    /// Skeleton layout of the tracker
    pub topology: TopologyKind,

    /// Joint names ignored by comparisons
    pub excluded_joints: Vec<String>,

    /// Pose file imported at startup and written at exit
    pub pose_file: PathBuf,

    /// Path for storing session stats
    pub data_path: PathBuf,

    /// Mode a run starts in
    #[serde(default)]
    pub mode: Mode,

    /// Pacing between replayed tracker ticks
    #[serde(with = "duration_ms_serde")]
    pub frame_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pose-binder");

        Self {
            threshold: DEFAULT_THRESHOLD,
            stability_frames: STABILITY_FRAMES,
            topology: TopologyKind::AzureKinect,
            excluded_joints: DEFAULT_EXCLUDED_JOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            pose_file: data_dir.join("poses.txt"),
            data_path: data_dir,
            mode: Mode::Record,
            frame_interval: Duration::from_millis(33), // ~30 fps
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pose-binder")
            .join("config.json")
    }

    /// Where session stats are persisted.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("session_stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(parent) = self.pose_file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    pub fn topology(&self) -> &'static Topology {
        self.topology.topology()
    }

    /// Comparison settings for the configured topology.
    pub fn compare_settings(&self) -> Result<CompareSettings, ConfigError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        let mask = self
            .topology()
            .mask_excluding(&self.excluded_joints)
            .map_err(ConfigError::UnknownJoint)?;
        Ok(CompareSettings::new(mask, self.threshold))
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    UnknownJoint(String),
    InvalidThreshold(f32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::UnknownJoint(name) => write!(f, "Unknown joint: {name}"),
            ConfigError::InvalidThreshold(t) => {
                write!(f, "Threshold must be a non-negative number, got {t}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
