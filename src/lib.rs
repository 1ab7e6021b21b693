//! Pose Binder - bind held body poses to keyboard keys.
//!
//! A skeletal tracker streams joint orientations. The engine waits for the
//! body to hold still, locks the pose, and lets the operator bind it to a key.
//! In execute mode live frames are matched against the bound poses and the
//! matching keys are fired.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Pose Binder                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────┐        │
//! │  │   Backend   │──▶│  Acquisition │──▶│ Pose Engine │        │
//! │  │(replay/...) │   │    worker    │   │ (stabilizer,│        │
//! │  └─────────────┘   └──────────────┘   │   library)  │        │
//! │                           │           └─────────────┘        │
//! │                           ▼                  ▲               │
//! │                    ┌─────────────┐   ┌─────────────┐         │
//! │                    │   Mailbox   │   │  Operator   │         │
//! │                    │ (snapshots) │   │  console    │         │
//! │                    └─────────────┘   └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pose_binder::backend::{ReplayBackend, AZURE_KINECT};
//! use pose_binder::core::{create_shared_engine, CompareSettings, PoseEngine};
//! use pose_binder::{AcquisitionWorker, create_shared_stats};
//!
//! let settings = CompareSettings::all_joints(AZURE_KINECT.joint_count());
//! let engine = create_shared_engine(PoseEngine::new(&AZURE_KINECT, settings, 30));
//! let mut worker = AcquisitionWorker::new(engine, create_shared_stats());
//!
//! worker
//!     .start(Box::new(ReplayBackend::new("session.jsonl", &AZURE_KINECT)))
//!     .expect("Failed to open tracker");
//!
//! // Render snapshots arrive through worker.take_snapshot()
//! ```

pub mod acquisition;
pub mod backend;
pub mod config;
pub mod core;
pub mod input;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use acquisition::{AcquisitionError, AcquisitionWorker, Mailbox};
pub use backend::{BackendError, FrameResult, Topology, TopologyKind, TrackingBackend};
pub use config::{Config, ConfigError};
pub use crate::core::{
    CompareSettings, JointMask, LiveStatus, Mode, PoseEngine, PoseLibrary, PoseRecord,
    RenderSnapshot, SharedEngine, SkeletonFrame,
};
pub use input::{CommandError, InputEvent, OperatorCommand, OperatorSession, CONSOLE_HELP};
pub use stats::{create_shared_stats, SessionStats, SharedSessionStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
