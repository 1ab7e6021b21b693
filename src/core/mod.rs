//! Core pose engine.
//!
//! This module contains:
//! - The skeleton data model and joint masks
//! - Pose comparison and settle detection
//! - The library of key-bound poses and its file format
//! - Key triggers for bound poses matched live

pub mod compare;
pub mod engine;
pub mod library;
pub mod settle;
pub mod snapshot;
pub mod stabilizer;
pub mod trigger;
pub mod types;

// Re-export commonly used types
pub use compare::{compare, CompareSettings, DEFAULT_THRESHOLD};
pub use engine::{
    create_shared_engine, lock_engine, EngineError, EngineStatus, FrameOutcome, Mode, PoseEngine,
    PoseFile, SharedEngine,
};
pub use library::{LibraryError, PoseLibrary, PoseRecord};
pub use settle::SettleReport;
pub use snapshot::RenderSnapshot;
pub use stabilizer::{
    LiveStatus, PoseStabilizer, StabilizerState, StabilizerUpdate, STABILITY_FRAMES,
};
pub use trigger::{KeyTrigger, TriggerAction, TriggerTracker};
pub use types::{Confidence, JointMask, JointOrientation, SkeletonFrame, USABLE_CONFIDENCE};
