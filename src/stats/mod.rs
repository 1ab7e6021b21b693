//! Session statistics for the pose binder.
//!
//! Counts what the acquisition loop and the operator did, so a session can be
//! reviewed afterwards with `pose-binder status`.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, PersistedStats, SessionStats,
    SharedSessionStats, StatsSnapshot,
};
