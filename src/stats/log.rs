//! Session counters for the acquisition loop and the operator.
//!
//! Counters are atomics so the acquisition thread and the operator console
//! can record into the same log without taking the engine lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Statistics for the current session.
#[derive(Debug)]
pub struct SessionStats {
    /// Frames with a tracked body
    frames_received: AtomicU64,
    /// Tracker ticks with nobody in view
    empty_ticks: AtomicU64,
    /// Searching→Locked transitions
    poses_locked: AtomicU64,
    /// Poses bound to a key
    poses_saved: AtomicU64,
    /// Key triggers sent to the injector
    triggers_fired: AtomicU64,
    session_id: Uuid,
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            empty_ticks: AtomicU64::new(0),
            poses_locked: AtomicU64::new(0),
            poses_saved: AtomicU64::new(0),
            triggers_fired: AtomicU64::new(0),
            session_id: Uuid::new_v4(),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that continue the totals stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            warn!("Could not load previous session stats: {e}");
        }

        stats
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_tick(&self) {
        self.empty_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock(&self) {
        self.poses_locked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save(&self) {
        self.poses_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_triggers(&self, count: u64) {
        self.triggers_fired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            empty_ticks: self.empty_ticks.load(Ordering::Relaxed),
            poses_locked: self.poses_locked.load(Ordering::Relaxed),
            poses_saved: self.poses_saved.load(Ordering::Relaxed),
            triggers_fired: self.triggers_fired.load(Ordering::Relaxed),
            session_id: self.session_id,
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Session: {}\n\
             - Frames tracked: {}\n\
             - Ticks without a body: {}\n\
             - Poses locked: {}\n\
             - Poses saved: {}\n\
             - Key triggers fired: {}\n\
             - Session duration: {} seconds",
            stats.session_id,
            stats.frames_received,
            stats.empty_ticks,
            stats.poses_locked,
            stats.poses_saved,
            stats.triggers_fired,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                frames_received: stats.frames_received,
                empty_ticks: stats.empty_ticks,
                poses_locked: stats.poses_locked,
                poses_saved: stats.poses_saved,
                triggers_fired: stats.triggers_fired,
                last_session: Some(stats.session_id),
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_received
                    .store(persisted.frames_received, Ordering::Relaxed);
                self.empty_ticks
                    .store(persisted.empty_ticks, Ordering::Relaxed);
                self.poses_locked
                    .store(persisted.poses_locked, Ordering::Relaxed);
                self.poses_saved
                    .store(persisted.poses_saved, Ordering::Relaxed);
                self.triggers_fired
                    .store(persisted.triggers_fired, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of the counters at one moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub empty_ticks: u64,
    pub poses_locked: u64,
    pub poses_saved: u64,
    pub triggers_fired: u64,
    pub session_id: Uuid,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub frames_received: u64,
    pub empty_ticks: u64,
    pub poses_locked: u64,
    pub poses_saved: u64,
    pub triggers_fired: u64,
    #[serde(default)]
    pub last_session: Option<Uuid>,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared session stats.
pub type SharedSessionStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedSessionStats {
    Arc::new(SessionStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_counting() {
        let stats = SessionStats::new();

        stats.record_frame();
        stats.record_frame();
        stats.record_empty_tick();
        stats.record_lock();
        stats.record_triggers(3);

        let snapshot = stats.stats();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.empty_ticks, 1);
        assert_eq!(snapshot.poses_locked, 1);
        assert_eq!(snapshot.triggers_fired, 3);
        assert_eq!(snapshot.session_id, stats.session_id());
    }

    #[test]
    fn test_stats_persist_across_sessions() {
        let path = std::env::temp_dir().join(format!(
            "pose-binder-stats-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let first = SessionStats::with_persistence(path.clone());
        first.record_frame();
        first.record_save();
        first.save().unwrap();

        let second = SessionStats::with_persistence(path.clone());
        assert_eq!(second.stats().frames_received, 1);
        assert_eq!(second.stats().poses_saved, 1);
        assert_ne!(second.session_id(), first.session_id());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_summary_format() {
        let summary = SessionStats::new().summary();
        assert!(summary.contains("Frames tracked"));
        assert!(summary.contains("Poses saved"));
        assert!(summary.contains("Key triggers fired"));
    }
}
