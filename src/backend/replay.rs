//! Replay of a recorded tracking session.
//!
//! A recording is JSON lines: one [`SkeletonFrame`] per tick, or `null` for a
//! tick where the tracker saw nobody. Frames are replayed at a fixed interval
//! so the stream looks like a live camera.

use crate::backend::{BackendError, FrameResult, Topology, TrackingBackend};
use crate::core::types::SkeletonFrame;
use chrono::Utc;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Plays a JSON-lines recording back as if it came from a tracker.
pub struct ReplayBackend {
    path: PathBuf,
    topology: &'static Topology,
    frame_interval: Option<Duration>,
    looping: bool,
    ticks: Vec<Option<SkeletonFrame>>,
    cursor: usize,
    open: bool,
}

impl ReplayBackend {
    pub fn new(path: impl Into<PathBuf>, topology: &'static Topology) -> Self {
        Self {
            path: path.into(),
            topology,
            frame_interval: None,
            looping: false,
            ticks: Vec::new(),
            cursor: 0,
            open: false,
        }
    }

    /// Sleep this long before every tick.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Start over from the first tick at the end of the recording.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Number of ticks loaded by [`open`](TrackingBackend::open).
    pub fn tick_count(&self) -> usize {
        self.ticks.len()
    }

    fn load(&self) -> Result<Vec<Option<SkeletonFrame>>, BackendError> {
        let file = std::fs::File::open(&self.path).map_err(|e| {
            BackendError::DeviceOpenFailed(format!("{}: {e}", self.path.display()))
        })?;

        let mut ticks = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| BackendError::DeviceOpenFailed(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let tick: Option<SkeletonFrame> = serde_json::from_str(&line).map_err(|e| {
                BackendError::DeviceOpenFailed(format!("line {}: {e}", number + 1))
            })?;
            if let Some(ref frame) = tick {
                if frame.joint_count() != self.topology.joint_count() {
                    return Err(BackendError::TopologyMismatch {
                        expected: self.topology.joint_count(),
                        found: frame.joint_count(),
                    });
                }
            }
            ticks.push(tick);
        }
        Ok(ticks)
    }
}

impl TrackingBackend for ReplayBackend {
    fn open(&mut self) -> Result<(), BackendError> {
        self.ticks = self.load()?;
        self.cursor = 0;
        self.open = true;
        info!(
            path = %self.path.display(),
            ticks = self.ticks.len(),
            "Opened replay recording"
        );
        Ok(())
    }

    fn next_frame(&mut self) -> FrameResult {
        if !self.open {
            return FrameResult::Failed("replay is not open".to_string());
        }
        if let Some(interval) = self.frame_interval {
            thread::sleep(interval);
        }
        if self.cursor >= self.ticks.len() {
            if !self.looping || self.ticks.is_empty() {
                return FrameResult::Failed("end of recording".to_string());
            }
            debug!("Replay wrapped around");
            self.cursor = 0;
        }

        let tick = self.ticks[self.cursor].clone();
        self.cursor += 1;
        match tick {
            // Recorded timestamps are replaced so hold timing follows the replay clock.
            Some(mut frame) => {
                frame.timestamp = Utc::now();
                FrameResult::Body(frame)
            }
            None => FrameResult::NoBody,
        }
    }

    fn close(&mut self) {
        self.open = false;
        self.ticks.clear();
    }

    fn topology(&self) -> &'static Topology {
        self.topology
    }
}

/// Write ticks in the format [`ReplayBackend`] reads.
pub fn write_recording(path: &Path, ticks: &[Option<SkeletonFrame>]) -> std::io::Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for tick in ticks {
        let line = serde_json::to_string(tick).map_err(std::io::Error::other)?;
        writeln!(file, "{line}")?;
    }
    file.flush()
}
