//! In-memory backend that plays a fixed script of tracker results.

use crate::backend::{BackendError, FrameResult, Topology, TrackingBackend};
use std::collections::VecDeque;

/// Plays a queue of [`FrameResult`]s, then fails like a disconnected device.
pub struct ScriptedBackend {
    topology: &'static Topology,
    script: VecDeque<FrameResult>,
    fail_open: Option<String>,
    open: bool,
}

impl ScriptedBackend {
    pub fn new(topology: &'static Topology, script: impl IntoIterator<Item = FrameResult>) -> Self {
        Self {
            topology,
            script: script.into_iter().collect(),
            fail_open: None,
            open: false,
        }
    }

    /// Make [`open`](TrackingBackend::open) fail with the given reason.
    pub fn failing_open(mut self, reason: impl Into<String>) -> Self {
        self.fail_open = Some(reason.into());
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl TrackingBackend for ScriptedBackend {
    fn open(&mut self) -> Result<(), BackendError> {
        if let Some(ref reason) = self.fail_open {
            return Err(BackendError::DeviceOpenFailed(reason.clone()));
        }
        self.open = true;
        Ok(())
    }

    fn next_frame(&mut self) -> FrameResult {
        self.script
            .pop_front()
            .unwrap_or_else(|| FrameResult::Failed("script exhausted".to_string()))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn topology(&self) -> &'static Topology {
        self.topology
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::topology::AZURE_KINECT;

    #[test]
    fn test_plays_script_then_fails() {
        let mut backend =
            ScriptedBackend::new(&AZURE_KINECT, [FrameResult::NoBody, FrameResult::Timeout]);
        assert!(!backend.is_open());
        backend.open().unwrap();
        assert!(backend.is_open());
        assert_eq!(backend.remaining(), 2);

        assert_eq!(backend.next_frame(), FrameResult::NoBody);
        assert_eq!(backend.next_frame(), FrameResult::Timeout);
        assert_eq!(backend.remaining(), 0);
        assert!(matches!(backend.next_frame(), FrameResult::Failed(_)));

        backend.close();
        assert!(!backend.is_open());
    }

    #[test]
    fn test_failing_open() {
        let mut backend = ScriptedBackend::new(&AZURE_KINECT, Vec::new()).failing_open("unplugged");
        assert!(matches!(
            backend.open(),
            Err(BackendError::DeviceOpenFailed(reason)) if reason == "unplugged"
        ));
        assert!(!backend.is_open());
    }
}
