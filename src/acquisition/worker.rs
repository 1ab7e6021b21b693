//! Background acquisition loop.
//!
//! The worker thread blocks on the tracker, feeds every tracked body to the
//! shared engine, and hands the result to the render loop without waiting on
//! it. The running flag is only checked between tracker calls, so stopping
//! waits for the current call to return.

use crate::acquisition::mailbox::Mailbox;
use crate::backend::{BackendError, FrameResult, TrackingBackend};
use crate::core::engine::{lock_engine, SharedEngine};
use crate::core::snapshot::RenderSnapshot;
use crate::core::trigger::KeyTrigger;
use crate::stats::SharedSessionStats;
use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Capacity of the trigger channel. Triggers beyond it are dropped.
const TRIGGER_CAPACITY: usize = 1_024;

/// Errors that can occur while starting acquisition.
#[derive(Debug)]
pub enum AcquisitionError {
    Backend(BackendError),
    SpawnFailed(String),
}

impl std::fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionError::Backend(e) => write!(f, "Tracker initialization failed: {e}"),
            AcquisitionError::SpawnFailed(e) => {
                write!(f, "Failed to spawn acquisition thread: {e}")
            }
        }
    }
}

impl std::error::Error for AcquisitionError {}

impl From<BackendError> for AcquisitionError {
    fn from(e: BackendError) -> Self {
        AcquisitionError::Backend(e)
    }
}

/// Owns the acquisition thread and the channels it publishes on.
pub struct AcquisitionWorker {
    engine: SharedEngine,
    stats: SharedSessionStats,
    snapshots: Mailbox<RenderSnapshot>,
    trigger_sender: Sender<KeyTrigger>,
    trigger_receiver: Receiver<KeyTrigger>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AcquisitionWorker {
    pub fn new(engine: SharedEngine, stats: SharedSessionStats) -> Self {
        let (trigger_sender, trigger_receiver) = bounded(TRIGGER_CAPACITY);
        Self {
            engine,
            stats,
            snapshots: Mailbox::new(),
            trigger_sender,
            trigger_receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Open the tracker and start the acquisition thread.
    ///
    /// Calling this while a worker thread exists only logs. A tracker whose
    /// skeleton differs from the engine's, or that fails to open, is returned
    /// as an error and the worker stays idle.
    pub fn start(&mut self, mut backend: Box<dyn TrackingBackend>) -> Result<(), AcquisitionError> {
        if self.thread_handle.is_some() {
            warn!("Acquisition worker already started");
            return Ok(());
        }

        let expected = lock_engine(&self.engine).topology().joint_count();
        let found = backend.topology().joint_count();
        if expected != found {
            return Err(BackendError::TopologyMismatch { expected, found }.into());
        }

        backend.open()?;
        info!(
            topology = ?backend.topology().kind,
            joints = backend.topology().joint_count(),
            "Tracker opened"
        );

        self.running.store(true, Ordering::SeqCst);
        lock_engine(&self.engine).set_feed_stopped(false);

        let context = LoopContext {
            engine: self.engine.clone(),
            stats: self.stats.clone(),
            snapshots: self.snapshots.clone(),
            triggers: self.trigger_sender.clone(),
            running: self.running.clone(),
        };

        let handle = thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || run_acquisition_loop(backend, context))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                AcquisitionError::SpawnFailed(e.to_string())
            })?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop the acquisition thread and wait for it to finish.
    pub fn stop(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            info!("No acquisition worker running");
            return;
        };

        info!("Stopping acquisition worker...");
        self.running.store(false, Ordering::SeqCst);
        if handle.join().is_err() {
            error!("Acquisition thread panicked");
        }
    }

    /// Whether the acquisition loop is still pulling frames.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Latest render snapshot, if one arrived since the last call.
    pub fn take_snapshot(&self) -> Option<RenderSnapshot> {
        self.snapshots.take()
    }

    pub fn snapshots(&self) -> &Mailbox<RenderSnapshot> {
        &self.snapshots
    }

    /// Sender for key releases raised outside the acquisition thread.
    pub fn trigger_sink(&self) -> Sender<KeyTrigger> {
        self.trigger_sender.clone()
    }

    /// Receiver for key triggers fired in execute mode.
    pub fn triggers(&self) -> &Receiver<KeyTrigger> {
        &self.trigger_receiver
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }
}

impl Drop for AcquisitionWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.stop();
        }
    }
}

struct LoopContext {
    engine: SharedEngine,
    stats: SharedSessionStats,
    snapshots: Mailbox<RenderSnapshot>,
    triggers: Sender<KeyTrigger>,
    running: Arc<AtomicBool>,
}

impl LoopContext {
    fn forward(&self, triggers: Vec<KeyTrigger>) {
        if triggers.is_empty() {
            return;
        }
        self.stats.record_triggers(triggers.len() as u64);
        for trigger in triggers {
            debug!(key = trigger.key, action = ?trigger.action, "Key trigger");
            if self.triggers.try_send(trigger).is_err() {
                warn!("Trigger channel full, dropping trigger");
            }
        }
    }
}

fn run_acquisition_loop(mut backend: Box<dyn TrackingBackend>, ctx: LoopContext) {
    let mut failed = false;

    while ctx.running.load(Ordering::SeqCst) {
        match backend.next_frame() {
            FrameResult::Body(frame) => {
                ctx.stats.record_frame();
                let (outcome, snapshot) = {
                    let mut engine = lock_engine(&ctx.engine);
                    let outcome = engine.ingest(frame);
                    (outcome, engine.snapshot())
                };

                if outcome.locked.is_some() {
                    ctx.stats.record_lock();
                }
                if let Some(snapshot) = snapshot {
                    ctx.snapshots.publish(snapshot);
                }
                ctx.forward(outcome.triggers);
            }
            FrameResult::NoBody => {
                ctx.stats.record_empty_tick();
                let released = lock_engine(&ctx.engine).body_lost(Utc::now());
                ctx.forward(released);
            }
            FrameResult::Timeout => {
                error!("Tracker wait timed out while waiting indefinitely");
                failed = true;
                break;
            }
            FrameResult::Failed(reason) => {
                error!(%reason, "Tracker failed");
                failed = true;
                break;
            }
        }
    }

    if failed {
        lock_engine(&ctx.engine).set_feed_stopped(true);
    }
    backend.close();
    ctx.running.store(false, Ordering::SeqCst);
    info!("Acquisition stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ScriptedBackend, AZURE_KINECT, KINECT_V2};
    use crate::core::compare::CompareSettings;
    use crate::core::engine::{create_shared_engine, PoseEngine};
    use crate::core::types::{Confidence, SkeletonFrame};
    use crate::stats::create_shared_stats;
    use std::time::{Duration, Instant};

    fn worker() -> AcquisitionWorker {
        let engine = create_shared_engine(PoseEngine::new(
            &AZURE_KINECT,
            CompareSettings::all_joints(32),
            crate::core::STABILITY_FRAMES,
        ));
        AcquisitionWorker::new(engine, create_shared_stats())
    }

    fn wait_until_stopped(worker: &AcquisitionWorker) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!worker.is_running(), "acquisition loop did not stop");
    }

    #[test]
    fn test_open_failure_is_returned() {
        let mut worker = worker();
        let backend = ScriptedBackend::new(&AZURE_KINECT, Vec::new()).failing_open("no device");
        assert!(matches!(
            worker.start(Box::new(backend)),
            Err(AcquisitionError::Backend(_))
        ));
        assert!(!worker.is_running());
    }

    #[test]
    fn test_topology_mismatch_is_rejected() {
        let mut worker = worker();
        let backend = ScriptedBackend::new(&KINECT_V2, Vec::new());
        assert!(matches!(
            worker.start(Box::new(backend)),
            Err(AcquisitionError::Backend(BackendError::TopologyMismatch {
                expected: 32,
                found: 25
            }))
        ));
        assert!(!worker.is_running());
    }

    #[test]
    fn test_loop_stops_on_tracker_failure() {
        let mut worker = worker();
        let frame = SkeletonFrame::uniform(32, [1.0, 0.0, 0.0, 0.0], Confidence::High);
        let script = vec![
            FrameResult::Body(frame.clone()),
            FrameResult::NoBody,
            FrameResult::Body(frame),
            FrameResult::Timeout,
        ];
        worker.start(Box::new(ScriptedBackend::new(&AZURE_KINECT, script))).unwrap();
        wait_until_stopped(&worker);

        let engine = lock_engine(worker.engine());
        assert!(engine.feed_stopped());
        assert_eq!(engine.status().window_len, 2);
        drop(engine);

        assert!(worker.take_snapshot().is_some());
        worker.stop();
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut worker = worker();
        worker.stop();
        worker.stop();
        assert!(!worker.is_running());
    }
}
