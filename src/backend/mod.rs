//! Body-tracking backends.
//!
//! The pose engine only sees the [`TrackingBackend`] capability: open the
//! device, block for the next tracked body, close. Each physical tracker gets
//! its own implementation behind that trait.

pub mod replay;
pub mod scripted;
pub mod topology;

pub use replay::{write_recording, ReplayBackend};
pub use scripted::ScriptedBackend;
pub use topology::{JointDef, Topology, TopologyKind, AZURE_KINECT, KINECT_V2};

use crate::core::types::SkeletonFrame;

/// Result of one blocking wait on the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameResult {
    /// A body was tracked; the frame holds the first tracked body
    Body(SkeletonFrame),
    /// The tracker ran but saw nobody this tick
    NoBody,
    /// The wait expired. Never expected while waiting indefinitely
    Timeout,
    /// The tracker reported an error
    Failed(String),
}

/// Capability interface of a body tracker.
pub trait TrackingBackend: Send {
    /// Open and start the device. Failure here is not recoverable.
    fn open(&mut self) -> Result<(), BackendError>;

    /// Block until the tracker produces its next result.
    fn next_frame(&mut self) -> FrameResult;

    /// Stop the device and release it.
    fn close(&mut self);

    /// Skeleton layout of the frames this backend produces.
    fn topology(&self) -> &'static Topology;
}

/// Errors raised while bringing a tracker up.
#[derive(Debug)]
pub enum BackendError {
    /// No backend was configured or compiled in
    Unavailable(String),
    DeviceOpenFailed(String),
    /// A recording does not match the backend's topology
    TopologyMismatch { expected: usize, found: usize },
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Unavailable(e) => write!(f, "No tracking backend available: {e}"),
            BackendError::DeviceOpenFailed(e) => write!(f, "Failed to open tracking device: {e}"),
            BackendError::TopologyMismatch { expected, found } => write!(
                f,
                "Frame has {found} joints but the topology defines {expected}"
            ),
        }
    }
}

impl std::error::Error for BackendError {}
