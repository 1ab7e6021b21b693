//! Frame acquisition for the pose binder.
//!
//! A background worker pulls tracked bodies from a backend and drives the
//! shared pose engine; the render loop picks results up from a mailbox.

pub mod mailbox;
pub mod worker;

pub use mailbox::Mailbox;
pub use worker::{AcquisitionError, AcquisitionWorker};
