//! Interval-based job scheduler
//!
//! Registers named recurring jobs, runs the due ones each tick, isolates
//! their failures, and publishes a heartbeat snapshot for monitoring.

pub mod job;
pub mod runtime;
pub mod status;

pub use job::{Job, JobError};
pub use runtime::Scheduler;
pub use status::{HeartbeatJob, JobStatus, SchedulerStatus, StatusHandle};
