//! Scheduler heartbeat and status snapshots

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::job::{Job, JobError};

/// Point-in-time view of one registered job
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub period_secs: u64,
    pub runs: u64,
    pub failures: u64,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Point-in-time view of the scheduler, published after every tick
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub started_at: DateTime<Utc>,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub jobs: Vec<JobStatus>,
}

impl SchedulerStatus {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            ticks: 0,
            last_tick_at: None,
            jobs: Vec::new(),
        }
    }
}

/// Shared, read-mostly handle to the latest [`SchedulerStatus`]
#[derive(Debug, Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<SchedulerStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SchedulerStatus::new())),
        }
    }

    pub fn snapshot(&self) -> SchedulerStatus {
        self.inner.read().clone()
    }

    pub(crate) fn publish(&self, ticks: u64, last_tick_at: DateTime<Utc>, jobs: Vec<JobStatus>) {
        let mut status = self.inner.write();
        status.ticks = ticks;
        status.last_tick_at = Some(last_tick_at);
        status.jobs = jobs;
    }

    /// Time since the last completed tick, if any tick has run
    pub fn since_last_tick(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.inner.read().last_tick_at?;
        (now - last).to_std().ok()
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically logs scheduler liveness
pub struct HeartbeatJob {
    status: StatusHandle,
}

impl HeartbeatJob {
    pub fn new(status: StatusHandle) -> Self {
        Self { status }
    }
}

#[async_trait]
impl Job for HeartbeatJob {
    async fn run(&mut self) -> Result<(), JobError> {
        let status = self.status.snapshot();
        let failing: Vec<&str> = status
            .jobs
            .iter()
            .filter(|j| j.last_error.is_some())
            .map(|j| j.name.as_str())
            .collect();

        tracing::info!(
            ticks = status.ticks,
            jobs = status.jobs.len(),
            uptime_secs = (Utc::now() - status.started_at).num_seconds(),
            "Scheduler heartbeat"
        );
        if !failing.is_empty() {
            tracing::warn!(jobs = ?failing, "Jobs failing on their last run");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_publish() {
        let handle = StatusHandle::new();
        assert!(handle.since_last_tick(Utc::now()).is_none());

        let tick_at = Utc::now();
        handle.publish(
            3,
            tick_at,
            vec![JobStatus {
                name: "alert-evaluate".to_string(),
                period_secs: 300,
                runs: 1,
                failures: 0,
                last_fired_at: Some(tick_at),
                last_error: None,
            }],
        );

        let snapshot = handle.clone().snapshot();
        assert_eq!(snapshot.ticks, 3);
        assert_eq!(snapshot.jobs[0].name, "alert-evaluate");
        assert_eq!(
            handle.since_last_tick(tick_at + chrono::Duration::seconds(2)),
            Some(Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn test_heartbeat_runs() {
        let mut heartbeat = HeartbeatJob::new(StatusHandle::new());
        tokio_test::assert_ok!(heartbeat.run().await);
    }
}
