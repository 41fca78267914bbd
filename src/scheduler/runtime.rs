//! Cooperative interval scheduler
//!
//! Jobs are executed sequentially on the caller's task. A job is due when at
//! least its period has elapsed since it last fired; a freshly registered job
//! is due on the first tick. The fire time advances whether the job succeeds,
//! fails, or panics, so a broken job is retried on schedule rather than in a
//! tight loop.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::time::MissedTickBehavior;

use super::job::Job;
use super::status::{JobStatus, StatusHandle};

struct ScheduledJob {
    name: String,
    period: Duration,
    last_fired_at: Option<Instant>,
    job: Box<dyn Job>,
    runs: u64,
    failures: u64,
    last_fired_wall: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl ScheduledJob {
    fn is_due(&self, now: Instant) -> bool {
        self.last_fired_at
            .map_or(true, |last| now.saturating_duration_since(last) >= self.period)
    }

    fn status(&self) -> JobStatus {
        JobStatus {
            name: self.name.clone(),
            period_secs: self.period.as_secs(),
            runs: self.runs,
            failures: self.failures,
            last_fired_at: self.last_fired_wall,
            last_error: self.last_error.clone(),
        }
    }
}

/// Registry of named recurring jobs plus the runtime that drives them
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    ticks: u64,
    status: StatusHandle,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_status(StatusHandle::new())
    }

    /// Publish status snapshots into an existing handle
    pub fn with_status(status: StatusHandle) -> Self {
        Self {
            jobs: Vec::new(),
            ticks: 0,
            status,
        }
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Register a job; it runs on the next tick and then every `period`
    pub fn register(&mut self, name: impl Into<String>, period: Duration, job: impl Job + 'static) {
        let name = name.into();
        tracing::info!(job = %name, "Scheduled job every {:?}", period);
        self.jobs.push(ScheduledJob {
            name,
            period,
            last_fired_at: None,
            job: Box::new(job),
            runs: 0,
            failures: 0,
            last_fired_wall: None,
            last_error: None,
        });
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    /// Run every job that is due now
    pub async fn tick(&mut self) -> usize {
        self.tick_at(Instant::now()).await
    }

    /// Run every job due at `now`, in registration order. Returns the number
    /// of jobs executed.
    pub async fn tick_at(&mut self, now: Instant) -> usize {
        let wall = Utc::now();
        let mut executed = 0;

        for entry in self.jobs.iter_mut().filter(|j| j.is_due(now)) {
            executed += 1;
            tracing::debug!(job = %entry.name, "Running job");

            let outcome = AssertUnwindSafe(entry.job.run()).catch_unwind().await;
            entry.runs += 1;
            match outcome {
                Ok(Ok(())) => {
                    entry.last_error = None;
                }
                Ok(Err(e)) => {
                    entry.failures += 1;
                    tracing::error!(job = %entry.name, error = %e, "Job failed");
                    entry.last_error = Some(e.to_string());
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    entry.failures += 1;
                    tracing::error!(job = %entry.name, panic = %message, "Job panicked");
                    entry.last_error = Some(format!("panicked: {}", message));
                }
            }

            entry.last_fired_at = Some(now);
            entry.last_fired_wall = Some(wall);
        }

        self.ticks += 1;
        self.status.publish(
            self.ticks,
            Utc::now(),
            self.jobs.iter().map(ScheduledJob::status).collect(),
        );
        executed
    }

    /// Tick every `tick_interval` until `shutdown` resolves. Shutdown is only
    /// observed between ticks; a running job always completes.
    pub async fn run_until<F>(&mut self, tick_interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            jobs = self.jobs.len(),
            "Scheduler started with tick {:?}",
            tick_interval
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!(ticks = self.ticks, "Scheduler stopped");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
