//! Job contract for the scheduler

use async_trait::async_trait;

/// A recurring unit of work driven by the [`Scheduler`](super::Scheduler)
///
/// Jobs run one at a time on the scheduler's task, so `run` may freely
/// mutate the job's own state.
#[async_trait]
pub trait Job: Send {
    async fn run(&mut self) -> Result<(), JobError>;
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }
}
