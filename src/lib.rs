//! StatMon: station health monitoring daemon
//!
//! Periodically evaluates a fleet of monitored stations and raises alerts
//! when a station stops answering probes, stops reporting data, or reports a
//! reading outside its configured bounds.
//!
//! # Features
//!
//! - **Interval Scheduler**: named recurring jobs with failure isolation
//! - **Failure Streaks**: consecutive failed probes against a per-station threshold
//! - **Data Gaps**: stale newest reading against a per-station gap window
//! - **Threshold Breaches**: latest value per parameter against min/max rules
//! - **Deduplication**: each condition instance is reported once
//! - **Notification Fan-out**: chat webhook and SMTP email, failures isolated
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use statmon::alerts::{AlertEngine, DedupGuard, Dispatcher, EnvSinkProvider};
//! use statmon::station::MemoryStore;
//!
//! # async fn demo() {
//! let store = Arc::new(MemoryStore::new());
//! let mut engine = AlertEngine::new(store, Dispatcher::new(EnvSinkProvider), DedupGuard::new());
//! let report = engine.evaluate(chrono::Utc::now()).await.unwrap();
//! println!("Dispatched {} alerts", report.dispatched);
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod scheduler;
pub mod station;

// Re-export commonly used types
pub use alerts::{AlertCandidate, AlertEngine, AlertKind, Severity};
pub use config::{DaemonConfig, NotifySettings};
pub use scheduler::{Job, JobError, Scheduler};
pub use station::{Station, StationId, StationStore};
