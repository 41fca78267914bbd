//! Alert evaluation and notification
//!
//! Computes three independent health signals per station (failure streak,
//! data freshness, threshold breaches), suppresses condition instances that
//! were already reported, and fans new alerts out to notification sinks.

pub mod candidate;
pub mod dedup;
pub mod dispatcher;
pub mod engine;
pub mod evaluators;
pub mod notifier;

pub use candidate::{AlertCandidate, AlertKind, Severity};
pub use dedup::DedupGuard;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use engine::{AlertEngine, EngineStats, EngineStatsSnapshot, PassReport};
pub use evaluators::{
    evaluate_failure_streak, evaluate_gap, evaluate_thresholds, FailureStreak, StreakPolicy,
};
pub use notifier::{
    sinks_from_settings, EmailSink, EnvSinkProvider, NotificationSink, NotifierError,
    SinkProvider, StaticSinks, WebhookSink,
};
