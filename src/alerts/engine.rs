//! Alert evaluation pass
//!
//! One pass loads the station list and a shared 7-day readings snapshot,
//! runs the three evaluators per station, and dispatches every candidate
//! whose dedup key has not been seen before. A key counts as sent as soon as
//! dispatch is attempted, whatever the sinks report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::candidate::AlertCandidate;
use super::dedup::DedupGuard;
use super::dispatcher::Dispatcher;
use super::evaluators::{
    evaluate_failure_streak, evaluate_gap, evaluate_thresholds, probe_window, reading_lookback,
    FailureStreak, StreakPolicy,
};
use crate::scheduler::{Job, JobError};
use crate::station::{LatestReadings, Station, StationStore, StoreError};

/// Summary of one evaluation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub stations: usize,
    pub candidates: usize,
    pub dispatched: usize,
    pub suppressed: usize,
    /// Sink deliveries that failed, summed over dispatched alerts
    pub failed_deliveries: usize,
}

/// Counters shared with the status API
#[derive(Debug, Default)]
pub struct EngineStats {
    passes: AtomicU64,
    abandoned_passes: AtomicU64,
    candidates: AtomicU64,
    dispatched: AtomicU64,
    suppressed: AtomicU64,
    failed_deliveries: AtomicU64,
    tracked_keys: AtomicU64,
    last_pass_at: RwLock<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatsSnapshot {
    pub passes: u64,
    pub abandoned_passes: u64,
    pub candidates: u64,
    pub dispatched: u64,
    pub suppressed: u64,
    pub failed_deliveries: u64,
    pub tracked_keys: u64,
    pub last_pass_at: Option<DateTime<Utc>>,
}

impl EngineStats {
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            abandoned_passes: self.abandoned_passes.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            failed_deliveries: self.failed_deliveries.load(Ordering::Relaxed),
            tracked_keys: self.tracked_keys.load(Ordering::Relaxed),
            last_pass_at: *self.last_pass_at.read(),
        }
    }

    fn record_pass(&self, report: &PassReport, tracked_keys: usize, at: DateTime<Utc>) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.candidates
            .fetch_add(report.candidates as u64, Ordering::Relaxed);
        self.dispatched
            .fetch_add(report.dispatched as u64, Ordering::Relaxed);
        self.suppressed
            .fetch_add(report.suppressed as u64, Ordering::Relaxed);
        self.failed_deliveries
            .fetch_add(report.failed_deliveries as u64, Ordering::Relaxed);
        self.tracked_keys
            .store(tracked_keys as u64, Ordering::Relaxed);
        *self.last_pass_at.write() = Some(at);
    }
}

/// Stateful alert evaluator, registered with the scheduler as a job
pub struct AlertEngine {
    store: Arc<dyn StationStore>,
    dispatcher: Dispatcher,
    guard: DedupGuard,
    policy: StreakPolicy,
    stats: Arc<EngineStats>,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn StationStore>, dispatcher: Dispatcher, guard: DedupGuard) -> Self {
        Self {
            store,
            dispatcher,
            guard,
            policy: StreakPolicy::default(),
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn with_streak_policy(mut self, policy: StreakPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Run one evaluation pass as of `now`. A store failure while loading the
    /// stations or readings snapshot abandons the pass.
    pub async fn evaluate(&mut self, now: DateTime<Utc>) -> Result<PassReport, StoreError> {
        let stations = self.store.list_stations().await?;
        let readings = self.store.latest_readings(now - reading_lookback()).await?;

        let mut report = PassReport {
            stations: stations.len(),
            ..PassReport::default()
        };

        for station in &stations {
            for candidate in self.evaluate_station(station, &readings, now).await {
                report.candidates += 1;
                if self.guard.first_seen(&candidate.dedup_key) {
                    let delivery = self.dispatcher.dispatch(&candidate).await;
                    report.dispatched += 1;
                    report.failed_deliveries += delivery.failed.len();
                } else {
                    tracing::debug!(key = %candidate.dedup_key, "Suppressing duplicate alert");
                    report.suppressed += 1;
                }
            }
        }

        self.stats.record_pass(&report, self.guard.len(), now);
        tracing::info!(
            stations = report.stations,
            dispatched = report.dispatched,
            suppressed = report.suppressed,
            failed_deliveries = report.failed_deliveries,
            "Alert evaluation complete"
        );
        Ok(report)
    }

    async fn evaluate_station(
        &self,
        station: &Station,
        readings: &LatestReadings,
        now: DateTime<Utc>,
    ) -> Vec<AlertCandidate> {
        let mut candidates = Vec::new();

        match self.failure_streak(station).await {
            Ok(candidate) => candidates.extend(candidate),
            Err(e) => tracing::warn!(
                station = %station.id,
                error = %e,
                "Skipping failure-streak check"
            ),
        }

        candidates.extend(evaluate_gap(
            station,
            readings.latest_timestamp(station.id),
            now,
        ));
        candidates.extend(evaluate_thresholds(
            station,
            readings.for_station(station.id),
        ));
        candidates
    }

    async fn failure_streak(&self, station: &Station) -> Result<Option<AlertCandidate>, StoreError> {
        let threshold = station.failure_threshold();
        if threshold == 0 {
            return Ok(None);
        }

        let probes = self
            .store
            .recent_probe_results(station.id, probe_window(threshold))
            .await?;
        let mut streak = FailureStreak::from_probes(&probes);

        // The window held no success; anchor the streak on the store's last one
        if self.policy == StreakPolicy::OncePerStreak
            && streak.count >= threshold as usize
            && streak.last_success.is_none()
        {
            streak.last_success = self.store.last_successful_probe(station.id).await?;
        }

        Ok(evaluate_failure_streak(station, &streak, self.policy))
    }
}

#[async_trait]
impl Job for AlertEngine {
    async fn run(&mut self) -> Result<(), JobError> {
        if let Err(e) = self.evaluate(Utc::now()).await {
            self.stats.abandoned_passes.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "Alert evaluation abandoned");
        }
        Ok(())
    }
}
