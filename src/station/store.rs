//! Station store collaborators
//!
//! The alert engine only sees the [`StationStore`] trait. Two backends are
//! provided: [`MemoryStore`] for embedding and tests, and [`FileStore`] which
//! serves a JSON fleet snapshot from disk, re-parsing it only when the file
//! changes so edits take effect without a restart.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::model::{LatestReadings, ProbeResult, Reading, Station, StationId, ThresholdRule};

/// Read access to stations and their history
#[async_trait]
pub trait StationStore: Send + Sync {
    /// All monitored stations
    async fn list_stations(&self) -> Result<Vec<Station>, StoreError>;

    /// Newest reading per station and parameter observed at or after `since`
    async fn latest_readings(&self, since: DateTime<Utc>) -> Result<LatestReadings, StoreError>;

    /// Up to `limit` probe results for a station, most recent first
    async fn recent_probe_results(
        &self,
        station: StationId,
        limit: usize,
    ) -> Result<Vec<ProbeResult>, StoreError>;

    /// Time of the newest successful probe, if any
    async fn last_successful_probe(
        &self,
        station: StationId,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed store data: {0}")]
    Malformed(String),
}

/// Materialized fleet data shared by both backends
#[derive(Debug, Default)]
struct Fleet {
    stations: Vec<Station>,
    probes: HashMap<StationId, Vec<ProbeResult>>,
    readings: Vec<Reading>,
}

impl Fleet {
    fn recent_probes(&self, station: StationId, limit: usize) -> Vec<ProbeResult> {
        let mut probes = self.probes.get(&station).cloned().unwrap_or_default();
        // Stable sort keeps insertion order among equal timestamps
        probes.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        probes.truncate(limit);
        probes
    }

    fn last_success(&self, station: StationId) -> Option<DateTime<Utc>> {
        self.probes
            .get(&station)?
            .iter()
            .filter(|p| p.success)
            .map(|p| p.observed_at)
            .max()
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Thread-safe in-memory store with an append-only recording API
#[derive(Default)]
pub struct MemoryStore {
    fleet: RwLock<Fleet>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a station by id
    pub fn upsert_station(&self, station: Station) {
        let mut fleet = self.fleet.write();
        match fleet.stations.iter_mut().find(|s| s.id == station.id) {
            Some(existing) => *existing = station,
            None => fleet.stations.push(station),
        }
    }

    pub fn record_probe(&self, station: StationId, success: bool, observed_at: DateTime<Utc>) {
        let mut fleet = self.fleet.write();
        fleet.probes.entry(station).or_default().push(ProbeResult {
            station_id: station,
            success,
            observed_at,
        });
    }

    pub fn record_reading(
        &self,
        station: StationId,
        parameter: impl Into<String>,
        value: f64,
        observed_at: DateTime<Utc>,
    ) {
        let mut fleet = self.fleet.write();
        fleet.readings.push(Reading {
            station_id: station,
            parameter: parameter.into(),
            value,
            observed_at,
        });
    }
}

#[async_trait]
impl StationStore for MemoryStore {
    async fn list_stations(&self) -> Result<Vec<Station>, StoreError> {
        Ok(self.fleet.read().stations.clone())
    }

    async fn latest_readings(&self, since: DateTime<Utc>) -> Result<LatestReadings, StoreError> {
        Ok(LatestReadings::collect(&self.fleet.read().readings, since))
    }

    async fn recent_probe_results(
        &self,
        station: StationId,
        limit: usize,
    ) -> Result<Vec<ProbeResult>, StoreError> {
        Ok(self.fleet.read().recent_probes(station, limit))
    }

    async fn last_successful_probe(
        &self,
        station: StationId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.fleet.read().last_success(station))
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Store backed by a JSON fleet snapshot on disk
///
/// ```json
/// {
///   "stations": [{"id": 1, "name": "Ridge", "alert_thresholds": {"Battery": [11.5, 14.5]}}],
///   "probes": [{"station_id": 1, "success": false, "observed_at": "2026-01-01T00:00:00Z"}],
///   "readings": [{"station_id": 1, "name": "Battery", "value": 12.4, "observed_at": "2026-01-01T00:00:00Z"}]
/// }
/// ```
pub struct FileStore {
    path: PathBuf,
    cache: RwLock<Option<CachedFleet>>,
}

/// Parsed snapshot plus the file version it came from
struct CachedFleet {
    modified: SystemTime,
    len: u64,
    fleet: Arc<Fleet>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current fleet snapshot. The file is re-parsed only when its
    /// modification time or length differs from the cached version.
    async fn load(&self) -> Result<Arc<Fleet>, StoreError> {
        let unavailable = |e: std::io::Error| {
            StoreError::Unavailable(format!("{}: {}", self.path.display(), e))
        };

        let metadata = tokio::fs::metadata(&self.path).await.map_err(unavailable)?;
        let modified = metadata.modified().map_err(unavailable)?;
        let len = metadata.len();

        if let Some(cached) = self.cache.read().as_ref() {
            if cached.modified == modified && cached.len == len {
                return Ok(Arc::clone(&cached.fleet));
            }
        }

        let bytes = tokio::fs::read(&self.path).await.map_err(unavailable)?;
        let file: FleetFile = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Malformed(format!("{}: {}", self.path.display(), e)))?;
        let fleet = Arc::new(file.into_fleet());
        tracing::debug!(
            path = %self.path.display(),
            stations = fleet.stations.len(),
            "Loaded fleet snapshot"
        );

        *self.cache.write() = Some(CachedFleet {
            modified,
            len,
            fleet: Arc::clone(&fleet),
        });
        Ok(fleet)
    }
}

#[async_trait]
impl StationStore for FileStore {
    async fn list_stations(&self) -> Result<Vec<Station>, StoreError> {
        Ok(self.load().await?.stations.clone())
    }

    async fn latest_readings(&self, since: DateTime<Utc>) -> Result<LatestReadings, StoreError> {
        Ok(LatestReadings::collect(&self.load().await?.readings, since))
    }

    async fn recent_probe_results(
        &self,
        station: StationId,
        limit: usize,
    ) -> Result<Vec<ProbeResult>, StoreError> {
        Ok(self.load().await?.recent_probes(station, limit))
    }

    async fn last_successful_probe(
        &self,
        station: StationId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.load().await?.last_success(station))
    }
}

#[derive(Debug, Deserialize)]
struct FleetFile {
    #[serde(default)]
    stations: Vec<StationRecord>,
    #[serde(default)]
    probes: Vec<ProbeResult>,
    #[serde(default)]
    readings: Vec<ReadingRecord>,
}

#[derive(Debug, Deserialize)]
struct StationRecord {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    alert_ping_failures: Option<JsonValue>,
    #[serde(default)]
    alert_gap_hours: Option<JsonValue>,
    #[serde(default)]
    alert_thresholds: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct ReadingRecord {
    station_id: i64,
    #[serde(default)]
    name: Option<String>,
    value: JsonValue,
    observed_at: DateTime<Utc>,
}

impl FleetFile {
    fn into_fleet(self) -> Fleet {
        let stations = self
            .stations
            .into_iter()
            .map(StationRecord::into_station)
            .collect();

        let mut probes: HashMap<StationId, Vec<ProbeResult>> = HashMap::new();
        for probe in self.probes {
            probes.entry(probe.station_id).or_default().push(probe);
        }

        let readings = self
            .readings
            .into_iter()
            .filter_map(ReadingRecord::into_reading)
            .collect();

        Fleet {
            stations,
            probes,
            readings,
        }
    }
}

impl StationRecord {
    fn into_station(self) -> Station {
        let id = StationId(self.id);
        let thresholds = match &self.alert_thresholds {
            Some(raw) => parse_threshold_rules(raw).unwrap_or_else(|e| {
                tracing::warn!(station = %id, error = %e, "Ignoring alert_thresholds");
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };

        Station {
            id,
            name: self.name,
            alert_ping_failures: self.alert_ping_failures.as_ref().and_then(json_to_u32),
            alert_gap_hours: self.alert_gap_hours.as_ref().and_then(json_to_u32),
            thresholds,
        }
    }
}

impl ReadingRecord {
    fn into_reading(self) -> Option<Reading> {
        let parameter = self.name.filter(|n| !n.is_empty())?;
        let Some(value) = json_to_f64(&self.value) else {
            tracing::debug!(
                station = self.station_id,
                parameter = %parameter,
                "Skipping non-numeric reading"
            );
            return None;
        };
        Some(Reading {
            station_id: StationId(self.station_id),
            parameter,
            value,
            observed_at: self.observed_at,
        })
    }
}

/// Parse `{"Param": [min|null, max|null], ...}` given as an object or a
/// JSON-encoded string. Entries that are not two-element arrays are skipped.
pub fn parse_threshold_rules(raw: &JsonValue) -> Result<BTreeMap<String, ThresholdRule>, StoreError> {
    let parsed;
    let object = match raw {
        JsonValue::Null => return Ok(BTreeMap::new()),
        JsonValue::String(s) if s.trim().is_empty() => return Ok(BTreeMap::new()),
        JsonValue::String(s) => {
            parsed = serde_json::from_str::<JsonValue>(s)
                .map_err(|e| StoreError::Malformed(format!("thresholds: {}", e)))?;
            match &parsed {
                JsonValue::Object(map) => map,
                JsonValue::Null => return Ok(BTreeMap::new()),
                other => {
                    return Err(StoreError::Malformed(format!(
                        "thresholds: expected object, got {}",
                        other
                    )))
                }
            }
        }
        JsonValue::Object(map) => map,
        other => {
            return Err(StoreError::Malformed(format!(
                "thresholds: expected object, got {}",
                other
            )))
        }
    };

    let mut rules = BTreeMap::new();
    for (parameter, bounds) in object {
        match bounds.as_array().map(Vec::as_slice) {
            Some([min, max]) => {
                rules.insert(
                    parameter.clone(),
                    ThresholdRule::new(json_to_f64(min), json_to_f64(max)),
                );
            }
            _ => {
                tracing::warn!(parameter = %parameter, "Skipping malformed threshold rule");
            }
        }
    }
    Ok(rules)
}

fn json_to_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Lenient station setting; negative values mean disabled and clamp to zero
fn json_to_u32(value: &JsonValue) -> Option<u32> {
    let raw = match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        JsonValue::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if raw < 0 {
        tracing::warn!(value = raw, "Negative station setting, treating as 0");
    }
    u32::try_from(raw.max(0)).ok()
}
