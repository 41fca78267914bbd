//! Station data model
//!
//! Stations are read-only snapshots sourced from a [`StationStore`]. Optional
//! per-station alert settings are resolved to their defaults here so the
//! evaluators never deal with missing fields.
//!
//! [`StationStore`]: super::store::StationStore

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Consecutive probe failures before alerting, when a station sets none
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Hours without readings before alerting, when a station sets none
pub const DEFAULT_GAP_HOURS: u32 = 6;

/// Stable station identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub i64);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive acceptable range for a parameter; a missing bound is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ThresholdRule {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// True if `value` falls outside the configured bounds
    pub fn is_breached(&self, value: f64) -> bool {
        self.min.map_or(false, |min| value < min) || self.max.map_or(false, |max| value > max)
    }
}

impl fmt::Display for ThresholdRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.min {
            Some(min) => write!(f, "[{}, ", min)?,
            None => write!(f, "[-inf, ")?,
        }
        match self.max {
            Some(max) => write!(f, "{}]", max),
            None => write!(f, "+inf]"),
        }
    }
}

/// A monitored station and its alert settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    #[serde(default)]
    pub name: Option<String>,
    /// Consecutive failed probes before alerting (0 disables the check)
    #[serde(default)]
    pub alert_ping_failures: Option<u32>,
    /// Hours without any reading before alerting
    #[serde(default)]
    pub alert_gap_hours: Option<u32>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdRule>,
}

impl Station {
    pub fn new(id: i64) -> Self {
        Self {
            id: StationId(id),
            name: None,
            alert_ping_failures: None,
            alert_gap_hours: None,
            thresholds: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.alert_ping_failures = Some(threshold);
        self
    }

    pub fn with_gap_hours(mut self, hours: u32) -> Self {
        self.alert_gap_hours = Some(hours);
        self
    }

    pub fn with_threshold(mut self, parameter: impl Into<String>, rule: ThresholdRule) -> Self {
        self.thresholds.insert(parameter.into(), rule);
        self
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Station {}", self.id),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.alert_ping_failures.unwrap_or(DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn gap_hours(&self) -> u32 {
        self.alert_gap_hours.unwrap_or(DEFAULT_GAP_HOURS)
    }

    pub fn gap_threshold(&self) -> Duration {
        Duration::hours(i64::from(self.gap_hours()))
    }
}

/// Outcome of one reachability probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub station_id: StationId,
    pub success: bool,
    pub observed_at: DateTime<Utc>,
}

/// One sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: StationId,
    pub parameter: String,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

/// Newest value seen for a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestReading {
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

/// Most recent reading per station and parameter within a look-back window
#[derive(Debug, Clone, Default)]
pub struct LatestReadings {
    by_station: HashMap<StationId, HashMap<String, LatestReading>>,
}

impl LatestReadings {
    /// Keep the newest reading at or after `since` per (station, parameter).
    /// On equal timestamps the reading seen last wins.
    pub fn collect<'a, I>(readings: I, since: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a Reading>,
    {
        let mut latest = Self::default();
        for reading in readings {
            if reading.observed_at < since || reading.parameter.is_empty() {
                continue;
            }
            latest.offer(reading);
        }
        latest
    }

    fn offer(&mut self, reading: &Reading) {
        let params = self.by_station.entry(reading.station_id).or_default();
        let newer = params
            .get(&reading.parameter)
            .map_or(true, |prev| reading.observed_at >= prev.observed_at);
        if newer {
            params.insert(
                reading.parameter.clone(),
                LatestReading {
                    value: reading.value,
                    observed_at: reading.observed_at,
                },
            );
        }
    }

    pub fn for_station(&self, station: StationId) -> Option<&HashMap<String, LatestReading>> {
        self.by_station.get(&station)
    }

    /// Newest timestamp across all parameters of a station
    pub fn latest_timestamp(&self, station: StationId) -> Option<DateTime<Utc>> {
        self.by_station
            .get(&station)?
            .values()
            .map(|r| r.observed_at)
            .max()
    }

    pub fn station_count(&self) -> usize {
        self.by_station.len()
    }
}
