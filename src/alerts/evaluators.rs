//! Health signal evaluators
//!
//! Each evaluator is a pure function over a read-only snapshot of one
//! station's history and returns the candidates it raises. Dedup keys encode
//! the condition instance:
//!
//! - failure streak: the streak length (or the streak's anchor, depending on
//!   [`StreakPolicy`]), so an escalating outage can re-alert
//! - gap: the configured gap hours, so a persistent gap alerts once
//! - threshold: the reading timestamp, so each new out-of-range sample alerts

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use super::candidate::{AlertCandidate, AlertKind, Severity};
use crate::config::ConfigError;
use crate::station::{LatestReading, ProbeResult, Station};

/// Minimum number of recent probes scanned for a failure streak
pub const PROBE_SEARCH_WINDOW: usize = 20;

/// How far back readings are considered for freshness and thresholds
pub const READING_LOOKBACK_DAYS: i64 = 7;

const TITLE_PREFIX: &str = "[StatMon]";

/// Probe results to fetch for a station with the given failure threshold
pub fn probe_window(threshold: u32) -> usize {
    PROBE_SEARCH_WINDOW.max(threshold as usize)
}

pub fn reading_lookback() -> Duration {
    Duration::days(READING_LOOKBACK_DAYS)
}

/// When a failure streak past its threshold is considered a new alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreakPolicy {
    /// Every additional consecutive failure past the threshold alerts again
    #[default]
    PerIncrement,
    /// One alert per outage, until a successful probe ends it
    OncePerStreak,
}

impl FromStr for StreakPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-increment" | "per_increment" | "increment" => Ok(StreakPolicy::PerIncrement),
            "once-per-streak" | "once_per_streak" | "once" => Ok(StreakPolicy::OncePerStreak),
            other => Err(ConfigError::InvalidValue {
                key: "streak policy".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for StreakPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreakPolicy::PerIncrement => f.write_str("per-increment"),
            StreakPolicy::OncePerStreak => f.write_str("once-per-streak"),
        }
    }
}

/// Consecutive failures counted from the most recent probe backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureStreak {
    pub count: usize,
    /// Successful probe that preceded the streak, if known
    pub last_success: Option<DateTime<Utc>>,
}

impl FailureStreak {
    /// Scan probes (most recent first) until the first success
    pub fn from_probes(probes: &[ProbeResult]) -> Self {
        let mut streak = Self::default();
        for probe in probes {
            if probe.success {
                streak.last_success = Some(probe.observed_at);
                break;
            }
            streak.count += 1;
        }
        streak
    }
}

pub fn evaluate_failure_streak(
    station: &Station,
    streak: &FailureStreak,
    policy: StreakPolicy,
) -> Option<AlertCandidate> {
    let threshold = station.failure_threshold();
    if threshold == 0 || streak.count < threshold as usize {
        return None;
    }

    let name = station.display_name();
    let dedup_key = match policy {
        StreakPolicy::PerIncrement => format!("pingfail:{}:{}", station.id, streak.count),
        StreakPolicy::OncePerStreak => format!(
            "pingfail:{}:after:{}",
            station.id,
            streak
                .last_success
                .map(format_timestamp)
                .unwrap_or_else(|| "never".to_string())
        ),
    };

    Some(AlertCandidate {
        station_id: station.id,
        kind: AlertKind::FailureStreak,
        dedup_key,
        severity: Severity::High,
        title: format!("{} Ping failure: {}", TITLE_PREFIX, name),
        body: format!(
            "{} has {} consecutive failed pings (threshold {}).",
            name, streak.count, threshold
        ),
    })
}

/// Raise a gap alert when a station has no readings, or its newest reading
/// is older than the station's gap threshold
pub fn evaluate_gap(
    station: &Station,
    latest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<AlertCandidate> {
    if let Some(ts) = latest {
        if now - ts <= station.gap_threshold() {
            return None;
        }
    }

    let name = station.display_name();
    let hours = station.gap_hours();
    let detail = match latest {
        Some(ts) => format!("last at {}", format_timestamp(ts)),
        None => "no data found".to_string(),
    };

    Some(AlertCandidate {
        station_id: station.id,
        kind: AlertKind::Gap,
        dedup_key: format!("gap:{}:{}", station.id, hours),
        severity: Severity::Medium,
        title: format!("{} Data gap: {}", TITLE_PREFIX, name),
        body: format!("{} has a data gap > {}h ({}).", name, hours, detail),
    })
}

/// Check each configured rule against the station's latest reading for that
/// parameter. Rules without a reading are skipped.
pub fn evaluate_thresholds(
    station: &Station,
    readings: Option<&HashMap<String, LatestReading>>,
) -> Vec<AlertCandidate> {
    let Some(readings) = readings else {
        return Vec::new();
    };

    let name = station.display_name();
    let mut candidates = Vec::new();

    for (parameter, rule) in &station.thresholds {
        let Some(reading) = readings.get(parameter) else {
            continue;
        };
        if !reading.value.is_finite() {
            tracing::warn!(
                station = %station.id,
                parameter = %parameter,
                "Skipping threshold check on non-finite reading"
            );
            continue;
        }
        if !rule.is_breached(reading.value) {
            continue;
        }

        let ts = format_timestamp(reading.observed_at);
        candidates.push(AlertCandidate {
            station_id: station.id,
            kind: AlertKind::Threshold,
            dedup_key: format!("thresh:{}:{}:{}", station.id, parameter, ts),
            severity: Severity::Medium,
            title: format!("{} Threshold: {}.{}", TITLE_PREFIX, name, parameter),
            body: format!("{}={} at {} outside {}.", parameter, reading.value, ts, rule),
        });
    }

    candidates
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::{StationId, ThresholdRule};
    use chrono::TimeZone;

    fn probes(pattern: &[bool], newest: DateTime<Utc>) -> Vec<ProbeResult> {
        pattern
            .iter()
            .enumerate()
            .map(|(i, &success)| ProbeResult {
                station_id: StationId(1),
                success,
                observed_at: newest - Duration::minutes(5 * i as i64),
            })
            .collect()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_streak_stops_at_first_success() {
        let now = fixed_now();
        let history = probes(&[false, false, false, true, false], now);
        let streak = FailureStreak::from_probes(&history);
        assert_eq!(streak.count, 3);
        assert_eq!(streak.last_success, Some(now - Duration::minutes(15)));

        let station = Station::new(1).with_name("Ridge");
        let alert = evaluate_failure_streak(&station, &streak, StreakPolicy::PerIncrement).unwrap();
        assert_eq!(alert.dedup_key, "pingfail:1:3");
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.title, "[StatMon] Ping failure: Ridge");
        assert_eq!(
            alert.body,
            "Ridge has 3 consecutive failed pings (threshold 3)."
        );

        let strict = Station::new(1).with_failure_threshold(5);
        assert!(evaluate_failure_streak(&strict, &streak, StreakPolicy::PerIncrement).is_none());
    }

    #[test]
    fn test_streak_threshold_zero_disables() {
        let streak = FailureStreak::from_probes(&probes(&[false; 10], fixed_now()));
        let station = Station::new(1).with_failure_threshold(0);
        assert!(evaluate_failure_streak(&station, &streak, StreakPolicy::PerIncrement).is_none());
    }

    #[test]
    fn test_streak_once_per_streak_key() {
        let now = fixed_now();
        let station = Station::new(4);

        let bounded = FailureStreak::from_probes(&probes(&[false, false, false, false, true], now));
        let alert = evaluate_failure_streak(&station, &bounded, StreakPolicy::OncePerStreak).unwrap();
        assert_eq!(alert.dedup_key, "pingfail:4:after:2026-03-01T11:40:00Z");

        let unbounded = FailureStreak::from_probes(&probes(&[false; 3], now));
        let alert = evaluate_failure_streak(&station, &unbounded, StreakPolicy::OncePerStreak).unwrap();
        assert_eq!(alert.dedup_key, "pingfail:4:after:never");
    }

    #[test]
    fn test_probe_window() {
        assert_eq!(probe_window(3), 20);
        assert_eq!(probe_window(50), 50);
    }

    #[test]
    fn test_gap_boundaries() {
        let now = fixed_now();
        let station = Station::new(2).with_name("Creek");

        let alert = evaluate_gap(&station, None, now).unwrap();
        assert_eq!(alert.dedup_key, "gap:2:6");
        assert_eq!(alert.body, "Creek has a data gap > 6h (no data found).");

        let stale = now - Duration::hours(6) - Duration::seconds(1);
        let alert = evaluate_gap(&station, Some(stale), now).unwrap();
        assert_eq!(
            alert.body,
            "Creek has a data gap > 6h (last at 2026-03-01T05:59:59Z)."
        );

        let fresh = now - Duration::hours(6) + Duration::seconds(1);
        assert!(evaluate_gap(&station, Some(fresh), now).is_none());

        let exact = now - Duration::hours(6);
        assert!(evaluate_gap(&station, Some(exact), now).is_none());
    }

    #[test]
    fn test_threshold_breaches() {
        let now = fixed_now();
        let station = Station::new(3)
            .with_name("Mesa")
            .with_threshold("Battery", ThresholdRule::new(Some(11.5), Some(14.5)))
            .with_threshold("X", ThresholdRule::new(None, Some(10.0)))
            .with_threshold("Unreported", ThresholdRule::new(Some(0.0), None));

        let mut readings = HashMap::new();
        readings.insert(
            "Battery".to_string(),
            LatestReading {
                value: 11.0,
                observed_at: now,
            },
        );
        readings.insert(
            "X".to_string(),
            LatestReading {
                value: 15.0,
                observed_at: now,
            },
        );

        let alerts = evaluate_thresholds(&station, Some(&readings));
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].title, "[StatMon] Threshold: Mesa.Battery");
        assert_eq!(
            alerts[0].body,
            "Battery=11 at 2026-03-01T12:00:00Z outside [11.5, 14.5]."
        );
        assert_eq!(alerts[0].dedup_key, "thresh:3:Battery:2026-03-01T12:00:00Z");
        assert_eq!(alerts[1].body, "X=15 at 2026-03-01T12:00:00Z outside [-inf, 10].");

        readings.insert(
            "Battery".to_string(),
            LatestReading {
                value: 12.0,
                observed_at: now,
            },
        );
        readings.insert(
            "X".to_string(),
            LatestReading {
                value: f64::NAN,
                observed_at: now,
            },
        );
        assert!(evaluate_thresholds(&station, Some(&readings)).is_empty());
        assert!(evaluate_thresholds(&station, None).is_empty());
    }

    #[test]
    fn test_streak_policy_parse() {
        assert_eq!("once-per-streak".parse::<StreakPolicy>().unwrap(), StreakPolicy::OncePerStreak);
        assert_eq!(" Per-Increment ".parse::<StreakPolicy>().unwrap(), StreakPolicy::PerIncrement);
        assert!("sometimes".parse::<StreakPolicy>().is_err());
        assert_eq!(StreakPolicy::OncePerStreak.to_string(), "once-per-streak");
    }
}
