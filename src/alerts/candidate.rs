//! Alert candidates produced by the evaluators

use std::fmt;

use serde::Serialize;

use crate::station::StationId;

/// Which health signal raised the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    FailureStreak,
    Gap,
    Threshold,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::FailureStreak => "failure-streak",
            AlertKind::Gap => "gap",
            AlertKind::Threshold => "threshold",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Card accent color for chat webhooks
    pub fn theme_color(&self) -> &'static str {
        match self {
            Severity::Low => "2E86C1",
            Severity::Medium => "F39C12",
            Severity::High => "C0392B",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A condition instance that may be notified, keyed for deduplication
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCandidate {
    pub station_id: StationId,
    pub kind: AlertKind,
    pub dedup_key: String,
    pub severity: Severity,
    pub title: String,
    pub body: String,
}
