//! Daemon configuration
//!
//! Environment variables:
//! - STATMON_STORE_PATH: JSON fleet snapshot (default: data/fleet.json)
//! - STATMON_TICK_MS: scheduler tick cadence (default: 1000)
//! - STATMON_ALERT_INTERVAL_SECS: alert evaluation period (default: 300)
//! - STATMON_HEARTBEAT_INTERVAL_SECS: heartbeat log period (default: 60)
//! - STATMON_HTTP_ADDR: status server bind address (default: disabled)
//! - STATMON_STREAK_POLICY: per-increment | once-per-streak (default: per-increment)
//! - STATMON_DEDUP_RETENTION_HOURS: forget sent alert keys after this long
//!   (default: never, capped at 100 years)
//!
//! Notification settings are re-read on every dispatch:
//! - STATMON_TEAMS_WEBHOOK: chat webhook URL
//! - STATMON_SMTP_HOST, STATMON_SMTP_PORT (default: 587)
//! - STATMON_SMTP_USERNAME, STATMON_SMTP_PASSWORD
//! - STATMON_SMTP_FROM, STATMON_SMTP_TO (comma-separated)
//! - STATMON_NOTIFY_TIMEOUT_SECS: per-sink delivery timeout (default: 10)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::alerts::StreakPolicy;

/// Longest accepted dedup retention (100 years)
pub const MAX_DEDUP_RETENTION_HOURS: u64 = 100 * 365 * 24;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Daemon settings fixed at startup
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub store_path: PathBuf,
    pub tick_interval: Duration,
    pub alert_interval: Duration,
    pub heartbeat_interval: Duration,
    pub http_addr: Option<String>,
    pub streak_policy: StreakPolicy,
    pub dedup_retention: Option<Duration>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("data/fleet.json"),
            tick_interval: Duration::from_secs(1),
            alert_interval: Duration::from_secs(5 * 60),
            heartbeat_interval: Duration::from_secs(60),
            http_addr: None,
            streak_policy: StreakPolicy::PerIncrement,
            dedup_retention: None,
        }
    }
}

impl DaemonConfig {
    /// Heartbeat age after which the status API reports the daemon stale.
    /// Covers a full alert pass, since no tick is published while one runs.
    pub fn stale_after(&self) -> Duration {
        self.tick_interval * 10 + self.heartbeat_interval.max(self.alert_interval)
    }

    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; bad values fall back to defaults
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let store_path = lookup("STATMON_STORE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.store_path);
        let tick_interval = parse_var::<u64, _>(&lookup, "STATMON_TICK_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);
        let alert_interval = parse_var::<u64, _>(&lookup, "STATMON_ALERT_INTERVAL_SECS")
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.alert_interval);
        let heartbeat_interval = parse_var::<u64, _>(&lookup, "STATMON_HEARTBEAT_INTERVAL_SECS")
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.heartbeat_interval);
        let http_addr = lookup("STATMON_HTTP_ADDR").filter(|a| !a.trim().is_empty());
        let streak_policy = parse_var::<StreakPolicy, _>(&lookup, "STATMON_STREAK_POLICY")
            .unwrap_or(defaults.streak_policy);
        let dedup_retention = parse_var::<u64, _>(&lookup, "STATMON_DEDUP_RETENTION_HOURS")
            .filter(|h| *h > 0)
            .map(|h| {
                if h > MAX_DEDUP_RETENTION_HOURS {
                    tracing::warn!(
                        hours = h,
                        max = MAX_DEDUP_RETENTION_HOURS,
                        "Dedup retention too long, clamping"
                    );
                }
                Duration::from_secs(h.min(MAX_DEDUP_RETENTION_HOURS) * 3600)
            });

        Self {
            store_path,
            tick_interval,
            alert_interval,
            heartbeat_interval,
            http_addr,
            streak_policy,
            dedup_retention,
        }
    }
}

/// SMTP delivery settings
#[derive(Debug, Clone, PartialEq)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

/// Notification channel settings, looked up at dispatch time
#[derive(Debug, Clone, PartialEq)]
pub struct NotifySettings {
    pub teams_webhook: Option<String>,
    pub email: Option<EmailSettings>,
    pub timeout: Duration,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            teams_webhook: None,
            email: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl NotifySettings {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout = parse_var::<u64, _>(&lookup, "STATMON_NOTIFY_TIMEOUT_SECS")
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Self::default().timeout);

        let to: Vec<String> = non_empty("STATMON_SMTP_TO")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let email = match (non_empty("STATMON_SMTP_HOST"), non_empty("STATMON_SMTP_FROM")) {
            (Some(smtp_host), Some(from)) if !to.is_empty() => Some(EmailSettings {
                smtp_host,
                smtp_port: parse_var(&lookup, "STATMON_SMTP_PORT").unwrap_or(587),
                username: non_empty("STATMON_SMTP_USERNAME"),
                password: non_empty("STATMON_SMTP_PASSWORD"),
                from,
                to,
            }),
            _ => None,
        };

        Self {
            teams_webhook: non_empty("STATMON_TEAMS_WEBHOOK"),
            email,
            timeout,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_daemon_defaults() {
        let config = DaemonConfig::from_vars(vars(&[]));
        assert_eq!(config.store_path, PathBuf::from("data/fleet.json"));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.alert_interval, Duration::from_secs(300));
        assert_eq!(config.streak_policy, StreakPolicy::PerIncrement);
        assert!(config.http_addr.is_none());
        assert!(config.dedup_retention.is_none());
    }

    #[test]
    fn test_daemon_overrides_and_bad_values() {
        let config = DaemonConfig::from_vars(vars(&[
            ("STATMON_STORE_PATH", "/var/lib/statmon/fleet.json"),
            ("STATMON_TICK_MS", "250"),
            ("STATMON_ALERT_INTERVAL_SECS", "five"),
            ("STATMON_HTTP_ADDR", "127.0.0.1:9100"),
            ("STATMON_STREAK_POLICY", "once-per-streak"),
            ("STATMON_DEDUP_RETENTION_HOURS", "720"),
        ]));
        assert_eq!(config.store_path, PathBuf::from("/var/lib/statmon/fleet.json"));
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.alert_interval, Duration::from_secs(300));
        assert_eq!(config.http_addr.as_deref(), Some("127.0.0.1:9100"));
        assert_eq!(config.streak_policy, StreakPolicy::OncePerStreak);
        assert_eq!(config.dedup_retention, Some(Duration::from_secs(720 * 3600)));
    }

    #[test]
    fn test_stale_after_covers_alert_pass() {
        let config = DaemonConfig::default();
        assert_eq!(config.stale_after(), Duration::from_secs(10 + 300));

        let config = DaemonConfig::from_vars(vars(&[
            ("STATMON_ALERT_INTERVAL_SECS", "30"),
            ("STATMON_HEARTBEAT_INTERVAL_SECS", "120"),
        ]));
        assert_eq!(config.stale_after(), Duration::from_secs(10 + 120));
    }

    #[test]
    fn test_huge_retention_is_clamped() {
        let huge = (u64::MAX / 1000).to_string();
        let config =
            DaemonConfig::from_vars(vars(&[("STATMON_DEDUP_RETENTION_HOURS", huge.as_str())]));
        assert_eq!(
            config.dedup_retention,
            Some(Duration::from_secs(MAX_DEDUP_RETENTION_HOURS * 3600))
        );
    }

    #[test]
    fn test_notify_settings() {
        let settings = NotifySettings::from_vars(vars(&[]));
        assert_eq!(settings, NotifySettings::default());

        let settings = NotifySettings::from_vars(vars(&[
            ("STATMON_TEAMS_WEBHOOK", "https://example.com/hook"),
            ("STATMON_SMTP_HOST", "smtp.example.com"),
            ("STATMON_SMTP_FROM", "statmon@example.com"),
            ("STATMON_SMTP_TO", "ops@example.com, oncall@example.com,"),
            ("STATMON_NOTIFY_TIMEOUT_SECS", "3"),
        ]));
        assert_eq!(settings.teams_webhook.as_deref(), Some("https://example.com/hook"));
        assert_eq!(settings.timeout, Duration::from_secs(3));
        let email = settings.email.unwrap();
        assert_eq!(email.smtp_port, 587);
        assert_eq!(email.to, vec!["ops@example.com", "oncall@example.com"]);
        assert!(email.username.is_none());
    }

    #[test]
    fn test_email_requires_recipients() {
        let settings = NotifySettings::from_vars(vars(&[
            ("STATMON_SMTP_HOST", "smtp.example.com"),
            ("STATMON_SMTP_FROM", "statmon@example.com"),
        ]));
        assert!(settings.email.is_none());
    }
}
