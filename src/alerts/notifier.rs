//! Notification sinks for alerts
//!
//! A sink delivers one alert to one external channel. The set of sinks is
//! resolved by a [`SinkProvider`] on every dispatch, so channel settings can
//! change without restarting the daemon.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::candidate::AlertCandidate;
use crate::config::{EmailSettings, NotifySettings};

/// One notification channel
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Channel name used in logs and dispatch reports
    fn name(&self) -> &str;

    async fn send(&self, alert: &AlertCandidate) -> Result<(), NotifierError>;
}

/// Resolves the sinks an alert should be delivered to
pub trait SinkProvider: Send + Sync {
    fn sinks(&self) -> Vec<Arc<dyn NotificationSink>>;
}

/// Builds sinks from `STATMON_*` environment variables on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSinkProvider;

impl SinkProvider for EnvSinkProvider {
    fn sinks(&self) -> Vec<Arc<dyn NotificationSink>> {
        sinks_from_settings(&NotifySettings::from_env())
    }
}

/// Fixed sink list, for embedding and tests
#[derive(Clone, Default)]
pub struct StaticSinks(pub Vec<Arc<dyn NotificationSink>>);

impl SinkProvider for StaticSinks {
    fn sinks(&self) -> Vec<Arc<dyn NotificationSink>> {
        self.0.clone()
    }
}

/// Instantiate every channel configured in `settings`
pub fn sinks_from_settings(settings: &NotifySettings) -> Vec<Arc<dyn NotificationSink>> {
    let mut sinks: Vec<Arc<dyn NotificationSink>> = Vec::new();

    if let Some(url) = &settings.teams_webhook {
        match WebhookSink::new(url.clone(), settings.timeout) {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => tracing::error!(error = %e, "Failed to build webhook sink"),
        }
    }

    if let Some(email) = &settings.email {
        sinks.push(Arc::new(EmailSink::new(email.clone(), settings.timeout)));
    }

    sinks
}

// ============================================================================
// Chat webhook
// ============================================================================

/// Posts a MessageCard to a Teams-style incoming webhook
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Webhook(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    fn card(alert: &AlertCandidate) -> serde_json::Value {
        serde_json::json!({
            "@type": "MessageCard",
            "@context": "https://schema.org/extensions",
            "summary": alert.title,
            "themeColor": alert.severity.theme_color(),
            "title": alert.title,
            "text": alert.body,
            "sections": [{
                "facts": [
                    { "name": "Severity", "value": alert.severity.as_str().to_uppercase() },
                    { "name": "Station", "value": alert.station_id.to_string() },
                    { "name": "Condition", "value": alert.kind.as_str() },
                    { "name": "Raised", "value": chrono::Utc::now().to_rfc3339() },
                ]
            }]
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "teams-webhook"
    }

    async fn send(&self, alert: &AlertCandidate) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::card(alert))
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(key = %alert.dedup_key, url = %self.url, "Webhook notification sent");
        Ok(())
    }
}

// ============================================================================
// Email
// ============================================================================

/// Sends a plain-text email over SMTP with STARTTLS
pub struct EmailSink {
    settings: EmailSettings,
    timeout: Duration,
}

impl EmailSink {
    pub fn new(settings: EmailSettings, timeout: Duration) -> Self {
        Self { settings, timeout }
    }

    fn build_message(&self, alert: &AlertCandidate) -> Result<lettre::Message, NotifierError> {
        use lettre::message::header::ContentType;
        use lettre::message::Mailbox;

        let parse = |addr: &str| {
            addr.parse::<Mailbox>()
                .map_err(|e| NotifierError::Email(format!("Invalid address {}: {}", addr, e)))
        };

        let mut builder = lettre::Message::builder()
            .from(parse(&self.settings.from)?)
            .subject(alert.title.clone())
            .header(ContentType::TEXT_PLAIN);
        for to in &self.settings.to {
            builder = builder.to(parse(to)?);
        }

        builder
            .body(format!(
                "{}\n\nSeverity: {}\nStation: {}\nCondition: {}\n",
                alert.body,
                alert.severity.as_str().to_uppercase(),
                alert.station_id,
                alert.kind
            ))
            .map_err(|e| NotifierError::Email(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, alert: &AlertCandidate) -> Result<(), NotifierError> {
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

        let message = self.build_message(alert)?;

        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.smtp_host)
                .map_err(|e| NotifierError::Email(format!("SMTP setup failed: {}", e)))?
                .port(self.settings.smtp_port)
                .timeout(Some(self.timeout));
        if let (Some(user), Some(pass)) = (&self.settings.username, &self.settings.password) {
            transport = transport.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let mailer = transport.build();

        match tokio::time::timeout(self.timeout, mailer.send(message)).await {
            Ok(Ok(_)) => {
                tracing::debug!(
                    key = %alert.dedup_key,
                    recipients = ?self.settings.to,
                    "Email notification sent"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(NotifierError::Email(format!("Email send failed: {}", e))),
            Err(_) => Err(NotifierError::Timeout(self.timeout)),
        }
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sink panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::candidate::{AlertKind, Severity};
    use crate::station::StationId;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use parking_lot::Mutex;

    fn alert() -> AlertCandidate {
        AlertCandidate {
            station_id: StationId(9),
            kind: AlertKind::Gap,
            dedup_key: "gap:9:6".to_string(),
            severity: Severity::Medium,
            title: "[StatMon] Data gap: Summit".to_string(),
            body: "Summit has a data gap > 6h (no data found).".to_string(),
        }
    }

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn record(
        State(received): State<Received>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        received.lock().push(body);
        StatusCode::OK
    }

    async fn reject() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    async fn spawn_receiver() -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/hook", post(record))
            .route("/broken", post(reject))
            .with_state(Arc::clone(&received));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), received)
    }

    #[tokio::test]
    async fn test_webhook_posts_message_card() {
        let (base, received) = spawn_receiver().await;
        let sink = WebhookSink::new(format!("{}/hook", base), Duration::from_secs(5)).unwrap();

        sink.send(&alert()).await.unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["@type"], "MessageCard");
        assert_eq!(received[0]["title"], "[StatMon] Data gap: Summit");
        assert_eq!(received[0]["themeColor"], "F39C12");
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let (base, _) = spawn_receiver().await;
        let sink = WebhookSink::new(format!("{}/broken", base), Duration::from_secs(5)).unwrap();

        let err = sink.send(&alert()).await.unwrap_err();
        assert!(matches!(err, NotifierError::Webhook(_)));
    }

    #[test]
    fn test_sinks_from_settings() {
        assert!(sinks_from_settings(&NotifySettings::default()).is_empty());

        let settings = NotifySettings {
            teams_webhook: Some("https://example.com/hook".to_string()),
            email: Some(EmailSettings {
                smtp_host: "smtp.example.com".to_string(),
                smtp_port: 587,
                username: None,
                password: None,
                from: "statmon@example.com".to_string(),
                to: vec!["ops@example.com".to_string()],
            }),
            timeout: Duration::from_secs(5),
        };
        let names: Vec<String> = sinks_from_settings(&settings)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["teams-webhook", "email"]);
    }

    #[test]
    fn test_email_message_rejects_bad_address() {
        let sink = EmailSink::new(
            EmailSettings {
                smtp_host: "smtp.example.com".to_string(),
                smtp_port: 587,
                username: None,
                password: None,
                from: "not an address".to_string(),
                to: vec!["ops@example.com".to_string()],
            },
            Duration::from_secs(5),
        );
        assert!(matches!(sink.build_message(&alert()), Err(NotifierError::Email(_))));

        let sink = EmailSink::new(
            EmailSettings {
                from: "statmon@example.com".to_string(),
                ..sink.settings.clone()
            },
            Duration::from_secs(5),
        );
        assert!(sink.build_message(&alert()).is_ok());
    }
}
