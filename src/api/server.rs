use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, jobs, stats, AppState};

/// Build the status router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/jobs", get(jobs))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the read-only status API until the task is aborted
pub async fn run_status_server(addr: &str, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Status server listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::EngineStats;
    use crate::scheduler::{Job, JobError, Scheduler, StatusHandle};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::util::ServiceExt;

    struct Noop;

    #[async_trait]
    impl Job for Noop {
        async fn run(&mut self) -> Result<(), JobError> {
            Ok(())
        }
    }

    fn create_test_app(status: StatusHandle) -> Router {
        let state = Arc::new(AppState {
            status,
            stats: Arc::new(EngineStats::default()),
            stale_after: Duration::from_secs(60),
        });
        build_router(state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_before_first_tick() {
        let app = create_test_app(StatusHandle::new());
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "starting");
    }

    #[tokio::test]
    async fn test_health_and_jobs_after_tick() {
        let mut scheduler = Scheduler::new();
        scheduler.register("alert-evaluate", Duration::from_secs(300), Noop);
        scheduler.tick().await;

        let app = create_test_app(scheduler.status());
        let (status, body) = get_json(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["ticks"], 1);

        let (status, body) = get_json(app, "/jobs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jobs"][0]["name"], "alert-evaluate");
        assert_eq!(body["jobs"][0]["runs"], 1);
        assert_eq!(body["jobs"][0]["period_secs"], 300);
    }

    #[tokio::test]
    async fn test_stats() {
        let app = create_test_app(StatusHandle::new());
        let (status, body) = get_json(app, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["passes"], 0);
        assert_eq!(body["dispatched"], 0);
        assert_eq!(body["failed_deliveries"], 0);
    }
}
