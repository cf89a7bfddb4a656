//! Liveness endpoint for hosting platforms that expect an open port.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use crate::poller::UpdatePoller;
use crate::subscribers::SubscriberStore;

#[derive(Clone)]
struct HealthState {
    poller: Arc<UpdatePoller>,
    subscribers: Arc<dyn SubscriberStore>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    last_update_id: u64,
    subscribers: usize,
}

async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let subscribers = match state.subscribers.list().await {
        Ok(list) => list.len(),
        Err(e) => {
            warn!("Health check could not read subscribers: {:#}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    last_update_id: state.poller.offset(),
                    subscribers: 0,
                }),
            );
        }
    };
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            last_update_id: state.poller.offset(),
            subscribers,
        }),
    )
}

fn router(poller: Arc<UpdatePoller>, subscribers: Arc<dyn SubscriberStore>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .with_state(HealthState {
            poller,
            subscribers,
        })
}

pub async fn serve<F>(
    bind: SocketAddr,
    poller: Arc<UpdatePoller>,
    subscribers: Arc<dyn SubscriberStore>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind health endpoint on {}", bind))?;
    info!("Health endpoint listening on http://{}", bind);

    axum::serve(listener, router(poller, subscribers))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Health endpoint failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InboundMessage;
    use crate::poller::UpdateHandler;
    use crate::subscribers::SqliteSubscriberStore;
    use crate::testing::{FakeMessenger, MemoryOffsetStore};
    use async_trait::async_trait;

    struct NoopHandler;

    #[async_trait]
    impl UpdateHandler for NoopHandler {
        async fn handle(&self, _msg: &InboundMessage) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_health_reports_offset_and_subscribers() {
        let poller = Arc::new(
            UpdatePoller::new(
                Arc::new(FakeMessenger::default()),
                Arc::new(NoopHandler),
                Arc::new(MemoryOffsetStore::starting_at(77)),
                8,
                3,
            )
            .await,
        );
        let subscribers = Arc::new(SqliteSubscriberStore::open_in_memory().unwrap());
        subscribers.add(1).await.unwrap();

        let (status, Json(body)) = health(State(HealthState {
            poller,
            subscribers,
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.last_update_id, 77);
        assert_eq!(body.subscribers, 1);
    }
}
