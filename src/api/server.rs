use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::extract::MatchedPath;
use axum::routing::{get, post};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::{health, invoke};
use crate::processor::Processor;

#[derive(Debug, Clone)]
pub struct AppState {
    pub processor: Processor,
}

pub fn router(processor: Processor) -> Router {
    let state = Arc::new(AppState { processor });

    Router::new()
        .route("/health", get(health))
        .route("/invoke", post(invoke))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .with_state(state)
}

/// Binds `0.0.0.0:<port>` and serves until ctrl-c
#[instrument(skip(processor))]
pub async fn serve(processor: Processor, port: u16) -> Result<(), ServerError> {
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tracing::info!(addr = %listener.local_addr()?, "listening for queue deliveries");

    axum::serve(listener, router(processor))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?e, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }

    tracing::info!("shutdown signal received");
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::archive::fs::FsArchive;
    use crate::db::models::RiskScoreRow;
    use crate::db::{Warehouse, WarehouseResult};

    #[derive(Debug, Default)]
    struct NullWarehouse;

    #[async_trait::async_trait]
    impl Warehouse for NullWarehouse {
        async fn insert_score(&self, _row: &RiskScoreRow) -> WarehouseResult<()> {
            Ok(())
        }
    }

    fn app(dir: &tempfile::TempDir) -> Router {
        router(Processor::new(
            Arc::new(NullWarehouse),
            Arc::new(FsArchive::new(dir.path())),
            "scored-events/",
        ))
    }

    async fn post_invoke(app: Router, body: String) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/invoke")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let dir = tempfile::tempdir().unwrap();
        let event = json!({
            "content_id": "c-http",
            "user_id": "u-1",
            "content_type": "image"
        });
        let delivery = json!({ "Records": [{ "messageId": "m-1", "body": event.to_string() }] });

        let (status, body) = post_invoke(app(&dir), delivery.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "statusCode": 200, "body": "Scoring successful" }));

        let archived: Vec<_> = std::fs::read_dir(dir.path().join("scored-events"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].ends_with("_c-http.json"));
    }

    #[tokio::test]
    async fn test_invoke_failure_is_generic() {
        let dir = tempfile::tempdir().unwrap();

        let delivery = json!({ "Records": [{ "body": "nope" }] });
        let (status, body) = post_invoke(app(&dir), delivery.to_string()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "statusCode": 500, "body": "Error processing event" }));
        assert!(!dir.path().join("scored-events").exists());
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
