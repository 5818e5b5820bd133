use anyhow::Result;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Config,
    handlers::{internal, records, AppState},
    metrics,
    publisher::StatusPublisher,
    signals::setup_signal_handlers,
    source::KubectlSource,
    store::RecordStore,
    tailer::{Tailer, TailerSettings},
};

/// Start the Sherlock service
///
/// This function:
/// 1. Initializes metrics
/// 2. Sets up signal handlers for graceful shutdown
/// 3. Starts the log tailer and the status publisher
/// 4. Binds to the configured address
/// 5. Serves queries until shutdown, then waits for the background loops
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize metrics
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    // Setup signal handlers (SIGTERM, SIGINT)
    let (shutdown_tx, signal_handle) = setup_signal_handlers()?;
    let mut shutdown_rx = shutdown_tx.subscribe();

    let store = Arc::new(RecordStore::new(config.store.capacity));

    let source = Arc::new(KubectlSource::new(&config.tailer));
    let tailer = Tailer::new(source, store.clone(), TailerSettings::from(&config.tailer));
    let tailer_handle = tailer.spawn(shutdown_tx.subscribe());

    let publisher = StatusPublisher::new(&config.publish, store.clone())?;
    let publisher_handle = publisher.spawn(shutdown_tx.subscribe());

    let app_state = AppState {
        config: Arc::new(config.clone()),
        store,
    };

    // Build the Axum router
    let app = create_router(app_state, metrics_handle);

    // Create socket address
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting Sherlock on {}", addr);
    info!(
        name = %config.app.name,
        namespace = %config.tailer.namespace,
        capacity = config.store.capacity,
        publishing = config.publish.enabled(),
        "Configuration loaded"
    );

    // Bind to address
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            // Wait for shutdown signal
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    tailer_handle.await?;
    publisher_handle.await?;

    // Wait for signal handler task to complete
    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
///
/// Internal routes live at the root; queries live under `/{app.name}`.
pub fn create_router(app_state: AppState, metrics_handle: Arc<PrometheusHandle>) -> Router {
    let prefix = format!("/{}", app_state.config.app.name);
    let path = |suffix: &str| format!("{}{}", prefix, suffix);

    let query_routes = Router::new()
        .route("/", get(internal::get_index))
        .route("/health", get(internal::health))
        .route(&prefix, get(records::get_all))
        .route(&path("/"), get(records::get_all))
        .route(&path("/errors"), get(records::get_errors))
        .route(&path("/laggers"), get(records::get_laggers))
        .route(&path("/services"), get(records::get_services))
        .route(&path("/services/:service"), get(records::get_service))
        .route(
            &path("/services/:service/errors"),
            get(records::get_service_errors),
        )
        .route(
            &path("/services/:service/laggers"),
            get(records::get_service_laggers),
        )
        .route(&path("/status"), get(records::get_status))
        .route(&path("/store"), get(records::get_store))
        .with_state(app_state);

    Router::new()
        .route("/metrics", get(internal::metrics))
        .with_state(metrics_handle)
        .merge(query_routes)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::create_test_config;
    use crate::store::tests::record;
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let store = Arc::new(RecordStore::new(100));
        store.try_insert(record("1", "api", 200, 0.1));
        store.try_insert(record("2", "api", 502, 45.0));
        store.try_insert(record("3", "web", 200, 31.0));
        store.try_insert(record("4", "docs", 200, 0.2));

        let app_state = AppState {
            config: Arc::new(create_test_config()),
            store,
        };
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        create_router(app_state, Arc::new(recorder.handle()))
    }

    async fn get(uri: &str) -> (StatusCode, String, Vec<u8>) {
        let response = test_router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, content_type, body)
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = get(uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn ids(value: &Value) -> Vec<&str> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["request_id"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_index_and_health() {
        let (status, body) = get_json("/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "sherlock");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

        let (status, _, body) = get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let (status, _, _) = get("/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_all_records_with_and_without_trailing_slash() {
        for uri in ["/sherlock", "/sherlock/"] {
            let (status, body) = get_json(uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(ids(&body), vec!["1", "2", "3", "4"]);
        }
    }

    #[tokio::test]
    async fn test_errors() {
        let (status, body) = get_json("/sherlock/errors").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec!["2"]);
        assert_eq!(body[0]["status_code"], 502);
    }

    #[tokio::test]
    async fn test_laggers_default_and_custom_threshold() {
        let (_, body) = get_json("/sherlock/laggers").await;
        assert_eq!(ids(&body), vec!["2", "3"]);

        let (_, body) = get_json("/sherlock/laggers?time=40").await;
        assert_eq!(ids(&body), vec!["2"]);

        let (_, body) = get_json("/sherlock/laggers?time=0").await;
        assert_eq!(ids(&body).len(), 4);
    }

    #[tokio::test]
    async fn test_laggers_rejects_negative_threshold() {
        let (status, body) = get_json("/sherlock/laggers?time=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "bad_request");
    }

    #[tokio::test]
    async fn test_services_in_first_seen_order() {
        let (status, body) = get_json("/sherlock/services").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!(["api", "web", "docs"]));
    }

    #[tokio::test]
    async fn test_service_routes() {
        let (status, body) = get_json("/sherlock/services/api").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec!["1", "2"]);

        let (_, body) = get_json("/sherlock/services/api/errors").await;
        assert_eq!(ids(&body), vec!["2"]);

        let (status, body) = get_json("/sherlock/services/web/errors").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (_, body) = get_json("/sherlock/services/web/laggers?time=30").await;
        assert_eq!(ids(&body), vec!["3"]);
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_found() {
        for uri in [
            "/sherlock/services/nope",
            "/sherlock/services/nope/errors",
            "/sherlock/services/nope/laggers",
        ] {
            let (status, body) = get_json(uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["error"]["type"], "service_not_found");
            assert!(body["error"]["message"].as_str().unwrap().contains("nope"));
        }
    }

    #[tokio::test]
    async fn test_status_summary() {
        let (status, body) = get_json("/sherlock/status").await;
        assert_eq!(status, StatusCode::OK);

        let summary = body.as_array().unwrap();
        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0]["name"], "api");
        assert_eq!(summary[0]["status"], "error");
        assert_eq!(summary[0]["errors"][0]["request_id"], "2");
        assert_eq!(summary[1]["status"], "normal");
    }

    #[tokio::test]
    async fn test_store_occupancy() {
        let (_, body) = get_json("/sherlock/store").await;
        assert_eq!(body["len"], 4);
        assert_eq!(body["capacity"], 100);
    }

    #[tokio::test]
    async fn test_html_format() {
        let (status, content_type, body) = get("/sherlock/errors?format=html").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/html"));

        let html = String::from_utf8(body).unwrap();
        assert!(html.starts_with("<table"));
        assert!(html.contains("<td>502</td>"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, _, _) = get("/watson/errors").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
