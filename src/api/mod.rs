use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{ScrapeConfig, ServerConfig};
use crate::error::{Result, ScrapeError};
use crate::report::{ExecutionReport, ReportError};
use crate::scraper::ScrapeEngine;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    /// CDP websocket endpoint of an already-provisioned remote session.
    pub connect_url: String,
    pub config: ScrapeConfig,
}

#[derive(Clone)]
pub struct AppState {
    pub entry_url: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/scrape", post(scrape))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn start_api_server(config: &ServerConfig) -> Result<()> {
    let app = create_router(AppState {
        entry_url: config.entry_url.clone(),
    });

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ScrapeError::Config(format!("Failed to bind {}: {}", addr, e)))?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| ScrapeError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "TexasFile Scraper API Running" }))
}

/// The one scrape operation. The caller always receives a structured report;
/// a non-success status is returned only for connector-level fatal failure.
async fn scrape(
    State(state): State<AppState>,
    Json(request): Json<ScrapeRequest>,
) -> (StatusCode, Json<ExecutionReport>) {
    if let Err(e) = request.config.validate() {
        let mut report = ExecutionReport::new();
        report.errors.push(ReportError::fatal(format!("Invalid configuration: {}", e)));
        return (StatusCode::BAD_REQUEST, Json(report));
    }

    let engine = ScrapeEngine::new(state.entry_url.clone());
    let report = engine.run(&request.connect_url, &request.config).await;

    let status = if report.has_fatal_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_request_deserializes_camel_case() {
        let request: ScrapeRequest = serde_json::from_str(
            r#"{
                "connectUrl": "wss://connect.example.com/session/abc",
                "config": {"county": "Travis", "maxPagesPerQuery": 1}
            }"#,
        )
        .unwrap();

        assert!(request.connect_url.starts_with("wss://"));
        assert_eq!(request.config.county, "Travis");
        assert_eq!(request.config.max_pages_per_query, 1);
    }

    #[tokio::test]
    async fn test_liveness_payload() {
        let Json(body) = liveness().await;
        assert_eq!(body["status"], "TexasFile Scraper API Running");
    }
}
