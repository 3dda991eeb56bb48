//! Axum-based API surface for running dedup jobs.
//!
//! Mirrors the request contract the scraper-side callers already speak:
//! `POST /api/dedup/run` with a `(category, period, date)` key and optional
//! thresholds, `GET /api/dedup/status` as a liveness probe. A per-key
//! admission gate keeps two runs from writing the same artifacts
//! concurrently; the second caller gets 409 CONFLICT.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{
    BatchKey, StorageLayout, Thresholds, DEFAULT_CONTENT_THRESHOLD, DEFAULT_RELATED_MIN_THRESHOLD,
    DEFAULT_TITLE_THRESHOLD,
};
use crate::dedup::{run_dedup, DedupRequest, DedupSummary};
use crate::error::DedupError;
use crate::similarity::SimilarityOracle;
use crate::TARGET_WEB_REQUEST;

/// Keys with a run currently in flight. At most one writer per key.
static IN_FLIGHT: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

#[derive(Clone)]
struct AppState {
    oracle: Arc<dyn SimilarityOracle>,
    layout: Arc<StorageLayout>,
    cancel: watch::Receiver<bool>,
}

fn default_title_threshold() -> f64 {
    DEFAULT_TITLE_THRESHOLD
}

fn default_content_threshold() -> f64 {
    DEFAULT_CONTENT_THRESHOLD
}

fn default_related_min_threshold() -> f64 {
    DEFAULT_RELATED_MIN_THRESHOLD
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    category: String,
    period: String,
    date: String,
    #[serde(default = "default_title_threshold")]
    title_threshold: f64,
    #[serde(default = "default_content_threshold")]
    content_threshold: f64,
    #[serde(default = "default_related_min_threshold")]
    related_min_threshold: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    message: String,
    #[serde(flatten)]
    summary: DedupSummary,
}

/// Main application loop, setting up and running the Axum-based API server.
pub async fn serve(
    oracle: Arc<dyn SimilarityOracle>,
    layout: StorageLayout,
    cancel: watch::Receiver<bool>,
) -> Result<()> {
    let state = AppState {
        oracle,
        layout: Arc::new(layout),
        cancel,
    };

    let app = Router::new()
        .route("/api/dedup/run", post(run))
        .route("/api/dedup/status", get(status))
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = format!("0.0.0.0:{}", port);

    let listener = TcpListener::bind(&addr).await?;
    info!(target: TARGET_WEB_REQUEST, "Server running on http://{}", addr);

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

async fn status() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn run(
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> std::result::Result<Json<RunResponse>, (StatusCode, String)> {
    if payload.period != "am" && payload.period != "pm" {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("period must be am or pm, got {}", payload.period),
        ));
    }

    let request = DedupRequest {
        key: BatchKey {
            category: payload.category,
            period: payload.period,
            date: payload.date,
        },
        thresholds: Thresholds {
            title: payload.title_threshold,
            content: payload.content_threshold,
            related_min: payload.related_min_threshold,
        },
    };
    let key_label = request.key.to_string();

    info!(target: TARGET_WEB_REQUEST, key = %key_label, "dedup run requested");

    {
        let mut in_flight = IN_FLIGHT.lock().unwrap();
        if !in_flight.insert(key_label.clone()) {
            warn!(target: TARGET_WEB_REQUEST, key = %key_label, "run already in flight");
            return Err((
                StatusCode::CONFLICT,
                format!("a dedup run for {} is already in flight", key_label),
            ));
        }
    }

    let oracle = state.oracle.clone();
    let layout = state.layout.clone();
    let cancel = state.cancel.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        run_dedup(&request, &layout, oracle.as_ref(), &cancel)
    })
    .await;

    IN_FLIGHT.lock().unwrap().remove(&key_label);

    let result = match outcome {
        Ok(result) => result,
        Err(join_err) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("dedup task failed: {}", join_err),
            ))
        }
    };

    match result {
        Ok(summary) => Ok(Json(RunResponse {
            message: "deduplication complete".to_string(),
            summary,
        })),
        Err(err) => {
            warn!(target: TARGET_WEB_REQUEST, key = %key_label, error = %err, "dedup run failed");
            let status = match &err {
                DedupError::NotFound { .. } => StatusCode::NOT_FOUND,
                DedupError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                DedupError::Compute(_) | DedupError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            Err((status, err.to_string()))
        }
    }
}
