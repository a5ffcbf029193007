//! HTTP surface for bulk taxpayer lookups.
//!
//! Two POST endpoints accept identifier lists and answer with one entry
//! per input, pairing the identifier with its lookup outcome. Lookup
//! failures never surface as HTTP errors.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use crate::batch::BatchDispatcher;
use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::ocr::OcrClient;
use crate::tracuunnt::types::{LookupResult, QueryKind};
use crate::tracuunnt::{ChromeBrowser, TracuunntScraper};

#[derive(Debug, Deserialize)]
pub struct CccdBulkRequest {
    pub cccd_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MstBulkRequest {
    pub mst_list: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CccdBulkEntry {
    pub cccd: String,
    pub result: LookupResult,
}

#[derive(Debug, Serialize)]
pub struct MstBulkEntry {
    pub mst: String,
    pub result: LookupResult,
}

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<BatchDispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Arc<BatchDispatcher>) -> Self {
        Self { dispatcher }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape_mst_bulk_from_cccd", post(scrape_mst_bulk_from_cccd))
        .route("/scrape_mst_bulk_from_mst", post(scrape_mst_bulk_from_mst))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

async fn scrape_mst_bulk_from_cccd(
    State(state): State<AppState>,
    Json(payload): Json<CccdBulkRequest>,
) -> Json<Vec<CccdBulkEntry>> {
    info!("Bulk CCCD lookup with {} entries", payload.cccd_list.len());
    let results = state
        .dispatcher
        .dispatch(QueryKind::Cccd, &payload.cccd_list)
        .await;
    let entries = payload
        .cccd_list
        .into_iter()
        .zip(results)
        .map(|(cccd, result)| CccdBulkEntry { cccd, result })
        .collect();
    Json(entries)
}

async fn scrape_mst_bulk_from_mst(
    State(state): State<AppState>,
    Json(payload): Json<MstBulkRequest>,
) -> Json<Vec<MstBulkEntry>> {
    info!("Bulk MST lookup with {} entries", payload.mst_list.len());
    let results = state
        .dispatcher
        .dispatch(QueryKind::Mst, &payload.mst_list)
        .await;
    let entries = payload
        .mst_list
        .into_iter()
        .zip(results)
        .map(|(mst, result)| MstBulkEntry { mst, result })
        .collect();
    Json(entries)
}

/// Builds the production lookup stack from `config` and serves it.
pub async fn serve(config: ScraperConfig) -> Result<(), ScraperError> {
    let browser = Arc::new(ChromeBrowser::new(config.clone()));
    let solver = Arc::new(OcrClient::new(
        config.ocr_url.clone(),
        config.ocr_model.clone(),
    ));
    let engine = Arc::new(TracuunntScraper::new(browser, solver));
    let dispatcher = Arc::new(BatchDispatcher::new(engine, config.max_concurrent_lookups));

    let app = router(AppState::new(dispatcher));

    let listener = TcpListener::bind(&config.bind_addr).await.map_err(|e| {
        ScraperError::Internal(format!("Failed to bind {}: {}", config.bind_addr, e))
    })?;
    info!("Listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| ScraperError::Internal(e.to_string()))?;
    Ok(())
}
