//! HTTP status endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use impcase_core::sync::HubStats;

use crate::AppState;

/// Summary of a shared case
#[derive(Debug, Serialize)]
pub struct CaseSummary {
    pub caseid: u64,
    pub name: Option<String>,
    pub topics: usize,
    pub folders: Vec<String>,
    pub next_id: u64,
}

/// Hub-wide counters
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<HubStats> {
    Json(state.hub.lock().await.stats())
}

/// Get a shared case
pub async fn get_case(
    State(state): State<Arc<AppState>>,
    Path(caseid): Path<u64>,
) -> Result<Json<CaseSummary>, StatusCode> {
    let hub = state.hub.lock().await;
    let doc = hub.case(caseid).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(CaseSummary {
        caseid,
        name: doc.name().map(str::to_string),
        topics: doc.topics().len(),
        folders: doc.folder_names(),
        next_id: doc.next_id(),
    }))
}
