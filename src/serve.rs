//! HTTP surface for the presentation layer.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::connectivity::Connectivity;
use crate::coordinator::{SyncCoordinator, SyncStatus};
use crate::error::QueueError;
use crate::record::{RecordId, RecordKind};

pub struct ApiState {
    pub coordinator: Arc<SyncCoordinator>,
    pub connectivity: Connectivity,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unsynced: bool,
}

#[derive(Debug, Deserialize)]
pub struct StoreRequest {
    pub kind: RecordKind,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub id: RecordId,
    pub status: SyncStatus,
}

/// `online: null` clears the override and lets the probe decide again
#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ConnectivityResponse {
    online: bool,
    changed: bool,
    overridden: bool,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: SyncStatus,
    can_sync: bool,
}

#[derive(Debug, Serialize)]
struct PruneResponse {
    removed: usize,
}

/// Local storage failures map to 503 so the client knows the write was not kept
fn storage_error(e: QueueError) -> Response {
    error!("Local storage error: {}", e);
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
}

pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/records", get(list_records_handler).post(store_record_handler))
        .route("/api/sync", post(sync_handler))
        .route("/api/prune", post(prune_handler))
        .route("/api/usage", get(usage_handler))
        .route("/api/connectivity", post(connectivity_handler))
        .layer(cors)
        .with_state(state)
}

async fn status_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let status = state.coordinator.status();
    Json(StatusResponse {
        status,
        can_sync: status.can_sync(),
    })
}

async fn list_records_handler(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListQuery>,
) -> Response {
    let queue = state.coordinator.queue();
    let records = if params.unsynced {
        queue.list_unsynced().await
    } else {
        queue.list_all().await
    };
    match records {
        Ok(records) => Json(records).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn store_record_handler(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<StoreRequest>,
) -> Response {
    match state
        .coordinator
        .store_offline(request.kind, request.payload)
        .await
    {
        Ok(id) => (
            StatusCode::CREATED,
            Json(StoreResponse {
                id,
                status: state.coordinator.status(),
            }),
        )
            .into_response(),
        Err(e) => storage_error(e),
    }
}

async fn sync_handler(State(state): State<Arc<ApiState>>) -> Response {
    match state.coordinator.sync_now().await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn prune_handler(State(state): State<Arc<ApiState>>) -> Response {
    match state.coordinator.queue().prune_synced().await {
        Ok(removed) => Json(PruneResponse { removed }).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn usage_handler(State(state): State<Arc<ApiState>>) -> Response {
    match state.coordinator.queue().storage_usage().await {
        Ok(usage) => Json(usage).into_response(),
        Err(e) => storage_error(e),
    }
}

/// Manual online/offline override, e.g. for hosts without a reachable probe
/// target. Probe results are ignored until the override is cleared.
async fn connectivity_handler(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ConnectivityRequest>,
) -> impl IntoResponse {
    let changed = state.connectivity.set_override(request.online);
    Json(ConnectivityResponse {
        online: state.connectivity.is_online(),
        changed,
        overridden: state.connectivity.is_overridden(),
    })
}
