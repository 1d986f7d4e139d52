#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

use guardian_sync::coordinator::{CoordinatorOptions, SyncCoordinator, SyncStatus};
use guardian_sync::queue::OfflineQueue;
use guardian_sync::remote::RestSink;
use guardian_sync::storage::{LocalStore, MemoryStore};

/// Shared state for the stand-in remote backend
#[derive(Default)]
pub struct RemoteState {
    /// Accepted rows as (table, row)
    pub inserts: Mutex<Vec<(String, Value)>>,
    /// Rows whose "n" field is in this set are rejected with 400
    pub reject: Mutex<HashSet<i64>>,
    pub attempts: AtomicUsize,
    pub last_api_key: Mutex<Option<String>>,
}

impl RemoteState {
    pub fn reject_n(&self, values: &[i64]) {
        let mut reject = self.reject.lock().unwrap();
        reject.clear();
        reject.extend(values.iter().copied());
    }

    pub fn accepted_n(&self) -> Vec<i64> {
        self.inserts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, row)| row.get("n").and_then(Value::as_i64))
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

async fn insert_handler(
    State(state): State<Arc<RemoteState>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(rows): Json<Vec<Value>>,
) -> StatusCode {
    state.attempts.fetch_add(1, Ordering::SeqCst);
    *state.last_api_key.lock().unwrap() = headers
        .get("apikey")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if rows.len() != 1 {
        return StatusCode::BAD_REQUEST;
    }
    let row = rows.into_iter().next().unwrap();

    let rejected = row
        .get("n")
        .and_then(Value::as_i64)
        .map(|n| state.reject.lock().unwrap().contains(&n))
        .unwrap_or(false);
    if rejected {
        return StatusCode::BAD_REQUEST;
    }

    state.inserts.lock().unwrap().push((table, row));
    StatusCode::CREATED
}

/// Start a stand-in for the hosted backend's REST insert endpoint
pub async fn start_remote() -> (String, Arc<RemoteState>) {
    let state = Arc::new(RemoteState::default());

    let app = Router::new()
        .route("/rest/v1/{table}", post(insert_handler))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    (url, state)
}

pub fn test_options() -> CoordinatorOptions {
    CoordinatorOptions {
        write_timeout: Duration::from_secs(5),
        count_refresh_interval: Duration::from_millis(50),
        drain_on_refresh: false,
    }
}

/// Coordinator over a memory store, writing to the REST endpoint at `url`
pub fn rest_coordinator(url: &str) -> (Arc<MemoryStore>, Arc<SyncCoordinator>) {
    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator_over(store.clone(), url, test_options());
    (store, coordinator)
}

pub fn coordinator_over(
    store: Arc<dyn LocalStore>,
    url: &str,
    options: CoordinatorOptions,
) -> Arc<SyncCoordinator> {
    let queue = Arc::new(OfflineQueue::new(store));
    let sink =
        RestSink::new(url, Some("test-anon-key".to_string()), options.write_timeout).unwrap();
    Arc::new(SyncCoordinator::new(queue, Arc::new(sink), options))
}

/// Wait until the coordinator status satisfies `predicate`
pub async fn wait_for_status(
    rx: &mut watch::Receiver<SyncStatus>,
    predicate: impl FnMut(&SyncStatus) -> bool,
) -> SyncStatus {
    let status = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for coordinator status")
        .expect("status channel closed");
    *status
}
