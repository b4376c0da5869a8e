//! Master service
//!
//! Holds the registered worker pool and the global I/O item cursor. A job
//! submission plans the item set, fans `NewJob` out to every worker, serves
//! their `NextIOItem` pulls while they run, and commits the job metadata only
//! once all workers have returned success.

mod jobs;

pub use jobs::{run_new_job, MasterError};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;
use videogrid_common::rpc::{IoItemReply, NewJobReply, NewJobRequest, Registration, WorkerInfo};
use videogrid_engine::EngineContext;
use videogrid_storage::StorageBackend;

/// A registered worker, addressed by its job endpoint
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub node_id: i32,
    pub address: String,
}

/// The global next-I/O-item cursor for the active job
#[derive(Debug, Default)]
pub struct IoItemCursor {
    next: i64,
    total: i64,
}

impl IoItemCursor {
    pub fn reset(&mut self, total: i64) {
        self.next = 0;
        self.total = total;
    }

    /// Hand out the next item id, or −1 once the range is exhausted.
    /// Callers are serialised by the lock, so ids are dense and distinct.
    pub fn next_item(&mut self) -> i64 {
        if self.next < self.total {
            let id = self.next;
            self.next += 1;
            id
        } else {
            -1
        }
    }
}

/// Master state shared across handlers
#[derive(Clone)]
pub struct MasterState {
    pub ctx: Arc<EngineContext>,
    pub storage: Arc<dyn StorageBackend>,
    pub(crate) workers: Arc<RwLock<Vec<WorkerHandle>>>,
    cursor: Arc<Mutex<IoItemCursor>>,
    pub(crate) http: reqwest::Client,
    /// One job runs at a time; the manifest has a single writer
    job_lock: Arc<tokio::sync::Mutex<()>>,
}

impl MasterState {
    #[must_use]
    pub fn new(ctx: Arc<EngineContext>, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            ctx,
            storage,
            workers: Arc::new(RwLock::new(Vec::new())),
            cursor: Arc::new(Mutex::new(IoItemCursor::default())),
            http: reqwest::Client::new(),
            job_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Run `f` under the cursor lock, recovering the guard if a holder panicked
    pub fn with_cursor<T>(&self, f: impl FnOnce(&mut IoItemCursor) -> T) -> T {
        let mut guard = match self.cursor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Build the master router with all endpoints
pub fn build_router(state: MasterState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/workers/register", post(register_worker))
        .route("/api/v1/io_items/next", post(next_io_item))
        .route("/api/v1/jobs", post(new_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the master server
pub async fn start_server(addr: &str, state: MasterState) -> Result<(), std::io::Error> {
    info!("starting master server on {}", addr);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Append a stub for the worker and assign its node id
async fn register_worker(
    State(state): State<MasterState>,
    Json(info): Json<WorkerInfo>,
) -> Json<Registration> {
    let mut workers = state.workers.write().await;
    let node_id = workers.len() as i32;
    workers.push(WorkerHandle {
        node_id,
        address: info.address.clone(),
    });
    info!(node_id, address = %info.address, "registered worker");
    Json(Registration { node_id })
}

/// Hand out the next I/O item id of the active job
async fn next_io_item(State(state): State<MasterState>) -> Json<IoItemReply> {
    let item_id = state.with_cursor(IoItemCursor::next_item);
    Json(IoItemReply { item_id })
}

async fn new_job(
    State(state): State<MasterState>,
    Json(request): Json<NewJobRequest>,
) -> Result<Json<NewJobReply>, (StatusCode, String)> {
    let _guard = state.job_lock.clone().lock_owned().await;
    let job_id = run_new_job(&state, request).await.map_err(error_status)?;
    Ok(Json(NewJobReply { job_id }))
}

fn error_status(err: MasterError) -> (StatusCode, String) {
    let status = match &err {
        MasterError::Plan(_) | MasterError::Registry(_) | MasterError::EmptyEvaluatorChain => {
            StatusCode::BAD_REQUEST
        }
        MasterError::JobAborted { .. } => StatusCode::BAD_GATEWAY,
        MasterError::Storage(_) | MasterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_hands_out_dense_ids_then_minus_one() {
        let mut cursor = IoItemCursor::default();
        cursor.reset(3);
        assert_eq!(cursor.next_item(), 0);
        assert_eq!(cursor.next_item(), 1);
        assert_eq!(cursor.next_item(), 2);
        assert_eq!(cursor.next_item(), -1);
        assert_eq!(cursor.next_item(), -1);
    }

    #[test]
    fn cursor_reset_rewinds_for_the_next_job() {
        let mut cursor = IoItemCursor::default();
        cursor.reset(1);
        assert_eq!(cursor.next_item(), 0);
        assert_eq!(cursor.next_item(), -1);
        cursor.reset(2);
        assert_eq!(cursor.next_item(), 0);
        assert_eq!(cursor.next_item(), 1);
        assert_eq!(cursor.next_item(), -1);
    }

    #[test]
    fn fresh_cursor_is_exhausted() {
        let mut cursor = IoItemCursor::default();
        assert_eq!(cursor.next_item(), -1);
    }

    #[test]
    fn error_status_mapping() {
        let (status, _) = error_status(MasterError::EmptyEvaluatorChain);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = error_status(MasterError::JobAborted {
            address: "node:5002".to_string(),
            message: "400: unknown evaluator".to_string(),
        });
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
