//! Worker node service
//!
//! A worker registers with the master at startup and then serves one RPC:
//! `NewJob`. The handler drives the engine's five-stage pipeline to
//! completion, pulling I/O item ids from the master through the synchronous
//! [`MasterWorkSource`] bridge, and writes the profile artifact before
//! replying.

mod client;

pub use client::{ClientError, MasterClient, MasterWorkSource};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use videogrid_common::JobParameters;
use videogrid_engine::{run_job, EngineContext, PipelineError};
use videogrid_storage::StorageBackend;

/// Worker state shared across handlers
#[derive(Clone)]
pub struct WorkerState {
    pub ctx: Arc<EngineContext>,
    pub storage: Arc<dyn StorageBackend>,
    pub master: MasterClient,
    pub node_id: i32,
    /// Jobs are single-shot and serialised per worker
    job_lock: Arc<tokio::sync::Mutex<()>>,
}

impl WorkerState {
    #[must_use]
    pub fn new(
        ctx: Arc<EngineContext>,
        storage: Arc<dyn StorageBackend>,
        master: MasterClient,
        node_id: i32,
    ) -> Self {
        Self {
            ctx,
            storage,
            master,
            node_id,
            job_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Build the worker router with all endpoints
pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/jobs", post(new_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the worker server
pub async fn start_server(addr: &str, state: WorkerState) -> Result<(), std::io::Error> {
    info!("starting worker server on {}", addr);
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

/// Execute a complete job pipeline and return once it has drained
async fn new_job(
    State(state): State<WorkerState>,
    Json(params): Json<JobParameters>,
) -> Result<StatusCode, (StatusCode, String)> {
    let _guard = state.job_lock.clone().lock_owned().await;
    info!(
        job_id = params.job_id,
        job_name = %params.job_name,
        tasks = params.task_set.tasks.len(),
        "received job"
    );

    let handle = tokio::runtime::Handle::current();
    let ctx = state.ctx.clone();
    let storage = state.storage.clone();
    let master = state.master.clone();
    let node_id = state.node_id;

    // The pipeline blocks on queues and joins, so it runs off the async
    // executor; the work source bridges back for NextIOItem calls.
    let report = tokio::task::spawn_blocking(move || {
        let mut source = MasterWorkSource::new(handle, master);
        run_job(&ctx, storage, &params, node_id, &mut source)
    })
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("job task failed: {e}"),
        )
    })?
    .map_err(error_status)?;

    info!(
        accepted = report.accepted_items,
        retired = report.retired_items,
        "job complete"
    );
    Ok(StatusCode::OK)
}

fn error_status(err: PipelineError) -> (StatusCode, String) {
    if err.is_input_error() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use videogrid_engine::{KernelError, RegistryError};
    use videogrid_storage::StorageError;

    #[test]
    fn input_errors_map_to_bad_request() {
        let (status, _) = error_status(PipelineError::Registry(
            RegistryError::UnknownEvaluator("net".to_string()),
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = error_status(PipelineError::EmptyEvaluatorChain);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn runtime_errors_map_to_internal_error() {
        let (status, _) = error_status(PipelineError::Storage(StorageError::RetriesExhausted {
            what: "items/0.bin".to_string(),
            attempts: 5,
        }));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = error_status(PipelineError::Kernel {
            stage: "eval",
            source: KernelError::ExecutionFailed("oom".to_string()),
        });
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
