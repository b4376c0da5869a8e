//! Job admission: planning, fan-out, and metadata commit

use crate::{MasterState, WorkerHandle};
use thiserror::Error;
use tracing::{error, info, warn};
use videogrid_common::rpc::NewJobRequest;
use videogrid_common::{Column, ColumnType, JobDescriptor, JobParameters};
use videogrid_engine::{plan_io_items, PlanError, RegistryError};
use videogrid_storage::{
    read_database_metadata, write_database_metadata, write_job_descriptor, StorageError,
};

#[derive(Debug, Error)]
pub enum MasterError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("task set has no evaluators")]
    EmptyEvaluatorChain,

    #[error("job aborted: worker {address} failed: {message}")]
    JobAborted { address: String, message: String },

    #[error("internal task failed: {0}")]
    Internal(String),
}

/// Run one job to completion across all registered workers and commit it.
///
/// The job id is reserved from the manifest counter up front so workers can
/// name their artifacts with it; the manifest itself is written only after
/// every worker has returned success, so an aborted job leaves no trace.
pub async fn run_new_job(state: &MasterState, request: NewJobRequest) -> Result<i32, MasterError> {
    let workers: Vec<WorkerHandle> = state.workers.read().await.clone();
    let job_name = request.job_name.clone();

    let storage = state.storage.clone();
    let meta = tokio::task::spawn_blocking(move || read_database_metadata(storage.as_ref()))
        .await
        .map_err(|e| MasterError::Internal(e.to_string()))??;
    let job_id = meta.peek_next_job_id();

    // The tail evaluator defines the job's output columns; types are
    // inferred downstream.
    let tail = request
        .task_set
        .evaluators
        .last()
        .ok_or(MasterError::EmptyEvaluatorChain)?;
    let tail_info = state.ctx.evaluators().get(&tail.name)?;
    let columns = tail_info
        .output_columns()
        .iter()
        .enumerate()
        .map(|(id, name)| Column {
            id: id as i32,
            name: name.clone(),
            column_type: ColumnType::None,
        })
        .collect();

    let config = state.ctx.config();
    let plan = plan_io_items(&request.task_set, config)?;
    let num_io_items = plan.io_items.len();
    state.with_cursor(|cursor| cursor.reset(num_io_items as i64));

    let descriptor = JobDescriptor {
        id: job_id,
        name: job_name.clone(),
        io_item_size: config.io_item_size,
        work_item_size: config.work_item_size,
        num_nodes: workers.len(),
        columns,
        tasks: request.task_set.tasks.clone(),
    };

    let params = JobParameters {
        job_id,
        job_name: job_name.clone(),
        task_set: request.task_set,
    };
    info!(
        job_id,
        job_name = %job_name,
        workers = workers.len(),
        io_items = num_io_items,
        "dispatching job"
    );

    let mut handles = Vec::with_capacity(workers.len());
    for worker in &workers {
        let http = state.http.clone();
        let address = worker.address.clone();
        let params = params.clone();
        handles.push(tokio::spawn(async move {
            let result = dispatch_job(&http, &address, &params).await;
            (address, result)
        }));
    }

    // Workers may finish in any order; the commit waits for every fan-out.
    let mut failure: Option<MasterError> = None;
    for handle in handles {
        let (address, result) = handle
            .await
            .map_err(|e| MasterError::Internal(e.to_string()))?;
        if let Err(message) = result {
            error!(%address, %message, "worker failed job");
            if failure.is_none() {
                failure = Some(MasterError::JobAborted { address, message });
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    let storage = state.storage.clone();
    let committed = tokio::task::spawn_blocking(move || -> Result<i32, StorageError> {
        let mut meta = read_database_metadata(storage.as_ref())?;
        let id = meta.add_job(&descriptor.name);
        write_database_metadata(storage.as_ref(), &meta)?;
        let mut descriptor = descriptor;
        descriptor.id = id;
        write_job_descriptor(storage.as_ref(), &descriptor)?;
        Ok(id)
    })
    .await
    .map_err(|e| MasterError::Internal(e.to_string()))??;

    if committed != job_id {
        warn!(committed, reserved = job_id, "job id drifted between reservation and commit");
    }
    info!(job_id = committed, job_name = %job_name, "job committed");
    Ok(committed)
}

async fn dispatch_job(
    http: &reqwest::Client,
    address: &str,
    params: &JobParameters,
) -> Result<(), String> {
    let url = format!("http://{address}/api/v1/jobs");
    let response = http
        .post(&url)
        .json(params)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(format!("{status}: {body}"))
    }
}
