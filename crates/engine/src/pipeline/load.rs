//! Load stage: fetch referenced rows from the store

use crate::error::PipelineError;
use crate::profiler::Profiler;
use crate::queue::{WorkQueue, WorkUnit};
use crate::work::{ColumnBuffer, EvalWorkEntry, LoadWorkEntry};
use std::sync::Arc;
use tracing::debug;
use videogrid_common::Device;
use videogrid_storage::{paths, read_column_rows, retry_backoff, StorageBackend};

pub(crate) struct LoadStage {
    pub worker_index: usize,
    pub storage: Arc<dyn StorageBackend>,
    pub profiler: Profiler,
    pub input: WorkQueue<LoadWorkEntry>,
    pub output: WorkQueue<EvalWorkEntry>,
}

pub(crate) fn run(mut stage: LoadStage) -> Result<Profiler, PipelineError> {
    loop {
        match stage.input.pop()? {
            WorkUnit::EndOfStream => {
                debug!(worker = stage.worker_index, "load worker draining");
                return Ok(stage.profiler);
            }
            WorkUnit::Work(entry) => {
                let storage = stage.storage.clone();
                let columns = stage
                    .profiler
                    .record("io_read", || fetch_columns(storage.as_ref(), &entry))?;
                stage.output.push(WorkUnit::Work(EvalWorkEntry {
                    io_item_index: entry.io_item_index,
                    // Raw payloads are host-resident until pre-eval stages them.
                    device: Device::CPU,
                    columns,
                }))?;
            }
        }
    }
}

fn fetch_columns(
    storage: &dyn StorageBackend,
    entry: &LoadWorkEntry,
) -> Result<Vec<ColumnBuffer>, PipelineError> {
    let mut columns = Vec::new();
    for sample in &entry.samples {
        for &column_id in &sample.column_ids {
            let path = paths::table_column_path(sample.job_id, sample.table_id, column_id);
            let rows = retry_backoff(&path, || {
                let mut file = storage.random_read_file(&path)?;
                read_column_rows(file.as_mut(), &sample.rows)
            })?;
            columns.push(ColumnBuffer {
                name: format!("column_{column_id}"),
                rows,
            });
        }
    }
    Ok(columns)
}
