//! Save stage: persist output rows and retire items

use crate::error::PipelineError;
use crate::profiler::Profiler;
use crate::queue::{WorkQueue, WorkUnit};
use crate::work::{EvalWorkEntry, IoItem};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;
use videogrid_storage::{encode_item_blob, paths, retry_backoff, write_all, StorageBackend};

pub(crate) struct SaveStage {
    pub worker_index: usize,
    pub job_id: i32,
    pub io_items: Arc<Vec<IoItem>>,
    pub storage: Arc<dyn StorageBackend>,
    pub retired_items: Arc<AtomicI64>,
    pub profiler: Profiler,
    pub input: WorkQueue<EvalWorkEntry>,
}

pub(crate) fn run(mut stage: SaveStage) -> Result<Profiler, PipelineError> {
    loop {
        match stage.input.pop()? {
            WorkUnit::EndOfStream => {
                debug!(worker = stage.worker_index, "save worker draining");
                return Ok(stage.profiler);
            }
            WorkUnit::Work(entry) => {
                let item = *stage.io_items.get(entry.io_item_index).ok_or_else(|| {
                    PipelineError::WorkSource(format!(
                        "io item index {} out of range",
                        entry.io_item_index
                    ))
                })?;
                let columns: Vec<(String, Vec<Vec<u8>>)> = entry
                    .columns
                    .into_iter()
                    .map(|c| (c.name, c.rows))
                    .collect();
                let path = paths::output_item_path(stage.job_id, item.table_id, item.item_id);
                let storage = stage.storage.clone();
                stage.profiler.record("io_write", || {
                    let blob = encode_item_blob(&columns);
                    retry_backoff(&path, || write_all(storage.as_ref(), &path, &blob))
                })?;
                // The item's rows are durable as one unit; only now does it retire.
                stage.retired_items.fetch_add(1, Ordering::SeqCst);
                debug!(path, "saved output item");
            }
        }
    }
}
