//! Post-eval stage: copy off device, drop warmup rows, shape output columns

use crate::error::{KernelError, PipelineError};
use crate::profiler::Profiler;
use crate::queue::{WorkQueue, WorkUnit};
use crate::work::{EvalWorkEntry, IoItem};
use std::sync::Arc;
use tracing::debug;
use videogrid_common::Device;

pub(crate) struct PostEvaluateStage {
    pub pu: usize,
    pub io_items: Arc<Vec<IoItem>>,
    pub warmup_size: i64,
    pub profiler: Profiler,
    pub input: WorkQueue<EvalWorkEntry>,
    pub output: WorkQueue<EvalWorkEntry>,
}

pub(crate) fn run(mut stage: PostEvaluateStage) -> Result<Profiler, PipelineError> {
    loop {
        match stage.input.pop()? {
            WorkUnit::EndOfStream => {
                debug!(pu = stage.pu, "post-eval worker draining");
                return Ok(stage.profiler);
            }
            WorkUnit::Work(mut entry) => {
                let item = *stage.io_items.get(entry.io_item_index).ok_or_else(|| {
                    PipelineError::WorkSource(format!(
                        "io item index {} out of range",
                        entry.io_item_index
                    ))
                })?;
                stage
                    .profiler
                    .record("format", || trim_warmup(&mut entry, item, stage.warmup_size))
                    .map_err(|e| PipelineError::Kernel {
                        stage: "post-eval",
                        source: e,
                    })?;
                // Output rows are host-resident for the save pool.
                entry.device = Device::CPU;
                stage.output.push(WorkUnit::Work(entry))?;
            }
        }
    }
}

fn trim_warmup(
    entry: &mut EvalWorkEntry,
    item: IoItem,
    warmup_size: i64,
) -> Result<(), KernelError> {
    // The first item of a task starts at row 0, so its warmup clamps to nothing.
    let warmup_rows = warmup_size.min(item.start_row).max(0) as usize;
    let expected = (item.end_row - item.start_row) as usize;
    for column in &mut entry.columns {
        if column.rows.len() < warmup_rows + expected {
            return Err(KernelError::InvalidOutput(format!(
                "column {} has {} rows, item needs {warmup_rows} warmup + {expected} output",
                column.name,
                column.rows.len()
            )));
        }
        column.rows.drain(..warmup_rows);
        if column.rows.len() != expected {
            return Err(KernelError::InvalidOutput(format!(
                "column {} has {} rows after warmup trim, item covers {expected}",
                column.name,
                column.rows.len()
            )));
        }
    }
    Ok(())
}
