//! Pre-eval stage: decode raw payloads and stage them for this PU's chain

use crate::error::{KernelError, PipelineError};
use crate::kernel::{invoke, BoundKernel, Kernel};
use crate::profiler::Profiler;
use crate::queue::{WorkQueue, WorkUnit};
use crate::work::{append_columns, row_count, slice_rows, ColumnBuffer, EvalWorkEntry};
use tracing::debug;
use videogrid_common::Device;

pub(crate) struct PreEvaluateStage {
    pub pu: usize,
    pub work_item_size: usize,
    /// Evaluator 0 of the chain, the decoder
    pub decode: BoundKernel,
    /// Device this PU's entries are staged on
    pub device: Device,
    pub profiler: Profiler,
    pub input: WorkQueue<EvalWorkEntry>,
    pub output: WorkQueue<EvalWorkEntry>,
}

pub(crate) fn run(mut stage: PreEvaluateStage) -> Result<Profiler, PipelineError> {
    let mut kernel = stage.decode.instantiate().map_err(|e| PipelineError::Kernel {
        stage: "pre-eval",
        source: e,
    })?;

    loop {
        match stage.input.pop()? {
            WorkUnit::EndOfStream => {
                debug!(pu = stage.pu, "pre-eval worker draining");
                return Ok(stage.profiler);
            }
            WorkUnit::Work(entry) => {
                let decoded = stage
                    .profiler
                    .record("decode", || {
                        decode_entry(&stage.decode, kernel.as_mut(), &entry, stage.work_item_size)
                    })
                    .map_err(|e| PipelineError::Kernel {
                        stage: "pre-eval",
                        source: e,
                    })?;
                kernel.reset();
                stage.output.push(WorkUnit::Work(EvalWorkEntry {
                    io_item_index: entry.io_item_index,
                    device: stage.device,
                    columns: decoded,
                }))?;
            }
        }
    }
}

fn decode_entry(
    bound: &BoundKernel,
    kernel: &mut dyn Kernel,
    entry: &EvalWorkEntry,
    work_item_size: usize,
) -> Result<Vec<ColumnBuffer>, KernelError> {
    let total = row_count(&entry.columns);
    let mut decoded = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + work_item_size).min(total);
        let batch = slice_rows(&entry.columns, start..end);
        let output = invoke(bound, kernel, &batch)?;
        append_columns(&mut decoded, output);
        start = end;
    }
    Ok(decoded)
}
