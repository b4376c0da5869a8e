//! Eval stage: run the evaluator chain's kernels on the assigned device

use crate::error::{KernelError, PipelineError};
use crate::kernel::{invoke, BoundKernel, Kernel};
use crate::profiler::Profiler;
use crate::queue::{WorkQueue, WorkUnit};
use crate::work::{append_columns, row_count, slice_rows, ColumnBuffer, EvalWorkEntry};
use tracing::debug;

pub(crate) struct EvaluateStage {
    pub pu: usize,
    pub work_item_size: usize,
    /// Evaluators 1..N; evaluator 0 already ran in pre-eval
    pub chain: Vec<BoundKernel>,
    pub profiler: Profiler,
    pub input: WorkQueue<EvalWorkEntry>,
    pub output: WorkQueue<EvalWorkEntry>,
}

pub(crate) fn run(mut stage: EvaluateStage) -> Result<Profiler, PipelineError> {
    let mut kernels: Vec<Box<dyn Kernel>> = Vec::with_capacity(stage.chain.len());
    for bound in &stage.chain {
        kernels.push(bound.instantiate().map_err(|e| PipelineError::Kernel {
            stage: "eval",
            source: e,
        })?);
    }

    loop {
        match stage.input.pop()? {
            WorkUnit::EndOfStream => {
                debug!(pu = stage.pu, "eval worker draining");
                return Ok(stage.profiler);
            }
            WorkUnit::Work(mut entry) => {
                let columns = stage
                    .profiler
                    .record("evaluate", || {
                        evaluate_entry(&stage.chain, &mut kernels, &entry, stage.work_item_size)
                    })
                    .map_err(|e| PipelineError::Kernel {
                        stage: "eval",
                        source: e,
                    })?;
                for kernel in &mut kernels {
                    kernel.reset();
                }
                entry.columns = columns;
                stage.output.push(WorkUnit::Work(entry))?;
            }
        }
    }
}

/// Push each batch of rows through the whole chain, staging every
/// evaluator's output so later evaluators can reference any predecessor
fn evaluate_entry(
    chain: &[BoundKernel],
    kernels: &mut [Box<dyn Kernel>],
    entry: &EvalWorkEntry,
    work_item_size: usize,
) -> Result<Vec<ColumnBuffer>, KernelError> {
    if chain.is_empty() {
        return Ok(entry.columns.clone());
    }

    let total = row_count(&entry.columns);
    let mut final_columns = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + work_item_size).min(total);
        // staged[0] is the decoder's batch; staged[k] is evaluator k's output.
        let mut staged: Vec<Vec<ColumnBuffer>> = vec![slice_rows(&entry.columns, start..end)];
        for (bound, kernel) in chain.iter().zip(kernels.iter_mut()) {
            let inputs = gather_inputs(bound, &staged)?;
            let output = invoke(bound, kernel.as_mut(), &inputs)?;
            staged.push(output);
        }
        append_columns(&mut final_columns, staged.pop().unwrap_or_default());
        start = end;
    }
    Ok(final_columns)
}

fn gather_inputs(
    bound: &BoundKernel,
    staged: &[Vec<ColumnBuffer>],
) -> Result<Vec<ColumnBuffer>, KernelError> {
    if bound.inputs.is_empty() {
        // No declared inputs: consume the previous evaluator's full output.
        return Ok(staged.last().cloned().unwrap_or_default());
    }

    let mut inputs = Vec::new();
    for input in &bound.inputs {
        let source = staged.get(input.evaluator_index).ok_or_else(|| {
            KernelError::InvalidInput(format!(
                "kernel {} references unstaged evaluator {}",
                bound.name, input.evaluator_index
            ))
        })?;
        for name in &input.columns {
            let column = source.iter().find(|c| &c.name == name).ok_or_else(|| {
                KernelError::InvalidInput(format!(
                    "kernel {} input column {name} not produced by evaluator {}",
                    bound.name, input.evaluator_index
                ))
            })?;
            inputs.push(column.clone());
        }
    }
    Ok(inputs)
}
