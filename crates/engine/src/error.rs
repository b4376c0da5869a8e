//! Error types for the execution engine

use thiserror::Error;
use videogrid_common::DeviceType;
use videogrid_storage::StorageError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown evaluator: {0}")]
    UnknownEvaluator(String),

    #[error("no kernel for evaluator {name} on device type {device_type:?}")]
    NoKernelForDevice { name: String, device_type: DeviceType },

    #[error("duplicate registration: {0}")]
    Duplicate(String),
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("malformed task {task}: {reason}")]
    MalformedTask { task: usize, reason: String },

    #[error("inconsistent samples in task {task}: {reason}")]
    InconsistentSamples { task: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("invalid kernel input: {0}")]
    InvalidInput(String),

    #[error("kernel execution failed: {0}")]
    ExecutionFailed(String),

    #[error("kernel produced invalid output: {0}")]
    InvalidOutput(String),
}

/// All ends of a work queue dropped while a stage still needed it
#[derive(Debug, Error)]
#[error("work queue disconnected")]
pub struct QueueDisconnected;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueDisconnected),

    #[error("task set has no evaluators")]
    EmptyEvaluatorChain,

    #[error("unrecognized device for evaluator {evaluator}")]
    UnrecognizedDevice { evaluator: String },

    #[error("evaluator {evaluator} references undefined input evaluator {index}")]
    InvalidEvaluatorInput { evaluator: String, index: usize },

    #[error("{stage} stage kernel error: {source}")]
    Kernel {
        stage: &'static str,
        #[source]
        source: KernelError,
    },

    #[error("work source failed: {0}")]
    WorkSource(String),

    #[error("{stage} stage thread panicked")]
    StageThreadPanicked { stage: &'static str },
}

impl PipelineError {
    /// Whether the error was detected before any pipeline thread started
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Registry(_)
                | Self::Plan(_)
                | Self::EmptyEvaluatorChain
                | Self::UnrecognizedDevice { .. }
                | Self::InvalidEvaluatorInput { .. }
        )
    }
}
