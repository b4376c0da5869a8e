//! videogrid execution engine
//!
//! The per-worker half of the system: registries for evaluators and kernels,
//! the deterministic I/O item planner, the five-stage thread pipeline that
//! turns load-work entries into persisted output rows, and the per-thread
//! profiler whose intervals become the job profile artifact.

pub mod builtin;
mod context;
mod error;
mod kernel;
mod pipeline;
mod planner;
mod profiler;
mod queue;
mod registry;
mod work;

pub use context::EngineContext;
pub use error::{KernelError, PipelineError, PlanError, QueueDisconnected, RegistryError};
pub use kernel::{bind_kernels, BoundKernel, Kernel, KernelConfig, KernelFactory};
pub use pipeline::{run_job, JobReport, LocalWorkSource, WorkSource};
pub use planner::{plan_io_items, JobPlan};
pub use profiler::{
    read_profiler_artifact, write_profiler_artifact, ProfileArtifact, ProfileRecord, Profiler,
    TaskInterval,
};
pub use queue::{WorkQueue, WorkUnit};
pub use registry::{EvaluatorInfo, EvaluatorRegistry, KernelRegistry};
pub use work::{ColumnBuffer, EvalWorkEntry, IoItem, LoadWorkEntry, SampleRows};
