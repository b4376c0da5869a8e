//! Frozen execution context handed to the planner and pipeline

use crate::registry::{EvaluatorRegistry, KernelRegistry};
use videogrid_common::EngineConfig;

/// Engine configuration plus the frozen registries. Construction consumes the
/// registries, so nothing can mutate them once jobs are running.
pub struct EngineContext {
    config: EngineConfig,
    evaluators: EvaluatorRegistry,
    kernels: KernelRegistry,
}

impl EngineContext {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        evaluators: EvaluatorRegistry,
        kernels: KernelRegistry,
    ) -> Self {
        Self {
            config,
            evaluators,
            kernels,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn evaluators(&self) -> &EvaluatorRegistry {
        &self.evaluators
    }

    #[must_use]
    pub fn kernels(&self) -> &KernelRegistry {
        &self.kernels
    }
}
