//! Evaluator and kernel registries
//!
//! Both registries are populated during process startup and frozen into an
//! [`crate::EngineContext`] before any job runs; lookups during a job go
//! through shared references only.

use crate::error::RegistryError;
use crate::kernel::KernelFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use videogrid_common::DeviceType;

/// Metadata the planner and master need about one evaluator
#[derive(Debug, Clone)]
pub struct EvaluatorInfo {
    name: String,
    output_columns: Vec<String>,
}

impl EvaluatorInfo {
    pub fn new(name: impl Into<String>, output_columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            output_columns,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered names of the columns this evaluator produces
    #[must_use]
    pub fn output_columns(&self) -> &[String] {
        &self.output_columns
    }
}

/// Catalogue mapping evaluator name → metadata
#[derive(Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<EvaluatorInfo>>,
}

impl EvaluatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: EvaluatorInfo) -> Result<(), RegistryError> {
        let name = info.name().to_string();
        if self.evaluators.contains_key(&name) {
            return Err(RegistryError::Duplicate(format!("evaluator {name}")));
        }
        info!(evaluator = %name, "registering evaluator");
        self.evaluators.insert(name, Arc::new(info));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<EvaluatorInfo>, RegistryError> {
        self.evaluators
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownEvaluator(name.to_string()))
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.evaluators.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Catalogue mapping (evaluator name, device type) → kernel factory
#[derive(Default)]
pub struct KernelRegistry {
    factories: HashMap<(String, DeviceType), KernelFactory>,
}

impl KernelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        device_type: DeviceType,
        factory: KernelFactory,
    ) -> Result<(), RegistryError> {
        let key = (name.to_string(), device_type);
        if self.factories.contains_key(&key) {
            return Err(RegistryError::Duplicate(format!(
                "kernel {name} on {device_type:?}"
            )));
        }
        info!(kernel = name, ?device_type, "registering kernel");
        self.factories.insert(key, factory);
        Ok(())
    }

    pub fn get(&self, name: &str, device_type: DeviceType) -> Result<KernelFactory, RegistryError> {
        self.factories
            .get(&(name.to_string(), device_type))
            .cloned()
            .ok_or_else(|| RegistryError::NoKernelForDevice {
                name: name.to_string(),
                device_type,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, KernelConfig};
    use crate::work::ColumnBuffer;
    use crate::KernelError;

    struct NoopKernel;

    impl Kernel for NoopKernel {
        fn evaluate(&mut self, _input: &[ColumnBuffer]) -> Result<Vec<ColumnBuffer>, KernelError> {
            Ok(Vec::new())
        }
    }

    fn noop_factory() -> KernelFactory {
        Arc::new(|_config: &KernelConfig| Ok(Box::new(NoopKernel) as Box<dyn Kernel>))
    }

    #[test]
    fn evaluator_lookup_and_duplicate() {
        let mut registry = EvaluatorRegistry::new();
        registry
            .register(EvaluatorInfo::new("decode", vec!["frame".to_string()]))
            .unwrap();

        assert_eq!(registry.get("decode").unwrap().output_columns(), ["frame"]);
        assert!(matches!(
            registry.get("missing"),
            Err(RegistryError::UnknownEvaluator(_))
        ));
        assert!(matches!(
            registry.register(EvaluatorInfo::new("decode", Vec::new())),
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[test]
    fn kernel_lookup_is_per_device() {
        let mut registry = KernelRegistry::new();
        registry
            .register("decode", DeviceType::Cpu, noop_factory())
            .unwrap();

        assert!(registry.get("decode", DeviceType::Cpu).is_ok());
        assert!(matches!(
            registry.get("decode", DeviceType::Gpu),
            Err(RegistryError::NoKernelForDevice { .. })
        ));
        assert!(matches!(
            registry.register("decode", DeviceType::Cpu, noop_factory()),
            Err(RegistryError::Duplicate(_))
        ));
    }
}
