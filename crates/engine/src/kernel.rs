//! Kernel interface and per-job kernel binding
//!
//! A kernel is one evaluator's executable form. Kernels run on dedicated
//! stage threads and may hold device state across items; `reset` is called at
//! item boundaries so warmup rows can rebuild that state.

use crate::context::EngineContext;
use crate::error::{KernelError, PipelineError};
use crate::work::ColumnBuffer;
use std::sync::Arc;
use videogrid_common::{Device, DeviceType, EvaluatorInput, EvaluatorSpec};

/// Configuration a kernel instance is built with
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Opaque evaluator arguments from the task set
    pub args: Vec<u8>,
    /// Input column names, concatenated in evaluator-input order
    pub input_columns: Vec<String>,
    /// Devices assigned to instances of this kernel
    pub devices: Vec<Device>,
}

pub trait Kernel: Send {
    /// Evaluate one batch of rows; output columns must be row-aligned with
    /// the input batch
    fn evaluate(&mut self, input: &[ColumnBuffer]) -> Result<Vec<ColumnBuffer>, KernelError>;

    /// Called at item boundaries; stateful kernels drop accumulated context
    fn reset(&mut self) {}
}

pub type KernelFactory =
    Arc<dyn Fn(&KernelConfig) -> Result<Box<dyn Kernel>, KernelError> + Send + Sync>;

/// One evaluator resolved against the registries, ready to instantiate
#[derive(Clone)]
pub struct BoundKernel {
    pub name: String,
    pub inputs: Vec<EvaluatorInput>,
    pub factory: KernelFactory,
    pub config: KernelConfig,
    pub output_columns: Vec<String>,
}

impl std::fmt::Debug for BoundKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundKernel")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("config", &self.config)
            .field("output_columns", &self.output_columns)
            .finish()
    }
}

impl BoundKernel {
    pub fn instantiate(&self) -> Result<Box<dyn Kernel>, KernelError> {
        (self.factory)(&self.config)
    }
}

/// Resolve every evaluator of a task set against the registries and build its
/// kernel configuration. Fails before any pipeline thread starts.
pub fn bind_kernels(
    ctx: &EngineContext,
    evaluators: &[EvaluatorSpec],
) -> Result<Vec<BoundKernel>, PipelineError> {
    if evaluators.is_empty() {
        return Err(PipelineError::EmptyEvaluatorChain);
    }

    let gpu_ids = &ctx.config().gpu_device_ids;
    let mut bound = Vec::with_capacity(evaluators.len());

    for spec in evaluators {
        let info = ctx.evaluators().get(&spec.name)?;
        let factory = ctx.kernels().get(&spec.name, spec.device_type)?;

        let mut input_columns = Vec::new();
        for input in &spec.inputs {
            let source = evaluators.get(input.evaluator_index).ok_or_else(|| {
                PipelineError::InvalidEvaluatorInput {
                    evaluator: spec.name.clone(),
                    index: input.evaluator_index,
                }
            })?;
            // The referenced evaluator must itself be registered.
            ctx.evaluators().get(&source.name)?;
            input_columns.extend(input.columns.iter().cloned());
        }

        let devices = match spec.device_type {
            DeviceType::Cpu => vec![Device::CPU],
            DeviceType::Gpu => {
                if gpu_ids.is_empty() {
                    return Err(PipelineError::UnrecognizedDevice {
                        evaluator: spec.name.clone(),
                    });
                }
                (0..spec.device_count)
                    .map(|i| Device::gpu(gpu_ids[i as usize % gpu_ids.len()]))
                    .collect()
            }
        };

        bound.push(BoundKernel {
            name: spec.name.clone(),
            inputs: spec.inputs.clone(),
            factory,
            config: KernelConfig {
                args: spec.kernel_args.clone(),
                input_columns,
                devices,
            },
            output_columns: info.output_columns().to_vec(),
        });
    }

    Ok(bound)
}

/// Run one kernel over a batch, enforcing the row-alignment contract and
/// stamping the registry's output column names
pub(crate) fn invoke(
    bound: &BoundKernel,
    kernel: &mut dyn Kernel,
    input: &[ColumnBuffer],
) -> Result<Vec<ColumnBuffer>, KernelError> {
    let rows = input.first().map_or(0, |c| c.rows.len());
    if input.iter().any(|c| c.rows.len() != rows) {
        return Err(KernelError::InvalidInput(format!(
            "ragged input columns for kernel {}",
            bound.name
        )));
    }

    let mut output = kernel.evaluate(input)?;

    if output.len() != bound.output_columns.len() {
        return Err(KernelError::InvalidOutput(format!(
            "kernel {} produced {} columns, registry declares {}",
            bound.name,
            output.len(),
            bound.output_columns.len()
        )));
    }
    for (column, name) in output.iter_mut().zip(&bound.output_columns) {
        if column.rows.len() != rows {
            return Err(KernelError::InvalidOutput(format!(
                "kernel {} column {name} has {} rows, batch has {rows}",
                bound.name,
                column.rows.len()
            )));
        }
        column.name = name.clone();
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::register_builtins;
    use crate::registry::{EvaluatorInfo, EvaluatorRegistry, KernelRegistry};
    use videogrid_common::EngineConfig;

    fn context_with_gpu_ids(gpu_device_ids: Vec<i32>) -> EngineContext {
        let mut evaluators = EvaluatorRegistry::new();
        let mut kernels = KernelRegistry::new();
        register_builtins(&mut evaluators, &mut kernels).unwrap();

        evaluators
            .register(EvaluatorInfo::new("net", vec!["score".to_string()]))
            .unwrap();
        kernels
            .register(
                "net",
                DeviceType::Gpu,
                Arc::new(|_config: &KernelConfig| {
                    Err(KernelError::ExecutionFailed("not instantiable".to_string()))
                }),
            )
            .unwrap();

        let config = EngineConfig {
            gpu_device_ids,
            ..EngineConfig::default()
        };
        EngineContext::new(config, evaluators, kernels)
    }

    fn gpu_net(device_count: i32) -> EvaluatorSpec {
        EvaluatorSpec {
            name: "net".to_string(),
            device_type: DeviceType::Gpu,
            device_count,
            kernel_args: Vec::new(),
            inputs: vec![EvaluatorInput {
                evaluator_index: 0,
                columns: vec!["frame".to_string()],
            }],
        }
    }

    fn cpu_decode() -> EvaluatorSpec {
        EvaluatorSpec {
            name: "decode".to_string(),
            device_type: DeviceType::Cpu,
            device_count: 1,
            kernel_args: Vec::new(),
            inputs: Vec::new(),
        }
    }

    #[test]
    fn gpu_devices_assigned_round_robin() {
        let ctx = context_with_gpu_ids(vec![0, 1, 2]);
        let bound = bind_kernels(&ctx, &[cpu_decode(), gpu_net(2)]).unwrap();

        assert_eq!(bound[0].config.devices, vec![Device::CPU]);
        assert_eq!(
            bound[1].config.devices,
            vec![Device::gpu(0), Device::gpu(1)]
        );
        assert_eq!(bound[1].config.input_columns, ["frame"]);
    }

    #[test]
    fn round_robin_wraps_past_local_device_count() {
        let ctx = context_with_gpu_ids(vec![4, 7]);
        let bound = bind_kernels(&ctx, &[cpu_decode(), gpu_net(3)]).unwrap();
        assert_eq!(
            bound[1].config.devices,
            vec![Device::gpu(4), Device::gpu(7), Device::gpu(4)]
        );
    }

    #[test]
    fn gpu_evaluator_without_local_gpus_is_fatal() {
        let ctx = context_with_gpu_ids(Vec::new());
        let err = bind_kernels(&ctx, &[cpu_decode(), gpu_net(1)]).unwrap_err();
        assert!(matches!(err, PipelineError::UnrecognizedDevice { .. }));
    }

    #[test]
    fn unknown_evaluator_fails_binding() {
        let ctx = context_with_gpu_ids(vec![0]);
        let spec = EvaluatorSpec {
            name: "does-not-exist".to_string(),
            device_type: DeviceType::Cpu,
            device_count: 1,
            kernel_args: Vec::new(),
            inputs: Vec::new(),
        };
        let err = bind_kernels(&ctx, &[spec]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Registry(crate::RegistryError::UnknownEvaluator(_))
        ));
    }

    #[test]
    fn empty_chain_is_rejected() {
        let ctx = context_with_gpu_ids(vec![0]);
        assert!(matches!(
            bind_kernels(&ctx, &[]),
            Err(PipelineError::EmptyEvaluatorChain)
        ));
    }

    #[test]
    fn input_reference_out_of_range() {
        let ctx = context_with_gpu_ids(vec![0]);
        let mut net = gpu_net(1);
        net.inputs[0].evaluator_index = 9;
        let err = bind_kernels(&ctx, &[cpu_decode(), net]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidEvaluatorInput { .. }));
    }
}
