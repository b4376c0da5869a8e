//! Built-in software decode kernel
//!
//! Evaluator 0 of every chain is the decoder. The bundled implementation is a
//! raw-payload decoder: each stored row already holds one frame's bytes, so
//! decoding is a rename into the `frame` column. Hardware and codec-specific
//! decoders register under the same name for their device type.

use crate::error::{KernelError, RegistryError};
use crate::kernel::{Kernel, KernelConfig};
use crate::registry::{EvaluatorInfo, EvaluatorRegistry, KernelRegistry};
use crate::work::ColumnBuffer;
use std::sync::Arc;
use videogrid_common::DeviceType;

pub const DECODE_EVALUATOR: &str = "decode";
pub const FRAME_COLUMN: &str = "frame";

struct RawFrameDecode;

impl Kernel for RawFrameDecode {
    fn evaluate(&mut self, input: &[ColumnBuffer]) -> Result<Vec<ColumnBuffer>, KernelError> {
        let first = input.first().ok_or_else(|| {
            KernelError::InvalidInput("decode expects at least one input column".to_string())
        })?;
        Ok(vec![ColumnBuffer {
            name: FRAME_COLUMN.to_string(),
            rows: first.rows.clone(),
        }])
    }
}

/// Register the evaluators and kernels every node ships with
pub fn register_builtins(
    evaluators: &mut EvaluatorRegistry,
    kernels: &mut KernelRegistry,
) -> Result<(), RegistryError> {
    evaluators.register(EvaluatorInfo::new(
        DECODE_EVALUATOR,
        vec![FRAME_COLUMN.to_string()],
    ))?;
    kernels.register(
        DECODE_EVALUATOR,
        DeviceType::Cpu,
        Arc::new(|_config: &KernelConfig| Ok(Box::new(RawFrameDecode) as Box<dyn Kernel>)),
    )?;
    Ok(())
}
