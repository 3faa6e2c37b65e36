use gmachine_topology::TopologyError;
use thiserror::Error;

use crate::engine::ParameterKind;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("Invalid network description: {0}")]
    Config(#[from] TopologyError),
    #[error("Gradient machine has not been started")]
    NotStarted,
    #[error("Gradient machine is already running a batch loop")]
    AlreadyStarted,
    #[error("No {kind} buffer named '{name}'")]
    UnknownBuffer { name: String, kind: ParameterKind },
    #[error("Buffer '{name}' holds {expected} values, got {actual}")]
    BufferSize {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Input '{0}' is missing from the batch")]
    MissingInput(String),
    #[error("Input '{name}' should be {expected} wide, got {actual}")]
    InputWidth {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Layer '{layer}' failed: {reason}")]
    Layer { layer: String, reason: String },
    #[error("Tensor data error: {0}")]
    Tensor(String),
}

impl MachineError {
    pub(crate) fn layer(layer: &str, reason: impl Into<String>) -> Self {
        MachineError::Layer {
            layer: layer.to_string(),
            reason: reason.into(),
        }
    }
}
