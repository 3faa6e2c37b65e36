use crate::layer::ParameterConfig;

#[derive(thiserror::Error, Debug)]
pub enum TopologyError {
    #[error("Topology must declare at least one output layer")]
    NoOutputs,
    #[error("Two different layers are named '{0}'")]
    DuplicateLayer(String),
    #[error("Layer '{layer}' refers to unknown input '{input}'")]
    UnknownInput { layer: String, input: String },
    #[error("Layer '{layer}' expects {expected} input(s), got {actual}")]
    InputCount {
        layer: String,
        expected: String,
        actual: usize,
    },
    #[error("Invalid shape for layer '{layer}': {reason}")]
    InvalidShape { layer: String, reason: String },
    #[error(
        "Slice of layer '{layer}' is out of range: begin {begin} + size {size} exceeds extent {extent} of axis {axis}"
    )]
    SliceOutOfRange {
        layer: String,
        axis: usize,
        begin: usize,
        size: usize,
        extent: usize,
    },
    #[error("Invalid transpose order {order:?} for layer '{layer}'")]
    TransposeOrder { layer: String, order: [usize; 3] },
    #[error("Declared parameters {actual:?} do not match the layers, expected {expected:?}")]
    ParameterMismatch {
        expected: Vec<ParameterConfig>,
        actual: Vec<ParameterConfig>,
    },
    #[error("Failed to (de)serialize topology: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TopologyError {
    pub(crate) fn shape(layer: &str, reason: impl Into<String>) -> Self {
        TopologyError::InvalidShape {
            layer: layer.to_string(),
            reason: reason.into(),
        }
    }
}
