use gmachine_topology::TopologyError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::feeder::FeedError;
use crate::field::Field;
use crate::machine::MachineError;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("No value supplied for parameter '{0}'")]
    MissingParameter(String),
    #[error("Parameter '{name}' holds {actual} value(s), the machine expects {expected}")]
    ParameterShape {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Field '{0}' is not produced by any output of the network")]
    FieldUnavailable(Field),
    #[error(transparent)]
    Machine(#[from] MachineError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Inference cancelled")]
    Cancelled,
    #[error("Inference thread panicked: {0}")]
    ThreadPanicked(String),
}
