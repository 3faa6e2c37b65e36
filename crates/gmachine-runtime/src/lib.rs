//! Batched inference over a gradient machine.
//!
//! The [`engine`] module defines the boundary every execution engine implements, and
//! [`machine::BurnMachine`] is a reference engine computing forward passes with burn tensors.
//! [`inference`] drives an engine over batches of samples while keeping its start and finish
//! calls balanced.
pub mod batch;
pub mod config;
pub mod engine;
pub mod feeder;
pub mod field;
pub mod inference;
pub mod machine;
pub mod parameters;

pub use batch::{BatchSize, batch, batches};
pub use config::{ConfigError, InferConfig};
pub use engine::{
    CreateMode, GradientMachine, InputBatch, Matrix, OutputRow, ParameterInfo, ParameterKind,
};
pub use feeder::{DataFeeder, FeedError, Feeding, Sample, SampleField};
pub use field::{Field, FieldSelection, FieldValue};
pub use inference::{
    CancelToken, FieldColumn, FieldIter, InferIter, InferResult, Inference, InferenceError,
    JobHandle, infer,
};
pub use machine::{BurnMachine, MachineError};
pub use parameters::{ParameterArray, ParameterError, Parameters};

pub use gmachine_topology as topology;
