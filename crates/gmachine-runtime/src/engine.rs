//! The boundary between the inference glue and the engine executing the network.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::machine::MachineError;

/// How a gradient machine is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CreateMode {
    /// Forward and backward passes, every requested buffer kind allocated.
    Normal,
    /// Forward-only. Only value buffers are allocated.
    #[default]
    Testing,
}

/// Which buffer of a parameter is addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ParameterKind {
    Value,
    Gradient,
}

/// A parameter buffer as reported by the engine.
#[derive(Clone, Debug, PartialEq, Eq, derive_new::new)]
pub struct ParameterInfo {
    pub name: String,
    pub kind: ParameterKind,
    pub dims: Vec<usize>,
}

impl ParameterInfo {
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Row-major `height x width` matrix of host values.
#[derive(Clone, Debug, PartialEq, derive_new::new)]
pub struct Matrix {
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.width..(index + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks(self.width.max(1)).take(self.height)
    }
}

/// Named input matrices for one forward pass, one row per sample.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputBatch {
    pub size: usize,
    pub inputs: HashMap<String, Matrix>,
}

impl InputBatch {
    pub fn get(&self, name: &str) -> Option<&Matrix> {
        self.inputs.get(name)
    }
}

/// Result of a forward pass for one sample.
///
/// When a network has several output layers, each field is the concatenation
/// of that sample's row in every output layer, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub value: Vec<f32>,
    pub id: Option<Vec<i64>>,
    pub prob: Option<Vec<f32>>,
}

/// An execution engine for a network topology.
///
/// Forward passes are only accepted between [`start`](GradientMachine::start) and
/// [`finish`](GradientMachine::finish).
pub trait GradientMachine {
    /// Every buffer the machine owns.
    fn parameters(&self) -> Vec<ParameterInfo>;

    /// Overwrites a whole buffer. `values` must hold exactly the buffer's size.
    fn copy_parameter_from(
        &mut self,
        name: &str,
        kind: ParameterKind,
        values: &[f32],
    ) -> Result<(), MachineError>;

    /// Reads back a whole buffer, flattened row-major.
    fn parameter_value(&self, name: &str, kind: ParameterKind) -> Result<Vec<f32>, MachineError>;

    fn start(&mut self) -> Result<(), MachineError>;

    /// Forward-only pass; returns one row per sample of the output.
    fn forward_test(&mut self, batch: &InputBatch) -> Result<Vec<OutputRow>, MachineError>;

    fn finish(&mut self) -> Result<(), MachineError>;

    fn is_started(&self) -> bool;
}
