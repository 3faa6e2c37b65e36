use serde::{Deserialize, Serialize};

/// Type of the values a data layer accepts for each sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case", tag = "type", content = "dim")]
#[strum(serialize_all = "snake_case")]
pub enum InputType {
    /// A dense vector of `dim` real values.
    DenseVector(usize),
    /// A single integer id in `0..range`.
    IntegerValue(usize),
}

impl InputType {
    /// Width of the matrix row this input occupies in a batch.
    pub fn width(&self) -> usize {
        match self {
            InputType::DenseVector(dim) => *dim,
            InputType::IntegerValue(_) => 1,
        }
    }
}

pub fn dense_vector(dim: usize) -> InputType {
    InputType::DenseVector(dim)
}

pub fn integer_value(range: usize) -> InputType {
    InputType::IntegerValue(range)
}
