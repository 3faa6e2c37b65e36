use std::collections::BTreeMap;
use std::path::Path;

use gmachine_topology::Topology;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("Parameter '{name}' declares shape {dims:?} but holds {len} value(s)")]
    Shape {
        name: String,
        dims: Vec<usize>,
        len: usize,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// A dense, row-major numeric array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterArray {
    dims: Vec<usize>,
    data: Vec<f32>,
}

impl ParameterArray {
    pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Result<Self, ParameterError> {
        let array = Self { dims, data };
        array.check("<array>")?;
        Ok(array)
    }

    pub fn zeros(dims: Vec<usize>) -> Self {
        let len = dims.iter().product();
        Self {
            dims,
            data: vec![0.0; len],
        }
    }

    /// Builds a `rows.len() x width` matrix. Every row must have the same width.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, ParameterError> {
        let width = rows.first().map(Vec::len).unwrap_or_default();
        let data: Vec<f32> = rows.iter().flatten().copied().collect();
        Self::new(vec![rows.len(), width], data)
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// The values in row-major order.
    pub fn flatten(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check(&self, name: &str) -> Result<(), ParameterError> {
        if self.dims.iter().product::<usize>() != self.data.len() {
            return Err(ParameterError::Shape {
                name: name.to_string(),
                dims: self.dims.clone(),
                len: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Named parameter values supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: BTreeMap<String, ParameterArray>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-filled values for every parameter the topology declares.
    pub fn from_topology_zeros(topology: &Topology) -> Self {
        let values = topology
            .proto()
            .parameters
            .iter()
            .map(|p| (p.name.clone(), ParameterArray::zeros(p.dims.clone())))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterArray> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, array: ParameterArray) -> Option<ParameterArray> {
        self.values.insert(name.into(), array)
    }

    pub fn with(mut self, name: impl Into<String>, array: ParameterArray) -> Self {
        self.set(name, array);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, ParameterError> {
        let parameters: Parameters = serde_json::from_str(json)?;
        for (name, array) in &parameters.values {
            array.check(name)?;
        }
        Ok(parameters)
    }

    pub fn to_json(&self) -> Result<String, ParameterError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParameterError> {
        let path = path.as_ref();
        log::debug!("Loading parameters from {}", path.display());
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ParameterError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
