//! A reference gradient machine executing a [`ModelConfig`] with burn tensors.
mod error;
mod layers;

pub use error::MachineError;

use std::collections::HashMap;

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use gmachine_topology::{LayerConfig, LayerKind, ModelConfig};

use crate::engine::{
    CreateMode, GradientMachine, InputBatch, OutputRow, ParameterInfo, ParameterKind,
};

struct Buffer<B: Backend> {
    dims: [usize; 2],
    tensor: Tensor<B, 2>,
}

/// Everything a layer produced during one forward pass.
struct Activations<B: Backend> {
    values: HashMap<String, Tensor<B, 2>>,
    ids: HashMap<String, Tensor<B, 2, Int>>,
}

pub struct BurnMachine<B: Backend> {
    config: ModelConfig,
    mode: CreateMode,
    buffers: HashMap<(String, ParameterKind), Buffer<B>>,
    device: B::Device,
    started: bool,
}

impl<B: Backend> BurnMachine<B> {
    /// Creates a machine for `config`, allocating zeroed buffers of the requested kinds.
    ///
    /// In [`CreateMode::Testing`] only value buffers are allocated, whatever `kinds` asks for.
    pub fn create_from_config(
        config: ModelConfig,
        mode: CreateMode,
        kinds: &[ParameterKind],
        device: &B::Device,
    ) -> Result<Self, MachineError> {
        config.validate()?;

        let kinds: Vec<ParameterKind> = kinds
            .iter()
            .copied()
            .filter(|kind| mode == CreateMode::Normal || *kind == ParameterKind::Value)
            .collect();

        let mut buffers = HashMap::new();
        for parameter in &config.parameters {
            let dims = match parameter.dims[..] {
                [rows, cols] => [rows, cols],
                [cols] => [1, cols],
                _ => {
                    return Err(MachineError::BufferSize {
                        name: parameter.name.clone(),
                        expected: 2,
                        actual: parameter.dims.len(),
                    });
                }
            };
            for kind in &kinds {
                buffers.insert(
                    (parameter.name.clone(), *kind),
                    Buffer {
                        dims,
                        tensor: Tensor::zeros(dims, device),
                    },
                );
            }
        }

        log::debug!(
            "Created gradient machine in {mode} mode with {} layer(s) and {} buffer(s)",
            config.layers.len(),
            buffers.len()
        );

        Ok(Self {
            config,
            mode,
            buffers,
            device: device.clone(),
            started: false,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn mode(&self) -> CreateMode {
        self.mode
    }

    fn buffer(&self, name: &str, kind: ParameterKind) -> Result<&Buffer<B>, MachineError> {
        self.buffers
            .get(&(name.to_string(), kind))
            .ok_or_else(|| MachineError::UnknownBuffer {
                name: name.to_string(),
                kind,
            })
    }

    fn value(&self, name: &str) -> Result<Tensor<B, 2>, MachineError> {
        Ok(self.buffer(name, ParameterKind::Value)?.tensor.clone())
    }

    fn forward_layer(
        &self,
        layer: &LayerConfig,
        batch: &InputBatch,
        acts: &mut Activations<B>,
    ) -> Result<(), MachineError> {
        let input = |index: usize| -> Result<Tensor<B, 2>, MachineError> {
            let name = layer
                .inputs
                .get(index)
                .ok_or_else(|| MachineError::layer(&layer.name, format!("missing input {index}")))?;
            acts.values
                .get(name)
                .cloned()
                .ok_or_else(|| MachineError::layer(&layer.name, format!("input '{name}' not computed")))
        };
        let frame_of = |index: usize| -> Result<gmachine_topology::FrameShape, MachineError> {
            layer
                .inputs
                .get(index)
                .and_then(|name| self.config.layer(name))
                .map(|l| l.shape)
                .ok_or_else(|| MachineError::layer(&layer.name, format!("missing input {index}")))
        };

        let output = match &layer.kind {
            LayerKind::Data { .. } => {
                let matrix = batch
                    .get(&layer.name)
                    .ok_or_else(|| MachineError::MissingInput(layer.name.clone()))?;
                if matrix.width != layer.size {
                    return Err(MachineError::InputWidth {
                        name: layer.name.clone(),
                        expected: layer.size,
                        actual: matrix.width,
                    });
                }
                layers::from_host(
                    matrix.data.clone(),
                    [matrix.height, matrix.width],
                    &self.device,
                )
            }
            LayerKind::Fc { activation, bias } => {
                let weight = self.value(&layer.weight_name())?;
                let bias = if *bias {
                    Some(self.value(&layer.bias_name())?)
                } else {
                    None
                };
                layers::fully_connected(input(0)?, weight, bias, *activation)
            }
            LayerKind::Slice(slice) => layers::slice(&layer.name, input(0)?, frame_of(0)?, *slice)?,
            LayerKind::Transpose(transpose) => {
                layers::transpose(input(0)?, frame_of(0)?, transpose.order)
            }
            LayerKind::OneHot { classes } => {
                layers::one_hot(&layer.name, input(0)?, *classes, &self.device)?
            }
            LayerKind::GradientStopping => input(layer.inputs.len().saturating_sub(1))?,
            LayerKind::NearestInterp(interp) => {
                layers::nearest_interp(input(0)?, frame_of(0)?, *interp, &self.device)
            }
            LayerKind::MaxId => {
                let (values, ids) = layers::max_id(input(0)?);
                acts.ids.insert(layer.name.clone(), ids);
                values
            }
        };
        acts.values.insert(layer.name.clone(), output);
        Ok(())
    }
}

impl<B: Backend> GradientMachine for BurnMachine<B> {
    fn parameters(&self) -> Vec<ParameterInfo> {
        let mut infos: Vec<ParameterInfo> = self
            .buffers
            .iter()
            .map(|((name, kind), buffer)| {
                ParameterInfo::new(name.clone(), *kind, buffer.dims.to_vec())
            })
            .collect();
        let order: HashMap<&str, usize> = self
            .config
            .parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.as_str(), i))
            .collect();
        infos.sort_by_key(|info| (order.get(info.name.as_str()).copied(), info.kind as u8));
        infos
    }

    fn copy_parameter_from(
        &mut self,
        name: &str,
        kind: ParameterKind,
        values: &[f32],
    ) -> Result<(), MachineError> {
        let device = self.device.clone();
        let buffer = self
            .buffers
            .get_mut(&(name.to_string(), kind))
            .ok_or_else(|| MachineError::UnknownBuffer {
                name: name.to_string(),
                kind,
            })?;
        let expected = buffer.dims[0] * buffer.dims[1];
        if values.len() != expected {
            return Err(MachineError::BufferSize {
                name: name.to_string(),
                expected,
                actual: values.len(),
            });
        }
        buffer.tensor = layers::from_host(values.to_vec(), buffer.dims, &device);
        log::trace!("Copied {expected} value(s) into {kind} buffer '{name}'");
        Ok(())
    }

    fn parameter_value(&self, name: &str, kind: ParameterKind) -> Result<Vec<f32>, MachineError> {
        layers::to_host(self.buffer(name, kind)?.tensor.clone())
    }

    fn start(&mut self) -> Result<(), MachineError> {
        if self.started {
            return Err(MachineError::AlreadyStarted);
        }
        self.started = true;
        log::debug!("Gradient machine started");
        Ok(())
    }

    fn forward_test(&mut self, batch: &InputBatch) -> Result<Vec<OutputRow>, MachineError> {
        if !self.started {
            return Err(MachineError::NotStarted);
        }

        let mut acts = Activations {
            values: HashMap::new(),
            ids: HashMap::new(),
        };
        for layer in &self.config.layers {
            self.forward_layer(layer, batch, &mut acts)?;
        }

        let mut rows: Option<Vec<OutputRow>> = None;
        for name in &self.config.output_layer_names {
            let value = acts
                .values
                .remove(name)
                .ok_or_else(|| MachineError::layer(name, "output was not computed"))?;
            let [height, width] = value.dims();
            let rows = rows.get_or_insert_with(|| vec![OutputRow::default(); height]);
            if rows.len() != height {
                return Err(MachineError::layer(
                    name,
                    format!("output has {height} row(s), previous outputs had {}", rows.len()),
                ));
            }

            let values = layers::to_host(value)?;
            let ids = match acts.ids.remove(name) {
                Some(ids) => Some(layers::ids_to_host(ids)?),
                None => None,
            };
            for (index, row) in rows.iter_mut().enumerate() {
                let slice = &values[index * width..(index + 1) * width];
                row.value.extend_from_slice(slice);
                if let Some(ids) = &ids {
                    row.id.get_or_insert_with(Vec::new).push(ids[index]);
                    row.prob.get_or_insert_with(Vec::new).extend_from_slice(slice);
                }
            }
        }

        let rows = rows.unwrap_or_default();
        log::trace!("Forwarded batch of {} sample(s) into {} row(s)", batch.size, rows.len());
        Ok(rows)
    }

    fn finish(&mut self) -> Result<(), MachineError> {
        if !self.started {
            return Err(MachineError::NotStarted);
        }
        self.started = false;
        log::debug!("Gradient machine finished");
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started
    }
}
