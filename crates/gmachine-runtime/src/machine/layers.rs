//! Forward computations of the supported layer kinds on burn tensors.
//!
//! Every activation is a `[batch, size]` matrix; spatial layers view each row as a
//! `channels x height x width` frame.
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData, activation};
use gmachine_topology::{Activation, FrameShape, NearestInterpConfig, SliceConfig};

use super::MachineError;

pub(crate) fn to_host<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f32>, MachineError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| MachineError::Tensor(format!("{e:?}")))
}

pub(crate) fn ids_to_host<B: Backend>(tensor: Tensor<B, 2, Int>) -> Result<Vec<i64>, MachineError> {
    tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| MachineError::Tensor(format!("{e:?}")))
}

pub(crate) fn from_host<B: Backend>(
    values: Vec<f32>,
    dims: [usize; 2],
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values, dims), device)
}

fn index_tensor<B: Backend>(indices: Vec<i64>, device: &B::Device) -> Tensor<B, 1, Int> {
    let len = indices.len();
    Tensor::from_data(TensorData::new(indices, [len]), device)
}

pub(crate) fn fully_connected<B: Backend>(
    input: Tensor<B, 2>,
    weight: Tensor<B, 2>,
    bias: Option<Tensor<B, 2>>,
    activation: Activation,
) -> Tensor<B, 2> {
    let mut output = input.matmul(weight);
    if let Some(bias) = bias {
        output = output + bias;
    }
    match activation {
        Activation::Linear => output,
        Activation::Relu => activation::relu(output),
        Activation::Sigmoid => activation::sigmoid(output),
        Activation::Tanh => activation::tanh(output),
        Activation::Softmax => activation::softmax(output, 1),
    }
}

/// Extracts `size` entries starting at `begin` along one batched axis.
pub(crate) fn slice<B: Backend>(
    layer: &str,
    input: Tensor<B, 2>,
    frame: FrameShape,
    config: SliceConfig,
) -> Result<Tensor<B, 2>, MachineError> {
    let [batch, width] = input.dims();
    if width != frame.size() {
        return Err(MachineError::layer(
            layer,
            format!("input is {width} wide, frame {frame} holds {}", frame.size()),
        ));
    }
    let extent = match config.axis {
        0 => batch,
        axis => frame
            .extent(axis)
            .ok_or_else(|| MachineError::layer(layer, format!("no axis {axis}")))?,
    };
    if config.begin + config.size > extent {
        return Err(MachineError::layer(
            layer,
            format!(
                "begin {} + size {} exceeds extent {extent} of axis {}",
                config.begin, config.size, config.axis
            ),
        ));
    }

    if config.axis == 0 {
        return Ok(input.narrow(0, config.begin, config.size));
    }

    let out_size = config.size * frame.size() / extent;
    let batched: Tensor<B, 4> = input.reshape(frame.batched(batch));
    Ok(batched
        .narrow(config.axis, config.begin, config.size)
        .reshape([batch, out_size]))
}

/// Reorders the `C x H x W` axes of every sample so that output axis `i` is
/// input axis `order[i]`.
pub(crate) fn transpose<B: Backend>(
    input: Tensor<B, 2>,
    frame: FrameShape,
    order: [usize; 3],
) -> Tensor<B, 2> {
    if order == [0, 1, 2] {
        return input;
    }
    let [batch, width] = input.dims();
    let mut batched: Tensor<B, 4> = input.reshape(frame.batched(batch));
    // Position `i` currently holds frame axis `current[i]`.
    let mut current = [0, 1, 2];
    for target in 0..3 {
        let Some(position) = current.iter().position(|&axis| axis == order[target]) else {
            continue;
        };
        if position != target {
            batched = batched.swap_dims(target + 1, position + 1);
            current.swap(target, position);
        }
    }
    batched.reshape([batch, width])
}

/// Nearest id of a real-valued input. Exact halves round down.
fn round_id(value: f32) -> i64 {
    let floor = value.floor();
    if value - floor > 0.5 {
        floor as i64 + 1
    } else {
        floor as i64
    }
}

pub(crate) fn one_hot<B: Backend>(
    layer: &str,
    input: Tensor<B, 2>,
    classes: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>, MachineError> {
    let [batch, width] = input.dims();
    if width != 1 {
        return Err(MachineError::layer(
            layer,
            format!("input must hold one id per row, got {width} values"),
        ));
    }
    let ids = to_host(input)?;
    let mut output = vec![0.0; batch * classes];
    for (row, value) in ids.into_iter().enumerate() {
        let id = round_id(value);
        if (0..classes as i64).contains(&id) {
            output[row * classes + id as usize] = 1.0;
        }
    }
    Ok(from_host(output, [batch, classes], device))
}

/// Source indices of a nearest-neighbour resize from `input` to `output` pixels.
fn nearest_indices(input: usize, output: usize) -> Vec<i64> {
    let ratio = if output > 1 {
        input as f32 / output as f32
    } else {
        0.0
    };
    (0..output)
        .map(|i| ((ratio * i as f32) as usize).min(input - 1) as i64)
        .collect()
}

pub(crate) fn nearest_interp<B: Backend>(
    input: Tensor<B, 2>,
    frame: FrameShape,
    config: NearestInterpConfig,
    device: &B::Device,
) -> Tensor<B, 2> {
    let [batch, _] = input.dims();
    let rows = index_tensor::<B>(nearest_indices(frame.height, config.out_height), device);
    let cols = index_tensor::<B>(nearest_indices(frame.width, config.out_width), device);
    let batched: Tensor<B, 4> = input.reshape(frame.batched(batch));
    batched.select(2, rows).select(3, cols).reshape([
        batch,
        frame.channels * config.out_height * config.out_width,
    ])
}

/// Per row, the maximal value and its index.
pub(crate) fn max_id<B: Backend>(input: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2, Int>) {
    let ids = input.clone().argmax(1);
    (input.max_dim(1), ids)
}
