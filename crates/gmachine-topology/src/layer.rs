use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data_type::InputType;
use crate::shape::FrameShape;
use crate::TopologyError;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct SliceConfig {
    pub begin: usize,
    pub size: usize,
    pub axis: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct TransposeConfig {
    /// Output axis `i` of every `C x H x W` sample is input axis `order[i]`.
    pub order: [usize; 3],
}

impl TransposeConfig {
    pub fn is_identity(&self) -> bool {
        self.order == [0, 1, 2]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct NearestInterpConfig {
    pub out_height: usize,
    pub out_width: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case", tag = "type")]
#[strum(serialize_all = "snake_case")]
pub enum LayerKind {
    Data {
        input_type: InputType,
    },
    Fc {
        activation: Activation,
        bias: bool,
    },
    Slice(SliceConfig),
    Transpose(TransposeConfig),
    OneHot {
        classes: usize,
    },
    GradientStopping,
    NearestInterp(NearestInterpConfig),
    MaxId,
}

/// Serialized description of one layer, with its shape already inferred.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    pub kind: LayerKind,
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Per-sample output size.
    pub size: usize,
    pub shape: FrameShape,
}

impl LayerConfig {
    pub fn weight_name(&self) -> String {
        format!("_{}.w0", self.name)
    }

    pub fn bias_name(&self) -> String {
        format!("_{}.wbias", self.name)
    }
}

/// Shape of a parameter buffer owned by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct ParameterConfig {
    pub name: String,
    pub dims: Vec<usize>,
}

impl ParameterConfig {
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }
}

#[derive(Debug)]
pub(crate) struct LayerNode {
    pub(crate) config: LayerConfig,
    pub(crate) parents: Vec<LayerOutput>,
}

/// Handle on a configured layer and the graph feeding it.
///
/// Cloning is cheap; the same handle can feed several consumers.
#[derive(Clone, Debug)]
pub struct LayerOutput(pub(crate) Arc<LayerNode>);

impl LayerOutput {
    fn build(config: LayerConfig, parents: Vec<LayerOutput>) -> Self {
        log::trace!(
            "Configured {} layer '{}' with shape {}",
            config.kind,
            config.name,
            config.shape
        );
        Self(Arc::new(LayerNode { config, parents }))
    }

    pub fn name(&self) -> &str {
        &self.0.config.name
    }

    pub fn config(&self) -> &LayerConfig {
        &self.0.config
    }

    pub fn size(&self) -> usize {
        self.0.config.size
    }

    pub fn shape(&self) -> FrameShape {
        self.0.config.shape
    }

    pub fn parents(&self) -> &[LayerOutput] {
        &self.0.parents
    }
}

/// Parameter buffers a layer needs, given the sizes of its inputs.
pub(crate) fn layer_parameters(config: &LayerConfig, input_sizes: &[usize]) -> Vec<ParameterConfig> {
    match config.kind {
        LayerKind::Fc { bias, .. } => {
            let input_size = input_sizes.first().copied().unwrap_or_default();
            let mut params = vec![ParameterConfig::new(
                config.weight_name(),
                vec![input_size, config.size],
            )];
            if bias {
                params.push(ParameterConfig::new(config.bias_name(), vec![1, config.size]));
            }
            params
        }
        _ => Vec::new(),
    }
}

/// Infers the output frame of a layer from the frames of its inputs.
pub(crate) fn infer_shape(
    name: &str,
    kind: &LayerKind,
    inputs: &[FrameShape],
) -> Result<FrameShape, TopologyError> {
    let expect_inputs = |expected: &str, ok: bool| {
        if ok {
            Ok(())
        } else {
            Err(TopologyError::InputCount {
                layer: name.to_string(),
                expected: expected.to_string(),
                actual: inputs.len(),
            })
        }
    };

    match kind {
        LayerKind::Data { input_type } => {
            expect_inputs("0", inputs.is_empty())?;
            Ok(FrameShape::flat(input_type.width()))
        }
        LayerKind::Fc { .. } => Err(TopologyError::shape(
            name,
            "fully connected layers take their size from the configuration",
        )),
        LayerKind::Slice(slice) => {
            expect_inputs("1", inputs.len() == 1)?;
            let input = inputs[0];
            if slice.size == 0 {
                return Err(TopologyError::shape(name, "slice size must be positive"));
            }
            if slice.axis == 0 {
                // Rows of the batch are only known at forward time.
                return Ok(input);
            }
            let extent = input
                .extent(slice.axis)
                .ok_or_else(|| TopologyError::shape(name, format!("no axis {}", slice.axis)))?;
            if slice.begin + slice.size > extent {
                return Err(TopologyError::SliceOutOfRange {
                    layer: name.to_string(),
                    axis: slice.axis,
                    begin: slice.begin,
                    size: slice.size,
                    extent,
                });
            }
            input
                .with_extent(slice.axis, slice.size)
                .ok_or_else(|| TopologyError::shape(name, format!("no axis {}", slice.axis)))
        }
        LayerKind::Transpose(transpose) => {
            expect_inputs("1", inputs.len() == 1)?;
            let mut seen = [false; 3];
            for &axis in &transpose.order {
                if axis > 2 || seen[axis] {
                    return Err(TopologyError::TransposeOrder {
                        layer: name.to_string(),
                        order: transpose.order,
                    });
                }
                seen[axis] = true;
            }
            Ok(inputs[0].permuted(transpose.order))
        }
        LayerKind::OneHot { classes } => {
            expect_inputs("1", inputs.len() == 1)?;
            if inputs[0].size() != 1 {
                return Err(TopologyError::shape(
                    name,
                    format!("one-hot input must hold one value, got {}", inputs[0].size()),
                ));
            }
            if *classes == 0 {
                return Err(TopologyError::shape(name, "class count must be positive"));
            }
            Ok(FrameShape::flat(*classes))
        }
        LayerKind::GradientStopping => {
            expect_inputs("at least 1", !inputs.is_empty())?;
            Ok(inputs[inputs.len() - 1])
        }
        LayerKind::NearestInterp(interp) => {
            expect_inputs("1", inputs.len() == 1)?;
            if interp.out_height == 0 || interp.out_width == 0 {
                return Err(TopologyError::shape(name, "output image size must be positive"));
            }
            Ok(FrameShape::new(
                inputs[0].channels,
                interp.out_height,
                interp.out_width,
            ))
        }
        LayerKind::MaxId => {
            expect_inputs("1", inputs.len() == 1)?;
            Ok(FrameShape::flat(1))
        }
    }
}

fn derived(
    name: impl Into<String>,
    kind: LayerKind,
    parents: Vec<LayerOutput>,
) -> Result<LayerOutput, TopologyError> {
    let name = name.into();
    let frames: Vec<FrameShape> = parents.iter().map(LayerOutput::shape).collect();
    let shape = infer_shape(&name, &kind, &frames)?;
    let config = LayerConfig {
        inputs: parents.iter().map(|p| p.name().to_string()).collect(),
        size: shape.size(),
        shape,
        name,
        kind,
    };
    Ok(LayerOutput::build(config, parents))
}

/// Declares a named dense input of `size` values, optionally laid out as
/// `channels x height x width`.
pub fn data_layer(
    name: impl Into<String>,
    size: usize,
    height: Option<usize>,
    width: Option<usize>,
) -> Result<LayerOutput, TopologyError> {
    let name = name.into();
    let shape = FrameShape::from_size(&name, size, height, width)?;
    let config = LayerConfig {
        kind: LayerKind::Data {
            input_type: InputType::DenseVector(size),
        },
        inputs: Vec::new(),
        size,
        shape,
        name,
    };
    Ok(LayerOutput::build(config, Vec::new()))
}

/// Declares a named input holding one integer id per sample.
pub fn integer_data_layer(
    name: impl Into<String>,
    range: usize,
) -> Result<LayerOutput, TopologyError> {
    let name = name.into();
    if range == 0 {
        return Err(TopologyError::shape(&name, "integer range must be positive"));
    }
    let config = LayerConfig {
        kind: LayerKind::Data {
            input_type: InputType::IntegerValue(range),
        },
        inputs: Vec::new(),
        size: 1,
        shape: FrameShape::flat(1),
        name,
    };
    Ok(LayerOutput::build(config, Vec::new()))
}

pub fn fc_layer(
    name: impl Into<String>,
    input: &LayerOutput,
    size: usize,
    activation: Activation,
    bias: bool,
) -> Result<LayerOutput, TopologyError> {
    let name = name.into();
    if size == 0 {
        return Err(TopologyError::shape(&name, "size must be positive"));
    }
    let config = LayerConfig {
        kind: LayerKind::Fc { activation, bias },
        inputs: vec![input.name().to_string()],
        size,
        shape: FrameShape::flat(size),
        name,
    };
    Ok(LayerOutput::build(config, vec![input.clone()]))
}

pub fn slice_layer(
    name: impl Into<String>,
    input: &LayerOutput,
    begin: usize,
    size: usize,
    axis: usize,
) -> Result<LayerOutput, TopologyError> {
    derived(
        name,
        LayerKind::Slice(SliceConfig::new(begin, size, axis)),
        vec![input.clone()],
    )
}

pub fn transpose_layer(
    name: impl Into<String>,
    input: &LayerOutput,
    order: [usize; 3],
) -> Result<LayerOutput, TopologyError> {
    derived(
        name,
        LayerKind::Transpose(TransposeConfig::new(order)),
        vec![input.clone()],
    )
}

pub fn one_hot_layer(
    name: impl Into<String>,
    input: &LayerOutput,
    classes: usize,
) -> Result<LayerOutput, TopologyError> {
    derived(name, LayerKind::OneHot { classes }, vec![input.clone()])
}

/// Forwards its last input unchanged.
pub fn gradient_stopping_layer(
    name: impl Into<String>,
    inputs: &[LayerOutput],
) -> Result<LayerOutput, TopologyError> {
    derived(name, LayerKind::GradientStopping, inputs.to_vec())
}

pub fn nearest_interp_layer(
    name: impl Into<String>,
    input: &LayerOutput,
    out_height: usize,
    out_width: usize,
) -> Result<LayerOutput, TopologyError> {
    derived(
        name,
        LayerKind::NearestInterp(NearestInterpConfig::new(out_height, out_width)),
        vec![input.clone()],
    )
}

pub fn max_id_layer(
    name: impl Into<String>,
    input: &LayerOutput,
) -> Result<LayerOutput, TopologyError> {
    derived(name, LayerKind::MaxId, vec![input.clone()])
}
