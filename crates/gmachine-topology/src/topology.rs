use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data_type::InputType;
use crate::layer::{
    LayerConfig, LayerKind, LayerOutput, ParameterConfig, infer_shape, layer_parameters,
};
use crate::shape::FrameShape;
use crate::TopologyError;

/// Serialized network description handed to a gradient machine.
///
/// Layers are stored so that every layer appears after all of its inputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub layers: Vec<LayerConfig>,
    pub input_layer_names: Vec<String>,
    pub output_layer_names: Vec<String>,
    pub parameters: Vec<ParameterConfig>,
}

impl ModelConfig {
    pub fn layer(&self, name: &str) -> Option<&LayerConfig> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    pub fn to_json(&self) -> Result<String, TopologyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a serialized description and checks it is well formed.
    pub fn from_json(json: &str) -> Result<Self, TopologyError> {
        let config: ModelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks name uniqueness, input ordering and declared input/output names, then that
    /// every stored shape and parameter agrees with what the layers imply.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.output_layer_names.is_empty() {
            return Err(TopologyError::NoOutputs);
        }
        let mut seen: HashMap<&str, &LayerConfig> = HashMap::new();
        let mut parameters = Vec::new();
        for layer in &self.layers {
            let inputs = layer
                .inputs
                .iter()
                .map(|input| {
                    seen.get(input.as_str())
                        .copied()
                        .ok_or_else(|| TopologyError::UnknownInput {
                            layer: layer.name.clone(),
                            input: input.clone(),
                        })
                })
                .collect::<Result<Vec<&LayerConfig>, TopologyError>>()?;
            if seen.insert(layer.name.as_str(), layer).is_some() {
                return Err(TopologyError::DuplicateLayer(layer.name.clone()));
            }
            check_layer(layer, &inputs)?;
            let input_sizes: Vec<usize> = inputs.iter().map(|input| input.size).collect();
            parameters.extend(layer_parameters(layer, &input_sizes));
        }
        for name in self.input_layer_names.iter().chain(&self.output_layer_names) {
            if !seen.contains_key(name.as_str()) {
                return Err(TopologyError::UnknownInput {
                    layer: "<model>".to_string(),
                    input: name.clone(),
                });
            }
        }
        if parameters != self.parameters {
            return Err(TopologyError::ParameterMismatch {
                expected: parameters,
                actual: self.parameters.clone(),
            });
        }
        Ok(())
    }

    /// Data types of the input layers, in declaration order.
    pub fn data_types(&self) -> Vec<(String, InputType)> {
        self.input_layer_names
            .iter()
            .filter_map(|name| match self.layer(name).map(|l| &l.kind) {
                Some(LayerKind::Data { input_type }) => Some((name.clone(), *input_type)),
                _ => None,
            })
            .collect()
    }
}

/// A network rooted at one or more output layers.
#[derive(Clone, Debug)]
pub struct Topology {
    outputs: Vec<LayerOutput>,
    config: ModelConfig,
}

impl Topology {
    pub fn new(outputs: impl IntoIterator<Item = LayerOutput>) -> Result<Self, TopologyError> {
        let outputs: Vec<LayerOutput> = outputs.into_iter().collect();
        if outputs.is_empty() {
            return Err(TopologyError::NoOutputs);
        }

        let mut visited: HashMap<String, LayerOutput> = HashMap::new();
        let mut ordered: Vec<LayerOutput> = Vec::new();
        for output in &outputs {
            visit(output, &mut visited, &mut ordered)?;
        }

        let sizes: HashMap<&str, usize> = ordered.iter().map(|l| (l.name(), l.size())).collect();
        let mut parameters = Vec::new();
        for layer in &ordered {
            let input_sizes: Vec<usize> = layer
                .config()
                .inputs
                .iter()
                .filter_map(|input| sizes.get(input.as_str()).copied())
                .collect();
            parameters.extend(layer_parameters(layer.config(), &input_sizes));
        }

        let config = ModelConfig {
            input_layer_names: ordered
                .iter()
                .filter(|l| matches!(l.config().kind, LayerKind::Data { .. }))
                .map(|l| l.name().to_string())
                .collect(),
            output_layer_names: outputs.iter().map(|o| o.name().to_string()).collect(),
            layers: ordered.iter().map(|l| l.config().clone()).collect(),
            parameters,
        };
        log::debug!(
            "Built topology with {} layer(s), outputs {:?}",
            config.layers.len(),
            config.output_layer_names
        );

        Ok(Self { outputs, config })
    }

    /// The serializable description of this network.
    pub fn proto(&self) -> &ModelConfig {
        &self.config
    }

    pub fn into_proto(self) -> ModelConfig {
        self.config
    }

    pub fn outputs(&self) -> &[LayerOutput] {
        &self.outputs
    }

    pub fn data_types(&self) -> Vec<(String, InputType)> {
        self.config.data_types()
    }

    pub fn to_json(&self) -> Result<String, TopologyError> {
        self.config.to_json()
    }
}

/// Recomputes the frame of a stored layer from its inputs and compares it with the stored one.
fn check_layer(layer: &LayerConfig, inputs: &[&LayerConfig]) -> Result<(), TopologyError> {
    let expected = match &layer.kind {
        LayerKind::Data { input_type } => {
            if !inputs.is_empty() {
                return Err(TopologyError::InputCount {
                    layer: layer.name.clone(),
                    expected: "0".to_string(),
                    actual: inputs.len(),
                });
            }
            if layer.size != input_type.width() {
                return Err(TopologyError::shape(
                    &layer.name,
                    format!("size {} does not match {input_type} input", layer.size),
                ));
            }
            if layer.shape.size() != layer.size {
                return Err(TopologyError::shape(
                    &layer.name,
                    format!("frame {} does not hold {} values", layer.shape, layer.size),
                ));
            }
            return Ok(());
        }
        LayerKind::Fc { .. } => {
            if inputs.len() != 1 {
                return Err(TopologyError::InputCount {
                    layer: layer.name.clone(),
                    expected: "1".to_string(),
                    actual: inputs.len(),
                });
            }
            FrameShape::flat(layer.size)
        }
        kind => {
            let frames: Vec<FrameShape> = inputs.iter().map(|input| input.shape).collect();
            infer_shape(&layer.name, kind, &frames)?
        }
    };
    if layer.shape != expected || layer.size != expected.size() {
        return Err(TopologyError::shape(
            &layer.name,
            format!(
                "stored frame {} of size {} does not match the inferred frame {expected}",
                layer.shape, layer.size
            ),
        ));
    }
    Ok(())
}

fn visit(
    layer: &LayerOutput,
    visited: &mut HashMap<String, LayerOutput>,
    ordered: &mut Vec<LayerOutput>,
) -> Result<(), TopologyError> {
    if let Some(existing) = visited.get(layer.name()) {
        if existing.config() != layer.config() {
            return Err(TopologyError::DuplicateLayer(layer.name().to_string()));
        }
        return Ok(());
    }
    for parent in layer.parents() {
        visit(parent, visited, ordered)?;
    }
    visited.insert(layer.name().to_string(), layer.clone());
    ordered.push(layer.clone());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::*;
    use crate::shape::FrameShape;

    /// Single input decomposed as 100 x 3, sliced on the height axis.
    fn slice_config() -> Topology {
        let data = data_layer("input", 300, Some(100), Some(3)).unwrap();
        let slice = slice_layer("slice", &data, 0, 50, 2).unwrap();
        Topology::new([slice]).unwrap()
    }

    #[test]
    fn slice_config_reduces_only_the_sliced_axis() {
        let topology = slice_config();
        let proto = topology.proto();

        let input = proto.layer("input").unwrap();
        let slice = proto.layer("slice").unwrap();
        assert_eq!(input.shape, FrameShape::new(1, 100, 3));
        assert_eq!(slice.shape, FrameShape::new(1, 50, 3));
        assert_eq!(slice.size, 150);
        assert_eq!(proto.output_layer_names, vec!["slice".to_string()]);
        assert_eq!(proto.input_layer_names, vec!["input".to_string()]);
        assert!(proto.parameters.is_empty());
    }

    #[test]
    fn slice_config_survives_serialization() {
        let topology = slice_config();
        let json = topology.to_json().unwrap();
        let parsed = ModelConfig::from_json(&json).unwrap();
        assert_eq!(&parsed, topology.proto());
    }

    #[test]
    fn shared_layers_appear_once_before_their_consumers() {
        let data = data_layer("x", 4, None, None).unwrap();
        let hidden = fc_layer("hidden", &data, 3, Activation::Relu, true).unwrap();
        let left = fc_layer("left", &hidden, 2, Activation::Softmax, false).unwrap();
        let right = max_id_layer("right", &hidden).unwrap();

        let topology = Topology::new([left, right]).unwrap();
        let names: Vec<&str> = topology
            .proto()
            .layers
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(names, vec!["x", "hidden", "left", "right"]);
        let params: Vec<&str> = topology
            .proto()
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(params, vec!["_hidden.w0", "_hidden.wbias", "_left.w0"]);
        assert_eq!(topology.proto().parameters[2].dims, vec![3, 2]);
    }

    #[test]
    fn conflicting_layers_with_one_name_are_rejected() {
        let a = data_layer("x", 4, None, None).unwrap();
        let b = data_layer("x", 5, None, None).unwrap();
        let err = Topology::new([a, b]).unwrap_err();
        assert!(matches!(err, TopologyError::DuplicateLayer(name) if name == "x"));
    }

    #[test]
    fn data_types_follow_declaration_order() {
        let image = data_layer("image", 6, None, None).unwrap();
        let label = integer_data_layer("label", 10).unwrap();
        let stop = gradient_stopping_layer("stop", &[image, label]).unwrap();
        let topology = Topology::new([stop]).unwrap();
        assert_eq!(
            topology.data_types(),
            vec![
                ("image".to_string(), InputType::DenseVector(6)),
                ("label".to_string(), InputType::IntegerValue(10)),
            ]
        );
    }

    #[test]
    fn malformed_configs_are_rejected_on_parse() {
        let mut proto = slice_config().into_proto();
        proto.layers.reverse();
        let json = proto.to_json().unwrap();
        let err = ModelConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, TopologyError::UnknownInput { .. }));

        let err = Topology::new(Vec::new()).unwrap_err();
        assert!(matches!(err, TopologyError::NoOutputs));
    }

    fn fc_config() -> ModelConfig {
        let x = data_layer("x", 2, None, None).unwrap();
        let fc = fc_layer("fc", &x, 2, Activation::Linear, true).unwrap();
        Topology::new([fc]).unwrap().into_proto()
    }

    fn reparse(proto: &ModelConfig) -> Result<ModelConfig, TopologyError> {
        ModelConfig::from_json(&proto.to_json().unwrap())
    }

    #[test]
    fn parameters_disagreeing_with_the_layers_are_rejected_on_parse() {
        let mut proto = fc_config();
        assert!(reparse(&proto).is_ok());

        proto.parameters[0].dims = vec![3, 2];
        let err = reparse(&proto).unwrap_err();
        assert!(matches!(err, TopologyError::ParameterMismatch { .. }));

        let mut proto = fc_config();
        proto.parameters.pop();
        assert!(matches!(
            reparse(&proto),
            Err(TopologyError::ParameterMismatch { .. })
        ));
    }

    #[test]
    fn widened_data_layer_is_rejected_on_parse() {
        let label = integer_data_layer("label", 2).unwrap();
        let one_hot = one_hot_layer("one_hot", &label, 2).unwrap();
        let mut proto = Topology::new([one_hot]).unwrap().into_proto();

        let data = &mut proto.layers[0];
        data.kind = LayerKind::Data {
            input_type: InputType::DenseVector(4),
        };
        data.size = 4;
        data.shape = FrameShape::flat(4);
        let err = reparse(&proto).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidShape { layer, .. } if layer == "one_hot"));

        proto.layers[0].size = 1;
        let err = reparse(&proto).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidShape { layer, .. } if layer == "label"));
    }

    #[test]
    fn tampered_derived_layers_are_rejected_on_parse() {
        let mut proto = slice_config().into_proto();
        proto.layers[1].size = 300;
        let err = reparse(&proto).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidShape { layer, .. } if layer == "slice"));

        let data = data_layer("image", 6, Some(2), Some(3)).unwrap();
        let transposed = transpose_layer("t", &data, [2, 0, 1]).unwrap();
        let mut proto = Topology::new([transposed]).unwrap().into_proto();
        proto.layers[1].kind = LayerKind::Transpose(TransposeConfig::new([0, 0, 1]));
        let err = reparse(&proto).unwrap_err();
        assert!(matches!(err, TopologyError::TransposeOrder { .. }));
    }
}
