//! Turns raw samples into the named input matrices a forward pass expects.
use std::collections::{BTreeMap, HashMap};

use derive_more::{Deref, From};
use gmachine_topology::InputType;
use serde::{Deserialize, Serialize};

use crate::engine::{InputBatch, Matrix};

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feeding refers to '{0}', which is not an input of the network")]
    UnknownInput(String),
    #[error("Feeding does not say where input '{0}' comes from")]
    MissingInput(String),
    #[error("Input '{input}' reads field {index} but the sample only has {len} field(s)")]
    FieldIndex {
        input: String,
        index: usize,
        len: usize,
    },
    #[error("Input '{input}' expects {expected}, got {actual}")]
    TypeMismatch {
        input: String,
        expected: InputType,
        actual: &'static str,
    },
    #[error("Input '{input}' expects {expected} value(s), got {actual}")]
    Width {
        input: String,
        expected: usize,
        actual: usize,
    },
    #[error("Input '{input}' received id {value} outside 0..{range}")]
    OutOfRange {
        input: String,
        value: i64,
        range: usize,
    },
    #[error("Cannot feed an empty batch")]
    EmptyBatch,
}

/// One field of a sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleField {
    Integer(i64),
    Dense(Vec<f32>),
}

impl SampleField {
    fn kind(&self) -> &'static str {
        match self {
            SampleField::Integer(_) => "an integer",
            SampleField::Dense(_) => "a dense vector",
        }
    }
}

impl From<Vec<f32>> for SampleField {
    fn from(values: Vec<f32>) -> Self {
        SampleField::Dense(values)
    }
}

impl From<i64> for SampleField {
    fn from(value: i64) -> Self {
        SampleField::Integer(value)
    }
}

pub type Sample = Vec<SampleField>;

/// Explicit mapping from input name to the index of the sample field feeding it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Deref, From)]
#[serde(transparent)]
pub struct Feeding(BTreeMap<String, usize>);

impl<S: Into<String>> FromIterator<(S, usize)> for Feeding {
    fn from_iter<T: IntoIterator<Item = (S, usize)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(name, i)| (name.into(), i)).collect())
    }
}

#[derive(Clone, Debug)]
struct Slot {
    name: String,
    input_type: InputType,
    index: usize,
}

#[derive(Clone, Debug)]
pub struct DataFeeder {
    slots: Vec<Slot>,
}

impl DataFeeder {
    /// Without an explicit `feeding`, the i-th input reads the i-th sample field.
    pub fn new(
        data_types: &[(String, InputType)],
        feeding: Option<&Feeding>,
    ) -> Result<Self, FeedError> {
        let slots = match feeding {
            None => data_types
                .iter()
                .enumerate()
                .map(|(index, (name, input_type))| Slot {
                    name: name.clone(),
                    input_type: *input_type,
                    index,
                })
                .collect(),
            Some(feeding) => {
                if let Some(unknown) = feeding
                    .keys()
                    .find(|name| !data_types.iter().any(|(input, _)| input == *name))
                {
                    return Err(FeedError::UnknownInput(unknown.clone()));
                }
                data_types
                    .iter()
                    .map(|(name, input_type)| {
                        let index = *feeding
                            .get(name)
                            .ok_or_else(|| FeedError::MissingInput(name.clone()))?;
                        Ok(Slot {
                            name: name.clone(),
                            input_type: *input_type,
                            index,
                        })
                    })
                    .collect::<Result<Vec<_>, FeedError>>()?
            }
        };
        Ok(Self { slots })
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    pub fn feed(&self, samples: &[Sample]) -> Result<InputBatch, FeedError> {
        if samples.is_empty() {
            return Err(FeedError::EmptyBatch);
        }
        let mut inputs = HashMap::with_capacity(self.slots.len());
        for slot in &self.slots {
            let width = slot.input_type.width();
            let mut data = Vec::with_capacity(samples.len() * width);
            for sample in samples {
                let field = sample.get(slot.index).ok_or_else(|| FeedError::FieldIndex {
                    input: slot.name.clone(),
                    index: slot.index,
                    len: sample.len(),
                })?;
                slot.push(field, &mut data)?;
            }
            inputs.insert(slot.name.clone(), Matrix::new(samples.len(), width, data));
        }
        Ok(InputBatch {
            size: samples.len(),
            inputs,
        })
    }
}

impl Slot {
    fn push(&self, field: &SampleField, data: &mut Vec<f32>) -> Result<(), FeedError> {
        match (self.input_type, field) {
            (InputType::DenseVector(dim), SampleField::Dense(values)) => {
                if values.len() != dim {
                    return Err(FeedError::Width {
                        input: self.name.clone(),
                        expected: dim,
                        actual: values.len(),
                    });
                }
                data.extend_from_slice(values);
            }
            (InputType::IntegerValue(range), SampleField::Integer(value)) => {
                if *value < 0 || *value as usize >= range {
                    return Err(FeedError::OutOfRange {
                        input: self.name.clone(),
                        value: *value,
                        range,
                    });
                }
                data.push(*value as f32);
            }
            (expected, field) => {
                return Err(FeedError::TypeMismatch {
                    input: self.name.clone(),
                    expected,
                    actual: field.kind(),
                });
            }
        }
        Ok(())
    }
}
