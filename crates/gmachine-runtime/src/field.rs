use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::engine::OutputRow;

/// Which projection of an output row to return.
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
pub enum Field {
    /// Raw output values.
    #[default]
    Value,
    /// Discretized labels, produced by max-id outputs.
    Id,
    /// Probabilities of the chosen labels, produced by max-id outputs.
    Prob,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Values(Vec<f32>),
    Ids(Vec<i64>),
}

impl OutputRow {
    /// The requested projection, or `None` when the network does not produce it.
    pub fn project(&self, field: Field) -> Option<FieldValue> {
        match field {
            Field::Value => Some(FieldValue::Values(self.value.clone())),
            Field::Id => self.id.clone().map(FieldValue::Ids),
            Field::Prob => self.prob.clone().map(FieldValue::Values),
        }
    }
}

/// A non-empty, ordered list of requested fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, derive_more::Deref)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct FieldSelection(Vec<Field>);

impl FieldSelection {
    pub fn new(fields: Vec<Field>) -> Result<Self, ConfigError> {
        if fields.is_empty() {
            return Err(ConfigError::EmptyFields);
        }
        Ok(Self(fields))
    }
}

impl Default for FieldSelection {
    fn default() -> Self {
        Self(vec![Field::default()])
    }
}

impl From<Field> for FieldSelection {
    fn from(field: Field) -> Self {
        Self(vec![field])
    }
}

impl TryFrom<Vec<Field>> for FieldSelection {
    type Error = ConfigError;

    fn try_from(fields: Vec<Field>) -> Result<Self, Self::Error> {
        Self::new(fields)
    }
}

impl From<FieldSelection> for Vec<Field> {
    fn from(selection: FieldSelection) -> Self {
        selection.0
    }
}
