use std::path::Path;

use gmachine_topology::InputType;
use json_patch::merge;
use serde::{Deserialize, Serialize};

use crate::batch::BatchSize;
use crate::feeder::{DataFeeder, FeedError, Feeding};
use crate::field::{Field, FieldSelection};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("At least one output field must be requested")]
    EmptyFields,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Feeding(#[from] FeedError),
}

impl ConfigError {
    pub fn is_data(&self) -> bool {
        matches!(self, ConfigError::Serialization(e) if e.is_data())
    }
}

/// Options of an inference run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferConfig {
    pub batch_size: BatchSize,
    /// Projections to return, in order.
    pub fields: FieldSelection,
    /// Where each input reads its sample field from. Declaration order when absent.
    pub feeding: Option<Feeding>,
}

impl InferConfig {
    pub fn with_batch_size(mut self, batch_size: BatchSize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_fields(mut self, fields: impl Into<FieldSelection>) -> Self {
        self.fields = fields.into();
        self
    }

    pub fn with_feeding(mut self, feeding: Feeding) -> Self {
        self.feeding = Some(feeding);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Loading inference config from {}", path.display());
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Merges a JSON override onto the defaults.
    pub fn merged_with_default(overrides: &serde_json::Value) -> Result<Self, ConfigError> {
        Self::default().merged(overrides)
    }

    /// Merges a JSON override onto this configuration.
    pub fn merged(&self, overrides: &serde_json::Value) -> Result<Self, ConfigError> {
        let mut merged = serde_json::to_value(self)?;
        merge(&mut merged, overrides);
        Ok(serde_json::from_value(merged)?)
    }

    /// Checks the feeding against the inputs of a network.
    pub fn validate(&self, data_types: &[(String, InputType)]) -> Result<(), ConfigError> {
        DataFeeder::new(data_types, self.feeding.as_ref())?;
        Ok(())
    }
}
