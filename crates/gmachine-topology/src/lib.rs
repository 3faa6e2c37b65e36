//! Network descriptions for a gradient machine.
//!
//! Layers are declared through builder functions ([`data_layer`], [`slice_layer`], ...) that
//! infer each layer's output frame as they go. A [`Topology`] gathers everything reachable from
//! the requested outputs and exposes it as a serializable [`ModelConfig`].
mod data_type;
mod error;
mod layer;
mod shape;
mod topology;

pub use data_type::*;
pub use error::TopologyError;
pub use layer::*;
pub use shape::{BATCHED_AXES, FrameShape};
pub use topology::{ModelConfig, Topology};
