//! Inference sessions over a gradient machine.
//!
//! An [`Inference`] owns a machine whose value buffers were loaded from [`Parameters`]. Each run
//! groups samples into batches, feeds them through [`GradientMachine::forward_test`] and yields
//! the output rows:
//! 1. [`Inference::iter_infer`] lazily yields the rows of each batch.
//! 2. [`Inference::iter_infer_field`] projects every row onto the requested [`Field`]s.
//! 3. [`Inference::infer`] drains the projection into an [`InferResult`].
//!
//! A run keeps the machine started from its creation until its input is exhausted, it fails, or
//! it is dropped, and then finishes it exactly once. [`Inference::spawn`] moves the same loop to a
//! worker thread that can be cancelled through its [`JobHandle`].
//!
//! [`Parameters`]: crate::parameters::Parameters
//! [`GradientMachine::forward_test`]: crate::engine::GradientMachine::forward_test
//! [`Field`]: crate::field::Field
mod core;
mod error;
mod guard;
mod iter;
mod job;
mod result;
mod streaming;

#[cfg(test)]
mod tests;

pub use self::core::{Inference, infer};
pub use error::InferenceError;
pub use iter::{FieldIter, InferIter};
pub use job::JobHandle;
pub use result::{FieldColumn, InferResult};
pub use streaming::CancelToken;
