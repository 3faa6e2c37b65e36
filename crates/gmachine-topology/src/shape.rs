use serde::{Deserialize, Serialize};

use crate::TopologyError;

/// Number of axes of a batched frame: batch, channel, height, width.
pub const BATCHED_AXES: usize = 4;

/// Layout of a single sample, stored row-major as `channels x height x width`.
///
/// Within a batch the axes are numbered `0 = batch`, `1 = channel`,
/// `2 = height` and `3 = width`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_new::new)]
pub struct FrameShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl FrameShape {
    /// A flat frame of `size` values.
    pub fn flat(size: usize) -> Self {
        Self::new(size, 1, 1)
    }

    /// Derives the frame of a layer from its declared size and optional
    /// spatial dimensions. The channel count is whatever is left once
    /// `height * width` has been divided out of `size`.
    pub fn from_size(
        layer: &str,
        size: usize,
        height: Option<usize>,
        width: Option<usize>,
    ) -> Result<Self, TopologyError> {
        if size == 0 {
            return Err(TopologyError::shape(layer, "size must be positive"));
        }
        let (height, width) = match (height, width) {
            (None, None) => return Ok(Self::flat(size)),
            (Some(h), Some(w)) => (h, w),
            (Some(h), None) => (h, 1),
            (None, Some(w)) => (1, w),
        };
        if height == 0 || width == 0 {
            return Err(TopologyError::shape(
                layer,
                "height and width must be positive",
            ));
        }
        if size % (height * width) != 0 {
            return Err(TopologyError::shape(
                layer,
                format!(
                    "size {size} is not divisible by height {height} x width {width}, \
                     channel number should be an integer"
                ),
            ));
        }
        Ok(Self::new(size / (height * width), height, width))
    }

    pub fn size(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    pub fn from_dims(dims: [usize; 3]) -> Self {
        Self::new(dims[0], dims[1], dims[2])
    }

    /// Dimensions of a batch of `batch_size` frames.
    pub fn batched(&self, batch_size: usize) -> [usize; BATCHED_AXES] {
        [batch_size, self.channels, self.height, self.width]
    }

    /// Extent of a non-batch axis (`1..=3`).
    pub fn extent(&self, axis: usize) -> Option<usize> {
        match axis {
            1..=3 => Some(self.dims()[axis - 1]),
            _ => None,
        }
    }

    /// Same frame with `axis` (`1..=3`) resized to `extent`.
    pub fn with_extent(&self, axis: usize, extent: usize) -> Option<Self> {
        let mut dims = self.dims();
        *dims.get_mut(axis.checked_sub(1)?)? = extent;
        Some(Self::from_dims(dims))
    }

    /// Frame with its axes reordered numpy-style: output axis `i` is input
    /// axis `order[i]`.
    pub fn permuted(&self, order: [usize; 3]) -> Self {
        let dims = self.dims();
        Self::from_dims([dims[order[0]], dims[order[1]], dims[order[2]]])
    }
}

impl std::fmt::Display for FrameShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.height, self.width)
    }
}
