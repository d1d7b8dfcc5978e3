//! Image tensor operations for the Burn deep learning framework
//!
//! Burn works on channels-first images and has no symmetric padding or
//! finite-difference helpers. The losses in this workspace operate on
//! `[batch, height, width, channels]` tensors, so this crate provides those
//! operations for that layout.

use burn::prelude::*;

mod broadcast;
mod diff;
mod pad;
mod slice;

pub use broadcast::expand_channels;
pub use diff::{diff_x, diff_y, second_differences, SecondDifferences};
pub use pad::pad_symmetric;
pub use slice::{crop, Slice};

/// Axis of the height dimension in a `[batch, height, width, channels]` tensor.
pub const HEIGHT_AXIS: usize = 1;
/// Axis of the width dimension in a `[batch, height, width, channels]` tensor.
pub const WIDTH_AXIS: usize = 2;
/// Axis of the channel dimension in a `[batch, height, width, channels]` tensor.
pub const CHANNEL_AXIS: usize = 3;

/// Image operations on `[batch, height, width, channels]` tensors.
pub trait TensorImageOps<B: Backend> {
    /// Horizontal forward difference `x[:, :, 1:] - x[:, :, :-1]`.
    fn diff_x(self) -> Self;

    /// Vertical forward difference `x[:, 1:] - x[:, :-1]`.
    fn diff_y(self) -> Self;

    /// Mirror-pad height and width by `pad`, repeating the edge pixel.
    fn pad_symmetric(self, pad: usize) -> Self;

    /// Crop height and width with Python-like slices.
    fn crop(self, rows: Slice, cols: Slice) -> Self;
}

impl<B: Backend> TensorImageOps<B> for Tensor<B, 4> {
    fn diff_x(self) -> Self {
        diff_x(self)
    }

    fn diff_y(self) -> Self {
        diff_y(self)
    }

    fn pad_symmetric(self, pad: usize) -> Self {
        pad_symmetric(self, pad)
    }

    fn crop(self, rows: Slice, cols: Slice) -> Self {
        crop(self, rows, cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{ndarray::NdArray, Autodiff},
        tensor::Tensor,
    };

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_tensor_image_ops() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::random(
            [2, 5, 6, 3],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        assert_eq!(tensor.clone().diff_x().dims(), [2, 5, 5, 3]);
        assert_eq!(tensor.clone().diff_y().dims(), [2, 4, 6, 3]);
        assert_eq!(tensor.clone().pad_symmetric(2).dims(), [2, 9, 10, 3]);
        assert_eq!(
            tensor
                .crop(Slice::new(Some(1), Some(-1)), Slice::full())
                .dims(),
            [2, 3, 6, 3]
        );
    }
}
