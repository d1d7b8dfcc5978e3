//! Channel broadcasting for masks and weight maps.

use burn::prelude::*;

use crate::CHANNEL_AXIS;

/// Broadcast a one-channel mask to `dims`, or pass a full-channel one through.
///
/// # Panics
///
/// If the batch, height or width of `mask` differ from `dims`, or its channel
/// count is neither 1 nor `dims[3]`.
pub fn expand_channels<B: Backend>(mask: Tensor<B, 4>, dims: [usize; 4]) -> Tensor<B, 4> {
    let mask_dims = mask.dims();
    let channels = dims[CHANNEL_AXIS];
    assert!(
        mask_dims[..CHANNEL_AXIS] == dims[..CHANNEL_AXIS]
            && (mask_dims[CHANNEL_AXIS] == 1 || mask_dims[CHANNEL_AXIS] == channels),
        "Mask of shape {mask_dims:?} cannot be broadcast to {dims:?}: spatial dims must match and channels must be 1 or {channels}"
    );

    if mask_dims[CHANNEL_AXIS] == channels {
        mask
    } else {
        mask.repeat_dim(CHANNEL_AXIS, channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{ndarray::NdArray, Autodiff},
        tensor::{TensorData, Tolerance},
    };

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn expand_channels_repeats_single_channel() {
        let device = Default::default();
        let mask =
            Tensor::<TestBackend, 4>::from_data(TensorData::from([[[[0.0], [1.0]]]]), &device);

        let result = expand_channels(mask, [1, 1, 2, 3]);

        result.into_data().assert_approx_eq::<f32>(
            &TensorData::from([[[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]]]),
            Tolerance::default(),
        );
    }

    #[test]
    #[should_panic = "cannot be broadcast"]
    fn expand_channels_mismatched_spatial_dims_panics() {
        let device = Default::default();
        let mask = Tensor::<TestBackend, 4>::ones([1, 2, 2, 1], &device);
        let _ = expand_channels(mask, [1, 3, 2, 1]);
    }
}
