//! Forward finite differences on `[batch, height, width, channels]` tensors.
//!
//! Each difference is one element shorter than its input along the
//! differenced axis.

use burn::prelude::*;

use crate::{HEIGHT_AXIS, WIDTH_AXIS};

/// Horizontal forward difference: `x[:, :, 1:] - x[:, :, :-1]`.
///
/// # Shapes
///
/// - input: `[batch, height, width, channels]`, `width >= 2`
/// - output: `[batch, height, width - 1, channels]`
pub fn diff_x<B: Backend>(tensor: Tensor<B, 4>) -> Tensor<B, 4> {
    forward_difference(tensor, WIDTH_AXIS)
}

/// Vertical forward difference: `x[:, 1:] - x[:, :-1]`.
///
/// # Shapes
///
/// - input: `[batch, height, width, channels]`, `height >= 2`
/// - output: `[batch, height - 1, width, channels]`
pub fn diff_y<B: Backend>(tensor: Tensor<B, 4>) -> Tensor<B, 4> {
    forward_difference(tensor, HEIGHT_AXIS)
}

fn forward_difference<B: Backend>(tensor: Tensor<B, 4>, axis: usize) -> Tensor<B, 4> {
    let dims = tensor.dims();
    let len = dims[axis];
    assert!(
        len >= 2,
        "Forward difference along axis {axis} needs at least 2 elements, got shape {dims:?}"
    );

    tensor.clone().narrow(axis, 1, len - 1) - tensor.narrow(axis, 0, len - 1)
}

/// All four second-order differences of a field.
///
/// With `dx = diff_x(field)` and `dy = diff_y(field)`:
/// - `dx2 = diff_x(dx)`: `[b, h, w - 2, c]`
/// - `dxdy = diff_y(dx)`: `[b, h - 1, w - 1, c]`
/// - `dydx = diff_x(dy)`: `[b, h - 1, w - 1, c]`
/// - `dy2 = diff_y(dy)`: `[b, h - 2, w, c]`
#[derive(Debug, Clone)]
pub struct SecondDifferences<B: Backend> {
    pub dx2: Tensor<B, 4>,
    pub dxdy: Tensor<B, 4>,
    pub dydx: Tensor<B, 4>,
    pub dy2: Tensor<B, 4>,
}

/// Compute the second-order differences of `field`.
///
/// Requires `height >= 3` and `width >= 3`.
pub fn second_differences<B: Backend>(field: Tensor<B, 4>) -> SecondDifferences<B> {
    let dx = diff_x(field.clone());
    let dy = diff_y(field);

    SecondDifferences {
        dx2: diff_x(dx.clone()),
        dxdy: diff_y(dx),
        dydx: diff_x(dy.clone()),
        dy2: diff_y(dy),
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

    fn ramp(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        // x + 10 * y^2 sampled on a 3x3 grid
        Tensor::from_data(
            TensorData::from([[
                [[0.0], [1.0], [2.0]],
                [[10.0], [11.0], [12.0]],
                [[40.0], [41.0], [42.0]],
            ]]),
            device,
        )
    }

    #[test]
    fn diff_x_subtracts_left_neighbour() {
        let device = Default::default();
        let result = diff_x(ramp(&device));

        let expected = TensorData::from([[
            [[1.0], [1.0]],
            [[1.0], [1.0]],
            [[1.0], [1.0]],
        ]]);
        result
            .into_data()
            .assert_approx_eq::<f32>(&expected, Tolerance::default());
    }

    #[test]
    fn diff_y_subtracts_upper_neighbour() {
        let device = Default::default();
        let result = diff_y(ramp(&device));

        let expected = TensorData::from([[
            [[10.0], [10.0], [10.0]],
            [[30.0], [30.0], [30.0]],
        ]]);
        result
            .into_data()
            .assert_approx_eq::<f32>(&expected, Tolerance::default());
    }

    #[test]
    fn second_differences_of_quadratic_field() {
        let device = Default::default();
        let diffs = second_differences(ramp(&device));

        assert_eq!(diffs.dx2.dims(), [1, 3, 1, 1]);
        assert_eq!(diffs.dxdy.dims(), [1, 2, 2, 1]);
        assert_eq!(diffs.dydx.dims(), [1, 2, 2, 1]);
        assert_eq!(diffs.dy2.dims(), [1, 1, 3, 1]);

        diffs
            .dx2
            .into_data()
            .assert_approx_eq::<f32>(&TensorData::from([[[[0.0]], [[0.0]], [[0.0]]]]), Tolerance::default());
        diffs
            .dy2
            .into_data()
            .assert_approx_eq::<f32>(&TensorData::from([[[[20.0], [20.0], [20.0]]]]), Tolerance::default());
    }

    #[test]
    #[should_panic = "Forward difference along axis 2 needs at least 2 elements"]
    fn diff_x_single_column_panics() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::zeros([1, 3, 1, 1], &device);
        let _ = diff_x(tensor);
    }
}
