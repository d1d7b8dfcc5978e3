//! # Tensor Slicing Helper
//!
//! Provides a `Slice` struct to facilitate tensor slicing with Python-like semantics,
//! including support for negative indices.

use burn::prelude::*;
use core::ops::Range;

use crate::{HEIGHT_AXIS, WIDTH_AXIS};

/// A helper struct for defining a slice with optional start and end points.
///
/// This struct can be converted into a `Range<usize>` for a given dimension
/// length, correctly handling negative indices relative to that length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    start: Option<isize>,
    end: Option<isize>,
}

impl Slice {
    /// Creates a new `Slice`.
    pub const fn new(start: Option<isize>, end: Option<isize>) -> Self {
        Self { start, end }
    }

    /// The whole dimension, `[:]`.
    pub const fn full() -> Self {
        Self::new(None, None)
    }

    /// Everything from `start` on, `[start:]`.
    pub const fn starting_at(start: isize) -> Self {
        Self::new(Some(start), None)
    }

    /// Converts the `Slice` into a `Range<usize>` for a given dimension length.
    ///
    /// Negative indices are interpreted as offsets from the end of the dimension.
    pub fn to_range(&self, len: usize) -> Range<usize> {
        let len_isize = len as isize;

        let start = match self.start {
            Some(s) if s < 0 => (len_isize + s).max(0),
            Some(s) => s.max(0).min(len_isize),
            None => 0,
        } as usize;

        let end = match self.end {
            Some(e) if e < 0 => (len_isize + e).max(0),
            Some(e) => e.max(0).min(len_isize),
            None => len_isize,
        } as usize;

        start..end.max(start)
    }

    /// Calculates the length of the slice for a given dimension length.
    pub fn slice_length(&self, len: usize) -> usize {
        let range = self.to_range(len);
        range.end.saturating_sub(range.start)
    }
}

/// Crop the height and width of a `[batch, height, width, channels]` tensor.
///
/// # Panics
///
/// If either slice selects nothing.
pub fn crop<B: Backend>(tensor: Tensor<B, 4>, rows: Slice, cols: Slice) -> Tensor<B, 4> {
    let dims = tensor.dims();
    let rows = rows.to_range(dims[HEIGHT_AXIS]);
    let cols = cols.to_range(dims[WIDTH_AXIS]);
    assert!(
        !rows.is_empty() && !cols.is_empty(),
        "Crop rows {rows:?} and cols {cols:?} of tensor with shape {dims:?} is empty"
    );

    tensor
        .narrow(HEIGHT_AXIS, rows.start, rows.len())
        .narrow(WIDTH_AXIS, cols.start, cols.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{ndarray::NdArray, Autodiff},
        tensor::{Tensor, TensorData, Tolerance},
    };

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_slice() {
        let slice = Slice::new(Some(-2), Some(-1));
        let range = slice.to_range(5);
        assert_eq!(range, 3..4);
    }

    #[test]
    fn test_slice_length() {
        let slice = Slice::new(Some(1), Some(4));
        assert_eq!(slice.slice_length(10), 3);
        assert_eq!(Slice::new(Some(4), Some(1)).slice_length(10), 0);
    }

    #[test]
    fn test_crop_inner_window() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[
                [[1.0], [2.0], [3.0]],
                [[4.0], [5.0], [6.0]],
                [[7.0], [8.0], [9.0]],
            ]]),
            &device,
        );

        let result = crop(tensor, Slice::new(Some(1), Some(-1)), Slice::starting_at(1));

        result.into_data().assert_approx_eq::<f32>(
            &TensorData::from([[[[5.0], [6.0]]]]),
            Tolerance::default(),
        );
    }

    #[test]
    #[should_panic = "is empty"]
    fn test_crop_empty_panics() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 1], &device);
        let _ = crop(tensor, Slice::new(Some(1), Some(-1)), Slice::full());
    }
}
