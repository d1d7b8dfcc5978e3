//! Symmetric (mirror-with-edge) padding.

use burn::prelude::*;

use crate::{HEIGHT_AXIS, WIDTH_AXIS};

/// Pad height and width of a `[batch, height, width, channels]` tensor by
/// mirroring, with the edge pixel repeated.
///
/// Padding the row `[a, b, c]` by 2 gives `[b, a, a, b, c, c, b]`.
///
/// # Panics
///
/// If `pad` exceeds the height or width of the tensor.
pub fn pad_symmetric<B: Backend>(tensor: Tensor<B, 4>, pad: usize) -> Tensor<B, 4> {
    if pad == 0 {
        return tensor;
    }

    let [_, height, width, _] = tensor.dims();
    assert!(
        pad <= height && pad <= width,
        "Symmetric padding of {pad} exceeds spatial size {height}x{width}"
    );

    let tensor = mirror_axis(tensor, HEIGHT_AXIS, pad);
    mirror_axis(tensor, WIDTH_AXIS, pad)
}

fn mirror_axis<B: Backend>(tensor: Tensor<B, 4>, axis: usize, pad: usize) -> Tensor<B, 4> {
    let len = tensor.dims()[axis];
    let mut parts = Vec::with_capacity(2 * pad + 1);

    for index in (0..pad).rev() {
        parts.push(tensor.clone().narrow(axis, index, 1));
    }
    parts.push(tensor.clone());
    for index in (len - pad..len).rev() {
        parts.push(tensor.clone().narrow(axis, index, 1));
    }

    Tensor::cat(parts, axis)
}
