//! Hand-engineered per-pixel features.
//!
//! Each function keeps the input image as the first channel block and appends
//! derived blocks along the channel axis, so a `[batch, height, width, C]`
//! image grows to `[batch, height, width, k * C]`.

use burn::tensor::{backend::Backend, Tensor};
use flowloss_ops::{TensorImageOps, CHANNEL_AXIS, HEIGHT_AXIS, WIDTH_AXIS};

/// Neighbor offsets into a 1-padded image: left, right, up, down, up-left,
/// up-right, down-left, down-right.
const NEIGHBORS_3X3: [(usize, usize); 8] = [
    (1, 0),
    (1, 2),
    (0, 1),
    (2, 1),
    (0, 0),
    (0, 2),
    (2, 0),
    (2, 2),
];

/// Number of intensity bins of width 0.1 over [0, 1).
const INTENSITY_BINS: usize = 10;

/// Image followed by its scaled differences to the 8 neighbors.
///
/// # Shapes
///
/// - image: `[batch, height, width, channels]`
/// - output: `[batch, height, width, 9 * channels]`
pub fn neighbor_differences<B: Backend>(image: Tensor<B, 4>, scale: f64) -> Tensor<B, 4> {
    let padded = image.clone().pad_symmetric(1);
    let [_, height, width, _] = image.dims();

    let mut blocks = Vec::with_capacity(NEIGHBORS_3X3.len() + 1);
    blocks.push(image.clone());
    for (row, col) in NEIGHBORS_3X3 {
        let neighbor = window(padded.clone(), row, col, height, width);
        blocks.push((image.clone() - neighbor).mul_scalar(scale));
    }

    Tensor::cat(blocks, CHANNEL_AXIS)
}

/// Image followed by its differences to every other pixel of the 5x5
/// neighborhood, row major.
///
/// # Shapes
///
/// - image: `[batch, height, width, channels]`, `height, width >= 2`
/// - output: `[batch, height, width, 25 * channels]`
pub fn neighbor_differences_5x5<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 4> {
    let padded = image.clone().pad_symmetric(2);
    let [_, height, width, _] = image.dims();

    let mut blocks = Vec::with_capacity(25);
    blocks.push(image.clone());
    for row in 0..5 {
        for col in 0..5 {
            if (row, col) == (2, 2) {
                continue;
            }
            blocks.push(image.clone() - window(padded.clone(), row, col, height, width));
        }
    }

    Tensor::cat(blocks, CHANNEL_AXIS)
}

/// Image followed by ten indicator blocks, block `i` set where
/// `i / 10 <= x < (i + 1) / 10`. Values outside [0, 1) fall in no bin.
///
/// # Shapes
///
/// - image: `[batch, height, width, channels]`
/// - output: `[batch, height, width, 11 * channels]`
pub fn intensity_bins<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 4> {
    let mut blocks = Vec::with_capacity(INTENSITY_BINS + 1);
    blocks.push(image.clone());
    for bin in 0..INTENSITY_BINS {
        let low = bin as f64 / INTENSITY_BINS as f64;
        let high = (bin + 1) as f64 / INTENSITY_BINS as f64;
        let above = image.clone().greater_equal_elem(low).float();
        let below = image.clone().lower_elem(high).float();
        blocks.push(above * below);
    }

    Tensor::cat(blocks, CHANNEL_AXIS)
}

fn window<B: Backend>(
    padded: Tensor<B, 4>,
    row: usize,
    col: usize,
    height: usize,
    width: usize,
) -> Tensor<B, 4> {
    padded
        .narrow(HEIGHT_AXIS, row, height)
        .narrow(WIDTH_AXIS, col, width)
}
