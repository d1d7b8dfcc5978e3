//! Conversions between 8-bit images and float tensors, and color histogram
//! equalization.
//!
//! Tensors use the `[batch, height, width, channels]` layout with float
//! intensities in [0, 1].

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use image::RgbImage;
use thiserror::Error;

/// Errors raised while moving images between buffers and tensors.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("batch size mismatch: expected 1, got {actual}")]
    InvalidBatchSize { actual: usize },

    #[error("invalid channel count: expected 3, got {actual}")]
    InvalidChannels { actual: usize },

    #[error("failed to convert tensor to data: {reason}")]
    TensorConversion { reason: String },

    #[error("failed to create image buffer of {width}x{height}")]
    BufferCreation { width: u32, height: u32 },
}

/// Result type alias for [`ImageError`].
pub type ImageResult<T> = Result<T, ImageError>;

/// 8-bit intensities to floats in [0, 1].
pub fn to_float_image<B: Backend>(image: Tensor<B, 4, Int>) -> Tensor<B, 4> {
    image.float().div_scalar(255.0)
}

/// Floats in [0, 1] to 8-bit intensities, scaled by 255.5 and truncated.
/// Out-of-range values saturate at 0 and 255.
pub fn to_u8_image<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 4, Int> {
    image.mul_scalar(255.5).clamp(0.0, 255.0).floor().int()
}

/// `[1, height, width, 3]` float tensor of an RGB image.
pub fn rgb_image_to_tensor<B: Backend>(image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = image.dimensions();
    let data = TensorData::new(image.as_raw().clone(), [1, height as usize, width as usize, 3])
        .convert::<B::IntElem>();

    to_float_image(Tensor::<B, 4, Int>::from_data(data, device))
}

/// RGB image of a `[1, height, width, 3]` float tensor in [0, 1].
pub fn tensor_to_rgb_image<B: Backend>(tensor: Tensor<B, 4>) -> ImageResult<RgbImage> {
    let [batch, height, width, channels] = tensor.dims();
    if batch != 1 {
        return Err(ImageError::InvalidBatchSize { actual: batch });
    }
    if channels != 3 {
        return Err(ImageError::InvalidChannels { actual: channels });
    }

    let pixels = to_u8_image(tensor)
        .into_data()
        .convert::<u8>()
        .to_vec::<u8>()
        .map_err(|err| ImageError::TensorConversion {
            reason: format!("{err:?}"),
        })?;

    let (width, height) = (width as u32, height as u32);
    RgbImage::from_raw(width, height, pixels).ok_or(ImageError::BufferCreation { width, height })
}

// Fixed-point YCrCb coefficients with 14 fractional bits.
const SHIFT: u32 = 14;
const HALF: i32 = 1 << (SHIFT - 1);
const DELTA: i32 = 128;
const Y_R: i32 = 4899;
const Y_G: i32 = 9617;
const Y_B: i32 = 1868;
const CR_SCALE: i32 = 11682;
const CB_SCALE: i32 = 9241;
const R_CR: i32 = 22987;
const G_CR: i32 = -11698;
const G_CB: i32 = -5636;
const B_CB: i32 = 29049;

fn descale(value: i32) -> i32 {
    (value + HALF) >> SHIFT
}

fn saturate(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

fn to_ycrcb([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let y = descale(r * Y_R + g * Y_G + b * Y_B);
    let cr = descale((r - y) * CR_SCALE + (DELTA << SHIFT));
    let cb = descale((b - y) * CB_SCALE + (DELTA << SHIFT));
    [saturate(y), saturate(cr), saturate(cb)]
}

fn to_rgb([y, cr, cb]: [u8; 3]) -> [u8; 3] {
    let (y, cr, cb) = (i32::from(y), i32::from(cr) - DELTA, i32::from(cb) - DELTA);
    [
        saturate(y + descale(cr * R_CR)),
        saturate(y + descale(cr * G_CR + cb * G_CB)),
        saturate(y + descale(cb * B_CB)),
    ]
}

/// Lookup table spreading the cumulative histogram of `values` over [0, 255].
///
/// The darkest present level maps to 0. A single-level image maps to itself.
fn equalization_table(values: impl Iterator<Item = u8>) -> [u8; 256] {
    let mut histogram = [0usize; 256];
    let mut total = 0usize;
    for value in values {
        histogram[usize::from(value)] += 1;
        total += 1;
    }

    let mut table = [0u8; 256];
    let Some(first) = histogram.iter().position(|&count| count > 0) else {
        return table;
    };
    if histogram[first] == total {
        table.fill(first as u8);
        return table;
    }

    // Single precision, rounded half to even, as OpenCV's equalizeHist
    let scale = 255.0f32 / (total - histogram[first]) as f32;
    let mut cumulative = 0usize;
    for level in first + 1..256 {
        cumulative += histogram[level];
        table[level] = (cumulative as f32 * scale).round_ties_even().clamp(0.0, 255.0) as u8;
    }
    table
}

/// Equalize the luma histogram of an RGB image, keeping its chroma.
pub fn equalize_color_histogram(image: &RgbImage) -> RgbImage {
    let mut ycrcb = image.clone();
    for pixel in ycrcb.pixels_mut() {
        pixel.0 = to_ycrcb(pixel.0);
    }

    let table = equalization_table(ycrcb.pixels().map(|pixel| pixel.0[0]));

    for pixel in ycrcb.pixels_mut() {
        let [y, cr, cb] = pixel.0;
        pixel.0 = to_rgb([table[usize::from(y)], cr, cb]);
    }
    ycrcb
}
