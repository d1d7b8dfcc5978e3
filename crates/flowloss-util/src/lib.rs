//! Feature expansion and image conversion utilities.
//!
//! - [`features`]: neighbor-difference and intensity-bin channel expansion of
//!   `[batch, height, width, channels]` images
//! - [`image`]: 8-bit and float conversions, `image` crate buffers to tensors,
//!   color histogram equalization

pub mod features;
pub mod image;

pub use features::{intensity_bins, neighbor_differences, neighbor_differences_5x5};
pub use self::image::{
    equalize_color_histogram, rgb_image_to_tensor, tensor_to_rgb_image, to_float_image,
    to_u8_image, ImageError, ImageResult,
};
