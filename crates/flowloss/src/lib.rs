//! `flowloss`: loss functions and image-gradient utilities for unsupervised
//! optical flow and depth training.
//!
//! This crate re-exports the workspace crates under one name. Everything
//! operates on `[batch, height, width, channels]` tensors and works with any
//! Burn backend.

#[doc(inline)]
pub use flowloss_loss as loss;
#[doc(inline)]
pub use flowloss_ops as ops;
#[cfg(feature = "train")]
#[doc(inline)]
pub use flowloss_train as train;
#[cfg(feature = "util")]
#[doc(inline)]
pub use flowloss_util as util;
