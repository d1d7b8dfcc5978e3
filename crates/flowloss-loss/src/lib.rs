//! Loss functions for unsupervised optical flow and depth training.
//!
//! All images and fields use the `[batch, height, width, channels]` layout.
//! Losses are stateless Burn modules built from a `Config`, and work with any
//! Burn backend.
//!
//! ## Reconstruction
//! - **[`ReconstructionLoss`]**: mean squared, L1, weighted, end-point and
//!   image-gradient errors
//! - **[`CharbonnierLoss`]**: generalized Charbonnier penalty with optional
//!   mask and truncation
//! - **[`SsimLoss`]**: per-pixel SSIM dissimilarity over a box window
//!
//! ## Regularization
//! - **[`EdgeAwareSmoothnessLoss`]**: first and second-order smoothness
//!   down-weighted at image edges
//! - **[`EdgeMapSmoothnessLoss`]**: smoothness guided by a precomputed edge map
//! - **[`second_order_smoothness`]**: unweighted second-order smoothness
//! - **[`ExplainabilityLoss`]**: cross-entropy of an explainability mask
//!   against an all-valid reference
//!
//! ## Composite objective
//! [`FlowLoss`] sums the weighted terms over a pyramid of [`FlowLossInput`]
//! levels.
//!
//! ```rust
//! use burn::{backend::NdArray, prelude::*};
//! use flowloss_loss::{FlowLossConfig, FlowLossInput};
//!
//! let device = Default::default();
//! let loss = FlowLossConfig::new().with_smoothness_weight(0.3).init();
//!
//! let image = Tensor::<NdArray, 4>::zeros([1, 8, 8, 3], &device);
//! let flow = Tensor::<NdArray, 4>::zeros([1, 8, 8, 2], &device);
//! let level = FlowLossInput::new(image.clone(), image, flow);
//!
//! let total = loss.forward(&[level]).expect("aligned pyramid");
//! assert_eq!(total.dims(), [1]);
//! ```

mod charbonnier;
mod edge_map;
mod explainability;
mod reconstruction;
mod smoothness;
mod ssim;
// Composite objective
mod flow_loss;

pub use charbonnier::{CharbonnierLoss, CharbonnierLossConfig};
pub use edge_map::{EdgeMapSmoothnessLoss, EdgeMapSmoothnessLossConfig};
pub use explainability::{
    constant_explain_mask, ExplainMaskConfig, ExplainabilityLoss, ExplainabilityLossConfig,
};
pub use flow_loss::{FlowLoss, FlowLossConfig, FlowLossError, FlowLossInput};
pub use reconstruction::{ReconstructionLoss, ReconstructionLossConfig};
pub use smoothness::{
    image_edge_weights, second_order_smoothness, EdgeAwareSmoothnessLoss,
    EdgeAwareSmoothnessLossConfig,
};
pub use ssim::{SsimLoss, SsimLossConfig};
