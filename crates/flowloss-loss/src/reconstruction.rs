//! Reconstruction (photometric) error functions.
//!
//! Two normalization policies coexist here and callers rely on both:
//!
//! - **element count**: every `mean_*` function, including the masked and
//!   weighted ones, divides the summed error by the number of elements of the
//!   prediction. A mask therefore scales the loss down instead of restricting
//!   the average to the unmasked pixels.
//! - **mask sum**: [`ReconstructionLoss::weighted_mean_squared_error`] divides
//!   each sample's weighted error by that sample's total weight.
//!
//! All tensors are laid out `[batch, height, width, channels]`. Masks and
//! weights may have a single channel, which is broadcast.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, Tensor},
};
use flowloss_ops::{diff_x, diff_y, expand_channels, Slice, TensorImageOps};

/// Configuration for creating a [reconstruction loss](ReconstructionLoss).
#[derive(Config, Debug)]
pub struct ReconstructionLossConfig {
    /// Smoothing term ε of the Charbonnier penalty `sqrt(x² + ε²)`. Default: 0.001
    #[config(default = 0.001)]
    pub charbonnier_epsilon: f64,
}

impl ReconstructionLossConfig {
    /// Initialize [reconstruction loss](ReconstructionLoss).
    pub fn init(&self) -> ReconstructionLoss {
        self.assertions();
        ReconstructionLoss {
            charbonnier_epsilon: self.charbonnier_epsilon,
        }
    }

    fn assertions(&self) {
        assert!(
            self.charbonnier_epsilon > 0.0,
            "Charbonnier epsilon for ReconstructionLoss must be positive, got {}",
            self.charbonnier_epsilon
        );
    }
}

/// Pixel-wise reconstruction errors between a ground truth and a prediction.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct ReconstructionLoss {
    /// Smoothing term of the Charbonnier penalty.
    pub charbonnier_epsilon: f64,
}

impl Default for ReconstructionLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for ReconstructionLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("charbonnier_epsilon", &self.charbonnier_epsilon)
            .optional()
    }
}

impl ReconstructionLoss {
    /// Create a new reconstruction loss with default configuration.
    pub fn new() -> Self {
        ReconstructionLossConfig::new().init()
    }

    /// Mean squared error, `Σ (truth - pred)² / N`.
    ///
    /// # Shapes
    ///
    /// - truth: `[...dims]`
    /// - pred: `[...dims]` (same shape as truth)
    /// - output: `[1]`
    pub fn mean_squared_error<const D: usize, B: Backend>(
        &self,
        truth: Tensor<B, D>,
        pred: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        assert_same_shape(&truth, &pred);
        let count = pred.shape().num_elements() as f64;

        (truth - pred).powi_scalar(2).sum().div_scalar(count)
    }

    /// Mean absolute error, `Σ |truth - pred| / N`.
    ///
    /// # Shapes
    ///
    /// - truth: `[...dims]`
    /// - pred: `[...dims]` (same shape as truth)
    /// - output: `[1]`
    pub fn mean_l1_error<const D: usize, B: Backend>(
        &self,
        truth: Tensor<B, D>,
        pred: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        assert_same_shape(&truth, &pred);
        let count = pred.shape().num_elements() as f64;

        (truth - pred).abs().sum().div_scalar(count)
    }

    /// Weighted absolute error normalized by element count,
    /// `Σ |truth - pred| · weight / N`.
    ///
    /// # Shapes
    ///
    /// - truth, pred: `[batch, height, width, channels]`
    /// - weight: `[batch, height, width, 1 | channels]`
    /// - output: `[1]`
    pub fn weighted_mean_l1_error<B: Backend>(
        &self,
        truth: Tensor<B, 4>,
        pred: Tensor<B, 4>,
        weight: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        assert_same_shape(&truth, &pred);
        let dims = pred.dims();
        let weight = expand_channels(weight, dims);

        ((truth - pred).abs() * weight)
            .sum()
            .div_scalar(element_count(dims))
    }

    /// Weighted squared error normalized by the weight sum of each sample.
    ///
    /// For every sample and channel, `Σ_hw weight · (truth - pred)² / Σ_hw weight`,
    /// then averaged over batch and channels. A sample whose weights are all
    /// zero produces a non-finite result.
    ///
    /// # Shapes
    ///
    /// - truth, pred: `[batch, height, width, channels]`
    /// - weight: `[batch, height, width, 1 | channels]`
    /// - output: `[1]`
    pub fn weighted_mean_squared_error<B: Backend>(
        &self,
        truth: Tensor<B, 4>,
        pred: Tensor<B, 4>,
        weight: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        assert_same_shape(&truth, &pred);
        let weight = expand_channels(weight, pred.dims());

        // [B, H, W, C] -> [B, 1, 1, C]
        let weighted_error = (weight.clone() * (truth - pred).powi_scalar(2))
            .sum_dim(2)
            .sum_dim(1);
        let weight_sum = weight.sum_dim(2).sum_dim(1);

        (weighted_error / weight_sum).mean()
    }

    /// Charbonnier error, `Σ sqrt((beta · (truth - pred))² + ε²) / N`.
    ///
    /// # Shapes
    ///
    /// - truth, pred: `[batch, height, width, channels]`
    /// - output: `[1]`
    pub fn mean_charbonnier_error<B: Backend>(
        &self,
        truth: Tensor<B, 4>,
        pred: Tensor<B, 4>,
        beta: f64,
    ) -> Tensor<B, 1> {
        assert_same_shape(&truth, &pred);
        let dims = pred.dims();

        self.charbonnier_penalty(truth - pred, beta)
            .sum()
            .div_scalar(element_count(dims))
    }

    /// Masked Charbonnier error normalized by element count,
    /// `Σ sqrt((beta · (truth - pred))² + ε²) · mask / N`.
    ///
    /// # Shapes
    ///
    /// - truth, pred: `[batch, height, width, channels]`
    /// - mask: `[batch, height, width, 1 | channels]`
    /// - output: `[1]`
    pub fn masked_mean_charbonnier_error<B: Backend>(
        &self,
        truth: Tensor<B, 4>,
        pred: Tensor<B, 4>,
        mask: Tensor<B, 4>,
        beta: f64,
    ) -> Tensor<B, 1> {
        assert_same_shape(&truth, &pred);
        let dims = pred.dims();
        let mask = expand_channels(mask, dims);

        (self.charbonnier_penalty(truth - pred, beta) * mask)
            .sum()
            .div_scalar(element_count(dims))
    }

    /// Average end-point error between two flow fields: the mean over all
    /// pixels of the Euclidean norm of their difference across channels.
    ///
    /// # Shapes
    ///
    /// - flow_a, flow_b: `[batch, height, width, channels]`
    /// - output: `[1]`
    pub fn end_point_error<B: Backend>(
        &self,
        flow_a: Tensor<B, 4>,
        flow_b: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        assert_same_shape(&flow_a, &flow_b);

        (flow_a - flow_b).powi_scalar(2).sum_dim(3).sqrt().mean()
    }

    /// Charbonnier error between the image gradients of truth and prediction.
    ///
    /// The vertical and horizontal first differences are compared separately,
    /// each masked by the mask rows (resp. columns) from index 1 on, and the two
    /// errors are averaged.
    ///
    /// # Shapes
    ///
    /// - truth, pred: `[batch, height, width, channels]`, `height, width >= 2`
    /// - mask: `[batch, height, width, 1 | channels]`
    /// - output: `[1]`
    pub fn image_gradient_error<B: Backend>(
        &self,
        truth: Tensor<B, 4>,
        pred: Tensor<B, 4>,
        mask: Tensor<B, 4>,
        beta: f64,
    ) -> Tensor<B, 1> {
        assert_same_shape(&truth, &pred);
        let [_, height, width, _] = pred.dims();
        assert!(
            height >= 2 && width >= 2,
            "image_gradient_error needs height and width of at least 2, got {height}x{width}"
        );

        let vertical = self.masked_mean_charbonnier_error(
            diff_y(truth.clone()),
            diff_y(pred.clone()),
            mask.clone().crop(Slice::starting_at(1), Slice::full()),
            beta,
        );
        let horizontal = self.masked_mean_charbonnier_error(
            diff_x(truth),
            diff_x(pred),
            mask.crop(Slice::full(), Slice::starting_at(1)),
            beta,
        );

        (vertical + horizontal).div_scalar(2.0)
    }

    fn charbonnier_penalty<B: Backend>(&self, residual: Tensor<B, 4>, beta: f64) -> Tensor<B, 4> {
        let epsilon = self.charbonnier_epsilon;
        residual
            .mul_scalar(beta)
            .powi_scalar(2)
            .add_scalar(epsilon * epsilon)
            .sqrt()
    }
}

pub(crate) fn element_count(dims: [usize; 4]) -> f64 {
    dims.iter().product::<usize>() as f64
}

fn assert_same_shape<const D: usize, B: Backend>(truth: &Tensor<B, D>, pred: &Tensor<B, D>) {
    let truth_dims = truth.dims();
    let pred_dims = pred.dims();
    assert_eq!(
        truth_dims, pred_dims,
        "Shape of ground truth ({truth_dims:?}) must match prediction ({pred_dims:?})"
    );
}
