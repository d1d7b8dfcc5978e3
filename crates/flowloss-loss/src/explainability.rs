//! Explainability mask regularization.
//!
//! The explainability mask is a per-pixel two-class prediction ("explainable",
//! "valid"). Regularizing it towards a constant reference of all-valid pixels
//! keeps the network from masking out the whole image to zero the
//! photometric loss. The penalty is softmax cross-entropy with soft labels:
//!
//! ```text
//! Loss = mean_over_positions( -Σ_k ref_k * log_softmax(pred)_k )
//! ```

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{activation::log_softmax, backend::Backend, Tensor},
};

/// Configuration for creating an [explainability loss](ExplainabilityLoss).
#[derive(Config, Debug)]
pub struct ExplainabilityLossConfig {
    /// Number of mask classes on the last axis. Default: 2
    #[config(default = 2)]
    pub num_classes: usize,
}

impl ExplainabilityLossConfig {
    /// Initialize [explainability loss](ExplainabilityLoss).
    pub fn init(&self) -> ExplainabilityLoss {
        assert!(
            self.num_classes >= 2,
            "ExplainabilityLoss needs at least 2 classes, got {}",
            self.num_classes
        );
        ExplainabilityLoss {
            num_classes: self.num_classes,
        }
    }
}

/// Soft-label cross-entropy between explainability logits and a reference mask.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct ExplainabilityLoss {
    /// Number of mask classes on the last axis.
    pub num_classes: usize,
}

impl Default for ExplainabilityLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for ExplainabilityLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content.add("num_classes", &self.num_classes).optional()
    }
}

impl ExplainabilityLoss {
    /// Create a new explainability loss with default configuration.
    pub fn new() -> Self {
        ExplainabilityLossConfig::new().init()
    }

    /// Mean cross-entropy over all positions.
    ///
    /// # Shapes
    ///
    /// - pred: `[batch, height, width, num_classes]` logits
    /// - reference: `[batch, height, width, num_classes]` soft labels
    /// - output: `[1]`
    pub fn forward<B: Backend>(&self, pred: Tensor<B, 4>, reference: Tensor<B, 4>) -> Tensor<B, 1> {
        self.forward_no_reduction(pred, reference).mean()
    }

    /// Cross-entropy per position, flattened row major over batch, height, width.
    ///
    /// # Shapes
    ///
    /// - pred: `[batch, height, width, num_classes]` logits
    /// - reference: `[batch, height, width, num_classes]` soft labels
    /// - output: `[batch * height * width]`
    pub fn forward_no_reduction<B: Backend>(
        &self,
        pred: Tensor<B, 4>,
        reference: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        self.assertions(&pred, &reference);

        let [batch, height, width, classes] = pred.dims();
        let positions = batch * height * width;

        let log_probs = log_softmax(pred.reshape([positions, classes]), 1);
        let labels = reference.reshape([positions, classes]);

        (labels * log_probs).sum_dim(1).neg().reshape([positions])
    }

    fn assertions<B: Backend>(&self, pred: &Tensor<B, 4>, reference: &Tensor<B, 4>) {
        let pred_dims = pred.dims();
        let ref_dims = reference.dims();
        assert_eq!(
            pred_dims, ref_dims,
            "Shape of explainability logits ({pred_dims:?}) must match reference ({ref_dims:?})"
        );
        assert_eq!(
            pred_dims[3], self.num_classes,
            "Explainability logits must have {} classes on the last axis, got shape {pred_dims:?}",
            self.num_classes
        );
    }
}

/// Shape of the reference explainability mask used at each pyramid level.
#[derive(Config, Debug)]
pub struct ExplainMaskConfig {
    /// Global batch size across all replicas.
    pub batch_size: usize,
    /// Number of replicas the batch is split over. Default: 1
    #[config(default = 1)]
    pub num_replicas: usize,
    /// Full-resolution image height.
    pub image_height: usize,
    /// Full-resolution image width.
    pub image_width: usize,
}

impl ExplainMaskConfig {
    /// Reference mask at pyramid level `downscaling`.
    ///
    /// Every pixel holds `[0, 1]`, i.e. fully "valid".
    ///
    /// # Shapes
    ///
    /// - output: `[batch_size / num_replicas, image_height >> d, image_width >> d, 2]`
    pub fn reference_explain_mask<B: Backend>(
        &self,
        downscaling: u32,
        device: &B::Device,
    ) -> Tensor<B, 4> {
        assert!(
            self.num_replicas > 0,
            "ExplainMaskConfig needs at least one replica"
        );
        let scale = 2usize.pow(downscaling);
        constant_explain_mask(
            [
                self.batch_size / self.num_replicas,
                self.image_height / scale,
                self.image_width / scale,
            ],
            device,
        )
    }
}

/// All-valid two-class reference mask for the given `[batch, height, width]`.
pub fn constant_explain_mask<B: Backend>(dims: [usize; 3], device: &B::Device) -> Tensor<B, 4> {
    let [batch, height, width] = dims;
    Tensor::cat(
        vec![
            Tensor::zeros([batch, height, width, 1], device),
            Tensor::ones([batch, height, width, 1], device),
        ],
        3,
    )
}
