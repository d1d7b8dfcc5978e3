//! Composite multi-scale objective for unsupervised flow and depth training.
//!
//! Each pyramid level contributes a photometric Charbonnier term, an SSIM
//! term, an edge-aware second-order smoothness term whose weight halves with
//! every level, and an explainability regularizer when the network predicts
//! a mask:
//!
//! ```text
//! L = Σ_s  w_p · Charbonnier(warped_s - target_s, mask_s)
//!        + w_ssim · mean(SSIM(warped_s, target_s))
//!        + w_smooth / 2^s · Smoothness(flow_s, target_s)
//!        + w_exp · CrossEntropy(logits_s, reference_s)
//! ```

use std::collections::HashMap;

use burn::{
    config::Config,
    module::Module,
    nn::loss::Reduction,
    tensor::{activation::softmax, backend::Backend, cast::ToElement, Tensor},
};
use thiserror::Error;

use crate::{
    charbonnier::{CharbonnierLoss, CharbonnierLossConfig},
    explainability::{constant_explain_mask, ExplainabilityLoss},
    smoothness::{EdgeAwareSmoothnessLoss, EdgeAwareSmoothnessLossConfig},
    ssim::{SsimLoss, SsimLossConfig},
};

/// Errors that can occur while assembling the composite flow loss.
#[derive(Debug, Error)]
pub enum FlowLossError {
    /// No pyramid levels were provided
    #[error("inputs cannot be empty - at least one pyramid level is required")]
    EmptyInputs,

    /// Tensors of one pyramid level do not line up
    #[error("incompatible shapes at level {level}: {tensor} has shape {actual:?}, expected {expected:?}")]
    IncompatibleShapes {
        level: usize,
        tensor: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A pyramid level is smaller than the SSIM window or the second-order stencil
    #[error("level {level} of {height}x{width} is below the minimum extent of {min_extent}")]
    LevelTooSmall {
        level: usize,
        min_extent: usize,
        height: usize,
        width: usize,
    },

    /// Configuration file could not be read or parsed
    #[error("failed to load loss configuration: {0}")]
    Config(String),
}

/// Configuration for the composite [flow loss](FlowLoss).
#[derive(Config, Debug)]
pub struct FlowLossConfig {
    /// Weight of the photometric Charbonnier term
    #[config(default = 0.15)]
    pub photometric_weight: f64,

    /// Weight of the SSIM term
    #[config(default = 0.85)]
    pub ssim_weight: f64,

    /// Weight of the smoothness term at full resolution, halved per level
    #[config(default = 0.5)]
    pub smoothness_weight: f64,

    /// Weight of the explainability regularizer
    #[config(default = 0.2)]
    pub explainability_weight: f64,

    /// Photometric penalty
    #[config(default = "CharbonnierLossConfig::new()")]
    pub charbonnier: CharbonnierLossConfig,

    /// Structural similarity
    #[config(default = "SsimLossConfig::new()")]
    pub ssim: SsimLossConfig,

    /// Flow regularization
    #[config(default = "EdgeAwareSmoothnessLossConfig::new()")]
    pub smoothness: EdgeAwareSmoothnessLossConfig,
}

impl FlowLossConfig {
    /// Initialize the composite [flow loss](FlowLoss).
    pub fn init(&self) -> FlowLoss {
        self.assertions();
        FlowLoss {
            photometric_weight: self.photometric_weight,
            ssim_weight: self.ssim_weight,
            smoothness_weight: self.smoothness_weight,
            explainability_weight: self.explainability_weight,
            charbonnier: self.charbonnier.init(),
            ssim: self.ssim.init(),
            smoothness: self.smoothness.init(),
            explainability: ExplainabilityLoss::new(),
        }
    }

    /// Load a configuration saved with [`Config::save`].
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, FlowLossError> {
        Self::load(path).map_err(|err| FlowLossError::Config(err.to_string()))
    }

    fn assertions(&self) {
        for (name, weight) in [
            ("photometric", self.photometric_weight),
            ("ssim", self.ssim_weight),
            ("smoothness", self.smoothness_weight),
            ("explainability", self.explainability_weight),
        ] {
            assert!(
                weight >= 0.0,
                "Weight of the {name} term for FlowLoss must be non-negative, got {weight}"
            );
        }
    }
}

/// One pyramid level of the composite loss.
#[derive(Debug, Clone)]
pub struct FlowLossInput<B: Backend> {
    /// Source image warped by the predicted flow, `[batch, height, width, channels]`
    pub warped: Tensor<B, 4>,
    /// Target image, `[batch, height, width, channels]`
    pub target: Tensor<B, 4>,
    /// Predicted flow, `[batch, height, width, flow_channels]`
    pub flow: Tensor<B, 4>,
    /// Explainability logits, `[batch, height, width, 2]`
    pub explain_logits: Option<Tensor<B, 4>>,
}

impl<B: Backend> FlowLossInput<B> {
    /// Level without an explainability mask.
    pub const fn new(warped: Tensor<B, 4>, target: Tensor<B, 4>, flow: Tensor<B, 4>) -> Self {
        Self {
            warped,
            target,
            flow,
            explain_logits: None,
        }
    }

    /// Attach explainability logits to this level.
    pub fn with_explain_logits(mut self, logits: Tensor<B, 4>) -> Self {
        self.explain_logits = Some(logits);
        self
    }

    fn validate(&self, level: usize, min_extent: usize) -> Result<(), FlowLossError> {
        let target = self.target.dims();
        let mismatch = |tensor: &'static str, expected: &[usize], actual: &[usize]| {
            FlowLossError::IncompatibleShapes {
                level,
                tensor,
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            }
        };

        let warped = self.warped.dims();
        if warped != target {
            return Err(mismatch("warped", &target[..], &warped[..]));
        }

        let flow = self.flow.dims();
        if flow[..3] != target[..3] {
            return Err(mismatch("flow", &target[..3], &flow[..3]));
        }

        if let Some(logits) = &self.explain_logits {
            let logits = logits.dims();
            let expected = [target[0], target[1], target[2], 2];
            if logits != expected {
                return Err(mismatch("explain_logits", &expected[..], &logits[..]));
            }
        }

        let [_, height, width, _] = target;
        if height < min_extent || width < min_extent {
            return Err(FlowLossError::LevelTooSmall {
                level,
                min_extent,
                height,
                width,
            });
        }

        Ok(())
    }
}

/// Weighted terms of one pyramid level.
struct LevelTerms<B: Backend> {
    photometric: Tensor<B, 1>,
    ssim: Tensor<B, 1>,
    smoothness: Tensor<B, 1>,
    explainability: Option<Tensor<B, 1>>,
}

impl<B: Backend> LevelTerms<B> {
    fn total(&self) -> Tensor<B, 1> {
        let total = self.photometric.clone() + self.ssim.clone() + self.smoothness.clone();
        match &self.explainability {
            Some(explainability) => total + explainability.clone(),
            None => total,
        }
    }
}

/// Composite multi-scale photometric and smoothness objective.
#[derive(Module, Clone, Debug)]
pub struct FlowLoss {
    photometric_weight: f64,
    ssim_weight: f64,
    smoothness_weight: f64,
    explainability_weight: f64,
    charbonnier: CharbonnierLoss,
    ssim: SsimLoss,
    smoothness: EdgeAwareSmoothnessLoss,
    explainability: ExplainabilityLoss,
}

impl Default for FlowLoss {
    fn default() -> Self {
        FlowLossConfig::new().init()
    }
}

impl FlowLoss {
    /// Total loss over all pyramid levels, finest first.
    ///
    /// # Errors
    ///
    /// Returns [`FlowLossError::EmptyInputs`] for an empty pyramid,
    /// [`FlowLossError::IncompatibleShapes`] when the tensors of a level do
    /// not line up and [`FlowLossError::LevelTooSmall`] when a level is
    /// smaller than the SSIM window or 3x3.
    pub fn forward<B: Backend>(
        &self,
        inputs: &[FlowLossInput<B>],
    ) -> Result<Tensor<B, 1>, FlowLossError> {
        let levels = self.levels(inputs)?;

        levels
            .iter()
            .map(LevelTerms::total)
            .reduce(|acc, level| acc + level)
            .ok_or(FlowLossError::EmptyInputs)
    }

    /// Total loss and the weighted value of every term, summed over levels.
    ///
    /// Keys are `photometric`, `ssim`, `smoothness`, `explainability` and
    /// `total`.
    ///
    /// # Errors
    ///
    /// Same as [`FlowLoss::forward`].
    pub fn forward_detailed<B: Backend>(
        &self,
        inputs: &[FlowLossInput<B>],
    ) -> Result<(Tensor<B, 1>, HashMap<String, f64>), FlowLossError> {
        let levels = self.levels(inputs)?;

        let mut terms = HashMap::new();
        let mut record = |name: &str, value: &Tensor<B, 1>| {
            *terms.entry(name.to_string()).or_insert(0.0) += value.clone().into_scalar().to_f64();
        };

        let mut total = None;
        for level in &levels {
            record("photometric", &level.photometric);
            record("ssim", &level.ssim);
            record("smoothness", &level.smoothness);
            if let Some(explainability) = &level.explainability {
                record("explainability", explainability);
            }
            total = Some(match total {
                Some(acc) => acc + level.total(),
                None => level.total(),
            });
        }
        let total = total.ok_or(FlowLossError::EmptyInputs)?;

        terms.entry("explainability".to_string()).or_insert(0.0);
        terms.insert("total".to_string(), total.clone().into_scalar().to_f64());

        Ok((total, terms))
    }

    fn levels<B: Backend>(
        &self,
        inputs: &[FlowLossInput<B>],
    ) -> Result<Vec<LevelTerms<B>>, FlowLossError> {
        if inputs.is_empty() {
            return Err(FlowLossError::EmptyInputs);
        }
        // SSIM needs a full window, second differences a 3x3 stencil
        let min_extent = self.ssim.window_size.max(3);
        for (level, input) in inputs.iter().enumerate() {
            input.validate(level, min_extent)?;
        }

        tracing::debug!(levels = inputs.len(), "assembling flow loss");

        Ok(inputs
            .iter()
            .enumerate()
            .map(|(level, input)| self.level_terms(level, input))
            .collect())
    }

    fn level_terms<B: Backend>(&self, level: usize, input: &FlowLossInput<B>) -> LevelTerms<B> {
        let [batch, height, width, _] = input.target.dims();
        tracing::trace!(level, batch, height, width, "computing flow loss level");

        // Probability of the "valid" class
        let valid_mask = input
            .explain_logits
            .clone()
            .map(|logits| softmax(logits, 3).narrow(3, 1, 1));

        let residual = input.warped.clone() - input.target.clone();
        let photometric = self
            .charbonnier
            .forward(residual, valid_mask)
            .mul_scalar(self.photometric_weight);

        let ssim = self
            .ssim
            .forward(input.warped.clone(), input.target.clone(), Reduction::Mean)
            .mul_scalar(self.ssim_weight);

        let smoothness_weight = self.smoothness_weight / 2f64.powi(level as i32);
        let smoothness = self
            .smoothness
            .second_order(input.flow.clone(), input.target.clone(), 1.0)
            .mul_scalar(smoothness_weight);

        let explainability = input.explain_logits.clone().map(|logits| {
            let reference = constant_explain_mask([batch, height, width], &logits.device());
            self.explainability
                .forward(logits, reference)
                .mul_scalar(self.explainability_weight)
        });

        LevelTerms {
            photometric,
            ssim,
            smoothness,
            explainability,
        }
    }
}
