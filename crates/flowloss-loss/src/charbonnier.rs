//! Generalized Charbonnier loss.
//!
//! A robust, differentiable approximation of the L1 penalty applied to a
//! residual tensor `x`:
//!
//! ```text
//! ρ(x) = ((β·x)² + ε²)^α
//! Loss = Σ min(mask · ρ(x), truncate) / (B·H·W·C)
//! ```
//!
//! The sum is always divided by the element count of `x`, never by the mask
//! sum. For `x = 0` each element contributes `ε^(2α)`, so the loss of a
//! perfect prediction is small but not zero.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, Tensor},
};
use flowloss_ops::expand_channels;

use crate::reconstruction::element_count;

/// Configuration for creating a [Charbonnier loss](CharbonnierLoss).
#[derive(Config, Debug)]
pub struct CharbonnierLossConfig {
    /// Exponent α. Default: 0.45
    #[config(default = 0.45)]
    pub alpha: f64,

    /// Residual scale β. Default: 1.0
    #[config(default = 1.0)]
    pub beta: f64,

    /// Smoothing term ε. Default: 0.001
    #[config(default = 0.001)]
    pub epsilon: f64,

    /// Upper bound on each penalized element. Default: no truncation
    #[config(default = "None")]
    pub truncate: Option<f64>,
}

impl CharbonnierLossConfig {
    /// Initialize [Charbonnier loss](CharbonnierLoss).
    pub fn init(&self) -> CharbonnierLoss {
        self.assertions();
        CharbonnierLoss {
            alpha: self.alpha,
            beta: self.beta,
            epsilon: self.epsilon,
            truncate: self.truncate.unwrap_or(f64::INFINITY),
        }
    }

    fn assertions(&self) {
        assert!(
            self.alpha > 0.0,
            "Alpha for CharbonnierLoss must be positive, got {}",
            self.alpha
        );
        assert!(
            self.epsilon > 0.0,
            "Epsilon for CharbonnierLoss must be positive, got {}",
            self.epsilon
        );
        if let Some(truncate) = self.truncate {
            assert!(
                truncate > 0.0,
                "Truncation for CharbonnierLoss must be positive, got {truncate}"
            );
        }
    }
}

/// Generalized Charbonnier loss over a residual tensor.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct CharbonnierLoss {
    /// Exponent α.
    pub alpha: f64,
    /// Residual scale β.
    pub beta: f64,
    /// Smoothing term ε.
    pub epsilon: f64,
    /// Upper bound on each penalized element, infinite when disabled.
    pub truncate: f64,
}

impl Default for CharbonnierLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for CharbonnierLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("alpha", &self.alpha)
            .add("beta", &self.beta)
            .add("epsilon", &self.epsilon)
            .add("truncate", &self.truncate)
            .optional()
    }
}

impl CharbonnierLoss {
    /// Create a new Charbonnier loss with default configuration.
    pub fn new() -> Self {
        CharbonnierLossConfig::new().init()
    }

    /// Compute the loss, normalized by the element count of `x`.
    ///
    /// # Shapes
    ///
    /// - x: `[batch, height, width, channels]`
    /// - mask: `[batch, height, width, 1 | channels]`, entries 0 or 1
    /// - output: `[1]`
    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>, mask: Option<Tensor<B, 4>>) -> Tensor<B, 1> {
        let normalization = element_count(x.dims());

        self.forward_no_reduction(x, mask)
            .sum()
            .div_scalar(normalization)
    }

    /// Compute the masked and truncated penalty of every element.
    ///
    /// # Shapes
    ///
    /// - x: `[batch, height, width, channels]`
    /// - mask: `[batch, height, width, 1 | channels]`
    /// - output: `[batch, height, width, channels]`
    pub fn forward_no_reduction<B: Backend>(
        &self,
        x: Tensor<B, 4>,
        mask: Option<Tensor<B, 4>>,
    ) -> Tensor<B, 4> {
        let dims = x.dims();
        let mut error = x
            .mul_scalar(self.beta)
            .powi_scalar(2)
            .add_scalar(self.epsilon * self.epsilon)
            .powf_scalar(self.alpha);

        if let Some(mask) = mask {
            error = error * expand_channels(mask, dims);
        }

        if self.truncate.is_finite() {
            error = error.clamp_max(self.truncate);
        }

        error
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{cast::ToElement, ops::FloatElem, Distribution, TensorData, Tolerance};

    use super::*;
    use crate::tests::TestBackend;

    type FT = FloatElem<TestBackend>;

    #[test]
    fn charbonnier_of_zero_residual_is_epsilon_power() {
        let device = Default::default();
        let loss = CharbonnierLoss::new();
        let x = Tensor::<TestBackend, 4>::zeros([2, 3, 3, 2], &device);

        let value = loss.forward(x, None).into_scalar().to_f64();

        let expected = 0.001_f64.powf(2.0 * 0.45);
        assert!(
            (value - expected).abs() < 1e-6,
            "expected {expected}, got {value}"
        );
    }

    #[test]
    fn charbonnier_matches_closed_form() {
        let device = Default::default();
        let loss = CharbonnierLossConfig::new()
            .with_alpha(0.5)
            .with_beta(2.0)
            .with_epsilon(0.0001)
            .init();
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[1.5], [-0.5]]]]),
            &device,
        );

        // α = 0.5 turns the penalty into ≈ |β·x|: (3 + 1) / 2
        let value = loss.forward(x, None).into_scalar().to_f64();

        assert!((value - 2.0).abs() < 1e-3, "expected 2.0, got {value}");
    }

    #[test]
    fn charbonnier_masks_and_normalizes_by_element_count() {
        let device = Default::default();
        let loss = CharbonnierLoss::new();
        let x = Tensor::<TestBackend, 4>::random([1, 4, 4, 3], Distribution::Normal(0.0, 1.0), &device);

        let zero = loss
            .forward(x.clone(), Some(Tensor::zeros([1, 4, 4, 1], &device)))
            .into_scalar()
            .to_f64();
        let full = loss
            .forward(x.clone(), Some(Tensor::ones([1, 4, 4, 3], &device)))
            .into_scalar()
            .to_f64();
        let plain = loss.forward(x, None).into_scalar().to_f64();

        assert_eq!(zero, 0.0);
        assert!((full - plain).abs() < 1e-6, "{full} != {plain}");
    }

    #[test]
    fn charbonnier_truncates_each_element() {
        let device = Default::default();
        let loss = CharbonnierLossConfig::new().with_truncate(Some(0.5)).init();
        let x = Tensor::<TestBackend, 4>::full([1, 2, 2, 1], 100.0, &device);

        let result = loss.forward(x, None);

        result
            .into_data()
            .assert_approx_eq::<FT>(&TensorData::from([0.5]), Tolerance::default());
    }

    #[test]
    fn charbonnier_is_non_negative() {
        let device = Default::default();
        let loss = CharbonnierLoss::new();
        let x = Tensor::<TestBackend, 4>::random([2, 5, 5, 2], Distribution::Normal(0.0, 10.0), &device);

        let penalties = loss.forward_no_reduction(x, None);

        assert_eq!(penalties.dims(), [2, 5, 5, 2]);
        let min = penalties.min().into_scalar().to_f64();
        assert!(min > 0.0, "penalties must be positive, got minimum {min}");
    }

    #[test]
    #[should_panic = "Epsilon for CharbonnierLoss must be positive"]
    fn charbonnier_config_zero_epsilon_panics() {
        let _loss = CharbonnierLossConfig::new().with_epsilon(0.0).init();
    }

    #[test]
    #[should_panic = "Truncation for CharbonnierLoss must be positive"]
    fn charbonnier_config_negative_truncation_panics() {
        let _loss = CharbonnierLossConfig::new()
            .with_truncate(Some(-1.0))
            .init();
    }

    #[test]
    fn charbonnier_display_shows_parameters() {
        let loss = CharbonnierLossConfig::new().with_alpha(0.5).init();

        let display_str = format!("{loss}");
        assert!(display_str.contains("CharbonnierLoss"));
        assert!(display_str.contains("alpha: 0.5"));
        assert!(display_str.contains("epsilon: 0.001"));
    }
}
