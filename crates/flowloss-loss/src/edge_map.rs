//! Smoothness regularization guided by an explicit edge map.
//!
//! Unlike [`EdgeAwareSmoothnessLoss`](crate::EdgeAwareSmoothnessLoss), the
//! weights come from a precomputed edge map (1 on edges, 0 elsewhere):
//! `w = exp(-α · |edge|)`.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, Tensor},
};
use flowloss_ops::{diff_x, diff_y, expand_channels, second_differences, Slice, TensorImageOps};

use crate::smoothness::{assert_aligned, weighted_abs_mean};

/// Configuration for creating an [edge map smoothness loss](EdgeMapSmoothnessLoss).
#[derive(Config, Debug)]
pub struct EdgeMapSmoothnessLossConfig {
    /// Edge attenuation α of the weights `exp(-α · |edge|)`. Default: 10.0
    #[config(default = 10.0)]
    pub alpha: f64,

    /// Upper clip of the weighted second differences. Default: 10.0
    #[config(default = 10.0)]
    pub clip_max: f64,
}

impl EdgeMapSmoothnessLossConfig {
    /// Initialize [edge map smoothness loss](EdgeMapSmoothnessLoss).
    pub fn init(&self) -> EdgeMapSmoothnessLoss {
        self.assertions();
        EdgeMapSmoothnessLoss {
            alpha: self.alpha,
            clip_max: self.clip_max,
        }
    }

    fn assertions(&self) {
        assert!(
            self.alpha >= 0.0,
            "Alpha for EdgeMapSmoothnessLoss must be non-negative, got {}",
            self.alpha
        );
        assert!(
            self.clip_max > 0.0,
            "Clip max for EdgeMapSmoothnessLoss must be positive, got {}",
            self.clip_max
        );
    }
}

/// Disparity smoothness weighted by an explicit edge map.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct EdgeMapSmoothnessLoss {
    /// Edge attenuation α.
    pub alpha: f64,
    /// Upper clip of the weighted second differences.
    pub clip_max: f64,
}

impl Default for EdgeMapSmoothnessLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for EdgeMapSmoothnessLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("alpha", &self.alpha)
            .add("clip_max", &self.clip_max)
            .optional()
    }
}

impl EdgeMapSmoothnessLoss {
    /// Create a new edge map smoothness loss with default configuration.
    pub fn new() -> Self {
        EdgeMapSmoothnessLossConfig::new().init()
    }

    /// First-order penalty, `mean|D_x d · w[:, :, 1:]| + mean|D_y d · w[:, 1:]|`.
    ///
    /// # Shapes
    ///
    /// - disparity: `[batch, height, width, channels]`, `height, width >= 2`
    /// - edge: `[batch, height, width, 1 | channels]`
    /// - output: `[1]`
    pub fn forward_first_order<B: Backend>(
        &self,
        disparity: Tensor<B, 4>,
        edge: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        assert_aligned(&disparity, &edge, 2, "forward_first_order");
        let weights = self.edge_weights(edge);

        weighted_abs_mean(
            diff_x(disparity.clone()),
            weights.clone().crop(Slice::full(), Slice::starting_at(1)),
        ) + weighted_abs_mean(
            diff_y(disparity),
            weights.crop(Slice::starting_at(1), Slice::full()),
        )
    }

    /// Clipped second-order penalty,
    /// `mean(clip(dx² · w[:, :, 1:-1], 0, clip_max)) + mean(clip(dy² · w[:, 1:-1], 0, clip_max))`.
    ///
    /// The signed second difference is clipped, so negative curvature is not
    /// penalized.
    ///
    /// # Shapes
    ///
    /// - disparity: `[batch, height, width, channels]`, `height, width >= 3`
    /// - edge: `[batch, height, width, 1 | channels]`
    /// - output: `[1]`
    pub fn forward_second_order_clipped<B: Backend>(
        &self,
        disparity: Tensor<B, 4>,
        edge: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        assert_aligned(&disparity, &edge, 3, "forward_second_order_clipped");
        let weights = self.edge_weights(edge);
        let diffs = second_differences(disparity);
        let inner = Slice::new(Some(1), Some(-1));

        let clipped = |field: Tensor<B, 4>, weight: Tensor<B, 4>| {
            let weight = expand_channels(weight, field.dims());
            (field * weight).clamp(0.0, self.clip_max).mean()
        };

        clipped(diffs.dx2, weights.clone().crop(Slice::full(), inner))
            + clipped(diffs.dy2, weights.crop(inner, Slice::full()))
    }

    fn edge_weights<B: Backend>(&self, edge: Tensor<B, 4>) -> Tensor<B, 4> {
        edge.abs().mul_scalar(-self.alpha).exp()
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{cast::ToElement, TensorData};

    use super::*;
    use crate::tests::TestBackend;

    fn quadratic(scale: f64, device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[
                [[0.0], [1.0], [4.0]],
                [[0.0], [1.0], [4.0]],
                [[0.0], [1.0], [4.0]],
            ]]),
            device,
        )
        .mul_scalar(scale)
    }

    fn assert_close(actual: Tensor<TestBackend, 1>, expected: f64) {
        let actual = actual.into_scalar().to_f64();
        assert!(
            (actual - expected).abs() < 1e-5,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn first_order_without_edges_is_mean_gradient() {
        let device = Default::default();
        let loss = EdgeMapSmoothnessLoss::new();
        let disparity = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[0.0], [1.0]], [[0.0], [1.0]]]]),
            &device,
        );
        let edge = Tensor::zeros([1, 2, 2, 1], &device);

        assert_close(loss.forward_first_order(disparity, edge), 1.0);
    }

    #[test]
    fn first_order_on_edges_is_attenuated() {
        let device = Default::default();
        let loss = EdgeMapSmoothnessLoss::new();
        let disparity = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[0.0], [1.0]], [[0.0], [1.0]]]]),
            &device,
        );
        let edge = Tensor::ones([1, 2, 2, 1], &device);

        assert_close(loss.forward_first_order(disparity, edge), (-10.0_f64).exp());
    }

    #[test]
    fn second_order_clipped_penalizes_positive_curvature() {
        let device = Default::default();
        let loss = EdgeMapSmoothnessLoss::new();
        let edge = Tensor::<TestBackend, 4>::zeros([1, 3, 3, 1], &device);

        assert_close(
            loss.forward_second_order_clipped(quadratic(1.0, &device), edge.clone()),
            2.0,
        );
        assert_close(
            loss.forward_second_order_clipped(quadratic(-1.0, &device), edge.clone()),
            0.0,
        );
        assert_close(
            loss.forward_second_order_clipped(quadratic(10.0, &device), edge),
            10.0,
        );
    }

    #[test]
    #[should_panic = "Clip max for EdgeMapSmoothnessLoss must be positive"]
    fn edge_map_config_zero_clip_panics() {
        let _loss = EdgeMapSmoothnessLossConfig::new().with_clip_max(0.0).init();
    }

    #[test]
    #[should_panic = "forward_first_order: reference of shape"]
    fn edge_map_misaligned_edge_panics() {
        let device = Default::default();
        let loss = EdgeMapSmoothnessLoss::new();
        let disparity = Tensor::<TestBackend, 4>::zeros([1, 3, 3, 1], &device);
        let edge = Tensor::zeros([1, 3, 2, 1], &device);

        let _ = loss.forward_first_order(disparity, edge);
    }

    #[test]
    fn edge_map_display_shows_parameters() {
        let loss = EdgeMapSmoothnessLoss::new();

        assert_eq!(
            format!("{loss}"),
            "EdgeMapSmoothnessLoss {alpha: 10, clip_max: 10}"
        );
    }
}
