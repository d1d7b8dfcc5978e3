//! Edge-aware smoothness regularization of flow and disparity fields.
//!
//! The penalties act on finite differences of a `[batch, height, width,
//! channels]` field and are down-weighted where a reference image has strong
//! gradients, so discontinuities in the field are allowed to follow image
//! edges:
//!
//! ```text
//! w_x = exp(-k · mean_c |D_x image|)
//! w_y = exp(-k · mean_c |D_y image|)
//! ```
//!
//! Differencing shrinks the field, so weights are cropped to the extent of the
//! difference they multiply: second differences along x use `w_x[:, :, 1:]`,
//! along y `w_y[:, 1:]`.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, Tensor},
};
use flowloss_ops::{
    diff_x, diff_y, expand_channels, second_differences, SecondDifferences, Slice, TensorImageOps,
};

use crate::reconstruction::{ReconstructionLoss, ReconstructionLossConfig};

/// Edge weights `(w_x, w_y)` of a reference image.
///
/// # Shapes
///
/// - image: `[batch, height, width, channels]`
/// - output: `([batch, height, width - 1, 1], [batch, height - 1, width, 1])`
pub fn image_edge_weights<B: Backend>(
    image: Tensor<B, 4>,
    edge_constant: f64,
) -> (Tensor<B, 4>, Tensor<B, 4>) {
    let weights = |gradient: Tensor<B, 4>| {
        gradient
            .abs()
            .mean_dim(3)
            .mul_scalar(-edge_constant)
            .exp()
    };

    (weights(diff_x(image.clone())), weights(diff_y(image)))
}

/// Unweighted second-order smoothness with all four second differences,
/// `mean|dx²| + mean|dxdy| + mean|dydx| + mean|dy²|`.
///
/// # Shapes
///
/// - disparity: `[batch, height, width, channels]`, `height, width >= 3`
/// - output: `[1]`
pub fn second_order_smoothness<B: Backend>(disparity: Tensor<B, 4>) -> Tensor<B, 1> {
    let [_, height, width, _] = disparity.dims();
    assert!(
        height >= 3 && width >= 3,
        "second_order_smoothness needs height and width of at least 3, got {height}x{width}"
    );

    let SecondDifferences {
        dx2,
        dxdy,
        dydx,
        dy2,
    } = second_differences(disparity);

    dx2.abs().mean() + dxdy.abs().mean() + dydx.abs().mean() + dy2.abs().mean()
}

/// Configuration for creating an [edge-aware smoothness loss](EdgeAwareSmoothnessLoss).
#[derive(Config, Debug)]
pub struct EdgeAwareSmoothnessLossConfig {
    /// Edge sensitivity `k` of the image weights `exp(-k · |∇I|)`. Default: 10.0
    #[config(default = 10.0)]
    pub edge_constant: f64,

    /// Smoothing term ε of the first-order Charbonnier penalty. Default: 0.001
    #[config(default = 0.001)]
    pub charbonnier_epsilon: f64,

    /// Add the cross derivatives `dxdy` and `dydx` to the second-order
    /// penalties. Default: false
    #[config(default = false)]
    pub include_cross_terms: bool,
}

impl EdgeAwareSmoothnessLossConfig {
    /// Initialize [edge-aware smoothness loss](EdgeAwareSmoothnessLoss).
    pub fn init(&self) -> EdgeAwareSmoothnessLoss {
        self.assertions();
        EdgeAwareSmoothnessLoss {
            edge_constant: self.edge_constant,
            include_cross_terms: self.include_cross_terms,
            reconstruction: ReconstructionLossConfig::new()
                .with_charbonnier_epsilon(self.charbonnier_epsilon)
                .init(),
        }
    }

    fn assertions(&self) {
        assert!(
            self.edge_constant >= 0.0,
            "Edge constant for EdgeAwareSmoothnessLoss must be non-negative, got {}",
            self.edge_constant
        );
    }
}

/// First- and second-order smoothness penalties weighted by image edges.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct EdgeAwareSmoothnessLoss {
    /// Edge sensitivity of the image weights.
    pub edge_constant: f64,
    /// Whether second-order penalties include the cross derivatives.
    pub include_cross_terms: bool,
    /// Charbonnier penalty used by the first-order term.
    pub reconstruction: ReconstructionLoss,
}

impl Default for EdgeAwareSmoothnessLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for EdgeAwareSmoothnessLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("edge_constant", &self.edge_constant)
            .add("include_cross_terms", &self.include_cross_terms)
            .add("reconstruction", &self.reconstruction)
            .optional()
    }
}

impl EdgeAwareSmoothnessLoss {
    /// Create a new edge-aware smoothness loss with default configuration.
    pub fn new() -> Self {
        EdgeAwareSmoothnessLossConfig::new().init()
    }

    /// Charbonnier penalty between neighbouring flow vectors, weighted by image
    /// edges and normalized by element count. The vertical and horizontal
    /// terms are averaged.
    ///
    /// # Shapes
    ///
    /// - flow: `[batch, height, width, channels]`, `height, width >= 2`
    /// - image: `[batch, height, width, image_channels]`
    /// - output: `[1]`
    pub fn first_order_charbonnier<B: Backend>(
        &self,
        flow: Tensor<B, 4>,
        image: Tensor<B, 4>,
        beta: f64,
    ) -> Tensor<B, 1> {
        assert_aligned(&flow, &image, 2, "first_order_charbonnier");
        let [_, height, width, _] = flow.dims();
        let (weights_x, weights_y) = image_edge_weights(image, self.edge_constant);

        let vertical = self.reconstruction.masked_mean_charbonnier_error(
            flow.clone().narrow(1, 1, height - 1),
            flow.clone().narrow(1, 0, height - 1),
            weights_y,
            beta,
        );
        let horizontal = self.reconstruction.masked_mean_charbonnier_error(
            flow.clone().narrow(2, 1, width - 1),
            flow.narrow(2, 0, width - 1),
            weights_x,
            beta,
        );

        (vertical + horizontal).div_scalar(2.0)
    }

    /// First-order edge-aware smoothness, `mean|D_x d · w_x| + mean|D_y d · w_y|`.
    ///
    /// # Shapes
    ///
    /// - disparity: `[batch, height, width, channels]`, `height, width >= 2`
    /// - image: `[batch, height, width, image_channels]`
    /// - output: `[1]`
    pub fn first_order<B: Backend>(
        &self,
        disparity: Tensor<B, 4>,
        image: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        assert_aligned(&disparity, &image, 2, "first_order");
        let (weights_x, weights_y) = image_edge_weights(image, self.edge_constant);

        weighted_abs_mean(diff_x(disparity.clone()), weights_x)
            + weighted_abs_mean(diff_y(disparity), weights_y)
    }

    /// Second-order edge-aware smoothness,
    /// `(mean(β · w_x · |dx²|) + mean(β · w_y · |dy²|)) / 2`, plus the cross
    /// derivatives when `include_cross_terms` is set.
    ///
    /// # Shapes
    ///
    /// - flow: `[batch, height, width, channels]`, `height, width >= 3`
    /// - image: `[batch, height, width, image_channels]`
    /// - output: `[1]`
    pub fn second_order<B: Backend>(
        &self,
        flow: Tensor<B, 4>,
        image: Tensor<B, 4>,
        beta: f64,
    ) -> Tensor<B, 1> {
        assert_aligned(&flow, &image, 3, "second_order");
        let (weights_x, weights_y) = image_edge_weights(image, self.edge_constant);

        self.second_order_terms(second_differences(flow), weights_x, weights_y, beta)
    }

    /// Second-order edge-aware smoothness restricted by a validity mask.
    ///
    /// `|dx²|` is multiplied by `mask[:, :, 1:-1]` and `|dy²|` by
    /// `mask[:, 1:-1]`. Cross derivatives are never included.
    ///
    /// # Shapes
    ///
    /// - flow: `[batch, height, width, channels]`, `height, width >= 3`
    /// - image: `[batch, height, width, image_channels]`
    /// - mask: `[batch, height, width, 1 | channels]`
    /// - output: `[1]`
    pub fn second_order_masked<B: Backend>(
        &self,
        flow: Tensor<B, 4>,
        image: Tensor<B, 4>,
        beta: f64,
        mask: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        assert_aligned(&flow, &image, 3, "second_order_masked");
        assert_aligned(&flow, &mask, 3, "second_order_masked");
        let (weights_x, weights_y) = image_edge_weights(image, self.edge_constant);
        let SecondDifferences { dx2, dy2, .. } = second_differences(flow);
        let inner = Slice::new(Some(1), Some(-1));

        let dx2_dims = dx2.dims();
        let weights_x = expand_channels(weights_x.crop(Slice::full(), Slice::starting_at(1)), dx2_dims)
            * expand_channels(mask.clone().crop(Slice::full(), inner), dx2_dims);
        let dy2_dims = dy2.dims();
        let weights_y = expand_channels(weights_y.crop(Slice::starting_at(1), Slice::full()), dy2_dims)
            * expand_channels(mask.crop(inner, Slice::full()), dy2_dims);

        (weighted_abs_mean(dx2, weights_x) + weighted_abs_mean(dy2, weights_y))
            .mul_scalar(beta)
            .div_scalar(2.0)
    }

    /// Second-order smoothness weighted by a segmentation map instead of image
    /// edges: pixels with segmentation 1 are not penalized.
    ///
    /// The x weights are `1 - seg[:, :, 1:]` and the y weights `1 - seg[:, 1:]`,
    /// cropped like the image weights of [`second_order`](Self::second_order).
    ///
    /// # Shapes
    ///
    /// - flow: `[batch, height, width, channels]`, `height, width >= 3`
    /// - segmentation: `[batch, height, width, 1 | channels]`, values in [0, 1]
    /// - output: `[1]`
    pub fn second_order_segmentation<B: Backend>(
        &self,
        flow: Tensor<B, 4>,
        segmentation: Tensor<B, 4>,
        beta: f64,
    ) -> Tensor<B, 1> {
        assert_aligned(&flow, &segmentation, 3, "second_order_segmentation");
        let weights_x = segmentation
            .clone()
            .crop(Slice::full(), Slice::starting_at(1))
            .neg()
            .add_scalar(1.0);
        let weights_y = segmentation
            .crop(Slice::starting_at(1), Slice::full())
            .neg()
            .add_scalar(1.0);

        self.second_order_terms(second_differences(flow), weights_x, weights_y, beta)
    }

    fn second_order_terms<B: Backend>(
        &self,
        diffs: SecondDifferences<B>,
        weights_x: Tensor<B, 4>,
        weights_y: Tensor<B, 4>,
        beta: f64,
    ) -> Tensor<B, 1> {
        let SecondDifferences {
            dx2,
            dxdy,
            dydx,
            dy2,
        } = diffs;

        let mut total = weighted_abs_mean(
            dx2,
            weights_x.clone().crop(Slice::full(), Slice::starting_at(1)),
        ) + weighted_abs_mean(
            dy2,
            weights_y.clone().crop(Slice::starting_at(1), Slice::full()),
        );

        if self.include_cross_terms {
            total = total
                + weighted_abs_mean(dxdy, weights_x.crop(Slice::starting_at(1), Slice::full()))
                + weighted_abs_mean(dydx, weights_y.crop(Slice::full(), Slice::starting_at(1)));
        }

        total.mul_scalar(beta).div_scalar(2.0)
    }
}

/// `mean(|field| · weight)`, with a one-channel weight broadcast.
pub(crate) fn weighted_abs_mean<B: Backend>(field: Tensor<B, 4>, weight: Tensor<B, 4>) -> Tensor<B, 1> {
    let weight = expand_channels(weight, field.dims());
    (field.abs() * weight).mean()
}

pub(crate) fn assert_aligned<B: Backend>(
    field: &Tensor<B, 4>,
    reference: &Tensor<B, 4>,
    min_extent: usize,
    operation: &str,
) {
    let field_dims = field.dims();
    let reference_dims = reference.dims();
    assert!(
        field_dims[..3] == reference_dims[..3],
        "{operation}: reference of shape {reference_dims:?} is not aligned with field of shape {field_dims:?}"
    );
    assert!(
        field_dims[1] >= min_extent && field_dims[2] >= min_extent,
        "{operation} needs height and width of at least {min_extent}, got {}x{}",
        field_dims[1],
        field_dims[2]
    );
}
