//! SSIM (Structural Similarity Index) dissimilarity.
//!
//! Local statistics are taken over a square box window (average pooling with
//! stride 1 and no padding), so the output is `window_size - 1` pixels smaller
//! than the input in each spatial dimension. The per-pixel dissimilarity is:
//!
//! ```text
//! SSIM = (2*μx*μy + C₁)(2*σxy + C₂) / ((μx² + μy² + C₁)(σx² + σy² + C₂))
//! D    = clip((1 - SSIM) / 2, 0, 1)
//! ```

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    nn::{
        loss::Reduction,
        pool::{AvgPool2d, AvgPool2dConfig},
        PaddingConfig2d,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for creating an [SSIM loss](SsimLoss).
#[derive(Config, Debug)]
pub struct SsimLossConfig {
    /// Side of the box window for local statistics. Default: 3
    #[config(default = 3)]
    pub window_size: usize,

    /// First stability constant (luminance). Default: 0.01²
    #[config(default = 0.0001)]
    pub c1: f64,

    /// Second stability constant (contrast). Default: 0.03²
    #[config(default = 0.0009)]
    pub c2: f64,
}

impl SsimLossConfig {
    /// Initialize [SSIM loss](SsimLoss).
    pub fn init(&self) -> SsimLoss {
        self.assertions();

        SsimLoss {
            window_size: self.window_size,
            c1: self.c1,
            c2: self.c2,
        }
    }

    fn assertions(&self) {
        assert!(
            self.window_size > 0,
            "Window size for SsimLoss must be positive, got {}",
            self.window_size
        );
        assert!(
            self.c1 > 0.0,
            "C1 for SsimLoss must be positive, got {}",
            self.c1
        );
        assert!(
            self.c2 > 0.0,
            "C2 for SsimLoss must be positive, got {}",
            self.c2
        );
    }
}

/// SSIM dissimilarity between two images.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct SsimLoss {
    /// Side of the box window.
    pub window_size: usize,
    /// First stability constant (luminance).
    pub c1: f64,
    /// Second stability constant (contrast).
    pub c2: f64,
}

impl Default for SsimLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for SsimLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("window_size", &self.window_size)
            .add("c1", &self.c1)
            .add("c2", &self.c2)
            .optional()
    }
}

impl SsimLoss {
    /// Create a new SSIM loss with default configuration.
    pub fn new() -> Self {
        SsimLossConfig::new().init()
    }

    /// Compute the reduced dissimilarity.
    ///
    /// # Shapes
    ///
    /// - x: `[batch, height, width, channels]`
    /// - y: `[batch, height, width, channels]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        x: Tensor<B, 4>,
        y: Tensor<B, 4>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let map = self.forward_map(x, y);
        match reduction {
            Reduction::Mean | Reduction::Auto => map.mean(),
            Reduction::Sum => map.sum(),
        }
    }

    /// Compute the per-pixel dissimilarity map, clipped to [0, 1].
    ///
    /// Inputs are expected in a consistent intensity range, typically [0, 1],
    /// which the stability constants assume.
    ///
    /// # Shapes
    ///
    /// - x: `[batch, height, width, channels]`, `height, width >= window_size`
    /// - y: `[batch, height, width, channels]`
    /// - output: `[batch, height - window_size + 1, width - window_size + 1, channels]`
    pub fn forward_map<B: Backend>(&self, x: Tensor<B, 4>, y: Tensor<B, 4>) -> Tensor<B, 4> {
        self.assertions(&x, &y);

        let avg_pool = self.box_filter();

        // Pooling runs on [B, C, H, W]
        let x = x.permute([0, 3, 1, 2]);
        let y = y.permute([0, 3, 1, 2]);

        let mu_x = avg_pool.forward(x.clone());
        let mu_y = avg_pool.forward(y.clone());
        let mu_x_sq = mu_x.clone().powi_scalar(2);
        let mu_y_sq = mu_y.clone().powi_scalar(2);
        let mu_xy = mu_x * mu_y;

        let sigma_x = avg_pool.forward(x.clone().powi_scalar(2)) - mu_x_sq.clone();
        let sigma_y = avg_pool.forward(y.clone().powi_scalar(2)) - mu_y_sq.clone();
        let sigma_xy = avg_pool.forward(x * y) - mu_xy.clone();

        let ssim_n = mu_xy.mul_scalar(2.0).add_scalar(self.c1)
            * sigma_xy.mul_scalar(2.0).add_scalar(self.c2);
        let ssim_d =
            (mu_x_sq + mu_y_sq).add_scalar(self.c1) * (sigma_x + sigma_y).add_scalar(self.c2);
        let ssim = ssim_n / ssim_d;

        ssim.neg()
            .add_scalar(1.0)
            .div_scalar(2.0)
            .clamp(0.0, 1.0)
            .permute([0, 2, 3, 1])
    }

    fn box_filter(&self) -> AvgPool2d {
        AvgPool2dConfig::new([self.window_size, self.window_size])
            .with_strides([1, 1])
            .with_padding(PaddingConfig2d::Valid)
            .init()
    }

    fn assertions<B: Backend>(&self, x: &Tensor<B, 4>, y: &Tensor<B, 4>) {
        let x_dims = x.dims();
        let y_dims = y.dims();
        assert_eq!(
            x_dims, y_dims,
            "Shape of x ({x_dims:?}) must match y ({y_dims:?})"
        );
        assert!(
            x_dims[1] >= self.window_size && x_dims[2] >= self.window_size,
            "SSIM window of {} does not fit images of shape {x_dims:?}",
            self.window_size
        );
    }
}
