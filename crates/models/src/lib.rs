//! Burn models for handwriting writer identification.
//!
//! This crate defines the network used to classify writers:
//! - `GrnnNet`: convolutional feature extractor, a GRU running along the
//!   writing direction, and a linear classifier over writer indices.
//!
//! These are pure Burn Modules. Data loading and the training loop live in the
//! `writer_dataset` and `training` crates.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::gru::{Gru, GruConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

#[derive(Debug, Clone)]
pub struct GrnnNetConfig {
    /// Channels of the input image; the normalizer produces grayscale.
    pub in_channels: usize,
    pub num_classes: usize,
    /// Channels of the first conv block; doubled by each following block.
    pub base_channels: usize,
    /// GRU hidden size.
    pub hidden: usize,
}

impl GrnnNetConfig {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            ..Self::default()
        }
    }
}

impl Default for GrnnNetConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            num_classes: 1,
            base_channels: 32,
            hidden: 128,
        }
    }
}

#[derive(Debug, Module)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_ch: usize, out_ch: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_ch, out_ch], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self { conv, pool }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pool.forward(relu(self.conv.forward(x)))
    }
}

#[derive(Debug, Module)]
pub struct GrnnNet<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    gru: Gru<B>,
    classifier: nn::Linear<B>,
    num_classes: usize,
}

impl<B: Backend> GrnnNet<B> {
    pub fn new(cfg: GrnnNetConfig, device: &B::Device) -> Self {
        let c1 = cfg.base_channels.max(1);
        let widths = [cfg.in_channels.max(1), c1, c1 * 2, c1 * 4];
        let blocks = widths
            .windows(2)
            .map(|w| ConvBlock::new(w[0], w[1], device))
            .collect();
        let gru = GruConfig::new(widths[3], cfg.hidden, true).init(device);
        let classifier = nn::LinearConfig::new(cfg.hidden, cfg.num_classes.max(1)).init(device);
        Self {
            blocks,
            gru,
            classifier,
            num_classes: cfg.num_classes.max(1),
        }
    }

    /// `[N, C, H, W]` images to `[N, num_classes]` logits.
    ///
    /// H and W must each be at least 8 so three 2x2 pools leave a non-empty map.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        // Collapse height, then read the feature columns left to right.
        let [n, c, _, w] = x.dims();
        let seq = x.mean_dim(2).reshape([n, c, w]).swap_dims(1, 2);
        let states = self.gru.forward(seq, None);
        let [_, _, hidden] = states.dims();
        let pooled = states.mean_dim(1).reshape([n, hidden]);
        self.classifier.forward(pooled)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

pub mod prelude {
    pub use super::{GrnnNet, GrnnNetConfig};
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn logits_have_one_column_per_writer() {
        let device = Default::default();
        let cfg = GrnnNetConfig {
            base_channels: 4,
            hidden: 8,
            ..GrnnNetConfig::new(5)
        };
        let model = GrnnNet::<B>::new(cfg, &device);
        let images = Tensor::<B, 4>::zeros([3, 1, 64, 128], &device);
        let logits = model.forward(images);
        assert_eq!(logits.dims(), [3, 5]);
        assert_eq!(model.num_classes(), 5);
    }

    #[test]
    fn small_canvas_still_produces_logits() {
        let device = Default::default();
        let cfg = GrnnNetConfig {
            base_channels: 2,
            hidden: 4,
            ..GrnnNetConfig::new(2)
        };
        let model = GrnnNet::<B>::new(cfg, &device);
        let logits = model.forward(Tensor::<B, 4>::ones([1, 1, 16, 32], &device));
        assert_eq!(logits.dims(), [1, 2]);
        let values = logits.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
