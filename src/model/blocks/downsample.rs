use burn::nn::pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::prelude::*;

use super::conv::Conv;

/// Downsample via a 2x2 stride-1 average pool followed by a strided 3x3 conv.
#[derive(Module, Debug)]
pub struct AConv<B: Backend> {
    pool: AvgPool2d,
    cv1: Conv<B>,
}

impl<B: Backend> AConv<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self {
            pool: AvgPool2dConfig::new([2, 2]).with_strides([1, 1]).init(),
            cv1: Conv::new(device, in_channels, out_channels, 3, 2),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.cv1.forward(self.pool.forward(x))
    }
}

/// Split-path downsample: one channel half through a strided conv, the other
/// through a max-pool and 1x1 conv, concatenated.
#[derive(Module, Debug)]
pub struct ADown<B: Backend> {
    avg: AvgPool2d,
    max: MaxPool2d,
    cv1: Conv<B>,
    cv2: Conv<B>,
    split_channels: usize,
}

impl<B: Backend> ADown<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        let half_out = out_channels / 2;

        Self {
            avg: AvgPool2dConfig::new([2, 2]).with_strides([1, 1]).init(),
            max: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(nn::PaddingConfig2d::Explicit(1, 1))
                .init(),
            cv1: Conv::new(device, in_channels / 2, half_out, 3, 2),
            cv2: Conv::new(device, in_channels / 2, half_out, 1, 1),
            split_channels: in_channels / 2,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.avg.forward(x);
        let [batch, channels, height, width] = x.dims();

        let x1 = x
            .clone()
            .slice([0..batch, 0..self.split_channels, 0..height, 0..width]);
        let x2 = x.slice([0..batch, self.split_channels..channels, 0..height, 0..width]);

        let x1 = self.cv1.forward(x1);
        let x2 = self.cv2.forward(self.max.forward(x2));
        Tensor::cat(vec![x1, x2], 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn aconv_halves_resolution() {
        let device = NdArrayDevice::default();
        let m = AConv::<NdArray>::new(&device, 32, 64);
        let x = Tensor::zeros([1, 32, 16, 16], &device);
        assert_eq!(m.forward(x).dims(), [1, 64, 8, 8]);
    }

    #[test]
    fn adown_halves_resolution_and_splits_channels() {
        let device = NdArrayDevice::default();
        let m = ADown::<NdArray>::new(&device, 64, 64);
        let x = Tensor::zeros([1, 64, 16, 16], &device);
        assert_eq!(m.forward(x).dims(), [1, 64, 8, 8]);
    }
}
