use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

pub(crate) fn autopad(kernel_size: usize) -> usize {
    kernel_size / 2
}

/// Conv2d + BatchNorm without activation. Used where a branch is summed or
/// split before the nonlinearity is applied.
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBn<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
    ) -> Self {
        let padding = autopad(kernel_size);

        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_groups(groups)
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Standard conv block: Conv2d + BatchNorm + SiLU.
#[derive(Module, Debug)]
pub struct Conv<B: Backend> {
    inner: ConvBn<B>,
}

impl<B: Backend> Conv<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
    ) -> Self {
        Self::with_groups(device, in_channels, out_channels, kernel_size, stride, 1)
    }

    pub fn with_groups(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
    ) -> Self {
        Self {
            inner: ConvBn::new(device, in_channels, out_channels, kernel_size, stride, groups),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        activation::silu(self.inner.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn conv_keeps_spatial_size_with_autopad() {
        let device = NdArrayDevice::default();
        let conv = Conv::<NdArray>::new(&device, 3, 16, 3, 1);
        let x = Tensor::zeros([1, 3, 32, 32], &device);
        assert_eq!(conv.forward(x).dims(), [1, 16, 32, 32]);
    }

    #[test]
    fn strided_conv_halves_spatial_size() {
        let device = NdArrayDevice::default();
        let conv = Conv::<NdArray>::new(&device, 3, 8, 3, 2);
        let x = Tensor::zeros([2, 3, 64, 64], &device);
        assert_eq!(conv.forward(x).dims(), [2, 8, 32, 32]);
    }

    #[test]
    fn grouped_conv_keeps_channel_count() {
        let device = NdArrayDevice::default();
        let conv = Conv::<NdArray>::with_groups(&device, 64, 64, 3, 1, 4);
        let x = Tensor::zeros([1, 64, 8, 8], &device);
        assert_eq!(conv.forward(x).dims(), [1, 64, 8, 8]);
    }
}
