use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;

use super::conv::Conv;
use super::upsample::Upsample2d;

/// Mask prototype branch: conv, x2 nearest upsample, conv, 1x1 conv down to
/// the mask channel count.
#[derive(Module, Debug)]
pub struct Proto<B: Backend> {
    cv1: Conv<B>,
    upsample: Upsample2d,
    cv2: Conv<B>,
    cv3: Conv<B>,
}

impl<B: Backend> Proto<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        proto_channels: usize,
        mask_channels: usize,
    ) -> Self {
        Self {
            cv1: Conv::new(device, in_channels, proto_channels, 3, 1),
            upsample: Upsample2d::new(2),
            cv2: Conv::new(device, proto_channels, proto_channels, 3, 1),
            cv3: Conv::new(device, proto_channels, mask_channels, 1, 1),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.cv1.forward(x);
        let x = self.upsample.forward(x);
        self.cv3.forward(self.cv2.forward(x))
    }
}

/// Semantic-segmentation branch: conv, 1x1 projection, x2 nearest upsample.
#[derive(Module, Debug)]
pub struct UConv<B: Backend> {
    cv1: Conv<B>,
    cv2: Conv2d<B>,
    upsample: Upsample2d,
}

impl<B: Backend> UConv<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        hidden_channels: usize,
        out_channels: usize,
    ) -> Self {
        Self {
            cv1: Conv::new(device, in_channels, hidden_channels, 3, 1),
            cv2: Conv2dConfig::new([hidden_channels, out_channels], [1, 1]).init(device),
            upsample: Upsample2d::new(2),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.upsample.forward(self.cv2.forward(self.cv1.forward(x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn proto_doubles_resolution() {
        let device = NdArrayDevice::default();
        let m = Proto::<NdArray>::new(&device, 64, 32, 16);
        let x = Tensor::zeros([1, 64, 8, 8], &device);
        assert_eq!(m.forward(x).dims(), [1, 16, 16, 16]);
    }

    #[test]
    fn uconv_projects_and_upsamples() {
        let device = NdArrayDevice::default();
        let m = UConv::<NdArray>::new(&device, 32, 8, 12);
        let x = Tensor::zeros([1, 32, 8, 8], &device);
        assert_eq!(m.forward(x).dims(), [1, 12, 16, 16]);
    }
}
