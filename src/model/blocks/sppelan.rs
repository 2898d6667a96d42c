use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::*;

use super::conv::Conv;

/// Spatial pyramid pooling in ELAN form: 1x1 reduce, three chained 5x5
/// max-pools, concat of the four taps, 1x1 fuse.
#[derive(Module, Debug)]
pub struct SPPELAN<B: Backend> {
    cv1: Conv<B>,
    cv5: Conv<B>,
    pool: MaxPool2d,
}

impl<B: Backend> SPPELAN<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        hidden_channels: usize,
    ) -> Self {
        let pool = MaxPool2dConfig::new([5, 5])
            .with_strides([1, 1])
            .with_padding(nn::PaddingConfig2d::Explicit(2, 2))
            .init();

        Self {
            cv1: Conv::new(device, in_channels, hidden_channels, 1, 1),
            cv5: Conv::new(device, 4 * hidden_channels, out_channels, 1, 1),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.cv1.forward(x);

        let p1 = self.pool.forward(x.clone());
        let p2 = self.pool.forward(p1.clone());
        let p3 = self.pool.forward(p2.clone());

        self.cv5.forward(Tensor::cat(vec![x, p1, p2, p3], 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn pooling_pyramid_keeps_spatial_size() {
        let device = NdArrayDevice::default();
        let m = SPPELAN::<NdArray>::new(&device, 64, 64, 32);
        let x = Tensor::zeros([1, 64, 8, 8], &device);
        assert_eq!(m.forward(x).dims(), [1, 64, 8, 8]);
    }
}
