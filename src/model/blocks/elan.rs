use burn::prelude::*;

use super::conv::Conv;
use super::repconv::RepNCSP;

/// ELAN aggregation over two chained CSP branches: a 1x1 expand, a channel
/// split, two CSP+conv stages fed from the newest tap, then a 1x1 fuse over
/// all four taps.
#[derive(Module, Debug)]
pub struct RepNCSPELAN4<B: Backend> {
    cv1: Conv<B>,
    csp2: RepNCSP<B>,
    cv2: Conv<B>,
    csp3: RepNCSP<B>,
    cv3: Conv<B>,
    cv4: Conv<B>,
    split_channels: usize,
}

impl<B: Backend> RepNCSPELAN4<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        expand_channels: usize,
        branch_channels: usize,
        n: usize,
    ) -> Self {
        let split = expand_channels / 2;

        Self {
            cv1: Conv::new(device, in_channels, expand_channels, 1, 1),
            csp2: RepNCSP::new(device, split, branch_channels, n),
            cv2: Conv::new(device, branch_channels, branch_channels, 3, 1),
            csp3: RepNCSP::new(device, branch_channels, branch_channels, n),
            cv3: Conv::new(device, branch_channels, branch_channels, 3, 1),
            cv4: Conv::new(
                device,
                expand_channels + 2 * branch_channels,
                out_channels,
                1,
                1,
            ),
            split_channels: split,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.cv1.forward(x);
        let [batch, channels, height, width] = x.dims();

        let tap1 = x
            .clone()
            .slice([0..batch, 0..self.split_channels, 0..height, 0..width]);
        let tap2 = x.slice([0..batch, self.split_channels..channels, 0..height, 0..width]);

        let tap3 = self.cv2.forward(self.csp2.forward(tap2.clone()));
        let tap4 = self.cv3.forward(self.csp3.forward(tap3.clone()));

        self.cv4.forward(Tensor::cat(vec![tap1, tap2, tap3, tap4], 1))
    }
}

/// Plain-conv ELAN variant: same four-tap aggregation with 3x3 convs in place
/// of the CSP branches.
#[derive(Module, Debug)]
pub struct ELAN1<B: Backend> {
    cv1: Conv<B>,
    cv2: Conv<B>,
    cv3: Conv<B>,
    cv4: Conv<B>,
    split_channels: usize,
}

impl<B: Backend> ELAN1<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        expand_channels: usize,
        branch_channels: usize,
    ) -> Self {
        Self {
            cv1: Conv::new(device, in_channels, expand_channels, 1, 1),
            cv2: Conv::new(device, expand_channels / 2, branch_channels, 3, 1),
            cv3: Conv::new(device, branch_channels, branch_channels, 3, 1),
            cv4: Conv::new(
                device,
                expand_channels + 2 * branch_channels,
                out_channels,
                1,
                1,
            ),
            split_channels: expand_channels / 2,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.cv1.forward(x);
        let [batch, channels, height, width] = x.dims();

        let tap1 = x
            .clone()
            .slice([0..batch, 0..self.split_channels, 0..height, 0..width]);
        let tap2 = x.slice([0..batch, self.split_channels..channels, 0..height, 0..width]);

        let tap3 = self.cv2.forward(tap2.clone());
        let tap4 = self.cv3.forward(tap3.clone());

        self.cv4.forward(Tensor::cat(vec![tap1, tap2, tap3, tap4], 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn elan_aggregates_to_requested_width() {
        let device = NdArrayDevice::default();
        let m = RepNCSPELAN4::<NdArray>::new(&device, 64, 128, 64, 32, 1);
        let x = Tensor::zeros([1, 64, 16, 16], &device);
        assert_eq!(m.forward(x).dims(), [1, 128, 16, 16]);
    }

    #[test]
    fn plain_elan_matches_shape() {
        let device = NdArrayDevice::default();
        let m = ELAN1::<NdArray>::new(&device, 32, 64, 32, 16);
        let x = Tensor::zeros([2, 32, 8, 8], &device);
        assert_eq!(m.forward(x).dims(), [2, 64, 8, 8]);
    }
}
