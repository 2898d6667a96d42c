use burn::prelude::*;

use super::conv::Conv;
use super::repconv::RepNCSP;

#[derive(Module, Debug)]
struct BackboneStage<B: Backend> {
    down: Conv<B>,
    csp: RepNCSP<B>,
}

impl<B: Backend> BackboneStage<B> {
    fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self {
            down: Conv::new(device, in_channels, out_channels, 3, 2),
            csp: RepNCSP::new(device, out_channels, out_channels, 1),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.csp.forward(self.down.forward(x))
    }
}

/// Multi-output pyramid extractor: a strided stem followed by one CSP stage
/// per configured width, each halving resolution. Returns every stage output,
/// finest first.
#[derive(Module, Debug)]
pub struct CSPBackbone<B: Backend> {
    stem: Conv<B>,
    stages: Vec<BackboneStage<B>>,
}

impl<B: Backend> CSPBackbone<B> {
    pub fn new(device: &B::Device, in_channels: usize, widths: &[usize]) -> Self {
        assert!(!widths.is_empty(), "backbone needs at least one stage width");

        let stem = Conv::new(device, in_channels, widths[0], 3, 2);
        let mut stages = Vec::with_capacity(widths.len());
        let mut prev = widths[0];
        for &width in widths {
            stages.push(BackboneStage::new(device, prev, width));
            prev = width;
        }

        Self { stem, stages }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut x = self.stem.forward(x);
        let mut outs = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            x = stage.forward(x);
            outs.push(x.clone());
        }
        outs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn emits_one_feature_map_per_stage() {
        let device = NdArrayDevice::default();
        let m = CSPBackbone::<NdArray>::new(&device, 3, &[8, 16, 24]);
        let x = Tensor::zeros([1, 3, 64, 64], &device);
        let outs = m.forward(x);
        assert_eq!(outs.len(), 3);
        assert_eq!(outs[0].dims(), [1, 8, 16, 16]);
        assert_eq!(outs[1].dims(), [1, 16, 8, 8]);
        assert_eq!(outs[2].dims(), [1, 24, 4, 4]);
    }
}
