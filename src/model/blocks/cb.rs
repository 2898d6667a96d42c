use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;

use super::conv::autopad;
use super::upsample::resize_nearest;

/// 1x1 conv whose output is split along the channel axis into a list of
/// tensors with the configured widths. The list is consumed whole by
/// [`CBFuse`].
#[derive(Module, Debug)]
pub struct CBLinear<B: Backend> {
    conv: Conv2d<B>,
    out_channels: Vec<usize>,
}

impl<B: Backend> CBLinear<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: Vec<usize>,
        kernel_size: usize,
    ) -> Self {
        let total: usize = out_channels.iter().sum();
        let padding = autopad(kernel_size);

        Self {
            conv: Conv2dConfig::new([in_channels, total], [kernel_size, kernel_size])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .init(device),
            out_channels,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let y = self.conv.forward(x);
        let mut outs = Vec::with_capacity(self.out_channels.len());
        let mut offset = 0;
        for &width in &self.out_channels {
            outs.push(y.clone().narrow(1, offset, width));
            offset += width;
        }
        outs
    }
}

/// Selects one entry from each incoming tensor list, resizes every pick to
/// the spatial size of the final plain source and sums them all.
#[derive(Module, Debug, Clone)]
pub struct CBFuse {
    idx: Vec<usize>,
}

impl CBFuse {
    pub fn new(idx: Vec<usize>) -> Self {
        Self { idx }
    }

    pub fn forward<B: Backend>(
        &self,
        lists: Vec<Vec<Tensor<B, 4>>>,
        last: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [_, _, height, width] = last.dims();
        let mut acc = last;
        for (i, list) in lists.into_iter().enumerate() {
            let pick = self.idx[i];
            assert!(
                pick < list.len(),
                "fuse index {} out of range for a {}-way source",
                pick,
                list.len()
            );
            let resized = resize_nearest(list[pick].clone(), height, width);
            acc = acc + resized;
        }
        acc
    }
}
