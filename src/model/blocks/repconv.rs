use burn::prelude::*;
use burn::tensor::activation;

use super::conv::{Conv, ConvBn};

/// Re-parameterizable conv: parallel 3x3 and 1x1 conv+bn branches summed,
/// then activated.
#[derive(Module, Debug)]
pub struct RepConvN<B: Backend> {
    conv1: ConvBn<B>,
    conv2: ConvBn<B>,
}

impl<B: Backend> RepConvN<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self {
            conv1: ConvBn::new(device, in_channels, out_channels, 3, 1, 1),
            conv2: ConvBn::new(device, in_channels, out_channels, 1, 1, 1),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        activation::silu(self.conv1.forward(x.clone()) + self.conv2.forward(x))
    }
}

/// Bottleneck built from a rep-conv followed by a 3x3 conv, with an optional
/// residual add when in/out widths agree.
#[derive(Module, Debug)]
pub struct RepNBottleneck<B: Backend> {
    cv1: RepConvN<B>,
    cv2: Conv<B>,
    add: bool,
}

impl<B: Backend> RepNBottleneck<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        shortcut: bool,
    ) -> Self {
        Self {
            cv1: RepConvN::new(device, in_channels, out_channels),
            cv2: Conv::new(device, out_channels, out_channels, 3, 1),
            add: shortcut && in_channels == out_channels,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let y = self.cv2.forward(self.cv1.forward(x.clone()));
        if self.add {
            x + y
        } else {
            y
        }
    }
}

/// CSP stack of rep-conv bottlenecks: two 1x1 taps, one run through the
/// bottleneck chain, fused by a 1x1 conv.
#[derive(Module, Debug)]
pub struct RepNCSP<B: Backend> {
    cv1: Conv<B>,
    cv2: Conv<B>,
    cv3: Conv<B>,
    bottlenecks: Vec<RepNBottleneck<B>>,
}

impl<B: Backend> RepNCSP<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize, n: usize) -> Self {
        let hidden = out_channels / 2;
        let bottlenecks = (0..n)
            .map(|_| RepNBottleneck::new(device, hidden, hidden, true))
            .collect();

        Self {
            cv1: Conv::new(device, in_channels, hidden, 1, 1),
            cv2: Conv::new(device, in_channels, hidden, 1, 1),
            cv3: Conv::new(device, 2 * hidden, out_channels, 1, 1),
            bottlenecks,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut main = self.cv1.forward(x.clone());
        for bottleneck in &self.bottlenecks {
            main = bottleneck.forward(main);
        }
        let side = self.cv2.forward(x);
        self.cv3.forward(Tensor::cat(vec![main, side], 1))
    }
}
