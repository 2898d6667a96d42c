use burn::prelude::*;

use crate::model::blocks::{
    AConv, ADown, CBFuse, CBLinear, CSPBackbone, Concat, Conv, RepNCSPELAN4, Shortcut, Silence,
    Upsample2d, ELAN1, SPPELAN,
};

/// Output of a single graph layer: most produce one feature map, the
/// list-producing modules ([`CBLinear`], [`CSPBackbone`]) produce several.
#[derive(Debug, Clone)]
pub enum LayerOutput<B: Backend> {
    Single(Tensor<B, 4>),
    Multi(Vec<Tensor<B, 4>>),
}

impl<B: Backend> LayerOutput<B> {
    pub fn into_single(self) -> Tensor<B, 4> {
        match self {
            LayerOutput::Single(t) => t,
            LayerOutput::Multi(_) => panic!("expected a single-tensor layer output"),
        }
    }

    pub fn into_multi(self) -> Vec<Tensor<B, 4>> {
        match self {
            LayerOutput::Multi(ts) => ts,
            LayerOutput::Single(_) => panic!("expected a multi-tensor layer output"),
        }
    }
}

fn one<B: Backend>(inputs: Vec<LayerOutput<B>>) -> Tensor<B, 4> {
    let mut iter = inputs.into_iter();
    match iter.next() {
        Some(x) => x.into_single(),
        None => panic!("layer expected an input"),
    }
}

fn all<B: Backend>(inputs: Vec<LayerOutput<B>>) -> Vec<Tensor<B, 4>> {
    inputs.into_iter().map(LayerOutput::into_single).collect()
}

/// A built graph layer. Variants mirror the module names accepted by the
/// graph builder.
#[derive(Module, Debug)]
pub enum Layer<B: Backend> {
    Conv(Conv<B>),
    AConv(AConv<B>),
    ADown(ADown<B>),
    Elan1(ELAN1<B>),
    RepElan(RepNCSPELAN4<B>),
    SppElan(SPPELAN<B>),
    Upsample(Upsample2d),
    Concat(Concat),
    Shortcut(Shortcut),
    CbLinear(CBLinear<B>),
    CbFuse(CBFuse),
    Backbone(CSPBackbone<B>),
    Silence(Silence),
    Stack(Vec<Layer<B>>),
}

impl<B: Backend> Layer<B> {
    pub fn forward(&self, inputs: Vec<LayerOutput<B>>) -> LayerOutput<B> {
        match self {
            Layer::Conv(m) => LayerOutput::Single(m.forward(one(inputs))),
            Layer::AConv(m) => LayerOutput::Single(m.forward(one(inputs))),
            Layer::ADown(m) => LayerOutput::Single(m.forward(one(inputs))),
            Layer::Elan1(m) => LayerOutput::Single(m.forward(one(inputs))),
            Layer::RepElan(m) => LayerOutput::Single(m.forward(one(inputs))),
            Layer::SppElan(m) => LayerOutput::Single(m.forward(one(inputs))),
            Layer::Upsample(m) => LayerOutput::Single(m.forward(one(inputs))),
            Layer::Concat(m) => LayerOutput::Single(m.forward(all(inputs))),
            Layer::Shortcut(m) => LayerOutput::Single(m.forward(all(inputs))),
            Layer::CbLinear(m) => LayerOutput::Multi(m.forward(one(inputs))),
            Layer::CbFuse(m) => {
                let mut inputs = inputs;
                let last = match inputs.pop() {
                    Some(x) => x.into_single(),
                    None => panic!("fuse layer expected inputs"),
                };
                let lists = inputs.into_iter().map(LayerOutput::into_multi).collect();
                LayerOutput::Single(m.forward(lists, last))
            }
            Layer::Backbone(m) => LayerOutput::Multi(m.forward(one(inputs))),
            Layer::Silence(m) => LayerOutput::Single(m.forward(one(inputs))),
            Layer::Stack(layers) => {
                let mut x = match inputs.into_iter().next() {
                    Some(x) => x,
                    None => panic!("layer stack expected an input"),
                };
                for layer in layers {
                    x = layer.forward(vec![x]);
                }
                x
            }
        }
    }
}
