mod detect;
mod dual;
mod panoptic;
mod segment;
mod triple;

pub use detect::{DDetect, Detect};
pub use dual::{DualDDetect, DualDetect};
pub use panoptic::Panoptic;
pub use segment::{DSegment, DualDSegment, Segment};
pub use triple::{TripleDDetect, TripleDetect};

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use crate::model::blocks::{Conv, DFL};

pub const REG_MAX: usize = 16;

/// Forward-pass mode of a detection head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Raw per-level branch tensors for loss computation.
    Train,
    /// Decoded predictions alongside the raw tensors.
    Eval,
    /// Decoded predictions only, flattened for serialization.
    Export,
}

/// Caller-owned decode cache. Anchor points and per-anchor strides are
/// rebuilt lazily whenever `dynamic` is set or the incoming spatial shape
/// differs from the cached one, and reused otherwise.
#[derive(Debug, Clone)]
pub struct HeadState<B: Backend> {
    /// Force anchor regeneration on every call.
    pub dynamic: bool,
    cache: Option<AnchorCache<B>>,
}

#[derive(Debug, Clone)]
struct AnchorCache<B: Backend> {
    anchors: Tensor<B, 3>,
    strides: Tensor<B, 3>,
    shape: [usize; 4],
}

impl<B: Backend> HeadState<B> {
    pub fn new() -> Self {
        Self {
            dynamic: false,
            cache: None,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Anchor points [1, 2, A] and per-anchor strides [1, 1, A] for the given
    /// feature levels, rebuilt only when stale.
    pub(crate) fn anchors_for(
        &mut self,
        levels: &[Tensor<B, 4>],
        level_strides: &[usize],
    ) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let shape = levels[0].dims();
        if !self.dynamic {
            if let Some(cache) = &self.cache {
                if cache.shape == shape {
                    return (cache.anchors.clone(), cache.strides.clone());
                }
            }
        }

        let (anchors, strides) = make_anchors(levels, level_strides, 0.5);
        self.cache = Some(AnchorCache {
            anchors: anchors.clone(),
            strides: strides.clone(),
            shape,
        });
        (anchors, strides)
    }
}

impl<B: Backend> Default for HeadState<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw head tensors as produced in training mode: per-level box+cls maps for
/// each branch group, plus mask/semantic extras for segmentation heads.
#[derive(Debug, Clone)]
pub struct RawOutput<B: Backend> {
    pub groups: Vec<Vec<Tensor<B, 4>>>,
    pub mask_coeffs: Vec<Tensor<B, 3>>,
    pub protos: Vec<Tensor<B, 4>>,
    pub semantic: Option<Tensor<B, 4>>,
}

impl<B: Backend> RawOutput<B> {
    pub fn detection(groups: Vec<Vec<Tensor<B, 4>>>) -> Self {
        Self {
            groups,
            mask_coeffs: Vec::new(),
            protos: Vec::new(),
            semantic: None,
        }
    }
}

/// Head forward result, shaped by [`RunMode`].
#[derive(Debug, Clone)]
pub enum HeadOutput<B: Backend> {
    Train(RawOutput<B>),
    Eval {
        pred: Vec<Tensor<B, 3>>,
        raw: RawOutput<B>,
    },
    Export {
        pred: Vec<Tensor<B, 3>>,
        protos: Vec<Tensor<B, 4>>,
        semantic: Option<Tensor<B, 4>>,
    },
}

impl<B: Backend> HeadOutput<B> {
    /// Decoded predictions, if the mode produced any.
    pub fn predictions(&self) -> Option<&[Tensor<B, 3>]> {
        match self {
            HeadOutput::Train(_) => None,
            HeadOutput::Eval { pred, .. } => Some(pred),
            HeadOutput::Export { pred, .. } => Some(pred),
        }
    }

    /// Raw branch groups, present in train and eval modes.
    pub fn raw_groups(&self) -> Option<&[Vec<Tensor<B, 4>>]> {
        match self {
            HeadOutput::Train(raw) => Some(&raw.groups),
            HeadOutput::Eval { raw, .. } => Some(&raw.groups),
            HeadOutput::Export { .. } => None,
        }
    }
}

/// Per-level prediction stack: two 3x3 conv blocks and a 1x1 projection.
/// Grouped-conv head variants apply their group count to the second conv and
/// the projection.
#[derive(Module, Debug)]
pub struct PredStack<B: Backend> {
    cv1: Conv<B>,
    cv2: Conv<B>,
    out: Conv2d<B>,
}

impl<B: Backend> PredStack<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        mid_channels: usize,
        out_channels: usize,
        groups: usize,
    ) -> Self {
        Self {
            cv1: Conv::new(device, in_channels, mid_channels, 3, 1),
            cv2: Conv::with_groups(device, mid_channels, mid_channels, 3, 1, groups),
            out: Conv2dConfig::new([mid_channels, out_channels], [1, 1])
                .with_groups(groups)
                .init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.out.forward(self.cv2.forward(self.cv1.forward(x)))
    }
}

/// One stack per input width.
pub(crate) fn pred_stacks<B: Backend>(
    device: &B::Device,
    widths: &[usize],
    mid_channels: usize,
    out_channels: usize,
    groups: usize,
) -> Vec<PredStack<B>> {
    widths
        .iter()
        .map(|&w| PredStack::new(device, w, mid_channels, out_channels, groups))
        .collect()
}

pub(crate) fn box_branch_width(ch0: usize, reg_max: usize) -> usize {
    (ch0 / 4).max(reg_max * 4).max(16)
}

pub(crate) fn cls_branch_width(ch0: usize, nc: usize) -> usize {
    ch0.max((nc * 2).min(128))
}

/// Run the box and cls stacks over each level and concatenate on the channel
/// axis: one [B, 4*reg_max + nc, H, W] map per level.
pub(crate) fn branch_levels<B: Backend>(
    cv_box: &[PredStack<B>],
    cv_cls: &[PredStack<B>],
    xs: &[Tensor<B, 4>],
) -> Vec<Tensor<B, 4>> {
    xs.iter()
        .zip(cv_box.iter().zip(cv_cls.iter()))
        .map(|(x, (bb, cb))| {
            Tensor::cat(vec![bb.forward(x.clone()), cb.forward(x.clone())], 1)
        })
        .collect()
}

/// Grid-cell anchor centers at the given offset, flattened and concatenated
/// across levels. Returns anchor points [1, 2, A] and strides [1, 1, A].
pub(crate) fn make_anchors<B: Backend>(
    levels: &[Tensor<B, 4>],
    level_strides: &[usize],
    offset: f32,
) -> (Tensor<B, 3>, Tensor<B, 3>) {
    let device = levels[0].device();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut strides = Vec::new();

    for (level, &stride) in levels.iter().zip(level_strides.iter()) {
        let [_, _, h, w] = level.dims();
        for y in 0..h {
            for x in 0..w {
                xs.push(x as f32 + offset);
                ys.push(y as f32 + offset);
                strides.push(stride as f32);
            }
        }
    }

    let total = xs.len();
    let x_row = Tensor::<B, 1>::from_floats(xs.as_slice(), &device);
    let y_row = Tensor::<B, 1>::from_floats(ys.as_slice(), &device);
    let anchors: Tensor<B, 2> = Tensor::stack(vec![x_row, y_row], 0);
    let anchors = anchors.reshape([1, 2, total]);
    let strides = Tensor::<B, 1>::from_floats(strides.as_slice(), &device).reshape([1, 1, total]);
    (anchors, strides)
}

/// Anchor-free distance-to-box transform: left/top/right/bottom distances
/// against anchor centers, emitted in center+size form. [B, 4, A] -> [B, 4, A]
pub(crate) fn dist2bbox<B: Backend>(
    distance: Tensor<B, 3>,
    anchors: Tensor<B, 3>,
) -> Tensor<B, 3> {
    let lt = distance.clone().narrow(1, 0, 2);
    let rb = distance.narrow(1, 2, 2);
    let x1y1 = anchors.clone() - lt;
    let x2y2 = anchors + rb;
    let center = (x1y1.clone() + x2y2.clone()) * 0.5;
    let size = x2y2 - x1y1;
    Tensor::cat(vec![center, size], 1)
}

/// Flatten per-level maps to [B, C, sum(H*W)].
pub(crate) fn flatten_levels<B: Backend>(levels: &[Tensor<B, 4>]) -> Tensor<B, 3> {
    let views: Vec<Tensor<B, 3>> = levels
        .iter()
        .map(|t| {
            let [b, c, h, w] = t.dims();
            t.clone().reshape([b, c, h * w])
        })
        .collect();
    Tensor::cat(views, 2)
}

/// Decode one branch group to [B, 4 + nc, A]: DFL distances through the
/// distance-to-box transform scaled by per-anchor stride, classification
/// scores sigmoid-squashed.
pub(crate) fn decode_group<B: Backend>(
    levels: &[Tensor<B, 4>],
    dfl: &DFL,
    nc: usize,
    reg_max: usize,
    anchors: &Tensor<B, 3>,
    strides: &Tensor<B, 3>,
) -> Tensor<B, 3> {
    let flat = flatten_levels(levels);
    let box_t = flat.clone().narrow(1, 0, reg_max * 4);
    let cls_t = flat.narrow(1, reg_max * 4, nc);

    let dist = dfl.forward(box_t);
    let dbox = dist2bbox(dist, anchors.clone()) * strides.clone();
    Tensor::cat(vec![dbox, sigmoid(cls_t)], 1)
}

/// Flatten per-level mask-coefficient maps to [B, nm, A].
pub(crate) fn coeff_levels<B: Backend>(
    stacks: &[PredStack<B>],
    xs: &[Tensor<B, 4>],
) -> Tensor<B, 3> {
    let maps: Vec<Tensor<B, 4>> = stacks
        .iter()
        .zip(xs.iter())
        .map(|(stack, x)| stack.forward(x.clone()))
        .collect();
    flatten_levels(&maps)
}

/// The full family of detection/segmentation/panoptic heads.
#[derive(Module, Debug)]
pub enum Head<B: Backend> {
    Detect(Detect<B>),
    DDetect(DDetect<B>),
    DualDetect(DualDetect<B>),
    DualDDetect(DualDDetect<B>),
    TripleDetect(TripleDetect<B>),
    TripleDDetect(TripleDDetect<B>),
    Segment(Segment<B>),
    DSegment(DSegment<B>),
    DualDSegment(DualDSegment<B>),
    Panoptic(Panoptic<B>),
}

impl<B: Backend> Head<B> {
    pub fn forward(
        &self,
        xs: Vec<Tensor<B, 4>>,
        mode: RunMode,
        state: &mut HeadState<B>,
    ) -> HeadOutput<B> {
        match self {
            Head::Detect(h) => h.forward(xs, mode, state),
            Head::DDetect(h) => h.forward(xs, mode, state),
            Head::DualDetect(h) => h.forward(xs, mode, state),
            Head::DualDDetect(h) => h.forward(xs, mode, state),
            Head::TripleDetect(h) => h.forward(xs, mode, state),
            Head::TripleDDetect(h) => h.forward(xs, mode, state),
            Head::Segment(h) => h.forward(xs, mode, state),
            Head::DSegment(h) => h.forward(xs, mode, state),
            Head::DualDSegment(h) => h.forward(xs, mode, state),
            Head::Panoptic(h) => h.forward(xs, mode, state),
        }
    }

    pub fn num_classes(&self) -> usize {
        match self {
            Head::Detect(h) => h.num_classes(),
            Head::DDetect(h) => h.num_classes(),
            Head::DualDetect(h) => h.num_classes(),
            Head::DualDDetect(h) => h.num_classes(),
            Head::TripleDetect(h) => h.num_classes(),
            Head::TripleDDetect(h) => h.num_classes(),
            Head::Segment(h) => h.num_classes(),
            Head::DSegment(h) => h.num_classes(),
            Head::DualDSegment(h) => h.num_classes(),
            Head::Panoptic(h) => h.num_classes(),
        }
    }

    pub fn num_levels(&self) -> usize {
        match self {
            Head::Detect(h) => h.num_levels(),
            Head::DDetect(h) => h.num_levels(),
            Head::DualDetect(h) => h.num_levels(),
            Head::DualDDetect(h) => h.num_levels(),
            Head::TripleDetect(h) => h.num_levels(),
            Head::TripleDDetect(h) => h.num_levels(),
            Head::Segment(h) => h.num_levels(),
            Head::DSegment(h) => h.num_levels(),
            Head::DualDSegment(h) => h.num_levels(),
            Head::Panoptic(h) => h.num_levels(),
        }
    }

    pub fn set_strides(&mut self, strides: Vec<usize>) {
        match self {
            Head::Detect(h) => h.set_strides(strides),
            Head::DDetect(h) => h.set_strides(strides),
            Head::DualDetect(h) => h.set_strides(strides),
            Head::DualDDetect(h) => h.set_strides(strides),
            Head::TripleDetect(h) => h.set_strides(strides),
            Head::TripleDDetect(h) => h.set_strides(strides),
            Head::Segment(h) => h.set_strides(strides),
            Head::DSegment(h) => h.set_strides(strides),
            Head::DualDSegment(h) => h.set_strides(strides),
            Head::Panoptic(h) => h.set_strides(strides),
        }
    }
}
