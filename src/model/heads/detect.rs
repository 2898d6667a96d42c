use burn::prelude::*;

use super::{
    box_branch_width, branch_levels, cls_branch_width, decode_group, pred_stacks, HeadOutput,
    HeadState, PredStack, RawOutput, RunMode, REG_MAX,
};
use crate::graph::make_divisible;
use crate::model::blocks::DFL;

/// Anchor-free detection head: per level, a box-regression stack emitting
/// `4 * reg_max` distribution bins and a classification stack emitting `nc`
/// logits.
#[derive(Module, Debug)]
pub struct Detect<B: Backend> {
    cv2: Vec<PredStack<B>>,
    cv3: Vec<PredStack<B>>,
    dfl: DFL,
    nc: usize,
    reg_max: usize,
    strides: Vec<usize>,
}

impl<B: Backend> Detect<B> {
    pub fn new(device: &B::Device, nc: usize, ch: &[usize]) -> Self {
        assert!(!ch.is_empty(), "detection head needs at least one input level");
        let c2 = box_branch_width(ch[0], REG_MAX);
        let c3 = cls_branch_width(ch[0], nc);

        log::debug!(
            "Detect: nc={} nl={} box width {} cls width {}",
            nc,
            ch.len(),
            c2,
            c3
        );

        Self {
            cv2: pred_stacks(device, ch, c2, 4 * REG_MAX, 1),
            cv3: pred_stacks(device, ch, c3, nc, 1),
            dfl: DFL::new(REG_MAX),
            nc,
            reg_max: REG_MAX,
            strides: vec![0; ch.len()],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.nc
    }

    pub fn num_levels(&self) -> usize {
        self.cv2.len()
    }

    pub fn set_strides(&mut self, strides: Vec<usize>) {
        self.strides = strides;
    }

    pub(crate) fn raw_levels(&self, xs: &[Tensor<B, 4>]) -> Vec<Tensor<B, 4>> {
        branch_levels(&self.cv2, &self.cv3, xs)
    }

    pub(crate) fn decode(
        &self,
        raw: &[Tensor<B, 4>],
        state: &mut HeadState<B>,
    ) -> Tensor<B, 3> {
        let (anchors, strides) = state.anchors_for(raw, &self.strides);
        decode_group(raw, &self.dfl, self.nc, self.reg_max, &anchors, &strides)
    }

    pub fn forward(
        &self,
        xs: Vec<Tensor<B, 4>>,
        mode: RunMode,
        state: &mut HeadState<B>,
    ) -> HeadOutput<B> {
        let raw = self.raw_levels(&xs);
        if mode == RunMode::Train {
            return HeadOutput::Train(RawOutput::detection(vec![raw]));
        }

        let pred = self.decode(&raw, state);
        match mode {
            RunMode::Export => HeadOutput::Export {
                pred: vec![pred],
                protos: Vec::new(),
                semantic: None,
            },
            _ => HeadOutput::Eval {
                pred: vec![pred],
                raw: RawOutput::detection(vec![raw]),
            },
        }
    }
}

/// [`Detect`] variant whose box stacks use group-4 convolutions, with the
/// box branch width rounded to a multiple of 4.
#[derive(Module, Debug)]
pub struct DDetect<B: Backend> {
    cv2: Vec<PredStack<B>>,
    cv3: Vec<PredStack<B>>,
    dfl: DFL,
    nc: usize,
    reg_max: usize,
    strides: Vec<usize>,
}

impl<B: Backend> DDetect<B> {
    pub fn new(device: &B::Device, nc: usize, ch: &[usize]) -> Self {
        assert!(!ch.is_empty(), "detection head needs at least one input level");
        let c2 = make_divisible(box_branch_width(ch[0], REG_MAX) as f64, 4);
        let c3 = cls_branch_width(ch[0], nc);

        Self {
            cv2: pred_stacks(device, ch, c2, 4 * REG_MAX, 4),
            cv3: pred_stacks(device, ch, c3, nc, 1),
            dfl: DFL::new(REG_MAX),
            nc,
            reg_max: REG_MAX,
            strides: vec![0; ch.len()],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.nc
    }

    pub fn num_levels(&self) -> usize {
        self.cv2.len()
    }

    pub fn set_strides(&mut self, strides: Vec<usize>) {
        self.strides = strides;
    }

    pub(crate) fn raw_levels(&self, xs: &[Tensor<B, 4>]) -> Vec<Tensor<B, 4>> {
        branch_levels(&self.cv2, &self.cv3, xs)
    }

    pub(crate) fn decode(
        &self,
        raw: &[Tensor<B, 4>],
        state: &mut HeadState<B>,
    ) -> Tensor<B, 3> {
        let (anchors, strides) = state.anchors_for(raw, &self.strides);
        decode_group(raw, &self.dfl, self.nc, self.reg_max, &anchors, &strides)
    }

    pub fn forward(
        &self,
        xs: Vec<Tensor<B, 4>>,
        mode: RunMode,
        state: &mut HeadState<B>,
    ) -> HeadOutput<B> {
        let raw = self.raw_levels(&xs);
        if mode == RunMode::Train {
            return HeadOutput::Train(RawOutput::detection(vec![raw]));
        }

        let pred = self.decode(&raw, state);
        match mode {
            RunMode::Export => HeadOutput::Export {
                pred: vec![pred],
                protos: Vec::new(),
                semantic: None,
            },
            _ => HeadOutput::Eval {
                pred: vec![pred],
                raw: RawOutput::detection(vec![raw]),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    fn levels(device: &NdArrayDevice) -> Vec<Tensor<NdArray, 4>> {
        vec![
            Tensor::zeros([1, 64, 8, 8], device),
            Tensor::zeros([1, 128, 4, 4], device),
        ]
    }

    #[test]
    fn train_mode_returns_raw_maps() {
        let device = NdArrayDevice::default();
        let mut head = Detect::<NdArray>::new(&device, 10, &[64, 128]);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        let out = head.forward(levels(&device), RunMode::Train, &mut state);
        match out {
            HeadOutput::Train(raw) => {
                assert_eq!(raw.groups.len(), 1);
                assert_eq!(raw.groups[0].len(), 2);
                // 4 * reg_max + nc output channels per level.
                assert_eq!(raw.groups[0][0].dims(), [1, 74, 8, 8]);
                assert_eq!(raw.groups[0][1].dims(), [1, 74, 4, 4]);
            }
            _ => panic!("expected raw output in train mode"),
        }
        assert!(!state.is_cached());
    }

    #[test]
    fn eval_mode_decodes_and_caches_anchors() {
        let device = NdArrayDevice::default();
        let mut head = Detect::<NdArray>::new(&device, 10, &[64, 128]);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        let out = head.forward(levels(&device), RunMode::Eval, &mut state);
        match out {
            HeadOutput::Eval { pred, raw } => {
                assert_eq!(pred.len(), 1);
                // 8*8 + 4*4 anchors across levels.
                assert_eq!(pred[0].dims(), [1, 14, 80]);
                assert_eq!(raw.groups[0].len(), 2);
            }
            _ => panic!("expected decoded output in eval mode"),
        }
        assert!(state.is_cached());
    }

    #[test]
    fn export_mode_drops_raw_tensors() {
        let device = NdArrayDevice::default();
        let mut head = DDetect::<NdArray>::new(&device, 4, &[64, 128]);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        let out = head.forward(levels(&device), RunMode::Export, &mut state);
        match out {
            HeadOutput::Export { pred, protos, semantic } => {
                assert_eq!(pred[0].dims(), [1, 8, 80]);
                assert!(protos.is_empty());
                assert!(semantic.is_none());
            }
            _ => panic!("expected export output"),
        }
    }

    #[test]
    fn cache_invalidates_on_new_shape() {
        let device = NdArrayDevice::default();
        let mut head = Detect::<NdArray>::new(&device, 2, &[64, 128]);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        head.forward(levels(&device), RunMode::Eval, &mut state);
        let small = vec![
            Tensor::zeros([1, 64, 4, 4], &device),
            Tensor::zeros([1, 128, 2, 2], &device),
        ];
        let out = head.forward(small, RunMode::Eval, &mut state);
        match out {
            HeadOutput::Eval { pred, .. } => assert_eq!(pred[0].dims(), [1, 6, 20]),
            _ => panic!("expected decoded output"),
        }
    }
}
