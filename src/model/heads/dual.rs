use burn::prelude::*;

use super::{
    box_branch_width, branch_levels, cls_branch_width, decode_group, pred_stacks, HeadOutput,
    HeadState, PredStack, RawOutput, RunMode, REG_MAX,
};
use crate::graph::make_divisible;
use crate::model::blocks::DFL;

/// Two branch groups over `2 * nl` inputs: the first half of the inputs feed
/// the main group, the second half the auxiliary one. Training returns both
/// raw groups, inference decodes both against anchors from the first.
#[derive(Module, Debug)]
pub struct DualDetect<B: Backend> {
    cv2: Vec<PredStack<B>>,
    cv3: Vec<PredStack<B>>,
    cv4: Vec<PredStack<B>>,
    cv5: Vec<PredStack<B>>,
    dfl: DFL,
    dfl2: DFL,
    nc: usize,
    reg_max: usize,
    nl: usize,
    strides: Vec<usize>,
}

impl<B: Backend> DualDetect<B> {
    pub fn new(device: &B::Device, nc: usize, ch: &[usize]) -> Self {
        assert!(
            !ch.is_empty() && ch.len() % 2 == 0,
            "dual head needs an even number of input levels, got {}",
            ch.len()
        );
        let nl = ch.len() / 2;
        let c2 = box_branch_width(ch[0], REG_MAX);
        let c3 = cls_branch_width(ch[0], nc);
        let c4 = box_branch_width(ch[nl], REG_MAX);
        let c5 = cls_branch_width(ch[nl], nc);

        Self {
            cv2: pred_stacks(device, &ch[..nl], c2, 4 * REG_MAX, 1),
            cv3: pred_stacks(device, &ch[..nl], c3, nc, 1),
            cv4: pred_stacks(device, &ch[nl..], c4, 4 * REG_MAX, 1),
            cv5: pred_stacks(device, &ch[nl..], c5, nc, 1),
            dfl: DFL::new(REG_MAX),
            dfl2: DFL::new(REG_MAX),
            nc,
            reg_max: REG_MAX,
            nl,
            strides: vec![0; nl],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.nc
    }

    pub fn num_levels(&self) -> usize {
        self.nl
    }

    pub fn set_strides(&mut self, strides: Vec<usize>) {
        self.strides = strides;
    }

    pub fn forward(
        &self,
        xs: Vec<Tensor<B, 4>>,
        mode: RunMode,
        state: &mut HeadState<B>,
    ) -> HeadOutput<B> {
        let d1 = branch_levels(&self.cv2, &self.cv3, &xs[..self.nl]);
        let d2 = branch_levels(&self.cv4, &self.cv5, &xs[self.nl..]);
        if mode == RunMode::Train {
            return HeadOutput::Train(RawOutput::detection(vec![d1, d2]));
        }

        let (anchors, strides) = state.anchors_for(&d1, &self.strides);
        let y1 = decode_group(&d1, &self.dfl, self.nc, self.reg_max, &anchors, &strides);
        let y2 = decode_group(&d2, &self.dfl2, self.nc, self.reg_max, &anchors, &strides);

        match mode {
            RunMode::Export => HeadOutput::Export {
                pred: vec![y1, y2],
                protos: Vec::new(),
                semantic: None,
            },
            _ => HeadOutput::Eval {
                pred: vec![y1, y2],
                raw: RawOutput::detection(vec![d1, d2]),
            },
        }
    }
}

/// [`DualDetect`] with group-4 convolutions in both box stacks.
#[derive(Module, Debug)]
pub struct DualDDetect<B: Backend> {
    cv2: Vec<PredStack<B>>,
    cv3: Vec<PredStack<B>>,
    cv4: Vec<PredStack<B>>,
    cv5: Vec<PredStack<B>>,
    dfl: DFL,
    dfl2: DFL,
    nc: usize,
    reg_max: usize,
    nl: usize,
    strides: Vec<usize>,
}

impl<B: Backend> DualDDetect<B> {
    pub fn new(device: &B::Device, nc: usize, ch: &[usize]) -> Self {
        assert!(
            !ch.is_empty() && ch.len() % 2 == 0,
            "dual head needs an even number of input levels, got {}",
            ch.len()
        );
        let nl = ch.len() / 2;
        let c2 = make_divisible(box_branch_width(ch[0], REG_MAX) as f64, 4);
        let c3 = cls_branch_width(ch[0], nc);
        let c4 = make_divisible(box_branch_width(ch[nl], REG_MAX) as f64, 4);
        let c5 = cls_branch_width(ch[nl], nc);

        Self {
            cv2: pred_stacks(device, &ch[..nl], c2, 4 * REG_MAX, 4),
            cv3: pred_stacks(device, &ch[..nl], c3, nc, 1),
            cv4: pred_stacks(device, &ch[nl..], c4, 4 * REG_MAX, 4),
            cv5: pred_stacks(device, &ch[nl..], c5, nc, 1),
            dfl: DFL::new(REG_MAX),
            dfl2: DFL::new(REG_MAX),
            nc,
            reg_max: REG_MAX,
            nl,
            strides: vec![0; nl],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.nc
    }

    pub fn num_levels(&self) -> usize {
        self.nl
    }

    pub fn set_strides(&mut self, strides: Vec<usize>) {
        self.strides = strides;
    }

    pub(crate) fn branch_groups(
        &self,
        xs: &[Tensor<B, 4>],
    ) -> (Vec<Tensor<B, 4>>, Vec<Tensor<B, 4>>) {
        (
            branch_levels(&self.cv2, &self.cv3, &xs[..self.nl]),
            branch_levels(&self.cv4, &self.cv5, &xs[self.nl..]),
        )
    }

    pub(crate) fn decode_groups(
        &self,
        d1: &[Tensor<B, 4>],
        d2: &[Tensor<B, 4>],
        state: &mut HeadState<B>,
    ) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let (anchors, strides) = state.anchors_for(d1, &self.strides);
        let y1 = decode_group(d1, &self.dfl, self.nc, self.reg_max, &anchors, &strides);
        let y2 = decode_group(d2, &self.dfl2, self.nc, self.reg_max, &anchors, &strides);
        (y1, y2)
    }

    pub fn forward(
        &self,
        xs: Vec<Tensor<B, 4>>,
        mode: RunMode,
        state: &mut HeadState<B>,
    ) -> HeadOutput<B> {
        let (d1, d2) = self.branch_groups(&xs);
        if mode == RunMode::Train {
            return HeadOutput::Train(RawOutput::detection(vec![d1, d2]));
        }

        let (y1, y2) = self.decode_groups(&d1, &d2, state);
        match mode {
            RunMode::Export => HeadOutput::Export {
                pred: vec![y1, y2],
                protos: Vec::new(),
                semantic: None,
            },
            _ => HeadOutput::Eval {
                pred: vec![y1, y2],
                raw: RawOutput::detection(vec![d1, d2]),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    fn dual_levels(device: &NdArrayDevice) -> Vec<Tensor<NdArray, 4>> {
        vec![
            Tensor::zeros([1, 64, 8, 8], device),
            Tensor::zeros([1, 128, 4, 4], device),
            Tensor::zeros([1, 64, 8, 8], device),
            Tensor::zeros([1, 128, 4, 4], device),
        ]
    }

    #[test]
    fn train_returns_both_groups() {
        let device = NdArrayDevice::default();
        let mut head = DualDetect::<NdArray>::new(&device, 3, &[64, 128, 64, 128]);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        let out = head.forward(dual_levels(&device), RunMode::Train, &mut state);
        match out {
            HeadOutput::Train(raw) => {
                assert_eq!(raw.groups.len(), 2);
                assert_eq!(raw.groups[0].len(), 2);
                assert_eq!(raw.groups[1].len(), 2);
            }
            _ => panic!("expected raw output"),
        }
    }

    #[test]
    fn eval_decodes_both_groups_with_shared_anchors() {
        let device = NdArrayDevice::default();
        let mut head = DualDDetect::<NdArray>::new(&device, 3, &[64, 128, 64, 128]);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        let out = head.forward(dual_levels(&device), RunMode::Eval, &mut state);
        match out {
            HeadOutput::Eval { pred, .. } => {
                assert_eq!(pred.len(), 2);
                assert_eq!(pred[0].dims(), [1, 7, 80]);
                assert_eq!(pred[1].dims(), [1, 7, 80]);
            }
            _ => panic!("expected decoded output"),
        }
        assert!(state.is_cached());
    }
}
