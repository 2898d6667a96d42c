use burn::prelude::*;

use super::{
    box_branch_width, branch_levels, cls_branch_width, decode_group, pred_stacks, HeadOutput,
    HeadState, PredStack, RawOutput, RunMode, REG_MAX,
};
use crate::graph::make_divisible;
use crate::model::blocks::DFL;

/// Three branch groups over `3 * nl` inputs; inference decodes all three
/// against anchors from the first group.
#[derive(Module, Debug)]
pub struct TripleDetect<B: Backend> {
    cv2: Vec<PredStack<B>>,
    cv3: Vec<PredStack<B>>,
    cv4: Vec<PredStack<B>>,
    cv5: Vec<PredStack<B>>,
    cv6: Vec<PredStack<B>>,
    cv7: Vec<PredStack<B>>,
    dfl: DFL,
    dfl2: DFL,
    dfl3: DFL,
    nc: usize,
    reg_max: usize,
    nl: usize,
    strides: Vec<usize>,
}

impl<B: Backend> TripleDetect<B> {
    pub fn new(device: &B::Device, nc: usize, ch: &[usize]) -> Self {
        assert!(
            !ch.is_empty() && ch.len() % 3 == 0,
            "triple head needs input levels in multiples of three, got {}",
            ch.len()
        );
        let nl = ch.len() / 3;
        let c2 = box_branch_width(ch[0], REG_MAX);
        let c3 = cls_branch_width(ch[0], nc);
        let c4 = box_branch_width(ch[nl], REG_MAX);
        let c5 = cls_branch_width(ch[nl], nc);
        let c6 = box_branch_width(ch[nl * 2], REG_MAX);
        let c7 = cls_branch_width(ch[nl * 2], nc);

        Self {
            cv2: pred_stacks(device, &ch[..nl], c2, 4 * REG_MAX, 1),
            cv3: pred_stacks(device, &ch[..nl], c3, nc, 1),
            cv4: pred_stacks(device, &ch[nl..nl * 2], c4, 4 * REG_MAX, 1),
            cv5: pred_stacks(device, &ch[nl..nl * 2], c5, nc, 1),
            cv6: pred_stacks(device, &ch[nl * 2..], c6, 4 * REG_MAX, 1),
            cv7: pred_stacks(device, &ch[nl * 2..], c7, nc, 1),
            dfl: DFL::new(REG_MAX),
            dfl2: DFL::new(REG_MAX),
            dfl3: DFL::new(REG_MAX),
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
        let d2 = branch_levels(&self.cv4, &self.cv5, &xs[self.nl..self.nl * 2]);
        let d3 = branch_levels(&self.cv6, &self.cv7, &xs[self.nl * 2..]);
        if mode == RunMode::Train {
            return HeadOutput::Train(RawOutput::detection(vec![d1, d2, d3]));
        }

        let (anchors, strides) = state.anchors_for(&d1, &self.strides);
        let y1 = decode_group(&d1, &self.dfl, self.nc, self.reg_max, &anchors, &strides);
        let y2 = decode_group(&d2, &self.dfl2, self.nc, self.reg_max, &anchors, &strides);
        let y3 = decode_group(&d3, &self.dfl3, self.nc, self.reg_max, &anchors, &strides);

        match mode {
            RunMode::Export => HeadOutput::Export {
                pred: vec![y1, y2, y3],
                protos: Vec::new(),
                semantic: None,
            },
            _ => HeadOutput::Eval {
                pred: vec![y1, y2, y3],
                raw: RawOutput::detection(vec![d1, d2, d3]),
            },
        }
    }
}

/// Grouped-conv triple head. Unlike [`TripleDetect`], inference decodes and
/// reports only the third branch group.
#[derive(Module, Debug)]
pub struct TripleDDetect<B: Backend> {
    cv2: Vec<PredStack<B>>,
    cv3: Vec<PredStack<B>>,
    cv4: Vec<PredStack<B>>,
    cv5: Vec<PredStack<B>>,
    cv6: Vec<PredStack<B>>,
    cv7: Vec<PredStack<B>>,
    dfl3: DFL,
    nc: usize,
    reg_max: usize,
    nl: usize,
    strides: Vec<usize>,
}

impl<B: Backend> TripleDDetect<B> {
    pub fn new(device: &B::Device, nc: usize, ch: &[usize]) -> Self {
        assert!(
            !ch.is_empty() && ch.len() % 3 == 0,
            "triple head needs input levels in multiples of three, got {}",
            ch.len()
        );
        let nl = ch.len() / 3;
        let c2 = make_divisible(box_branch_width(ch[0], REG_MAX) as f64, 4);
        let c3 = cls_branch_width(ch[0], nc);
        let c4 = make_divisible(box_branch_width(ch[nl], REG_MAX) as f64, 4);
        let c5 = cls_branch_width(ch[nl], nc);
        let c6 = make_divisible(box_branch_width(ch[nl * 2], REG_MAX) as f64, 4);
        let c7 = cls_branch_width(ch[nl * 2], nc);

        Self {
            cv2: pred_stacks(device, &ch[..nl], c2, 4 * REG_MAX, 4),
            cv3: pred_stacks(device, &ch[..nl], c3, nc, 1),
            cv4: pred_stacks(device, &ch[nl..nl * 2], c4, 4 * REG_MAX, 4),
            cv5: pred_stacks(device, &ch[nl..nl * 2], c5, nc, 1),
            cv6: pred_stacks(device, &ch[nl * 2..], c6, 4 * REG_MAX, 4),
            cv7: pred_stacks(device, &ch[nl * 2..], c7, nc, 1),
            dfl3: DFL::new(REG_MAX),
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
        let d2 = branch_levels(&self.cv4, &self.cv5, &xs[self.nl..self.nl * 2]);
        let d3 = branch_levels(&self.cv6, &self.cv7, &xs[self.nl * 2..]);
        if mode == RunMode::Train {
            return HeadOutput::Train(RawOutput::detection(vec![d1, d2, d3]));
        }

        let (anchors, strides) = state.anchors_for(&d1, &self.strides);
        let y3 = decode_group(&d3, &self.dfl3, self.nc, self.reg_max, &anchors, &strides);

        match mode {
            RunMode::Export => HeadOutput::Export {
                pred: vec![y3],
                protos: Vec::new(),
                semantic: None,
            },
            _ => HeadOutput::Eval {
                pred: vec![y3],
                raw: RawOutput::detection(vec![d3]),
            },
        }
    }
}
