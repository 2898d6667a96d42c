use burn::prelude::*;

use super::{coeff_levels, pred_stacks, DDetect, Detect, DualDDetect, HeadOutput, HeadState,
    PredStack, RawOutput, RunMode};
use crate::model::blocks::{Conv, Proto};

fn coeff_branch_width(ch0: usize, nm: usize) -> usize {
    (ch0 / 4).max(nm)
}

/// Detection head extended with per-level mask-coefficient stacks and a
/// shared prototype-mask branch fed from the first input level.
#[derive(Module, Debug)]
pub struct Segment<B: Backend> {
    detect: Detect<B>,
    proto: Proto<B>,
    cv4: Vec<PredStack<B>>,
    nm: usize,
}

impl<B: Backend> Segment<B> {
    pub fn new(device: &B::Device, nc: usize, nm: usize, npr: usize, ch: &[usize]) -> Self {
        let c4 = coeff_branch_width(ch[0], nm);

        Self {
            detect: Detect::new(device, nc, ch),
            proto: Proto::new(device, ch[0], npr, nm),
            cv4: pred_stacks(device, ch, c4, nm, 1),
            nm,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.detect.num_classes()
    }

    pub fn num_levels(&self) -> usize {
        self.detect.num_levels()
    }

    pub fn num_masks(&self) -> usize {
        self.nm
    }

    pub fn set_strides(&mut self, strides: Vec<usize>) {
        self.detect.set_strides(strides);
    }

    pub fn forward(
        &self,
        xs: Vec<Tensor<B, 4>>,
        mode: RunMode,
        state: &mut HeadState<B>,
    ) -> HeadOutput<B> {
        let proto = self.proto.forward(xs[0].clone());
        let coeffs = coeff_levels(&self.cv4, &xs);
        let raw = self.detect.raw_levels(&xs);

        if mode == RunMode::Train {
            return HeadOutput::Train(RawOutput {
                groups: vec![raw],
                mask_coeffs: vec![coeffs],
                protos: vec![proto],
                semantic: None,
            });
        }

        let decoded = self.detect.decode(&raw, state);
        let pred = Tensor::cat(vec![decoded, coeffs.clone()], 1);
        match mode {
            RunMode::Export => HeadOutput::Export {
                pred: vec![pred],
                protos: vec![proto],
                semantic: None,
            },
            _ => HeadOutput::Eval {
                pred: vec![pred],
                raw: RawOutput {
                    groups: vec![raw],
                    mask_coeffs: vec![coeffs],
                    protos: vec![proto],
                    semantic: None,
                },
            },
        }
    }
}

/// Grouped-conv segmentation head. The detection core runs over all inputs
/// but the last, which feeds a 1x1 conv prototype branch instead.
#[derive(Module, Debug)]
pub struct DSegment<B: Backend> {
    detect: DDetect<B>,
    proto: Conv<B>,
    cv4: Vec<PredStack<B>>,
    nm: usize,
}

impl<B: Backend> DSegment<B> {
    pub fn new(device: &B::Device, nc: usize, nm: usize, _npr: usize, ch: &[usize]) -> Self {
        assert!(ch.len() >= 2, "grouped segmentation head needs detection levels plus a prototype input");
        let det_ch = &ch[..ch.len() - 1];
        let c4 = coeff_branch_width(ch[0], nm);

        Self {
            detect: DDetect::new(device, nc, det_ch),
            proto: Conv::new(device, ch[ch.len() - 1], nm, 1, 1),
            cv4: pred_stacks(device, det_ch, c4, nm, 1),
            nm,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.detect.num_classes()
    }

    pub fn num_levels(&self) -> usize {
        self.detect.num_levels()
    }

    pub fn num_masks(&self) -> usize {
        self.nm
    }

    pub fn set_strides(&mut self, strides: Vec<usize>) {
        self.detect.set_strides(strides);
    }

    pub fn forward(
        &self,
        xs: Vec<Tensor<B, 4>>,
        mode: RunMode,
        state: &mut HeadState<B>,
    ) -> HeadOutput<B> {
        let nl = self.detect.num_levels();
        let proto = self.proto.forward(xs[xs.len() - 1].clone());
        let coeffs = coeff_levels(&self.cv4, &xs[..nl]);
        let raw = self.detect.raw_levels(&xs[..nl]);

        if mode == RunMode::Train {
            return HeadOutput::Train(RawOutput {
                groups: vec![raw],
                mask_coeffs: vec![coeffs],
                protos: vec![proto],
                semantic: None,
            });
        }

        let decoded = self.detect.decode(&raw, state);
        let pred = Tensor::cat(vec![decoded, coeffs.clone()], 1);
        match mode {
            RunMode::Export => HeadOutput::Export {
                pred: vec![pred],
                protos: vec![proto],
                semantic: None,
            },
            _ => HeadOutput::Eval {
                pred: vec![pred],
                raw: RawOutput {
                    groups: vec![raw],
                    mask_coeffs: vec![coeffs],
                    protos: vec![proto],
                    semantic: None,
                },
            },
        }
    }
}

/// Dual-branch grouped segmentation head: a [`DualDDetect`] core over all
/// inputs but the last two, which feed one prototype conv each. Inference
/// reports the second branch group only.
#[derive(Module, Debug)]
pub struct DualDSegment<B: Backend> {
    detect: DualDDetect<B>,
    proto: Conv<B>,
    proto2: Conv<B>,
    cv6: Vec<PredStack<B>>,
    cv7: Vec<PredStack<B>>,
    nm: usize,
}

impl<B: Backend> DualDSegment<B> {
    pub fn new(device: &B::Device, nc: usize, nm: usize, _npr: usize, ch: &[usize]) -> Self {
        assert!(
            ch.len() >= 4 && (ch.len() - 2) % 2 == 0,
            "dual segmentation head needs paired detection levels plus two prototype inputs"
        );
        let det_ch = &ch[..ch.len() - 2];
        let nl = det_ch.len() / 2;
        let c6 = coeff_branch_width(ch[0], nm);
        let c7 = coeff_branch_width(ch[nl], nm);

        Self {
            detect: DualDDetect::new(device, nc, det_ch),
            proto: Conv::new(device, ch[ch.len() - 2], nm, 1, 1),
            proto2: Conv::new(device, ch[ch.len() - 1], nm, 1, 1),
            cv6: pred_stacks(device, &det_ch[..nl], c6, nm, 1),
            cv7: pred_stacks(device, &det_ch[nl..], c7, nm, 1),
            nm,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.detect.num_classes()
    }

    pub fn num_levels(&self) -> usize {
        self.detect.num_levels()
    }

    pub fn num_masks(&self) -> usize {
        self.nm
    }

    pub fn set_strides(&mut self, strides: Vec<usize>) {
        self.detect.set_strides(strides);
    }

    pub fn forward(
        &self,
        xs: Vec<Tensor<B, 4>>,
        mode: RunMode,
        state: &mut HeadState<B>,
    ) -> HeadOutput<B> {
        let nl = self.detect.num_levels();
        let det_inputs = &xs[..xs.len() - 2];
        let proto1 = self.proto.forward(xs[xs.len() - 2].clone());
        let proto2 = self.proto2.forward(xs[xs.len() - 1].clone());
        let coeffs1 = coeff_levels(&self.cv6, &det_inputs[..nl]);
        let coeffs2 = coeff_levels(&self.cv7, &det_inputs[nl..]);
        let (d1, d2) = self.detect.branch_groups(det_inputs);

        if mode == RunMode::Train {
            return HeadOutput::Train(RawOutput {
                groups: vec![d1, d2],
                mask_coeffs: vec![coeffs1, coeffs2],
                protos: vec![proto1, proto2],
                semantic: None,
            });
        }

        let (_, y2) = self.detect.decode_groups(&d1, &d2, state);
        let pred = Tensor::cat(vec![y2, coeffs2.clone()], 1);
        match mode {
            RunMode::Export => HeadOutput::Export {
                pred: vec![pred],
                protos: vec![proto2],
                semantic: None,
            },
            _ => HeadOutput::Eval {
                pred: vec![pred],
                raw: RawOutput {
                    groups: vec![d2],
                    mask_coeffs: vec![coeffs2],
                    protos: vec![proto2],
                    semantic: None,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn segment_train_emits_coeffs_and_protos() {
        let device = NdArrayDevice::default();
        let mut head = Segment::<NdArray>::new(&device, 4, 8, 16, &[64, 128]);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        let xs = vec![
            Tensor::zeros([1, 64, 8, 8], &device),
            Tensor::zeros([1, 128, 4, 4], &device),
        ];
        let out = head.forward(xs, RunMode::Train, &mut state);
        match out {
            HeadOutput::Train(raw) => {
                assert_eq!(raw.groups.len(), 1);
                assert_eq!(raw.mask_coeffs[0].dims(), [1, 8, 80]);
                // Proto branch upsamples the first level by 2.
                assert_eq!(raw.protos[0].dims(), [1, 8, 16, 16]);
            }
            _ => panic!("expected raw output"),
        }
    }

    #[test]
    fn segment_eval_appends_coeffs_to_channel_axis() {
        let device = NdArrayDevice::default();
        let mut head = Segment::<NdArray>::new(&device, 4, 8, 16, &[64, 128]);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        let xs = vec![
            Tensor::zeros([1, 64, 8, 8], &device),
            Tensor::zeros([1, 128, 4, 4], &device),
        ];
        let out = head.forward(xs, RunMode::Eval, &mut state);
        match out {
            HeadOutput::Eval { pred, .. } => {
                // 4 box + 4 classes + 8 mask coefficients.
                assert_eq!(pred[0].dims(), [1, 16, 80]);
            }
            _ => panic!("expected decoded output"),
        }
    }

    #[test]
    fn dual_segment_eval_reports_second_group() {
        let device = NdArrayDevice::default();
        let ch = [64, 128, 64, 128, 64, 64];
        let mut head = DualDSegment::<NdArray>::new(&device, 3, 8, 16, &ch);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        let xs = vec![
            Tensor::zeros([1, 64, 8, 8], &device),
            Tensor::zeros([1, 128, 4, 4], &device),
            Tensor::zeros([1, 64, 8, 8], &device),
            Tensor::zeros([1, 128, 4, 4], &device),
            Tensor::zeros([1, 64, 8, 8], &device),
            Tensor::zeros([1, 64, 8, 8], &device),
        ];

        let train = head.forward(xs.clone(), RunMode::Train, &mut state);
        match train {
            HeadOutput::Train(raw) => {
                assert_eq!(raw.groups.len(), 2);
                assert_eq!(raw.mask_coeffs.len(), 2);
                assert_eq!(raw.protos.len(), 2);
            }
            _ => panic!("expected raw output"),
        }

        let eval = head.forward(xs, RunMode::Eval, &mut state);
        match eval {
            HeadOutput::Eval { pred, raw } => {
                assert_eq!(pred.len(), 1);
                // 4 box + 3 classes + 8 coefficients.
                assert_eq!(pred[0].dims(), [1, 15, 80]);
                assert_eq!(raw.groups.len(), 1);
                assert_eq!(raw.protos.len(), 1);
            }
            _ => panic!("expected decoded output"),
        }
    }
}
