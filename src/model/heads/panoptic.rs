use burn::prelude::*;

use super::{coeff_levels, pred_stacks, Detect, HeadOutput, HeadState, PredStack, RawOutput,
    RunMode};
use crate::model::blocks::{Proto, UConv};

/// Panoptic head: instance segmentation plus a semantic branch over
/// `sem_nc + nc` channels, both fed from the first input level.
#[derive(Module, Debug)]
pub struct Panoptic<B: Backend> {
    detect: Detect<B>,
    proto: Proto<B>,
    uconv: UConv<B>,
    cv4: Vec<PredStack<B>>,
    nm: usize,
    sem_nc: usize,
}

impl<B: Backend> Panoptic<B> {
    pub fn new(
        device: &B::Device,
        nc: usize,
        sem_nc: usize,
        nm: usize,
        npr: usize,
        ch: &[usize],
    ) -> Self {
        let c4 = (ch[0] / 4).max(nm);

        Self {
            detect: Detect::new(device, nc, ch),
            proto: Proto::new(device, ch[0], npr, nm),
            uconv: UConv::new(device, ch[0], ch[0] / 4, sem_nc + nc),
            cv4: pred_stacks(device, ch, c4, nm, 1),
            nm,
            sem_nc,
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

    pub fn semantic_classes(&self) -> usize {
        self.sem_nc
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
        let semantic = self.uconv.forward(xs[0].clone());
        let coeffs = coeff_levels(&self.cv4, &xs);
        let raw = self.detect.raw_levels(&xs);

        if mode == RunMode::Train {
            return HeadOutput::Train(RawOutput {
                groups: vec![raw],
                mask_coeffs: vec![coeffs],
                protos: vec![proto],
                semantic: Some(semantic),
            });
        }

        let decoded = self.detect.decode(&raw, state);
        let pred = Tensor::cat(vec![decoded, coeffs.clone()], 1);
        match mode {
            RunMode::Export => HeadOutput::Export {
                pred: vec![pred],
                protos: vec![proto],
                semantic: Some(semantic),
            },
            _ => HeadOutput::Eval {
                pred: vec![pred],
                raw: RawOutput {
                    groups: vec![raw],
                    mask_coeffs: vec![coeffs],
                    protos: vec![proto],
                    semantic: Some(semantic),
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
    fn panoptic_train_carries_semantic_branch() {
        let device = NdArrayDevice::default();
        let mut head = Panoptic::<NdArray>::new(&device, 4, 9, 8, 16, &[64, 128]);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        let xs = vec![
            Tensor::zeros([1, 64, 8, 8], &device),
            Tensor::zeros([1, 128, 4, 4], &device),
        ];
        let out = head.forward(xs, RunMode::Train, &mut state);
        match out {
            HeadOutput::Train(raw) => {
                let semantic = raw.semantic.expect("semantic map missing");
                // sem_nc + nc channels, upsampled by 2.
                assert_eq!(semantic.dims(), [1, 13, 16, 16]);
                assert_eq!(raw.protos[0].dims(), [1, 8, 16, 16]);
            }
            _ => panic!("expected raw output"),
        }
    }

    #[test]
    fn panoptic_eval_decodes_with_coeffs() {
        let device = NdArrayDevice::default();
        let mut head = Panoptic::<NdArray>::new(&device, 4, 9, 8, 16, &[64, 128]);
        head.set_strides(vec![8, 16]);
        let mut state = HeadState::new();

        let xs = vec![
            Tensor::zeros([1, 64, 8, 8], &device),
            Tensor::zeros([1, 128, 4, 4], &device),
        ];
        let out = head.forward(xs, RunMode::Eval, &mut state);
        match out {
            HeadOutput::Eval { pred, raw } => {
                assert_eq!(pred[0].dims(), [1, 16, 80]);
                assert!(raw.semantic.is_some());
            }
            _ => panic!("expected decoded output"),
        }
    }
}
