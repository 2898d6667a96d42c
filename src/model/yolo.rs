use anyhow::{bail, Context, Result};
use burn::module::Ignored;
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use std::path::Path;

use crate::config::ModelSpec;
use crate::graph::{build_graph, BuiltGraph, GraphMeta, SourceRef};
use crate::model::heads::{Head, HeadOutput, HeadState, RunMode};
use crate::model::layer::{Layer, LayerOutput};
use crate::model::nms::{Detection, NMS};

/// Input resolution of the zero-tensor probe used to derive per-level
/// strides from feature-map heights.
const PROBE_SIZE: usize = 256;

/// A detection/segmentation model built from a declarative spec: a layer
/// graph with save-list bookkeeping, terminated by one of the head variants.
#[derive(Module, Debug)]
pub struct DetectionModel<B: Backend> {
    layers: Vec<Layer<B>>,
    head: Head<B>,
    meta: Ignored<GraphMeta>,
}

impl<B: Backend> DetectionModel<B> {
    /// Build from a spec, then probe-forward a zeros input to derive the
    /// per-level strides and store them on the head.
    pub fn new(
        spec: &ModelSpec,
        in_channels: usize,
        nc_override: Option<usize>,
        device: &B::Device,
    ) -> Result<Self> {
        let mut spec = spec.clone();
        if let Some(nc) = nc_override {
            if nc != spec.nc {
                log::info!("overriding model spec nc={} with nc={}", spec.nc, nc);
                spec.nc = nc;
            }
        }

        let BuiltGraph { layers, head, meta } = build_graph::<B>(&spec, in_channels, device)?;
        let mut model = Self {
            layers,
            head,
            meta: Ignored(meta),
        };
        model.init_strides(in_channels, device)?;
        Ok(model)
    }

    pub fn head(&self) -> &Head<B> {
        &self.head
    }

    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    fn init_strides(&mut self, in_channels: usize, device: &B::Device) -> Result<()> {
        let probe = Tensor::zeros([1, in_channels, PROBE_SIZE, PROBE_SIZE], device);
        let mut state = HeadState::new();
        let raw = match self.forward(probe, RunMode::Train, &mut state) {
            HeadOutput::Train(raw) => raw,
            _ => bail!("train-mode probe produced a decoded output"),
        };
        let first = match raw.groups.first() {
            Some(levels) if !levels.is_empty() => levels,
            _ => bail!("probe forward produced no feature levels"),
        };
        let strides: Vec<usize> = first
            .iter()
            .map(|level| PROBE_SIZE / level.dims()[2])
            .collect();
        log::debug!("derived per-level strides {:?}", strides);
        self.head.set_strides(strides);
        Ok(())
    }

    /// Iterate layers, resolving fan-in from the save store, then run the
    /// head on its recorded source slots.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        mode: RunMode,
        state: &mut HeadState<B>,
    ) -> HeadOutput<B> {
        let meta = &self.meta.0;
        let mut saved: Vec<Option<LayerOutput<B>>> = vec![None; meta.total_slots];
        let mut running = LayerOutput::Single(x);

        for (layer, lm) in self.layers.iter().zip(meta.layers.iter()) {
            let inputs: Vec<LayerOutput<B>> = lm
                .from
                .iter()
                .map(|src| fetch(src, &running, &saved))
                .collect();
            let out = layer.forward(inputs);

            if lm.slot_count == 1 {
                if meta.save.binary_search(&lm.slot_base).is_ok() {
                    saved[lm.slot_base] = Some(out.clone());
                }
                running = out;
            } else {
                // Multi-output layers fill their padded slot range back to
                // front; the running output is the coarsest level.
                let feats = out.into_multi();
                let pad = lm.slot_count - feats.len();
                for (j, feat) in feats.iter().enumerate() {
                    let slot = lm.slot_base + pad + j;
                    if meta.save.binary_search(&slot).is_ok() {
                        saved[slot] = Some(LayerOutput::Single(feat.clone()));
                    }
                }
                running = match feats.into_iter().last() {
                    Some(feat) => LayerOutput::Single(feat),
                    None => panic!("multi-output layer produced no tensors"),
                };
            }
        }

        let head_inputs: Vec<Tensor<B, 4>> = meta
            .head_from
            .iter()
            .map(|src| fetch(src, &running, &saved).into_single())
            .collect();
        self.head.forward(head_inputs, mode, state)
    }

    /// Eval-mode forward, confidence filter and class-aware NMS. Detections
    /// come back in center format with class id and confidence.
    pub fn predict(
        &self,
        x: Tensor<B, 4>,
        conf_threshold: f32,
        iou_threshold: f32,
        state: &mut HeadState<B>,
    ) -> Vec<Detection> {
        let pred = match self.forward(x, RunMode::Eval, state) {
            HeadOutput::Eval { pred, .. } => pred,
            _ => return Vec::new(),
        };
        let pred = match pred.into_iter().next() {
            Some(p) => p,
            None => return Vec::new(),
        };

        let [_, _, anchors] = pred.dims();
        let nc = self.head.num_classes();
        let data: Vec<f32> = pred.into_data().convert::<f32>().to_vec().unwrap();

        let mut detections = Vec::new();
        for a in 0..anchors {
            let mut best_class = 0;
            let mut best_score = 0.0f32;
            for c in 0..nc {
                let score = data[(4 + c) * anchors + a];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }

            if best_score < conf_threshold {
                continue;
            }

            detections.push(Detection {
                x: data[a],
                y: data[anchors + a],
                w: data[2 * anchors + a],
                h: data[3 * anchors + a],
                confidence: best_score,
                class_id: best_class,
            });
        }

        NMS::apply(detections, iou_threshold, conf_threshold)
    }

    pub fn save_weights(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(self.clone().into_record(), path.to_path_buf())
            .with_context(|| format!("failed to save model record to {}", path.display()))?;
        Ok(())
    }

    pub fn load_weights(self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self> {
        let path = path.as_ref();
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(path.to_path_buf(), device)
            .with_context(|| format!("failed to load model record from {}", path.display()))?;
        Ok(self.load_record(record))
    }
}

fn fetch<B: Backend>(
    src: &SourceRef,
    running: &LayerOutput<B>,
    saved: &[Option<LayerOutput<B>>],
) -> LayerOutput<B> {
    match src {
        SourceRef::Prev => running.clone(),
        SourceRef::Slot(i) => match &saved[*i] {
            Some(out) => out.clone(),
            None => panic!("slot {} was not retained for fan-in", i),
        },
    }
}
