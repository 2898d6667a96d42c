//! Declarative-config graph builder: interprets a [`ModelSpec`] layer list
//! into live modules with channel-width bookkeeping, fan-in resolution and
//! save-list tracking for skip connections.

use anyhow::{anyhow, bail, Context, Result};
use burn::prelude::*;
use serde_yaml::Value;
use std::collections::BTreeSet;

use crate::config::{LayerDef, ModelSpec};
use crate::model::blocks::{
    AConv, ADown, CBFuse, CBLinear, CSPBackbone, Concat, Conv, RepNCSPELAN4, Shortcut, Silence,
    Upsample2d, ELAN1, SPPELAN,
};
use crate::model::heads::{
    DDetect, DSegment, Detect, DualDDetect, DualDSegment, DualDetect, Head, Panoptic, Segment,
    TripleDDetect, TripleDetect,
};
use crate::model::layer::Layer;

/// Pyramid extractors are padded at the front to this many output slots so
/// that configs can address their levels uniformly.
pub const BACKBONE_LEVELS: usize = 5;

/// Round a scaled channel count up to the nearest multiple of `divisor`.
pub fn make_divisible(x: f64, divisor: usize) -> usize {
    (x / divisor as f64).ceil() as usize * divisor
}

/// Depth gain: repeats above one are scaled by the global depth multiplier.
pub fn scaled_repeats(n: usize, depth_multiple: f64) -> usize {
    if n > 1 {
        ((n as f64 * depth_multiple).round() as usize).max(1)
    } else {
        n
    }
}

/// Where a layer reads its input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRef {
    /// The running output of the previous layer.
    Prev,
    /// A saved slot, by absolute index.
    Slot(usize),
}

/// Output-channel record for one graph slot.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotWidth {
    Single(usize),
    /// A tensor-list slot (CBLinear), consumed whole by CBFuse.
    List(Vec<usize>),
    /// Front padding of a pyramid extractor; has no output.
    Placeholder,
}

/// Build-time metadata for one layer, consulted on every forward pass.
#[derive(Debug, Clone)]
pub struct LayerMeta {
    pub from: Vec<SourceRef>,
    pub slot_base: usize,
    pub slot_count: usize,
    pub kind: String,
}

/// Graph-wide metadata: per-layer records, the head's fan-in, and the sorted
/// save-list of slots retained during forward.
#[derive(Debug, Clone)]
pub struct GraphMeta {
    pub layers: Vec<LayerMeta>,
    pub head_from: Vec<SourceRef>,
    pub save: Vec<usize>,
    pub total_slots: usize,
}

/// A fully built layer graph, ready for model assembly.
pub struct BuiltGraph<B: Backend> {
    pub layers: Vec<Layer<B>>,
    pub head: Head<B>,
    pub meta: GraphMeta,
}

pub fn build_graph<B: Backend>(
    spec: &ModelSpec,
    in_channels: usize,
    device: &B::Device,
) -> Result<BuiltGraph<B>> {
    Builder {
        spec,
        in_channels,
        slots: Vec::new(),
        save: BTreeSet::new(),
    }
    .build(device)
}

struct Builder<'a> {
    spec: &'a ModelSpec,
    in_channels: usize,
    slots: Vec<SlotWidth>,
    save: BTreeSet<usize>,
}

impl<'a> Builder<'a> {
    fn build<B: Backend>(mut self, device: &B::Device) -> Result<BuiltGraph<B>> {
        let defs: Vec<&LayerDef> = self.spec.layers().collect();
        if defs.is_empty() {
            bail!("model spec has no layers");
        }

        log::debug!("{:>3} {:>14} {:>3}  {:<16} args", "idx", "from", "n", "module");

        let mut layers = Vec::new();
        let mut metas = Vec::new();
        let mut head = None;

        for (index, def) in defs.iter().enumerate() {
            let kind = def.module();
            let is_last = index + 1 == defs.len();
            let from = self.resolve_from(def)?;
            let repeats = scaled_repeats(def.repeats(), self.spec.depth_multiple);

            log::debug!(
                "{:>3} {:>14} {:>3}  {:<16} {:?}",
                index,
                format!("{:?}", def.from().indices()),
                repeats,
                kind,
                def.args()
            );

            if is_head_kind(kind) {
                if !is_last {
                    bail!("head module {} must be the final layer (layer {})", kind, index);
                }
                let built = self
                    .build_head(kind, def.args(), &from, device)
                    .with_context(|| format!("layer {} ({})", index, kind))?;
                for src in &from {
                    if let SourceRef::Slot(slot) = src {
                        self.save.insert(*slot);
                    }
                }
                head = Some((built, from));
                continue;
            }
            if is_last {
                bail!("final layer must be a detection head, got {}", kind);
            }

            let slot_base = self.slots.len();
            let (layer, widths) = self
                .build_layer(kind, def.args(), &from, repeats, device)
                .with_context(|| format!("layer {} ({})", index, kind))?;

            for src in &from {
                if let SourceRef::Slot(slot) = src {
                    self.save.insert(*slot);
                }
            }

            let slot_count = widths.len();
            self.slots.extend(widths);
            layers.push(layer);
            metas.push(LayerMeta {
                from,
                slot_base,
                slot_count,
                kind: kind.to_string(),
            });
        }

        let (head, head_from) = head.ok_or_else(|| anyhow!("model spec has no detection head"))?;

        Ok(BuiltGraph {
            layers,
            head,
            meta: GraphMeta {
                layers: metas,
                head_from,
                save: self.save.iter().copied().collect(),
                total_slots: self.slots.len(),
            },
        })
    }

    /// Resolve a layer's `from` field to concrete sources against the current
    /// slot count.
    fn resolve_from(&self, def: &LayerDef) -> Result<Vec<SourceRef>> {
        def.from()
            .indices()
            .into_iter()
            .map(|f| {
                if f == -1 {
                    return Ok(SourceRef::Prev);
                }
                let abs = if f < 0 {
                    let back = (-f) as usize;
                    self.slots
                        .len()
                        .checked_sub(back)
                        .ok_or_else(|| anyhow!("from index {} reaches before the graph start", f))?
                } else {
                    f as usize
                };
                if abs >= self.slots.len() {
                    bail!(
                        "from index {} resolves to slot {} but only {} slots exist",
                        f,
                        abs,
                        self.slots.len()
                    );
                }
                Ok(SourceRef::Slot(abs))
            })
            .collect()
    }

    /// Single-tensor width of a source slot.
    fn width(&self, src: &SourceRef) -> Result<usize> {
        let slot = match src {
            SourceRef::Prev => {
                if self.slots.is_empty() {
                    return Ok(self.in_channels);
                }
                &self.slots[self.slots.len() - 1]
            }
            SourceRef::Slot(i) => &self.slots[*i],
        };
        match slot {
            SlotWidth::Single(w) => Ok(*w),
            SlotWidth::List(_) => bail!("source is a tensor list; only CBFuse can consume it"),
            SlotWidth::Placeholder => bail!("source slot is backbone padding with no output"),
        }
    }

    fn list_width(&self, src: &SourceRef) -> Result<Vec<usize>> {
        let slot = match src {
            SourceRef::Prev => self
                .slots
                .last()
                .ok_or_else(|| anyhow!("no previous layer to read a tensor list from"))?,
            SourceRef::Slot(i) => &self.slots[*i],
        };
        match slot {
            SlotWidth::List(ws) => Ok(ws.clone()),
            _ => bail!("source slot is not a tensor list"),
        }
    }

    fn scaled_width(&self, args: &[Value], idx: usize) -> Result<usize> {
        let raw = arg_usize(args, idx, None, self.spec.nc)?;
        Ok(make_divisible(raw as f64 * self.spec.width_multiple, 8))
    }

    fn build_layer<B: Backend>(
        &self,
        kind: &str,
        args: &[Value],
        from: &[SourceRef],
        repeats: usize,
        device: &B::Device,
    ) -> Result<(Layer<B>, Vec<SlotWidth>)> {
        let nc = self.spec.nc;
        let single_in = |from: &[SourceRef]| -> Result<usize> {
            if from.len() != 1 {
                bail!("{} takes exactly one source, got {}", kind, from.len());
            }
            self.width(&from[0])
        };

        let (layer, widths) = match kind {
            "Conv" => {
                let c1 = single_in(from)?;
                let c2 = self.scaled_width(args, 0)?;
                let k = arg_usize(args, 1, Some(1), nc)?;
                let s = arg_usize(args, 2, Some(1), nc)?;
                let layer = self.repeated(repeats, c1, c2, |cin| {
                    Layer::Conv(Conv::new(device, cin, c2, k, s))
                });
                (layer, vec![SlotWidth::Single(c2)])
            }
            "AConv" => {
                let c1 = single_in(from)?;
                let c2 = self.scaled_width(args, 0)?;
                let layer =
                    self.repeated(repeats, c1, c2, |cin| Layer::AConv(AConv::new(device, cin, c2)));
                (layer, vec![SlotWidth::Single(c2)])
            }
            "ADown" => {
                let c1 = single_in(from)?;
                let c2 = self.scaled_width(args, 0)?;
                let layer =
                    self.repeated(repeats, c1, c2, |cin| Layer::ADown(ADown::new(device, cin, c2)));
                (layer, vec![SlotWidth::Single(c2)])
            }
            "ELAN1" => {
                let c1 = single_in(from)?;
                let c2 = self.scaled_width(args, 0)?;
                let c3 = arg_usize(args, 1, None, nc)?;
                let c4 = arg_usize(args, 2, None, nc)?;
                let layer = self.repeated(repeats, c1, c2, |cin| {
                    Layer::Elan1(ELAN1::new(device, cin, c2, c3, c4))
                });
                (layer, vec![SlotWidth::Single(c2)])
            }
            "RepNCSPELAN4" => {
                let c1 = single_in(from)?;
                let c2 = self.scaled_width(args, 0)?;
                let c3 = arg_usize(args, 1, None, nc)?;
                let c4 = arg_usize(args, 2, None, nc)?;
                let n = arg_usize(args, 3, Some(1), nc)?;
                let layer = self.repeated(repeats, c1, c2, |cin| {
                    Layer::RepElan(RepNCSPELAN4::new(device, cin, c2, c3, c4, n))
                });
                (layer, vec![SlotWidth::Single(c2)])
            }
            "SPPELAN" => {
                let c1 = single_in(from)?;
                let c2 = self.scaled_width(args, 0)?;
                let c3 = arg_usize(args, 1, None, nc)?;
                let layer = self.repeated(repeats, c1, c2, |cin| {
                    Layer::SppElan(SPPELAN::new(device, cin, c2, c3))
                });
                (layer, vec![SlotWidth::Single(c2)])
            }
            "Upsample" | "nn.Upsample" => {
                let c1 = single_in(from)?;
                let scale = upsample_scale(args)?;
                (
                    Layer::Upsample(Upsample2d::new(scale)),
                    vec![SlotWidth::Single(c1)],
                )
            }
            "Concat" => {
                let dim = arg_usize(args, 0, Some(1), nc)?;
                if dim != 1 {
                    bail!("Concat only supports the channel axis, got dim {}", dim);
                }
                let mut total = 0;
                for src in from {
                    total += self.width(src)?;
                }
                (Layer::Concat(Concat::new()), vec![SlotWidth::Single(total)])
            }
            "Shortcut" => {
                if from.is_empty() {
                    bail!("Shortcut needs at least one source");
                }
                let c2 = self.width(&from[0])?;
                (Layer::Shortcut(Shortcut::new()), vec![SlotWidth::Single(c2)])
            }
            "CBLinear" => {
                let c1 = single_in(from)?;
                let c2s = arg_usize_list(args, 0)?;
                let k = arg_usize(args, 1, Some(1), nc)?;
                (
                    Layer::CbLinear(CBLinear::new(device, c1, c2s.clone(), k)),
                    vec![SlotWidth::List(c2s)],
                )
            }
            "CBFuse" => {
                if from.len() < 2 {
                    bail!("CBFuse needs at least one list source and one plain source");
                }
                let idx = arg_usize_list(args, 0)?;
                if idx.len() != from.len() - 1 {
                    bail!(
                        "CBFuse got {} indices for {} list sources",
                        idx.len(),
                        from.len() - 1
                    );
                }
                for (i, src) in from[..from.len() - 1].iter().enumerate() {
                    let widths = self.list_width(src)?;
                    if idx[i] >= widths.len() {
                        bail!(
                            "CBFuse index {} out of range for a {}-way source",
                            idx[i],
                            widths.len()
                        );
                    }
                }
                let c2 = self.width(&from[from.len() - 1])?;
                (Layer::CbFuse(CBFuse::new(idx)), vec![SlotWidth::Single(c2)])
            }
            "CSPBackbone" => {
                let c1 = single_in(from)?;
                let stage_widths = arg_usize_list(args, 0)?;
                if stage_widths.len() > BACKBONE_LEVELS {
                    bail!(
                        "backbone emits {} levels, at most {} supported",
                        stage_widths.len(),
                        BACKBONE_LEVELS
                    );
                }
                let mut widths = vec![SlotWidth::Placeholder; BACKBONE_LEVELS - stage_widths.len()];
                widths.extend(stage_widths.iter().map(|&w| SlotWidth::Single(w)));
                (
                    Layer::Backbone(CSPBackbone::new(device, c1, &stage_widths)),
                    widths,
                )
            }
            "Silence" => {
                let c1 = single_in(from)?;
                (Layer::Silence(Silence::new()), vec![SlotWidth::Single(c1)])
            }
            _ => bail!("unknown module type {}", kind),
        };

        Ok((layer, widths))
    }

    /// A repeat stack chains the module with itself, so every repeat after the
    /// first maps the output width back onto itself.
    fn repeated<B: Backend>(
        &self,
        repeats: usize,
        c1: usize,
        c2: usize,
        build: impl Fn(usize) -> Layer<B>,
    ) -> Layer<B> {
        if repeats <= 1 {
            return build(c1);
        }
        let mut stack = Vec::with_capacity(repeats);
        stack.push(build(c1));
        for _ in 1..repeats {
            stack.push(build(c2));
        }
        Layer::Stack(stack)
    }

    fn build_head<B: Backend>(
        &self,
        kind: &str,
        args: &[Value],
        from: &[SourceRef],
        device: &B::Device,
    ) -> Result<Head<B>> {
        let mut ch = Vec::with_capacity(from.len());
        for src in from {
            ch.push(self.width(src)?);
        }
        if ch.is_empty() {
            bail!("head has no input levels");
        }

        let nc = arg_usize(args, 0, Some(self.spec.nc), self.spec.nc)?;
        let head = match kind {
            "Detect" => Head::Detect(Detect::new(device, nc, &ch)),
            "DDetect" => Head::DDetect(DDetect::new(device, nc, &ch)),
            "DualDetect" => {
                ensure_group(kind, ch.len(), 2)?;
                Head::DualDetect(DualDetect::new(device, nc, &ch))
            }
            "DualDDetect" => {
                ensure_group(kind, ch.len(), 2)?;
                Head::DualDDetect(DualDDetect::new(device, nc, &ch))
            }
            "TripleDetect" => {
                ensure_group(kind, ch.len(), 3)?;
                Head::TripleDetect(TripleDetect::new(device, nc, &ch))
            }
            "TripleDDetect" => {
                ensure_group(kind, ch.len(), 3)?;
                Head::TripleDDetect(TripleDDetect::new(device, nc, &ch))
            }
            "Segment" => {
                let nm = arg_usize(args, 1, Some(32), self.spec.nc)?;
                let npr = self.proto_width(args, 2)?;
                Head::Segment(Segment::new(device, nc, nm, npr, &ch))
            }
            "DSegment" => {
                let nm = arg_usize(args, 1, Some(32), self.spec.nc)?;
                let npr = self.proto_width(args, 2)?;
                if ch.len() < 2 {
                    bail!("DSegment needs detection levels plus a prototype input");
                }
                Head::DSegment(DSegment::new(device, nc, nm, npr, &ch))
            }
            "DualDSegment" => {
                let nm = arg_usize(args, 1, Some(32), self.spec.nc)?;
                let npr = self.proto_width(args, 2)?;
                if ch.len() < 4 || (ch.len() - 2) % 2 != 0 {
                    bail!("DualDSegment needs paired detection levels plus two prototype inputs");
                }
                Head::DualDSegment(DualDSegment::new(device, nc, nm, npr, &ch))
            }
            "Panoptic" => {
                let sem_nc = arg_usize(args, 1, Some(93), self.spec.nc)?;
                let nm = arg_usize(args, 2, Some(32), self.spec.nc)?;
                let npr = self.proto_width(args, 3)?;
                Head::Panoptic(Panoptic::new(device, nc, sem_nc, nm, npr, &ch))
            }
            _ => bail!("unknown head type {}", kind),
        };
        Ok(head)
    }

    /// Prototype channel count, width-scaled like any other module width.
    fn proto_width(&self, args: &[Value], idx: usize) -> Result<usize> {
        let raw = arg_usize(args, idx, Some(256), self.spec.nc)?;
        Ok(make_divisible(raw as f64 * self.spec.width_multiple, 8))
    }
}

fn ensure_group(kind: &str, levels: usize, groups: usize) -> Result<()> {
    if levels % groups != 0 {
        bail!(
            "{} needs input levels in multiples of {}, got {}",
            kind,
            groups,
            levels
        );
    }
    Ok(())
}

pub(crate) fn is_head_kind(kind: &str) -> bool {
    matches!(
        kind,
        "Detect"
            | "DDetect"
            | "DualDetect"
            | "DualDDetect"
            | "TripleDetect"
            | "TripleDDetect"
            | "Segment"
            | "DSegment"
            | "DualDSegment"
            | "Panoptic"
    )
}

fn arg_usize(args: &[Value], idx: usize, default: Option<usize>, nc: usize) -> Result<usize> {
    let value = match args.get(idx) {
        Some(v) => v,
        None => {
            return default.ok_or_else(|| anyhow!("missing argument {}", idx));
        }
    };
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| anyhow!("argument {} is not a non-negative integer: {}", idx, n)),
        Value::String(s) if s == "nc" => Ok(nc),
        other => bail!("argument {} is not an integer: {:?}", idx, other),
    }
}

fn arg_usize_list(args: &[Value], idx: usize) -> Result<Vec<usize>> {
    match args.get(idx) {
        Some(Value::Sequence(seq)) => seq
            .iter()
            .map(|v| match v {
                Value::Number(n) => n
                    .as_u64()
                    .map(|v| v as usize)
                    .ok_or_else(|| anyhow!("list entry is not a non-negative integer: {}", n)),
                other => bail!("list entry is not an integer: {:?}", other),
            })
            .collect(),
        Some(other) => bail!("argument {} is not a list: {:?}", idx, other),
        None => bail!("missing list argument {}", idx),
    }
}

/// Upsample rows may carry the `[None, scale, "nearest"]` form; the scale is
/// the first integer argument.
fn upsample_scale(args: &[Value]) -> Result<usize> {
    for value in args {
        if let Value::Number(n) = value {
            if let Some(scale) = n.as_u64() {
                return Ok(scale as usize);
            }
        }
    }
    bail!("upsample layer has no integer scale argument");
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    const DETECT_SPEC: &str = "
nc: 4
depth_multiple: 1.0
width_multiple: 1.0
backbone:
  - [-1, 1, Conv, [16, 3, 2]]
  - [-1, 1, Conv, [32, 3, 2]]
  - [-1, 1, RepNCSPELAN4, [32, 32, 16, 1]]
  - [-1, 1, AConv, [48]]
  - [-1, 1, RepNCSPELAN4, [48, 48, 24, 1]]
  - [-1, 1, AConv, [64]]
  - [-1, 1, RepNCSPELAN4, [64, 64, 32, 1]]
  - [-1, 1, AConv, [80]]
  - [-1, 1, SPPELAN, [80, 40]]
head:
  - [[4, 6, 8], 1, Detect, [nc]]
";

    #[test]
    fn builds_detect_graph_with_save_list() {
        let device = NdArrayDevice::default();
        let graph = build_graph::<NdArray>(
            &ModelSpec::from_yaml_str(DETECT_SPEC).unwrap(),
            3,
            &device,
        )
        .unwrap();

        assert_eq!(graph.layers.len(), 9);
        assert_eq!(graph.meta.total_slots, 9);
        assert_eq!(graph.meta.save, vec![4, 6, 8]);
        assert_eq!(graph.meta.head_from.len(), 3);
        assert!(matches!(graph.head, Head::Detect(_)));
        assert_eq!(graph.head.num_classes(), 4);
        assert_eq!(graph.head.num_levels(), 3);
    }

    #[test]
    fn width_multiplier_rounds_to_multiple_of_eight() {
        let device = NdArrayDevice::default();
        let spec = ModelSpec::from_yaml_str(
            "
nc: 2
width_multiple: 0.5
backbone:
  - [-1, 1, Conv, [100, 3, 2]]
head:
  - [-1, 1, Detect, [nc]]
",
        )
        .unwrap();
        let graph = build_graph::<NdArray>(&spec, 3, &device).unwrap();
        // 100 * 0.5 = 50 -> rounded up to 56.
        assert_eq!(graph.meta.layers.len(), 1);
        match &graph.head {
            Head::Detect(_) => {}
            _ => panic!("expected a plain Detect head"),
        }
        assert_eq!(make_divisible(50.0, 8), 56);
    }

    #[test]
    fn unknown_module_is_a_build_error() {
        let device = NdArrayDevice::default();
        let spec = ModelSpec::from_yaml_str(
            "
nc: 2
backbone:
  - [-1, 1, FrobnicateBlock, [64]]
head:
  - [-1, 1, Detect, [nc]]
",
        )
        .unwrap();
        let err = build_graph::<NdArray>(&spec, 3, &device).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown module type FrobnicateBlock"));
    }

    #[test]
    fn head_must_be_final_layer() {
        let device = NdArrayDevice::default();
        let spec = ModelSpec::from_yaml_str(
            "
nc: 2
backbone:
  - [-1, 1, Conv, [16, 3, 2]]
head:
  - [-1, 1, Detect, [nc]]
  - [-1, 1, Conv, [16, 3, 1]]
",
        )
        .unwrap();
        let err = build_graph::<NdArray>(&spec, 3, &device).unwrap_err();
        assert!(format!("{:#}", err).contains("final layer"));
    }

    #[test]
    fn out_of_range_from_is_a_build_error() {
        let device = NdArrayDevice::default();
        let spec = ModelSpec::from_yaml_str(
            "
nc: 2
backbone:
  - [-1, 1, Conv, [16, 3, 2]]
  - [7, 1, Conv, [16, 3, 1]]
head:
  - [-1, 1, Detect, [nc]]
",
        )
        .unwrap();
        let err = build_graph::<NdArray>(&spec, 3, &device).unwrap_err();
        assert!(format!("{:#}", err).contains("only 1 slots exist"));
    }

    #[test]
    fn backbone_pads_slots_and_shifts_indices() {
        let device = NdArrayDevice::default();
        let spec = ModelSpec::from_yaml_str(
            "
nc: 2
backbone:
  - [-1, 1, Silence, []]
  - [-1, 1, CSPBackbone, [[16, 32, 48]]]
head:
  - [[3, 4, 5], 1, Detect, [nc]]
",
        )
        .unwrap();
        let graph = build_graph::<NdArray>(&spec, 3, &device).unwrap();

        // Silence occupies slot 0, the backbone slots 1..=5 with two pads.
        assert_eq!(graph.meta.total_slots, 6);
        let backbone_meta = &graph.meta.layers[1];
        assert_eq!(backbone_meta.slot_base, 1);
        assert_eq!(backbone_meta.slot_count, 5);
        assert_eq!(graph.meta.save, vec![3, 4, 5]);
    }

    #[test]
    fn padded_backbone_slot_cannot_be_consumed() {
        let device = NdArrayDevice::default();
        let spec = ModelSpec::from_yaml_str(
            "
nc: 2
backbone:
  - [-1, 1, Silence, []]
  - [-1, 1, CSPBackbone, [[16, 32, 48]]]
head:
  - [[1, 4, 5], 1, Detect, [nc]]
",
        )
        .unwrap();
        let err = build_graph::<NdArray>(&spec, 3, &device).unwrap_err();
        assert!(format!("{:#}", err).contains("backbone padding"));
    }

    #[test]
    fn concat_width_is_sum_of_sources() {
        let device = NdArrayDevice::default();
        let spec = ModelSpec::from_yaml_str(
            "
nc: 2
backbone:
  - [-1, 1, Conv, [16, 3, 2]]
  - [-1, 1, Conv, [32, 3, 2]]
  - [[-1, 0], 1, Concat, [1]]
  - [-1, 1, Conv, [48, 3, 1]]
head:
  - [-1, 1, Detect, [nc]]
",
        )
        .unwrap();
        // Concat of 32 + 16 feeds a 48-wide conv; a mismatch would make the
        // conv constructor disagree with the ledger, so building is the check.
        let graph = build_graph::<NdArray>(&spec, 3, &device).unwrap();
        assert_eq!(graph.meta.save, vec![0]);
    }

    #[test]
    fn depth_multiplier_scales_repeats() {
        assert_eq!(scaled_repeats(3, 2.0), 6);
        assert_eq!(scaled_repeats(3, 0.33), 1);
        assert_eq!(scaled_repeats(1, 2.0), 1);
    }

    #[test]
    fn builds_shipped_gelan_config() {
        let device = NdArrayDevice::default();
        let spec =
            ModelSpec::from_yaml_str(include_str!("../configs/gelan.yaml")).unwrap();
        let graph = build_graph::<NdArray>(&spec, 3, &device).unwrap();

        assert_eq!(graph.meta.total_slots, 22);
        assert_eq!(graph.meta.head_from.len(), 3);
        assert!(matches!(graph.head, Head::Detect(_)));
        assert_eq!(graph.head.num_classes(), 80);
        assert!(graph.meta.save.contains(&15));
        assert!(graph.meta.save.contains(&21));
    }

    #[test]
    fn builds_shipped_dual_branch_config() {
        let device = NdArrayDevice::default();
        let spec =
            ModelSpec::from_yaml_str(include_str!("../configs/yolov9.yaml")).unwrap();
        let graph = build_graph::<NdArray>(&spec, 3, &device).unwrap();

        assert_eq!(graph.meta.total_slots, 38);
        assert_eq!(graph.meta.head_from.len(), 6);
        assert!(matches!(graph.head, Head::DualDDetect(_)));
        assert_eq!(graph.head.num_levels(), 3);
        // CBLinear slots feed the auxiliary fusion layers.
        for slot in [23, 24, 25] {
            assert!(graph.meta.save.contains(&slot));
        }
    }
}
