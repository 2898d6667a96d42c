//! Checkpoint key remapping: convert a trained dual-branch (auxiliary
//! supervision) checkpoint into the inference-only single-branch layout.
//!
//! The aux-branch layout inserts an identity entry layer, shifting every
//! body layer up by one, and hangs the inference branches of the dual head
//! off `cv4`/`cv5`/`dfl2` at a shifted head slot. Remapping is pure renaming
//! over `model.{i}.{rest}` parameter names; tensors are copied
//! byte-for-byte.

use anyhow::{Context, Result};
use safetensors::tensor::TensorView;
use safetensors::SafeTensors;
use std::path::Path;

/// Layout offsets between the donor (trained aux-branch) checkpoint and the
/// inference target.
#[derive(Debug, Clone)]
pub struct RemapConfig {
    /// Head slot index in the target layout.
    pub head_index: usize,
    /// How far aux-branch configs shift body layers up.
    pub body_offset: usize,
    /// How far the donor's head slot sits past the target's.
    pub head_offset: usize,
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            head_index: 22,
            body_offset: 1,
            head_offset: 16,
        }
    }
}

/// Outcome of remapping one donor key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMap {
    /// Renamed parameter in the target layout.
    Mapped(String),
    /// Auxiliary-branch parameter with no inference counterpart.
    Dropped,
    /// Not a recognizable `model.{i}.{rest}` parameter.
    Unknown,
}

/// Map one donor parameter name to its target name.
pub fn remap_key(key: &str, config: &RemapConfig) -> KeyMap {
    let Some((index, rest)) = split_key(key) else {
        return KeyMap::Unknown;
    };

    let donor_head = config.head_index + config.head_offset;
    if index >= config.body_offset && index - config.body_offset < config.head_index {
        // Body layer, shifted down by the aux entry offset.
        return KeyMap::Mapped(format!("model.{}.{}", index - config.body_offset, rest));
    }
    if index == donor_head {
        // Inference branches of the dual head fold back onto the plain head.
        for (donor_branch, target_branch) in [("cv4.", "cv2."), ("cv5.", "cv3."), ("dfl2.", "dfl.")]
        {
            if let Some(tail) = rest.strip_prefix(donor_branch) {
                return KeyMap::Mapped(format!(
                    "model.{}.{}{}",
                    config.head_index, target_branch, tail
                ));
            }
        }
        // The donor's own aux branches (cv2/cv3/dfl) are discarded.
        return KeyMap::Dropped;
    }
    if index < donor_head {
        // Entry layer and the auxiliary branch body.
        return KeyMap::Dropped;
    }
    KeyMap::Unknown
}

fn split_key(key: &str) -> Option<(usize, &str)> {
    let rest = key.strip_prefix("model.")?;
    let (index, tail) = rest.split_once('.')?;
    let index = index.parse::<usize>().ok()?;
    if tail.is_empty() {
        return None;
    }
    Some((index, tail))
}

/// Per-file remap counts. Unknown keys are reported by name.
#[derive(Debug, Default, Clone)]
pub struct RemapSummary {
    pub mapped: usize,
    pub dropped: usize,
    pub unknown: Vec<String>,
}

/// Remap a flat safetensors checkpoint file. Tensors are carried over
/// unchanged under their new names; aux-only tensors are dropped and keys
/// that do not fit the layout warn and skip.
pub fn remap_checkpoint(src: &Path, dst: &Path, config: &RemapConfig) -> Result<RemapSummary> {
    let bytes = std::fs::read(src)
        .with_context(|| format!("failed to read checkpoint {}", src.display()))?;
    let tensors = SafeTensors::deserialize(&bytes)
        .with_context(|| format!("invalid safetensors file {}", src.display()))?;

    let mut summary = RemapSummary::default();
    let mut out: Vec<(String, TensorView)> = Vec::new();

    for (name, view) in tensors.tensors() {
        match remap_key(&name, config) {
            KeyMap::Mapped(target) => {
                summary.mapped += 1;
                out.push((target, view));
            }
            KeyMap::Dropped => summary.dropped += 1,
            KeyMap::Unknown => {
                log::warn!("unrecognized checkpoint key {}, skipping", name);
                summary.unknown.push(name);
            }
        }
    }

    safetensors::serialize_to_file(out, &None, dst)
        .with_context(|| format!("failed to write checkpoint {}", dst.display()))?;

    log::info!(
        "remapped {} tensors, dropped {}, {} unknown",
        summary.mapped,
        summary.dropped,
        summary.unknown.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetensors::Dtype;

    #[test]
    fn body_layers_shift_down_by_one() {
        let config = RemapConfig::default();
        assert_eq!(
            remap_key("model.1.conv.weight", &config),
            KeyMap::Mapped("model.0.conv.weight".to_string())
        );
        assert_eq!(
            remap_key("model.22.cv1.bn.bias", &config),
            KeyMap::Mapped("model.21.cv1.bn.bias".to_string())
        );
    }

    #[test]
    fn donor_head_branches_fold_back() {
        let config = RemapConfig::default();
        assert_eq!(
            remap_key("model.38.cv4.0.0.conv.weight", &config),
            KeyMap::Mapped("model.22.cv2.0.0.conv.weight".to_string())
        );
        assert_eq!(
            remap_key("model.38.cv5.1.2.bias", &config),
            KeyMap::Mapped("model.22.cv3.1.2.bias".to_string())
        );
        assert_eq!(
            remap_key("model.38.dfl2.conv.weight", &config),
            KeyMap::Mapped("model.22.dfl.conv.weight".to_string())
        );
    }

    #[test]
    fn aux_branches_are_dropped() {
        let config = RemapConfig::default();
        assert_eq!(remap_key("model.0.anything", &config), KeyMap::Dropped);
        assert_eq!(remap_key("model.30.cv1.conv.weight", &config), KeyMap::Dropped);
        assert_eq!(remap_key("model.38.cv2.0.0.conv.weight", &config), KeyMap::Dropped);
        assert_eq!(remap_key("model.38.dfl.conv.weight", &config), KeyMap::Dropped);
    }

    #[test]
    fn malformed_keys_are_unknown() {
        let config = RemapConfig::default();
        assert_eq!(remap_key("optimizer.state", &config), KeyMap::Unknown);
        assert_eq!(remap_key("model.notanumber.w", &config), KeyMap::Unknown);
        assert_eq!(remap_key("model.99.w", &config), KeyMap::Unknown);
    }

    #[test]
    fn remaps_a_file_end_to_end() {
        let dir = std::env::temp_dir().join(format!("remap-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let src = dir.join("donor.safetensors");
        let dst = dir.join("target.safetensors");

        let body: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let head: Vec<f32> = vec![5.0, 6.0];
        let body_bytes: Vec<u8> = body.iter().flat_map(|f| f.to_le_bytes()).collect();
        let head_bytes: Vec<u8> = head.iter().flat_map(|f| f.to_le_bytes()).collect();
        let data = vec![
            (
                "model.1.conv.weight".to_string(),
                TensorView::new(Dtype::F32, vec![2, 2], &body_bytes).unwrap(),
            ),
            (
                "model.38.cv4.0.weight".to_string(),
                TensorView::new(Dtype::F32, vec![2], &head_bytes).unwrap(),
            ),
            (
                "model.38.cv2.0.weight".to_string(),
                TensorView::new(Dtype::F32, vec![2], &head_bytes).unwrap(),
            ),
        ];
        safetensors::serialize_to_file(data, &None, &src).unwrap();

        let summary = remap_checkpoint(&src, &dst, &RemapConfig::default()).unwrap();
        assert_eq!(summary.mapped, 2);
        assert_eq!(summary.dropped, 1);
        assert!(summary.unknown.is_empty());

        let bytes = std::fs::read(&dst).unwrap();
        let tensors = SafeTensors::deserialize(&bytes).unwrap();
        let names = tensors.names();
        assert!(names.iter().any(|n| *n == "model.0.conv.weight"));
        assert!(names.iter().any(|n| *n == "model.22.cv2.0.weight"));
        assert_eq!(names.len(), 2);

        let view = tensors.tensor("model.0.conv.weight").unwrap();
        assert_eq!(view.data(), body_bytes.as_slice());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
