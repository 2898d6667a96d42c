use anyhow::{bail, Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// `data.yaml` dataset manifest: class count, class names and per-split
/// image directories relative to the manifest location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub path: String,
    pub train: String,
    pub val: String,
    #[serde(default)]
    pub test: String,
    pub nc: usize,
    pub names: Vec<String>,
}

impl DataConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset manifest {}", path.display()))?;
        let config: DataConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("invalid dataset manifest {}", path.display()))?;
        if config.names.len() != config.nc {
            bail!(
                "manifest declares nc={} but lists {} names",
                config.nc,
                config.names.len()
            );
        }
        Ok(config)
    }

    pub fn split_dir(&self, split: &str) -> Result<&str> {
        match split {
            "train" => Ok(&self.train),
            "val" => Ok(&self.val),
            "test" if !self.test.is_empty() => Ok(&self.test),
            "test" => bail!("manifest has no test split"),
            other => bail!("unknown split {}, use train, val or test", other),
        }
    }
}

/// One YOLO txt label line: class id plus a normalized center-format box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub class_id: usize,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

pub(crate) fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

/// Parse a YOLO label file. Malformed lines warn and are skipped.
pub fn parse_label_file(path: &Path) -> Result<Vec<BoundingBox>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read label file {}", path.display()))?;
    Ok(parse_labels(&content, path))
}

fn parse_labels(content: &str, path: &Path) -> Vec<BoundingBox> {
    let mut boxes = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            log::warn!("invalid label line in {}: {}", path.display(), line);
            continue;
        }
        match (
            parts[0].parse::<usize>(),
            parts[1].parse::<f32>(),
            parts[2].parse::<f32>(),
            parts[3].parse::<f32>(),
            parts[4].parse::<f32>(),
        ) {
            (Ok(class_id), Ok(x_center), Ok(y_center), Ok(width), Ok(height)) => {
                boxes.push(BoundingBox {
                    class_id,
                    x_center,
                    y_center,
                    width,
                    height,
                });
            }
            _ => {
                log::warn!("invalid label line in {}: {}", path.display(), line);
            }
        }
    }
    boxes
}

/// Image/label-file pairs for one split of a YOLO-layout dataset.
#[derive(Clone)]
pub struct YoloDataset {
    samples: Vec<(PathBuf, PathBuf)>,
    pub num_classes: usize,
    pub class_names: Vec<String>,
}

impl YoloDataset {
    /// Walk the split's image directory recursively and pair each image with
    /// its label file in the sibling `labels` directory. Images without a
    /// label warn and are skipped.
    pub fn new(yaml_path: impl AsRef<Path>, split: &str) -> Result<Self> {
        let yaml_path = yaml_path.as_ref();
        let config = DataConfig::from_yaml(yaml_path)?;

        let base = yaml_path.parent().unwrap_or_else(|| Path::new("."));
        let img_dir = base.join(config.split_dir(split)?);
        if !img_dir.exists() {
            bail!("image directory not found: {}", img_dir.display());
        }
        let label_dir = label_dir_for(&img_dir);

        let mut samples = Vec::new();
        for entry in WalkDir::new(&img_dir).into_iter().filter_map(|e| e.ok()) {
            let img_path = entry.path();
            if !img_path.is_file() || !is_image_file(img_path) {
                continue;
            }
            let stem = match img_path.file_stem() {
                Some(stem) => stem,
                None => continue,
            };
            let label_path = label_dir.join(stem).with_extension("txt");
            if label_path.exists() {
                samples.push((img_path.to_path_buf(), label_path));
            } else {
                log::warn!("no label file for {}", img_path.display());
            }
        }

        if samples.is_empty() {
            bail!("no samples found under {}", img_dir.display());
        }
        log::info!("loaded {} {} samples", samples.len(), split);

        Ok(Self {
            samples,
            num_classes: config.nc,
            class_names: config.names,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, idx: usize) -> Result<(DynamicImage, Vec<BoundingBox>)> {
        let (img_path, label_path) = self
            .samples
            .get(idx)
            .with_context(|| format!("index {} out of bounds for {} samples", idx, self.samples.len()))?;

        let img = image::open(img_path)
            .with_context(|| format!("failed to open image {}", img_path.display()))?;
        let boxes = parse_label_file(label_path)?;
        Ok((img, boxes))
    }
}

/// Labels live in a `labels` directory next to the split's image directory.
pub(crate) fn label_dir_for(img_dir: &Path) -> PathBuf {
    img_dir
        .parent()
        .map(|p| p.join("labels"))
        .unwrap_or_else(|| PathBuf::from("labels"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_labels() {
        let content = "0 0.5 0.5 0.2 0.3\n2 0.1 0.9 0.05 0.05\n";
        let boxes = parse_labels(content, Path::new("test.txt"));
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].class_id, 0);
        assert_eq!(boxes[1].class_id, 2);
        assert!((boxes[0].width - 0.2).abs() < 1e-6);
    }

    #[test]
    fn skips_malformed_lines() {
        let content = "0 0.5 0.5 0.2 0.3\nnot a label\n1 0.5 0.5\n\n3 0.2 0.2 0.1 0.1\n";
        let boxes = parse_labels(content, Path::new("test.txt"));
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].class_id, 0);
        assert_eq!(boxes[1].class_id, 3);
    }

    #[test]
    fn label_dir_is_sibling_of_images() {
        let dir = label_dir_for(Path::new("dataset/train/images"));
        assert_eq!(dir, PathBuf::from("dataset/train/labels"));
    }

    #[test]
    fn recognizes_image_extensions() {
        assert!(is_image_file(Path::new("a/b.JPG")));
        assert!(is_image_file(Path::new("a/b.png")));
        assert!(!is_image_file(Path::new("a/b.txt")));
        assert!(!is_image_file(Path::new("a/b")));
    }
}
