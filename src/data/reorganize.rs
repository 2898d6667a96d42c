use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use super::dataset::{is_image_file, label_dir_for, DataConfig};

/// Copy counts for one reorganized dataset.
#[derive(Debug, Default, Clone)]
pub struct ReorganizeReport {
    pub per_split: Vec<(String, usize)>,
    pub copied: usize,
    pub skipped: usize,
}

/// Regroup a detection dataset by class: read the manifest, walk each
/// split's images recursively, and copy every image into
/// `dest/<class-name>/` once per distinct class appearing in its label
/// file. Missing labels, missing images and out-of-range class ids warn and
/// skip.
pub fn reorganize_by_class(yaml_path: &Path, dest: &Path) -> Result<ReorganizeReport> {
    let config = DataConfig::from_yaml(yaml_path)?;
    let base = yaml_path.parent().unwrap_or_else(|| Path::new("."));

    for name in &config.names {
        fs::create_dir_all(dest.join(sanitize_filename(name)))
            .with_context(|| format!("failed to create class directory for {}", name))?;
    }

    let mut report = ReorganizeReport::default();
    for split in ["train", "val", "test"] {
        let dir = match config.split_dir(split) {
            Ok(dir) => base.join(dir),
            Err(_) => continue,
        };
        if !dir.exists() {
            log::warn!("{} split directory not found: {}, skipping", split, dir.display());
            continue;
        }
        let copied = reorganize_split(&dir, dest, &config.names, &mut report)?;
        log::info!("{}: {} images copied", split, copied);
        report.per_split.push((split.to_string(), copied));
    }

    log::info!(
        "reorganized {} images into {} classes ({} skipped)",
        report.copied,
        config.names.len(),
        report.skipped
    );
    Ok(report)
}

fn reorganize_split(
    img_dir: &Path,
    dest: &Path,
    class_names: &[String],
    report: &mut ReorganizeReport,
) -> Result<usize> {
    let label_dir = label_dir_for(img_dir);
    let mut copied = 0;

    for entry in WalkDir::new(img_dir).into_iter().filter_map(|e| e.ok()) {
        let img_path = entry.path();
        if !img_path.is_file() || !is_image_file(img_path) {
            continue;
        }

        let stem = match img_path.file_stem() {
            Some(stem) => stem,
            None => continue,
        };
        let label_path = label_dir.join(stem).with_extension("txt");
        if !label_path.exists() {
            log::warn!("no label file for {}, skipping", img_path.display());
            report.skipped += 1;
            continue;
        }

        let classes = match label_classes(&label_path) {
            Ok(classes) => classes,
            Err(err) => {
                log::warn!("failed to read {}: {}, skipping", label_path.display(), err);
                report.skipped += 1;
                continue;
            }
        };

        let file_name = match img_path.file_name().and_then(|n| n.to_str()) {
            Some(name) => sanitize_filename(name),
            None => continue,
        };

        for class_id in classes {
            let Some(class_name) = class_names.get(class_id) else {
                log::warn!(
                    "class id {} out of range in {}, skipping",
                    class_id,
                    label_path.display()
                );
                report.skipped += 1;
                continue;
            };
            let dest_path = dest.join(sanitize_filename(class_name)).join(&file_name);
            match fs::copy(img_path, &dest_path) {
                Ok(_) => {
                    copied += 1;
                    report.copied += 1;
                }
                Err(err) => {
                    log::warn!(
                        "failed to copy {} to {}: {}, skipping",
                        img_path.display(),
                        dest_path.display(),
                        err
                    );
                    report.skipped += 1;
                }
            }
        }
    }

    Ok(copied)
}

/// Distinct class ids named by a label file, in ascending order.
fn label_classes(label_path: &Path) -> Result<BTreeSet<usize>> {
    let content = fs::read_to_string(label_path)?;
    let mut classes = BTreeSet::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_whitespace().next().map(str::parse::<usize>) {
            Some(Ok(class_id)) => {
                classes.insert(class_id);
            }
            _ => log::warn!("invalid label line in {}: {}", label_path.display(), line),
        }
    }
    Ok(classes)
}

/// Replace characters that are illegal in common filesystems.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}
