use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use yolov9_detection::checkpoint::{remap_checkpoint, RemapConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Convert a trained aux-branch checkpoint to the inference layout",
    long_about = None
)]
struct Args {
    /// Donor checkpoint (safetensors)
    #[arg(short, long)]
    src: PathBuf,

    /// Output checkpoint (safetensors)
    #[arg(short, long)]
    dst: PathBuf,

    /// Head slot index in the target layout
    #[arg(long, default_value_t = 22)]
    head_index: usize,

    /// Body layer shift introduced by the aux entry layer
    #[arg(long, default_value_t = 1)]
    body_offset: usize,

    /// Donor head slot offset past the target head
    #[arg(long, default_value_t = 16)]
    head_offset: usize,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    let args = Args::parse();

    let config = RemapConfig {
        head_index: args.head_index,
        body_offset: args.body_offset,
        head_offset: args.head_offset,
    };
    let summary = remap_checkpoint(&args.src, &args.dst, &config)?;

    println!(
        "Remapped {} tensors into {} ({} dropped, {} unknown)",
        summary.mapped,
        args.dst.display(),
        summary.dropped,
        summary.unknown.len()
    );
    for key in &summary.unknown {
        println!("  unknown key: {}", key);
    }

    Ok(())
}
