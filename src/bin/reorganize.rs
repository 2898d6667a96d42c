use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use yolov9_detection::data::reorganize_by_class;

#[derive(Parser, Debug)]
#[command(author, version, about = "Regroup a detection dataset by class", long_about = None)]
struct Args {
    /// Path to the dataset's data.yaml
    #[arg(short, long)]
    data: PathBuf,

    /// Destination directory for the class-grouped copy
    #[arg(short, long)]
    dest: PathBuf,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    let args = Args::parse();

    println!("Reorganizing {} by class into {}", args.data.display(), args.dest.display());
    let report = reorganize_by_class(&args.data, &args.dest)?;

    for (split, copied) in &report.per_split {
        println!("  {}: {} images", split, copied);
    }
    println!("Done: {} copied, {} skipped", report.copied, report.skipped);

    Ok(())
}
