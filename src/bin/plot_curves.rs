use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use yolov9_detection::plot::{render_curves, CurveSeries};

#[derive(Parser, Debug)]
#[command(author, version, about = "Plot metric curves from CSV files", long_about = None)]
struct Args {
    /// Series as NAME=path/to/curve.csv pairs
    #[arg(required = true)]
    series: Vec<String>,

    /// Output PNG path
    #[arg(short, long, default_value = "curves.png")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    let args = Args::parse();

    let mut curves = Vec::new();
    for spec in &args.series {
        let Some((name, path)) = spec.split_once('=') else {
            bail!("series must be NAME=path pairs, got {}", spec);
        };
        let path = PathBuf::from(path);
        if !path.exists() {
            log::warn!("curve file {} not found, skipping series {}", path.display(), name);
            continue;
        }
        curves.push(CurveSeries::from_csv(name, &path)?);
    }

    if curves.is_empty() {
        bail!("no readable curve series given");
    }

    render_curves(&curves, &args.output)?;
    println!("Wrote {} series to {}", curves.len(), args.output.display());

    Ok(())
}
