use anyhow::{Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use clap::Parser;

use yolov9_detection::data::image_to_input;
use yolov9_detection::{DetectionModel, HeadState, ModelSpec};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run detection on one image", long_about = None)]
struct Args {
    /// Path to the model spec YAML
    #[arg(short, long)]
    model: String,

    /// Path to input image
    #[arg(short, long)]
    image: String,

    /// Path to a saved model record
    #[arg(short, long)]
    weights: Option<String>,

    /// Override the spec's class count
    #[arg(long)]
    classes: Option<usize>,

    /// Network input size
    #[arg(long, default_value_t = 640)]
    img_size: u32,

    /// Confidence threshold
    #[arg(short, long, default_value_t = 0.25)]
    conf: f32,

    /// IoU threshold for NMS
    #[arg(long, default_value_t = 0.45)]
    iou: f32,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    type Backend = NdArray;
    let device = NdArrayDevice::default();

    let spec = ModelSpec::from_yaml_file(&args.model)?;
    log::info!("building model from {}", args.model);
    let mut model = DetectionModel::<Backend>::new(&spec, 3, args.classes, &device)?;
    if let Some(weights) = &args.weights {
        model = model.load_weights(weights, &device)?;
        log::info!("loaded weights from {}", weights);
    }

    let img = image::open(&args.image)
        .with_context(|| format!("failed to open image {}", args.image))?;
    let (input, letterbox) = image_to_input::<Backend>(&img, args.img_size, &device);

    let mut state = HeadState::new();
    let detections = model.predict(input, args.conf, args.iou, &mut state);

    println!("found {} objects in {}", detections.len(), args.image);
    for (i, det) in detections.iter().enumerate() {
        let (x, y) = letterbox.to_source(det.x, det.y);
        println!(
            "  {}. class {} at ({:.1}, {:.1}) size {:.1}x{:.1}, confidence {:.1}%",
            i + 1,
            det.class_id,
            x,
            y,
            det.w / letterbox.scale,
            det.h / letterbox.scale,
            det.confidence * 100.0
        );
    }

    Ok(())
}
