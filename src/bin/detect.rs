//! Run the detector on an image (or every image in a directory) and save
//! annotated copies.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use akdet::annotate::Annotator;
use akdet::{Detections, ModelConfig, YOLOv8};

#[derive(Parser)]
#[command(about = "Detect AK-47s in static images")]
struct Args {
    /// Input image or directory of images
    #[arg(long)]
    source: PathBuf,

    /// Output directory for annotated copies
    #[arg(long, default_value = "imgs/output")]
    output: PathBuf,

    #[command(flatten)]
    model: ModelConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let model = YOLOv8::new(args.model)?;
    model.summary();
    let annotator = Annotator::new(model.names().to_vec(), model.color_palette().to_vec())?;

    let sources = if args.source.is_dir() {
        akdet::dataset::list_images(&args.source)?
    } else {
        vec![args.source.clone()]
    };
    if sources.is_empty() {
        bail!("no images found under {}", args.source.display());
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    for path in &sources {
        if let Err(e) = process(&model, &annotator, path, &args.output) {
            warn!("skipping {}: {e:#}", path.display());
        }
    }
    Ok(())
}

fn process(model: &YOLOv8, annotator: &Annotator, path: &Path, output: &Path) -> Result<()> {
    let img = image::open(path).with_context(|| format!("failed to read {}", path.display()))?;
    let dets = model
        .run(&[img.clone()])?
        .into_iter()
        .next()
        .unwrap_or_default();
    log_detections(model, path, &dets);

    let name = path
        .file_name()
        .map(|n| format!("result_{}", n.to_string_lossy()))
        .unwrap_or_else(|| "result.jpg".to_string());
    let out = output.join(name);
    annotator
        .annotate(&img, &dets)
        .save(&out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    info!(path = %out.display(), "saved annotated image");
    Ok(())
}

fn log_detections(model: &YOLOv8, path: &Path, dets: &Detections) {
    info!(
        image = %path.display(),
        detections = dets.count(),
        mean_confidence = dets.mean_confidence(),
        "inference done"
    );
    for bbox in dets.bboxes() {
        let name = model
            .names()
            .get(bbox.class_id())
            .map(String::as_str)
            .unwrap_or("unknown");
        info!(
            class = name,
            confidence = bbox.confidence(),
            x = bbox.xmin(),
            y = bbox.ymin(),
            w = bbox.width(),
            h = bbox.height(),
            "detection"
        );
    }
}
