//! Batch evaluation over a directory of images: annotated copies, a CSV of
//! per-image results, summary statistics and a bar plot.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use akdet::annotate::Annotator;
use akdet::plot::{two_panel, Plotter};
use akdet::report::{self, ImageRecord, Summary};
use akdet::{ModelConfig, YOLOv8};

#[derive(Parser)]
#[command(about = "Run the detector over every image in a directory")]
struct Args {
    /// Directory of input images
    #[arg(long, default_value = "test_images")]
    source: PathBuf,

    /// Output directory for annotated copies, CSV and plots
    #[arg(long, default_value = "evaluation_results")]
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
    std::fs::create_dir_all(&args.output)?;

    // one CSV row per readable image; unreadable files warn and are skipped
    let mut records = Vec::new();
    akdet::dataset::visit_images(&args.source, |path, img| {
        let dets = model
            .run(&[img.clone()])?
            .into_iter()
            .next()
            .unwrap_or_default();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(
            image = %name,
            detections = dets.count(),
            mean_confidence = dets.mean_confidence(),
            "processed"
        );

        let annotated = annotator.annotate(&img, &dets);
        let out = args.output.join(format!("detected_{name}"));
        annotated
            .save(&out)
            .with_context(|| format!("failed to write {}", out.display()))?;

        records.push(ImageRecord::new(name, &dets));
        Ok(())
    })?;
    if records.is_empty() {
        bail!("no readable images under {}", args.source.display());
    }

    let csv_path = args.output.join("detection_results.csv");
    report::write_detection_csv(&csv_path, &records)?;

    let summary = Summary::from_records(&records);
    summary.write_json(&args.output.join("summary.json"))?;
    info!(
        total_images = summary.total_images,
        total_detections = summary.total_detections,
        images_with_detections = summary.images_with_detections,
        avg_detections = summary.avg_detections,
        detection_rate = summary.detection_rate,
        "evaluation summary"
    );

    let plotter = Plotter::new()?;
    let labels: Vec<String> = records.iter().map(|r| r.image.clone()).collect();
    let counts: Vec<f32> = records.iter().map(|r| r.detections as f32).collect();
    let confidences: Vec<f32> = records.iter().map(|r| r.confidence).collect();
    let left = plotter.bar_chart("Detections per image", &labels, &counts);
    let right = plotter.bar_chart("Mean confidence per image", &labels, &confidences);
    let plot_path = args.output.join("detection_summary.png");
    two_panel(&left, &right)
        .save(&plot_path)
        .with_context(|| format!("failed to write {}", plot_path.display()))?;
    info!(path = %plot_path.display(), "summary plot saved");
    Ok(())
}
