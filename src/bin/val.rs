//! Validate the detector against the labelled val split: precision, recall,
//! mAP50 and a percent-normalized confusion matrix.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use akdet::dataset::{self, label_path};
use akdet::metrics::{MetricsAccumulator, DEFAULT_MATCH_IOU};
use akdet::plot::Plotter;
use akdet::report;
use akdet::{Bbox, ModelConfig, YOLOv8};

#[derive(Parser)]
#[command(about = "Score the detector against ground-truth labels")]
struct Args {
    /// Dataset root containing images/val and labels/val
    #[arg(long, default_value = "ak47_dataset")]
    root: PathBuf,

    /// Output directory for metrics.csv and plots
    #[arg(long, default_value = "validation_results")]
    output: PathBuf,

    /// IoU threshold for matching detections to ground truth
    #[arg(long, default_value_t = DEFAULT_MATCH_IOU)]
    match_iou: f32,

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

    let images_dir = args.root.join("images/val");
    let labels_dir = args.root.join("labels/val");

    let model = YOLOv8::new(args.model)?;
    model.summary();
    let nc = model.nc() as usize;
    let mut accumulator = MetricsAccumulator::new(nc, args.match_iou);

    // unreadable images warn and are skipped, like the batch evaluator
    let validated = dataset::visit_images(&images_dir, |path, img| {
        let (w, h) = (img.width(), img.height());

        let dets = model
            .run(&[img])?
            .into_iter()
            .next()
            .unwrap_or_default();
        let ground_truth: Vec<Bbox> = dataset::load_labels(&label_path(&labels_dir, path))?
            .iter()
            .map(|l| l.to_bbox(w, h))
            .collect();

        accumulator.observe(dets.bboxes(), &ground_truth);
        Ok(())
    })?;
    if validated == 0 {
        bail!("no readable validation images under {}", images_dir.display());
    }
    info!(count = validated, "validated");

    let metrics = accumulator.finish();
    info!(
        precision = metrics.precision,
        recall = metrics.recall,
        map50 = metrics.map50,
        map50_95 = metrics.map50_95,
        "validation metrics"
    );
    for (class_id, ap) in metrics.per_class_ap.iter().enumerate() {
        let name = model
            .names()
            .get(class_id)
            .map(String::as_str)
            .unwrap_or("unknown");
        info!(class = name, ap50 = *ap, "per-class AP");
    }

    std::fs::create_dir_all(&args.output)?;
    report::write_metrics_csv(
        &args.output.join("metrics.csv"),
        &[
            ("mAP50", metrics.map50),
            ("mAP50-95", metrics.map50_95),
            ("Precision", metrics.precision),
            ("Recall", metrics.recall),
        ],
    )?;

    let plotter = Plotter::new()?;
    let bar = plotter.bar_chart(
        "Validation metrics",
        &[
            "mAP50".to_string(),
            "mAP50-95".to_string(),
            "Precision".to_string(),
            "Recall".to_string(),
        ],
        &[
            metrics.map50,
            metrics.map50_95,
            metrics.precision,
            metrics.recall,
        ],
    );
    bar.save(args.output.join("metrics_plot.png"))?;

    let heatmap = plotter.confusion_heatmap(accumulator.confusion(), model.names());
    heatmap.save(args.output.join("confusion_matrix.png"))?;
    info!(dir = %args.output.display(), "wrote metrics.csv, metrics_plot.png, confusion_matrix.png");
    Ok(())
}
