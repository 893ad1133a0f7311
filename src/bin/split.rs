//! Populate the validation split from existing training images.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(about = "Copy the first N training images (and labels) into the val split")]
struct Args {
    /// Dataset root containing images/train and labels/train
    #[arg(long, default_value = "ak47_dataset")]
    root: PathBuf,

    /// How many images to copy into the val split
    #[arg(long, default_value_t = 10)]
    count: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let report = akdet::dataset::populate_val_split(&args.root, args.count)?;

    info!(
        images = report.copied_images,
        labels = report.copied_labels,
        "validation split ready"
    );
    if !report.missing_labels.is_empty() {
        warn!(
            count = report.missing_labels.len(),
            "images copied without a matching label file"
        );
    }
    Ok(())
}
