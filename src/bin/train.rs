//! Prepare the dataset descriptor and drive the external `yolo` trainer.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use akdet::trainer::{self, TrainConfig};

#[derive(Parser)]
#[command(about = "Train an AK-47 detector through the ultralytics CLI")]
struct Args {
    /// Dataset root containing images/ and labels/
    #[arg(long, default_value = "ak47_dataset")]
    root: PathBuf,

    /// Class names, in label-id order
    #[arg(long, value_delimiter = ',', default_value = "AK-47")]
    names: Vec<String>,

    /// Base weights to fine-tune
    #[arg(long, default_value = "yolov8n.pt")]
    base_model: String,

    #[arg(long, default_value_t = 100)]
    epochs: u32,

    #[arg(long, default_value_t = 16)]
    batch: u32,

    #[arg(long, default_value_t = 640)]
    imgsz: u32,

    /// Early-stopping patience, in epochs
    #[arg(long, default_value_t = 20)]
    patience: u32,

    /// Training device, e.g. "0" or "cpu"
    #[arg(long)]
    device: Option<String>,

    /// Run name under runs/detect/
    #[arg(long, default_value = "ak47_detection")]
    name: String,

    /// Export best.pt to ONNX after training
    #[arg(long)]
    export: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    akdet::dataset::prepare_layout(&args.root)?;
    let descriptor_path = args.root.join("dataset.yaml");
    trainer::write_descriptor(&args.root, &args.names, &descriptor_path)?;

    let config = TrainConfig {
        data: descriptor_path,
        base_model: args.base_model,
        epochs: args.epochs,
        batch: args.batch,
        imgsz: args.imgsz,
        patience: args.patience,
        device: args.device,
        name: args.name.clone(),
    };
    trainer::train(&config)?;

    if args.export {
        let weights = PathBuf::from("runs/detect")
            .join(&args.name)
            .join("weights/best.pt");
        let onnx = trainer::export_onnx(&weights)?;
        info!(model = %onnx.display(), "ready for inference");
    }
    Ok(())
}
