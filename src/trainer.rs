//! Training delegation. Model training stays in the `yolo` CLI; this module
//! prepares the dataset descriptor and drives the external process.

use crate::dataset::DatasetDescriptor;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// Parameters for a `yolo detect train` run.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub data: PathBuf,
    pub base_model: String,
    pub epochs: u32,
    pub batch: u32,
    pub imgsz: u32,
    pub patience: u32,
    pub device: Option<String>,
    pub name: String,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data: PathBuf::from("dataset.yaml"),
            base_model: "yolov8n.pt".to_string(),
            epochs: 100,
            batch: 16,
            imgsz: 640,
            patience: 20,
            device: None,
            name: "ak47_detection".to_string(),
        }
    }
}

impl TrainConfig {
    fn train_args(&self) -> Vec<String> {
        let mut args = vec![
            "detect".to_string(),
            "train".to_string(),
            format!("data={}", self.data.display()),
            format!("model={}", self.base_model),
            format!("epochs={}", self.epochs),
            format!("batch={}", self.batch),
            format!("imgsz={}", self.imgsz),
            format!("patience={}", self.patience),
            format!("name={}", self.name),
        ];
        if let Some(device) = &self.device {
            args.push(format!("device={device}"));
        }
        args
    }
}

/// Write `dataset.yaml` for the dataset rooted at `root`.
pub fn write_descriptor(root: &Path, names: &[String], out: &Path) -> Result<()> {
    let descriptor = DatasetDescriptor::new(root, names.to_vec());
    descriptor
        .write(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    info!(path = %out.display(), "wrote dataset descriptor");
    Ok(())
}

/// Run the external trainer, inheriting its console output.
pub fn train(config: &TrainConfig) -> Result<()> {
    let args = config.train_args();
    info!(command = %format!("yolo {}", args.join(" ")), "starting training");

    let status = Command::new("yolo")
        .args(&args)
        .status()
        .context("failed to launch `yolo`; is the ultralytics CLI installed?")?;
    if !status.success() {
        bail!("training failed with status {status}");
    }

    info!("training finished");
    Ok(())
}

/// Export the trained weights to ONNX so the inference binaries can load them.
pub fn export_onnx(weights: &Path) -> Result<PathBuf> {
    if !weights.is_file() {
        bail!("weights not found: {}", weights.display());
    }

    let status = Command::new("yolo")
        .arg("export")
        .arg(format!("model={}", weights.display()))
        .arg("format=onnx")
        .status()
        .context("failed to launch `yolo export`")?;
    if !status.success() {
        bail!("export failed with status {status}");
    }

    let onnx = weights.with_extension("onnx");
    info!(path = %onnx.display(), "exported ONNX weights");
    Ok(onnx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_args_include_all_parameters() {
        let config = TrainConfig {
            data: PathBuf::from("ak47/dataset.yaml"),
            epochs: 50,
            device: Some("0".to_string()),
            ..Default::default()
        };
        let args = config.train_args();
        assert_eq!(args[0], "detect");
        assert_eq!(args[1], "train");
        assert!(args.contains(&"data=ak47/dataset.yaml".to_string()));
        assert!(args.contains(&"epochs=50".to_string()));
        assert!(args.contains(&"batch=16".to_string()));
        assert!(args.contains(&"imgsz=640".to_string()));
        assert!(args.contains(&"device=0".to_string()));
    }

    #[test]
    fn device_omitted_when_unset() {
        let args = TrainConfig::default().train_args();
        assert!(!args.iter().any(|a| a.starts_with("device=")));
    }
}
