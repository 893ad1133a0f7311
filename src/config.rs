//! Shared model/inference arguments, flattened into every binary's CLI.

use clap::Parser;

#[derive(Parser, Clone, Debug)]
pub struct ModelConfig {
    /// ONNX model path, e.g. runs/detect/ak47_detection/weights/best.onnx
    #[arg(long, default_value = "runs/detect/ak47_detection/weights/best.onnx")]
    pub model: String,

    /// Confidence threshold
    #[arg(long, default_value_t = 0.5)]
    pub conf: f32,

    /// NMS IoU threshold
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// Use the CUDA execution provider
    #[arg(long)]
    pub cuda: bool,

    /// GPU device id
    #[arg(long, default_value_t = 0)]
    pub device_id: u32,

    /// Inference input width (overrides a dynamic model axis)
    #[arg(long)]
    pub width: Option<u32>,

    /// Inference input height (overrides a dynamic model axis)
    #[arg(long)]
    pub height: Option<u32>,

    /// Number of classes, for models without embedded metadata
    #[arg(long)]
    pub nc: Option<u32>,

    /// Print per-stage timings
    #[arg(long)]
    pub profile: bool,
}
