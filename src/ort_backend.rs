// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// Thin wrapper around an ONNX Runtime session for YOLO detect models:
// session construction, metadata probing, dtype handling, inference.

use anyhow::{anyhow, bail, Context, Result};
use half::f16;
use ndarray::{Array, ArrayD, IxDyn};
use ort::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, GraphOptimizationLevel,
    Session, TensorElementType, ValueType,
};
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

/// Execution provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(u32),
}

/// Tensor dtype the model expects on its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtDtype {
    F32,
    F16,
}

pub struct OrtConfig {
    /// ONNX weights file.
    pub file: String,
    pub ep: OrtEP,
    /// Fallbacks for dynamic input axes.
    pub image_size: (Option<u32>, Option<u32>),
}

/// ONNX Runtime session plus everything probed from the model itself.
pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    dtype: OrtDtype,
    height: u32,
    width: u32,
    nc: Option<u32>,
    names: Option<Vec<String>>,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        let file = config.file;
        if !Path::new(&file).exists() {
            bail!("model file not found: {file}");
        }

        // ep registration falls back to CPU when CUDA is unavailable
        let ep = match config.ep {
            OrtEP::CUDA(device_id) => {
                let cuda = CUDAExecutionProvider::default().with_device_id(device_id as i32);
                if cuda.is_available()? {
                    OrtEP::CUDA(device_id)
                } else {
                    warn!("CUDA is not available, falling back to CPU");
                    OrtEP::CPU
                }
            }
            OrtEP::CPU => OrtEP::CPU,
        };

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?;
        let builder = match ep {
            OrtEP::CUDA(device_id) => builder.with_execution_providers([
                CUDAExecutionProvider::default()
                    .with_device_id(device_id as i32)
                    .build(),
            ])?,
            OrtEP::CPU => builder
                .with_execution_providers([CPUExecutionProvider::default().build()])?,
        };
        let session = builder
            .commit_from_file(&file)
            .with_context(|| format!("failed to load ONNX model: {file}"))?;

        // input tensor: dtype + NCHW dims (dynamic axes reported as -1)
        let (dtype, dims) = match &session.inputs[0].input_type {
            ValueType::Tensor { ty, dimensions } => {
                let dtype = match ty {
                    TensorElementType::Float32 => OrtDtype::F32,
                    TensorElementType::Float16 => OrtDtype::F16,
                    t => bail!("unsupported model input dtype: {t:?}"),
                };
                (dtype, dimensions.clone())
            }
            t => bail!("unsupported model input: {t:?}"),
        };
        if dims.len() != 4 {
            bail!("expected an NCHW model input, got {} dims", dims.len());
        }

        let pick = |axis: i64, fallback: Option<u32>, what: &str| -> Result<u32> {
            if axis > 0 {
                Ok(axis as u32)
            } else {
                fallback.ok_or_else(|| {
                    anyhow!("model {what} is dynamic, make it explicit with --{what}")
                })
            }
        };
        let height = pick(dims[2], config.image_size.1.or(Some(640)), "height")?;
        let width = pick(dims[3], config.image_size.0.or(Some(640)), "width")?;

        // class names live in the exporter's `names` metadata entry
        let metadata = session.metadata()?;
        let names = match metadata.custom("names")? {
            Some(names) => {
                let re = Regex::new(r#"'([^']+)'"#)?;
                let names: Vec<String> = re
                    .captures_iter(&names)
                    .map(|cap| cap[1].to_string())
                    .collect();
                if names.is_empty() {
                    None
                } else {
                    Some(names)
                }
            }
            None => None,
        };
        drop(metadata);
        let nc = names.as_ref().map(|n| n.len() as u32);
        debug!(?dtype, height, width, ?nc, "ONNX session ready");

        Ok(Self {
            session,
            ep,
            dtype,
            height,
            width,
            nc,
            names,
        })
    }

    /// Run the session on an NCHW f32 batch; returns all outputs as f32 arrays.
    pub fn run(&self, xs: Array<f32, IxDyn>) -> Result<Vec<ArrayD<f32>>> {
        let ys = match self.dtype {
            OrtDtype::F32 => self.session.run(ort::inputs![xs.view()]?)?,
            OrtDtype::F16 => {
                let xs = xs.mapv(f16::from_f32);
                self.session.run(ort::inputs![xs.view()]?)?
            }
        };

        let mut outputs = Vec::new();
        for (_name, value) in ys.iter() {
            let y = match self.dtype {
                OrtDtype::F32 => value.try_extract_tensor::<f32>()?.to_owned(),
                OrtDtype::F16 => value.try_extract_tensor::<f16>()?.mapv(f32::from),
            };
            outputs.push(y);
        }
        Ok(outputs)
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    pub fn dtype(&self) -> OrtDtype {
        self.dtype
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn nc(&self) -> Option<u32> {
        self.nc
    }

    pub fn names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }
}
