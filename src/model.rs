// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 detect-task model: loading, preprocessing, inference, postprocessing.

use anyhow::{anyhow, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::{s, Array, ArrayD, Axis, IxDyn};
use std::time::Instant;
use tracing::debug;

use crate::{non_max_suppression, Bbox, Detections, ModelConfig, OrtBackend, OrtConfig, OrtEP};

pub struct YOLOv8 {
    engine: OrtBackend,
    nc: u32,
    height: u32,
    width: u32,
    conf: f32,
    iou: f32,
    names: Vec<String>,
    color_palette: Vec<(u8, u8, u8)>,
    profile: bool,
}

impl YOLOv8 {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let ep = if config.cuda {
            OrtEP::CUDA(config.device_id)
        } else {
            OrtEP::CPU
        };

        let engine = OrtBackend::build(OrtConfig {
            file: config.model,
            ep,
            image_size: (config.width, config.height),
        })?;

        let (height, width) = (engine.height(), engine.width());
        let nc = engine
            .nc()
            .or(config.nc)
            .ok_or_else(|| anyhow!("failed to get num_classes, make it explicit with `--nc`"))?;

        // a fine-tuned single-class export may lack the names metadata
        let names = engine
            .names()
            .unwrap_or_else(|| vec!["AK-47".to_string()]);

        let bright_colors = [
            (255, 0, 0),
            (0, 255, 0),
            (0, 0, 255),
            (255, 255, 0),
            (255, 0, 255),
            (0, 255, 255),
            (255, 128, 0),
            (255, 0, 128),
            (128, 255, 0),
            (0, 128, 255),
            (255, 255, 255),
            (128, 0, 255),
        ];
        let color_palette: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, _)| bright_colors[i % bright_colors.len()])
            .collect();

        Ok(Self {
            engine,
            nc,
            height,
            width,
            conf: config.conf,
            iou: config.iou,
            names,
            color_palette,
            profile: config.profile,
        })
    }

    fn scale_wh(&self, w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
        let r = (w1 / w0).min(h1 / h0);
        (r, (w0 * r).round(), (h0 * r).round())
    }

    /// Aspect-preserving resize into a gray-filled NCHW batch tensor.
    pub fn preprocess(&self, xs: &[DynamicImage]) -> Result<Array<f32, IxDyn>> {
        let mut ys =
            Array::ones((xs.len(), 3, self.height as usize, self.width as usize)).into_dyn();
        ys.fill(144.0 / 255.0);
        for (idx, x) in xs.iter().enumerate() {
            let (w0, h0) = x.dimensions();
            let (_, w_new, h_new) = self.scale_wh(
                w0 as f32,
                h0 as f32,
                self.width as f32,
                self.height as f32,
            );
            let img = x.resize_exact(
                w_new as u32,
                h_new as u32,
                image::imageops::FilterType::Triangle,
            );

            for (x, y, rgb) in img.pixels() {
                let x = x as usize;
                let y = y as usize;
                let [r, g, b, _] = rgb.0;
                ys[[idx, 0, y, x]] = (r as f32) / 255.0;
                ys[[idx, 1, y, x]] = (g as f32) / 255.0;
                ys[[idx, 2, y, x]] = (b as f32) / 255.0;
            }
        }

        Ok(ys)
    }

    /// Full pipeline: preprocess → inference → postprocess.
    pub fn run(&self, xs: &[DynamicImage]) -> Result<Vec<Detections>> {
        let t_pre = Instant::now();
        let xs_ = self.preprocess(xs)?;
        if self.profile {
            debug!("[Model Preprocess]: {:?}", t_pre.elapsed());
        }

        let t_run = Instant::now();
        let ys = self.engine.run(xs_)?;
        if self.profile {
            debug!("[Model Inference]: {:?}", t_run.elapsed());
        }

        let t_post = Instant::now();
        let ys = self.postprocess(ys, xs)?;
        if self.profile {
            debug!("[Model Postprocess]: {:?}", t_post.elapsed());
        }

        Ok(ys)
    }

    /// Decode raw [batch, 4 + nc, anchors] output into boxes in original
    /// image coordinates.
    pub fn postprocess(
        &self,
        xs: Vec<ArrayD<f32>>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<Detections>> {
        const CXYWH_OFFSET: usize = 4;
        let preds = &xs[0];

        let mut ys = Vec::new();
        for (idx, anchor) in preds.axis_iter(Axis(0)).enumerate() {
            let width_original = xs0[idx].width() as f32;
            let height_original = xs0[idx].height() as f32;
            let ratio =
                (self.width as f32 / width_original).min(self.height as f32 / height_original);

            let mut data: Vec<Bbox> = Vec::new();
            for pred in anchor.axis_iter(Axis(1)) {
                let bbox = pred.slice(s![0..CXYWH_OFFSET]);
                let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + self.nc as usize]);

                let (id, &confidence) = clss
                    .into_iter()
                    .enumerate()
                    .reduce(|max, x| if x.1 > max.1 { x } else { max })
                    .unwrap();

                if confidence < self.conf {
                    continue;
                }

                let cx = bbox[0] / ratio;
                let cy = bbox[1] / ratio;
                let w = bbox[2] / ratio;
                let h = bbox[3] / ratio;
                let x = cx - w / 2.;
                let y = cy - h / 2.;
                data.push(Bbox::new(
                    x.max(0.0f32).min(width_original),
                    y.max(0.0f32).min(height_original),
                    w,
                    h,
                    id,
                    confidence,
                ));
            }

            non_max_suppression(&mut data, self.iou);
            ys.push(Detections::new(data));
        }

        Ok(ys)
    }

    pub fn summary(&self) {
        tracing::info!(
            ep = ?self.engine.ep(),
            dtype = ?self.engine.dtype(),
            height = self.height,
            width = self.width,
            nc = self.nc,
            conf = self.conf,
            iou = self.iou,
            names = ?self.names,
            "model loaded"
        );
    }

    pub fn conf(&self) -> f32 {
        self.conf
    }

    pub fn set_conf(&mut self, val: f32) {
        self.conf = val;
    }

    pub fn iou(&self) -> f32 {
        self.iou
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn nc(&self) -> u32 {
        self.nc
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn color_palette(&self) -> &[(u8, u8, u8)] {
        &self.color_palette
    }
}
