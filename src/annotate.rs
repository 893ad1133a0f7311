//! Drawing detections, track trajectories and HUD text onto frames.

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use std::io::Read;
use std::path::PathBuf;
use tracing::info;

use crate::track::Track;
use crate::Detections;

const FONT_URL: &str = "https://ultralytics.com/assets/Arial.ttf";
const LABEL_SCALE: f32 = 16.0;
const HUD_SCALE: f32 = 28.0;

/// Fetch the label font from the user cache dir, downloading it on first use.
pub(crate) fn load_font() -> Result<FontVec> {
    let mut path = dirs::cache_dir().ok_or_else(|| anyhow!("no user cache directory"))?;
    path.push("akdet");
    std::fs::create_dir_all(&path)?;
    path.push("Arial.ttf");

    if !path.exists() {
        info!("downloading label font to {}", path.display());
        let resp = ureq::get(FONT_URL)
            .call()
            .with_context(|| format!("failed to fetch {FONT_URL}"))?;
        let mut bytes = Vec::new();
        resp.into_reader().read_to_end(&mut bytes)?;
        std::fs::write(&path, &bytes)?;
    }

    let bytes = std::fs::read(&path)?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font file: {e}"))
}

/// Path of the cached font, for diagnostics.
pub fn font_cache_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|mut p| {
        p.push("akdet");
        p.push("Arial.ttf");
        p
    })
}

pub struct Annotator {
    font: FontVec,
    names: Vec<String>,
    palette: Vec<(u8, u8, u8)>,
}

impl Annotator {
    pub fn new(names: Vec<String>, palette: Vec<(u8, u8, u8)>) -> Result<Self> {
        Ok(Self {
            font: load_font()?,
            names,
            palette,
        })
    }

    fn class_name(&self, id: usize) -> &str {
        self.names.get(id).map(String::as_str).unwrap_or("Unknown")
    }

    fn class_color(&self, id: usize) -> Rgb<u8> {
        let (r, g, b) = self
            .palette
            .get(id)
            .copied()
            .unwrap_or((0, 255, 0));
        Rgb([r, g, b])
    }

    /// Render detection boxes and `name conf` labels onto a copy of the image.
    pub fn annotate(&self, img: &DynamicImage, dets: &Detections) -> RgbImage {
        let mut out = img.to_rgb8();
        self.draw_detections(&mut out, dets);
        out
    }

    pub fn draw_detections(&self, img: &mut RgbImage, dets: &Detections) {
        for bbox in dets.bboxes() {
            let color = self.class_color(bbox.class_id());
            let label = format!("{}: {:.2}", self.class_name(bbox.class_id()), bbox.confidence());
            self.draw_box(img, bbox.xmin(), bbox.ymin(), bbox.width(), bbox.height(), color);
            self.draw_label(img, bbox.xmin(), bbox.ymin(), &label, color);
        }
    }

    /// Render track boxes, ids and bounded trajectories.
    pub fn draw_tracks(&self, img: &mut RgbImage, tracks: &[&Track]) {
        for track in tracks {
            let (r, g, b) = track.color;
            let color = Rgb([r, g, b]);
            let bbox = &track.bbox;
            self.draw_box(img, bbox.xmin(), bbox.ymin(), bbox.width(), bbox.height(), color);
            let label = format!("#{} {:.2}", track.id, bbox.confidence());
            self.draw_label(img, bbox.xmin(), bbox.ymin(), &label, color);

            for pair in track.trajectory.windows(2) {
                draw_line_segment_mut(
                    img,
                    (pair[0].x, pair[0].y),
                    (pair[1].x, pair[1].y),
                    color,
                );
            }
        }
    }

    /// Status line in the top-left corner (FPS etc).
    pub fn draw_hud(&self, img: &mut RgbImage, text: &str) {
        draw_text_mut(
            img,
            Rgb([0, 255, 0]),
            10,
            10,
            PxScale::from(HUD_SCALE),
            &self.font,
            text,
        );
    }

    fn draw_box(&self, img: &mut RgbImage, x: f32, y: f32, w: f32, h: f32, color: Rgb<u8>) {
        let (img_w, img_h) = img.dimensions();
        let x = (x.max(0.0) as i32).min(img_w as i32 - 1);
        let y = (y.max(0.0) as i32).min(img_h as i32 - 1);
        let w = (w as u32).clamp(1, img_w - x as u32);
        let h = (h as u32).clamp(1, img_h - y as u32);

        // two nested rects for a 2px border
        draw_hollow_rect_mut(img, Rect::at(x, y).of_size(w, h), color);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(img, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), color);
        }
    }

    fn draw_label(&self, img: &mut RgbImage, x: f32, y: f32, label: &str, color: Rgb<u8>) {
        let scale = PxScale::from(LABEL_SCALE);
        let (tw, th) = text_size(scale, &self.font, label);
        let x = x.max(0.0) as i32;
        // label sits above the box, or inside when the box touches the top edge
        let y = ((y as i32) - th as i32 - 2).max(0);

        let (img_w, img_h) = img.dimensions();
        let bg_w = (tw + 4).min(img_w.saturating_sub(x as u32));
        let bg_h = (th + 4).min(img_h.saturating_sub(y as u32));
        if bg_w > 0 && bg_h > 0 {
            draw_filled_rect_mut(img, Rect::at(x, y).of_size(bg_w, bg_h), color);
        }
        draw_text_mut(img, Rgb([0, 0, 0]), x + 2, y + 2, scale, &self.font, label);
    }
}
