//! Report plots rendered with the same drawing primitives the annotator
//! uses: per-image bar charts and a confusion-matrix heatmap.

use ab_glyph::{FontVec, PxScale};
use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::annotate::load_font;
use crate::metrics::ConfusionMatrix;

const BG: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([60, 60, 60]);
const BAR: Rgb<u8> = Rgb([70, 130, 180]);
const TEXT: Rgb<u8> = Rgb([20, 20, 20]);

const MARGIN: u32 = 60;
const PLOT_H: u32 = 480;
const BAR_SLOT: u32 = 70;

pub struct Plotter {
    font: FontVec,
}

impl Plotter {
    pub fn new() -> Result<Self> {
        Ok(Self { font: load_font()? })
    }

    /// Vertical bar chart; one slot per label, values annotated on top.
    pub fn bar_chart(&self, title: &str, labels: &[String], values: &[f32]) -> RgbImage {
        let n = labels.len().max(1) as u32;
        let width = (MARGIN * 2 + n * BAR_SLOT).max(320);
        let mut img = RgbImage::from_pixel(width, PLOT_H, BG);

        let scale = PxScale::from(14.0);
        let title_scale = PxScale::from(20.0);
        draw_text_mut(&mut img, TEXT, MARGIN as i32, 10, title_scale, &self.font, title);

        let x0 = MARGIN as f32;
        let y0 = (PLOT_H - MARGIN) as f32;
        let plot_top = MARGIN as f32;
        draw_line_segment_mut(&mut img, (x0, y0), ((width - MARGIN / 2) as f32, y0), AXIS);
        draw_line_segment_mut(&mut img, (x0, y0), (x0, plot_top), AXIS);

        let max_value = values.iter().cloned().fold(0.0f32, f32::max).max(1e-6);
        for (i, (label, &value)) in labels.iter().zip(values).enumerate() {
            let slot_x = MARGIN + i as u32 * BAR_SLOT;
            let bar_w = BAR_SLOT * 3 / 5;
            let bar_h = ((value / max_value) * (y0 - plot_top - 10.0)) as u32;
            let bar_x = slot_x + (BAR_SLOT - bar_w) / 2;
            let bar_y = y0 as u32 - bar_h;

            if bar_h > 0 {
                draw_filled_rect_mut(
                    &mut img,
                    Rect::at(bar_x as i32, bar_y as i32).of_size(bar_w, bar_h),
                    BAR,
                );
            }

            let value_text = trim_float(value);
            let (tw, _) = text_size(scale, &self.font, &value_text);
            draw_text_mut(
                &mut img,
                TEXT,
                (bar_x + bar_w / 2) as i32 - tw as i32 / 2,
                bar_y.saturating_sub(18) as i32,
                scale,
                &self.font,
                &value_text,
            );

            let short = truncate_label(label, 9);
            let (lw, _) = text_size(scale, &self.font, &short);
            draw_text_mut(
                &mut img,
                TEXT,
                (slot_x + BAR_SLOT / 2) as i32 - lw as i32 / 2,
                (y0 + 8.0) as i32,
                scale,
                &self.font,
                &short,
            );
        }
        img
    }

    /// Percent-normalized confusion matrix as a blue heatmap with annotated
    /// cells. `class_names` excludes the implicit background class.
    pub fn confusion_heatmap(&self, cm: &ConfusionMatrix, class_names: &[String]) -> RgbImage {
        let size = cm.size();
        let cell: u32 = 90;
        let width = MARGIN * 2 + size as u32 * cell;
        let height = MARGIN * 2 + size as u32 * cell;
        let mut img = RgbImage::from_pixel(width, height, BG);

        let scale = PxScale::from(14.0);
        let title_scale = PxScale::from(20.0);
        draw_text_mut(
            &mut img,
            TEXT,
            MARGIN as i32,
            10,
            title_scale,
            &self.font,
            "Confusion Matrix (%)",
        );

        let name_of = |idx: usize| -> String {
            class_names
                .get(idx)
                .cloned()
                .unwrap_or_else(|| "background".to_string())
        };

        let percents = cm.normalized_percent();
        let max_pct = percents.iter().cloned().fold(0.0f32, f32::max).max(1e-6);

        for row in 0..size {
            for col in 0..size {
                let pct = percents[row * size + col];
                let x = MARGIN + col as u32 * cell;
                let y = MARGIN + row as u32 * cell;
                draw_filled_rect_mut(
                    &mut img,
                    Rect::at(x as i32, y as i32).of_size(cell - 2, cell - 2),
                    blues(pct / max_pct),
                );

                let label = format!("{pct:.1}");
                let (tw, th) = text_size(scale, &self.font, &label);
                // dark cells get light text
                let color = if pct / max_pct > 0.55 { BG } else { TEXT };
                draw_text_mut(
                    &mut img,
                    color,
                    (x + cell / 2) as i32 - tw as i32 / 2,
                    (y + cell / 2) as i32 - th as i32 / 2,
                    scale,
                    &self.font,
                    &label,
                );
            }
        }

        // axis labels: columns = true class, rows = predicted class
        for i in 0..size {
            let name = truncate_label(&name_of(i), 10);
            let (tw, _) = text_size(scale, &self.font, &name);
            draw_text_mut(
                &mut img,
                TEXT,
                (MARGIN + i as u32 * cell + cell / 2) as i32 - tw as i32 / 2,
                (MARGIN + size as u32 * cell + 8) as i32,
                scale,
                &self.font,
                &name,
            );
            draw_text_mut(
                &mut img,
                TEXT,
                4,
                (MARGIN + i as u32 * cell + cell / 2) as i32 - 7,
                scale,
                &self.font,
                &name,
            );
        }
        let (tw, _) = text_size(scale, &self.font, "True");
        draw_text_mut(
            &mut img,
            TEXT,
            (width / 2) as i32 - tw as i32 / 2,
            (height - 24) as i32,
            scale,
            &self.font,
            "True",
        );
        draw_text_mut(&mut img, TEXT, 4, 30, scale, &self.font, "Predicted");

        img
    }
}

/// Place two panels next to each other on a shared canvas.
pub fn two_panel(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let gap = 20u32;
    let width = left.width() + right.width() + gap;
    let height = left.height().max(right.height());
    let mut out = RgbImage::from_pixel(width, height, BG);
    image::imageops::overlay(&mut out, left, 0, 0);
    image::imageops::overlay(&mut out, right, (left.width() + gap) as i64, 0);
    out
}

/// White → dark blue ramp, t in [0, 1].
fn blues(t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: f32, b: f32| (a + (b - a) * t) as u8;
    Rgb([lerp(247.0, 8.0), lerp(251.0, 48.0), lerp(255.0, 107.0)])
}

fn trim_float(v: f32) -> String {
    if (v - v.round()).abs() < 1e-6 {
        format!("{}", v.round() as i64)
    } else {
        format!("{v:.2}")
    }
}

fn truncate_label(label: &str, max: usize) -> String {
    if label.chars().count() <= max {
        label.to_string()
    } else {
        let head: String = label.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blues_ramp_is_monotonically_darker() {
        let a = blues(0.0);
        let b = blues(0.5);
        let c = blues(1.0);
        assert!(a.0[0] > b.0[0] && b.0[0] > c.0[0]);
        assert!(a.0[2] > c.0[2]);
    }

    #[test]
    fn labels_truncate_cleanly() {
        assert_eq!(truncate_label("short", 9), "short");
        assert_eq!(truncate_label("very-long-image-name.jpg", 9), "very-lon…");
    }

    #[test]
    fn floats_trim_for_display() {
        assert_eq!(trim_float(3.0), "3");
        assert_eq!(trim_float(0.847), "0.85");
    }

    #[test]
    fn two_panel_spans_both_images() {
        let left = RgbImage::from_pixel(100, 80, BG);
        let right = RgbImage::from_pixel(60, 120, BG);
        let out = two_panel(&left, &right);
        assert_eq!(out.width(), 180);
        assert_eq!(out.height(), 120);
    }
}
