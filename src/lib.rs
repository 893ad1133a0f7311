// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotate; // box/label/trajectory drawing
pub mod camera; // webcam capture through FFmpeg
pub mod config; // model + inference parameters
pub mod dataset; // dataset layout, splitting, labels
pub mod metrics; // ground-truth matching, AP50, confusion matrix
pub mod model; // YOLOv8 detect-task model
pub mod ort_backend;
pub mod plot; // bar charts and heatmaps for the reports
pub mod report; // per-image records, CSV output, summary stats
pub mod track; // ByteTrack-style IoU tracker
pub mod trainer; // dataset descriptor + external trainer delegation

pub use crate::config::ModelConfig;
pub use crate::model::YOLOv8;
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};

/// Greedy non-maximum suppression over detect-task boxes.
pub fn non_max_suppression(xs: &mut Vec<Bbox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence().partial_cmp(&b1.confidence()).unwrap());

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

/// Detections for one image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detections {
    bboxes: Vec<Bbox>,
}

impl Detections {
    pub fn new(bboxes: Vec<Bbox>) -> Self {
        Self { bboxes }
    }

    pub fn bboxes(&self) -> &[Bbox] {
        &self.bboxes
    }

    pub fn count(&self) -> usize {
        self.bboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bboxes.is_empty()
    }

    /// Mean confidence over all boxes, 0.0 when there are none.
    pub fn mean_confidence(&self) -> f32 {
        if self.bboxes.is_empty() {
            return 0.0;
        }
        self.bboxes.iter().map(|b| b.confidence()).sum::<f32>() / self.bboxes.len() as f32
    }
}

/// A bounding box around an object, in original-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bbox {
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    class_id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new(
        xmin: f32,
        ymin: f32,
        width: f32,
        height: f32,
        class_id: usize,
        confidence: f32,
    ) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            class_id,
            confidence,
        }
    }

    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32, class_id: usize, confidence: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1, class_id, confidence)
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn cxcy(&self) -> (f32, f32) {
        (self.xmin + self.width / 2., self.ymin + self.height / 2.)
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = (self.xmin + self.width).min(another.xmin + another.width);
        let t = self.ymin.max(another.ymin);
        let b = (self.ymin + self.height).min(another.ymin + another.height);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = Bbox::new(10., 10., 50., 50., 0, 0.9);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = Bbox::new(0., 0., 10., 10., 0, 0.9);
        let b = Bbox::new(100., 100., 10., 10., 0, 0.9);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn nms_keeps_highest_confidence_of_overlapping_boxes() {
        let mut boxes = vec![
            Bbox::new(10., 10., 50., 50., 0, 0.6),
            Bbox::new(12., 12., 50., 50., 0, 0.9),
            Bbox::new(200., 200., 40., 40., 0, 0.5),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].confidence(), 0.9);
        assert_eq!(boxes[1].confidence(), 0.5);
    }

    #[test]
    fn nms_keeps_non_overlapping_boxes() {
        let mut boxes = vec![
            Bbox::new(0., 0., 20., 20., 0, 0.8),
            Bbox::new(50., 50., 20., 20., 0, 0.7),
            Bbox::new(100., 100., 20., 20., 0, 0.6),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 3);
    }

    #[test]
    fn mean_confidence_is_zero_without_detections() {
        assert_eq!(Detections::default().mean_confidence(), 0.0);
    }

    #[test]
    fn mean_confidence_averages_boxes() {
        let dets = Detections::new(vec![
            Bbox::new(0., 0., 10., 10., 0, 0.4),
            Bbox::new(0., 0., 10., 10., 0, 0.8),
        ]);
        assert!((dets.mean_confidence() - 0.6).abs() < 1e-6);
    }
}
