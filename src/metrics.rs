//! Detection metrics against ground-truth labels: precision, recall, AP50,
//! mAP50 and a confusion matrix with a background row/column.
//!
//! Everything here is computed from explicit label files. The live loop has
//! no access to ground truth and therefore reports no accuracy numbers.

use crate::Bbox;

pub const DEFAULT_MATCH_IOU: f32 = 0.5;

/// IoU grid for mAP50-95: 0.50:0.05:0.95.
pub const AP_IOU_THRESHOLDS: [f32; 10] = [
    0.50, 0.55, 0.60, 0.65, 0.70, 0.75, 0.80, 0.85, 0.90, 0.95,
];

/// Streaming accumulator: feed it one image at a time, then `finish()`.
pub struct MetricsAccumulator {
    nc: usize,
    iou_thresh: f32,
    /// Per class: (confidence, matched-a-ground-truth) for every detection,
    /// matched at `iou_thresh`. Feeds precision/recall.
    per_class_dets: Vec<Vec<(f32, bool)>>,
    /// Same detection entries matched at every [`AP_IOU_THRESHOLDS`] step,
    /// indexed `[threshold][class]`. Feeds AP50 and mAP50-95.
    ap_dets: Vec<Vec<Vec<(f32, bool)>>>,
    /// Per class: ground-truth box count.
    per_class_gt: Vec<usize>,
    confusion: ConfusionMatrix,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionMetrics {
    /// Mean over classes with ground truth.
    pub precision: f32,
    pub recall: f32,
    pub map50: f32,
    /// Mean AP over the 0.50:0.05:0.95 IoU grid.
    pub map50_95: f32,
    /// AP50 per class.
    pub per_class_ap: Vec<f32>,
}

impl MetricsAccumulator {
    pub fn new(nc: usize, iou_thresh: f32) -> Self {
        Self {
            nc,
            iou_thresh,
            per_class_dets: vec![Vec::new(); nc],
            ap_dets: vec![vec![Vec::new(); nc]; AP_IOU_THRESHOLDS.len()],
            per_class_gt: vec![0; nc],
            confusion: ConfusionMatrix::new(nc),
        }
    }

    /// Record one image. Matching is greedy, highest-confidence detection
    /// first, one detection per ground-truth box.
    pub fn observe(&mut self, detections: &[Bbox], ground_truth: &[Bbox]) {
        for gt in ground_truth {
            if gt.class_id() < self.nc {
                self.per_class_gt[gt.class_id()] += 1;
            }
        }

        let mut order: Vec<usize> = (0..detections.len()).collect();
        order.sort_by(|&a, &b| {
            detections[b]
                .confidence()
                .partial_cmp(&detections[a].confidence())
                .unwrap()
        });

        // AP matching requires the classes to agree; the confusion matrix
        // pairs by IoU alone so cross-class mistakes show up off-diagonal.
        let mut gt_taken_ap = vec![false; ground_truth.len()];
        let mut gt_taken_cm = vec![false; ground_truth.len()];

        for &d_idx in &order {
            let det = &detections[d_idx];
            if det.class_id() >= self.nc {
                continue;
            }

            let best_same_class = best_match(det, ground_truth, &gt_taken_ap, self.iou_thresh, true);
            let matched = if let Some(g_idx) = best_same_class {
                gt_taken_ap[g_idx] = true;
                true
            } else {
                false
            };
            self.per_class_dets[det.class_id()].push((det.confidence(), matched));

            match best_match(det, ground_truth, &gt_taken_cm, self.iou_thresh, false) {
                Some(g_idx) => {
                    gt_taken_cm[g_idx] = true;
                    self.confusion
                        .increment(Some(det.class_id()), Some(ground_truth[g_idx].class_id()));
                }
                None => self.confusion.increment(Some(det.class_id()), None),
            }
        }

        for (g_idx, taken) in gt_taken_cm.iter().enumerate() {
            if !taken {
                self.confusion
                    .increment(None, Some(ground_truth[g_idx].class_id()));
            }
        }

        // the same greedy matching, once per IoU step of the mAP50-95 grid
        for (t_idx, &thresh) in AP_IOU_THRESHOLDS.iter().enumerate() {
            let mut gt_taken = vec![false; ground_truth.len()];
            for &d_idx in &order {
                let det = &detections[d_idx];
                if det.class_id() >= self.nc {
                    continue;
                }
                let matched = match best_match(det, ground_truth, &gt_taken, thresh, true) {
                    Some(g_idx) => {
                        gt_taken[g_idx] = true;
                        true
                    }
                    None => false,
                };
                self.ap_dets[t_idx][det.class_id()].push((det.confidence(), matched));
            }
        }
    }

    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    pub fn finish(&self) -> DetectionMetrics {
        let mut precisions = Vec::new();
        let mut recalls = Vec::new();

        for class in 0..self.nc {
            let gt_total = self.per_class_gt[class];
            let dets = &self.per_class_dets[class];
            if gt_total == 0 && dets.is_empty() {
                continue;
            }

            let tp = dets.iter().filter(|(_, m)| *m).count() as f32;
            let fp = dets.len() as f32 - tp;
            precisions.push(if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 });
            recalls.push(if gt_total > 0 {
                tp / gt_total as f32
            } else {
                0.0
            });
        }

        // mAP at every grid step; index 0 is the 0.50 threshold
        let mut per_class_ap = Vec::new();
        let mut map_per_thresh = Vec::with_capacity(AP_IOU_THRESHOLDS.len());
        for (t_idx, _) in AP_IOU_THRESHOLDS.iter().enumerate() {
            let mut aps = Vec::new();
            for class in 0..self.nc {
                let gt_total = self.per_class_gt[class];
                let dets = &self.ap_dets[t_idx][class];
                if gt_total == 0 && dets.is_empty() {
                    continue;
                }
                aps.push(average_precision(dets.clone(), gt_total));
            }
            map_per_thresh.push(mean(&aps));
            if t_idx == 0 {
                per_class_ap = aps;
            }
        }

        DetectionMetrics {
            precision: mean(&precisions),
            recall: mean(&recalls),
            map50: map_per_thresh[0],
            map50_95: mean(&map_per_thresh),
            per_class_ap,
        }
    }
}

fn mean(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f32>() / xs.len() as f32
    }
}

fn best_match(
    det: &Bbox,
    ground_truth: &[Bbox],
    taken: &[bool],
    iou_thresh: f32,
    same_class: bool,
) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (g_idx, gt) in ground_truth.iter().enumerate() {
        if taken[g_idx] || (same_class && gt.class_id() != det.class_id()) {
            continue;
        }
        let iou = det.iou(gt);
        if iou >= iou_thresh && best.map(|(_, b)| iou > b).unwrap_or(true) {
            best = Some((g_idx, iou));
        }
    }
    best.map(|(g_idx, _)| g_idx)
}

/// AP at a single IoU threshold: precision envelope integrated over recall.
fn average_precision(mut dets: Vec<(f32, bool)>, gt_total: usize) -> f32 {
    if gt_total == 0 || dets.is_empty() {
        return 0.0;
    }
    dets.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());

    let mut tp = 0.0f32;
    let mut fp = 0.0f32;
    let mut recalls = Vec::with_capacity(dets.len());
    let mut precisions = Vec::with_capacity(dets.len());
    for (_, matched) in &dets {
        if *matched {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        recalls.push(tp / gt_total as f32);
        precisions.push(tp / (tp + fp));
    }

    // monotone precision envelope, right to left
    for i in (0..precisions.len().saturating_sub(1)).rev() {
        precisions[i] = precisions[i].max(precisions[i + 1]);
    }

    let mut ap = 0.0;
    let mut prev_recall = 0.0;
    for (r, p) in recalls.iter().zip(&precisions) {
        ap += (r - prev_recall) * p;
        prev_recall = *r;
    }
    ap
}

/// (nc + 1)² counts; row = predicted class, column = true class, the last
/// index is background (FP row, FN column).
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    nc: usize,
    data: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(nc: usize) -> Self {
        Self {
            nc,
            data: vec![0; (nc + 1) * (nc + 1)],
        }
    }

    /// `None` stands for background on either side.
    pub fn increment(&mut self, predicted: Option<usize>, truth: Option<usize>) {
        let row = predicted.unwrap_or(self.nc).min(self.nc);
        let col = truth.unwrap_or(self.nc).min(self.nc);
        self.data[row * (self.nc + 1) + col] += 1;
    }

    pub fn get(&self, predicted: Option<usize>, truth: Option<usize>) -> u64 {
        let row = predicted.unwrap_or(self.nc).min(self.nc);
        let col = truth.unwrap_or(self.nc).min(self.nc);
        self.data[row * (self.nc + 1) + col]
    }

    /// Side length, classes plus background.
    pub fn size(&self) -> usize {
        self.nc + 1
    }

    pub fn total(&self) -> u64 {
        self.data.iter().sum()
    }

    /// Cells as percentages of the grand total (what the report plots).
    pub fn normalized_percent(&self) -> Vec<f32> {
        let total = self.total().max(1) as f32;
        self.data
            .iter()
            .map(|&v| v as f32 / total * 100.0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gt(x: f32, y: f32) -> Bbox {
        Bbox::new(x, y, 50.0, 50.0, 0, 1.0)
    }

    fn det(x: f32, y: f32, conf: f32) -> Bbox {
        Bbox::new(x, y, 50.0, 50.0, 0, conf)
    }

    #[test]
    fn perfect_predictions_score_one() {
        let mut acc = MetricsAccumulator::new(1, DEFAULT_MATCH_IOU);
        acc.observe(
            &[det(0.0, 0.0, 0.9), det(100.0, 100.0, 0.8)],
            &[gt(0.0, 0.0), gt(100.0, 100.0)],
        );

        let m = acc.finish();
        assert!((m.precision - 1.0).abs() < 1e-6);
        assert!((m.recall - 1.0).abs() < 1e-6);
        assert!((m.map50 - 1.0).abs() < 1e-6);
        assert!((m.map50_95 - 1.0).abs() < 1e-6);
        assert_eq!(acc.confusion().get(Some(0), Some(0)), 2);
        assert_eq!(acc.confusion().get(Some(0), None), 0);
        assert_eq!(acc.confusion().get(None, Some(0)), 0);
    }

    #[test]
    fn missed_box_halves_recall() {
        let mut acc = MetricsAccumulator::new(1, DEFAULT_MATCH_IOU);
        acc.observe(&[det(0.0, 0.0, 0.9)], &[gt(0.0, 0.0), gt(300.0, 300.0)]);

        let m = acc.finish();
        assert!((m.precision - 1.0).abs() < 1e-6);
        assert!((m.recall - 0.5).abs() < 1e-6);
        assert!((m.map50 - 0.5).abs() < 1e-6);
        assert_eq!(acc.confusion().get(None, Some(0)), 1); // FN
    }

    #[test]
    fn false_positive_lowers_precision() {
        let mut acc = MetricsAccumulator::new(1, DEFAULT_MATCH_IOU);
        acc.observe(
            &[det(0.0, 0.0, 0.9), det(300.0, 300.0, 0.8)],
            &[gt(0.0, 0.0)],
        );

        let m = acc.finish();
        assert!((m.precision - 0.5).abs() < 1e-6);
        assert!((m.recall - 1.0).abs() < 1e-6);
        assert_eq!(acc.confusion().get(Some(0), None), 1); // FP
    }

    #[test]
    fn only_one_detection_matches_each_ground_truth() {
        let mut acc = MetricsAccumulator::new(1, DEFAULT_MATCH_IOU);
        // two near-identical detections over a single box: second one is a FP
        acc.observe(&[det(0.0, 0.0, 0.9), det(2.0, 2.0, 0.8)], &[gt(0.0, 0.0)]);

        let m = acc.finish();
        assert!((m.precision - 0.5).abs() < 1e-6);
        assert!((m.recall - 1.0).abs() < 1e-6);
    }

    #[test]
    fn low_iou_match_is_rejected() {
        let mut acc = MetricsAccumulator::new(1, DEFAULT_MATCH_IOU);
        acc.observe(&[det(40.0, 40.0, 0.9)], &[gt(0.0, 0.0)]); // IoU ≈ 0.08

        let m = acc.finish();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
    }

    #[test]
    fn map50_95_averages_over_the_iou_grid() {
        let mut acc = MetricsAccumulator::new(1, DEFAULT_MATCH_IOU);
        // 50x50 boxes offset by 10px vertically: IoU = 2000/3000 = 2/3,
        // a match at 0.50..=0.65 and a miss at 0.70 and above
        acc.observe(&[Bbox::new(0.0, 10.0, 50.0, 50.0, 0, 0.9)], &[gt(0.0, 0.0)]);

        let m = acc.finish();
        assert!((m.map50 - 1.0).abs() < 1e-6);
        assert!((m.map50_95 - 0.4).abs() < 1e-6); // 4 of 10 thresholds
    }

    #[test]
    fn confusion_matrix_percentages_sum_to_hundred() {
        let mut acc = MetricsAccumulator::new(1, DEFAULT_MATCH_IOU);
        acc.observe(
            &[det(0.0, 0.0, 0.9), det(300.0, 300.0, 0.8)],
            &[gt(0.0, 0.0), gt(500.0, 500.0)],
        );
        let sum: f32 = acc.confusion().normalized_percent().iter().sum();
        assert!((sum - 100.0).abs() < 1e-3);
    }
}
