//! Per-image detection records, CSV output and summary statistics.
//!
//! Records are plain data so the reporting path is testable without a model:
//! whatever produced the counts, the CSV gets one row per readable image and
//! the summary is straight arithmetic over the rows.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::Detections;

/// One row of `detection_results.csv`. Header names match the report format
/// downstream tooling already consumes.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageRecord {
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Detections")]
    pub detections: usize,
    #[serde(rename = "Confidence")]
    pub confidence: f32,
}

impl ImageRecord {
    pub fn new(image: impl Into<String>, dets: &Detections) -> Self {
        Self {
            image: image.into(),
            detections: dets.count(),
            confidence: dets.mean_confidence(),
        }
    }
}

pub fn write_detection_csv(path: &Path, records: &[ImageRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// `metrics.csv`: one (metric, value) row per line.
pub fn write_metrics_csv(path: &Path, metrics: &[(&str, f32)]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    wtr.write_record(["Metric", "Value"])?;
    for (name, value) in metrics {
        wtr.write_record([name.to_string(), format!("{value:.3}")])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Aggregate statistics over an evaluation run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Summary {
    pub total_images: usize,
    pub total_detections: usize,
    pub images_with_detections: usize,
    pub avg_detections: f32,
    pub detection_rate: f32,
}

impl Summary {
    pub fn from_records(records: &[ImageRecord]) -> Self {
        let total_images = records.len();
        let total_detections: usize = records.iter().map(|r| r.detections).sum();
        let images_with_detections = records.iter().filter(|r| r.detections > 0).count();
        let (avg_detections, detection_rate) = if total_images > 0 {
            (
                total_detections as f32 / total_images as f32,
                images_with_detections as f32 / total_images as f32,
            )
        } else {
            (0.0, 0.0)
        };
        Self {
            total_images,
            total_detections,
            images_with_detections,
            avg_detections,
            detection_rate,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let f = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(f, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bbox;
    use tempfile::TempDir;

    fn record(name: &str, n: usize, conf: f32) -> ImageRecord {
        ImageRecord {
            image: name.into(),
            detections: n,
            confidence: conf,
        }
    }

    #[test]
    fn csv_row_count_equals_record_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detection_results.csv");
        let records = vec![
            record("a.jpg", 2, 0.8),
            record("b.jpg", 0, 0.0),
            record("c.jpg", 1, 0.6),
        ];
        write_detection_csv(&path, &records).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 1 + records.len()); // header + one row per image
        assert_eq!(lines[0], "Image,Detections,Confidence");
    }

    #[test]
    fn summary_arithmetic() {
        let records = vec![
            record("a.jpg", 3, 0.9),
            record("b.jpg", 0, 0.0),
            record("c.jpg", 1, 0.5),
            record("d.jpg", 0, 0.0),
        ];
        let s = Summary::from_records(&records);
        assert_eq!(s.total_images, 4);
        assert_eq!(s.total_detections, 4);
        assert_eq!(s.images_with_detections, 2);
        assert!((s.avg_detections - 1.0).abs() < 1e-6);
        assert!((s.detection_rate - 0.5).abs() < 1e-6);
    }

    #[test]
    fn summary_of_nothing_is_zero() {
        let s = Summary::from_records(&[]);
        assert_eq!(s.total_images, 0);
        assert_eq!(s.avg_detections, 0.0);
        assert_eq!(s.detection_rate, 0.0);
    }

    #[test]
    fn record_from_detections() {
        let dets = Detections::new(vec![
            Bbox::new(0., 0., 10., 10., 0, 0.4),
            Bbox::new(0., 0., 10., 10., 0, 0.8),
        ]);
        let r = ImageRecord::new("img.jpg", &dets);
        assert_eq!(r.detections, 2);
        assert!((r.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn metrics_csv_has_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.csv");
        write_metrics_csv(
            &path,
            &[("mAP50", 0.91), ("Precision", 0.88), ("Recall", 0.84)],
        )
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("Metric,Value"));
        assert!(text.contains("mAP50,0.910"));
    }
}
