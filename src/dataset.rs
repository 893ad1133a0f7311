//! Dataset directory layout, train→val splitting and YOLO label files.
//!
//! Layout on disk:
//! ```text
//! dataset/
//!   images/{train,val}/   *.jpg *.jpeg *.png *.bmp
//!   labels/{train,val}/   one .txt per image stem
//!   dataset.yaml          descriptor for the external trainer
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::Bbox;

pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// All image files directly under `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();
    images.sort();
    Ok(images)
}

/// Call `f` for every readable image under `dir`, in file-name order.
/// Unreadable files warn and are skipped; errors from `f` itself propagate.
/// Returns the number of images handed to `f`.
pub fn visit_images<F>(dir: &Path, mut f: F) -> Result<usize>
where
    F: FnMut(&Path, image::DynamicImage) -> Result<()>,
{
    let mut visited = 0;
    for path in list_images(dir)? {
        let img = match image::open(&path) {
            Ok(img) => img,
            Err(e) => {
                warn!("skipping unreadable image {}: {e}", path.display());
                continue;
            }
        };
        f(&path, img)?;
        visited += 1;
    }
    Ok(visited)
}

/// Same-stem `.txt` path under `labels_dir` for an image file.
pub fn label_path(labels_dir: &Path, image: &Path) -> PathBuf {
    let stem = image.file_stem().unwrap_or_default();
    labels_dir.join(stem).with_extension("txt")
}

#[derive(Debug, Default)]
pub struct SplitReport {
    pub copied_images: usize,
    pub copied_labels: usize,
    pub missing_labels: Vec<String>,
}

/// Copy the first `count` training images (lexicographic order) and their
/// matching labels into the val split. A missing label warns and is skipped;
/// the image is copied regardless.
pub fn populate_val_split(root: &Path, count: usize) -> Result<SplitReport> {
    let train_img_dir = root.join("images").join("train");
    let val_img_dir = root.join("images").join("val");
    let train_label_dir = root.join("labels").join("train");
    let val_label_dir = root.join("labels").join("val");

    fs::create_dir_all(&val_img_dir)?;
    fs::create_dir_all(&val_label_dir)?;

    let mut report = SplitReport::default();
    for image in list_images(&train_img_dir)?.into_iter().take(count) {
        let name = image.file_name().unwrap_or_default();
        fs::copy(&image, val_img_dir.join(name))
            .with_context(|| format!("failed to copy {}", image.display()))?;
        report.copied_images += 1;

        let src_label = label_path(&train_label_dir, &image);
        if src_label.exists() {
            let label_name = src_label.file_name().unwrap_or_default();
            fs::copy(&src_label, val_label_dir.join(label_name))?;
            report.copied_labels += 1;
        } else {
            warn!("label file not found for {}", name.to_string_lossy());
            report.missing_labels.push(name.to_string_lossy().into_owned());
        }
    }
    Ok(report)
}

/// Create the images/labels train/val directory tree.
pub fn prepare_layout(root: &Path) -> Result<()> {
    for sub in ["images/train", "images/val", "labels/train", "labels/val"] {
        fs::create_dir_all(root.join(sub))?;
    }
    Ok(())
}

/// The `dataset.yaml` the external trainer consumes.
#[derive(Debug, Clone)]
pub struct DatasetDescriptor {
    pub root: PathBuf,
    pub train: String,
    pub val: String,
    pub names: Vec<String>,
}

impl DatasetDescriptor {
    pub fn new(root: impl Into<PathBuf>, names: Vec<String>) -> Self {
        Self {
            root: root.into(),
            train: "images/train".to_string(),
            val: "images/val".to_string(),
            names,
        }
    }

    /// Write the descriptor. The format is small enough that we emit it
    /// directly, exactly as the trainer expects it.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut f = fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writeln!(f, "path: {}", self.root.display())?;
        writeln!(f, "train: {}", self.train)?;
        writeln!(f, "val: {}", self.val)?;
        writeln!(f)?;
        writeln!(f, "nc: {}", self.names.len())?;
        writeln!(
            f,
            "names: [{}]",
            self.names
                .iter()
                .map(|n| format!("'{n}'"))
                .collect::<Vec<_>>()
                .join(", ")
        )?;
        Ok(())
    }
}

/// One line of a YOLO label file: class id plus a normalized center box.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelBox {
    pub class_id: usize,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl LabelBox {
    /// Denormalize into pixel coordinates.
    pub fn to_bbox(&self, img_w: u32, img_h: u32) -> Bbox {
        let w = self.w * img_w as f32;
        let h = self.h * img_h as f32;
        Bbox::new(
            self.cx * img_w as f32 - w / 2.0,
            self.cy * img_h as f32 - h / 2.0,
            w,
            h,
            self.class_id,
            1.0,
        )
    }
}

/// Parse a label file; malformed lines warn and are skipped. A missing file
/// means "no objects" and yields an empty list.
pub fn load_labels(path: &Path) -> Result<Vec<LabelBox>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut labels = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_label_line(line) {
            Some(label) => labels.push(label),
            None => warn!(
                "skipping malformed label line {}:{}",
                path.display(),
                lineno + 1
            ),
        }
    }
    Ok(labels)
}

fn parse_label_line(line: &str) -> Option<LabelBox> {
    let mut it = line.split_whitespace();
    let class_id = it.next()?.parse().ok()?;
    let cx: f32 = it.next()?.parse().ok()?;
    let cy: f32 = it.next()?.parse().ok()?;
    let w: f32 = it.next()?.parse().ok()?;
    let h: f32 = it.next()?.parse().ok()?;
    if !(0.0..=1.0).contains(&cx) || !(0.0..=1.0).contains(&cy) || w <= 0.0 || h <= 0.0 {
        return None;
    }
    Some(LabelBox { class_id, cx, cy, w, h })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn seed_train(root: &Path, images: usize, labels: usize) {
        for i in 0..images {
            touch(&root.join(format!("images/train/img{i:02}.jpg")), "x");
        }
        for i in 0..labels {
            touch(
                &root.join(format!("labels/train/img{i:02}.txt")),
                "0 0.5 0.5 0.2 0.2\n",
            );
        }
    }

    #[test]
    fn split_copies_exactly_n_when_enough_images() {
        let dir = TempDir::new().unwrap();
        seed_train(dir.path(), 15, 15);

        let report = populate_val_split(dir.path(), 10).unwrap();
        assert_eq!(report.copied_images, 10);
        assert_eq!(report.copied_labels, 10);
        assert!(report.missing_labels.is_empty());
        assert_eq!(list_images(&dir.path().join("images/val")).unwrap().len(), 10);
    }

    #[test]
    fn split_copies_all_when_fewer_than_n() {
        let dir = TempDir::new().unwrap();
        seed_train(dir.path(), 4, 4);

        let report = populate_val_split(dir.path(), 10).unwrap();
        assert_eq!(report.copied_images, 4);
        assert_eq!(report.copied_labels, 4);
    }

    #[test]
    fn split_warns_for_each_missing_label() {
        let dir = TempDir::new().unwrap();
        seed_train(dir.path(), 6, 3);

        let report = populate_val_split(dir.path(), 6).unwrap();
        assert_eq!(report.copied_images, 6);
        assert_eq!(report.copied_labels, 3);
        assert_eq!(report.missing_labels.len(), 3);
    }

    #[test]
    fn split_ignores_non_image_files() {
        let dir = TempDir::new().unwrap();
        seed_train(dir.path(), 2, 2);
        touch(&dir.path().join("images/train/notes.txt"), "x");
        touch(&dir.path().join("images/train/IMG03.PNG"), "x");

        let report = populate_val_split(dir.path(), 10).unwrap();
        // uppercase extension counts, the txt does not
        assert_eq!(report.copied_images, 3);
    }

    #[test]
    fn unreadable_image_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]))
            .save(dir.path().join("ok.png"))
            .unwrap();
        // image extension, garbage contents
        touch(&dir.path().join("corrupt.jpg"), "not an image");

        let mut seen = Vec::new();
        let visited = visit_images(dir.path(), |path, img| {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            seen.push((name, img.width()));
            Ok(())
        })
        .unwrap();

        assert_eq!(visited, 1);
        assert_eq!(seen, vec![("ok.png".to_string(), 4)]);
    }

    #[test]
    fn descriptor_writes_expected_yaml() {
        let dir = TempDir::new().unwrap();
        let desc = DatasetDescriptor::new("./dataset", vec!["AK-47".to_string()]);
        let path = dir.path().join("dataset.yaml");
        desc.write(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("path: ./dataset"));
        assert!(text.contains("train: images/train"));
        assert!(text.contains("val: images/val"));
        assert!(text.contains("nc: 1"));
        assert!(text.contains("names: ['AK-47']"));
    }

    #[test]
    fn labels_parse_and_denormalize() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("img.txt");
        touch(&path, "0 0.5 0.5 0.25 0.5\nbogus line\n1 2.0 0.5 0.1 0.1\n");

        let labels = load_labels(&path).unwrap();
        assert_eq!(labels.len(), 1); // two malformed lines skipped
        let bbox = labels[0].to_bbox(640, 480);
        assert!((bbox.xmin() - 240.0).abs() < 1e-3);
        assert!((bbox.ymin() - 120.0).abs() < 1e-3);
        assert!((bbox.width() - 160.0).abs() < 1e-3);
        assert!((bbox.height() - 240.0).abs() < 1e-3);
    }

    #[test]
    fn missing_label_file_means_no_objects() {
        let labels = load_labels(Path::new("/nonexistent/never.txt")).unwrap();
        assert!(labels.is_empty());
    }
}
