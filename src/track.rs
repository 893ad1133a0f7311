//! ByteTrack-style multi-object tracking: Kalman-smoothed boxes, greedy IoU
//! association with a low-score rescue pass, bounded centroid trajectories.
//!
//! The tracker reports only what it can actually observe (ids, ages, hit
//! counts). Accuracy metrics come from `metrics` against label files, never
//! from the live loop.

use crate::Bbox;

/// Points kept per trajectory.
pub const TRAJECTORY_LEN: usize = 30;

#[derive(Clone, Copy, Debug)]
pub struct TrackPoint {
    pub x: f32,
    pub y: f32,
}

/// One tracked object.
#[derive(Clone)]
pub struct Track {
    pub id: u32,
    /// Current box, Kalman-smoothed.
    pub bbox: Bbox,
    kalman: KalmanBoxFilter,
    /// Centroid history, bounded at [`TRAJECTORY_LEN`].
    pub trajectory: Vec<TrackPoint>,
    /// Consecutive frames without a matching detection.
    pub frames_lost: u32,
    /// Frames in which a detection matched this track.
    pub hits: u32,
    pub color: (u8, u8, u8),
}

impl Track {
    fn new(id: u32, bbox: Bbox) -> Self {
        let kalman = KalmanBoxFilter::new(&bbox, 0.1, 0.5);
        let smoothed = kalman.state_bbox(&bbox);
        let (cx, cy) = smoothed.cxcy();
        Self {
            id,
            bbox: smoothed,
            kalman,
            trajectory: vec![TrackPoint { x: cx, y: cy }],
            frames_lost: 0,
            hits: 1,
            color: id_to_color(id),
        }
    }

    fn predict(&mut self) {
        self.kalman.predict();
        self.bbox = self.kalman.state_bbox(&self.bbox);
    }

    fn update(&mut self, detection: &Bbox) {
        self.kalman.update(detection);
        self.bbox = self.kalman.state_bbox(detection);
        self.frames_lost = 0;
        self.hits += 1;
        self.push_trajectory_point();
    }

    fn push_trajectory_point(&mut self) {
        let (cx, cy) = self.bbox.cxcy();
        self.trajectory.push(TrackPoint { x: cx, y: cy });
        if self.trajectory.len() > TRAJECTORY_LEN {
            self.trajectory.remove(0);
        }
    }

    pub fn center(&self) -> (f32, f32) {
        self.bbox.cxcy()
    }
}

/// Diagonal-covariance Kalman filter over [cx, cy, w, h, vx, vy, vw, vh],
/// constant-velocity model with mild decay.
#[derive(Clone)]
struct KalmanBoxFilter {
    state: [f32; 8],
    p: [f32; 8],
    q: f32,
    r: f32,
    velocity_decay: f32,
}

impl KalmanBoxFilter {
    fn new(bbox: &Bbox, q: f32, r: f32) -> Self {
        let (cx, cy) = bbox.cxcy();
        Self {
            state: [cx, cy, bbox.width(), bbox.height(), 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q,
            r,
            velocity_decay: 0.95,
        }
    }

    fn predict(&mut self) {
        self.state[4] *= self.velocity_decay;
        self.state[5] *= self.velocity_decay;
        self.state[6] *= 0.98;
        self.state[7] *= 0.98;

        self.state[0] += self.state[4];
        self.state[1] += self.state[5];
        self.state[2] += self.state[6];
        self.state[3] += self.state[7];

        for i in 0..8 {
            self.p[i] += self.q;
        }
    }

    fn update(&mut self, bbox: &Bbox) {
        let (cx, cy) = bbox.cxcy();
        let y = [
            cx - self.state[0],
            cy - self.state[1],
            bbox.width() - self.state[2],
            bbox.height() - self.state[3],
        ];

        let mut k = [0.0f32; 8];
        for i in 0..4 {
            k[i] = self.p[i] / (self.p[i] + self.r);
            // velocity components trust observations less
            k[i + 4] = self.p[i + 4] / (self.p[i + 4] + self.r * 10.0);
        }

        for i in 0..4 {
            self.state[i] += k[i] * y[i];
            self.state[i + 4] += k[i + 4] * y[i];
        }
        for i in 0..8 {
            self.p[i] *= 1.0 - k[i];
        }
    }

    /// Current smoothed box, carrying class and confidence from `like`.
    fn state_bbox(&self, like: &Bbox) -> Bbox {
        let cx = self.state[0];
        let cy = self.state[1];
        let w = self.state[2].max(1.0);
        let h = self.state[3].max(1.0);
        Bbox::new(
            cx - w / 2.0,
            cy - h / 2.0,
            w,
            h,
            like.class_id(),
            like.confidence(),
        )
    }
}

/// ByteTrack association: high-score detections match first, low-score
/// detections only rescue already-known tracks.
pub struct ByteTracker {
    tracks: Vec<Track>,
    next_id: u32,
    high_thresh: f32,
    low_thresh: f32,
    match_thresh: f32,
    max_lost: u32,
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(0.5, 0.1, 0.3, 30)
    }
}

impl ByteTracker {
    pub fn new(high_thresh: f32, low_thresh: f32, match_thresh: f32, max_lost: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            high_thresh,
            low_thresh,
            match_thresh,
            max_lost,
        }
    }

    /// Advance one frame. Returns the tracks matched in this frame.
    pub fn update(&mut self, detections: &[Bbox]) -> Vec<&Track> {
        for track in &mut self.tracks {
            track.predict();
        }

        let (high, low): (Vec<&Bbox>, Vec<&Bbox>) = detections
            .iter()
            .filter(|d| d.confidence() >= self.low_thresh)
            .partition(|d| d.confidence() >= self.high_thresh);

        let mut track_matched = vec![false; self.tracks.len()];

        // first pass: high-score detections against all tracks
        let unmatched_high = self.match_greedy(&high, &mut track_matched);

        // rescue pass: low-score detections against still-unmatched tracks
        let _ = self.match_greedy(&low, &mut track_matched);

        for (idx, matched) in track_matched.iter().enumerate() {
            if !matched {
                self.tracks[idx].frames_lost += 1;
            }
        }
        let max_lost = self.max_lost;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        // unmatched high-score detections start new tracks
        for det in unmatched_high {
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(Track::new(id, det));
        }

        self.tracks.iter().filter(|t| t.frames_lost == 0).collect()
    }

    /// Greedy best-IoU-first assignment. Returns the detections left over.
    fn match_greedy(&mut self, detections: &[&Bbox], track_matched: &mut [bool]) -> Vec<Bbox> {
        let mut pairs = Vec::new();
        for (d_idx, det) in detections.iter().enumerate() {
            for (t_idx, track) in self.tracks.iter().enumerate() {
                if track_matched[t_idx] {
                    continue;
                }
                let iou = track.bbox.iou(det);
                if iou >= self.match_thresh {
                    pairs.push((iou, d_idx, t_idx));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());

        let mut det_matched = vec![false; detections.len()];
        for (_, d_idx, t_idx) in pairs {
            if det_matched[d_idx] || track_matched[t_idx] {
                continue;
            }
            det_matched[d_idx] = true;
            track_matched[t_idx] = true;
            self.tracks[t_idx].update(detections[d_idx]);
        }

        detections
            .iter()
            .zip(det_matched)
            .filter(|(_, m)| !m)
            .map(|(d, _)| (*d).clone())
            .collect()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }
}

/// Distinct per-id colors via golden-angle hue sampling.
pub fn id_to_color(id: u32) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0;
    hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, conf: f32) -> Bbox {
        Bbox::new(x, y, 40.0, 40.0, 0, conf)
    }

    #[test]
    fn id_is_stable_across_adjacent_frames() {
        let mut tracker = ByteTracker::default();
        let first = tracker.update(&[det(100.0, 100.0, 0.9)]);
        assert_eq!(first.len(), 1);
        let id = first[0].id;

        // drifting a few pixels per frame keeps the same id
        for step in 1..10 {
            let tracks = tracker.update(&[det(100.0 + step as f32 * 3.0, 100.0, 0.9)]);
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].id, id);
        }
    }

    #[test]
    fn distant_detection_gets_a_new_id() {
        let mut tracker = ByteTracker::default();
        let id = tracker.update(&[det(0.0, 0.0, 0.9)])[0].id;
        let tracks = tracker.update(&[det(500.0, 500.0, 0.9)]);
        assert_eq!(tracks.len(), 1);
        assert_ne!(tracks[0].id, id);
    }

    #[test]
    fn trajectory_is_bounded() {
        let mut tracker = ByteTracker::default();
        for step in 0..(TRAJECTORY_LEN + 20) {
            tracker.update(&[det(step as f32 * 2.0, 50.0, 0.9)]);
        }
        assert_eq!(tracker.tracks[0].trajectory.len(), TRAJECTORY_LEN);
    }

    #[test]
    fn low_score_detection_rescues_but_never_spawns() {
        let mut tracker = ByteTracker::default();
        tracker.update(&[det(100.0, 100.0, 0.9)]);
        // low-score detection at the same place keeps the track alive
        let tracks = tracker.update(&[det(101.0, 100.0, 0.2)]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].hits, 2);

        // a lone low-score detection elsewhere does not create a track
        tracker.reset();
        let tracks = tracker.update(&[det(300.0, 300.0, 0.2)]);
        assert!(tracks.is_empty());
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn track_expires_after_max_lost_frames() {
        let mut tracker = ByteTracker::new(0.5, 0.1, 0.3, 3);
        tracker.update(&[det(100.0, 100.0, 0.9)]);
        for _ in 0..4 {
            tracker.update(&[]);
        }
        assert_eq!(tracker.track_count(), 0);
    }
}
