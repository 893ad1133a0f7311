//! Live webcam detection with tracking.
//!
//! Frames come in over a bounded channel; when inference falls behind the
//! camera, stale frames are dropped at the source. The on-screen stats are
//! runtime facts only (FPS, track ids, hit counts). Accuracy numbers come
//! from the `val` binary, which has ground truth to compare against.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use akdet::annotate::Annotator;
use akdet::camera::CameraCapture;
use akdet::track::ByteTracker;
use akdet::{gen_time_string, ModelConfig, YOLOv8};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(about = "Watch a webcam feed for AK-47s")]
struct Args {
    /// Camera device index
    #[arg(long, default_value_t = 0)]
    camera: usize,

    /// Capture width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// List available cameras and exit
    #[arg(long)]
    list: bool,

    /// Directory for periodic annotated snapshots
    #[arg(long, default_value = "snapshots")]
    snapshot_dir: PathBuf,

    /// Seconds between snapshots, 0 disables them
    #[arg(long, default_value_t = 5)]
    snapshot_interval: u64,

    #[command(flatten)]
    model: ModelConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    if args.list {
        for (index, name) in akdet::camera::list_devices() {
            info!(index, name = %name, "camera");
        }
        return Ok(());
    }

    let model = YOLOv8::new(args.model)?;
    model.summary();
    let annotator = Annotator::new(model.names().to_vec(), model.color_palette().to_vec())?;
    let mut tracker = ByteTracker::new(0.5, 0.1, 0.3, 30);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    if args.snapshot_interval > 0 {
        std::fs::create_dir_all(&args.snapshot_dir)?;
    }

    let (capture, frames) =
        CameraCapture::open(args.camera, args.capture_width, args.capture_height)?;
    info!("watching; press Ctrl-C to stop");

    let started = Instant::now();
    let mut last_snapshot = Instant::now();
    let mut fps = 0.0f64;
    let mut frames_processed = 0u64;
    let mut frames_with_detections = 0u64;
    let mut total_detections = 0u64;
    let mut seen_ids: HashSet<u32> = HashSet::new();

    while running.load(Ordering::Relaxed) {
        let frame = match frames.recv_timeout(Duration::from_millis(500)) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("camera pipeline stopped");
                break;
            }
        };
        // skip anything that queued up during the previous inference
        let frame = akdet::camera::latest_frame(frame, &frames);

        let t0 = Instant::now();
        let rgb = image::RgbImage::from_raw(frame.width, frame.height, frame.rgb)
            .context("frame buffer size mismatch")?;
        let img = image::DynamicImage::ImageRgb8(rgb);

        let dets = model
            .run(&[img.clone()])?
            .into_iter()
            .next()
            .unwrap_or_default();
        let tracks = tracker.update(dets.bboxes());

        frames_processed += 1;
        total_detections += dets.count() as u64;
        if !dets.is_empty() {
            frames_with_detections += 1;
        }
        for track in &tracks {
            seen_ids.insert(track.id);
        }

        let dt = t0.elapsed().as_secs_f64();
        // smoothed over recent frames
        fps = if fps == 0.0 { 1.0 / dt } else { fps * 0.9 + 0.1 / dt };

        let mut canvas = img.to_rgb8();
        annotator.draw_tracks(&mut canvas, &tracks);
        annotator.draw_hud(
            &mut canvas,
            &format!("FPS {:.1} | tracks {} | capture {:.1}", fps, tracks.len(), frame.decode_fps),
        );

        if args.snapshot_interval > 0
            && last_snapshot.elapsed() >= Duration::from_secs(args.snapshot_interval)
        {
            let path = args
                .snapshot_dir
                .join(format!("snapshot_{}.jpg", gen_time_string("-")));
            if let Err(e) = canvas.save(&path) {
                warn!("failed to save snapshot: {e}");
            } else {
                info!(path = %path.display(), "snapshot saved");
            }
            last_snapshot = Instant::now();
        }
    }

    capture.stop();
    let elapsed = started.elapsed().as_secs_f64();
    info!(
        frames = frames_processed,
        frames_with_detections,
        total_detections,
        unique_tracks = seen_ids.len(),
        avg_fps = if elapsed > 0.0 { frames_processed as f64 / elapsed } else { 0.0 },
        "session summary"
    );
    Ok(())
}
