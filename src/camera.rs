//! Webcam capture through FFmpeg input devices (dshow / avfoundation / v4l2).
//!
//! The decode callback runs on FFmpeg's thread; frames are converted to RGB
//! and handed to the caller over a bounded channel. When the consumer lags,
//! the stale frame is dropped so the live view never falls behind.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame, Input};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One decoded camera frame, packed RGB.
#[derive(Clone)]
pub struct CapturedFrame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub decode_fps: f64,
}

/// Live camera session. Dropping it (or calling [`stop`](Self::stop))
/// terminates the decode pipeline and releases the device.
pub struct CameraCapture {
    stop: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl CameraCapture {
    /// Open camera `device_index` and start decoding. Returns the session
    /// handle and the frame channel.
    pub fn open(device_index: usize, width: u32, height: u32) -> Result<(Self, Receiver<CapturedFrame>)> {
        let (tx, rx) = bounded(2);
        let stop = Arc::new(AtomicBool::new(false));

        let input_url = camera_url(device_index);
        let format = camera_format();
        info!(input = %input_url, format, "opening camera");

        let filter = DecodeFilter::new(tx, stop.clone());
        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("decode", Box::new(filter));
        let out = create_null_output().add_frame_pipeline(pipe);

        let video_size = format!("{width}x{height}");
        let input = Input::new(input_url)
            .set_format(format)
            .set_input_opts([("framerate", "30"), ("video_size", video_size.as_str())].into());

        let ctx = FfmpegContext::builder()
            .input(input)
            .output(out)
            .build()
            .map_err(|e| anyhow!("failed to open camera: {e}"))?;
        let scheduler = ctx
            .start()
            .map_err(|e| anyhow!("failed to start camera pipeline: {e}"))?;

        // wait() blocks until the filter reports the stop flag
        let worker = std::thread::spawn(move || {
            let _ = scheduler.wait();
            debug!("camera pipeline finished");
        });

        Ok((
            Self {
                stop,
                worker: Some(worker),
            },
            rx,
        ))
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Skip past frames that queued up while the consumer was busy. The channel
/// buffers at most two frames, so without this the loop would annotate video
/// that is permanently a couple of frames stale.
pub fn latest_frame(mut frame: CapturedFrame, rx: &Receiver<CapturedFrame>) -> CapturedFrame {
    while let Ok(newer) = rx.try_recv() {
        frame = newer;
    }
    frame
}

/// Enumerate the available video input devices.
pub fn list_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            warn!("failed to list camera devices: {e}");
            vec![]
        }
    }
}

fn camera_url(index: usize) -> String {
    #[cfg(target_os = "windows")]
    {
        let name = list_devices()
            .into_iter()
            .find(|(i, _)| *i == index)
            .map(|(_, n)| n)
            .unwrap_or_default();
        format!("video={name}")
    }
    #[cfg(target_os = "macos")]
    {
        format!("{index}")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        format!("/dev/video{index}")
    }
}

fn camera_format() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "dshow"
    }
    #[cfg(target_os = "macos")]
    {
        "avfoundation"
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        "v4l2"
    }
}

/// FFmpeg frame filter: validates frames, converts YUV420P to RGB, forwards
/// them over the channel.
#[derive(Clone)]
struct DecodeFilter {
    tx: Sender<CapturedFrame>,
    stop: Arc<AtomicBool>,
    count: usize,
    total_frames: usize,
    dropped_frames: usize,
    last: Instant,
    current_fps: f64,
}

impl DecodeFilter {
    fn new(tx: Sender<CapturedFrame>, stop: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            stop,
            count: 0,
            total_frames: 0,
            dropped_frames: 0,
            last: Instant::now(),
            current_fps: 0.0,
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        if self.stop.load(Ordering::Relaxed) {
            return Err("capture stopped".to_string());
        }

        unsafe {
            self.total_frames += 1;

            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.dropped_frames += 1;
                return Ok(None);
            }

            let w = (*frame.as_ptr()).width as u32;
            let h = (*frame.as_ptr()).height as u32;
            if w == 0 || h == 0 || w > 4096 || h > 4096 {
                self.dropped_frames += 1;
                return Ok(None);
            }

            let y_plane = (*frame.as_ptr()).data[0];
            let u_plane = (*frame.as_ptr()).data[1];
            let v_plane = (*frame.as_ptr()).data[2];
            let y_stride = (*frame.as_ptr()).linesize[0] as usize;
            let uv_stride = (*frame.as_ptr()).linesize[1] as usize;
            if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
                self.dropped_frames += 1;
                return Ok(None);
            }
            if y_stride < w as usize || uv_stride < (w as usize / 2) {
                self.dropped_frames += 1;
                return Ok(None);
            }

            self.count += 1;
            let mut rgb = vec![0u8; (w * h * 3) as usize];
            yuv420p_to_rgb(
                y_plane,
                u_plane,
                v_plane,
                y_stride,
                uv_stride,
                &mut rgb,
                w as usize,
                h as usize,
            );

            if self.last.elapsed().as_secs_f64() >= 1.0 {
                self.current_fps = self.count as f64 / self.last.elapsed().as_secs_f64();
                debug!(
                    decode_fps = self.current_fps,
                    total = self.total_frames,
                    dropped = self.dropped_frames,
                    "capture stats"
                );
                self.last = Instant::now();
                self.count = 0;
            }

            let captured = CapturedFrame {
                rgb,
                width: w,
                height: h,
                decode_fps: self.current_fps,
            };
            match self.tx.try_send(captured) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // consumer is busy; it drains to the newest queued frame
                    // through latest_frame before running inference
                    self.dropped_frames += 1;
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err("frame consumer gone".to_string());
                }
            }

            Ok(Some(frame))
        }
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        debug!("camera decode filter shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u8) -> CapturedFrame {
        CapturedFrame {
            rgb: vec![seq],
            width: 1,
            height: 1,
            decode_fps: 0.0,
        }
    }

    #[test]
    fn consumer_drains_to_the_newest_queued_frame() {
        let (tx, rx) = bounded(2);
        // producer outruns the consumer; frames 3..=5 bounce off the full queue
        for seq in 1..=5u8 {
            let _ = tx.try_send(frame(seq));
        }

        let first = rx.recv().unwrap();
        assert_eq!(first.rgb[0], 1);
        let freshest = latest_frame(first, &rx);
        assert_eq!(freshest.rgb[0], 2);
        assert!(rx.try_recv().is_err()); // queue fully drained

        // whatever arrives next is current, not backlog
        tx.try_send(frame(6)).unwrap();
        let next = latest_frame(rx.recv().unwrap(), &rx);
        assert_eq!(next.rgb[0], 6);
    }
}

/// Scalar BT.601 YUV420P → packed RGB.
#[allow(clippy::too_many_arguments)]
unsafe fn yuv420p_to_rgb(
    y_plane: *const u8,
    u_plane: *const u8,
    v_plane: *const u8,
    y_stride: usize,
    uv_stride: usize,
    buffer: &mut [u8],
    width: usize,
    height: usize,
) {
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let y_val = *y_plane.add(y_row + x) as i32;
            let u_val = *u_plane.add(uv_row + (x >> 1)) as i32 - 128;
            let v_val = *v_plane.add(uv_row + (x >> 1)) as i32 - 128;

            buffer[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 1] =
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
}
