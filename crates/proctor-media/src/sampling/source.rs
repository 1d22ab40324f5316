//! Frame sources.
//!
//! A source yields every decoded frame in stream order, tagged with its
//! decoded position. Sampling and timestamping happen one level up in
//! [`FrameSampler`](super::FrameSampler), so every source gets the same
//! timestamp contract.
//!
//! - [`FfmpegFrameSource`]: streams `rgb24` rawvideo out of an FFmpeg child
//!   process, one frame buffer at a time
//! - [`MemoryFrameSource`]: in-memory frames for tests and replays

use async_trait::async_trait;
use image::RgbImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::frame::RawFrame;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// Maximum stderr retained from the decoder for error reports.
const STDERR_TAIL_BYTES: usize = 4096;

/// Sequential source of decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Frame rate measured from the source, if it could be determined.
    fn fps(&self) -> Option<f64>;

    /// Duration reported by the container, if known.
    fn duration(&self) -> Option<f64>;

    /// Next decoded frame, `Ok(None)` at end of stream.
    ///
    /// Decode failures are returned as errors, never as an early end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>>;

    /// Source name for logging.
    fn name(&self) -> &'static str;
}

/// Settings for FFmpeg decoding.
#[derive(Debug, Clone)]
pub struct FfmpegSourceConfig {
    /// Frames are downscaled to this width (aspect preserved) before analysis
    pub analysis_width: u32,
}

impl Default for FfmpegSourceConfig {
    fn default() -> Self {
        Self { analysis_width: 640 }
    }
}

/// Decodes a video file through FFmpeg and streams raw RGB frames.
///
/// Frame timing is passed through untouched (no rate conversion), so the
/// position of a frame in the pipe is its decoded index.
pub struct FfmpegFrameSource {
    path: PathBuf,
    info: VideoInfo,
    width: u32,
    height: u32,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    buffer: Vec<u8>,
    next_index: u64,
    finished: bool,
}

impl FfmpegFrameSource {
    /// Probe the file and start the decoder.
    pub async fn open(path: impl AsRef<Path>, config: &FfmpegSourceConfig) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let info = probe_video(&path).await?;

        if info.width == 0 || info.height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "Video stream has no dimensions: {}",
                path.display()
            )));
        }

        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let (width, height) = analysis_dimensions(info.width, info.height, config.analysis_width);
        let filter = format!("scale={}:{}", width, height);

        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(&path)
            .args([
                "-map",
                "0:v:0",
                "-an",
                "-sn",
                "-fps_mode",
                "passthrough",
                "-vf",
                &filter,
                "-pix_fmt",
                "rgb24",
                "-f",
                "rawvideo",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::decode_failed(format!("Failed to spawn FFmpeg: {}", e), None, None))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::decode_failed("Failed to capture FFmpeg stdout", None, None))?;

        // Drain stderr concurrently so a chatty decoder can never block on a full pipe.
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(collect_tail(stderr)));

        info!(
            path = %path.display(),
            source_size = format!("{}x{}", info.width, info.height),
            analysis_size = format!("{}x{}", width, height),
            fps = ?info.fps,
            "Started FFmpeg frame decoder"
        );

        let frame_bytes = width as usize * height as usize * 3;
        Ok(Self {
            path,
            info,
            width,
            height,
            child,
            stdout: BufReader::new(stdout),
            stderr_task,
            buffer: vec![0u8; frame_bytes],
            next_index: 0,
            finished: false,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Dimensions of the frames this source yields.
    pub fn analysis_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;

        let status = self.child.wait().await.map_err(|e| {
            MediaError::decode_failed(format!("FFmpeg process error: {}", e), None, None)
        })?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(MediaError::decode_failed(
                format!("FFmpeg exited with {} while decoding {}", status, self.path.display()),
                (!stderr.is_empty()).then_some(stderr),
                status.code(),
            ));
        }

        if !stderr.trim().is_empty() {
            warn!(path = %self.path.display(), stderr = %stderr.trim(), "FFmpeg reported decode warnings");
        }

        debug!(path = %self.path.display(), frames = self.next_index, "FFmpeg decoder finished");
        Ok(())
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn fps(&self) -> Option<f64> {
        self.info.fps
    }

    fn duration(&self) -> Option<f64> {
        self.info.known_duration()
    }

    async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
        if self.finished {
            return Ok(None);
        }

        let filled = read_full(&mut self.stdout, &mut self.buffer).await.map_err(|e| {
            MediaError::decode_failed(format!("Failed to read FFmpeg output: {}", e), None, None)
        })?;

        if filled == 0 {
            self.finish().await?;
            return Ok(None);
        }

        if filled < self.buffer.len() {
            // Surface the process error first if FFmpeg died mid-frame.
            self.finish().await?;
            return Err(MediaError::decode_failed(
                format!(
                    "Truncated frame {} ({} of {} bytes)",
                    self.next_index,
                    filled,
                    self.buffer.len()
                ),
                None,
                None,
            ));
        }

        let image = RgbImage::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| MediaError::internal("Frame buffer does not match analysis size"))?;
        let frame = RawFrame::new(self.next_index, image);
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Scale a source size down to `max_width`, preserving aspect, with even dimensions.
pub fn analysis_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    let target_width = width.min(max_width.max(2));
    let scale = target_width as f64 / width.max(1) as f64;
    let even = |v: f64| ((v / 2.0).round() as u32 * 2).max(2);
    (even(target_width as f64), even(height as f64 * scale))
}

/// Fill `buf` completely unless the reader hits end of stream first.
/// Returns the number of bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn collect_tail<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    let excess = tail.len() - STDERR_TAIL_BYTES;
                    tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).to_string()
}

enum MemoryFrames {
    Owned(VecDeque<RgbImage>),
    Repeat { template: RgbImage, remaining: u64 },
}

/// In-memory frame source.
pub struct MemoryFrameSource {
    fps: Option<f64>,
    duration: Option<f64>,
    frames: MemoryFrames,
    next_index: u64,
    fail_at: Option<u64>,
}

impl MemoryFrameSource {
    /// Source over an explicit list of frames.
    pub fn new(fps: Option<f64>, frames: Vec<RgbImage>) -> Self {
        Self {
            fps,
            duration: None,
            frames: MemoryFrames::Owned(frames.into()),
            next_index: 0,
            fail_at: None,
        }
    }

    /// Source yielding `count` copies of one frame.
    pub fn repeat(fps: Option<f64>, count: u64, template: RgbImage) -> Self {
        Self {
            fps,
            duration: None,
            frames: MemoryFrames::Repeat {
                template,
                remaining: count,
            },
            next_index: 0,
            fail_at: None,
        }
    }

    /// Report a container duration.
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Fail with a decode error when frame `index` is reached.
    pub fn with_failure_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
        if self.fail_at == Some(self.next_index) {
            return Err(MediaError::decode_failed(
                format!("Corrupt frame at index {}", self.next_index),
                None,
                None,
            ));
        }

        let image = match &mut self.frames {
            MemoryFrames::Owned(frames) => frames.pop_front(),
            MemoryFrames::Repeat { template, remaining } => {
                if *remaining == 0 {
                    None
                } else {
                    *remaining -= 1;
                    Some(template.clone())
                }
            }
        };

        Ok(image.map(|image| {
            let frame = RawFrame::new(self.next_index, image);
            self.next_index += 1;
            frame
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
