//! Camera backends.
//!
//! Two interchangeable ways of getting one JPEG onto disk:
//! - [`Backend::CommandLine`]: `fswebcam`, which settles exposure itself.
//! - [`Backend::FrameGrabber`]: an MJPEG frame stream read from the capture
//!   device through `ffmpeg`; the first `warmup_frames` are dropped here.
//!
//! Backends are probed in that order and the first one that produces a frame
//! wins.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::CaptureError;
use crate::config::CaptureConfig;

// ---

/// Upper bound for a single capture attempt on any backend.
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 64 * 1024;
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    CommandLine,
    FrameGrabber,
}

impl Backend {
    /// Probe order.
    pub const ALL: [Backend; 2] = [Backend::CommandLine, Backend::FrameGrabber];

    pub fn name(self) -> &'static str {
        match self {
            Backend::CommandLine => "fswebcam",
            Backend::FrameGrabber => "framegrabber",
        }
    }

    fn program(self) -> &'static str {
        match self {
            Backend::CommandLine => "fswebcam",
            Backend::FrameGrabber => "ffmpeg",
        }
    }

    pub fn is_available(self) -> bool {
        find_program(self.program()).is_some()
    }
}

/// Backends whose programs are installed, in probe order.
pub fn available_backends() -> Vec<Backend> {
    Backend::ALL.into_iter().filter(|b| b.is_available()).collect()
}

/// Locate an executable on `PATH`.
pub fn find_program(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Something that can put one frame on disk.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Write one JPEG to `dest` and return the name of the backend used.
    async fn acquire(&self, config: &CaptureConfig, dest: &Path) -> Result<&'static str, CaptureError>;
}

/// The host's installed camera tools, tried in probe order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCamera;

#[async_trait]
impl Camera for SystemCamera {
    async fn acquire(&self, config: &CaptureConfig, dest: &Path) -> Result<&'static str, CaptureError> {
        Ok(acquire(config, dest).await?.name())
    }
}

/// Write one frame to `dest` using the first backend that succeeds.
pub async fn acquire(config: &CaptureConfig, dest: &Path) -> Result<Backend, CaptureError> {
    // ---
    let backends = available_backends();
    if backends.is_empty() {
        return Err(CaptureError::NoBackend);
    }

    let mut last_error = CaptureError::NoBackend;
    for backend in backends {
        let attempt = async {
            match backend {
                Backend::CommandLine => capture_command_line(config, dest).await,
                Backend::FrameGrabber => capture_frame_grabber(config, dest).await,
            }
        };
        let result = match tokio::time::timeout(CAPTURE_TIMEOUT, attempt).await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::Timeout {
                backend: backend.name(),
                secs: CAPTURE_TIMEOUT.as_secs(),
            }),
        };
        match result {
            Ok(()) => return Ok(backend),
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "Capture backend failed");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

async fn capture_command_line(config: &CaptureConfig, dest: &Path) -> Result<(), CaptureError> {
    // ---
    let output = Command::new(Backend::CommandLine.program())
        .arg("-r")
        .arg(config.resolution.to_string())
        .arg("--jpeg")
        .arg(config.quality.to_string())
        .arg("--no-banner")
        .arg("-S")
        .arg(config.warmup_frames.to_string())
        .arg(dest)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(CaptureError::ToolFailed {
            backend: Backend::CommandLine.name(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    let written = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        return Err(CaptureError::ToolFailed {
            backend: Backend::CommandLine.name(),
            exit_code: output.status.code(),
            stderr: "no image written".to_string(),
        });
    }
    Ok(())
}

async fn capture_frame_grabber(config: &CaptureConfig, dest: &Path) -> Result<(), CaptureError> {
    // ---
    let mut command = Command::new(Backend::FrameGrabber.program());
    command.args(["-hide_banner", "-loglevel", "error"]);
    if cfg!(target_os = "macos") {
        command.args(["-f", "avfoundation", "-framerate", "30"]);
    } else {
        command.args(["-f", "v4l2"]);
    }
    command
        .arg("-video_size")
        .arg(config.resolution.to_string())
        .arg("-i")
        .arg(&config.device)
        .args(["-f", "image2pipe", "-c:v", "mjpeg", "-q:v", "2", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdout = child.stdout.take().ok_or(CaptureError::StreamEnded)?;
    let mut frames = MjpegFrames::new(stdout);

    let grabbed = grab_settled(&mut frames, config.warmup_frames).await;
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Frame grabber already exited");
    }
    let frame = grabbed?;

    tokio::fs::write(dest, &frame).await?;
    Ok(())
}

/// A source of whole encoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream has ended.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CaptureError>;
}

/// Drop `warmup` frames so auto-exposure can settle, then return the next one.
pub async fn grab_settled<S>(source: &mut S, warmup: u32) -> Result<Vec<u8>, CaptureError>
where
    S: FrameSource + ?Sized,
{
    // ---
    for _ in 0..warmup {
        source.next_frame().await?.ok_or(CaptureError::StreamEnded)?;
    }
    source.next_frame().await?.ok_or(CaptureError::StreamEnded)
}

/// Splits a concatenated MJPEG byte stream into individual JPEG images.
pub struct MjpegFrames<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R> MjpegFrames<R> {
    pub fn new(reader: R) -> Self {
        MjpegFrames {
            reader,
            buf: Vec::new(),
        }
    }

    /// Remove and return the first complete SOI..EOI frame in the buffer.
    fn take_frame(&mut self) -> Option<Vec<u8>> {
        // ---
        let Some(start) = find(&self.buf, &JPEG_SOI) else {
            // Keep a trailing 0xFF in case it starts the next marker.
            let keep_from = self.buf.len().saturating_sub(1);
            self.buf.drain(..keep_from);
            return None;
        };
        let body = start + JPEG_SOI.len();
        let end = body + find(&self.buf[body..], &JPEG_EOI)? + JPEG_EOI.len();
        let frame = self.buf[start..end].to_vec();
        self.buf.drain(..end);
        Some(frame)
    }
}

#[async_trait]
impl<R> FrameSource for MjpegFrames<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        // ---
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(Some(frame));
            }
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
