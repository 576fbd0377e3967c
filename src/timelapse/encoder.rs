//! Frame manifest and external video encoder.
//!
//! Frames are handed to the encoder as a concat-demuxer manifest written
//! next to the output. The manifest is owned by a [`ManifestFile`] guard and
//! removed on every exit path.

use std::{
    fmt::Write as _,
    fs, io,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

// ---

/// Upper bound for a single encoder run.
pub const ENCODE_TIMEOUT: Duration = Duration::from_secs(300);

const OUTPUT_FILTER: &str =
    "scale=1920:1080:force_original_aspect_ratio=decrease,pad=1920:1080:-1:-1";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to start encoder: {0}")]
    Spawn(#[source] io::Error),

    #[error("encoder exited with {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("encoder timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Turns a frame manifest into a 1920x1080 H.264 video.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, manifest: &Path, fps: u32, output: &Path) -> Result<(), EncodeError>;
}

/// `ffmpeg` with the concat demuxer.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    pub timeout: Duration,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        FfmpegEncoder {
            timeout: ENCODE_TIMEOUT,
        }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, manifest: &Path, fps: u32, output: &Path) -> Result<(), EncodeError> {
        // ---
        let run = Command::new("ffmpeg")
            .arg("-y")
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(manifest)
            .arg("-vf")
            .arg(format!("fps={fps},{OUTPUT_FILTER}"))
            .args(["-c:v", "libx264", "-preset", "fast", "-crf", "28"])
            .args(["-pix_fmt", "yuv420p"])
            .arg(output)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let out = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result.map_err(EncodeError::Spawn)?,
            Err(_) => {
                return Err(EncodeError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !out.status.success() {
            return Err(EncodeError::Failed {
                exit_code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Render the concat manifest for `frames`.
///
/// Every frame is shown for `1/fps` seconds; the last frame is listed once
/// more without a duration so the encoder does not cut it short.
pub fn manifest_text(frames: &[PathBuf], fps: u32) -> String {
    // ---
    let duration = 1.0 / f64::from(fps);
    let mut text = String::new();
    for frame in frames {
        let _ = writeln!(text, "file '{}'", quote(frame));
        let _ = writeln!(text, "duration {duration}");
    }
    if let Some(last) = frames.last() {
        let _ = writeln!(text, "file '{}'", quote(last));
    }
    text
}

fn quote(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

/// A manifest file that deletes itself when dropped.
#[derive(Debug)]
pub struct ManifestFile {
    path: PathBuf,
}

impl ManifestFile {
    pub fn create(path: PathBuf, contents: &str) -> io::Result<Self> {
        // ---
        let guard = ManifestFile { path };
        fs::write(&guard.path, contents)?;
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ManifestFile {
    fn drop(&mut self) {
        // ---
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove manifest"),
        }
    }
}

/// Encode `frames` (already in display order) into `output`.
///
/// `label` names the manifest (`.{label}_files.txt` beside the output). A
/// failed run leaves neither the manifest nor a partial output behind.
pub async fn encode_frames(
    encoder: &dyn Encoder,
    frames: &[PathBuf],
    fps: u32,
    output: &Path,
    label: &str,
) -> Result<(), EncodeError> {
    // ---
    let out_dir = output.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(out_dir)?;

    let absolute = frames
        .iter()
        .map(fs::canonicalize)
        .collect::<Result<Vec<_>, _>>()?;

    let manifest = ManifestFile::create(
        out_dir.join(format!(".{label}_files.txt")),
        &manifest_text(&absolute, fps),
    )?;
    debug!(manifest = %manifest.path().display(), frames = frames.len(), "Manifest written");

    let result = encoder.encode(manifest.path(), fps, output).await;
    if result.is_err() {
        let _ = fs::remove_file(output);
    }
    result
}
