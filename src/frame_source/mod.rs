//! FrameSource - Frame Acquisition from Cameras and Video Files
//!
//! ## Responsibilities
//!
//! - Open file or network sources through an ffmpeg child process
//! - Deliver scaled JPEG frames one at a time (MJPEG over image2pipe)
//! - Classify end-of-stream: a file running out is normal termination, a
//!   network source going quiet is an error
//! - Loop file playback in simulated mode
//!
//! The process is spawned with `kill_on_drop` so an abandoned source never
//! leaks an ffmpeg child.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

/// Kind of input behind a source locator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Local video file; EOF is normal termination
    File,
    /// Network stream (rtsp/http/...); EOF is a failure
    Network,
}

/// Classify a source locator string
pub fn classify(locator: &str) -> SourceKind {
    const NETWORK_SCHEMES: &[&str] = &["rtsp://", "rtsps://", "rtmp://", "http://", "https://", "udp://", "tcp://"];
    if NETWORK_SCHEMES.iter().any(|s| locator.starts_with(s)) {
        SourceKind::Network
    } else {
        SourceKind::File
    }
}

/// One captured frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// JPEG image data
    pub data: Vec<u8>,
    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
}

/// Frame acquisition boundary
#[async_trait]
pub trait FrameSource: Send {
    /// Read the next frame.
    ///
    /// Returns [`Error::SourceExhausted`] when a file source ends and
    /// [`Error::SourceUnavailable`] when the source cannot be read.
    async fn next_frame(&mut self) -> Result<Frame>;

    /// Release the underlying source
    async fn close(&mut self);
}

/// Options for opening an ffmpeg-backed source
#[derive(Debug, Clone)]
pub struct FfmpegOptions {
    /// Output frame width
    pub width: u32,
    /// Output frame height
    pub height: u32,
    /// JPEG quality 0-100
    pub jpeg_quality: u8,
    /// Restart file playback on EOF (simulated camera mode)
    pub loop_playback: bool,
}

/// ffmpeg-backed frame source
pub struct FfmpegFrameSource {
    locator: String,
    kind: SourceKind,
    options: FfmpegOptions,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    buf: Vec<u8>,
    frames_read: u64,
}

impl FfmpegFrameSource {
    /// Spawn ffmpeg against the locator
    pub fn open(locator: &str, options: FfmpegOptions) -> Result<Self> {
        let kind = classify(locator);
        let mut source = Self {
            locator: locator.to_string(),
            kind,
            options,
            child: None,
            stdout: None,
            buf: Vec::new(),
            frames_read: 0,
        };
        source.spawn()?;
        Ok(source)
    }

    fn spawn(&mut self) -> Result<()> {
        let scale = format!("scale={}:{}", self.options.width, self.options.height);
        let q = mjpeg_q(self.options.jpeg_quality);

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-nostdin", "-loglevel", "error"]);

        match self.kind {
            SourceKind::File => {
                // Read at native frame rate so a file behaves like a camera
                cmd.arg("-re");
                if self.options.loop_playback {
                    cmd.args(["-stream_loop", "-1"]);
                }
            }
            SourceKind::Network => {
                if self.locator.starts_with("rtsp") {
                    cmd.args(["-rtsp_transport", "tcp"]);
                }
            }
        }

        cmd.arg("-i")
            .arg(&self.locator)
            .arg("-vf")
            .arg(&scale)
            .args(["-f", "image2pipe", "-c:v", "mjpeg"])
            .arg("-q:v")
            .arg(q.to_string())
            .arg("pipe:1")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::SourceUnavailable(format!("failed to spawn ffmpeg for {}: {e}", self.locator))
        })?;

        self.stdout = child.stdout.take();
        self.child = Some(child);
        Ok(())
    }

    /// Error for end-of-stream, depending on source kind and history
    fn eof_error(&self) -> Error {
        if self.frames_read == 0 {
            // Never produced a frame: the source could not actually be opened
            Error::SourceUnavailable(format!("could not read from {}", self.locator))
        } else {
            match self.kind {
                SourceKind::File => Error::SourceExhausted,
                SourceKind::Network => {
                    Error::SourceUnavailable(format!("stream ended: {}", self.locator))
                }
            }
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> Result<Frame> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| Error::SourceUnavailable("source not open".to_string()))?;

        let mut chunk = [0u8; 16 * 1024];
        loop {
            if let Some(data) = take_jpeg(&mut self.buf) {
                self.frames_read += 1;
                return Ok(Frame {
                    data,
                    captured_at: Utc::now(),
                });
            }

            let n = stdout
                .read(&mut chunk)
                .await
                .map_err(|e| Error::SourceUnavailable(format!("read failed: {e}")))?;
            if n == 0 {
                return Err(self.eof_error());
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "ffmpeg already exited");
            }
        }
        self.buf.clear();
    }
}

/// Map JPEG quality 0-100 onto ffmpeg's mjpeg 2-31 scale (lower is better)
fn mjpeg_q(quality: u8) -> u8 {
    let quality = quality.min(100) as u32;
    (2 + (100 - quality) * 29 / 100) as u8
}

/// Extract one complete JPEG (SOI..EOI) from the front of the buffer.
///
/// Bytes before the first SOI marker are discarded. Returns None until a
/// complete frame is buffered.
fn take_jpeg(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let soi = find_marker(buf, 0xD8, 0)?;
    if soi > 0 {
        buf.drain(..soi);
    }

    let eoi = find_marker(buf, 0xD9, 2)?;
    Some(buf.drain(..eoi + 2).collect())
}

fn find_marker(buf: &[u8], code: u8, from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|w| w[0] == 0xFF && w[1] == code)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xFF, 0xD8];
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&[0xFF, 0xD9]);
        frame
    }

    #[test]
    fn test_classify_locators() {
        assert_eq!(classify("rtsp://cam.local/stream"), SourceKind::Network);
        assert_eq!(classify("http://cam.local/mjpeg"), SourceKind::Network);
        assert_eq!(classify("/var/media/sample_video.mp4"), SourceKind::File);
        assert_eq!(classify("sample.mp4"), SourceKind::File);
    }

    #[test]
    fn test_take_complete_frame() {
        let mut buf = jpeg(&[1, 2, 3]);
        let frame = take_jpeg(&mut buf).unwrap();
        assert_eq!(frame, jpeg(&[1, 2, 3]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_not_taken() {
        let mut buf = vec![0xFF, 0xD8, 1, 2, 3];
        assert!(take_jpeg(&mut buf).is_none());
        // Buffer retained for the next read
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_garbage_before_soi_discarded() {
        let mut buf = vec![0x00, 0x42];
        buf.extend(jpeg(&[7]));
        let frame = take_jpeg(&mut buf).unwrap();
        assert_eq!(frame, jpeg(&[7]));
    }

    #[test]
    fn test_two_frames_taken_in_order() {
        let mut buf = jpeg(&[1]);
        buf.extend(jpeg(&[2]));
        assert_eq!(take_jpeg(&mut buf).unwrap(), jpeg(&[1]));
        assert_eq!(take_jpeg(&mut buf).unwrap(), jpeg(&[2]));
        assert!(take_jpeg(&mut buf).is_none());
    }

    #[test]
    fn test_mjpeg_q_range() {
        assert_eq!(mjpeg_q(100), 2);
        assert_eq!(mjpeg_q(0), 31);
        assert!(mjpeg_q(80) < mjpeg_q(50));
    }
}
