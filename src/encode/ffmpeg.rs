use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::JoinHandle;

use crate::config::OutputSettings;
use crate::error::{Result, SongwaveError};

/// Streams raw RGB frames into an ffmpeg child that muxes them with the
/// source audio.
pub struct FfmpegEncoder {
    child: Child,
    stderr: Option<JoinHandle<Vec<u8>>>,
    output: PathBuf,
}

/// How much of ffmpeg's stderr is kept for the error message.
const STDERR_TAIL: usize = 16 * 1024;

/// Arguments for encoding `rgb24` frames from stdin plus `audio` trimmed to
/// `duration` seconds.
pub fn encoder_args(output: &Path, audio: &Path, settings: &OutputSettings, duration: f64) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgb24".into(),
        "-video_size".into(), format!("{}x{}", settings.width, settings.height),
        "-framerate".into(), settings.fps.to_string(),
        "-i".into(), "pipe:0".into(),
        "-t".into(), format!("{:.6}", duration),
        "-i".into(), audio.display().to_string(),
        "-map".into(), "0:v:0".into(),
        "-map".into(), "1:a:0".into(),
    ];
    args.extend(video_codec_args(settings));

    args.extend([
        "-c:a".into(), settings.audio_codec.clone(),
        "-b:a".into(), settings.audio_bitrate.clone(),
        "-shortest".into(),
        output.display().to_string(),
    ]);
    args
}

/// Arguments for laying a full-frame RGBA image over `base` for its whole
/// length, copying the audio stream.
pub fn overlay_args(base: &Path, layer: &Path, output: &Path, settings: &OutputSettings) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-i".into(), base.display().to_string(),
        "-i".into(), layer.display().to_string(),
        "-filter_complex".into(), "[0:v][1:v]overlay=0:0:eof_action=repeat[v]".into(),
        "-map".into(), "[v]".into(),
        "-map".into(), "0:a?".into(),
    ];
    args.extend(video_codec_args(settings));
    args.extend([
        "-c:a".into(), "copy".into(),
        "-r".into(), settings.fps.to_string(),
        output.display().to_string(),
    ]);
    args
}

fn video_codec_args(settings: &OutputSettings) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-c:v".into(), settings.codec.clone(),
        "-pix_fmt".into(), settings.pix_fmt.clone(),
    ];
    if let Some(ref br) = settings.bitrate {
        args.extend(["-b:v".to_string(), br.clone()]);
    } else {
        args.extend(["-crf".to_string(), settings.crf.to_string()]);
        args.extend(["-preset".to_string(), "medium".to_string()]);
    }
    args
}

fn encode_err(output: &Path, reason: impl Into<String>) -> SongwaveError {
    SongwaveError::Encode {
        output: output.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read `stderr` until EOF, keeping only the last [`STDERR_TAIL`] bytes.
fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut tail = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            match stderr.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.extend_from_slice(&buf[..n]);
                    if tail.len() > STDERR_TAIL {
                        tail.drain(..tail.len() - STDERR_TAIL);
                    }
                }
            }
        }
        tail
    })
}

impl FfmpegEncoder {
    pub fn new(output: &Path, audio: &Path, settings: &OutputSettings, duration: f64) -> Result<Self> {
        let mut command = Command::new("ffmpeg");
        command.args(encoder_args(output, audio, settings, duration));
        let encoder = Self::spawn(command, output)?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}, audio={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec,
            settings.audio_codec
        );
        Ok(encoder)
    }

    /// Start `command` with frames on stdin. Its stderr is drained in the
    /// background so a chatty encoder never stalls on a full pipe.
    fn spawn(mut command: Command, output: &Path) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| encode_err(output, format!("failed to spawn ffmpeg ({e}). Is ffmpeg installed?")))?;
        let stderr = child.stderr.take().map(drain_stderr);

        Ok(Self {
            child,
            stderr,
            output: output.to_path_buf(),
        })
    }

    pub fn write_frame(&mut self, rgb_pixels: &[u8]) -> Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| encode_err(&self.output, "ffmpeg stdin not available"))?;
        stdin
            .write_all(rgb_pixels)
            .map_err(|e| encode_err(&self.output, format!("failed to write frame to ffmpeg: {e}")))
    }

    pub fn finish(mut self) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let status = self
            .child
            .wait()
            .map_err(|e| encode_err(&self.output, format!("failed to wait for ffmpeg: {e}")))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(encode_err(&self.output, format!("ffmpeg exited with error:\n{stderr}")));
        }

        log::info!("FFmpeg encoding complete: {}", self.output.display());
        Ok(())
    }
}

/// Run the overlay pass to completion.
pub fn composite_overlay(base: &Path, layer: &Path, output: &Path, settings: &OutputSettings) -> Result<()> {
    let args = overlay_args(base, layer, output, settings);
    log::info!("Compositing title card onto {}", output.display());

    let result = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| encode_err(output, format!("failed to spawn ffmpeg ({e}). Is ffmpeg installed?")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(encode_err(output, format!("ffmpeg overlay failed:\n{stderr}")));
    }
    Ok(())
}
