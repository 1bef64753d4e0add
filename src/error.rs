use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong between picking a track and persisting the video.
#[derive(Debug, Error)]
pub enum SongwaveError {
    /// Missing input file or an empty title/artist. No job is started.
    #[error("Invalid input: {0}")]
    Input(String),

    /// The audio could not be opened, probed or decoded, or it was empty.
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// The waveform plot could not be drawn into the frame buffer.
    #[error("Failed to draw frame: {0}")]
    Plot(String),

    /// ffmpeg failed. Whatever it wrote to `output` is left on disk.
    #[error("Failed to encode {}: {reason}", .output.display())]
    Encode { output: PathBuf, reason: String },

    /// No usable font for the text overlay.
    #[error("Failed to load font: {0}")]
    Font(String),

    /// The catalog file could not be written.
    #[error("Failed to write catalog {}: {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, SongwaveError>;
