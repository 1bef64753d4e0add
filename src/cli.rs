use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Variant;

#[derive(Parser, Debug)]
#[command(name = "songwave", about = "Waveform music video generator")]
pub struct Cli {
    /// Config file (defaults to ./songwave.toml or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Built-in look to start from
    #[arg(long, value_enum, global = true)]
    pub variant: Option<Variant>,

    /// Catalog file
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a waveform video for an audio file and record it in the catalog
    Render(RenderArgs),
    /// Write a single frame as PNG
    Frame(FrameArgs),
    /// List rendered videos
    List,
    /// Find rendered videos by song or artist
    Search {
        query: String,
    },
    /// Remove a video from the catalog and delete its file
    Delete {
        #[arg(long)]
        name: String,
        #[arg(long)]
        artist: String,
    },
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Input audio file (MP3, WAV, FLAC, OGG)
    pub input: PathBuf,

    /// Song title
    #[arg(long, default_value = "")]
    pub name: String,

    /// Artist name
    #[arg(long, default_value = "")]
    pub artist: String,

    /// Output video file (defaults to <output dir>/<name>-<artist>.mp4)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Draw the song and artist over the video
    #[arg(long, conflicts_with = "no_overlay")]
    pub overlay: bool,

    /// Plain waveform, no text
    #[arg(long)]
    pub no_overlay: bool,

    /// Render again even if the catalog already has this song
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub video: VideoArgs,
}

#[derive(Args, Debug)]
pub struct FrameArgs {
    /// Input audio file
    pub input: PathBuf,

    /// Timestamp in seconds
    #[arg(long, default_value_t = 0.0)]
    pub at: f64,

    /// Output PNG
    #[arg(short, long, default_value = "frame.png")]
    pub output: PathBuf,

    #[command(flatten)]
    pub video: VideoArgs,
}

#[derive(Args, Debug, Default)]
pub struct VideoArgs {
    /// Frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Video width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Video height in pixels
    #[arg(long)]
    pub height: Option<u32>,
}

impl RenderArgs {
    /// `Some` when either overlay flag was given.
    pub fn overlay_override(&self) -> Option<bool> {
        if self.no_overlay {
            Some(false)
        } else if self.overlay {
            Some(true)
        } else {
            None
        }
    }
}
