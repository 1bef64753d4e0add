mod audio;
mod catalog;
mod cli;
mod config;
mod encode;
mod error;
mod pipeline;
mod render;

use anyhow::{Context, Result};
use clap::Parser;

use audio::upload;
use catalog::{Catalog, CatalogEntry};
use cli::{Cli, Command, FrameArgs, RenderArgs, VideoArgs};
use config::Settings;
use error::SongwaveError;
use pipeline::{default_output, Pipeline, VideoJob, VideoRenderer};
use render::frame::FrameRequest;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let mut settings = resolve_settings(&cli);

    match cli.command {
        Command::Render(ref args) => {
            apply_video_args(&mut settings, &args.video);
            settings.output.validate()?;
            render(&settings, args)
        }
        Command::Frame(ref args) => {
            apply_video_args(&mut settings, &args.video);
            settings.output.validate()?;
            frame(&settings, args)
        }
        Command::List => {
            let catalog = Catalog::load(&settings.catalog.path);
            log::info!("{} videos in {}", catalog.entries().len(), catalog.path().display());
            print_entries(catalog.entries().iter());
            Ok(())
        }
        Command::Search { ref query } => {
            let catalog = Catalog::load(&settings.catalog.path);
            let hits = catalog.search(query);
            if hits.is_empty() {
                log::info!("No videos match {:?}", query);
            }
            print_entries(hits.into_iter());
            Ok(())
        }
        Command::Delete { ref name, ref artist } => {
            let mut catalog = Catalog::load(&settings.catalog.path);
            match catalog.delete(name, artist)? {
                Some(entry) => log::info!("Removed {} / {} ({})", entry.name, entry.artist, entry.path.display()),
                None => log::warn!("No catalog entry for {} / {}", name, artist),
            }
            Ok(())
        }
    }
}

/// Variant defaults, then the config file, then global CLI flags.
fn resolve_settings(cli: &Cli) -> Settings {
    let file_config = config::find_config(cli.config.clone()).and_then(|path| {
        let cfg = config::load_config(&path);
        match cfg {
            Some(_) => log::info!("Loaded config from {}", path.display()),
            None => log::warn!("Failed to load config from {}", path.display()),
        }
        cfg
    });

    let variant = cli
        .variant
        .or_else(|| file_config.as_ref().and_then(|c| c.variant))
        .unwrap_or_default();
    let mut settings = Settings::for_variant(variant);
    if let Some(ref cfg) = file_config {
        cfg.apply(&mut settings);
    }
    if let Some(ref path) = cli.catalog {
        settings.catalog.path = path.clone();
    }
    settings
}

fn apply_video_args(settings: &mut Settings, video: &VideoArgs) {
    if let Some(fps) = video.fps {
        settings.output.fps = fps;
    }
    if let Some(width) = video.width {
        settings.output.width = width;
    }
    if let Some(height) = video.height {
        settings.output.height = height;
    }
}

fn render(settings: &Settings, args: &RenderArgs) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&settings.output.dir, &args.name, &args.artist));
    let mut job = VideoJob {
        name: args.name.trim().to_string(),
        artist: args.artist.trim().to_string(),
        source: args.input.clone(),
        output,
        overlay: args.overlay_override().unwrap_or(settings.overlay.enabled),
    };
    job.validate()?;

    let mut catalog = settings
        .catalog
        .enabled
        .then(|| Catalog::load(&settings.catalog.path));

    if !args.force {
        if let Some(entry) = catalog.as_ref().and_then(|c| c.find(&job.name, &job.artist)) {
            if entry.path.exists() {
                log::info!("Already rendered, reusing {} (use --force to render again)", entry.path.display());
                println!("{}", entry.path.display());
                return Ok(());
            }
            log::warn!("Catalog points at missing {}, rendering again", entry.path.display());
        }
    }

    log::info!("songwave - waveform video generator");
    log::info!("Input: {}", args.input.display());
    log::info!("Output: {}", job.output.display());
    log::info!(
        "Resolution: {}x{} @ {}fps, overlay={}",
        settings.output.width,
        settings.output.height,
        settings.output.fps,
        job.overlay
    );

    let staged = upload::stage(&args.input)?;
    job.source = staged.path().to_path_buf();

    let mut pipeline = Pipeline::new(settings);
    let path = pipeline.run(&job)?;
    drop(staged);

    if let Some(ref mut catalog) = catalog {
        catalog.add(CatalogEntry {
            name: job.name.clone(),
            artist: job.artist.clone(),
            path: path.clone(),
        });
        if let Err(e) = catalog.save() {
            log::warn!("{}", e);
        }
    }

    log::info!("Done! Output: {}", path.display());
    println!("{}", path.display());
    Ok(())
}

fn frame(settings: &Settings, args: &FrameArgs) -> Result<()> {
    let (track, curve) = audio::analysis::analyze(&args.input)?;
    let duration = track.duration();
    if !(0.0..duration).contains(&args.at) {
        return Err(SongwaveError::Input(format!(
            "--at {} is outside the track (0..{:.2}s)",
            args.at, duration
        ))
        .into());
    }

    let renderer = VideoRenderer::new(settings);
    let request = FrameRequest {
        t: args.at,
        fps: settings.output.fps,
        duration,
    };
    let image = renderer.synthesizer().synthesize(&request, &track, &curve)?;
    image
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    log::info!("Wrote frame at {:.3}s to {}", args.at, args.output.display());
    Ok(())
}

fn print_entries<'a>(entries: impl Iterator<Item = &'a CatalogEntry>) {
    for entry in entries {
        let missing = if entry.path.exists() { "" } else { "  (missing)" };
        println!("{:<30} {:<24} {}{}", entry.name, entry.artist, entry.path.display(), missing);
    }
}
