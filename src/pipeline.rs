use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tempfile::TempPath;

use crate::audio::analysis::{self, LoudnessCurve};
use crate::audio::decode::AudioTrack;
use crate::config::{OutputSettings, Settings};
use crate::encode::ffmpeg::{self, FfmpegEncoder};
use crate::error::{Result, SongwaveError};
use crate::render::frame::{FrameRequest, FrameSynthesizer};
use crate::render::text::TitleCard;

/// What the user asked for. Consumed by [`Pipeline::run`], never persisted.
#[derive(Clone, Debug)]
pub struct VideoJob {
    pub name: String,
    pub artist: String,
    pub source: PathBuf,
    pub output: PathBuf,
    pub overlay: bool,
}

impl VideoJob {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SongwaveError::Input("song name is required".into()));
        }
        if self.artist.trim().is_empty() {
            return Err(SongwaveError::Input("artist name is required".into()));
        }
        if !self.source.is_file() {
            return Err(SongwaveError::Input(format!(
                "audio file not found: {}",
                self.source.display()
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Analyzing,
    Rendering,
    Compositing,
    Done,
    Failed,
}

/// `<dir>/<name>-<artist>.mp4`, anything but letters, digits, `-` and `_`
/// replaced by `_`.
pub fn default_output(dir: &Path, name: &str, artist: &str) -> PathBuf {
    let slug = |s: &str| -> String {
        s.trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    };
    dir.join(format!("{}-{}.mp4", slug(name), slug(artist)))
}

pub fn frame_count(fps: u32, duration: f64) -> u64 {
    (fps as f64 * duration).round().max(0.0) as u64
}

/// Every frame of a clip, in order, at `t = i / fps`.
pub fn frame_requests(fps: u32, duration: f64) -> impl Iterator<Item = FrameRequest> {
    (0..frame_count(fps, duration)).map(move |i| FrameRequest {
        t: i as f64 / fps as f64,
        fps,
        duration,
    })
}

/// Turns a track and its loudness curve into a waveform video with sound.
pub struct VideoRenderer<'a> {
    output: &'a OutputSettings,
    synth: FrameSynthesizer,
}

impl<'a> VideoRenderer<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        let synth = FrameSynthesizer::new(
            settings.output.width,
            settings.output.height,
            settings.palette,
            settings.line,
        );
        Self {
            output: &settings.output,
            synth,
        }
    }

    pub fn synthesizer(&self) -> &FrameSynthesizer {
        &self.synth
    }

    /// Encode every frame plus `audio` into `target`. Returns the frame count.
    pub fn render(
        &self,
        track: &AudioTrack,
        curve: &LoudnessCurve,
        audio: &Path,
        target: &Path,
    ) -> Result<u64> {
        let fps = self.output.fps;
        let duration = track.duration();
        let total = frame_count(fps, duration);
        log::info!("Rendering {} frames ({:.2}s @ {}fps)", total, duration, fps);

        let mut encoder = FfmpegEncoder::new(target, audio, self.output, duration)?;

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        for request in frame_requests(fps, duration) {
            let frame = self.synth.synthesize(&request, track, curve)?;
            encoder.write_frame(frame.as_raw())?;
            pb.inc(1);
        }
        pb.finish_with_message("Rendering complete");

        encoder.finish()?;
        Ok(total)
    }
}

/// Runs one job through analyze, render and (optionally) compositing.
pub struct Pipeline<'a> {
    settings: &'a Settings,
    state: JobState,
    history: Vec<JobState>,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            state: JobState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// States entered so far, not counting the initial `Idle`.
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    fn enter(&mut self, state: JobState) {
        log::info!("Job: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    /// Run `job` to completion and return the path of the finished video.
    ///
    /// Invalid input leaves the pipeline `Idle`. Any later error moves it to
    /// `Failed`; a half-written output file is left where it is.
    pub fn run(&mut self, job: &VideoJob) -> Result<PathBuf> {
        job.validate()?;
        self.settings.output.validate()?;

        match self.run_stages(job) {
            Ok(path) => {
                self.enter(JobState::Done);
                Ok(path)
            }
            Err(e) => {
                self.enter(JobState::Failed);
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, job: &VideoJob) -> Result<PathBuf> {
        self.enter(JobState::Analyzing);
        let (track, curve) = analysis::analyze(&job.source)?;

        self.enter(JobState::Rendering);
        let out_dir = match job.output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&out_dir)?;

        let renderer = VideoRenderer::new(self.settings);

        if !job.overlay {
            renderer.render(&track, &curve, &job.source, &job.output)?;
            return Ok(job.output.clone());
        }

        // Load the font before spending time on frames
        let card = TitleCard::load(&self.settings.overlay)?;
        let base = scratch_file(&out_dir, ".songwave-base-", ".mp4")?;
        renderer.render(&track, &curve, &job.source, &base)?;

        self.enter(JobState::Compositing);
        let output = &self.settings.output;
        let layer = card.rasterize(output.width, output.height, &job.name, &job.artist);
        let layer_path = scratch_file(&out_dir, ".songwave-card-", ".png")?;
        layer.save_with_format(&layer_path, image::ImageFormat::Png)?;

        ffmpeg::composite_overlay(&base, &layer_path, &job.output, output)?;
        Ok(job.output.clone())
    }
}

/// A path in `dir` that is deleted when the guard drops.
fn scratch_file(dir: &Path, prefix: &str, suffix: &str) -> Result<TempPath> {
    let file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(dir)?;
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(source: &Path, output: &Path) -> VideoJob {
        VideoJob {
            name: "Song".into(),
            artist: "Artist".into(),
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            overlay: false,
        }
    }

    #[test]
    fn two_seconds_at_24fps_is_48_frames() {
        let track = AudioTrack::new(vec![0.0; 44100], 22050);
        assert_eq!(track.duration(), 2.0);
        assert_eq!(frame_count(24, track.duration()), 48);

        let requests: Vec<_> = frame_requests(24, track.duration()).collect();
        assert_eq!(requests.len(), 48);
        assert_eq!(requests[0].t, 0.0);
        let last = requests.last().unwrap();
        // Last frame ends exactly at the clip end
        assert!((last.t + 1.0 / 24.0 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn frame_count_rounds() {
        assert_eq!(frame_count(24, 1.01), 24);
        assert_eq!(frame_count(24, 1.03), 25);
        assert_eq!(frame_count(30, 0.0), 0);
    }

    #[test]
    fn every_request_synthesizes() {
        let sr = 22050;
        let samples: Vec<f32> = (0..sr * 2).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let track = AudioTrack::new(samples, sr);
        let curve = analysis::loudness_curve(&track);
        let settings = Settings {
            output: OutputSettings {
                width: 64,
                height: 36,
                ..OutputSettings::default()
            },
            ..Settings::default()
        };
        let renderer = VideoRenderer::new(&settings);

        let mut frames = 0;
        for request in frame_requests(settings.output.fps, track.duration()) {
            let frame = renderer.synthesizer().synthesize(&request, &track, &curve).unwrap();
            assert_eq!(frame.as_raw().len(), 64 * 36 * 3);
            frames += 1;
        }
        assert_eq!(frames, 48);
    }

    #[test]
    fn missing_fields_are_input_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("song.mp3");
        std::fs::write(&source, b"x").unwrap();
        let out = dir.path().join("out.mp4");

        let settings = Settings::default();
        let mut pipeline = Pipeline::new(&settings);

        let mut no_name = job(&source, &out);
        no_name.name = "  ".into();
        assert!(matches!(pipeline.run(&no_name), Err(SongwaveError::Input(_))));

        let mut no_artist = job(&source, &out);
        no_artist.artist = String::new();
        assert!(matches!(pipeline.run(&no_artist), Err(SongwaveError::Input(_))));

        let missing = job(&dir.path().join("gone.mp3"), &out);
        assert!(matches!(pipeline.run(&missing), Err(SongwaveError::Input(_))));

        let odd = Settings {
            output: OutputSettings {
                width: 999,
                ..OutputSettings::default()
            },
            ..Settings::default()
        };
        let mut odd_pipeline = Pipeline::new(&odd);
        assert!(matches!(odd_pipeline.run(&job(&source, &out)), Err(SongwaveError::Input(_))));
        assert_eq!(odd_pipeline.state(), JobState::Idle);

        assert_eq!(pipeline.state(), JobState::Idle);
        assert!(pipeline.history().is_empty());
    }

    #[test]
    fn undecodable_audio_fails_before_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("song.mp3");
        std::fs::write(&source, b"not audio at all").unwrap();
        let out = dir.path().join("out.mp4");

        let settings = Settings::default();
        let mut pipeline = Pipeline::new(&settings);
        let err = pipeline.run(&job(&source, &out)).unwrap_err();

        assert!(matches!(err, SongwaveError::Decode(_)));
        assert_eq!(pipeline.state(), JobState::Failed);
        assert_eq!(pipeline.history(), &[JobState::Analyzing, JobState::Failed]);
        assert!(!out.exists());
    }

    fn write_tone(path: &Path, seconds: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..(8000.0 * seconds) as usize {
            let v = (i as f32 * 0.05).sin() * (i as f32 / 8000.0);
            writer.write_sample((v * i16::MAX as f32 * 0.5) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn failed_overlay_render_leaves_no_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("song.wav");
        write_tone(&source, 0.5);
        let out_dir = dir.path().join("videos");
        let out = out_dir.join("out.mp4");

        let settings = Settings {
            output: OutputSettings {
                width: 64,
                height: 36,
                codec: "songwave-no-such-codec".into(),
                ..OutputSettings::default()
            },
            ..Settings::default()
        };
        // No overlay.font configured, so this falls back to a system font
        if crate::render::text::resolve_font(&settings.overlay).is_err() {
            return;
        }
        let mut pipeline = Pipeline::new(&settings);
        let mut overlay_job = job(&source, &out);
        overlay_job.overlay = true;

        let err = pipeline.run(&overlay_job).unwrap_err();
        assert!(matches!(err, SongwaveError::Encode { .. }), "got {err:?}");
        assert_eq!(pipeline.state(), JobState::Failed);
        assert_eq!(
            pipeline.history(),
            &[JobState::Analyzing, JobState::Rendering, JobState::Failed]
        );

        let leftovers: Vec<_> = std::fs::read_dir(&out_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".songwave-"))
            .collect();
        assert!(leftovers.is_empty(), "scratch files left behind: {leftovers:?}");
    }

    #[test]
    fn overlay_without_font_fails_before_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("song.wav");
        write_tone(&source, 0.25);
        let out = dir.path().join("out.mp4");

        let mut settings = Settings::default();
        settings.overlay.font = Some(dir.path().join("missing.ttf"));
        let mut pipeline = Pipeline::new(&settings);
        let mut overlay_job = job(&source, &out);
        overlay_job.overlay = true;

        assert!(matches!(pipeline.run(&overlay_job), Err(SongwaveError::Font(_))));
        assert_eq!(
            pipeline.history(),
            &[JobState::Analyzing, JobState::Rendering, JobState::Failed]
        );
        assert!(!out.exists());
    }

    #[test]
    fn default_output_is_slugged() {
        let path = default_output(Path::new("videos"), "Blue Monday '88", "New Order");
        assert_eq!(path, PathBuf::from("videos/Blue_Monday__88-New_Order.mp4"));
        let path = default_output(Path::new("videos"), "夜に駆ける", "YOASOBI");
        assert_eq!(path, PathBuf::from("videos/夜に駆ける-YOASOBI.mp4"));
    }
}
