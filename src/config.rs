use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::{Result, SongwaveError};
use crate::render::color::Palette;

/// Built-in looks. Config and CLI flags are layered on top.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Mint/green-to-red background, title card on, 1000x600.
    #[default]
    Classic,
    /// Blue/green-to-red background, no title card, 1000x700.
    Mono,
}

/// Fully resolved settings for one invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub output: OutputSettings,
    pub palette: Palette,
    /// Waveform line color.
    pub line: [u8; 3],
    pub overlay: OverlaySettings,
    pub catalog: CatalogSettings,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub crf: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub bitrate: Option<String>,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Where rendered videos go when no explicit output is given.
    pub dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlaySettings {
    pub enabled: bool,
    pub font: Option<PathBuf>,
    pub font_url: Option<String>,
    pub title_size: f32,
    pub artist_size: f32,
    pub gap: u32,
    pub reference_height: u32,
    pub color: [u8; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
            fps: 24,
            crf: 18,
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            bitrate: None,
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
            dir: PathBuf::from("videos"),
        }
    }
}

impl OutputSettings {
    /// Reject sizes and rates ffmpeg would refuse. 4:2:0 chroma needs even
    /// dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(SongwaveError::Input("fps must be at least 1".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(SongwaveError::Input(format!(
                "video size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        let subsampled = self.pix_fmt.starts_with("yuv420")
            || self.pix_fmt.starts_with("yuvj420")
            || self.pix_fmt == "nv12";
        if subsampled && (self.width % 2 != 0 || self.height % 2 != 0) {
            return Err(SongwaveError::Input(format!(
                "{} needs an even video size, got {}x{}",
                self.pix_fmt, self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            font: None,
            font_url: None,
            title_size: 60.0,
            artist_size: 40.0,
            gap: 10,
            reference_height: 600,
            color: [254, 249, 245, 255],
        }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("videos.json"),
        }
    }
}

impl Settings {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Classic => Self {
                output: OutputSettings::default(),
                palette: Palette::CLASSIC,
                line: [31, 119, 180],
                overlay: OverlaySettings::default(),
                catalog: CatalogSettings::default(),
            },
            Variant::Mono => Self {
                output: OutputSettings {
                    height: 700,
                    ..OutputSettings::default()
                },
                palette: Palette::MONO,
                line: [31, 119, 180],
                overlay: OverlaySettings {
                    enabled: false,
                    ..OverlaySettings::default()
                },
                catalog: CatalogSettings::default(),
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::for_variant(Variant::default())
    }
}

/// On-disk configuration. Every field is optional; unset fields keep the
/// variant's value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub variant: Option<Variant>,
    pub output: OutputConfig,
    pub palette: PaletteConfig,
    pub overlay: OverlayConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub crf: Option<u32>,
    pub codec: Option<String>,
    pub pix_fmt: Option<String>,
    pub bitrate: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<String>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    pub threshold: Option<f32>,
    pub quiet: Option<[u8; 3]>,
    pub low: Option<[u8; 3]>,
    pub high: Option<[u8; 3]>,
    pub line: Option<[u8; 3]>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub enabled: Option<bool>,
    pub font: Option<PathBuf>,
    pub font_url: Option<String>,
    pub title_size: Option<f32>,
    pub artist_size: Option<f32>,
    pub gap: Option<u32>,
    pub reference_height: Option<u32>,
    pub color: Option<[u8; 4]>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub enabled: Option<bool>,
    pub path: Option<PathBuf>,
}

fn set<T>(slot: &mut T, value: &Option<T>)
where
    T: Clone,
{
    if let Some(v) = value {
        *slot = v.clone();
    }
}

impl Config {
    /// Layer this file's values over `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        let out = &mut settings.output;
        set(&mut out.width, &self.output.width);
        set(&mut out.height, &self.output.height);
        set(&mut out.fps, &self.output.fps);
        set(&mut out.crf, &self.output.crf);
        set(&mut out.codec, &self.output.codec);
        set(&mut out.pix_fmt, &self.output.pix_fmt);
        set(&mut out.audio_codec, &self.output.audio_codec);
        set(&mut out.audio_bitrate, &self.output.audio_bitrate);
        set(&mut out.dir, &self.output.dir);
        if self.output.bitrate.is_some() {
            out.bitrate = self.output.bitrate.clone();
        }

        let palette = &mut settings.palette;
        set(&mut palette.threshold, &self.palette.threshold);
        set(&mut palette.quiet, &self.palette.quiet);
        set(&mut palette.low, &self.palette.low);
        set(&mut palette.high, &self.palette.high);
        set(&mut settings.line, &self.palette.line);

        let overlay = &mut settings.overlay;
        set(&mut overlay.enabled, &self.overlay.enabled);
        set(&mut overlay.title_size, &self.overlay.title_size);
        set(&mut overlay.artist_size, &self.overlay.artist_size);
        set(&mut overlay.gap, &self.overlay.gap);
        set(&mut overlay.reference_height, &self.overlay.reference_height);
        set(&mut overlay.color, &self.overlay.color);
        if self.overlay.font.is_some() {
            overlay.font = self.overlay.font.clone();
        }
        if self.overlay.font_url.is_some() {
            overlay.font_url = self.overlay.font_url.clone();
        }

        set(&mut settings.catalog.enabled, &self.catalog.enabled);
        set(&mut settings.catalog.path, &self.catalog.path);
    }
}

pub fn parse_config(content: &str) -> Option<Config> {
    match toml::from_str(content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Invalid config: {}", e);
            None
        }
    }
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_config(&content)
}

/// Explicit path, or songwave.toml in the working directory, or the user config.
pub fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from("songwave.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("songwave").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("songwave").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_differ_only_where_expected() {
        let classic = Settings::for_variant(Variant::Classic);
        let mono = Settings::for_variant(Variant::Mono);
        assert_eq!(classic.output.height, 600);
        assert_eq!(mono.output.height, 700);
        assert!(classic.overlay.enabled);
        assert!(!mono.overlay.enabled);
        assert_eq!(mono.palette.quiet, [0, 0, 255]);
        assert_eq!(classic.output.fps, mono.output.fps);
        assert_eq!(classic.output.codec, "libx264");
        assert_eq!(classic.output.audio_codec, "aac");
    }

    #[test]
    fn output_validation_rejects_what_ffmpeg_would() {
        assert!(OutputSettings::default().validate().is_ok());
        assert!(Settings::for_variant(Variant::Mono).output.validate().is_ok());

        let bad = [
            OutputSettings { fps: 0, ..OutputSettings::default() },
            OutputSettings { width: 0, ..OutputSettings::default() },
            OutputSettings { height: 0, ..OutputSettings::default() },
            OutputSettings { width: 1001, ..OutputSettings::default() },
            OutputSettings { height: 599, ..OutputSettings::default() },
        ];
        for output in bad {
            assert!(
                matches!(output.validate(), Err(SongwaveError::Input(_))),
                "{}x{} @ {}",
                output.width,
                output.height,
                output.fps
            );
        }

        // Odd sizes are fine without chroma subsampling
        let rgb = OutputSettings {
            width: 1001,
            pix_fmt: "yuv444p".into(),
            ..OutputSettings::default()
        };
        assert!(rgb.validate().is_ok());
    }

    #[test]
    fn empty_config_changes_nothing() {
        let cfg = parse_config("").unwrap();
        let mut settings = Settings::default();
        cfg.apply(&mut settings);
        assert_eq!(settings, Settings::default());
        assert!(cfg.variant.is_none());
    }

    #[test]
    fn partial_config_overrides_fields() {
        let cfg = parse_config(
            r#"
            variant = "mono"

            [output]
            fps = 30
            bitrate = "5M"

            [palette]
            threshold = 0.2
            quiet = [10, 20, 30]

            [overlay]
            enabled = true
            font = "fonts/Koruri-Light.ttf"

            [catalog]
            path = "out/catalog.json"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.variant, Some(Variant::Mono));
        let mut settings = Settings::for_variant(Variant::Mono);
        cfg.apply(&mut settings);

        assert_eq!(settings.output.fps, 30);
        assert_eq!(settings.output.height, 700);
        assert_eq!(settings.output.bitrate.as_deref(), Some("5M"));
        assert_eq!(settings.palette.threshold, 0.2);
        assert_eq!(settings.palette.quiet, [10, 20, 30]);
        assert_eq!(settings.palette.high, Palette::MONO.high);
        assert!(settings.overlay.enabled);
        assert_eq!(settings.overlay.font, Some(PathBuf::from("fonts/Koruri-Light.ttf")));
        assert_eq!(settings.catalog.path, PathBuf::from("out/catalog.json"));
        assert!(settings.catalog.enabled);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(parse_config("[output]\nfps = \"fast\"").is_none());
        assert!(load_config(Path::new("/nonexistent/songwave.toml")).is_none());
    }
}
