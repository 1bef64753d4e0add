use std::path::PathBuf;

use fontdue::{Font, FontSettings};
use image::{Rgba, RgbaImage};

use crate::config::OverlaySettings;
use crate::error::{Result, SongwaveError};

/// Fonts tried when neither a path nor a URL is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct TextOverlay {
    font: Font,
    font_size: f32,
}

impl TextOverlay {
    pub fn new(font_size: f32, font_bytes: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(font_bytes, FontSettings::default())
            .map_err(|e| SongwaveError::Font(e.to_string()))?;
        Ok(Self { font, font_size })
    }

    fn ascent(&self) -> f32 {
        self.font
            .horizontal_line_metrics(self.font_size)
            .map_or(self.font_size, |m| m.ascent)
    }

    /// Height of one line of text in pixels.
    pub fn line_height(&self) -> u32 {
        self.font
            .horizontal_line_metrics(self.font_size)
            .map_or(self.font_size, |m| m.ascent - m.descent)
            .ceil() as u32
    }

    /// Measure the width of rendered text in pixels.
    pub fn measure_width(&self, text: &str) -> u32 {
        let width: f32 = text
            .chars()
            .map(|ch| self.font.metrics(ch, self.font_size).advance_width)
            .sum();
        width.ceil() as u32
    }

    /// Draw `text` with its top-left corner at (x, y), alpha-compositing over
    /// whatever is already in `canvas`.
    pub fn composite(&self, canvas: &mut RgbaImage, text: &str, x: i32, y: i32, color: [u8; 4]) {
        let (width, height) = canvas.dimensions();
        let baseline = y as f32 + self.ascent();
        let mut cursor_x = x as f32;

        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.font_size);
            let glyph_x = (cursor_x + metrics.xmin as f32).round() as i32;
            let glyph_y = (baseline - metrics.height as f32 - metrics.ymin as f32).round() as i32;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }

                    let px = glyph_x + gx as i32;
                    let py = glyph_y + gy as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }

                    let a = coverage as f32 / 255.0 * (color[3] as f32 / 255.0);
                    let dst = canvas.get_pixel_mut(px as u32, py as u32);
                    *dst = blend_over(*dst, color, a);
                }
            }

            cursor_x += metrics.advance_width;
        }
    }
}

/// Porter-Duff "over" of a solid color with coverage `a` onto `dst`.
fn blend_over(dst: Rgba<u8>, color: [u8; 4], a: f32) -> Rgba<u8> {
    let dst_a = dst.0[3] as f32 / 255.0;
    let out_a = a + dst_a * (1.0 - a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (color[c] as f32 * a + dst.0[c] as f32 * dst_a * (1.0 - a)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    Rgba(out)
}

/// Vertical positions for a title block stacked above an artist block.
///
/// The title top is `(H - h1 - h2 - gap) / 2` and the artist top is
/// `(H + h1 + gap) / 2`, both floor-divided.
pub fn stacked_offsets(title_height: u32, artist_height: u32, gap: u32, reference_height: u32) -> (i32, i32) {
    let h = reference_height as i32;
    let h1 = title_height as i32;
    let h2 = artist_height as i32;
    let gap = gap as i32;
    let top = (h - h1 - h2 - gap).div_euclid(2);
    (top, (h + h1 + gap).div_euclid(2))
}

/// Horizontal offset that centers a block of `text_width` in `frame_width`.
pub fn centered_x(text_width: u32, frame_width: u32) -> i32 {
    (frame_width as i32 - text_width as i32).div_euclid(2)
}

/// The static song/artist layer laid over the whole video.
pub struct TitleCard {
    title: TextOverlay,
    artist: TextOverlay,
    color: [u8; 4],
    gap: u32,
    reference_height: u32,
}

impl TitleCard {
    pub fn load(settings: &OverlaySettings) -> Result<Self> {
        let bytes = resolve_font(settings)?;
        Ok(Self {
            title: TextOverlay::new(settings.title_size, &bytes)?,
            artist: TextOverlay::new(settings.artist_size, &bytes)?,
            color: settings.color,
            gap: settings.gap,
            reference_height: settings.reference_height,
        })
    }

    /// A transparent `width`×`height` layer with both lines of text on it.
    pub fn rasterize(&self, width: u32, height: u32, title: &str, artist: &str) -> RgbaImage {
        let mut layer = RgbaImage::new(width, height);
        let (y1, y2) = stacked_offsets(
            self.title.line_height(),
            self.artist.line_height(),
            self.gap,
            self.reference_height,
        );

        let x1 = centered_x(self.title.measure_width(title), width);
        let x2 = centered_x(self.artist.measure_width(artist), width);
        self.title.composite(&mut layer, title, x1, y1, self.color);
        self.artist.composite(&mut layer, artist, x2, y2, self.color);

        log::debug!("Title card: title at ({x1}, {y1}), artist at ({x2}, {y2})");
        layer
    }
}

/// Font bytes from, in order: the configured path, the configured URL, a
/// well-known system font.
pub fn resolve_font(settings: &OverlaySettings) -> Result<Vec<u8>> {
    if let Some(ref path) = settings.font {
        return std::fs::read(path)
            .map_err(|e| SongwaveError::Font(format!("{}: {}", path.display(), e)));
    }

    if let Some(ref url) = settings.font_url {
        match load_font_from_url(url) {
            Ok(bytes) => return Ok(bytes),
            Err(err) => log::warn!("Failed to load font from URL: {}", err),
        }
    }

    for candidate in SYSTEM_FONTS {
        if let Ok(bytes) = std::fs::read(candidate) {
            log::info!("Using system font {}", candidate);
            return Ok(bytes);
        }
    }

    Err(SongwaveError::Font(
        "no font configured and no system font found; set overlay.font in the config".into(),
    ))
}

/// Download a font, caching it under the user cache directory.
pub fn load_font_from_url(url: &str) -> Result<Vec<u8>> {
    let cached = font_cache_path(url);
    if let Some(ref path) = cached {
        if let Ok(bytes) = std::fs::read(path) {
            log::debug!("Font cache hit: {}", path.display());
            return Ok(bytes);
        }
    }

    log::info!("Downloading font from {}", url);
    let bytes = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(|e| SongwaveError::Font(format!("{url}: {e}")))?
        .to_vec();

    if let Some(path) = cached {
        let written = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| std::fs::write(&path, &bytes));
        if let Err(e) = written {
            log::warn!("Could not cache font at {}: {}", path.display(), e);
        }
    }

    Ok(bytes)
}

fn font_cache_path(url: &str) -> Option<PathBuf> {
    let name = url.rsplit('/').next().filter(|n| !n.is_empty())?;
    let name: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    dirs::cache_dir().map(|d| d.join("songwave").join("fonts").join(name))
}
