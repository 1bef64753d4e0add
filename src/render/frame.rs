use image::RgbImage;
use plotters::prelude::*;

use super::color::Palette;
use crate::audio::analysis::LoudnessCurve;
use crate::audio::decode::AudioTrack;
use crate::error::{Result, SongwaveError};

pub type Frame = RgbImage;

/// Plot area inset as a fraction of the frame: left, right, top, bottom.
const PLOT_INSETS: [f32; 4] = [0.125, 0.1, 0.12, 0.11];
/// Headroom added around the data range on both axes.
const AXIS_PADDING: f32 = 0.05;
const LINE_WIDTH: u32 = 2;

/// One frame to synthesize.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameRequest {
    pub t: f64,
    pub fps: u32,
    pub duration: f64,
}

/// Draws the waveform window for one timestamp over its loudness color.
#[derive(Clone, Debug)]
pub struct FrameSynthesizer {
    pub width: u32,
    pub height: u32,
    pub palette: Palette,
    pub line: [u8; 3],
}

impl FrameSynthesizer {
    pub fn new(width: u32, height: u32, palette: Palette, line: [u8; 3]) -> Self {
        Self { width, height, palette, line }
    }

    pub fn synthesize(
        &self,
        request: &FrameRequest,
        track: &AudioTrack,
        curve: &LoudnessCurve,
    ) -> Result<Frame> {
        let window = track.window(request.t, request.fps);
        let intensity = curve.intensity_at(request.t, request.duration);
        let background = self.palette.color_for(intensity);

        let mut buffer = vec![0u8; self.width as usize * self.height as usize * 3];
        self.draw(&mut buffer, window, background)?;

        RgbImage::from_raw(self.width, self.height, buffer)
            .ok_or_else(|| SongwaveError::Plot("frame buffer size mismatch".into()))
    }

    // The backend only borrows `buffer` and is gone when this returns.
    fn draw(&self, buffer: &mut [u8], window: &[f32], background: [u8; 3]) -> Result<()> {
        let root = BitMapBackend::with_buffer(buffer, (self.width, self.height)).into_drawing_area();
        let [r, g, b] = background;
        root.fill(&RGBColor(r, g, b)).map_err(plot_err)?;

        if !window.is_empty() {
            let (x_range, y_range) = axis_ranges(window);
            let w = self.width as f32;
            let h = self.height as f32;
            let mut chart = ChartBuilder::on(&root)
                .margin_left((w * PLOT_INSETS[0]).round() as u32)
                .margin_right((w * PLOT_INSETS[1]).round() as u32)
                .margin_top((h * PLOT_INSETS[2]).round() as u32)
                .margin_bottom((h * PLOT_INSETS[3]).round() as u32)
                .build_cartesian_2d(x_range, y_range)
                .map_err(plot_err)?;

            let [lr, lg, lb] = self.line;
            chart
                .draw_series(LineSeries::new(
                    window.iter().enumerate().map(|(i, &v)| (i as f32, v)),
                    RGBColor(lr, lg, lb).stroke_width(LINE_WIDTH),
                ))
                .map_err(plot_err)?;
        }

        root.present().map_err(plot_err)?;
        Ok(())
    }
}

fn plot_err(e: impl std::fmt::Display) -> SongwaveError {
    SongwaveError::Plot(e.to_string())
}

/// Autoscaled axes with a little padding; flat data gets a fixed band around it.
fn axis_ranges(window: &[f32]) -> (std::ops::Range<f32>, std::ops::Range<f32>) {
    let x_max = window.len().saturating_sub(1) as f32;
    let x_pad = if x_max > 0.0 { x_max * AXIS_PADDING } else { 0.5 };

    let lo = window.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = window.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let span = hi - lo;
    let (y_lo, y_hi) = if span > f32::EPSILON {
        (lo - span * AXIS_PADDING, hi + span * AXIS_PADDING)
    } else {
        (lo - AXIS_PADDING, hi + AXIS_PADDING)
    };

    (-x_pad..x_max + x_pad, y_lo..y_hi)
}
