use std::path::Path;

use rayon::prelude::*;

use super::decode::{decode_audio, AudioTrack};
use crate::error::Result;

/// RMS window length in samples.
pub const FRAME_LENGTH: usize = 2048;
/// Distance between consecutive RMS windows.
pub const HOP_LENGTH: usize = 512;

/// Per-window loudness normalized to [0, 1] over the whole track.
#[derive(Clone, Debug, PartialEq)]
pub struct LoudnessCurve {
    values: Vec<f32>,
}

impl LoudnessCurve {
    /// Min-max normalize raw energies. A flat curve (max == min) becomes all zeros.
    pub fn from_energy(energy: &[f32]) -> Self {
        let min = energy.iter().copied().fold(f32::INFINITY, f32::min);
        let max = energy.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;

        let values = if range > 0.0 && range.is_finite() {
            energy.iter().map(|&v| ((v - min) / range).clamp(0.0, 1.0)).collect()
        } else {
            if !energy.is_empty() {
                log::warn!("Loudness is constant across the track, using zero intensity");
            }
            vec![0.0; energy.len()]
        };

        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Curve index for time `t` of a clip lasting `duration` seconds.
    pub fn index_at(&self, t: f64, duration: f64) -> usize {
        if self.values.is_empty() || duration <= 0.0 {
            return 0;
        }
        let idx = (t * self.values.len() as f64 / duration).floor().max(0.0) as usize;
        idx.min(self.values.len() - 1)
    }

    pub fn intensity_at(&self, t: f64, duration: f64) -> f32 {
        self.values
            .get(self.index_at(t, duration))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Centered RMS energy, one value per hop. Windows that hang over either end of
/// the signal are zero padded, so there are `1 + len / HOP_LENGTH` of them.
pub fn rms_energy(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let pad = (FRAME_LENGTH / 2) as isize;
    let num_frames = 1 + samples.len() / HOP_LENGTH;

    (0..num_frames)
        .into_par_iter()
        .map(|frame_idx| {
            let start = (frame_idx * HOP_LENGTH) as isize - pad;
            let lo = start.max(0) as usize;
            let hi = ((start + FRAME_LENGTH as isize).max(0) as usize).min(samples.len());
            let sum: f64 = if lo < hi {
                samples[lo..hi].iter().map(|&s| (s as f64) * (s as f64)).sum()
            } else {
                0.0
            };
            (sum / FRAME_LENGTH as f64).sqrt() as f32
        })
        .collect()
}

pub fn loudness_curve(track: &AudioTrack) -> LoudnessCurve {
    let energy = rms_energy(&track.samples);
    let curve = LoudnessCurve::from_energy(&energy);
    log::info!(
        "Loudness: {} windows (frame={}, hop={})",
        curve.len(),
        FRAME_LENGTH,
        HOP_LENGTH
    );
    curve
}

/// Decode `path` and compute its loudness curve.
pub fn analyze(path: &Path) -> Result<(AudioTrack, LoudnessCurve)> {
    let track = decode_audio(path)?;
    let curve = loudness_curve(&track);
    Ok((track, curve))
}
