/// Loudness to background color mapping.
///
/// Below `threshold` the background is `quiet`. From `threshold` up to 1.0 each
/// channel moves linearly from `low` to `high`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Palette {
    pub threshold: f32,
    pub quiet: [u8; 3],
    pub low: [u8; 3],
    pub high: [u8; 3],
}

impl Palette {
    /// Green-to-red over a teal-ish blue, quiet passages in mint.
    pub const CLASSIC: Palette = Palette {
        threshold: 0.1,
        quiet: [0, 255, 150],
        low: [0, 255, 150],
        high: [255, 0, 150],
    };

    /// Green-to-red with no blue, quiet passages in pure blue.
    pub const MONO: Palette = Palette {
        threshold: 0.1,
        quiet: [0, 0, 255],
        low: [0, 255, 0],
        high: [255, 0, 0],
    };

    pub fn color_for(&self, intensity: f32) -> [u8; 3] {
        // NaN lands here too
        if !(intensity >= self.threshold) {
            return self.quiet;
        }

        let span = 1.0 - self.threshold;
        let frac = if span > 0.0 {
            ((intensity - self.threshold) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let mut rgb = [0u8; 3];
        for (c, out) in rgb.iter_mut().enumerate() {
            let lo = self.low[c] as f32;
            let hi = self.high[c] as f32;
            *out = (lo + (hi - lo) * frac).round().clamp(0.0, 255.0) as u8;
        }
        rgb
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::CLASSIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep() -> impl Iterator<Item = f32> {
        (0..=900).map(|i| 0.1 + i as f32 * 0.001)
    }

    #[test]
    fn quiet_below_threshold() {
        for i in 0..100 {
            let intensity = i as f32 * 0.001;
            assert_eq!(Palette::CLASSIC.color_for(intensity), [0, 255, 150]);
            assert_eq!(Palette::MONO.color_for(intensity), [0, 0, 255]);
        }
        assert_eq!(Palette::CLASSIC.color_for(f32::NAN), [0, 255, 150]);
    }

    #[test]
    fn endpoints() {
        assert_eq!(Palette::CLASSIC.color_for(0.1), [0, 255, 150]);
        assert_eq!(Palette::CLASSIC.color_for(1.0), [255, 0, 150]);
        assert_eq!(Palette::MONO.color_for(0.1), [0, 255, 0]);
        assert_eq!(Palette::MONO.color_for(1.0), [255, 0, 0]);
    }

    #[test]
    fn red_rises_green_falls_blue_fixed() {
        let mut prev = Palette::CLASSIC.color_for(0.1);
        for intensity in sweep() {
            let rgb = Palette::CLASSIC.color_for(intensity);
            assert!(rgb[0] >= prev[0], "red fell at {intensity}");
            assert!(rgb[1] <= prev[1], "green rose at {intensity}");
            assert_eq!(rgb[2], 150);
            prev = rgb;
        }
    }

    #[test]
    fn midpoint_is_halfway() {
        let rgb = Palette::CLASSIC.color_for(0.55);
        assert!((rgb[0] as i32 - 128).abs() <= 1);
        assert!((rgb[1] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn half_channel_rounds_up() {
        let palette = Palette {
            threshold: 0.0,
            ..Palette::CLASSIC
        };
        // 255 * 0.5 = 127.5 lands on 128, not the truncated 127
        assert_eq!(palette.color_for(0.5), [128, 128, 150]);
    }

    #[test]
    fn out_of_range_intensity_is_clamped() {
        assert_eq!(Palette::CLASSIC.color_for(3.0), [255, 0, 150]);
    }

    #[test]
    fn custom_threshold() {
        let palette = Palette {
            threshold: 0.5,
            ..Palette::CLASSIC
        };
        assert_eq!(palette.color_for(0.49), palette.quiet);
        assert_eq!(palette.color_for(0.5), [0, 255, 150]);
    }
}
