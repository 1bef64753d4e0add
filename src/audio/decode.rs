use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, SongwaveError};

/// Mono samples at the file's native rate.
#[derive(Clone, Debug)]
pub struct AudioTrack {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioTrack {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Samples covering `[t, t + 1/fps)`, clamped to the end of the track.
    pub fn window(&self, t: f64, fps: u32) -> &[f32] {
        let sr = self.sample_rate as f64;
        let len = self.samples.len();
        let start = ((t * sr).floor().max(0.0) as usize).min(len);
        let end = (((t + 1.0 / fps.max(1) as f64) * sr).floor().max(0.0) as usize).min(len);
        &self.samples[start..end.max(start)]
    }
}

fn decode_err(e: impl std::fmt::Display) -> SongwaveError {
    SongwaveError::Decode(e.to_string())
}

pub fn decode_audio(path: &Path) -> Result<AudioTrack> {
    let file = std::fs::File::open(path)
        .map_err(|e| SongwaveError::Decode(format!("{}: {}", path.display(), e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SongwaveError::Decode(format!("unrecognised format ({e})")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SongwaveError::Decode("no audio tracks found".into()))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SongwaveError::Decode("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_err)?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(decode_err(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping corrupt packet: {}", msg);
                continue;
            }
            Err(e) => return Err(decode_err(e)),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let samples = sample_buf.samples();

        // Downmix to mono
        if channels == 1 {
            all_samples.extend_from_slice(samples);
        } else {
            for frame_samples in samples.chunks(channels) {
                all_samples.push(frame_samples.iter().sum::<f32>() / channels as f32);
            }
        }
    }

    if all_samples.is_empty() {
        return Err(SongwaveError::Decode(format!("{} contains no samples", path.display())));
    }

    let track = AudioTrack::new(all_samples, sample_rate);
    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        track.samples.len(),
        sample_rate,
        track.duration()
    );

    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_wav_at_native_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..11025).map(|i| ((i % 100) as i16 - 50) * 200).collect();
        write_wav(&path, &samples, 22050, 1);

        let track = decode_audio(&path).unwrap();
        assert_eq!(track.sample_rate, 22050);
        assert_eq!(track.samples.len(), 11025);
        assert!((track.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // left = +16384, right = -16384 -> mono silence
        let samples: Vec<i16> = (0..2000).map(|i| if i % 2 == 0 { 16384 } else { -16384 }).collect();
        write_wav(&path, &samples, 8000, 2);

        let track = decode_audio(&path).unwrap();
        assert_eq!(track.samples.len(), 1000);
        assert!(track.samples.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn rejects_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.mp3");
        std::fs::write(&path, b"definitely not an mp3 file").unwrap();
        assert!(matches!(decode_audio(&path), Err(SongwaveError::Decode(_))));
    }

    #[test]
    fn rejects_empty_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, &[], 44100, 1);
        assert!(matches!(decode_audio(&path), Err(SongwaveError::Decode(_))));
    }

    #[test]
    fn missing_file_is_decode_error() {
        let err = decode_audio(Path::new("/nonexistent/track.mp3")).unwrap_err();
        assert!(matches!(err, SongwaveError::Decode(_)));
    }

    #[test]
    fn window_covers_one_frame_interval() {
        let track = AudioTrack::new(vec![0.0; 48000], 48000);
        assert_eq!(track.window(0.0, 16).len(), 3000);
        assert_eq!(track.window(0.5, 2).len(), 24000);
        // Last frame runs past the end and is clamped
        assert_eq!(track.window(0.75, 2).len(), 12000);
        assert!(track.window(2.0, 24).is_empty());
    }
}
