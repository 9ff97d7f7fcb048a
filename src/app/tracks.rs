//! Where raw track bytes come from.

use async_trait::async_trait;
use log::debug;
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::PathBuf;

use crate::error::{MixerError, Result};

/// Fetches a track's raw (still encoded) bytes by name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackSource: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>>;
}

/// Reads tracks from files under a directory.
pub struct DirTrackSource {
    root: PathBuf,
}

impl DirTrackSource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TrackSource for DirTrackSource {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.root.join(name);
        debug!("Reading track {}", path.display());
        tokio::fs::read(&path)
            .await
            .map_err(|e| MixerError::TrackUnavailable(format!("{}: {}", path.display(), e)))
    }
}

/// Synthesises a short looping tone per track name, as WAV bytes.
///
/// Each name maps deterministically to a pitch and one of four waveforms, so a
/// default ensemble has four audibly distinct timbres without any files.
pub struct ToneTrackSource {
    sample_rate: u32,
    seconds: f32,
}

impl ToneTrackSource {
    pub fn new(sample_rate: u32, seconds: f32) -> Self {
        Self {
            sample_rate,
            seconds,
        }
    }

    fn render(&self, name: &str) -> Result<Vec<u8>> {
        let seed = name
            .bytes()
            .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));
        let frequency = [110.0, 146.83, 196.0, 261.63][(seed % 4) as usize];
        let waveform = (seed / 4) % 4;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            let frames = (self.seconds * self.sample_rate as f32) as usize;
            for i in 0..frames {
                let phase = (i as f32 * frequency / self.sample_rate as f32).fract();
                let value = match waveform {
                    0 => (2.0 * PI * phase).sin(),
                    1 => {
                        if phase < 0.5 {
                            0.6
                        } else {
                            -0.6
                        }
                    }
                    2 => 2.0 * phase - 1.0,
                    _ => 1.0 - 4.0 * (phase - 0.5).abs(),
                };
                writer.write_sample((value * 0.4 * i16::MAX as f32) as i16)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }
}

#[async_trait]
impl TrackSource for ToneTrackSource {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>> {
        self.render(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode_track;
    use tempfile::tempdir;

    #[tokio::test]
    async fn tone_tracks_decode() {
        let source = ToneTrackSource::new(16_000, 0.5);
        let bytes = source.fetch("bass.mp3").await.unwrap();
        let track = decode_track(&bytes).unwrap();
        assert_eq!(track.sample_rate, 16_000);
        assert_eq!(track.frames(), 8_000);
    }

    #[test]
    fn tone_tracks_are_deterministic() {
        let source = ToneTrackSource::new(8_000, 0.1);
        tokio_test::block_on(async {
            let a = source.fetch("drums.mp3").await.unwrap();
            let b = source.fetch("drums.mp3").await.unwrap();
            assert_eq!(a, b);
            assert_ne!(a, source.fetch("vocals.mp3").await.unwrap());
        });
    }

    #[tokio::test]
    async fn dir_source_reads_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("loop.wav"), b"bytes").unwrap();

        let source = DirTrackSource::new(dir.path());
        assert_eq!(source.fetch("loop.wav").await.unwrap(), b"bytes".to_vec());
        assert!(matches!(
            source.fetch("missing.wav").await,
            Err(MixerError::TrackUnavailable(_))
        ));
    }
}
