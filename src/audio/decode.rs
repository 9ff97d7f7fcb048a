//! Track decoding with Symphonia.

use log::{debug, trace, warn};
use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{MixerError, Result};

/// Decoded sample data for one track, downmixed to mono.
///
/// Immutable once built and shared by every graph built from it.
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    pub sample_rate: u32,
    /// Channel count of the source before downmixing.
    pub source_channels: usize,
    pub samples: Arc<[f32]>,
}

impl DecodedTrack {
    pub fn from_samples(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            source_channels: 1,
            samples: samples.into(),
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn duration_seconds(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }
}

/// Decode an in-memory audio file (any container/codec Symphonia supports).
pub fn decode_track(bytes: &[u8]) -> Result<DecodedTrack> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let probed = symphonia::default::get_probe().format(
        &Hint::new(),
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| MixerError::Decode("no playable track in file".to_string()))?;
    let track_id = track.id;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);
    let mut mono = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                // A corrupt packet is skipped, the rest of the stream may be fine.
                trace!("Skipping undecodable packet: {}", msg);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count();

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        downmix_into(buffer.samples(), channels, &mut mono);
    }

    if mono.is_empty() || sample_rate == 0 {
        return Err(MixerError::Decode("no audio frames decoded".to_string()));
    }

    debug!(
        "Decoded {} frames at {} Hz ({} source channels)",
        mono.len(),
        sample_rate,
        channels
    );

    Ok(DecodedTrack {
        sample_rate,
        source_channels: channels.max(1),
        samples: mono.into(),
    })
}

/// Decode on the blocking pool so the update thread never waits on it.
pub async fn decode_track_async(bytes: Arc<[u8]>) -> Result<DecodedTrack> {
    tokio::task::spawn_blocking(move || decode_track(&bytes))
        .await
        .map_err(|e| {
            warn!("Decode task failed to complete: {}", e);
            MixerError::Decode(format!("decode task aborted: {}", e))
        })?
}

fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 16-bit WAV bytes of a sine tone, for feeding the decoder.
    pub(crate) fn wav_bytes(frequency: f32, seconds: f32, sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (seconds * sample_rate as f32) as usize;
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let sample = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.5;
                for _ in 0..channels {
                    writer
                        .write_sample((sample * i16::MAX as f32) as i16)
                        .unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono_wav() {
        let bytes = wav_bytes(440.0, 0.25, 22_050, 1);
        let track = decode_track(&bytes).unwrap();
        assert_eq!(track.sample_rate, 22_050);
        assert_eq!(track.source_channels, 1);
        assert_eq!(track.frames(), 5_512);
        let peak = track.samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.45 && peak < 0.55);
    }

    #[test]
    fn downmixes_stereo_wav() {
        let bytes = wav_bytes(220.0, 0.1, 48_000, 2);
        let track = decode_track(&bytes).unwrap();
        assert_eq!(track.source_channels, 2);
        assert_eq!(track.frames(), 4_800);
    }

    #[test]
    fn rejects_garbage() {
        let result = decode_track(b"definitely not audio");
        assert!(matches!(result, Err(MixerError::Decode(_))));
    }

    #[tokio::test]
    async fn decodes_off_thread() {
        let bytes: Arc<[u8]> = wav_bytes(330.0, 0.05, 8_000, 1).into();
        let track = decode_track_async(bytes).await.unwrap();
        assert_eq!(track.frames(), 400);
    }
}
