//! Recorder tap: a lock-free ring between the engine and whoever records.

use log::debug;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::io::{Seek, Write};
use std::path::Path;

use crate::error::Result;

pub const RECORD_CHANNELS: u16 = 2;

/// Engine-side end of the recording sink.
pub struct RecordingTap {
    producer: HeapProducer<f32>,
}

impl RecordingTap {
    /// Push interleaved stereo samples, returning how many fit.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }
}

/// Consumer end of the recording sink.
pub struct Recorder {
    consumer: HeapConsumer<f32>,
    sample_rate: u32,
}

/// Create a recording sink holding up to `capacity_frames` stereo frames.
pub fn recording_sink(sample_rate: u32, capacity_frames: usize) -> (RecordingTap, Recorder) {
    let rb = HeapRb::<f32>::new(capacity_frames * RECORD_CHANNELS as usize);
    let (producer, consumer) = rb.split();
    (
        RecordingTap { producer },
        Recorder {
            consumer,
            sample_rate,
        },
    )
}

impl Recorder {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: RECORD_CHANNELS,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }

    /// Take every sample currently buffered.
    pub fn drain(&mut self) -> Vec<f32> {
        let mut out = vec![0.0; self.consumer.len()];
        let read = self.consumer.pop_slice(&mut out);
        out.truncate(read);
        out
    }

    /// Move buffered samples into an open WAV writer.
    pub fn drain_into<W: Write + Seek>(&mut self, writer: &mut hound::WavWriter<W>) -> Result<usize> {
        let samples = self.drain();
        for &sample in &samples {
            writer.write_sample(sample)?;
        }
        Ok(samples.len())
    }

    /// Open a WAV file matching this recorder's format.
    pub fn create_wav<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<hound::WavWriter<std::io::BufWriter<std::fs::File>>> {
        debug!("Recording to {:?}", path.as_ref());
        Ok(hound::WavWriter::create(path, self.wav_spec())?)
    }
}
