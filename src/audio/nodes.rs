//! Render-thread DSP nodes for one instrument chain:
//! source → low shelf → high shelf → spatial panner.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::geometry::Vec3;

/// Looping sample player with variable playback rate.
///
/// Source material at a different sample rate is resampled by linear
/// interpolation.
pub struct LoopingSource {
    samples: Arc<[f32]>,
    /// Source frames advanced per output frame at rate 1.0.
    base_step: f64,
    position: f64,
}

impl LoopingSource {
    pub fn new(samples: Arc<[f32]>, source_rate: u32, output_rate: u32) -> Self {
        Self {
            samples,
            base_step: source_rate as f64 / output_rate as f64,
            position: 0.0,
        }
    }

    /// Rewind to the first frame.
    pub fn reset(&mut self) {
        self.position = 0.0;
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Produce one sample. Negative rates are treated as paused.
    #[inline]
    pub fn next(&mut self, rate: f32) -> f32 {
        let len = self.samples.len();
        if len == 0 {
            return 0.0;
        }

        let index = self.position as usize;
        let frac = (self.position - index as f64) as f32;
        let a = self.samples[index % len];
        let b = self.samples[(index + 1) % len];
        let out = a + (b - a) * frac;

        self.position += self.base_step * rate.max(0.0) as f64;
        if self.position >= len as f64 {
            self.position %= len as f64;
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfKind {
    Low,
    High,
}

/// Shelf filter with a movable corner frequency and fixed gain.
pub struct ShelfFilter {
    kind: ShelfKind,
    gain_db: f32,
    sample_rate: f32,
    corner: f32,
    filter: DirectForm2Transposed<f32>,
}

/// Corner moves smaller than this keep the current coefficients.
const CORNER_EPSILON_HZ: f32 = 0.5;

impl ShelfFilter {
    pub fn new(kind: ShelfKind, gain_db: f32, corner: f32, sample_rate: f32) -> Self {
        let corner = clamp_corner(corner, sample_rate);
        let coeffs = shelf_coefficients(kind, gain_db, corner, sample_rate);
        Self {
            kind,
            gain_db,
            sample_rate,
            corner,
            filter: DirectForm2Transposed::<f32>::new(coeffs),
        }
    }

    pub fn corner(&self) -> f32 {
        self.corner
    }

    pub fn kind(&self) -> ShelfKind {
        self.kind
    }

    pub fn set_corner(&mut self, corner: f32) {
        let corner = clamp_corner(corner, self.sample_rate);
        if (corner - self.corner).abs() < CORNER_EPSILON_HZ {
            return;
        }
        self.corner = corner;
        self.filter.update_coefficients(shelf_coefficients(
            self.kind,
            self.gain_db,
            corner,
            self.sample_rate,
        ));
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.filter.run(input)
    }
}

fn clamp_corner(corner: f32, sample_rate: f32) -> f32 {
    if corner.is_finite() {
        corner.clamp(10.0, sample_rate * 0.45)
    } else {
        10.0
    }
}

fn shelf_coefficients(kind: ShelfKind, gain_db: f32, corner: f32, sample_rate: f32) -> Coefficients<f32> {
    let filter = match kind {
        ShelfKind::Low => Type::LowShelf(gain_db),
        ShelfKind::High => Type::HighShelf(gain_db),
    };
    Coefficients::<f32>::from_params(filter, sample_rate.hz(), corner.hz(), Q_BUTTERWORTH_F32)
        .unwrap_or(PASSTHROUGH)
}

const PASSTHROUGH: Coefficients<f32> = Coefficients {
    a1: 0.0,
    a2: 0.0,
    b0: 1.0,
    b1: 0.0,
    b2: 0.0,
};

/// Largest interaural delay, reached for a source directly to one side.
const MAX_INTERAURAL_DELAY_SECONDS: f32 = 0.00066;
const DELAY_LINE_LEN: usize = 128;

/// Per-ear rendering parameters derived from a source position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarGains {
    pub left: f32,
    pub right: f32,
    /// Extra delay applied to the left ear, in samples.
    pub left_delay: f32,
    /// Extra delay applied to the right ear, in samples.
    pub right_delay: f32,
}

/// Binaural-style panner.
///
/// The listener sits at the origin facing -z with +y up. Panning is
/// equal-power on the azimuth, the far ear is delayed to model interaural time
/// difference, and level follows the inverse distance model.
pub struct SpatialPanner {
    sample_rate: f32,
    ref_distance: f32,
    rolloff: f32,
    orientation: Vec3,
    left: DelayLine,
    right: DelayLine,
}

impl SpatialPanner {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            ref_distance: 1.0,
            rolloff: 1.0,
            orientation: Vec3::new(1.0, 0.0, 0.0),
            left: DelayLine::new(),
            right: DelayLine::new(),
        }
    }

    pub fn set_orientation(&mut self, orientation: Vec3) {
        self.orientation = orientation;
    }

    /// Source facing. The cone is omnidirectional, so this does not change
    /// the rendered level.
    pub fn orientation(&self) -> Vec3 {
        self.orientation
    }

    /// Inverse distance attenuation.
    pub fn distance_gain(&self, distance: f32) -> f32 {
        let d = distance.max(self.ref_distance);
        self.ref_distance / (self.ref_distance + self.rolloff * (d - self.ref_distance))
    }

    pub fn gains_for(&self, position: Vec3) -> EarGains {
        let gain = self.distance_gain(position.length());

        let azimuth = if position.x == 0.0 && position.z == 0.0 {
            0.0
        } else {
            position.x.atan2(-position.z)
        };
        let pan = azimuth.sin().clamp(-1.0, 1.0);

        let angle = (pan + 1.0) * PI / 4.0;
        let itd = MAX_INTERAURAL_DELAY_SECONDS * pan.abs() * self.sample_rate;

        EarGains {
            left: angle.cos() * gain,
            right: angle.sin() * gain,
            left_delay: if pan > 0.0 { itd } else { 0.0 },
            right_delay: if pan < 0.0 { itd } else { 0.0 },
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32, gains: &EarGains) -> (f32, f32) {
        self.left.push(input);
        self.right.push(input);
        (
            self.left.read(gains.left_delay) * gains.left,
            self.right.read(gains.right_delay) * gains.right,
        )
    }
}

/// Short fractional delay line for the interaural delay.
struct DelayLine {
    buffer: [f32; DELAY_LINE_LEN],
    write: usize,
}

impl DelayLine {
    fn new() -> Self {
        Self {
            buffer: [0.0; DELAY_LINE_LEN],
            write: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.write = (self.write + 1) % DELAY_LINE_LEN;
        self.buffer[self.write] = sample;
    }

    /// Read `delay` samples behind the newest sample.
    fn read(&self, delay: f32) -> f32 {
        let delay = delay.clamp(0.0, (DELAY_LINE_LEN - 2) as f32);
        let whole = delay as usize;
        let frac = delay - whole as f32;
        let a = self.buffer[(self.write + DELAY_LINE_LEN - whole) % DELAY_LINE_LEN];
        let b = self.buffer[(self.write + DELAY_LINE_LEN - whole - 1) % DELAY_LINE_LEN];
        a + (b - a) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_source(len: usize) -> Arc<[f32]> {
        (0..len).map(|i| i as f32).collect::<Vec<_>>().into()
    }

    #[test]
    fn source_loops() {
        let mut source = LoopingSource::new(ramp_source(4), 48_000, 48_000);
        let out: Vec<f32> = (0..6).map(|_| source.next(1.0)).collect();
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0, 0.0, 1.0]);
    }

    #[test]
    fn source_rate_changes_speed() {
        let mut source = LoopingSource::new(ramp_source(16), 48_000, 48_000);
        source.next(2.0);
        assert_eq!(source.next(2.0), 2.0);

        let mut half = LoopingSource::new(ramp_source(16), 48_000, 48_000);
        half.next(0.5);
        assert_eq!(half.next(0.5), 0.5);
    }

    #[test]
    fn source_resamples_and_pauses() {
        let mut source = LoopingSource::new(ramp_source(16), 24_000, 48_000);
        source.next(1.0);
        assert_eq!(source.next(1.0), 0.5);

        let before = source.position();
        source.next(0.0);
        source.next(-1.0);
        assert_eq!(source.position(), before);

        source.reset();
        assert_eq!(source.position(), 0.0);
    }

    #[test]
    fn shelf_corner_is_clamped() {
        let mut shelf = ShelfFilter::new(ShelfKind::High, -12.0, 2_000.0, 48_000.0);
        shelf.set_corner(1_000_000.0);
        assert_eq!(shelf.corner(), 48_000.0 * 0.45);
        shelf.set_corner(f32::NAN);
        assert_eq!(shelf.corner(), 10.0);
    }

    #[test]
    fn low_shelf_cuts_bass() {
        let sample_rate = 48_000.0;
        let mut shelf = ShelfFilter::new(ShelfKind::Low, -12.0, 2_000.0, sample_rate);
        let mut peak = 0.0_f32;
        for i in 0..48_000 {
            let t = i as f32 / sample_rate;
            let out = shelf.process((2.0 * PI * 50.0 * t).sin());
            if i > 24_000 {
                peak = peak.max(out.abs());
            }
        }
        // -12 dB is a factor of about 0.25
        assert!(peak < 0.35, "peak was {}", peak);
    }

    #[test]
    fn panner_follows_azimuth() {
        let panner = SpatialPanner::new(48_000.0);

        let right = panner.gains_for(Vec3::new(2.0, 0.0, 0.0));
        assert!(right.right > right.left);
        assert!(right.left_delay > 0.0);
        assert_eq!(right.right_delay, 0.0);

        let left = panner.gains_for(Vec3::new(-2.0, 0.0, 0.0));
        assert!(left.left > left.right);
        assert!(left.right_delay > 0.0);

        let ahead = panner.gains_for(Vec3::new(0.0, 0.0, -2.0));
        assert!((ahead.left - ahead.right).abs() < 1e-6);
    }

    #[test]
    fn panner_handles_origin() {
        let panner = SpatialPanner::new(48_000.0);
        let gains = panner.gains_for(Vec3::ZERO);
        assert!(gains.left.is_finite() && gains.right.is_finite());
        assert!((gains.left - gains.right).abs() < 1e-6);
        assert!((gains.left - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn distance_attenuates() {
        let panner = SpatialPanner::new(48_000.0);
        assert_eq!(panner.distance_gain(0.0), 1.0);
        assert_eq!(panner.distance_gain(1.0), 1.0);
        assert!((panner.distance_gain(4.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn delay_line_delays() {
        let mut panner = SpatialPanner::new(48_000.0);
        let gains = EarGains {
            left: 1.0,
            right: 1.0,
            left_delay: 2.0,
            right_delay: 0.0,
        };
        let first = panner.process(1.0, &gains);
        assert_eq!(first, (0.0, 1.0));
        panner.process(0.0, &gains);
        let third = panner.process(0.0, &gains);
        assert_eq!(third, (1.0, 0.0));
    }
}
