//! Lock-free automatable parameters.
//!
//! The update thread writes ramp requests into an [`AudioParam`]; the render
//! thread owns a [`ParamSmoother`] that follows them sample by sample. Nothing
//! here blocks either side.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// A parameter shared between the update thread and the render thread.
///
/// Values are stored as `f32` bits in atomics. Every write bumps `epoch`, which
/// is how the render side notices a new ramp request.
#[derive(Debug)]
pub struct AudioParam {
    target: AtomicU32,
    ramp_seconds: AtomicU32,
    epoch: AtomicU64,
}

impl AudioParam {
    pub fn new(initial: f32) -> Self {
        Self {
            target: AtomicU32::new(initial.to_bits()),
            ramp_seconds: AtomicU32::new(0.0_f32.to_bits()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Schedule a linear ramp from wherever the render side currently is to
    /// `target`, finishing `ramp` later on the audio clock.
    pub fn linear_ramp_to(&self, target: f32, ramp: Duration) {
        self.target.store(target.to_bits(), Ordering::Relaxed);
        self.ramp_seconds
            .store(ramp.as_secs_f32().to_bits(), Ordering::Relaxed);
        self.epoch.fetch_add(1, Ordering::Release);
    }

    /// Jump to `value` on the next render block.
    pub fn set_value(&self, value: f32) {
        self.linear_ramp_to(value, Duration::ZERO);
    }

    /// The most recently requested target.
    pub fn target(&self) -> f32 {
        f32::from_bits(self.target.load(Ordering::Relaxed))
    }

    /// Duration of the most recently requested ramp.
    pub fn ramp_time(&self) -> Duration {
        Duration::from_secs_f32(f32::from_bits(self.ramp_seconds.load(Ordering::Relaxed)))
    }

    /// Number of ramp requests issued so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

/// Render-side follower for one [`AudioParam`].
#[derive(Debug, Clone)]
pub struct ParamSmoother {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
    seen_epoch: u64,
}

impl ParamSmoother {
    pub fn new(param: &AudioParam) -> Self {
        let value = param.target();
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
            seen_epoch: param.epoch(),
        }
    }

    /// Pick up a new ramp request, if one was issued since the last sync.
    pub fn sync(&mut self, param: &AudioParam, sample_rate: f32) {
        let epoch = param.epoch();
        if epoch == self.seen_epoch {
            return;
        }
        self.seen_epoch = epoch;
        self.target = param.target();

        let samples = (param.ramp_time().as_secs_f32() * sample_rate).round() as u32;
        if samples == 0 {
            self.current = self.target;
            self.remaining = 0;
        } else {
            self.step = (self.target - self.current) / samples as f32;
            self.remaining = samples;
        }
    }

    /// Advance one sample and return the new value.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else {
                self.current += self.step;
            }
        }
        self.current
    }

    /// Advance `frames` samples at once (control-rate use).
    pub fn advance(&mut self, frames: u32) -> f32 {
        if frames >= self.remaining {
            self.remaining = 0;
            self.current = self.target;
        } else {
            self.remaining -= frames;
            self.current += self.step * frames as f32;
        }
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_is_linear_and_lands_on_target() {
        let param = AudioParam::new(0.0);
        let mut smoother = ParamSmoother::new(&param);

        param.linear_ramp_to(1.0, Duration::from_millis(100));
        smoother.sync(&param, 100.0); // 10 samples

        let first = smoother.next();
        assert!((first - 0.1).abs() < 1e-6);
        for _ in 0..8 {
            smoother.next();
        }
        assert!(smoother.is_ramping());
        assert_eq!(smoother.next(), 1.0);
        assert!(!smoother.is_ramping());
        assert_eq!(smoother.next(), 1.0);
    }

    #[test]
    fn zero_length_ramp_jumps() {
        let param = AudioParam::new(3.0);
        let mut smoother = ParamSmoother::new(&param);
        param.set_value(7.0);
        smoother.sync(&param, 48_000.0);
        assert_eq!(smoother.value(), 7.0);
    }

    #[test]
    fn reissued_target_does_not_drift() {
        let param = AudioParam::new(0.0);
        let mut smoother = ParamSmoother::new(&param);

        param.linear_ramp_to(2.0, Duration::from_millis(10));
        smoother.sync(&param, 1_000.0);
        smoother.advance(10);
        assert_eq!(smoother.value(), 2.0);

        param.linear_ramp_to(2.0, Duration::from_millis(10));
        smoother.sync(&param, 1_000.0);
        smoother.advance(3);
        assert_eq!(smoother.value(), 2.0);
        assert_eq!(param.epoch(), 2);
    }

    #[test]
    fn retarget_mid_ramp_starts_from_current_value() {
        let param = AudioParam::new(0.0);
        let mut smoother = ParamSmoother::new(&param);

        param.linear_ramp_to(10.0, Duration::from_millis(10));
        smoother.sync(&param, 1_000.0);
        smoother.advance(5);
        assert!((smoother.value() - 5.0).abs() < 1e-4);

        param.linear_ramp_to(0.0, Duration::from_millis(5));
        smoother.sync(&param, 1_000.0);
        smoother.next();
        assert!((smoother.value() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn untouched_param_is_stable() {
        let param = AudioParam::new(0.25);
        let mut smoother = ParamSmoother::new(&param);
        smoother.sync(&param, 48_000.0);
        assert_eq!(smoother.advance(512), 0.25);
        assert_eq!(param.ramp_time(), Duration::ZERO);
    }
}
