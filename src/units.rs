//! Range scaling helpers used to turn positions into control values.

/// Affine map from `[in_start, in_end]` onto `[out_start, out_end]`.
///
/// No clamping: inputs outside the range extrapolate.
pub fn scale_linear(input: f32, in_start: f32, in_end: f32, out_start: f32, out_end: f32) -> f32 {
    (input - in_start) * (out_end - out_start) / (in_end - in_start) + out_start
}

/// Exponential map from `[in_start, in_end]` onto `[out_start, out_end]`.
///
/// Equal input steps give equal frequency ratios, which matches how pitch and
/// brightness are perceived. Inputs below `in_start` are clamped; inputs above
/// `in_end` extrapolate.
///
/// # Panics
/// If `out_start` is zero.
pub fn scale_log(input: f32, in_start: f32, in_end: f32, out_start: f32, out_end: f32) -> f32 {
    assert!(out_start != 0.0, "scale_log requires a nonzero out_start");

    let input = input.max(in_start);
    let fraction = (input - in_start) / (in_end - in_start);
    out_start * (out_end / out_start).powf(fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-3 * b.abs().max(1.0)
    }

    #[test]
    fn linear_maps_height_to_rate() {
        assert!(approx(scale_linear(0.0, 0.0, 1.0, 0.0, 2.0), 0.0));
        assert!(approx(scale_linear(0.5, 0.0, 1.0, 0.0, 2.0), 1.0));
        assert!(approx(scale_linear(1.0, 0.0, 1.0, 0.0, 2.0), 2.0));
    }

    #[test]
    fn linear_extrapolates() {
        assert!(approx(scale_linear(2.0, 0.0, 1.0, 0.0, 2.0), 4.0));
        assert!(approx(scale_linear(-1.0, 0.0, 1.0, 0.0, 2.0), -2.0));
    }

    #[test]
    fn log_hits_endpoints() {
        assert!(approx(scale_log(0.0, 0.0, 10.0, 20.0, 2000.0), 20.0));
        assert!(approx(scale_log(10.0, 0.0, 10.0, 20.0, 2000.0), 2000.0));
        assert!(approx(scale_log(5.0, 0.0, 10.0, 20.0, 2000.0), 200.0));
    }

    #[test]
    fn log_clamps_below_range() {
        let at_zero = scale_log(0.0, 0.0, 10.0, 20.0, 2000.0);
        assert_eq!(scale_log(-5.0, 0.0, 10.0, 20.0, 2000.0), at_zero);
    }

    #[test]
    #[should_panic]
    fn log_rejects_zero_out_start() {
        scale_log(1.0, 0.0, 10.0, 0.0, 2000.0);
    }
}
