//! Limit and error checking (C2): reference limiting (clip/rate/acceleration), measurement
//! range checks, an RMS limiter, and the debounced regulation-error checker.
//!
//! Grounded on `libreg/inc/libreg/err.h` and `libreg/inc/libreg/rst.h`. The
//! zero-threshold-disables-and-resets behavior of [`ErrorChecker::configure`] follows
//! `regErrInitLimits`'s own doc comment in `err.h` ("If set to zero, reset...").

/// Piecewise-linear envelope bounding a reference magnitude as a function of a companion
/// measurement — the canonical case being a voltage reference bounded by measured current,
/// confining operation to quadrants 1 and 4 of the (I, V) plane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuadrantEnvelope {
    /// `(companion_measurement, max_magnitude)` breakpoints, ascending by measurement.
    pub points: Vec<(f32, f32)>,
}

impl QuadrantEnvelope {
    /// Piecewise-linear interpolation of the ceiling at `companion`, clamped to the
    /// envelope's end breakpoints outside its domain. An empty envelope imposes no
    /// constraint.
    #[must_use]
    pub fn max_magnitude_at(&self, companion: f32) -> f32 {
        match self.points.as_slice() {
            [] => f32::MAX,
            [(_, v)] => *v,
            points => {
                if companion <= points[0].0 {
                    return points[0].1;
                }
                let last = points[points.len() - 1];
                if companion >= last.0 {
                    return last.1;
                }
                for pair in points.windows(2) {
                    let (i0, v0) = pair[0];
                    let (i1, v1) = pair[1];
                    if companion >= i0 && companion <= i1 {
                        let frac = (companion - i0) / (i1 - i0);
                        return v0 + frac * (v1 - v0);
                    }
                }
                last.1
            }
        }
    }
}

/// Clip, rate, and acceleration limiting of a reference value, with back-calculation
/// signalled to the caller via `is_limited` so the RST regulator can re-derive a consistent
/// reference history (see [`crate::rst::calc_ref`]).
#[derive(Debug, Clone)]
pub struct RefLimits {
    pub min: f32,
    pub max: f32,
    pub rate_limit: f32,
    pub acceleration_limit: f32,
    /// Optional (I, V)-quadrant ceiling, evaluated against a companion measurement supplied
    /// to [`Self::apply`].
    pub quadrant: Option<QuadrantEnvelope>,
}

impl Default for RefLimits {
    fn default() -> Self {
        Self {
            min: f32::MIN,
            max: f32::MAX,
            rate_limit: f32::MAX,
            acceleration_limit: f32::MAX,
            quadrant: None,
        }
    }
}

/// Running state needed to apply rate/acceleration limiting across iterations.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefLimiterState {
    pub prev_ref: f32,
    pub prev_rate: f32,
}

/// Outcome of applying [`RefLimits`] to one candidate reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitedRef {
    pub value: f32,
    pub is_limited: bool,
}

impl RefLimits {
    /// Clips `candidate` to `[min, max]`, then to the (I, V)-quadrant ceiling at
    /// `companion_meas` (if configured), then to `prev_ref +- rate_limit*period`, then to
    /// the acceleration bound derived from `prev_rate`. Idempotent: re-applying to an
    /// already-limited value with unchanged state returns the same value unmodified.
    pub fn apply(
        &self,
        candidate: f32,
        companion_meas: f32,
        period_s: f32,
        state: &mut RefLimiterState,
    ) -> LimitedRef {
        let mut limited = false;
        let mut value = candidate;

        if value > self.max {
            value = self.max;
            limited = true;
        } else if value < self.min {
            value = self.min;
            limited = true;
        }

        if let Some(quadrant) = &self.quadrant {
            let ceiling = quadrant.max_magnitude_at(companion_meas).abs();
            if value > ceiling {
                value = ceiling;
                limited = true;
            } else if value < -ceiling {
                value = -ceiling;
                limited = true;
            }
        }

        let max_step = self.rate_limit * period_s;
        let delta = value - state.prev_ref;
        if delta > max_step {
            value = state.prev_ref + max_step;
            limited = true;
        } else if delta < -max_step {
            value = state.prev_ref - max_step;
            limited = true;
        }

        let rate = (value - state.prev_ref) / period_s;
        let max_rate_delta = self.acceleration_limit * period_s;
        let rate_delta = rate - state.prev_rate;
        let clamped_rate = if rate_delta > max_rate_delta {
            limited = true;
            state.prev_rate + max_rate_delta
        } else if rate_delta < -max_rate_delta {
            limited = true;
            state.prev_rate - max_rate_delta
        } else {
            rate
        };
        if limited {
            value = state.prev_ref + clamped_rate * period_s;
        }

        state.prev_rate = clamped_rate;
        state.prev_ref = value;
        LimitedRef { value, is_limited: limited }
    }
}

/// Absolute-bounds and zero/low-signal detection on a raw measurement.
#[derive(Debug, Clone, Copy)]
pub struct MeasLimits {
    pub low_threshold: f32,
    pub high_threshold: f32,
    pub zero_threshold: f32,
}

impl Default for MeasLimits {
    fn default() -> Self {
        Self {
            low_threshold: f32::MIN,
            high_threshold: f32::MAX,
            zero_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeasFlags {
    pub low: bool,
    pub high: bool,
    pub zero: bool,
}

impl MeasLimits {
    #[must_use]
    pub fn check(&self, value: f32) -> MeasFlags {
        MeasFlags {
            low: value < self.low_threshold,
            high: value > self.high_threshold,
            zero: self.zero_threshold > 0.0 && value.abs() < self.zero_threshold,
        }
    }
}

/// Exponentially filtered RMS magnitude limiter: accumulates `value^2` with time constant
/// `tau_s`, compares the running RMS against warning/fault thresholds.
#[derive(Debug, Clone)]
pub struct RmsLimiter {
    pub tau_s: f32,
    pub warning_threshold: f32,
    pub fault_threshold: f32,
    mean_sq: f32,
}

impl RmsLimiter {
    #[must_use]
    pub fn new(tau_s: f32, warning_threshold: f32, fault_threshold: f32) -> Self {
        Self {
            tau_s: tau_s.max(f32::EPSILON),
            warning_threshold,
            fault_threshold,
            mean_sq: 0.0,
        }
    }

    /// Feeds one sample, returning `(rms, warning, fault)`.
    pub fn update(&mut self, value: f32, period_s: f32) -> (f32, bool, bool) {
        let alpha = (period_s / self.tau_s).min(1.0);
        self.mean_sq += alpha * (value * value - self.mean_sq);
        let rms = self.mean_sq.sqrt();
        (rms, rms > self.warning_threshold, rms > self.fault_threshold)
    }

    pub fn reset(&mut self) {
        self.mean_sq = 0.0;
    }
}

/// Debounced warning/fault flag with hysteresis: the raw condition must hold for
/// `assert_iters` consecutive iterations before the flag latches. Once latched, the
/// counter falls by one on every iteration the condition no longer holds, and the flag
/// only deasserts once the counter has fallen to `deassert_iters` — an asymmetric
/// assert/deassert threshold rather than an instant clear.
#[derive(Debug, Clone, Copy, Default)]
pub struct Debounce {
    count: u32,
    pub latched: bool,
}

impl Debounce {
    pub fn update(&mut self, condition: bool, assert_iters: u32, deassert_iters: u32) -> bool {
        let assert_iters = assert_iters.max(1);
        let deassert_iters = deassert_iters.min(assert_iters.saturating_sub(1));
        if condition {
            self.count = self.count.saturating_add(1).min(assert_iters);
            if self.count >= assert_iters {
                self.latched = true;
            }
        } else {
            self.count = self.count.saturating_sub(1);
            if self.count <= deassert_iters {
                self.latched = false;
            }
        }
        self.latched
    }
}

/// Regulation-error checker: `err = ref_delayed - meas`, tracked against `max_abs_err`
/// with separate debounced warning and fault flags.
///
/// Setting either threshold to `0.0` disables that check and immediately clears its
/// latched flag — the zero-disables-and-resets behavior supplemented from
/// `regErrInitLimits` (see module docs), rather than treating zero as "never exceeded".
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorChecker {
    warning_threshold: f32,
    fault_threshold: f32,
    debounce_iters: u32,
    warning: Debounce,
    fault: Debounce,
    pub max_abs_err: f32,
}

impl ErrorChecker {
    pub fn configure(&mut self, warning_threshold: f32, fault_threshold: f32, debounce_iters: u32) {
        self.warning_threshold = warning_threshold;
        self.fault_threshold = fault_threshold;
        self.debounce_iters = debounce_iters;
        if warning_threshold == 0.0 {
            self.warning = Debounce::default();
        }
        if fault_threshold == 0.0 {
            self.fault = Debounce::default();
        }
    }

    /// Updates `max_abs_err` and both debounced flags from `ref_delayed - meas`, returning
    /// `(warning, fault)`.
    pub fn update(&mut self, ref_delayed: f32, meas: f32) -> (bool, bool) {
        let err = (ref_delayed - meas).abs();
        self.max_abs_err = self.max_abs_err.max(err);

        let deassert_iters = self.debounce_iters / 2;
        let warning = if self.warning_threshold == 0.0 {
            false
        } else {
            self.warning.update(err > self.warning_threshold, self.debounce_iters, deassert_iters)
        };
        let fault = if self.fault_threshold == 0.0 {
            false
        } else {
            self.fault.update(err > self.fault_threshold, self.debounce_iters, deassert_iters)
        };
        (warning, fault)
    }

    pub fn reset_max_abs_err(&mut self) {
        self.max_abs_err = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_limits_clip_within_window() {
        let limits = RefLimits { min: -1.0, max: 1.0, ..RefLimits::default() };
        let mut state = RefLimiterState::default();
        let out = limits.apply(5.0, 0.0, 1e-3, &mut state);
        assert_eq!(out.value, 1.0);
        assert!(out.is_limited);
    }

    #[test]
    fn ref_limits_pass_through_is_idempotent() {
        let limits = RefLimits::default();
        let mut state = RefLimiterState::default();
        let first = limits.apply(0.5, 0.0, 1e-3, &mut state);
        assert!(!first.is_limited);
        let mut state2 = RefLimiterState { prev_ref: 0.5, prev_rate: first.value };
        let second = limits.apply(0.5, 0.0, 1e-3, &mut state2);
        assert_eq!(second.value, 0.5);
    }

    #[test]
    fn ref_limits_quadrant_envelope_bounds_by_companion_measurement() {
        let limits = RefLimits {
            quadrant: Some(QuadrantEnvelope { points: vec![(0.0, 2.0), (100.0, 10.0)] }),
            ..RefLimits::default()
        };
        let mut state = RefLimiterState::default();
        let out = limits.apply(50.0, 0.0, 1e-3, &mut state);
        assert_eq!(out.value, 2.0);
        assert!(out.is_limited);
    }

    #[test]
    fn quadrant_envelope_interpolates_between_breakpoints() {
        let envelope = QuadrantEnvelope { points: vec![(0.0, 0.0), (100.0, 10.0)] };
        assert!((envelope.max_magnitude_at(50.0) - 5.0).abs() < 1e-6);
        assert_eq!(envelope.max_magnitude_at(-10.0), 0.0);
        assert_eq!(envelope.max_magnitude_at(1000.0), 10.0);
    }

    #[test]
    fn meas_limits_flag_out_of_range() {
        let limits = MeasLimits { low_threshold: 0.0, high_threshold: 100.0, zero_threshold: 0.0 };
        let flags = limits.check(150.0);
        assert!(flags.high);
        assert!(!flags.low);
    }

    #[test]
    fn error_checker_zero_threshold_disables_and_clears() {
        let mut checker = ErrorChecker::default();
        checker.configure(1.0, 2.0, 1);
        checker.update(10.0, 0.0);
        assert!(checker.fault.latched);
        checker.configure(1.0, 0.0, 1);
        assert!(!checker.fault.latched);
    }

    #[test]
    fn debounce_requires_consecutive_iterations() {
        let mut d = Debounce::default();
        assert!(!d.update(true, 3, 0));
        assert!(!d.update(true, 3, 0));
        assert!(d.update(true, 3, 0));
    }

    #[test]
    fn debounce_deasserts_with_hysteresis_not_instantly() {
        let mut d = Debounce::default();
        assert!(!d.update(true, 4, 1));
        assert!(!d.update(true, 4, 1));
        assert!(!d.update(true, 4, 1));
        assert!(d.update(true, 4, 1));
        // condition drops, but the flag should stay latched while the counter falls
        // from 4 down to the deassert threshold, not clear on the very next iteration.
        assert!(d.update(false, 4, 1));
        assert!(d.update(false, 4, 1));
        assert!(!d.update(false, 4, 1));
    }
}
