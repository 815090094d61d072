//! Measurement pipeline (C3): cascaded FIR filtering with tracked group delay, plus rate
//! estimation over a regulation period.
//!
//! Grounded on the measurement filtering described alongside `libreg/inc/libreg/rst.h`:
//! the original cascades an arbitrary number of moving-average stages, each contributing
//! `(length - 1) / 2` iterations of group delay; `FirFilter` here models one such stage
//! and `FilterChain` cascades a fixed small number of them, matching the
//! `UNFILTERED`/`FILTERED` selector the regulator reads through [`crate::rst::MeasSelect`].

use std::collections::VecDeque;

/// Single moving-average FIR stage of runtime-configurable length.
#[derive(Debug, Clone)]
pub struct FirFilter {
    history: VecDeque<f32>,
    length: usize,
    sum: f64,
}

impl FirFilter {
    #[must_use]
    pub fn new(length: usize) -> Self {
        let length = length.max(1);
        Self {
            history: VecDeque::with_capacity(length),
            length,
            sum: 0.0,
        }
    }

    /// Group delay contributed by this stage, in iterations.
    #[must_use]
    pub fn group_delay_iters(&self) -> f32 {
        (self.length as f32 - 1.0) / 2.0
    }

    /// Feeds one raw sample through the moving average, returning the filtered output.
    /// Prefilled with `x` on the first `length` calls so the output is correct from the
    /// very first iteration rather than ramping up from zero.
    pub fn update(&mut self, x: f32) -> f32 {
        if self.history.len() < self.length {
            self.history.push_back(x);
            self.sum += f64::from(x);
            while self.history.len() < self.length {
                self.history.push_back(x);
                self.sum += f64::from(x);
            }
        } else {
            let evicted = self.history.pop_front().unwrap_or(0.0);
            self.sum -= f64::from(evicted);
            self.history.push_back(x);
            self.sum += f64::from(x);
        }
        (self.sum / self.length as f64) as f32
    }

    pub fn reset(&mut self, value: f32) {
        self.history.clear();
        self.sum = 0.0;
        for _ in 0..self.length {
            self.history.push_back(value);
            self.sum += f64::from(value);
        }
    }
}

/// Cascade of FIR stages used to derive the `FILTERED` measurement path from a raw
/// `UNFILTERED` sample, tracking the cumulative group delay for `rst::MeasSelect::Filtered`.
#[derive(Debug, Clone)]
pub struct FilterChain {
    stages: Vec<FirFilter>,
}

impl FilterChain {
    #[must_use]
    pub fn new(stage_lengths: &[usize]) -> Self {
        Self {
            stages: stage_lengths.iter().copied().map(FirFilter::new).collect(),
        }
    }

    #[must_use]
    pub fn total_group_delay_iters(&self) -> f32 {
        self.stages.iter().map(FirFilter::group_delay_iters).sum()
    }

    pub fn update(&mut self, raw: f32) -> f32 {
        self.stages.iter_mut().fold(raw, |x, stage| stage.update(x))
    }

    pub fn reset(&mut self, value: f32) {
        for stage in &mut self.stages {
            stage.reset(value);
        }
    }
}

/// Derives a rate (per-second) estimate by differencing a value against the one recorded
/// `period_iters` ago, for use in openloop-ramp seeding (`rst::init_ref`) and reference
/// acceleration checks.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    history: VecDeque<f32>,
    period_iters: usize,
    iter_period_s: f32,
    last_rate: f32,
}

impl RateEstimator {
    #[must_use]
    pub fn new(period_iters: usize, iter_period_s: f32) -> Self {
        Self {
            history: VecDeque::with_capacity(period_iters.max(1) + 1),
            period_iters: period_iters.max(1),
            iter_period_s,
            last_rate: 0.0,
        }
    }

    /// Pushes one new sample and returns the estimated rate, or `0.0` until enough history
    /// has accumulated.
    pub fn update(&mut self, value: f32) -> f32 {
        self.history.push_back(value);
        if self.history.len() > self.period_iters + 1 {
            self.history.pop_front();
        }
        if self.history.len() <= self.period_iters {
            self.last_rate = 0.0;
            return 0.0;
        }
        let oldest = self.history.front().copied().unwrap_or(value);
        self.last_rate = (value - oldest) / (self.period_iters as f32 * self.iter_period_s);
        self.last_rate
    }

    /// The most recently computed rate, used to extrapolate a substitute measurement when
    /// an input sample is invalid and no delayed reference is available (`regConvValidateMeas`).
    #[must_use]
    pub fn last_rate(&self) -> f32 {
        self.last_rate
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_rate = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fir_filter_of_step_settles_to_input() {
        let mut f = FirFilter::new(4);
        for _ in 0..8 {
            f.update(1.0);
        }
        assert!((f.update(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fir_filter_group_delay_is_half_length_minus_one() {
        let f = FirFilter::new(5);
        assert!((f.group_delay_iters() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn filter_chain_cascades_group_delay() {
        let chain = FilterChain::new(&[3, 5]);
        assert!((chain.total_group_delay_iters() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn rate_estimator_detects_constant_ramp() {
        let mut r = RateEstimator::new(10, 0.001);
        let mut value = 0.0;
        let mut last = 0.0;
        for _ in 0..20 {
            value += 0.01;
            last = r.update(value);
        }
        assert!((last - 10.0).abs() < 1e-3);
    }
}
