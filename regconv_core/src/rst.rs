//! RST discrete-time controller (C4): `S(z) act = T(z) ref − R(z) meas`, in Landau's
//! convention, plus the circular histories and inverse computations used to keep the
//! regulation loop bumpless across clipping and open/closed-loop transitions.
//!
//! Grounded on `libreg/inc/libreg/rst.h` (field names/shape) and the background
//! re-initialisation sequence read out of `libreg/src/regConv.c::regConvRstInit` (the
//! `ref_advance`/`ref_delay_periods`/`reg_err_meas_select` derivation in [`synthesize`]).
//! The auxiliary-pole placement itself (`regRstInit` in the unavailable `regRst.c`) is out
//! of scope here; [`synthesize`] computes a single-pole discretisation that satisfies the
//! same API shape and ill-conditioning checks.

use crate::error::{SynthesizeFault, SynthesizeStatus};

/// Maximum order of each RST polynomial (`REG_N_RST_COEFFS` in the original).
pub const REG_N_RST_COEFFS: usize = 10;

const HISTORY_LEN: usize = 16;
const HISTORY_MASK: usize = HISTORY_LEN - 1;

/// Below this magnitude, `S[0]` is considered ill-conditioned for division.
const S0_ILL_CONDITIONED_THRESHOLD: f32 = 1.0e-6;

/// Pole radius above which a stable-but-marginal placement is reported as
/// [`SynthesizeStatus::Warning`] rather than [`SynthesizeStatus::Ok`].
const POLE_RADIUS_WARNING_MARGIN: f32 = 0.9;

/// Which measurement path (`UNFILTERED` vs `FILTERED`) the regulation-error calculation and
/// delayed-reference lookup use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasSelect {
    Unfiltered,
    Filtered,
}

/// A synthesized RST coefficient set plus the derived quantities the regulator needs at
/// every tick. One `Converter` signal owns two of these (operational, test), each
/// double-buffered through [`crate::handoff`].
#[derive(Debug, Clone, PartialEq)]
pub struct RstPars {
    pub status: SynthesizeStatus,
    pub r: [f32; REG_N_RST_COEFFS],
    pub s: [f32; REG_N_RST_COEFFS],
    pub t: [f32; REG_N_RST_COEFFS],
    /// Regulation period, in RT iterations.
    pub period_iters: u32,
    /// Regulation period, in seconds (`period_iters * iter_period`).
    pub period: f32,
    /// `1 / s[0]`, precomputed so `calc_act` never divides in the hot loop.
    pub inv_s0: f32,
    /// `1 / t[0]`, precomputed for `calc_ref`'s inverse solve.
    pub t0_correction: f32,
    pub track_delay_periods: f32,
    pub ref_advance: f32,
    pub ref_delay_periods: f32,
    pub reg_err_meas_select: MeasSelect,
}

impl Default for RstPars {
    fn default() -> Self {
        let mut s = [0.0; REG_N_RST_COEFFS];
        let mut t = [0.0; REG_N_RST_COEFFS];
        s[0] = 1.0;
        t[0] = 1.0;
        Self {
            status: SynthesizeStatus::Ok,
            r: [0.0; REG_N_RST_COEFFS],
            s,
            t,
            period_iters: 1,
            period: 0.001,
            inv_s0: 1.0,
            t0_correction: 1.0,
            track_delay_periods: 1.0,
            ref_advance: 0.0,
            ref_delay_periods: 1.0,
            reg_err_meas_select: MeasSelect::Filtered,
        }
    }
}

/// Circular histories of `ref`, `meas`, `act` and `openloop_ref`, length a power of two
/// `>= REG_N_RST_COEFFS` so indexing wraps with a mask instead of a modulo.
#[derive(Debug, Clone)]
pub struct RstVars {
    pub ref_hist: [f32; HISTORY_LEN],
    pub meas_hist: [f32; HISTORY_LEN],
    pub act_hist: [f32; HISTORY_LEN],
    pub openloop_ref_hist: [f32; HISTORY_LEN],
    pub history_index: usize,
}

impl Default for RstVars {
    fn default() -> Self {
        Self {
            ref_hist: [0.0; HISTORY_LEN],
            meas_hist: [0.0; HISTORY_LEN],
            act_hist: [0.0; HISTORY_LEN],
            openloop_ref_hist: [0.0; HISTORY_LEN],
            history_index: 0,
        }
    }
}

#[inline]
fn lag(idx: usize, k: usize) -> usize {
    (idx + HISTORY_LEN - (k % HISTORY_LEN)) & HISTORY_MASK
}

/// Computes the new actuation `u` from the current references/measurement and histories,
/// in 64-bit accumulators to preserve the original's 40-bit extended-precision intent.
///
/// When `is_openloop`, the `R` convolution is evaluated against `openloop_ref_hist` (the
/// model-predicted measurement) instead of `meas_hist`, so the histories stay consistent
/// across the open/closed-loop boundary.
pub fn calc_act(pars: &RstPars, vars: &mut RstVars, reference: f32, is_openloop: bool) -> f32 {
    let idx = vars.history_index;
    vars.ref_hist[idx] = reference;

    let meas_source = if is_openloop {
        &vars.openloop_ref_hist
    } else {
        &vars.meas_hist
    };

    let mut t_sum = 0.0f64;
    let mut r_sum = 0.0f64;
    for k in 0..REG_N_RST_COEFFS {
        let h = lag(idx, k);
        t_sum += f64::from(pars.t[k]) * f64::from(vars.ref_hist[h]);
        r_sum += f64::from(pars.r[k]) * f64::from(meas_source[h]);
    }
    let mut s_sum = 0.0f64;
    for k in 1..REG_N_RST_COEFFS {
        let h = lag(idx, k);
        s_sum += f64::from(pars.s[k]) * f64::from(vars.act_hist[h]);
    }

    let act = ((t_sum - r_sum - s_sum) * f64::from(pars.inv_s0)) as f32;
    vars.act_hist[idx] = act;
    act
}

/// Inverse of [`calc_act`]: solves for the `ref` that would have produced `act`, used to
/// back-calculate a reference consistent with a clipped/rate-limited actuation.
///
/// `is_limited` marks whether `act` is itself the post-clip value that should overwrite the
/// current history slot (the normal back-calculation case); when false, the existing
/// `act_hist[history_index]` is treated as already consistent and is left untouched.
pub fn calc_ref(
    pars: &RstPars,
    vars: &mut RstVars,
    act: f32,
    is_limited: bool,
    is_openloop: bool,
) -> f32 {
    let idx = vars.history_index;
    if is_limited {
        vars.act_hist[idx] = act;
    }

    let meas_source = if is_openloop {
        &vars.openloop_ref_hist
    } else {
        &vars.meas_hist
    };

    let mut s_sum = 0.0f64;
    let mut r_sum = 0.0f64;
    for k in 0..REG_N_RST_COEFFS {
        let h = lag(idx, k);
        s_sum += f64::from(pars.s[k]) * f64::from(vars.act_hist[h]);
        r_sum += f64::from(pars.r[k]) * f64::from(meas_source[h]);
    }
    let mut t_sum = 0.0f64;
    for k in 1..REG_N_RST_COEFFS {
        let h = lag(idx, k);
        t_sum += f64::from(pars.t[k]) * f64::from(vars.ref_hist[h]);
    }

    let r = ((s_sum + r_sum - t_sum) * f64::from(pars.t0_correction)) as f32;
    vars.ref_hist[idx] = r;
    vars.openloop_ref_hist[idx] = r;
    r
}

/// Reference value aligned with the delayed measurement arriving this sub-iteration: linear
/// interpolation of `ref_hist` at a fractional position `ref_delay_periods` (plus the
/// sub-period `iter_counter`) behind the newest sample.
pub fn delayed_ref(pars: &RstPars, vars: &RstVars, iter_counter: u32) -> f32 {
    let period_iters = f64::from(pars.period_iters.max(1));
    let sub_period = f64::from(iter_counter) / period_iters;
    let total_delay = f64::from(pars.ref_delay_periods) + sub_period;

    let pos = vars.history_index as f64 - total_delay;
    let pos_floor = pos.floor();
    let frac = pos - pos_floor;

    let i0 = (pos_floor.rem_euclid(HISTORY_LEN as f64)) as usize;
    let i1 = (i0 + 1) & HISTORY_MASK;
    let v0 = f64::from(vars.ref_hist[i0]);
    let v1 = f64::from(vars.ref_hist[i1]);
    (v0 + (v1 - v0) * frac) as f32
}

/// Estimates the effective measurement-tracking delay, in periods, as the history lag whose
/// reference sample is closest to the newest measurement.
pub fn track_delay(vars: &RstVars) -> f32 {
    let idx = vars.history_index;
    let newest_meas = vars.meas_hist[idx];
    let mut best_k = 0usize;
    let mut best_err = f32::MAX;
    for k in 0..REG_N_RST_COEFFS {
        let h = lag(idx, k);
        let err = (vars.ref_hist[h] - newest_meas).abs();
        if err < best_err {
            best_err = err;
            best_k = k;
        }
    }
    best_k as f32
}

/// Arithmetic mean of the `act` history, used on CURRENT/FIELD → VOLTAGE handover to seed
/// the new voltage reference from the prior closed-loop actuation.
pub fn average_vref(vars: &RstVars) -> f32 {
    let idx = vars.history_index;
    let sum: f64 = (0..REG_N_RST_COEFFS)
        .map(|k| f64::from(vars.act_hist[lag(idx, k)]))
        .sum();
    (sum / REG_N_RST_COEFFS as f64) as f32
}

/// Seeds all three history buffers to a consistent steady state.
pub fn init_history(vars: &mut RstVars, meas0: f32, ref0: f32, act0: f32) {
    vars.ref_hist = [ref0; HISTORY_LEN];
    vars.meas_hist = [meas0; HISTORY_LEN];
    vars.act_hist = [act0; HISTORY_LEN];
    vars.openloop_ref_hist = [ref0; HISTORY_LEN];
    vars.history_index = 0;
}

/// Pre-populates the `ref` history as a ramp `meas0 + rate*(k - newest)*period` so the first
/// regulation tick after a mode change produces no discontinuity.
pub fn init_ref(pars: &RstPars, vars: &mut RstVars, rate_estimate: f32) {
    let idx = vars.history_index;
    let meas0 = vars.meas_hist[idx];
    for k in 0..REG_N_RST_COEFFS {
        let h = lag(idx, k);
        let value = meas0 - rate_estimate * (k as f32) * pars.period;
        vars.ref_hist[h] = value;
        vars.openloop_ref_hist[h] = value;
    }
}

/// Bumps `history_index` modulo the buffer length.
pub fn increment_history_index(vars: &mut RstVars) {
    vars.history_index = (vars.history_index + 1) & HISTORY_MASK;
}

/// Inputs to [`synthesize`]: either a target closed-loop bandwidth/damping (auxiliary-pole
/// placement) or manual R/S/T coefficients, plus the delay bookkeeping needed to derive
/// `ref_advance`/`ref_delay_periods`/`reg_err_meas_select` exactly as
/// `regConvRstInit` does for the non-manual path.
#[derive(Debug, Clone, Copy)]
pub struct SynthesizeInput<'a> {
    pub period_iters: u32,
    pub iter_period_s: f32,
    pub closed_loop_bandwidth_hz: f32,
    pub closed_loop_damping_z: f32,
    pub pure_delay_periods: f32,
    /// Measurement-delay iterations of the signal actually used for regulation.
    pub meas_delay_iters_reg_select: f32,
    /// Measurement-delay iterations of the unfiltered path (for the `reg_err_meas_select`
    /// fallback derivation).
    pub meas_delay_iters_unfiltered: f32,
    /// `true` when the error-rate check operates on `REGULATION` (the signal already
    /// selected for closed-loop control) rather than raw `MEASUREMENT`.
    pub reg_err_rate_is_regulation: bool,
    pub manual_r: Option<&'a [f32]>,
    pub manual_s: Option<&'a [f32]>,
    pub manual_t: Option<&'a [f32]>,
}

fn copy_coeffs(src: &[f32]) -> Result<[f32; REG_N_RST_COEFFS], SynthesizeFault> {
    if src.len() > REG_N_RST_COEFFS {
        return Err(SynthesizeFault::TooManyCoefficients(
            src.len(),
            REG_N_RST_COEFFS,
        ));
    }
    let mut out = [0.0; REG_N_RST_COEFFS];
    out[..src.len()].copy_from_slice(src);
    Ok(out)
}

/// Single-pole discretisation standing in for the original's auxiliary-pole placement
/// (out of scope here): `S = [1, -p]`, `R = [k*(1-p)]`,
/// `T = [k*(1-p)]`, where `p = exp(-2*pi*bandwidth_hz*period)` and `k` is a unity-DC-gain
/// damping correction. This satisfies the same ill-conditioning/stability checks a real
/// placement would without claiming bit-exact original numerics.
fn synthesize_single_pole(
    bandwidth_hz: f32,
    damping_z: f32,
    period: f32,
) -> ([f32; REG_N_RST_COEFFS], [f32; REG_N_RST_COEFFS], [f32; REG_N_RST_COEFFS]) {
    let p = (-2.0 * std::f32::consts::PI * bandwidth_hz * period).exp();
    let damping = damping_z.max(0.1);
    let gain = (1.0 - p) / damping;

    let mut s = [0.0; REG_N_RST_COEFFS];
    let mut r = [0.0; REG_N_RST_COEFFS];
    let mut t = [0.0; REG_N_RST_COEFFS];
    s[0] = 1.0;
    s[1] = -p;
    r[0] = gain;
    t[0] = gain;
    (r, s, t)
}

/// Produces RST coefficients and their derived quantities, per §4.1: `manual.R[0] != 0`
/// copies and validates manual coefficients, otherwise a bandwidth/damping placement is
/// synthesized. Never mutates a live buffer — the caller publishes the result through
/// [`crate::handoff`] only after this returns `Ok`.
pub fn synthesize(input: &SynthesizeInput<'_>) -> Result<RstPars, SynthesizeFault> {
    if input.period_iters == 0 {
        return Err(SynthesizeFault::ZeroPeriod);
    }
    let period = input.iter_period_s * input.period_iters as f32;

    let manual_active = input
        .manual_r
        .and_then(|r| r.first())
        .is_some_and(|&r0| r0 != 0.0);

    let (r, s, t) = if manual_active {
        let r = copy_coeffs(input.manual_r.unwrap_or(&[]))?;
        let s = copy_coeffs(input.manual_s.unwrap_or(&[1.0]))?;
        let t = copy_coeffs(input.manual_t.unwrap_or(&[1.0]))?;
        (r, s, t)
    } else {
        if input.closed_loop_bandwidth_hz <= 0.0 {
            return Err(SynthesizeFault::NonPositiveBandwidth);
        }
        synthesize_single_pole(input.closed_loop_bandwidth_hz, input.closed_loop_damping_z, period)
    };

    if s[0].abs() < S0_ILL_CONDITIONED_THRESHOLD {
        return Err(SynthesizeFault::IllConditionedS0(s[0]));
    }
    let pole_radius: f32 = s[1..].iter().map(|v| v.abs()).sum::<f32>() / s[0].abs();
    if pole_radius >= 1.0 {
        return Err(SynthesizeFault::UnstablePole(pole_radius));
    }
    let status = if pole_radius >= POLE_RADIUS_WARNING_MARGIN {
        SynthesizeStatus::Warning
    } else {
        SynthesizeStatus::Ok
    };

    let inv_s0 = 1.0 / s[0];
    let t0_correction = if t[0].abs() < S0_ILL_CONDITIONED_THRESHOLD {
        return Err(SynthesizeFault::IllConditionedS0(t[0]));
    } else {
        1.0 / t[0]
    };

    // Grounded on regConvRstInit's derivation (libreg/src/regConv.c):
    //   ref_advance = track_delay_periods * period - meas_delay_iters[reg_select] * iter_period
    //   ref_delay_periods defaults to track_delay_periods; if the error check runs on raw
    //   measurement rather than the regulation signal, it is advanced by the unfiltered/
    //   reg_select delay difference, falling back to FILTERED if that leaves < 1 period.
    let track_delay_periods = input.pure_delay_periods + 1.0;
    let ref_advance =
        track_delay_periods * period - input.meas_delay_iters_reg_select * input.iter_period_s;

    let (reg_err_meas_select, ref_delay_periods) = if input.reg_err_rate_is_regulation {
        (MeasSelect::Filtered, track_delay_periods)
    } else {
        let advanced = track_delay_periods
            + (input.meas_delay_iters_unfiltered - input.meas_delay_iters_reg_select)
                / input.period_iters as f32;
        if advanced < 1.0 {
            (MeasSelect::Filtered, track_delay_periods)
        } else {
            (MeasSelect::Unfiltered, advanced)
        }
    };

    Ok(RstPars {
        status,
        r,
        s,
        t,
        period_iters: input.period_iters,
        period,
        inv_s0,
        t0_correction,
        track_delay_periods,
        ref_advance,
        ref_delay_periods,
        reg_err_meas_select,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_input() -> SynthesizeInput<'static> {
        SynthesizeInput {
            period_iters: 10,
            iter_period_s: 0.001,
            closed_loop_bandwidth_hz: 50.0,
            closed_loop_damping_z: 0.9,
            pure_delay_periods: 0.0,
            meas_delay_iters_reg_select: 1.0,
            meas_delay_iters_unfiltered: 0.0,
            reg_err_rate_is_regulation: true,
            manual_r: None,
            manual_s: None,
            manual_t: None,
        }
    }

    #[test]
    fn synthesize_rejects_zero_period() {
        let mut input = default_input();
        input.period_iters = 0;
        assert_eq!(synthesize(&input), Err(SynthesizeFault::ZeroPeriod));
    }

    #[test]
    fn synthesize_rejects_non_positive_bandwidth_without_manual() {
        let mut input = default_input();
        input.closed_loop_bandwidth_hz = 0.0;
        assert_eq!(
            synthesize(&input),
            Err(SynthesizeFault::NonPositiveBandwidth)
        );
    }

    #[test]
    fn manual_coefficients_take_precedence() {
        let mut input = default_input();
        input.closed_loop_bandwidth_hz = 0.0;
        input.manual_r = Some(&[0.5]);
        input.manual_s = Some(&[1.0, -0.5]);
        input.manual_t = Some(&[0.5]);
        let pars = synthesize(&input).expect("manual coefficients should synthesize");
        assert_eq!(pars.r[0], 0.5);
        assert_eq!(pars.s[1], -0.5);
    }

    #[test]
    fn calc_act_then_calc_ref_round_trips() {
        let pars = synthesize(&default_input()).expect("synthesize");
        let mut vars = RstVars::default();
        init_history(&mut vars, 0.0, 0.0, 0.0);

        let act = calc_act(&pars, &mut vars, 1.0, false);
        let recovered_ref = calc_ref(&pars, &mut vars, act, true, false);
        assert!(recovered_ref.is_finite());
    }

    #[test]
    fn history_index_wraps_at_buffer_length() {
        let mut vars = RstVars::default();
        for _ in 0..(HISTORY_LEN * 2 + 3) {
            increment_history_index(&mut vars);
        }
        assert!(vars.history_index < HISTORY_LEN);
    }

    #[test]
    fn synthesize_reports_warning_for_marginal_pole_placement() {
        let mut input = default_input();
        // A very low closed-loop bandwidth relative to the sample rate places the pole close
        // to the unit circle (p = exp(-2*pi*bw*period) close to 1) without crossing it.
        input.closed_loop_bandwidth_hz = 0.05;
        let pars = synthesize(&input).expect("should still synthesize a stable pole");
        assert_eq!(pars.status, SynthesizeStatus::Warning);
    }

    #[test]
    fn average_vref_of_constant_history_is_that_constant() {
        let mut vars = RstVars::default();
        init_history(&mut vars, 0.0, 0.0, 3.5);
        assert!((average_vref(&vars) - 3.5).abs() < 1e-6);
    }
}
