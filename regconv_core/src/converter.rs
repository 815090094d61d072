//! Per-signal orchestration (C5): wires the load model, measurement pipeline, limits, and
//! RST regulator together into the power converter's RT and background entry points.
//!
//! Grounded on `libreg/src/regConv.c`: `regConvMeasSetRT` → [`Converter::meas_set_rt`],
//! `regConvModeSetRT` → [`Converter::mode_set_rt`], and the original's duplicate
//! `regConvRT`/`regConvRegulateRT` entry points merged into one [`Converter::regulate_rt`]
//! per the resolved Open Question in the design notes (both computed the same actuation;
//! the split only existed to let the caller skip filtering it hadn't asked for).

use rand::{Rng, SeedableRng};

use regconv_traits::{Sample, SupervisorIo};

use crate::error::SynthesizeStatus;
use crate::filter::{FilterChain, RateEstimator};
use crate::handoff::ParamHandoff;
use crate::limits::{Debounce, ErrorChecker, MeasLimits, RefLimits, RefLimiterState, RmsLimiter};
use crate::load::{Load, VoltageSource, VoltageSourcePars};
use crate::rst::{self, RstPars, RstVars, SynthesizeInput};
use crate::status::{self, FaultBits, Inputs, SupState, SupervisorInputs};

/// Which physical quantity is currently being regulated on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    None,
    Voltage,
    Current,
    Field,
}

/// Selects which of a channel's two double-buffered RST parameter sets is active.
/// Mirrors the original's `IREG`/`BREG` "operational" vs "test" slots, switchable at
/// runtime so a tuning pass can be tried without disturbing the parameters in production use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegRstSource {
    #[default]
    Operational,
    Test,
}

/// Wall-clock period, in microseconds, over which mode-NONE iteration counters resynchronize
/// across independently running converters. 12 000 000 us is divisible by every `period_iters`
/// value the original tool supports (1 ms iterations, periods up to 12000 iterations), so the
/// mod-12s counter always lands on the same phase on every converter regardless of when it
/// started, per `conv_meas_set_rt`'s mode-NONE counter derivation.
pub const NONE_MODE_SYNC_PERIOD_US: u64 = 12_000_000;

/// Complete per-signal regulation state: one [`SignalChannel`] exists per regulated
/// quantity (voltage, current, field), each with its own RST parameters, histories, and
/// limiters. Regulation parameters are double-buffered through [`ParamHandoff`] so the
/// background context can resynthesize RST coefficients without blocking the RT loop.
pub struct SignalChannel {
    pub mode: Mode,
    pars_operational: ParamHandoff<RstPars>,
    pars_test: ParamHandoff<RstPars>,
    rst_source: RegRstSource,
    vars: RstVars,
    filter: FilterChain,
    rate_estimator: RateEstimator,
    ref_limits: RefLimits,
    ref_limiter_state: RefLimiterState,
    /// Voltage-reference envelope applied during CURRENT/FIELD saturation back-calculation
    /// (§4.5 step 4) — a copy of the voltage channel's own clip window, populated by the
    /// builder, so `regulate_rt` never needs simultaneous access to a sibling channel.
    v_ref_limits: RefLimits,
    v_ref_limiter_state: RefLimiterState,
    meas_limits: MeasLimits,
    rms_limiter: RmsLimiter,
    error_checker: ErrorChecker,
    iter_counter: u32,
    iter_period_s: f32,
    /// Set on mode change (`Converter::mode_set_rt`); mirrors the original's
    /// `is_delayed_ref_available`, which governs the invalid-measurement substitution policy.
    is_delayed_ref_available: bool,
    last_ref_delayed: f32,
    last_err: f32,
    /// Count of RT iterations for which the caller supplied an invalid measurement sample.
    pub invalid_input_counter: u32,
    /// CURRENT/FIELD only: `true` while regulating from the model-predicted measurement
    /// rather than the real one, per the open/closed-loop handover in §4.5 step 5.
    is_openloop: bool,
    /// Absolute-measurement threshold at which CURRENT/FIELD regulation hands over between
    /// open- and closed-loop; a single value used symmetrically (hysteresis is provided by
    /// the crossing direction, not by separate thresholds).
    closeloop_threshold: f32,
    pc_actuation: regconv_config::PcActuation,
    /// Overrides `active_pars().ref_delay_periods` for this channel only; set by
    /// `mode_set_rt`'s CURRENT_REF branch (`ref_advance / iter_period`), cleared on NONE/
    /// VOLTAGE_REF.
    ref_delay_override: Option<f32>,
    /// Outcome of the most recent RST synthesis for this channel's active slot, and a copy
    /// of the parameters that produced it — retained across a failed background
    /// resynthesis so a caller can always inspect what's actually running (§7).
    pub status: SynthesizeStatus,
    pub last_rst_pars: RstPars,
}

impl SignalChannel {
    #[must_use]
    pub fn new(pars: RstPars, filter_stage_lengths: &[usize], iter_period_s: f32) -> Self {
        let period_iters = pars.period_iters.max(1) as usize;
        let status = pars.status;
        Self {
            mode: Mode::None,
            pars_operational: ParamHandoff::new(pars.clone()),
            pars_test: ParamHandoff::new(pars.clone()),
            rst_source: RegRstSource::default(),
            vars: RstVars::default(),
            filter: FilterChain::new(filter_stage_lengths),
            rate_estimator: RateEstimator::new(period_iters, iter_period_s),
            ref_limits: RefLimits::default(),
            ref_limiter_state: RefLimiterState::default(),
            v_ref_limits: RefLimits::default(),
            v_ref_limiter_state: RefLimiterState::default(),
            meas_limits: MeasLimits::default(),
            rms_limiter: RmsLimiter::new(1.0, f32::MAX, f32::MAX),
            error_checker: ErrorChecker::default(),
            iter_counter: 0,
            iter_period_s,
            is_delayed_ref_available: false,
            last_ref_delayed: 0.0,
            last_err: 0.0,
            invalid_input_counter: 0,
            is_openloop: false,
            closeloop_threshold: 0.0,
            pc_actuation: regconv_config::PcActuation::VoltageRef,
            ref_delay_override: None,
            status,
            last_rst_pars: pars,
        }
    }

    /// Background-side: publish newly synthesized RST parameters into the named slot.
    /// Takes effect on the next RT iteration via [`ParamHandoff::adopt_if_ready`].
    pub fn publish_pars(&self, source: RegRstSource, pars: RstPars) {
        match source {
            RegRstSource::Operational => self.pars_operational.publish(pars),
            RegRstSource::Test => self.pars_test.publish(pars),
        }
    }

    /// Background-side: re-synthesizes RST coefficients from `input` and publishes them into
    /// `source` on success. On a synthesis fault, nothing is published — `status` becomes
    /// `Fault` and `last_rst_pars` retains whatever was last synthesized successfully, per
    /// §7's "out-of-range parameter rejected silently by retaining the previous value".
    pub fn reconfigure(&mut self, source: RegRstSource, input: &SynthesizeInput<'_>) -> SynthesizeStatus {
        match rst::synthesize(input) {
            Ok(pars) => {
                self.status = pars.status;
                self.last_rst_pars = pars.clone();
                self.publish_pars(source, pars);
            }
            Err(fault) => {
                tracing::warn!(%fault, "rst synthesis rejected, retaining previous parameters");
                self.status = SynthesizeStatus::Fault;
            }
        }
        self.status
    }

    /// RT-side: selects which of the two parameter slots is regulated against. Takes effect
    /// immediately; the non-selected slot keeps accepting background publications unaffected.
    pub fn set_rst_source(&mut self, source: RegRstSource) {
        self.rst_source = source;
    }

    #[must_use]
    pub fn active_pars(&self) -> RstPars {
        match self.rst_source {
            RegRstSource::Operational => self.pars_operational.active(),
            RegRstSource::Test => self.pars_test.active(),
        }
    }

    pub fn configure_ref_limits(&mut self, limits: RefLimits) {
        self.ref_limits = limits;
    }

    pub fn configure_v_ref_limits(&mut self, limits: RefLimits) {
        self.v_ref_limits = limits;
    }

    pub fn configure_meas_limits(&mut self, limits: MeasLimits) {
        self.meas_limits = limits;
    }

    pub fn configure_error_checker(&mut self, warning: f32, fault: f32, debounce_iters: u32) {
        self.error_checker.configure(warning, fault, debounce_iters);
    }

    pub fn configure_pc_actuation(&mut self, pc_actuation: regconv_config::PcActuation) {
        self.pc_actuation = pc_actuation;
    }

    pub fn configure_closeloop_threshold(&mut self, threshold: f32) {
        self.closeloop_threshold = threshold.max(0.0);
    }
}

/// Outcome of one [`Converter::regulate_rt`] call: the actuation to apply, plus the flags a
/// caller publishes as telemetry or feeds into fault handling.
#[derive(Debug, Clone, Copy)]
pub struct RegulateOutcome {
    pub actuation: f32,
    pub reference: f32,
    pub filtered_meas: f32,
    pub is_ref_limited: bool,
    pub meas_low: bool,
    pub meas_high: bool,
    pub error_warning: bool,
    pub error_fault: bool,
    pub rms_warning: bool,
    pub rms_fault: bool,
}

/// A single power converter: one supervisory state machine plus one [`SignalChannel`] per
/// regulated quantity, driving a [`Load`]/[`VoltageSource`] model.
pub struct Converter<Io: SupervisorIo> {
    io: Io,
    state: SupState,
    pub load: Load,
    vs_pars: VoltageSourcePars,
    vs: VoltageSource,
    pub voltage: SignalChannel,
    pub current: SignalChannel,
    pub field: SignalChannel,
    iter_period_s: f32,
    first_faults_debounce: Debounce,
    sim_noise_pp: f32,
    sim_tone_amplitude: f32,
    sim_tone_half_period_iters: u32,
    sim_tone_counter: u32,
    sim_tone_sign: f32,
    rng: rand::rngs::StdRng,
}

impl<Io: SupervisorIo> Converter<Io> {
    #[must_use]
    pub fn new(
        io: Io,
        load: Load,
        vs_pars: VoltageSourcePars,
        voltage: SignalChannel,
        current: SignalChannel,
        field: SignalChannel,
        iter_period_s: f32,
    ) -> Self {
        Self {
            io,
            state: SupState::default(),
            load,
            vs_pars,
            vs: VoltageSource::default(),
            voltage,
            current,
            field,
            iter_period_s,
            first_faults_debounce: Debounce::default(),
            sim_noise_pp: 0.0,
            sim_tone_amplitude: 0.0,
            sim_tone_half_period_iters: 0,
            sim_tone_counter: 0,
            sim_tone_sign: 1.0,
            rng: rand::rngs::StdRng::from_entropy(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> SupState {
        self.state
    }

    /// Configures the simulator's noise/tone generator (§4.3): `noise_pp` is the
    /// peak-to-peak amplitude of uniform pseudo-random noise; `tone_amplitude`/
    /// `tone_half_period_iters` add a square-wave tone of that amplitude flipping sign every
    /// `tone_half_period_iters` calls to [`Self::simulate_rt`]. Zero disables either term.
    pub fn configure_sim_noise(&mut self, noise_pp: f32, tone_amplitude: f32, tone_half_period_iters: u32) {
        self.sim_noise_pp = noise_pp.max(0.0);
        self.sim_tone_amplitude = tone_amplitude;
        self.sim_tone_half_period_iters = tone_half_period_iters;
    }

    /// Advances the supervisor state machine from the latest digital inputs/fault bits.
    /// Returns the name of the predicate that fired, if the state changed.
    pub fn supervise_rt(&mut self) -> Option<&'static str> {
        let inputs = Inputs::from_bits_truncate(self.io.read_digital_inputs());
        let mut faults = FaultBits::from_bits_truncate(self.io.read_fault_bits());
        let first_faults = faults.intersects(
            FaultBits::PWR_FAILURE | FaultBits::FAST_ABORT | FaultBits::NO_PC_PERMIT,
        );
        if self.first_faults_debounce.update(first_faults, 1, 0) {
            faults.insert(FaultBits::FIRST_FAULTS);
        }
        let (next, fired) = status::step(self.state, SupervisorInputs { inputs, faults });
        self.state = next;
        fired
    }

    /// Switches which quantity `channel` regulates, seeding its RST history so the
    /// transition is bumpless (per `regConvModeSetRT`). Per §4.5's mode setter, the seeding
    /// differs by target mode and, for CURRENT/FIELD, by `pc_actuation`.
    pub fn mode_set_rt(channel: &mut SignalChannel, mode: Mode, meas: f32) {
        if channel.mode == mode {
            return;
        }
        channel.mode = mode;
        channel.iter_counter = 0;
        channel.ref_delay_override = None;
        channel.last_err = 0.0;

        match mode {
            Mode::None => {
                rst::init_history(&mut channel.vars, meas, meas, meas);
                channel.is_delayed_ref_available = false;
                channel.last_ref_delayed = meas;
            }
            Mode::Voltage => {
                let v_ref = rst::average_vref(&channel.vars);
                rst::init_history(&mut channel.vars, meas, v_ref, v_ref);
                channel.is_delayed_ref_available = false;
                channel.last_ref_delayed = v_ref;
            }
            Mode::Current | Mode::Field => {
                channel.is_openloop = true;
                let pars = channel.active_pars();
                match channel.pc_actuation {
                    regconv_config::PcActuation::VoltageRef => {
                        rst::init_history(&mut channel.vars, meas, meas, meas);
                        rst::init_ref(&pars, &mut channel.vars, channel.rate_estimator.last_rate());
                        channel.is_delayed_ref_available =
                            pars.reg_err_meas_select == rst::MeasSelect::Unfiltered;
                    }
                    regconv_config::PcActuation::CurrentRef => {
                        rst::init_history(&mut channel.vars, meas, meas, 0.0);
                        channel.ref_delay_override = Some(pars.ref_advance / channel.iter_period_s);
                        channel.is_delayed_ref_available = false;
                    }
                }
                channel.last_ref_delayed = meas;
            }
        }
    }

    /// Recomputes `channel`'s iteration counter from the wall clock instead of advancing it
    /// locally, per `conv_meas_set_rt`'s mode-NONE behavior: independently running converters
    /// with no live regulation still stay phase-aligned on `period_iters`.
    pub fn sync_none_mode_counter(channel: &mut SignalChannel, unix_time_s: u64, us_time: u32) {
        let period_iters = u64::from(channel.active_pars().period_iters.max(1));
        let iter_period_us = (channel.iter_period_s * 1_000_000.0).max(1.0) as u64;
        let phase_us = (unix_time_s % (NONE_MODE_SYNC_PERIOD_US / 1_000_000)) * 1_000_000
            + u64::from(us_time);
        channel.iter_counter = ((phase_us / iter_period_us) % period_iters) as u32;
    }

    /// One RT iteration's measurement intake for `channel`: substitutes a value for an
    /// invalid sample (tracking `invalid_input_counter`), filters the result, and updates
    /// rate estimation. Call once per iteration before [`Self::regulate_rt`].
    pub fn meas_set_rt(channel: &mut SignalChannel, raw: Sample) -> f32 {
        let value = if raw.valid {
            raw.value
        } else {
            channel.invalid_input_counter += 1;
            if channel.is_delayed_ref_available {
                channel.last_ref_delayed - channel.last_err
            } else {
                channel.vars.meas_hist[channel.vars.history_index]
                    + channel.rate_estimator.last_rate() * channel.iter_period_s
            }
        };
        let filtered = channel.filter.update(value);
        channel.vars.meas_hist[channel.vars.history_index] = filtered;
        channel.rate_estimator.update(filtered);
        filtered
    }

    /// One RT iteration of regulation for `channel`, dispatching on `channel.mode` per
    /// §4.5's `regulate` procedure:
    /// - `NONE` produces no output — the actuation history is left untouched.
    /// - `VOLTAGE` is a direct clip-and-write-back of `reference`, no RST involved.
    /// - `CURRENT`/`FIELD` only run the full RST/back-calculation sequence on the
    ///   regulation tick (`iter_counter == 0`); off-tick iterations hold the last actuation
    ///   and only the error checker runs.
    ///
    /// `load` is needed for the CURRENT-mode saturation compensation
    /// (`Load::vref_sat`/`inverse_vref_sat`); the caller passes `&converter.load` alongside
    /// `&mut converter.{voltage,current,field}` as disjoint field borrows.
    ///
    /// Merges the original's `regConvRT`/`regConvRegulateRT` split into one entry point —
    /// both computed the same actuation, the split only let a caller skip a filter step it
    /// didn't need.
    pub fn regulate_rt(channel: &mut SignalChannel, load: &Load, reference: f32) -> RegulateOutcome {
        // Publish any pending next-buffers on both slots regardless of which is active, per
        // `conv_meas_set_rt` step 1 — a background `configure()` on the inactive slot must
        // not be starved by the RT side only servicing the one it currently regulates from.
        channel.pars_operational.adopt_if_ready();
        channel.pars_test.adopt_if_ready();
        let mut pars = channel.active_pars();
        if let Some(ref_delay_periods) = channel.ref_delay_override {
            pars.ref_delay_periods = ref_delay_periods;
        }

        let ref_delayed = rst::delayed_ref(&pars, &channel.vars, channel.iter_counter);
        let meas = channel.vars.meas_hist[channel.vars.history_index];
        let meas_flags = channel.meas_limits.check(meas);
        let (rms, rms_warning, rms_fault) = channel.rms_limiter.update(meas, pars.period);
        let _ = rms;
        let (error_warning, error_fault) = channel.error_checker.update(ref_delayed, meas);
        channel.last_ref_delayed = ref_delayed;
        channel.last_err = ref_delayed - meas;

        // Holds the last actuation on NONE and on CURRENT/FIELD off-ticks (§4.5: "off-tick:
        // only the regulation-error checker runs").
        let mut actuation = channel.vars.act_hist[channel.vars.history_index];
        let mut is_ref_limited = false;

        match channel.mode {
            Mode::None => {}
            Mode::Voltage => {
                let limited = channel
                    .ref_limits
                    .apply(reference, meas, pars.period, &mut channel.ref_limiter_state);
                actuation = limited.value;
                is_ref_limited = limited.is_limited;
                let idx = channel.vars.history_index;
                channel.vars.act_hist[idx] = actuation;
                channel.vars.ref_hist[idx] = actuation;
                channel.vars.openloop_ref_hist[idx] = actuation;
            }
            Mode::Current | Mode::Field => {
                if channel.iter_counter == 0 {
                    let ref_limited = channel
                        .ref_limits
                        .apply(reference, meas, pars.period, &mut channel.ref_limiter_state);
                    is_ref_limited = ref_limited.is_limited;

                    let v_ref =
                        rst::calc_act(&pars, &mut channel.vars, ref_limited.value, channel.is_openloop);

                    let is_current = matches!(channel.mode, Mode::Current);
                    let v_ref_sat = if is_current { load.vref_sat(meas, v_ref) } else { v_ref };

                    let v_limited = channel.v_ref_limits.apply(
                        v_ref_sat,
                        meas,
                        pars.period,
                        &mut channel.v_ref_limiter_state,
                    );
                    if v_limited.is_limited {
                        is_ref_limited = true;
                        let v_pre = if is_current {
                            load.inverse_vref_sat(meas, v_limited.value)
                        } else {
                            v_limited.value
                        };
                        rst::calc_ref(&pars, &mut channel.vars, v_pre, true, channel.is_openloop);
                    }
                    let _ = rst::track_delay(&channel.vars);

                    actuation = v_limited.value;

                    let was_openloop = channel.is_openloop;
                    if channel.is_openloop {
                        if meas.abs() >= channel.closeloop_threshold {
                            channel.is_openloop = false;
                        }
                    } else if meas.abs() < channel.closeloop_threshold {
                        channel.is_openloop = true;
                    }
                    // Bumpless handover: on the tick the open/closed-loop state actually
                    // flips, output the just-recomputed consistent `ref` history entry
                    // rather than the raw clipped actuation, per §4.5 step 5.
                    if was_openloop != channel.is_openloop {
                        actuation = channel.vars.ref_hist[channel.vars.history_index];
                    }
                }
            }
        }

        rst::increment_history_index(&mut channel.vars);
        channel.iter_counter = (channel.iter_counter + 1) % pars.period_iters.max(1);

        RegulateOutcome {
            actuation,
            reference: ref_delayed,
            filtered_meas: meas,
            is_ref_limited,
            meas_low: meas_flags.low,
            meas_high: meas_flags.high,
            error_warning,
            error_fault,
            rms_warning,
            rms_fault,
        }
    }

    /// Advances the voltage-source/load model one RT iteration, simulating the measurement
    /// that would result from the actuation just computed, with optional pseudo-random noise
    /// and a half-period-parameterised tone superimposed (§4.3) for open-loop testing without
    /// real hardware.
    pub fn simulate_rt(&mut self, v_ref: f32, i_meas: f32) -> f32 {
        let v_out = self.vs.step(&self.vs_pars, v_ref);
        let mut signal = self.load.inverse_vref_sat(i_meas, v_out);

        if self.sim_tone_half_period_iters > 0 && self.sim_tone_amplitude != 0.0 {
            self.sim_tone_counter += 1;
            if self.sim_tone_counter >= self.sim_tone_half_period_iters {
                self.sim_tone_counter = 0;
                self.sim_tone_sign = -self.sim_tone_sign;
            }
            signal += self.sim_tone_sign * self.sim_tone_amplitude;
        }

        if self.sim_noise_pp > 0.0 {
            let half = self.sim_noise_pp / 2.0;
            signal += self.rng.gen_range(-half..=half);
        }

        signal
    }

    pub fn io_mut(&mut self) -> &mut Io {
        &mut self.io
    }
}

/// Keeps a sibling I/B channel's `act` history consistent with a VOLTAGE-mode output, so a
/// future switch to closed-loop regulation on that channel is bumpless (§4.5 VOLTAGE
/// bullet). Kept as a standalone call rather than folded into `regulate_rt` so that function
/// never needs simultaneous mutable access to more than one [`SignalChannel`].
pub fn sync_voltage_handover(
    sibling: &mut SignalChannel,
    load: &Load,
    i_meas_unfiltered: f32,
    v_clipped: f32,
    is_current: bool,
) {
    let act = if is_current {
        load.inverse_vref_sat(i_meas_unfiltered, v_clipped)
    } else {
        v_clipped
    };
    let idx = sibling.vars.history_index;
    sibling.vars.act_hist[idx] = act;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthesizeStatus;
    use crate::rst::SynthesizeInput;

    struct FixedIo {
        inputs: u16,
        faults: u16,
    }

    impl SupervisorIo for FixedIo {
        fn read_digital_inputs(&mut self) -> u16 {
            self.inputs
        }
        fn read_fault_bits(&mut self) -> u16 {
            self.faults
        }
    }

    fn default_synthesize_input() -> SynthesizeInput<'static> {
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

    fn default_pars() -> RstPars {
        rst::synthesize(&default_synthesize_input()).expect("default synthesis must succeed")
    }

    fn test_converter() -> Converter<FixedIo> {
        let io = FixedIo { inputs: 0, faults: 0 };
        let voltage = SignalChannel::new(default_pars(), &[3], 0.001);
        let current = SignalChannel::new(default_pars(), &[3], 0.001);
        let field = SignalChannel::new(default_pars(), &[3], 0.001);
        Converter::new(io, Load::default(), VoltageSourcePars::default(), voltage, current, field, 0.001)
    }

    #[test]
    fn supervise_rt_moves_off_to_starting_on_start_input() {
        let mut conv = test_converter();
        conv.io_mut().inputs = Inputs::START.bits();
        let fired = conv.supervise_rt();
        assert_eq!(conv.state(), SupState::St);
        assert_eq!(fired, Some("OFtoST"));
    }

    #[test]
    fn none_mode_regulate_rt_produces_no_actuation_change() {
        let mut conv = test_converter();
        Converter::<FixedIo>::meas_set_rt(&mut conv.voltage, Sample::valid(0.0));
        let before = conv.voltage.vars.act_hist[conv.voltage.vars.history_index];
        let outcome = Converter::<FixedIo>::regulate_rt(&mut conv.voltage, &conv.load, 5.0);
        assert_eq!(outcome.actuation, before);
    }

    #[test]
    fn current_mode_only_runs_rst_on_the_regulation_tick() {
        let mut conv = test_converter();
        Converter::<FixedIo>::mode_set_rt(&mut conv.current, Mode::Current, 0.0);
        Converter::<FixedIo>::meas_set_rt(&mut conv.current, Sample::valid(0.0));
        let tick0 = Converter::<FixedIo>::regulate_rt(&mut conv.current, &conv.load, 1.0);
        Converter::<FixedIo>::meas_set_rt(&mut conv.current, Sample::valid(tick0.actuation));
        let tick1 = Converter::<FixedIo>::regulate_rt(&mut conv.current, &conv.load, 1.0);
        // period_iters == 10, so the second call (counter == 1) must hold the same actuation.
        assert_eq!(tick1.actuation, tick0.actuation);
    }

    #[test]
    fn regulate_rt_tracks_a_constant_reference() {
        let mut conv = test_converter();
        Converter::<FixedIo>::mode_set_rt(&mut conv.current, Mode::Current, 0.0);
        let mut meas = 0.0f32;
        for _ in 0..2000 {
            Converter::<FixedIo>::meas_set_rt(&mut conv.current, Sample::valid(meas));
            let outcome = Converter::<FixedIo>::regulate_rt(&mut conv.current, &conv.load, 1.0);
            meas = outcome.actuation;
        }
        let final_meas = conv.current.vars.meas_hist[conv.current.vars.history_index];
        assert!((final_meas - 1.0).abs() < 0.2);
    }

    #[test]
    fn mode_set_rt_reseeds_history_from_measurement() {
        let mut conv = test_converter();
        Converter::<FixedIo>::mode_set_rt(&mut conv.voltage, Mode::Voltage, 3.0);
        assert_eq!(conv.voltage.vars.meas_hist[0], 3.0);
    }

    #[test]
    fn mode_set_rt_current_ref_actuation_zeroes_act_history_and_seeds_meas() {
        let mut conv = test_converter();
        conv.current.configure_pc_actuation(regconv_config::PcActuation::CurrentRef);
        Converter::<FixedIo>::mode_set_rt(&mut conv.current, Mode::Current, 2.0);
        assert_eq!(conv.current.vars.act_hist[0], 0.0);
        assert_eq!(conv.current.vars.meas_hist[0], 2.0);
        assert_eq!(conv.current.vars.ref_hist[0], 2.0);
    }

    #[test]
    fn invalid_sample_increments_counter_and_extrapolates() {
        let mut conv = test_converter();
        Converter::<FixedIo>::mode_set_rt(&mut conv.voltage, Mode::Voltage, 1.0);
        Converter::<FixedIo>::meas_set_rt(&mut conv.voltage, Sample::valid(1.0));
        assert_eq!(conv.voltage.invalid_input_counter, 0);
        Converter::<FixedIo>::meas_set_rt(&mut conv.voltage, Sample::invalid());
        assert_eq!(conv.voltage.invalid_input_counter, 1);
        Converter::<FixedIo>::meas_set_rt(&mut conv.voltage, Sample::invalid());
        assert_eq!(conv.voltage.invalid_input_counter, 2);
    }

    #[test]
    fn rst_source_switch_selects_the_published_slot() {
        let mut conv = test_converter();
        let mut test_pars = default_pars();
        test_pars.period_iters = 99;
        conv.current.publish_pars(RegRstSource::Test, test_pars);

        assert_eq!(conv.current.active_pars().period_iters, 10);
        conv.current.set_rst_source(RegRstSource::Test);
        Converter::<FixedIo>::meas_set_rt(&mut conv.current, Sample::valid(0.0));
        let _ = Converter::<FixedIo>::regulate_rt(&mut conv.current, &conv.load, 0.0);
        assert_eq!(conv.current.active_pars().period_iters, 99);
    }

    #[test]
    fn none_mode_counter_is_deterministic_from_wall_clock() {
        let mut conv = test_converter();
        Converter::<FixedIo>::sync_none_mode_counter(&mut conv.voltage, 7, 500_000);
        let first = conv.voltage.iter_counter;
        Converter::<FixedIo>::sync_none_mode_counter(&mut conv.voltage, 7, 500_000);
        assert_eq!(conv.voltage.iter_counter, first);
        assert!(first < 10);
    }

    #[test]
    fn sync_voltage_handover_updates_sibling_act_history() {
        let mut conv = test_converter();
        sync_voltage_handover(&mut conv.current, &conv.load, 10.0, 5.0, true);
        let idx = conv.current.vars.history_index;
        assert_eq!(conv.current.vars.act_hist[idx], conv.load.inverse_vref_sat(10.0, 5.0));
    }

    #[test]
    fn reconfigure_retains_last_rst_pars_on_fault() {
        let mut conv = test_converter();
        let before = conv.current.last_rst_pars.period_iters;
        let mut bad_input = default_synthesize_input();
        bad_input.closed_loop_bandwidth_hz = 0.0;
        let status = conv.current.reconfigure(RegRstSource::Operational, &bad_input);
        assert_eq!(status, SynthesizeStatus::Fault);
        assert_eq!(conv.current.last_rst_pars.period_iters, before);
    }

    #[test]
    fn simulate_rt_noise_peak_to_peak_matches_configured_amplitude() {
        let mut conv = test_converter();
        conv.configure_sim_noise(2.0, 0.0, 0);
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for _ in 0..10_000 {
            let v = conv.simulate_rt(0.0, 0.0);
            min = min.min(v);
            max = max.max(v);
        }
        let pp = max - min;
        assert!(pp >= 0.9 * 2.0 && pp <= 1.1 * 2.0, "peak-to-peak {pp} out of range");
    }
}
