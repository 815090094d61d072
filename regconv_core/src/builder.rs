//! Constructs a [`Converter`] from a [`regconv_config::ConverterConfig`].
//!
//! Grounded on `regConvCreate`/`regConvInit` (`libreg/src/regConv.c`): validate the config,
//! synthesize the operational RST parameters for each enabled signal, build the load and
//! voltage-source models, and wire everything into one `Converter`.

use regconv_config::ConverterConfig;
use regconv_traits::SupervisorIo;

use crate::converter::{Converter, SignalChannel};
use crate::error::BuildError;
use crate::limits::{MeasLimits, QuadrantEnvelope, RefLimits};
use crate::load::{Load, VoltageSourcePars};
use crate::rst::{self, RstPars, SynthesizeInput};

fn synthesize_signal(
    name: &'static str,
    cfg: &regconv_config::RstSynthesisConfig,
    iter_period_s: f32,
) -> Result<RstPars, BuildError> {
    rst::synthesize(&SynthesizeInput {
        period_iters: cfg.period_iters,
        iter_period_s,
        closed_loop_bandwidth_hz: cfg.closed_loop_bandwidth_hz,
        closed_loop_damping_z: if cfg.closed_loop_damping_z > 0.0 {
            cfg.closed_loop_damping_z
        } else {
            0.9
        },
        pure_delay_periods: cfg.pure_delay_periods,
        meas_delay_iters_reg_select: 1.0,
        meas_delay_iters_unfiltered: 0.0,
        reg_err_rate_is_regulation: true,
        manual_r: cfg.manual_r.as_deref(),
        manual_s: cfg.manual_s.as_deref(),
        manual_t: cfg.manual_t.as_deref(),
    })
    .map_err(|fault| BuildError::SynthesizeFailed { signal: name, fault })
}

fn ref_limits_from(cfg: &regconv_config::RefLimitsConfig) -> RefLimits {
    RefLimits {
        min: if cfg.neg != 0.0 { cfg.neg } else { cfg.min },
        max: if cfg.pos != 0.0 { cfg.pos } else { f32::MAX },
        rate_limit: if cfg.rate > 0.0 { cfg.rate } else { f32::MAX },
        acceleration_limit: if cfg.acceleration > 0.0 {
            cfg.acceleration
        } else {
            f32::MAX
        },
        quadrant: if cfg.quadrant_points.is_empty() {
            None
        } else {
            Some(QuadrantEnvelope { points: cfg.quadrant_points.clone() })
        },
    }
}

fn meas_limits_from(cfg: &regconv_config::MeasLimitsConfig) -> MeasLimits {
    MeasLimits {
        low_threshold: if cfg.low != 0.0 { cfg.low } else { f32::MIN },
        high_threshold: if cfg.pos != 0.0 { cfg.pos } else { f32::MAX },
        zero_threshold: cfg.zero,
    }
}

fn filter_stage_lengths(fir_lengths: &[u32]) -> Vec<usize> {
    fir_lengths.iter().map(|&n| n as usize).collect()
}

/// Builds a fully-wired [`Converter`] from a validated [`ConverterConfig`], attaching `io`
/// as the supervisory digital-I/O backend.
pub struct ConverterBuilder;

impl ConverterBuilder {
    /// Validates `config` and constructs the [`Converter`]. Voltage is always regulated;
    /// current/field channels are built regardless of `*_reg_enabled` so a mode switch at
    /// runtime never needs to rebuild the converter, but [`Converter::mode_set_rt`] only
    /// activates the ones the config enables.
    pub fn build<Io: SupervisorIo>(
        io: Io,
        config: &ConverterConfig,
    ) -> Result<Converter<Io>, BuildError> {
        if let Err(err) = config.validate() {
            tracing::error!(%err, "converter config failed validation");
            return Err(BuildError::InvalidConfig("config validation failed, see logs"));
        }

        let iter_period_s = config.iter_period_us as f32 / 1_000_000.0;

        let voltage_pars = synthesize_signal(
            "voltage",
            &regconv_config::RstSynthesisConfig {
                period_iters: 1,
                closed_loop_bandwidth_hz: config.voltage_source.bandwidth.max(1.0),
                closed_loop_damping_z: config.voltage_source.z,
                ..regconv_config::RstSynthesisConfig::default()
            },
            iter_period_s,
        )?;
        let current_pars = synthesize_signal("current", &config.ireg.operational, iter_period_s)?;
        let field_pars = synthesize_signal("field", &config.breg.operational, iter_period_s)?;

        let mut voltage = SignalChannel::new(voltage_pars, &[1], iter_period_s);
        let mut current = SignalChannel::new(
            current_pars,
            &filter_stage_lengths(&config.i_filter.fir_lengths),
            iter_period_s,
        );
        let mut field = SignalChannel::new(
            field_pars,
            &filter_stage_lengths(&config.b_filter.fir_lengths),
            iter_period_s,
        );

        // The test RST slot only needs a seed value if its config section is actually
        // populated (non-zero bandwidth or manual coefficients); otherwise leave the
        // channel's default (a copy of the operational pars) in place so switching to
        // `RegRstSource::Test` before anyone has configured it is still well-defined.
        if config.ireg.test.closed_loop_bandwidth_hz > 0.0 || config.ireg.test.manual_r.is_some() {
            let test_pars = synthesize_signal("current test", &config.ireg.test, iter_period_s)?;
            current.publish_pars(crate::converter::RegRstSource::Test, test_pars);
        }
        if config.breg.test.closed_loop_bandwidth_hz > 0.0 || config.breg.test.manual_r.is_some() {
            let test_pars = synthesize_signal("field test", &config.breg.test, iter_period_s)?;
            field.publish_pars(crate::converter::RegRstSource::Test, test_pars);
        }

        voltage.configure_ref_limits(ref_limits_from(&config.v_limits.reference));
        voltage.configure_error_checker(
            config.v_limits.error.warning_threshold,
            config.v_limits.error.fault_threshold,
            config.v_limits.error.debounce_iters,
        );

        current.configure_ref_limits(ref_limits_from(&config.i_limits.reference));
        current.configure_error_checker(
            config.i_limits.error.warning_threshold,
            config.i_limits.error.fault_threshold,
            config.i_limits.error.debounce_iters,
        );
        if let Some(meas) = &config.i_limits.measurement {
            current.configure_meas_limits(meas_limits_from(meas));
        }
        current.configure_pc_actuation(config.pc_actuation);
        current.configure_closeloop_threshold(config.i_limits.closeloop);
        current.configure_v_ref_limits(ref_limits_from(&config.v_limits.reference));

        field.configure_ref_limits(ref_limits_from(&config.b_limits.reference));
        field.configure_error_checker(
            config.b_limits.error.warning_threshold,
            config.b_limits.error.fault_threshold,
            config.b_limits.error.debounce_iters,
        );
        if let Some(meas) = &config.b_limits.measurement {
            field.configure_meas_limits(meas_limits_from(meas));
        }
        field.configure_pc_actuation(config.pc_actuation);
        field.configure_closeloop_threshold(config.b_limits.closeloop);
        field.configure_v_ref_limits(ref_limits_from(&config.v_limits.reference));

        let load = Load {
            henrys_nominal: config.load.henrys_nominal,
            henrys_sat: config.load.henrys_sat,
            i_sat_start: config.load.i_sat_start,
            i_sat_end: config.load.i_sat_end,
            ohms_series: config.load.ohms_ser,
            ohms_parallel: config.load.ohms_par,
            ohms_magnet: config.load.ohms_mag,
        };
        let vs_pars = VoltageSourcePars::discretize(
            config.voltage_source.bandwidth,
            config.voltage_source.z,
            config.voltage_source.tau_zero,
            iter_period_s,
        );

        let mut converter = Converter::new(io, load, vs_pars, voltage, current, field, iter_period_s);
        converter.configure_sim_noise(
            config.sim.noise_pp,
            config.sim.tone_amplitude,
            config.sim.tone_half_period_iters,
        );
        Ok(converter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regconv_traits::SupervisorIo;

    struct NullIo;
    impl SupervisorIo for NullIo {
        fn read_digital_inputs(&mut self) -> u16 {
            0
        }
        fn read_fault_bits(&mut self) -> u16 {
            0
        }
    }

    fn minimal_config() -> ConverterConfig {
        regconv_config::load_toml(
            r#"
            iter_period_us = 1000
            pc_actuation = "voltage_ref"
            field_reg_enabled = false
            current_reg_enabled = true

            [load]
            ohms_ser = 0.1
            ohms_par = 1000.0
            ohms_mag = 0.05
            henrys_nominal = 0.5
            henrys_sat = 0.2
            i_sat_start = 100.0
            i_sat_end = 200.0

            [ireg.operational]
            period_iters = 10
            closed_loop_bandwidth_hz = 50.0

            [breg.operational]
            period_iters = 10
            closed_loop_bandwidth_hz = 50.0
            "#,
        )
        .expect("valid toml")
    }

    #[test]
    fn builds_converter_from_minimal_config() {
        let config = minimal_config();
        let converter = ConverterBuilder::build(NullIo, &config);
        assert!(converter.is_ok());
    }
}
