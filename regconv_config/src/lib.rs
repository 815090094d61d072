#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the regulation core.
//!
//! `ConverterConfig` and its sub-structs are deserialized from TOML and validated before
//! being turned into a `regconv_core::Converter`. Every sub-config carries a `Default` the
//! way the original tool's `ccpars_*` structs did, so a converter can be built from a
//! partial TOML file during experimentation.
use serde::Deserialize;

/// Which of the two RST actuation signals the regulation error checker and reference
/// interpolation should treat as "the" actuation output.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PcActuation {
    VoltageRef,
    CurrentRef,
}

/// Magnet electrical model: series/parallel/magnet resistance and the saturating
/// inductance curve.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LoadConfig {
    pub ohms_ser: f32,
    pub ohms_par: f32,
    pub ohms_mag: f32,
    pub henrys_nominal: f32,
    pub henrys_sat: f32,
    pub i_sat_start: f32,
    pub i_sat_end: f32,
}

/// Voltage-source transfer-function model. Defaults mirror the original tool's
/// `ccpars_vs` defaults (bandwidth 200 Hz, damping 0.9, unity-gain simulation model).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VoltageSourceConfig {
    pub v_ref_delay_iters: f32,
    pub quantization: f32,
    pub bandwidth: f32,
    pub z: f32,
    pub tau_zero: f32,
    pub sim_num: Vec<f32>,
    pub sim_den: Vec<f32>,
}

impl Default for VoltageSourceConfig {
    fn default() -> Self {
        Self {
            v_ref_delay_iters: 1.0,
            quantization: 0.0,
            bandwidth: 200.0,
            z: 0.9,
            tau_zero: 0.0,
            sim_num: vec![1.0],
            sim_den: vec![1.0],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RefLimitsConfig {
    pub pos: f32,
    pub neg: f32,
    pub min: f32,
    pub rate: f32,
    pub acceleration: f32,
    /// `(companion_measurement, max_magnitude)` breakpoints for an optional (I, V)-quadrant
    /// envelope. Empty disables the constraint.
    pub quadrant_points: Vec<(f32, f32)>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct ErrLimitsConfig {
    pub warning_threshold: f32,
    pub fault_threshold: f32,
    /// Number of consecutive ticks |err| must exceed threshold before the flag latches.
    pub debounce_iters: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct MeasLimitsConfig {
    pub pos: f32,
    pub neg: f32,
    pub low: f32,
    pub zero: f32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct RmsLimitsConfig {
    pub warning: f32,
    pub fault: f32,
    pub filter_tc_s: f32,
}

impl Default for RmsLimitsConfig {
    fn default() -> Self {
        Self {
            warning: 0.0,
            fault: 0.0,
            filter_tc_s: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasSelect {
    #[default]
    Filtered,
    Unfiltered,
}

/// Cascaded FIR filter lengths for one signal, plus which tap (filtered/unfiltered) the
/// RST regulation error uses.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub fir_lengths: Vec<u32>,
    pub reg_select: MeasSelect,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            fir_lengths: vec![1],
            reg_select: MeasSelect::Filtered,
        }
    }
}

/// Limits bundle for one regulated signal. `measurement`/`rms` are only meaningful for I
/// and B (voltage has no RMS limiter and no absolute-measurement limiter in the original).
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SignalLimitsConfig {
    pub reference: RefLimitsConfig,
    pub error: ErrLimitsConfig,
    pub measurement: Option<MeasLimitsConfig>,
    pub rms: Option<RmsLimitsConfig>,
    /// Open-loop-to-closed-loop handover threshold (absolute measurement magnitude) for
    /// CURRENT/FIELD regulation. `0.0` (the default) regulates closed-loop from the first
    /// iteration.
    pub closeloop: f32,
}

/// Inputs to `synthesize_rst`: either a target bandwidth/damping/delay specification, or
/// (if `manual_r[0] != 0`) explicit coefficients to validate and use as-is.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RstSynthesisConfig {
    pub period_iters: u32,
    pub closed_loop_bandwidth_hz: f32,
    pub closed_loop_bandwidth2_hz: f32,
    pub closed_loop_damping_z: f32,
    pub closed_loop_bandwidth3_hz: f32,
    pub closed_loop_bandwidth4_hz: f32,
    pub pure_delay_periods: f32,
    pub manual_r: Option<Vec<f32>>,
    pub manual_s: Option<Vec<f32>>,
    pub manual_t: Option<Vec<f32>>,
}

/// Operational and test RST parameter sets for one regulated signal (I or B). Both slots
/// are independently double-buffered at runtime; this struct only carries the background
/// inputs used to (re)synthesize them.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RegConfig {
    pub operational: RstSynthesisConfig,
    pub test: RstSynthesisConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub v_delay_iters: f32,
    pub i_delay_iters: f32,
    pub b_delay_iters: f32,
    pub noise_pp: f32,
    pub tone_amplitude: f32,
    pub tone_half_period_iters: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            v_delay_iters: 0.0,
            i_delay_iters: 0.0,
            b_delay_iters: 0.0,
            noise_pp: 0.0,
            tone_amplitude: 0.0,
            tone_half_period_iters: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,
    pub level: Option<String>,
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConverterConfig {
    pub iter_period_us: u32,
    pub pc_actuation: PcActuation,
    pub field_reg_enabled: bool,
    pub current_reg_enabled: bool,
    pub load: LoadConfig,
    #[serde(default)]
    pub voltage_source: VoltageSourceConfig,
    #[serde(default)]
    pub v_limits: SignalLimitsConfig,
    #[serde(default)]
    pub i_limits: SignalLimitsConfig,
    #[serde(default)]
    pub b_limits: SignalLimitsConfig,
    #[serde(default)]
    pub i_filter: FilterConfig,
    #[serde(default)]
    pub b_filter: FilterConfig,
    #[serde(default)]
    pub ireg: RegConfig,
    #[serde(default)]
    pub breg: RegConfig,
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<ConverterConfig, toml::de::Error> {
    toml::from_str::<ConverterConfig>(s)
}

impl ConverterConfig {
    /// Range/consistency checks mirroring the original's per-parameter-group rejection
    /// rules. Unlike the RT core, this is allowed to fail loudly: a bad config should
    /// never reach `conv_pars`.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.iter_period_us == 0 {
            eyre::bail!("iter_period_us must be > 0");
        }

        if self.load.henrys_nominal <= 0.0 {
            eyre::bail!("load.henrys_nominal must be > 0");
        }
        if self.load.i_sat_end < self.load.i_sat_start {
            eyre::bail!("load.i_sat_end must be >= load.i_sat_start");
        }

        if self.voltage_source.bandwidth < 0.0 {
            eyre::bail!("voltage_source.bandwidth must be >= 0");
        }
        if self.voltage_source.bandwidth == 0.0 {
            if self.voltage_source.sim_num.is_empty() || self.voltage_source.sim_den.is_empty() {
                eyre::bail!(
                    "voltage_source.sim_num/sim_den must be non-empty when bandwidth == 0"
                );
            }
            if self.voltage_source.sim_den[0] == 0.0 {
                eyre::bail!("voltage_source.sim_den[0] must be non-zero");
            }
        }

        for (name, limits) in [
            ("v_limits", &self.v_limits),
            ("i_limits", &self.i_limits),
            ("b_limits", &self.b_limits),
        ] {
            if limits.reference.pos < limits.reference.neg {
                eyre::bail!("{name}.reference.pos must be >= {name}.reference.neg");
            }
            if limits.reference.rate < 0.0 {
                eyre::bail!("{name}.reference.rate must be >= 0");
            }
            if limits.reference.acceleration < 0.0 {
                eyre::bail!("{name}.reference.acceleration must be >= 0");
            }
            if limits.error.warning_threshold < 0.0 || limits.error.fault_threshold < 0.0 {
                eyre::bail!("{name}.error thresholds must be >= 0");
            }
        }

        for (name, filt) in [("i_filter", &self.i_filter), ("b_filter", &self.b_filter)] {
            if filt.fir_lengths.is_empty() {
                eyre::bail!("{name}.fir_lengths must have at least one stage");
            }
            if filt.fir_lengths.iter().any(|&n| n == 0) {
                eyre::bail!("{name}.fir_lengths entries must be >= 1");
            }
        }

        for (name, reg) in [("ireg", &self.ireg), ("breg", &self.breg)] {
            for (slot, cfg) in [("operational", &reg.operational), ("test", &reg.test)] {
                if cfg.period_iters == 0 {
                    eyre::bail!("{name}.{slot}.period_iters must be >= 1");
                }
                let manual = cfg.manual_r.as_ref().is_some_and(|r| r.first() != Some(&0.0));
                if !manual && cfg.closed_loop_bandwidth_hz <= 0.0 {
                    eyre::bail!(
                        "{name}.{slot}.closed_loop_bandwidth_hz must be > 0 unless manual coefficients are supplied"
                    );
                }
                if let (Some(r), Some(s), Some(t)) =
                    (&cfg.manual_r, &cfg.manual_s, &cfg.manual_t)
                {
                    if r.len() > 10 || s.len() > 10 || t.len() > 10 {
                        eyre::bail!("{name}.{slot} manual R/S/T must have at most 10 coefficients");
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
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
        "#
    }

    #[test]
    fn parses_minimal_config() {
        let cfg = load_toml(minimal_toml()).expect("should parse");
        assert_eq!(cfg.iter_period_us, 1000);
        assert_eq!(cfg.pc_actuation, PcActuation::VoltageRef);
        assert_eq!(cfg.voltage_source.bandwidth, 200.0);
    }

    #[test]
    fn validates_minimal_config() {
        let cfg = load_toml(minimal_toml()).expect("should parse");
        cfg.validate().expect("should validate");
    }

    #[test]
    fn rejects_zero_iter_period() {
        let mut cfg = load_toml(minimal_toml()).expect("should parse");
        cfg.iter_period_us = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_missing_bandwidth_without_manual_coeffs() {
        let mut cfg = load_toml(minimal_toml()).expect("should parse");
        cfg.ireg.operational.closed_loop_bandwidth_hz = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_manual_coefficients_without_bandwidth() {
        let mut cfg = load_toml(minimal_toml()).expect("should parse");
        cfg.ireg.operational.closed_loop_bandwidth_hz = 0.0;
        cfg.ireg.operational.manual_r = Some(vec![1.0, -0.5]);
        cfg.ireg.operational.manual_s = Some(vec![1.0]);
        cfg.ireg.operational.manual_t = Some(vec![0.5]);
        cfg.validate().expect("manual coefficients should validate");
    }
}
