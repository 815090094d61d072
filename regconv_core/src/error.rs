//! Boundary errors for the regulation core: status of a background RST synthesis, and the
//! errors a caller can hit building or configuring a `Converter`.
//!
//! Per §7 of the design, nothing on the RT path (`regulate_rt`, `meas_set_rt`,
//! `simulate_rt`) returns a `Result` — faults there are surfaced as struct fields instead.
//! Only the background/boundary operations (`synthesize_rst`, building a `Converter` from
//! a `ConverterConfig`) are fallible in the ordinary Rust sense.
use thiserror::Error;

/// Outcome of synthesizing RST coefficients from bandwidth/damping/delay inputs.
///
/// `synthesize_rst` never mutates an active buffer; on `Fault` the caller must not publish
/// the next-buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesizeStatus {
    Ok,
    Warning,
    Fault,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SynthesizeFault {
    #[error("period_iters must be >= 1")]
    ZeroPeriod,
    #[error("closed-loop bandwidth must be > 0 (or supply manual coefficients)")]
    NonPositiveBandwidth,
    #[error("|s[0]| = {0} is below the ill-conditioning threshold")]
    IllConditionedS0(f32),
    #[error("closed-loop pole at radius {0} is outside the unit disk margin")]
    UnstablePole(f32),
    #[error("manual coefficient array has {0} entries, must be <= {1}")]
    TooManyCoefficients(usize, usize),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing load configuration")]
    MissingLoad,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("rst synthesis failed for {signal}: {fault}")]
    SynthesizeFailed {
        signal: &'static str,
        fault: SynthesizeFault,
    },
}

#[derive(Debug, Error, Clone)]
pub enum ConvertError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_fault_display_is_stable() {
        assert_eq!(
            SynthesizeFault::ZeroPeriod.to_string(),
            "period_iters must be >= 1"
        );
        assert_eq!(
            SynthesizeFault::IllConditionedS0(0.0001).to_string(),
            "|s[0]| = 0.0001 is below the ill-conditioning threshold"
        );
    }
}
