//! Human-readable error descriptions and structured JSON error formatting.

use regconv_core::{BuildError, SynthesizeFault};

/// Map an `eyre::Report` to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingLoad => {
                "What happened: No load configuration was provided.\nLikely causes: The [load] table is missing from the config TOML.\nHow to fix: Add a [load] section with ohms_ser/ohms_par/ohms_mag/henrys_nominal/henrys_sat/i_sat_start/i_sat_end.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Re-run with --log-level=debug to see the specific validation failure, then edit the config."
            ),
            BuildError::SynthesizeFailed { signal, fault } => format!(
                "What happened: RST synthesis failed for the {signal} channel ({fault}).\nLikely causes: An inconsistent bandwidth/damping/delay combination, or out-of-range manual coefficients.\nHow to fix: Lower the requested closed-loop bandwidth or review the manual R/S/T arrays."
            ),
        };
    }

    if let Some(fault) = err.downcast_ref::<SynthesizeFault>() {
        return format!(
            "What happened: {fault}.\nHow to fix: Adjust the RST synthesis inputs (bandwidth, damping, or manual coefficients) and retry."
        );
    }

    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: build/config failures get their own codes so scripts can
/// distinguish "bad config" from "ran but the converter faulted".
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if err.downcast_ref::<SynthesizeFault>().is_some() {
        return 3;
    }
    1
}

/// Structured JSON for errors when `--json` is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
