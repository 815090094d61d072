use regconv_config::load_toml;
use rstest::rstest;

fn base_toml() -> String {
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
    .to_string()
}

#[test]
fn rejects_zero_iter_period_us() {
    let toml = base_toml().replace("iter_period_us = 1000", "iter_period_us = 0");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject iter_period_us=0");
    assert!(
        format!("{err}")
            .to_lowercase()
            .contains("iter_period_us must be > 0")
    );
}

#[test]
fn accepts_base_config() {
    let cfg = load_toml(&base_toml()).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
}

#[test]
fn rejects_inverted_reference_window() {
    let toml = base_toml()
        + r#"
[v_limits.reference]
pos = -1.0
neg = 1.0
"#;
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg
        .validate()
        .expect_err("pos < neg should be rejected");
    assert!(format!("{err}").contains("v_limits.reference.pos"));
}

#[rstest]
#[case::empty_fir_lengths("[i_filter]\nfir_lengths = []\n")]
#[case::zero_length_fir_stage("[i_filter]\nfir_lengths = [0]\n")]
#[case::zero_bandwidth_no_sim_coeffs("[voltage_source]\nbandwidth = 0.0\nsim_num = []\nsim_den = []\n")]
#[case::zero_sim_den_leading_term("[voltage_source]\nbandwidth = 0.0\nsim_num = [1.0]\nsim_den = [0.0]\n")]
#[case::negative_rate_limit("[v_limits.reference]\nrate = -1.0\n")]
fn rejects_invalid_snippet(#[case] snippet: &str) {
    let toml = base_toml() + snippet;
    let cfg = load_toml(&toml).expect("parse TOML");
    assert!(cfg.validate().is_err(), "expected validation failure for: {snippet}");
}

#[test]
fn zero_bandwidth_with_sim_coefficients_is_accepted() {
    let toml = base_toml()
        + r#"
[voltage_source]
bandwidth = 0.0
sim_num = [1.0]
sim_den = [1.0, -0.5]
"#;
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("explicit sim coefficients should validate");
}
