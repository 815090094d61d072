//! Drives the regulation core against the simulated power converter for a fixed duration,
//! pacing RT iterations off `regconv_traits::MonotonicClock` the way the background
//! configuration thread and the RT loop are paced in the core crate's own design.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regconv_config::ConverterConfig;
use regconv_core::converter::{Converter, Mode};
use regconv_core::{ConverterBuilder, Sample, SupState};
use regconv_hardware::SimulatedSupervisorIo;
use regconv_traits::{Clock, MonotonicClock};

use crate::cli::RegulateSignal;

#[derive(Debug, Clone, Copy, Default)]
pub struct DemoSummary {
    pub iterations: u64,
    pub final_meas: f32,
    pub final_state: Option<SupState>,
}

pub fn run_demo(
    cfg: &ConverterConfig,
    signal: RegulateSignal,
    reference: f32,
    duration_ms: u64,
    stats: bool,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<DemoSummary> {
    let io = SimulatedSupervisorIo::new();
    io.set_inputs(0);
    let mut converter = ConverterBuilder::build(io, cfg)?;

    let mode = match signal {
        RegulateSignal::Voltage => Mode::Voltage,
        RegulateSignal::Current => Mode::Current,
        RegulateSignal::Field => Mode::Field,
    };
    let channel = match signal {
        RegulateSignal::Voltage => &mut converter.voltage,
        RegulateSignal::Current => &mut converter.current,
        RegulateSignal::Field => &mut converter.field,
    };

    Converter::<SimulatedSupervisorIo>::mode_set_rt(channel, mode, 0.0);

    let clock = MonotonicClock::new();
    let period = Duration::from_micros(u64::from(cfg.iter_period_us));
    let start = clock.now();
    let deadline_ms = duration_ms;

    let mut meas = 0.0f32;
    let mut iterations = 0u64;

    while clock.ms_since(start) < deadline_ms {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested, stopping demo loop");
            break;
        }

        let channel = match signal {
            RegulateSignal::Voltage => &mut converter.voltage,
            RegulateSignal::Current => &mut converter.current,
            RegulateSignal::Field => &mut converter.field,
        };
        Converter::<SimulatedSupervisorIo>::meas_set_rt(channel, Sample::valid(meas));
        let outcome =
            Converter::<SimulatedSupervisorIo>::regulate_rt(channel, &converter.load, reference);
        meas = converter.simulate_rt(outcome.actuation, meas);
        converter.supervise_rt();
        iterations += 1;

        if stats {
            let line = serde_json::json!({
                "iteration": iterations,
                "reference": outcome.reference,
                "actuation": outcome.actuation,
                "meas": meas,
                "error_warning": outcome.error_warning,
                "error_fault": outcome.error_fault,
                "state": format!("{:?}", converter.state()),
            });
            println!("{line}");
        }

        clock.sleep(period);
    }

    Ok(DemoSummary {
        iterations,
        final_meas: meas,
        final_state: Some(converter.state()),
    })
}
