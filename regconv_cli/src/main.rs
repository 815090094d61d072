#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! CLI entrypoint for the power converter regulation core demo.
//!
//! Responsibilities:
//! - Parse config/flags and build a `Converter` against the simulated plant
//! - Initialize tracing and manage log sinks
//! - Offer `--json`/`--stats` modes emitting stable JSONL telemetry to stdout
//! - Provide optional RT helpers via libc on supported OSes, with safety docs
//! - Map converter build/synthesis errors to stable exit codes

mod cli;
mod demo;
mod error_fmt;
mod rt;
mod tracing_setup;

use std::fs;

use clap::Parser;
use eyre::WrapErr;

use cli::{Cli, Commands, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use tracing_setup::init_tracing;

fn main() -> eyre::Result<()> {
    let _ = color_eyre::install();

    let shutdown = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let shutdown_clone = std::sync::Arc::clone(&shutdown);

    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nReceived shutdown signal, stopping gracefully...");
        shutdown_clone.store(true, std::sync::atomic::Ordering::SeqCst);
    }) {
        eprintln!("Warning: Failed to set signal handler: {e}");
    }

    if let Err(e) = real_main(shutdown) {
        let json = *JSON_MODE.get().unwrap_or(&false);
        let code = exit_code_for_error(&e);
        if json {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(code);
    }
    Ok(())
}

fn real_main(shutdown: std::sync::Arc<std::sync::atomic::AtomicBool>) -> eyre::Result<()> {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let cfg_text = fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {:?}", cli.config))?;
    let cfg: regconv_config::ConverterConfig =
        toml::from_str(&cfg_text).wrap_err_with(|| format!("parse config {:?}", cli.config))?;
    cfg.validate().wrap_err("invalid configuration")?;

    init_tracing(
        cli.json,
        &cli.log_level,
        cfg.logging.file.as_deref(),
        cfg.logging.rotation.as_deref(),
    );

    match cli.cmd {
        Commands::SelfCheck => {
            tracing::info!("self-check starting");
            let summary = demo::run_demo(
                &cfg,
                cli::RegulateSignal::Current,
                1.0,
                50,
                false,
                shutdown,
            )?;
            println!(
                "self-check OK: {} iterations, final state {:?}, final meas {:.4}",
                summary.iterations, summary.final_state, summary.final_meas
            );
            Ok(())
        }
        Commands::Run {
            signal,
            reference,
            duration_ms,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
            stats,
        } => {
            #[cfg(target_os = "linux")]
            rt::setup_rt_once(rt, rt_prio, rt_lock.unwrap_or(cli::RtLock::os_default()), rt_cpu);
            #[cfg(target_os = "macos")]
            rt::setup_rt_once(rt, rt_lock.unwrap_or(cli::RtLock::os_default()));
            #[cfg(not(any(target_os = "linux", target_os = "macos")))]
            let _ = (rt, rt_prio, rt_lock, rt_cpu);

            let summary = demo::run_demo(&cfg, signal, reference, duration_ms, stats, shutdown)?;
            if !stats {
                println!(
                    "ran {} iterations, final state {:?}, final meas {:.4}",
                    summary.iterations, summary.final_state, summary.final_meas
                );
            }
            Ok(())
        }
    }
}
