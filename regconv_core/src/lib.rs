#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Hardware-agnostic power-converter regulation core.
//!
//! All physical I/O goes through `regconv_traits::SupervisorIo`; V/I/B measurements are
//! passed directly into the RT entry points as `regconv_traits::Sample` values rather than
//! read through a trait (this core has no physical actuator of its own).
//!
//! ## Architecture
//!
//! - **Load model** (`load`): magnet saturation compensation and the voltage-source
//!   transfer-function model (C1).
//! - **Measurement pipeline** (`filter`): cascaded FIR filtering and rate estimation (C2).
//! - **Limits** (`limits`): reference/measurement/RMS limiting and the debounced
//!   regulation-error checker (C3).
//! - **RST regulator** (`rst`): the discrete-time R/S/T controller, its circular histories,
//!   and coefficient synthesis (C4).
//! - **Supervisor** (`status`): the converter's lifecycle state machine (C5).
//! - **Handoff** (`handoff`): the lock-light double buffer publishing new parameters from
//!   the background context into the RT context (§4.6).
//! - **Converter** (`converter`): orchestrates the above into the `meas_set_rt`/
//!   `mode_set_rt`/`regulate_rt`/`simulate_rt` per-iteration entry points.
//! - **Builder** (`builder`): constructs a `Converter` from a `regconv_config::ConverterConfig`.

pub mod builder;
pub mod converter;
pub mod error;
pub mod filter;
pub mod handoff;
pub mod limits;
pub mod load;
pub mod rst;
pub mod status;
pub mod util;

pub use builder::ConverterBuilder;
pub use converter::{
    Converter, Mode, RegRstSource, RegulateOutcome, SignalChannel, NONE_MODE_SYNC_PERIOD_US,
};
pub use error::{BuildError, ConvertError, Result, SynthesizeFault, SynthesizeStatus};
pub use status::{FaultBits, Inputs, SupState, SupervisorInputs};

pub use regconv_traits::{Clock, MonotonicClock, Sample, SupervisorIo};
