#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Concrete `SupervisorIo` backends: a deterministic simulation used by tests/the demo CLI,
//! and (behind the `hardware` feature) a GPIO-backed implementation for a real crate for
//! particle-accelerator power converter installation.
pub mod error;
pub mod gpio;
pub mod util;

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use regconv_traits::SupervisorIo;

/// A `SupervisorIo` backed by two shared atomics: a test harness or the demo CLI's input
/// thread writes digital-input/fault bitmasks with [`SimulatedSupervisorIo::set_inputs`]/
/// [`SimulatedSupervisorIo::set_faults`], and the RT loop reads them non-blockingly.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSupervisorIo {
    inputs: Arc<AtomicU16>,
    faults: Arc<AtomicU16>,
}

impl SimulatedSupervisorIo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_inputs(&self, bits: u16) {
        self.inputs.store(bits, Ordering::Relaxed);
    }

    pub fn set_faults(&self, bits: u16) {
        self.faults.store(bits, Ordering::Relaxed);
    }
}

impl SupervisorIo for SimulatedSupervisorIo {
    fn read_digital_inputs(&mut self) -> u16 {
        self.inputs.load(Ordering::Relaxed)
    }

    fn read_fault_bits(&mut self) -> u16 {
        self.faults.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_io_reflects_last_set_bits() {
        let mut io = SimulatedSupervisorIo::new();
        io.set_inputs(0b101);
        io.set_faults(0b10);
        assert_eq!(io.read_digital_inputs(), 0b101);
        assert_eq!(io.read_fault_bits(), 0b10);
    }
}
