//! GPIO-backed `SupervisorIo`, behind the `hardware` feature. Each digital input/fault bit
//! is wired to one `rppal` input pin; `read_digital_inputs`/`read_fault_bits` pack the
//! configured pins into a bitmask in a single non-blocking pass, grounded on this crate's
//! prior `HX711`/stepper GPIO wiring style (`rppal::gpio::Gpio`/`InputPin`).

#![cfg(feature = "hardware")]

use regconv_traits::SupervisorIo;
use rppal::gpio::{Gpio, InputPin};

use crate::error::{HwError, Result};

/// Up to 16 digital-input pins and 16 fault pins, each contributing one bit (active-high)
/// to the corresponding bitmask.
pub struct GpioSupervisorIo {
    input_pins: Vec<InputPin>,
    fault_pins: Vec<InputPin>,
}

impl GpioSupervisorIo {
    /// Opens the given BCM pin numbers as inputs. `input_bcm_pins[i]` becomes bit `i` of
    /// `read_digital_inputs`; `fault_bcm_pins[i]` becomes bit `i` of `read_fault_bits`.
    pub fn new(input_bcm_pins: &[u8], fault_bcm_pins: &[u8]) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let open = |pins: &[u8]| -> Result<Vec<InputPin>> {
            pins.iter()
                .map(|&p| {
                    gpio.get(p)
                        .map(rppal::gpio::Pin::into_input)
                        .map_err(|e| HwError::Gpio(e.to_string()))
                })
                .collect()
        };
        Ok(Self {
            input_pins: open(input_bcm_pins)?,
            fault_pins: open(fault_bcm_pins)?,
        })
    }
}

impl SupervisorIo for GpioSupervisorIo {
    fn read_digital_inputs(&mut self) -> u16 {
        self.input_pins
            .iter()
            .enumerate()
            .fold(0u16, |acc, (i, pin)| if pin.is_high() { acc | (1 << i) } else { acc })
    }

    fn read_fault_bits(&mut self) -> u16 {
        self.fault_pins
            .iter()
            .enumerate()
            .fold(0u16, |acc, (i, pin)| if pin.is_high() { acc | (1 << i) } else { acc })
    }
}
