//! The four JTAG signal lines as seen by the shift engine.
use thiserror::Error;

/// TCK, TMS and TDI outputs plus the TDO input.
///
/// Acquiring the lines is the job of a backend's constructor and releasing them is done on
/// drop. Neither operation may fail halfway through a shift, so implementations absorb line
/// errors: a failed write leaves the line as it was and a failed read yields `false`.
pub trait JtagLines {
    /// Drives TCK, TMS and TDI to the given levels.
    fn write(&mut self, tck: bool, tms: bool, tdi: bool);

    /// Samples TDO.
    fn read(&mut self) -> bool;
}

#[derive(Debug, Error)]
pub enum LineError {
    #[cfg(target_os = "linux")]
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    #[error("GPIO {0} is assigned to more than one JTAG signal")]
    Duplicate(u8),
    #[error("GPIO lines are not supported on this platform")]
    Unsupported,
}

/// GPIO numbers of the four JTAG signals.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinePins {
    pub tck: u8,
    pub tms: u8,
    pub tdi: u8,
    pub tdo: u8,
}

impl Default for LinePins {
    /// The SPI0 pins of the Raspberry Pi header (BCM numbering).
    fn default() -> Self {
        LinePins {
            tck: 11,
            tms: 25,
            tdi: 10,
            tdo: 9,
        }
    }
}

impl LinePins {
    /// Checks that no GPIO is used for two signals.
    pub fn validate(&self) -> Result<(), LineError> {
        let pins = [self.tck, self.tms, self.tdi, self.tdo];
        for (i, pin) in pins.iter().enumerate() {
            if pins[i + 1..].contains(pin) {
                return Err(LineError::Duplicate(*pin));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for LinePins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TMS=GPIO{}, TDI=GPIO{}, TCK=GPIO{}, TDO=GPIO{}",
            self.tms, self.tdi, self.tck, self.tdo
        )
    }
}
