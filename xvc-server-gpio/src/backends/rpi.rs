//! # Raspberry Pi Backend
//!
//! Drives the JTAG signals through the GPIO header of a Raspberry Pi using `rppal`.
//! Pins are addressed by BCM number.
//!
//! ## Example Usage
//!
//! ```ignore
//! use xvc_server_gpio::{backends::rpi::RpiLines, engine::BitBang, lines::LinePins};
//! use xvc_server::server::{Config, Server};
//!
//! let lines = RpiLines::acquire(&LinePins::default())?;
//! let mut server = Server::new(BitBang::new(lines, 40), Config::default());
//! server.listen("0.0.0.0:2542", &shutdown)?;
//! ```
use rppal::gpio::{Gpio, InputPin, Level, OutputPin};

use crate::lines::{JtagLines, LineError, LinePins};

fn level(high: bool) -> Level {
    if high { Level::High } else { Level::Low }
}

/// The four JTAG lines on the GPIO header.
///
/// Dropping the value releases the pins and restores their previous modes.
pub struct RpiLines {
    tck: OutputPin,
    tms: OutputPin,
    tdi: OutputPin,
    tdo: InputPin,
}

impl RpiLines {
    /// Claims the pins: TDO as input, TDI and TCK as outputs starting low, TMS as output
    /// starting high. The lines are then put in the rest state.
    pub fn acquire(pins: &LinePins) -> Result<RpiLines, LineError> {
        pins.validate()?;
        let gpio = Gpio::new()?;
        log::debug!("GPIO opened successfully");

        let tdo = gpio.get(pins.tdo)?.into_input();
        let tdi = gpio.get(pins.tdi)?.into_output_low();
        let tck = gpio.get(pins.tck)?.into_output_low();
        let tms = gpio.get(pins.tms)?.into_output_high();
        log::info!("GPIO lines configured: {}", pins);

        let mut lines = RpiLines { tck, tms, tdi, tdo };
        lines.write(false, true, false);
        Ok(lines)
    }
}

impl JtagLines for RpiLines {
    fn write(&mut self, tck: bool, tms: bool, tdi: bool) {
        self.tck.write(level(tck));
        self.tms.write(level(tms));
        self.tdi.write(level(tdi));
    }

    fn read(&mut self) -> bool {
        self.tdo.is_high()
    }
}

impl Drop for RpiLines {
    fn drop(&mut self) {
        log::debug!("Releasing GPIO lines");
    }
}
