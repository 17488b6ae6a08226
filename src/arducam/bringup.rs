//! One-time bring-up: wiring loopback, CPLD reset and sensor identity.

use super::bus::Registers;
use super::capture::{Camera, DeviceError};
use super::ov5642;
use super::spi::{Mask, Register, TEST_PATTERN};
use crate::config::IdentityPolicy;
use crate::jpeg::FifoSource;
use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info, warn};

/// How far bring-up got.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum DeviceState {
    /// Nothing checked yet.
    Unverified,
    /// The loopback register reads back, the CPLD has been reset.
    WiringConfirmed,
    /// The sensor chip ID matched.
    IdentityConfirmed,
}

/// Result of the chip ID check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Identity {
    /// The expected sensor answered.
    Confirmed,
    /// Something else answered, allowed by `IdentityPolicy::Warn`.
    Mismatch { chip_id: u16 },
}

impl<B, D, E> Camera<B, D>
where
    B: Registers<Error = E> + FifoSource<Error = E>,
    D: DelayMs<u32>,
{
    /// Run the whole bring-up sequence: wiring check, CPLD reset, identity check.
    pub fn bring_up(&mut self) -> Result<Identity, DeviceError<E>> {
        self.check_wiring()?;
        self.reset_cpld()?;
        self.check_identity()
    }

    /// Write the test pattern to the loopback register until it reads back, at most
    /// `wiring_attempts` times.
    pub fn check_wiring(&mut self) -> Result<(), DeviceError<E>> {
        let attempts = self.config.wiring_attempts;
        let mut last = 0x00;

        for attempt in 1..=attempts {
            self.bus
                .write_reg(Register::TEST1, TEST_PATTERN)
                .map_err(DeviceError::Bus)?;
            // Delay is needed after writing the register to reflect it
            self.delay.delay_ms(self.config.timing.register_settle_ms);
            last = self
                .bus
                .read_reg(Register::TEST1)
                .map_err(DeviceError::Bus)?;
            debug!("test register read {:#04x} (attempt {})", last, attempt);

            if last == TEST_PATTERN {
                info!("SPI interface OK.");
                if self.state < DeviceState::WiringConfirmed {
                    self.state = DeviceState::WiringConfirmed;
                }
                return Ok(());
            }
            warn!("SPI interface Error!");
        }

        Err(DeviceError::Wiring { attempts, last })
    }

    /// Pulse the CPLD reset line, needed on plus series modules.
    pub fn reset_cpld(&mut self) -> Result<(), DeviceError<E>> {
        let hold = self.config.timing.cpld_reset_ms;
        self.bus
            .write_reg(Register::CPLD_RESET, Mask::CPLD_RESET)
            .map_err(DeviceError::Bus)?;
        self.delay.delay_ms(hold);
        self.bus
            .write_reg(Register::CPLD_RESET, 0x00)
            .map_err(DeviceError::Bus)?;
        self.delay.delay_ms(hold);
        Ok(())
    }

    /// Read the sensor chip ID and compare it against the OV5642.
    ///
    /// A mismatch is an error under `IdentityPolicy::Require` and a warning under
    /// `IdentityPolicy::Warn`. Requires a confirmed wiring.
    pub fn check_identity(&mut self) -> Result<Identity, DeviceError<E>> {
        if self.state < DeviceState::WiringConfirmed {
            return Err(DeviceError::NotReady);
        }

        self.bus
            .write_sensor_reg(ov5642::Register::PAGE_SELECT, ov5642::SENSOR_PAGE)
            .map_err(DeviceError::Bus)?;
        let vid = self
            .bus
            .read_sensor_reg(ov5642::Register::CHIP_ID_HIGH)
            .map_err(DeviceError::Bus)?;
        let pid = self
            .bus
            .read_sensor_reg(ov5642::Register::CHIP_ID_LOW)
            .map_err(DeviceError::Bus)?;
        let chip_id = u16::from_be_bytes([vid, pid]);

        if chip_id == ov5642::CHIP_ID {
            info!("OV5642 detected");
            self.state = DeviceState::IdentityConfirmed;
            return Ok(Identity::Confirmed);
        }

        warn!("Can't find OV5642 module! chip id {:#06x}", chip_id);
        match self.config.identity {
            IdentityPolicy::Require => Err(DeviceError::UnknownSensor { chip_id }),
            IdentityPolicy::Warn => Ok(Identity::Mismatch { chip_id }),
        }
    }
}
