//! Register and FIFO access for the whole module: ArduChip over SPI plus the sensor over SCCB.

use super::sccb::{Sccb, SccbError};
use super::spi::{ArduChip, Mask, Register, SpiError, FIFO_LENGTH_MASK};
use crate::jpeg::FifoSource;
use embedded_hal::blocking::{i2c, spi};
use embedded_hal::digital::v2::OutputPin;

/// Register access needed by the capture sequence. Any transport implementing this (and
/// `FifoSource` with the same error) can drive a `Camera`.
pub trait Registers {
    type Error;

    /// Write an 8-bit ArduChip register.
    fn write_reg(&mut self, reg: u8, val: u8) -> Result<(), Self::Error>;

    /// Read an 8-bit ArduChip register.
    fn read_reg(&mut self, reg: u8) -> Result<u8, Self::Error>;

    /// Write a 16-bit addressed sensor register.
    fn write_sensor_reg(&mut self, reg: u16, val: u8) -> Result<(), Self::Error>;

    /// Read a 16-bit addressed sensor register.
    fn read_sensor_reg(&mut self, reg: u16) -> Result<u8, Self::Error>;

    /// Write a sensor register table in order.
    fn write_sensor_table(&mut self, table: &[(u16, u8)]) -> Result<(), Self::Error> {
        for &(reg, val) in table {
            self.write_sensor_reg(reg, val)?;
        }
        Ok(())
    }

    /// Test `mask` bits of a register.
    fn get_bit(&mut self, reg: u8, mask: u8) -> Result<bool, Self::Error> {
        Ok(self.read_reg(reg)? & mask != 0)
    }

    /// Discard the FIFO contents.
    fn flush_fifo(&mut self) -> Result<(), Self::Error> {
        self.write_reg(Register::FIFO, Mask::FIFO_CLEAR)
    }

    /// Clear the capture-done flag.
    fn clear_fifo_flag(&mut self) -> Result<(), Self::Error> {
        self.write_reg(Register::FIFO, Mask::FIFO_CLEAR)
    }

    /// Start a capture into the FIFO.
    fn start_capture(&mut self) -> Result<(), Self::Error> {
        self.write_reg(Register::FIFO, Mask::FIFO_START)
    }

    /// Number of bytes the module reports in the FIFO.
    fn fifo_length(&mut self) -> Result<u32, Self::Error> {
        let len1 = u32::from(self.read_reg(Register::FIFO_SIZE1)?);
        let len2 = u32::from(self.read_reg(Register::FIFO_SIZE2)?);
        let len3 = u32::from(self.read_reg(Register::FIFO_SIZE3)?);
        Ok(((len3 << 16) | (len2 << 8) | len1) & FIFO_LENGTH_MASK)
    }
}

/// Errors from either bus.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum BusError<E, P, I> {
    /// ArduChip (SPI) error.
    #[error("arduchip: {0}")]
    Chip(SpiError<E, P>),
    /// Sensor (SCCB) error.
    #[error("sensor: {0}")]
    Sensor(SccbError<I>),
}

impl<E, P, I> From<SpiError<E, P>> for BusError<E, P, I> {
    fn from(e: SpiError<E, P>) -> Self {
        BusError::Chip(e)
    }
}

impl<E, P, I> From<SccbError<I>> for BusError<E, P, I> {
    fn from(e: SccbError<I>) -> Self {
        BusError::Sensor(e)
    }
}

/// An ArduCAM module: ArduChip on SPI and the sensor on I2C.
pub struct ArduCamBus<SPI, CS, I2C> {
    chip: ArduChip<SPI, CS>,
    sensor: Sccb<I2C>,
}

impl<SPI, CS, I2C, E, P, I> ArduCamBus<SPI, CS, I2C>
where
    SPI: spi::Transfer<u8, Error = E> + spi::Write<u8, Error = E>,
    CS: OutputPin<Error = P>,
    I2C: i2c::Read<Error = I> + i2c::Write<Error = I>,
{
    /// Bind the module's buses. `sensor_address` is the 7-bit I2C address.
    pub fn new(
        spi: SPI,
        cs: CS,
        i2c: I2C,
        sensor_address: u8,
    ) -> Result<Self, BusError<E, P, I>> {
        Ok(ArduCamBus {
            chip: ArduChip::new(spi, cs)?,
            sensor: Sccb::new(i2c, sensor_address),
        })
    }
}

impl<SPI, CS, I2C, E, P, I> Registers for ArduCamBus<SPI, CS, I2C>
where
    SPI: spi::Transfer<u8, Error = E> + spi::Write<u8, Error = E>,
    CS: OutputPin<Error = P>,
    I2C: i2c::Read<Error = I> + i2c::Write<Error = I>,
{
    type Error = BusError<E, P, I>;

    fn write_reg(&mut self, reg: u8, val: u8) -> Result<(), Self::Error> {
        Ok(self.chip.write_register(reg, val)?)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Self::Error> {
        Ok(self.chip.read_register(reg)?)
    }

    fn write_sensor_reg(&mut self, reg: u16, val: u8) -> Result<(), Self::Error> {
        Ok(self.sensor.write_register(reg, val)?)
    }

    fn read_sensor_reg(&mut self, reg: u16) -> Result<u8, Self::Error> {
        Ok(self.sensor.read_register(reg)?)
    }

    fn write_sensor_table(&mut self, table: &[(u16, u8)]) -> Result<(), Self::Error> {
        Ok(self.sensor.apply_config(table)?)
    }
}

impl<SPI, CS, I2C, E, P, I> FifoSource for ArduCamBus<SPI, CS, I2C>
where
    SPI: spi::Transfer<u8, Error = E> + spi::Write<u8, Error = E>,
    CS: OutputPin<Error = P>,
    I2C: i2c::Read<Error = I> + i2c::Write<Error = I>,
{
    type Error = BusError<E, P, I>;

    fn begin_burst(&mut self) -> Result<(), Self::Error> {
        Ok(self.chip.begin_burst()?)
    }

    fn read_fifo(&mut self) -> Result<u8, Self::Error> {
        Ok(self.chip.burst_byte()?)
    }

    fn end_burst(&mut self) -> Result<(), Self::Error> {
        Ok(self.chip.end_burst()?)
    }
}
