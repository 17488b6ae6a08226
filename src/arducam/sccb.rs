//! A generic driver for the Serial Camera Control Bus on OmniVision sensors with 16-bit register
//! addresses (OV5642 and friends). Works with any microcontroller implementing the embedded-hal
//! I2C interface.

use embedded_hal::blocking::i2c;

/// SCCB driver.
pub struct Sccb<I2C> {
    /// I2C bus the sensor is on.
    i2c: I2C,
    /// Device I2C address.
    address: u8,
}

/// SCCB errors.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum SccbError<E> {
    /// I2C write error.
    #[error("i2c write failed: {0:?}")]
    I2cWrite(E),
    /// I2C read error.
    #[error("i2c read failed: {0:?}")]
    I2cRead(E),
}

impl<I2C, E> Sccb<I2C>
where
    I2C: i2c::Read<Error = E> + i2c::Write<Error = E>,
{
    /// Creates a new SCCB driver for the sensor at `address` (7-bit).
    pub fn new(i2c: I2C, address: u8) -> Self {
        Sccb { i2c, address }
    }

    /// I2C read wrapper for mapping `E --> SccbError`.
    fn i2c_read(&mut self, buf: &mut [u8]) -> Result<(), SccbError<E>> {
        self.i2c.read(self.address, buf).map_err(SccbError::I2cRead)
    }

    /// I2C write wrapper for mapping `E --> SccbError`.
    fn i2c_write(&mut self, buf: &[u8]) -> Result<(), SccbError<E>> {
        self.i2c.write(self.address, buf).map_err(SccbError::I2cWrite)
    }

    /// Read a register, must be two seperate transactions and we can't use `WriteRead`.
    pub fn read_register(&mut self, reg: u16) -> Result<u8, SccbError<E>> {
        // Write the address
        self.i2c_write(&reg.to_be_bytes())?;

        // Read the value
        let mut buf = [0x00];
        self.i2c_read(&mut buf)?;

        Ok(buf[0])
    }

    /// Write a register.
    pub fn write_register(&mut self, reg: u16, val: u8) -> Result<(), SccbError<E>> {
        let [hi, lo] = reg.to_be_bytes();
        self.i2c_write(&[hi, lo, val])
    }

    /// Apply a register table in order.
    pub fn apply_config(&mut self, table: &[(u16, u8)]) -> Result<(), SccbError<E>> {
        for &(reg, val) in table {
            self.write_register(reg, val)?;
        }

        Ok(())
    }
}
