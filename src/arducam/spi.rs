//! A generic driver for the ArduChip register interface on ArduCAM "plus" modules. The ArduChip
//! is a CPLD sitting between the SPI bus and the sensor: it holds the capture control registers
//! and the frame FIFO. Works with any microcontroller implementing the embedded-hal SPI and
//! output pin interfaces.

use embedded_hal::blocking::spi;
use embedded_hal::digital::v2::OutputPin;

/// ArduChip driver.
pub struct ArduChip<SPI, CS> {
    /// SPI bus, mode 0.
    spi: SPI,
    /// Chip select, active low.
    cs: CS,
}

/// ArduChip errors.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum SpiError<E, P> {
    /// SPI transfer error.
    #[error("spi transfer failed: {0:?}")]
    Transfer(E),
    /// Chip select pin error.
    #[error("chip select failed: {0:?}")]
    ChipSelect(P),
}

impl<SPI, CS, E, P> ArduChip<SPI, CS>
where
    SPI: spi::Transfer<u8, Error = E> + spi::Write<u8, Error = E>,
    CS: OutputPin<Error = P>,
{
    /// Creates a new ArduChip driver. The chip select is driven high (idle).
    pub fn new(spi: SPI, mut cs: CS) -> Result<Self, SpiError<E, P>> {
        cs.set_high().map_err(SpiError::ChipSelect)?;
        Ok(ArduChip { spi, cs })
    }

    fn select(&mut self) -> Result<(), SpiError<E, P>> {
        self.cs.set_low().map_err(SpiError::ChipSelect)
    }

    fn deselect(&mut self) -> Result<(), SpiError<E, P>> {
        self.cs.set_high().map_err(SpiError::ChipSelect)
    }

    /// Run `f` with the chip selected, always deselecting afterwards.
    fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut SPI) -> Result<T, E>,
    ) -> Result<T, SpiError<E, P>> {
        self.select()?;
        let result = f(&mut self.spi).map_err(SpiError::Transfer);
        let released = self.deselect();
        let value = result?;
        released?;
        Ok(value)
    }

    /// Write a register. The top address bit marks a write.
    pub fn write_register(&mut self, reg: u8, val: u8) -> Result<(), SpiError<E, P>> {
        self.transaction(|spi| spi.write(&[reg | WRITE_BIT, val]))
    }

    /// Read a register, the value is clocked out during the second byte.
    pub fn read_register(&mut self, reg: u8) -> Result<u8, SpiError<E, P>> {
        self.transaction(|spi| {
            let mut buf = [reg & !WRITE_BIT, 0x00];
            let out = spi.transfer(&mut buf)?;
            Ok(out[1])
        })
    }

    /// Select the chip and issue the burst read command. The chip stays selected until
    /// `end_burst`.
    pub fn begin_burst(&mut self) -> Result<(), SpiError<E, P>> {
        self.select()?;
        let mut cmd = [Register::BURST_FIFO_READ];
        if let Err(e) = self.spi.transfer(&mut cmd) {
            let _ = self.deselect();
            return Err(SpiError::Transfer(e));
        }
        Ok(())
    }

    /// Read one FIFO byte outside of a burst.
    pub fn read_fifo_single(&mut self) -> Result<u8, SpiError<E, P>> {
        self.read_register(Register::SINGLE_FIFO_READ)
    }

    /// Clock one byte out of the FIFO during a burst.
    pub fn burst_byte(&mut self) -> Result<u8, SpiError<E, P>> {
        let mut buf = [0x00];
        let out = self.spi.transfer(&mut buf).map_err(SpiError::Transfer)?;
        Ok(out[0])
    }

    /// Deselect the chip, ending a burst.
    pub fn end_burst(&mut self) -> Result<(), SpiError<E, P>> {
        self.deselect()
    }
}

/// Set in the address byte for register writes.
const WRITE_BIT: u8 = 0x80;

/// Usable bits of the 24-bit FIFO length.
pub const FIFO_LENGTH_MASK: u32 = 0x007F_FFFF;

/// ArduChip register addresses.
pub struct Register;

impl Register {
    // Loopback test register
    pub const TEST1: u8 = 0x00;

    // Number of frames per capture, minus one
    pub const CAPTURE_CTRL: u8 = 0x01;

    // Timing control
    pub const TIM: u8 = 0x03;

    // FIFO control
    pub const FIFO: u8 = 0x04;

    // CPLD reset on plus series modules
    pub const CPLD_RESET: u8 = 0x07;

    // FIFO read commands
    pub const BURST_FIFO_READ: u8 = 0x3C;
    pub const SINGLE_FIFO_READ: u8 = 0x3D;

    // Hardware revision
    pub const REV: u8 = 0x40;

    // Trigger source and status
    pub const TRIG: u8 = 0x41;

    // FIFO length, low byte first
    pub const FIFO_SIZE1: u8 = 0x42;
    pub const FIFO_SIZE2: u8 = 0x43;
    pub const FIFO_SIZE3: u8 = 0x44;
}

/// Register bit masks.
pub struct Mask;

impl Mask {
    // TIM
    pub const VSYNC_LEVEL: u8 = 0x02;

    // FIFO
    pub const FIFO_CLEAR: u8 = 0x01;
    pub const FIFO_START: u8 = 0x02;

    // TRIG
    pub const CAP_DONE: u8 = 0x08;

    // CPLD_RESET
    pub const CPLD_RESET: u8 = 0x80;
}

/// Value written to `TEST1` to check the wiring.
pub const TEST_PATTERN: u8 = 0x55;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimArduCam;

    #[test]
    fn register_write_then_read() {
        let sim = SimArduCam::new();
        let mut chip = ArduChip::new(sim.spi(), sim.cs()).unwrap();

        chip.write_register(Register::TEST1, TEST_PATTERN).unwrap();
        assert_eq!(chip.read_register(Register::TEST1), Ok(TEST_PATTERN));
        assert_eq!(sim.register(Register::TEST1), TEST_PATTERN);
    }

    #[test]
    fn burst_streams_fifo_bytes() {
        let sim = SimArduCam::new().with_fifo(&[0xFF, 0xD8, 0x42]);
        let mut chip = ArduChip::new(sim.spi(), sim.cs()).unwrap();

        chip.begin_burst().unwrap();
        assert!(sim.selected());
        let bytes = [
            chip.burst_byte().unwrap(),
            chip.burst_byte().unwrap(),
            chip.burst_byte().unwrap(),
        ];
        chip.end_burst().unwrap();

        assert_eq!(bytes, [0xFF, 0xD8, 0x42]);
        assert!(!sim.selected());
    }

    #[test]
    fn single_reads_share_the_fifo_position() {
        let sim = SimArduCam::new().with_fifo(&[0x11, 0x22, 0x33]);
        let mut chip = ArduChip::new(sim.spi(), sim.cs()).unwrap();

        assert_eq!(chip.read_fifo_single(), Ok(0x11));
        chip.begin_burst().unwrap();
        assert_eq!(chip.burst_byte(), Ok(0x22));
        chip.end_burst().unwrap();
        assert_eq!(chip.read_fifo_single(), Ok(0x33));
        assert!(!sim.selected());
    }

    #[test]
    fn transfer_error_releases_chip_select() {
        let sim = SimArduCam::new();
        let mut chip = ArduChip::new(sim.spi(), sim.cs()).unwrap();
        sim.disconnect();

        assert!(matches!(
            chip.read_register(Register::TEST1),
            Err(SpiError::Transfer(_))
        ));
        assert!(!sim.selected());
    }
}
