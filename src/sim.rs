//! Simulated ArduCAM module and in-memory file storage for host runs and tests.
//!
//! `SimArduCam` owns the shared module state. The handles it gives out (`SimSpi`, `SimCs`,
//! `SimI2c`, `SimDelay`) implement the embedded-hal traits so the real drivers run against it
//! unchanged.

use crate::arducam::bus::ArduCamBus;
use crate::arducam::ov5642;
use crate::arducam::profile::ImageFormat;
use crate::arducam::spi::{Mask, Register};
use crate::nvm::FileSink;
use core::convert::Infallible;
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::{i2c, spi};
use embedded_hal::digital::v2::OutputPin;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

/// Bus faults of the simulated module.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SimFault {
    #[error("bus disconnected")]
    Disconnected,
    #[error("no device at address {0:#04x}")]
    Nack(u8),
}

/// `ArduCamBus` wired to a `SimArduCam`.
pub type SimBus = ArduCamBus<SimSpi, SimCs, SimI2c>;

/// Position inside an SPI transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    Command,
    WriteValue(u8),
    ReadValue(u8),
    Burst,
    Done,
}

#[derive(Debug)]
struct SimState {
    registers: [u8; 256],
    chip_writes: Vec<(u8, u8)>,
    chip_reads: Vec<u8>,
    bursts: usize,
    sensor: BTreeMap<u16, u8>,
    sensor_writes: Vec<(u16, u8)>,
    sensor_pointer: u16,
    chip_id: u16,
    fifo: Vec<u8>,
    fifo_pos: usize,
    frames: VecDeque<Vec<u8>>,
    reported_length: Option<u32>,
    wiring_faults: u32,
    capture_latency: u32,
    latency_left: u32,
    capturing: bool,
    cap_done: bool,
    hang: bool,
    connected: bool,
    selected: bool,
    phase: Phase,
    delayed_ms: u64,
}

impl SimState {
    fn new() -> Self {
        SimState {
            registers: [0; 256],
            chip_writes: Vec::new(),
            chip_reads: Vec::new(),
            bursts: 0,
            sensor: BTreeMap::new(),
            sensor_writes: Vec::new(),
            sensor_pointer: 0,
            chip_id: ov5642::CHIP_ID,
            fifo: Vec::new(),
            fifo_pos: 0,
            frames: VecDeque::new(),
            reported_length: None,
            wiring_faults: 0,
            capture_latency: 0,
            latency_left: 0,
            capturing: false,
            cap_done: false,
            hang: false,
            connected: true,
            selected: false,
            phase: Phase::Idle,
            delayed_ms: 0,
        }
    }

    fn fifo_length(&self) -> u32 {
        self.reported_length.unwrap_or(self.fifo.len() as u32)
    }

    fn clock(&mut self, byte: u8) -> u8 {
        match self.phase {
            Phase::Idle | Phase::Done => 0x00,
            Phase::Command => {
                self.phase = if byte & 0x80 != 0 {
                    Phase::WriteValue(byte & 0x7F)
                } else if byte == Register::BURST_FIFO_READ {
                    self.bursts += 1;
                    Phase::Burst
                } else {
                    Phase::ReadValue(byte)
                };
                0x00
            }
            Phase::WriteValue(reg) => {
                self.write_register(reg, byte);
                self.phase = Phase::Done;
                0x00
            }
            Phase::ReadValue(reg) => {
                self.phase = Phase::Done;
                self.chip_reads.push(reg);
                self.read_register(reg)
            }
            Phase::Burst => self.next_fifo_byte(),
        }
    }

    fn next_fifo_byte(&mut self) -> u8 {
        // Past the end the FIFO reads as zero
        let byte = self.fifo.get(self.fifo_pos).copied().unwrap_or(0x00);
        self.fifo_pos += 1;
        byte
    }

    fn write_register(&mut self, reg: u8, val: u8) {
        self.chip_writes.push((reg, val));
        self.registers[usize::from(reg)] = val;

        if reg == Register::FIFO {
            if val & Mask::FIFO_CLEAR != 0 {
                self.cap_done = false;
                self.capturing = false;
            }
            if val & Mask::FIFO_START != 0 {
                self.fifo = self.frames.pop_front().unwrap_or_default();
                self.fifo_pos = 0;
                self.capturing = true;
                self.latency_left = self.capture_latency;
            }
        }
    }

    fn read_register(&mut self, reg: u8) -> u8 {
        match reg {
            Register::TEST1 if self.wiring_faults > 0 => {
                self.wiring_faults -= 1;
                0x00
            }
            Register::TRIG => {
                if self.capturing && !self.hang {
                    if self.latency_left == 0 {
                        self.cap_done = true;
                        self.capturing = false;
                    } else {
                        self.latency_left -= 1;
                    }
                }
                if self.cap_done {
                    Mask::CAP_DONE
                } else {
                    0x00
                }
            }
            Register::FIFO_SIZE1 => self.fifo_length().to_le_bytes()[0],
            Register::FIFO_SIZE2 => self.fifo_length().to_le_bytes()[1],
            Register::FIFO_SIZE3 => self.fifo_length().to_le_bytes()[2],
            Register::SINGLE_FIFO_READ => self.next_fifo_byte(),
            Register::REV => 0x73,
            _ => self.registers[usize::from(reg)],
        }
    }

    fn read_sensor(&self, reg: u16) -> u8 {
        match (self.sensor.get(&reg), reg) {
            (Some(&val), _) => val,
            (None, ov5642::Register::CHIP_ID_HIGH) => self.chip_id.to_be_bytes()[0],
            (None, ov5642::Register::CHIP_ID_LOW) => self.chip_id.to_be_bytes()[1],
            (None, _) => 0x00,
        }
    }
}

/// A simulated ArduCAM OV5642 plus module.
#[derive(Clone, Debug)]
pub struct SimArduCam {
    state: Rc<RefCell<SimState>>,
}

impl Default for SimArduCam {
    fn default() -> Self {
        Self::new()
    }
}

impl SimArduCam {
    /// A connected module with an OV5642 and an empty FIFO.
    pub fn new() -> Self {
        SimArduCam {
            state: Rc::new(RefCell::new(SimState::new())),
        }
    }

    /// Put `bytes` in the FIFO right away, without a capture.
    pub fn with_fifo(self, bytes: &[u8]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.fifo = bytes.to_vec();
            state.fifo_pos = 0;
        }
        self
    }

    /// Queue a frame, loaded into the FIFO by the next capture start. A start with nothing
    /// queued leaves the FIFO empty.
    pub fn with_frame(self, bytes: &[u8]) -> Self {
        self.state.borrow_mut().frames.push_back(bytes.to_vec());
        self
    }

    /// Report `length` in the FIFO size registers regardless of the FIFO contents.
    pub fn with_reported_length(self, length: u32) -> Self {
        self.state.borrow_mut().reported_length = Some(length);
        self
    }

    /// The first `reads` loopback reads return zero.
    pub fn with_wiring_faults(self, reads: u32) -> Self {
        self.state.borrow_mut().wiring_faults = reads;
        self
    }

    pub fn with_chip_id(self, chip_id: u16) -> Self {
        self.state.borrow_mut().chip_id = chip_id;
        self
    }

    /// Capture-done reads low `polls` times after each start.
    pub fn with_capture_latency(self, polls: u32) -> Self {
        self.state.borrow_mut().capture_latency = polls;
        self
    }

    /// Captures never complete.
    pub fn hang_capture(self) -> Self {
        self.state.borrow_mut().hang = true;
        self
    }

    /// Every following SPI and I2C transfer fails.
    pub fn disconnect(&self) {
        self.state.borrow_mut().connected = false;
    }

    pub fn spi(&self) -> SimSpi {
        SimSpi {
            state: Rc::clone(&self.state),
        }
    }

    pub fn cs(&self) -> SimCs {
        SimCs {
            state: Rc::clone(&self.state),
        }
    }

    pub fn i2c(&self) -> SimI2c {
        SimI2c {
            state: Rc::clone(&self.state),
            address: ov5642::ADDRESS,
        }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay {
            state: Rc::clone(&self.state),
        }
    }

    /// The module's buses, ready for a `Camera`.
    pub fn bus(&self) -> SimBus {
        match ArduCamBus::new(self.spi(), self.cs(), self.i2c(), ov5642::ADDRESS) {
            Ok(bus) => bus,
            // Only the chip select is touched, and it cannot fail
            Err(e) => unreachable!("simulated bus setup failed: {:?}", e),
        }
    }

    /// Last value written to an ArduChip register.
    pub fn register(&self, reg: u8) -> u8 {
        self.state.borrow().registers[usize::from(reg)]
    }

    /// All ArduChip register writes in order.
    pub fn chip_writes(&self) -> Vec<(u8, u8)> {
        self.state.borrow().chip_writes.clone()
    }

    /// Number of writes to an ArduChip register.
    pub fn writes_to(&self, reg: u8) -> usize {
        self.state
            .borrow()
            .chip_writes
            .iter()
            .filter(|&&(r, _)| r == reg)
            .count()
    }

    /// Whether the chip select is asserted.
    pub fn selected(&self) -> bool {
        self.state.borrow().selected
    }

    /// Last value written to a sensor register, if any.
    pub fn sensor_register(&self, reg: u16) -> Option<u8> {
        self.state.borrow().sensor.get(&reg).copied()
    }

    /// All sensor register writes in order.
    pub fn sensor_writes(&self) -> Vec<(u16, u8)> {
        self.state.borrow().sensor_writes.clone()
    }

    /// Output format the sensor was last configured for.
    pub fn format(&self) -> Option<ImageFormat> {
        match self.state.borrow().sensor.get(&0x4300) {
            Some(0x18) => Some(ImageFormat::Jpeg),
            Some(0x61) => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    /// Total simulated delay so far.
    pub fn delayed_ms(&self) -> u64 {
        self.state.borrow().delayed_ms
    }

    /// ArduChip registers read, in order.
    pub fn chip_reads(&self) -> Vec<u8> {
        self.state.borrow().chip_reads.clone()
    }

    /// Burst read commands issued so far.
    pub fn burst_reads(&self) -> usize {
        self.state.borrow().bursts
    }

    /// FIFO bytes clocked out since the last capture start.
    pub fn fifo_bytes_read(&self) -> usize {
        self.state.borrow().fifo_pos
    }
}

/// SPI bus to the ArduChip.
#[derive(Debug)]
pub struct SimSpi {
    state: Rc<RefCell<SimState>>,
}

impl spi::Transfer<u8> for SimSpi {
    type Error = SimFault;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], SimFault> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(SimFault::Disconnected);
        }
        for word in words.iter_mut() {
            *word = state.clock(*word);
        }
        Ok(words)
    }
}

impl spi::Write<u8> for SimSpi {
    type Error = SimFault;

    fn write(&mut self, words: &[u8]) -> Result<(), SimFault> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(SimFault::Disconnected);
        }
        for &word in words {
            state.clock(word);
        }
        Ok(())
    }
}

/// ArduChip chip select.
#[derive(Debug)]
pub struct SimCs {
    state: Rc<RefCell<SimState>>,
}

impl OutputPin for SimCs {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        let mut state = self.state.borrow_mut();
        state.selected = true;
        state.phase = Phase::Command;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut state = self.state.borrow_mut();
        state.selected = false;
        state.phase = Phase::Idle;
        Ok(())
    }
}

/// I2C bus to the sensor.
#[derive(Debug)]
pub struct SimI2c {
    state: Rc<RefCell<SimState>>,
    address: u8,
}

impl SimI2c {
    fn check(&self, state: &SimState, address: u8) -> Result<(), SimFault> {
        if !state.connected {
            Err(SimFault::Disconnected)
        } else if address != self.address {
            Err(SimFault::Nack(address))
        } else {
            Ok(())
        }
    }
}

impl i2c::Write for SimI2c {
    type Error = SimFault;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), SimFault> {
        let mut state = self.state.borrow_mut();
        self.check(&state, address)?;

        match *bytes {
            [hi, lo] => state.sensor_pointer = u16::from_be_bytes([hi, lo]),
            [hi, lo, val] => {
                let reg = u16::from_be_bytes([hi, lo]);
                state.sensor.insert(reg, val);
                state.sensor_writes.push((reg, val));
            }
            _ => {}
        }
        Ok(())
    }
}

impl i2c::Read for SimI2c {
    type Error = SimFault;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), SimFault> {
        let mut state = self.state.borrow_mut();
        self.check(&state, address)?;

        for byte in buffer.iter_mut() {
            *byte = state.read_sensor(state.sensor_pointer);
            state.sensor_pointer = state.sensor_pointer.wrapping_add(1);
        }
        Ok(())
    }
}

/// Delay source that only counts.
#[derive(Debug)]
pub struct SimDelay {
    state: Rc<RefCell<SimState>>,
}

impl DelayMs<u32> for SimDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.state.borrow_mut().delayed_ms += u64::from(ms);
    }
}

/// A JPEG-shaped frame of exactly `len` bytes (at least 4): SOI, payload, EOI. Payload bytes
/// are never 0xFF so no marker appears inside.
pub fn synthetic_jpeg(len: usize, seed: u32) -> Vec<u8> {
    let payload = len.saturating_sub(4);
    let mut frame = Vec::with_capacity(payload + 4);
    frame.extend_from_slice(&[0xFF, 0xD8]);

    let mut x = seed;
    for _ in 0..payload {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        frame.push(((x >> 16) % 0xFF) as u8);
    }

    frame.extend_from_slice(&[0xFF, 0xD9]);
    frame
}

/// State of a file in a `MemorySink`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileStatus {
    Open,
    Closed,
    Discarded,
}

/// A file in a `MemorySink`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryFile {
    pub name: String,
    pub data: Vec<u8>,
    /// Length of each write call.
    pub chunks: Vec<usize>,
    pub status: FileStatus,
}

/// `MemorySink` errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum MemoryError {
    #[error("open refused")]
    OpenRefused,
    #[error("write refused")]
    WriteRefused,
    #[error("file {0} is not open")]
    NotOpen(usize),
}

/// Keeps every file in memory, including discarded ones.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Vec<MemoryFile>,
    refuse_opens: u32,
    refuse_writes: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` opens.
    pub fn refuse_opens(&mut self, count: u32) {
        self.refuse_opens = count;
    }

    /// Fail every write from now on.
    pub fn refuse_writes(&mut self) {
        self.refuse_writes = true;
    }

    /// Every file ever opened, in open order.
    pub fn files(&self) -> &[MemoryFile] {
        &self.files
    }

    /// Closed files only.
    pub fn saved(&self) -> impl Iterator<Item = &MemoryFile> {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Closed)
    }

    fn open_file(&mut self, handle: usize) -> Result<&mut MemoryFile, MemoryError> {
        match self.files.get_mut(handle) {
            Some(file) if file.status == FileStatus::Open => Ok(file),
            _ => Err(MemoryError::NotOpen(handle)),
        }
    }
}

impl FileSink for MemorySink {
    type Error = MemoryError;
    type Handle = usize;

    fn open(&mut self, name: &str) -> Result<usize, MemoryError> {
        if self.refuse_opens > 0 {
            self.refuse_opens -= 1;
            return Err(MemoryError::OpenRefused);
        }
        self.files.push(MemoryFile {
            name: name.to_string(),
            data: Vec::new(),
            chunks: Vec::new(),
            status: FileStatus::Open,
        });
        Ok(self.files.len() - 1)
    }

    fn write(&mut self, handle: &mut usize, bytes: &[u8]) -> Result<(), MemoryError> {
        if self.refuse_writes {
            return Err(MemoryError::WriteRefused);
        }
        let file = self.open_file(*handle)?;
        file.data.extend_from_slice(bytes);
        file.chunks.push(bytes.len());
        Ok(())
    }

    fn close(&mut self, handle: usize) -> Result<(), MemoryError> {
        self.open_file(handle)?.status = FileStatus::Closed;
        Ok(())
    }

    fn discard(&mut self, handle: usize) -> Result<(), MemoryError> {
        self.open_file(handle)?.status = FileStatus::Discarded;
        Ok(())
    }
}
