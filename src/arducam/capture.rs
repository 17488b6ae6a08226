//! Capture sequencing: trigger, wait for completion and drain the FIFO into a file.

use super::bringup::DeviceState;
use super::bus::Registers;
use super::spi::{Mask, Register};
use crate::chunk_buf::CHUNK_SIZE;
use crate::config::Config;
use crate::jpeg::{self, FifoSource, Framed, ParserState, StreamError};
use crate::nvm::{FileName, FileNamer, FileSink, FileWriter, OpenError};
use embedded_hal::blocking::delay::DelayMs;
use log::{info, warn};

/// Device level errors.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum DeviceError<E> {
    /// Register transport error.
    #[error("bus error: {0:?}")]
    Bus(E),
    /// The loopback test register never read back correctly.
    #[error("wiring check failed after {attempts} attempts, last read {last:#04x}")]
    Wiring { attempts: u32, last: u8 },
    /// Chip ID mismatch with `IdentityPolicy::Require`.
    #[error("unexpected sensor chip id {chip_id:#06x}")]
    UnknownSensor { chip_id: u16 },
    /// Capture-done never set.
    #[error("capture not done after {polls} polls")]
    CaptureTimeout { polls: u32 },
    /// The module reported an empty FIFO.
    #[error("fifo is empty")]
    EmptyFifo,
    /// Capture attempted before the wiring was confirmed.
    #[error("device not brought up")]
    NotReady,
}

/// Errors from a single capture.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum CaptureError<E, F> {
    /// Device or bus failure.
    #[error("{0}")]
    Device(DeviceError<E>),
    /// The output file could not be opened. Nothing was written.
    #[error("open file failed: {0:?}")]
    SinkOpen(F),
    /// The file counter has used every value. Nothing was opened.
    #[error("no file names left")]
    NamesExhausted,
    /// Writing or closing the output file failed.
    #[error("file write failed: {0:?}")]
    SinkWrite(F),
    /// The FIFO byte count ran out before an end-of-image marker. The file was discarded.
    #[error("incomplete frame in {name} after {bytes_read} bytes")]
    IncompleteFrame {
        name: FileName,
        bytes_read: u32,
        /// Whether a start-of-image marker was seen at all.
        found_start: bool,
    },
}

impl<E, F> From<DeviceError<E>> for CaptureError<E, F> {
    fn from(e: DeviceError<E>) -> Self {
        CaptureError::Device(e)
    }
}

impl<E, F> CaptureError<E, F> {
    /// Whether a run should go on to the next capture after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CaptureError::SinkOpen(_)
                | CaptureError::IncompleteFrame { .. }
                | CaptureError::Device(DeviceError::CaptureTimeout { .. })
                | CaptureError::Device(DeviceError::EmptyFifo)
        )
    }
}

/// A frame saved to a file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SavedFrame {
    pub name: FileName,
    /// Bytes in the file.
    pub frame_len: u32,
    /// FIFO length reported by the module.
    pub fifo_len: u32,
    /// FIFO bytes consumed.
    pub bytes_read: u32,
}

/// Outcome counts of `Camera::run`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub requested: u32,
    pub saved: u32,
    pub failed: u32,
}

/// ArduCAM camera: bus, delay source, configuration and the file counter.
pub struct Camera<B, D> {
    pub(super) bus: B,
    pub(super) delay: D,
    pub(super) config: Config,
    pub(super) state: DeviceState,
    namer: FileNamer,
}

impl<B, D, E> Camera<B, D>
where
    B: Registers<Error = E> + FifoSource<Error = E>,
    D: DelayMs<u32>,
{
    /// Creates a camera in the `Unverified` state. Call `bring_up` and `configure` before
    /// capturing.
    pub fn new(bus: B, delay: D, config: Config) -> Self {
        let namer = FileNamer::new(
            &config.file_prefix,
            &config.file_extension,
            config.first_index,
        );
        Camera {
            bus,
            delay,
            config,
            state: DeviceState::Unverified,
            namer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Counter value the next opened file will get, `None` once every name is used.
    pub fn next_file_index(&self) -> Option<u16> {
        self.namer.next_index()
    }

    /// Give back the bus and delay.
    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    /// Flush the FIFO, start a capture and wait for it. Returns the reported FIFO length.
    pub fn trigger(&mut self) -> Result<u32, DeviceError<E>> {
        self.bus.flush_fifo().map_err(DeviceError::Bus)?;
        self.bus.clear_fifo_flag().map_err(DeviceError::Bus)?;
        self.bus.start_capture().map_err(DeviceError::Bus)?;
        info!("Start Capture");

        self.wait_capture_done()?;
        info!("Capture Done.");

        let length = self.bus.fifo_length().map_err(DeviceError::Bus)?;
        info!("The fifo length is : {}", length);
        Ok(length)
    }

    fn wait_capture_done(&mut self) -> Result<(), DeviceError<E>> {
        let polls = self.config.capture_polls;
        for _ in 0..polls {
            if self
                .bus
                .get_bit(Register::TRIG, Mask::CAP_DONE)
                .map_err(DeviceError::Bus)?
            {
                return Ok(());
            }
            self.delay.delay_ms(self.config.timing.poll_interval_ms);
        }

        warn!("capture not done after {} polls", polls);
        Err(DeviceError::CaptureTimeout { polls })
    }

    /// Take one picture into the next numbered file of `sink`.
    ///
    /// On success the file holds exactly one JPEG frame. On any error after the file was
    /// opened the file is discarded. The file counter advances once per opened file.
    pub fn capture<F: FileSink>(
        &mut self,
        sink: &mut F,
    ) -> Result<SavedFrame, CaptureError<E, F::Error>> {
        if self.state == DeviceState::Unverified {
            return Err(DeviceError::NotReady.into());
        }

        self.prepare_capture()?;
        let result = self.acquire(sink);
        let restored = self.restore_idle();

        // A capture error wins over a failure to restore the idle format
        let saved = result?;
        restored?;
        Ok(saved)
    }

    fn acquire<F: FileSink>(
        &mut self,
        sink: &mut F,
    ) -> Result<SavedFrame, CaptureError<E, F::Error>> {
        let fifo_len = self.trigger()?;
        if fifo_len == 0 {
            warn!("fifo is empty, nothing to save");
            return Err(DeviceError::EmptyFifo.into());
        }

        let (name, mut handle) = match self.namer.open_next(sink) {
            Ok(opened) => opened,
            Err(OpenError::Exhausted) => {
                warn!("file counter exhausted, not overwriting earlier files");
                return Err(CaptureError::NamesExhausted);
            }
            Err(OpenError::Sink(e)) => {
                warn!("open file failed");
                self.delay.delay_ms(self.config.timing.open_failure_ms);
                return Err(CaptureError::SinkOpen(e));
            }
        };
        info!("file opened: {}", name);

        let streamed = {
            let mut writer = FileWriter::new(sink, &mut handle);
            jpeg::stream_frame::<_, _, CHUNK_SIZE>(&mut self.bus, fifo_len, &mut writer)
        };

        match streamed {
            Ok(Framed::Complete {
                frame_len,
                bytes_read,
            }) => {
                sink.close(handle).map_err(CaptureError::SinkWrite)?;
                info!("Image save OK. {} ({} bytes)", name, frame_len);
                Ok(SavedFrame {
                    name,
                    frame_len,
                    fifo_len,
                    bytes_read,
                })
            }
            Ok(Framed::Exhausted { bytes_read, state }) => {
                warn!("no end of image in {} bytes, discarding {}", bytes_read, name);
                discard(sink, handle);
                Err(CaptureError::IncompleteFrame {
                    name,
                    bytes_read,
                    found_start: state == ParserState::InFrame,
                })
            }
            Err(StreamError::Source(e)) => {
                discard(sink, handle);
                Err(DeviceError::Bus(e).into())
            }
            Err(StreamError::Sink(e)) => {
                discard(sink, handle);
                Err(CaptureError::SinkWrite(e))
            }
        }
    }

    /// Take `captures` pictures in a row. Recoverable failures are counted and the run goes
    /// on; anything else ends the run.
    pub fn run<F: FileSink>(
        &mut self,
        sink: &mut F,
        captures: u32,
    ) -> Result<RunSummary, CaptureError<E, F::Error>>
    where
        E: core::fmt::Debug,
        F::Error: core::fmt::Debug,
    {
        let mut summary = RunSummary {
            requested: captures,
            ..RunSummary::default()
        };

        for count in 0..captures {
            info!("=====  Take {} =====", count);
            match self.capture(sink) {
                Ok(_) => summary.saved += 1,
                Err(e) if e.is_recoverable() => {
                    warn!("capture {} failed: {}", count, e);
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "all sequence finished: {} saved, {} failed",
            summary.saved, summary.failed
        );
        Ok(summary)
    }
}

fn discard<F: FileSink>(sink: &mut F, handle: F::Handle) {
    if sink.discard(handle).is_err() {
        warn!("could not discard partial file");
    }
}
