//! Streaming JPEG framer for the module FIFO.
//!
//! The FIFO holds whatever the sensor produced for one capture, which may include filler before
//! the start-of-image marker and trailing bytes after the end-of-image marker. Bytes are
//! examined one at a time against the byte before them, so nothing beyond a `ChunkBuffer` is ever
//! held in memory.

use crate::chunk_buf::{ChunkBuffer, ChunkSink};

/// First byte of every JPEG marker.
pub const MARKER: u8 = 0xFF;

/// Start-of-image marker code.
pub const SOI: u8 = 0xD8;

/// End-of-image marker code.
pub const EOI: u8 = 0xD9;

/// A byte stream read out of a device FIFO.
pub trait FifoSource {
    type Error;

    /// Prepare for sequential reads.
    fn begin_burst(&mut self) -> Result<(), Self::Error>;

    /// Consume the next FIFO byte.
    fn read_fifo(&mut self) -> Result<u8, Self::Error>;

    /// Release the stream after the last read.
    fn end_burst(&mut self) -> Result<(), Self::Error>;
}

/// Framer state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParserState {
    /// No start-of-image seen yet, bytes are dropped.
    Searching,
    /// Inside a frame, bytes are kept.
    InFrame,
    /// End-of-image seen and everything flushed. Further bytes are ignored.
    Complete,
}

/// How a drain ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Framed {
    /// A whole frame was written to the sink.
    Complete {
        /// Bytes written, both markers included.
        frame_len: u32,
        /// FIFO bytes consumed, including those before the frame.
        bytes_read: u32,
    },
    /// The byte budget ran out before an end-of-image marker.
    Exhausted {
        /// FIFO bytes consumed, always the full budget.
        bytes_read: u32,
        /// `Searching` if no frame ever started, `InFrame` if it was cut short.
        state: ParserState,
    },
}

/// Drain errors.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum StreamError<S, W> {
    /// Reading the FIFO failed.
    #[error("fifo read failed: {0:?}")]
    Source(S),
    /// Writing a chunk failed.
    #[error("chunk write failed: {0:?}")]
    Sink(W),
}

/// Byte-at-a-time SOI/EOI detector with an `N` byte staging buffer.
#[derive(Clone, Debug)]
pub struct JpegFramer<const N: usize> {
    state: ParserState,
    previous: u8,
    buffer: ChunkBuffer<N>,
}

impl<const N: usize> Default for JpegFramer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> JpegFramer<N> {
    /// Creates a framer in the `Searching` state with an empty buffer.
    pub fn new() -> Self {
        JpegFramer {
            state: ParserState::Searching,
            previous: 0x00,
            buffer: ChunkBuffer::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Bytes kept so far, both flushed and pending.
    pub fn frame_len(&self) -> u32 {
        self.buffer.total()
    }

    /// Process one FIFO byte and return the state after it.
    ///
    /// An `FF D9` pair only ends a frame once an `FF D8` pair has opened one. When the frame
    /// ends the remaining buffer is flushed; closing the artifact is up to the caller.
    pub fn feed<W: ChunkSink>(&mut self, byte: u8, sink: &mut W) -> Result<ParserState, W::Error> {
        let previous = self.previous;
        self.previous = byte;

        match self.state {
            ParserState::Searching => {
                if previous == MARKER && byte == SOI {
                    self.buffer.push(previous, sink)?;
                    self.buffer.push(byte, sink)?;
                    self.state = ParserState::InFrame;
                }
            }
            ParserState::InFrame => {
                self.buffer.push(byte, sink)?;
                if previous == MARKER && byte == EOI {
                    self.buffer.flush(sink)?;
                    self.state = ParserState::Complete;
                }
            }
            ParserState::Complete => {}
        }

        Ok(self.state)
    }
}

/// Read at most `budget` bytes from `source` and write the first frame found to `sink`.
///
/// Reading stops right after the end-of-image marker; any bytes left in the FIFO are not
/// consumed. The budget is a hard bound whatever the framer state. The burst is released before
/// every chunk write and re-armed before the next read, so the sink may share the source's bus.
pub fn stream_frame<S, W, const N: usize>(
    source: &mut S,
    budget: u32,
    sink: &mut W,
) -> Result<Framed, StreamError<S::Error, W::Error>>
where
    S: FifoSource,
    W: ChunkSink,
{
    let mut framer = JpegFramer::<N>::new();
    let mut remaining = budget;
    let mut burst = Burst {
        source,
        sink,
        armed: false,
    };

    let drained = drain(&mut framer, &mut burst, &mut remaining);
    let released = burst.release();

    // A drain error wins over a failure to release the stream
    drained?;
    released?;

    let bytes_read = budget - remaining;
    match framer.state() {
        ParserState::Complete => Ok(Framed::Complete {
            frame_len: framer.frame_len(),
            bytes_read,
        }),
        state => Ok(Framed::Exhausted { bytes_read, state }),
    }
}

/// FIFO source and chunk sink taking turns on one bus.
struct Burst<'a, S, W> {
    source: &'a mut S,
    sink: &'a mut W,
    armed: bool,
}

impl<S: FifoSource, W: ChunkSink> Burst<'_, S, W> {
    fn read(&mut self) -> Result<u8, StreamError<S::Error, W::Error>> {
        if !self.armed {
            self.source.begin_burst().map_err(StreamError::Source)?;
            self.armed = true;
        }
        self.source.read_fifo().map_err(StreamError::Source)
    }

    fn release(&mut self) -> Result<(), StreamError<S::Error, W::Error>> {
        if !self.armed {
            return Ok(());
        }
        self.armed = false;
        self.source.end_burst().map_err(StreamError::Source)
    }
}

impl<S: FifoSource, W: ChunkSink> ChunkSink for Burst<'_, S, W> {
    type Error = StreamError<S::Error, W::Error>;

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), Self::Error> {
        self.release()?;
        self.sink.write_chunk(chunk).map_err(StreamError::Sink)
    }
}

fn drain<S, W, const N: usize>(
    framer: &mut JpegFramer<N>,
    burst: &mut Burst<'_, S, W>,
    remaining: &mut u32,
) -> Result<(), StreamError<S::Error, W::Error>>
where
    S: FifoSource,
    W: ChunkSink,
{
    while *remaining > 0 {
        *remaining -= 1;
        let byte = burst.read()?;
        if framer.feed(byte, burst)? == ParserState::Complete {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_buf::CHUNK_SIZE;

    /// FIFO backed by a byte slice, counting reads.
    struct SliceFifo<'a> {
        data: &'a [u8],
        pos: usize,
        bursting: bool,
        bursts: usize,
    }

    impl<'a> SliceFifo<'a> {
        fn new(data: &'a [u8]) -> Self {
            SliceFifo {
                data,
                pos: 0,
                bursting: false,
                bursts: 0,
            }
        }
    }

    impl FifoSource for SliceFifo<'_> {
        type Error = ();

        fn begin_burst(&mut self) -> Result<(), ()> {
            assert!(!self.bursting, "burst already armed");
            self.bursting = true;
            self.bursts += 1;
            Ok(())
        }

        fn read_fifo(&mut self) -> Result<u8, ()> {
            assert!(self.bursting, "read outside of a burst");
            // Past the end the hardware returns stale data, model it as zero
            let byte = self.data.get(self.pos).copied().unwrap_or(0x00);
            self.pos += 1;
            Ok(byte)
        }

        fn end_burst(&mut self) -> Result<(), ()> {
            self.bursting = false;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Chunks(Vec<Vec<u8>>);

    impl Chunks {
        fn joined(&self) -> Vec<u8> {
            self.0.concat()
        }
    }

    impl ChunkSink for Chunks {
        type Error = ();

        fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ()> {
            self.0.push(chunk.to_vec());
            Ok(())
        }
    }

    fn frame(payload_len: usize) -> Vec<u8> {
        let mut bytes = vec![MARKER, SOI];
        bytes.extend((0..payload_len).map(|i| (i % 251) as u8));
        bytes.extend([MARKER, EOI]);
        bytes
    }

    #[test]
    fn extracts_frame_and_stops_after_eoi() {
        let input = [0x00, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0x99];
        let mut fifo = SliceFifo::new(&input);
        let mut out = Chunks::default();

        let framed = stream_frame::<_, _, CHUNK_SIZE>(&mut fifo, 8, &mut out).unwrap();

        assert_eq!(out.joined(), vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        assert_eq!(
            framed,
            Framed::Complete {
                frame_len: 6,
                bytes_read: 7
            }
        );
        // Trailing 0x99 stays in the FIFO
        assert_eq!(fifo.pos, 7);
        assert!(!fifo.bursting);
    }

    #[test]
    fn drops_bytes_before_soi() {
        let mut input = vec![0x12, 0xFF, 0x00, 0xFF, 0xFF, 0x34];
        let body = frame(10);
        input.extend(&body);
        let mut fifo = SliceFifo::new(&input);
        let mut out = Chunks::default();

        stream_frame::<_, _, CHUNK_SIZE>(&mut fifo, input.len() as u32, &mut out).unwrap();
        assert_eq!(out.joined(), body);
    }

    #[test]
    fn chunking_reconstructs_payload_for_any_capacity() {
        let body = frame(1000);
        let mut input = vec![0xAA; 3];
        input.extend(&body);
        input.extend([0x55; 5]);
        let budget = input.len() as u32;

        let mut one = Chunks::default();
        stream_frame::<_, _, 1>(&mut SliceFifo::new(&input), budget, &mut one).unwrap();
        assert!(one.0.iter().all(|c| c.len() == 1));
        assert_eq!(one.joined(), body);

        let mut std_size = Chunks::default();
        stream_frame::<_, _, CHUNK_SIZE>(&mut SliceFifo::new(&input), budget, &mut std_size)
            .unwrap();
        assert!(std_size.0.iter().all(|c| c.len() <= CHUNK_SIZE));
        assert_eq!(std_size.0[0].len(), CHUNK_SIZE);
        assert_eq!(std_size.joined(), body);

        let mut large = Chunks::default();
        stream_frame::<_, _, 4096>(&mut SliceFifo::new(&input), budget, &mut large).unwrap();
        assert_eq!(large.0.len(), 1);
        assert_eq!(large.joined(), body);
    }

    #[test]
    fn eoi_on_full_buffer_does_not_overflow() {
        // SOI + 253 payload bytes + FF leaves the buffer full when D9 arrives
        let body = frame(253);
        let mut out = Chunks::default();
        let framed =
            stream_frame::<_, _, CHUNK_SIZE>(&mut SliceFifo::new(&body), body.len() as u32, &mut out)
                .unwrap();

        assert_eq!(out.0.len(), 2);
        assert_eq!(out.0[0].len(), CHUNK_SIZE);
        assert_eq!(out.0[1], vec![EOI]);
        assert_eq!(out.joined(), body);
        assert!(matches!(framed, Framed::Complete { frame_len: 257, .. }));
    }

    #[test]
    fn budget_exhaustion_mid_frame_is_not_complete() {
        let body = frame(600);
        let budget = 300;
        let mut fifo = SliceFifo::new(&body);
        let mut out = Chunks::default();

        let framed = stream_frame::<_, _, CHUNK_SIZE>(&mut fifo, budget, &mut out).unwrap();

        assert_eq!(
            framed,
            Framed::Exhausted {
                bytes_read: budget,
                state: ParserState::InFrame
            }
        );
        // The budget bounds the reads even though the FIFO holds more
        assert_eq!(fifo.pos, budget as usize);
    }

    #[test]
    fn budget_is_honoured_when_fifo_runs_dry() {
        let mut fifo = SliceFifo::new(&[0xFF, 0xD8, 0x01]);
        let mut out = Chunks::default();
        let framed = stream_frame::<_, _, CHUNK_SIZE>(&mut fifo, 50, &mut out).unwrap();
        assert!(matches!(framed, Framed::Exhausted { bytes_read: 50, .. }));
        assert_eq!(fifo.pos, 50);
    }

    #[test]
    fn eoi_while_searching_is_ignored() {
        let input = [0xFF, 0xD9, 0x00, 0xFF, 0xD9, 0x10];
        let mut out = Chunks::default();
        let framed =
            stream_frame::<_, _, CHUNK_SIZE>(&mut SliceFifo::new(&input), 6, &mut out).unwrap();

        assert_eq!(
            framed,
            Framed::Exhausted {
                bytes_read: 6,
                state: ParserState::Searching
            }
        );
        assert!(out.0.is_empty());
    }

    #[test]
    fn eoi_before_soi_then_valid_frame() {
        let mut input = vec![0xFF, 0xD9];
        let body = frame(4);
        input.extend(&body);
        let mut out = Chunks::default();
        stream_frame::<_, _, CHUNK_SIZE>(
            &mut SliceFifo::new(&input),
            input.len() as u32,
            &mut out,
        )
        .unwrap();
        assert_eq!(out.joined(), body);
    }

    #[test]
    fn zero_budget_reads_nothing() {
        let mut fifo = SliceFifo::new(&[0xFF, 0xD8]);
        let mut out = Chunks::default();
        let framed = stream_frame::<_, _, CHUNK_SIZE>(&mut fifo, 0, &mut out).unwrap();
        assert_eq!(
            framed,
            Framed::Exhausted {
                bytes_read: 0,
                state: ParserState::Searching
            }
        );
        assert_eq!(fifo.pos, 0);
        assert_eq!(fifo.bursts, 0);
    }

    #[test]
    fn burst_is_released_around_each_chunk_write() {
        let body = frame(1000);
        let mut fifo = SliceFifo::new(&body);
        let mut out = Chunks::default();

        stream_frame::<_, _, CHUNK_SIZE>(&mut fifo, body.len() as u32, &mut out).unwrap();

        // One burst to start, one after each chunk written mid-frame
        assert_eq!(out.0.len(), 4);
        assert_eq!(fifo.bursts, 4);
        assert!(!fifo.bursting);
        assert_eq!(out.joined(), body);
    }

    #[test]
    fn complete_framer_ignores_further_bytes() {
        let mut framer = JpegFramer::<8>::new();
        let mut out = Chunks::default();
        for b in [0xFF, 0xD8, 0xFF, 0xD9] {
            framer.feed(b, &mut out).unwrap();
        }
        assert_eq!(framer.feed(0xFF, &mut out), Ok(ParserState::Complete));
        assert_eq!(framer.feed(0xD8, &mut out), Ok(ParserState::Complete));
        assert_eq!(out.joined(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn sink_failure_is_reported() {
        struct Refuse;
        impl ChunkSink for Refuse {
            type Error = u8;
            fn write_chunk(&mut self, _chunk: &[u8]) -> Result<(), u8> {
                Err(7)
            }
        }

        let body = frame(10);
        let result = stream_frame::<_, _, 4>(&mut SliceFifo::new(&body), 20, &mut Refuse);
        assert_eq!(result, Err(StreamError::Sink(7)));
    }
}
