//! Fixed-capacity staging buffer which hands full chunks to a sink.

use heapless::Vec;

/// Capacity of the chunk buffer used for FIFO drains.
pub const CHUNK_SIZE: usize = 256;

/// Anything that accepts the flushed chunks, in order.
pub trait ChunkSink {
    type Error;

    /// Write one chunk. Called with at most `N` bytes for a `ChunkBuffer<N>`.
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), Self::Error>;
}

/// `ChunkBuffer` collects bytes until it holds `N` of them, then writes them to a `ChunkSink` as
/// a single write. The capacity is never exceeded: a full buffer is flushed before the next byte
/// is stored. `N` must be at least 1, a zero capacity does not compile.
#[derive(Clone, Debug)]
pub struct ChunkBuffer<const N: usize> {
    /// Pending bytes, oldest first.
    bytes: Vec<u8, N>,

    /// Number of bytes handed to the sink so far.
    flushed: u32,
}

impl<const N: usize> Default for ChunkBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ChunkBuffer<N> {
    const NONZERO_CAPACITY: () = assert!(N > 0, "ChunkBuffer capacity must be at least 1");

    /// Creates an empty ChunkBuffer object.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NONZERO_CAPACITY;
        ChunkBuffer {
            bytes: Vec::new(),
            flushed: 0,
        }
    }

    /// Store `byte`, flushing the buffer first if it is already full.
    pub fn push<W: ChunkSink>(&mut self, byte: u8, sink: &mut W) -> Result<(), W::Error> {
        if self.bytes.is_full() {
            self.flush(sink)?;
        }

        // N > 0, so the buffer has room after the flush above
        if self.bytes.push(byte).is_err() {
            unreachable!("chunk buffer full after flush");
        }
        Ok(())
    }

    /// Write any pending bytes to `sink` in one write and empty the buffer.
    pub fn flush<W: ChunkSink>(&mut self, sink: &mut W) -> Result<(), W::Error> {
        if self.bytes.is_empty() {
            return Ok(());
        }

        sink.write_chunk(&self.bytes)?;
        self.flushed += self.bytes.len() as u32;
        self.bytes.clear();
        Ok(())
    }

    /// Number of bytes waiting for a flush.
    pub fn pending(&self) -> usize {
        self.bytes.len()
    }

    /// Total bytes stored so far, flushed or not.
    pub fn total(&self) -> u32 {
        self.flushed + self.bytes.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec as StdVec;

    #[derive(Default)]
    struct Chunks(StdVec<StdVec<u8>>);

    impl ChunkSink for Chunks {
        type Error = ();

        fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ()> {
            self.0.push(chunk.to_vec());
            Ok(())
        }
    }

    #[test]
    fn flushes_before_overflowing() {
        let mut buf = ChunkBuffer::<4>::new();
        let mut out = Chunks::default();

        for b in 0..10u8 {
            buf.push(b, &mut out).unwrap();
            assert!(buf.pending() <= 4);
        }
        assert_eq!(out.0, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]);
        assert_eq!(buf.pending(), 2);

        buf.flush(&mut out).unwrap();
        assert_eq!(out.0.last().unwrap(), &vec![8, 9]);
        assert_eq!(buf.total(), 10);
    }

    #[test]
    fn single_byte_capacity_keeps_every_byte() {
        let mut buf = ChunkBuffer::<1>::default();
        let mut out = Chunks::default();

        for b in [0xFF, 0xD8, 0x01, 0xFF, 0xD9] {
            buf.push(b, &mut out).unwrap();
            assert_eq!(buf.pending(), 1);
        }
        buf.flush(&mut out).unwrap();

        assert_eq!(out.0.concat(), vec![0xFF, 0xD8, 0x01, 0xFF, 0xD9]);
        assert!(out.0.iter().all(|c| c.len() == 1));
        assert_eq!(buf.total(), 5);
    }

    #[test]
    fn empty_flush_writes_nothing() {
        let mut buf = ChunkBuffer::<CHUNK_SIZE>::new();
        let mut out = Chunks::default();
        buf.flush(&mut out).unwrap();
        assert!(out.0.is_empty());
    }

    #[test]
    fn sink_error_keeps_pending_bytes() {
        struct Broken;
        impl ChunkSink for Broken {
            type Error = &'static str;
            fn write_chunk(&mut self, _chunk: &[u8]) -> Result<(), Self::Error> {
                Err("full")
            }
        }

        let mut buf = ChunkBuffer::<2>::new();
        buf.push(1, &mut Broken).unwrap();
        buf.push(2, &mut Broken).unwrap();
        assert_eq!(buf.push(3, &mut Broken), Err("full"));
        assert_eq!(buf.pending(), 2);
    }
}
