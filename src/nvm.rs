//! Abstraction layer for writing frames to non-volatile storage as numbered files.

use crate::chunk_buf::ChunkSink;
use core::fmt::Write as _;
use heapless::String;

/// Fixed-capacity file name, e.g. `jpss0003.jpg`.
pub type FileName = String<32>;

/// Any storage medium that implements this trait can receive captured frames.
pub trait FileSink {
    type Error;
    type Handle;

    /// Create (or truncate) the file called `name`.
    fn open(&mut self, name: &str) -> Result<Self::Handle, Self::Error>;

    /// Append `bytes` to an open file.
    fn write(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Finish a complete file.
    fn close(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;

    /// Drop a partially written file so it is never mistaken for a complete one.
    fn discard(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;
}

/// Errors from `FileNamer::open_next`.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum OpenError<E> {
    /// Every counter value has been used, opening another file would reuse a name.
    #[error("file counter exhausted")]
    Exhausted,
    /// The sink refused to open the file.
    #[error("open failed: {0:?}")]
    Sink(E),
}

/// Sequential file naming: `prefix` + 4-digit counter + `.` + `extension`.
///
/// The counter belongs to whoever owns the `FileNamer` and only moves when a file was actually
/// opened. It never wraps: after `u16::MAX` no further names are handed out.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileNamer {
    prefix: String<16>,
    extension: String<8>,
    /// `None` once the counter has run out.
    next: Option<u16>,
}

impl FileNamer {
    /// Initialize the namer. Overlong `prefix`/`extension` values are truncated.
    pub fn new(prefix: &str, extension: &str, first: u16) -> Self {
        FileNamer {
            prefix: truncated(prefix),
            extension: truncated(extension),
            next: Some(first),
        }
    }

    /// Counter value the next opened file will get, `None` once exhausted.
    pub fn next_index(&self) -> Option<u16> {
        self.next
    }

    /// Name the next opened file will get, `None` once exhausted.
    pub fn peek(&self) -> Option<FileName> {
        let index = self.next?;
        let mut name = FileName::new();
        // Prefix and extension are capped at 16 + 8, the counter at 5 digits, so this fits
        let _ = write!(name, "{}{:04}.{}", self.prefix, index, self.extension);
        Some(name)
    }

    /// Open the next file in the sequence. The counter advances only if `open` succeeds.
    pub fn open_next<F: FileSink>(
        &mut self,
        sink: &mut F,
    ) -> Result<(FileName, F::Handle), OpenError<F::Error>> {
        let index = self.next.ok_or(OpenError::Exhausted)?;
        let name = self.peek().ok_or(OpenError::Exhausted)?;
        let handle = sink.open(&name).map_err(OpenError::Sink)?;
        self.next = index.checked_add(1);
        Ok((name, handle))
    }
}

fn truncated<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Adapts one open file to the chunk interface used by the framer.
pub struct FileWriter<'a, F: FileSink> {
    sink: &'a mut F,
    handle: &'a mut F::Handle,
}

impl<'a, F: FileSink> FileWriter<'a, F> {
    pub fn new(sink: &'a mut F, handle: &'a mut F::Handle) -> Self {
        FileWriter { sink, handle }
    }
}

impl<F: FileSink> ChunkSink for FileWriter<'_, F> {
    type Error = F::Error;

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), Self::Error> {
        self.sink.write(self.handle, chunk)
    }
}

#[cfg(feature = "std")]
pub use dir::{DirFile, DirSink};

#[cfg(feature = "std")]
mod dir {
    use super::FileSink;
    use log::warn;
    use std::fs::{self, File};
    use std::io::{self, BufWriter, Write};
    use std::path::{Path, PathBuf};

    /// Files in a single fixed directory, the way the SD card is used on the board.
    #[derive(Clone, Debug)]
    pub struct DirSink {
        dir: PathBuf,
    }

    /// An open file in a `DirSink`.
    #[derive(Debug)]
    pub struct DirFile {
        writer: BufWriter<File>,
        path: PathBuf,
    }

    impl DirSink {
        /// Use `dir` for output, creating it if needed.
        pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
            let dir = dir.into();
            fs::create_dir_all(&dir)?;
            Ok(DirSink { dir })
        }

        pub fn dir(&self) -> &Path {
            &self.dir
        }
    }

    impl FileSink for DirSink {
        type Error = io::Error;
        type Handle = DirFile;

        fn open(&mut self, name: &str) -> io::Result<DirFile> {
            let path = self.dir.join(name);
            let file = File::create(&path)?;
            Ok(DirFile {
                writer: BufWriter::new(file),
                path,
            })
        }

        fn write(&mut self, handle: &mut DirFile, bytes: &[u8]) -> io::Result<()> {
            handle.writer.write_all(bytes)
        }

        fn close(&mut self, handle: DirFile) -> io::Result<()> {
            let DirFile { writer, path } = handle;
            let finished = writer
                .into_inner()
                .map_err(|e| e.into_error())
                .and_then(|file| file.sync_all());
            remove_unless_ok(&path, finished)
        }

        fn discard(&mut self, handle: DirFile) -> io::Result<()> {
            let DirFile { writer, path } = handle;
            drop(writer);
            fs::remove_file(path)
        }
    }

    /// A file that failed to close may be truncated, so it does not keep its final name.
    pub(super) fn remove_unless_ok(path: &Path, finished: io::Result<()>) -> io::Result<()> {
        if finished.is_err() && fs::remove_file(path).is_err() {
            warn!("could not remove {}", path.display());
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::MemorySink;

    #[test]
    fn names_are_zero_padded() {
        let namer = FileNamer::new("jpss", "jpg", 0);
        assert_eq!(namer.peek().unwrap().as_str(), "jpss0000.jpg");
        let namer = FileNamer::new("img", "jpg", 42);
        assert_eq!(namer.peek().unwrap().as_str(), "img0042.jpg");
    }

    #[test]
    fn counter_advances_once_per_opened_file() {
        let mut sink = MemorySink::new();
        let mut namer = FileNamer::new("jpss", "jpg", 7);

        let (first, _) = namer.open_next(&mut sink).unwrap();
        sink.refuse_opens(1);
        assert!(matches!(namer.open_next(&mut sink), Err(OpenError::Sink(_))));
        let (second, _) = namer.open_next(&mut sink).unwrap();

        assert_eq!(first.as_str(), "jpss0007.jpg");
        assert_eq!(second.as_str(), "jpss0008.jpg");
        assert_eq!(namer.next_index(), Some(9));
    }

    #[test]
    fn counter_stops_instead_of_wrapping() {
        let mut sink = MemorySink::new();
        let mut namer = FileNamer::new("jpss", "jpg", u16::MAX);

        let (last, _) = namer.open_next(&mut sink).unwrap();
        assert_eq!(last.as_str(), "jpss65535.jpg");
        assert_eq!(namer.next_index(), None);
        assert_eq!(namer.peek(), None);

        assert!(matches!(namer.open_next(&mut sink), Err(OpenError::Exhausted)));
        // Nothing opened, so no earlier file can be overwritten
        assert_eq!(sink.files().len(), 1);
    }

    #[test]
    fn long_prefix_is_truncated() {
        let namer = FileNamer::new("a_very_long_prefix_indeed", "jpeg_extension", 1);
        assert_eq!(namer.peek().unwrap().as_str(), "a_very_long_pref0001.jpeg_ext");
    }

    #[cfg(feature = "std")]
    #[test]
    fn dir_sink_close_and_discard() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = DirSink::new(tmp.path().join("sd")).unwrap();

        let mut done = sink.open("jpss0000.jpg").unwrap();
        sink.write(&mut done, &[0xFF, 0xD8]).unwrap();
        sink.write(&mut done, &[0xFF, 0xD9]).unwrap();
        sink.close(done).unwrap();

        let mut partial = sink.open("jpss0001.jpg").unwrap();
        sink.write(&mut partial, &[0xFF, 0xD8, 0x00]).unwrap();
        sink.discard(partial).unwrap();

        let saved = std::fs::read(sink.dir().join("jpss0000.jpg")).unwrap();
        assert_eq!(saved, vec![0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(!sink.dir().join("jpss0001.jpg").exists());
    }

    #[cfg(feature = "std")]
    #[test]
    fn failed_close_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let kept = tmp.path().join("jpss0000.jpg");
        let broken = tmp.path().join("jpss0001.jpg");
        std::fs::write(&kept, [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        std::fs::write(&broken, [0xFF, 0xD8]).unwrap();

        assert!(dir::remove_unless_ok(&kept, Ok(())).is_ok());
        let err = dir::remove_unless_ok(&broken, Err(std::io::Error::other("sync failed")));

        assert_eq!(err.unwrap_err().to_string(), "sync failed");
        assert!(kept.exists());
        assert!(!broken.exists());
    }
}
