//! Implements the byte source backed by the live memory of another process.
//!
//! Access goes through `/proc/<pid>/mem`, so this source is only functional on Linux.
//! The whole 64-bit address space is addressable and unmapped regions surface as short
//! reads, mirroring how the kernel exposes the target's mappings.

use std::{fs::OpenOptions, io, sync::OnceLock};

use positioned_io::{RandomAccessFile, ReadAt as _, WriteAt as _};
use tracing::debug;

use crate::{
    error::{SourceError, SourceResult},
    position::Position,
    source::{ByteSource, clamped_len},
    span::Span,
};

/// The page granularity of process memory.
const PAGE_SIZE: u64 = 4096;

/// The raw `EIO` code, returned when the starting page of an access is not mapped.
const EIO: i32 = 5;
/// The raw `EINVAL` code, returned for offsets the kernel cannot address.
const EINVAL: i32 = 22;
/// The raw `ESRCH` code, returned when the target process is gone.
const ESRCH: i32 = 3;

/// Construction options for a process-backed source.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// The name of the source, `process-<pid>` if absent.
    pub name: Option<String>,
    /// Whether writes to the target process are rejected.
    pub read_only: bool,
    /// Whether the memory is assumed to change without notice.
    pub volatile: bool,
}

impl Default for ProcessOptions {
    fn default() -> ProcessOptions {
        ProcessOptions {
            name: None,
            read_only: false,
            volatile: true,
        }
    }
}

/// A byte source over the live memory of another process.
///
/// The target is not validated at construction time. The handle to its memory opens
/// lazily on first access, and a target that is gone or inaccessible surfaces there as
/// [`SourceError::InvalidHandle`] or [`SourceError::AccessDenied`].
#[derive(Debug)]
pub struct ProcessSource {
    /// The id of the target process.
    pid: u32,
    /// The name of the source.
    name: String,
    /// Whether writes are rejected.
    read_only: bool,
    /// Whether the memory is assumed to change without notice.
    volatile: bool,
    /// The lazily opened handle to the memory of the target.
    mem: OnceLock<RandomAccessFile>,
}

impl ProcessSource {
    /// Creates a source for the process with the given id.
    pub(crate) fn new(pid: u32, options: ProcessOptions) -> ProcessSource {
        let name = options.name.unwrap_or_else(|| format!("process-{pid}"));

        ProcessSource {
            pid,
            name,
            read_only: options.read_only,
            volatile: options.volatile,
            mem: OnceLock::new(),
        }
    }

    /// The id of the target process.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The handle to the memory of the target, opened on first use.
    ///
    /// A failed open is not remembered; the next access tries again.
    fn mem(&self) -> SourceResult<&RandomAccessFile> {
        if let Some(mem) = self.mem.get() {
            return Ok(mem);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(!self.read_only)
            .open(format!("/proc/{}/mem", self.pid))
            .map_err(|error| self.access_error(error))?;
        let mem = RandomAccessFile::try_new(file).map_err(SourceError::Io)?;

        debug!(pid = self.pid, read_only = self.read_only, "opened process memory");

        // A concurrent open may have won the race; the extra handle is just dropped.
        Ok(self.mem.get_or_init(|| mem))
    }

    /// Maps an I/O error on `/proc/<pid>/mem` to a source error.
    fn access_error(&self, error: io::Error) -> SourceError {
        if error.raw_os_error() == Some(ESRCH) {
            return SourceError::InvalidHandle { pid: self.pid };
        }

        match error.kind() {
            io::ErrorKind::NotFound => SourceError::InvalidHandle { pid: self.pid },
            io::ErrorKind::PermissionDenied => SourceError::AccessDenied { pid: self.pid },
            _ => SourceError::Io(error),
        }
    }
}

impl ByteSource for ProcessSource {
    fn span(&self) -> Span {
        Span::FULL
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn is_volatile(&self) -> bool {
        self.volatile
    }

    fn page_size(&self) -> u64 {
        PAGE_SIZE
    }

    fn read_at<'buf>(
        &self,
        position: Position,
        buf: &'buf mut [u8],
    ) -> SourceResult<&'buf [u8]> {
        let span = self.span();
        if !span.contains(position) {
            return Err(SourceError::OutOfRange {
                name: self.name.clone(),
                position,
            });
        }

        let mem = self.mem()?;
        let output_size = clamped_len(span, position, buf.len());

        match mem.read_at(position.as_u64(), &mut buf[..output_size]) {
            // The kernel stops at the first unreadable page, so this already is the
            // longest valid prefix.
            Ok(filled) => Ok(&buf[..filled]),
            // The starting page itself is unreadable: the valid prefix is empty.
            Err(error) if matches!(error.raw_os_error(), Some(EIO | EINVAL)) => Ok(&buf[..0]),
            Err(error) => Err(self.access_error(error)),
        }
    }

    fn write_at(&mut self, position: Position, bytes: &[u8]) -> SourceResult<usize> {
        if self.read_only {
            return Err(SourceError::ReadOnly {
                name: self.name.clone(),
            });
        }

        let span = self.span();
        if !span.contains(position) {
            return Err(SourceError::OutOfRange {
                name: self.name.clone(),
                position,
            });
        }

        self.mem()?;
        let mem = self.mem.get_mut().expect("the handle was just opened");
        let input_size = clamped_len(span, position, bytes.len());

        match mem.write_at(position.as_u64(), &bytes[..input_size]) {
            Ok(written) => Ok(written),
            // The starting page itself is unwritable: the valid prefix is empty.
            Err(error) if matches!(error.raw_os_error(), Some(EIO | EINVAL)) => Ok(0),
            Err(error) => Err(self.access_error(error)),
        }
    }
}
