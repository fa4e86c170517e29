//! Implements the construction entry points for byte sources.
//!
//! These functions are the only way to obtain a source; the backend types have no
//! public constructors of their own.

use std::path::PathBuf;

use tracing::debug;

use crate::{
    cached::CachedSource,
    error::SourceResult,
    source::{ByteSource, MemSource, ProcessOptions, ProcessSource},
};

/// Loads the file at the given path into an in-memory source.
///
/// The whole file is read eagerly; on failure no partially loaded source exists.
pub fn open_file(path: impl Into<PathBuf>, read_only: bool) -> SourceResult<MemSource> {
    let path = path.into();
    let bytes = std::fs::read(&path)?;

    debug!(path = %path.display(), len = bytes.len(), read_only, "loaded file source");

    Ok(MemSource::new(
        bytes.into(),
        path.display().to_string(),
        read_only,
    ))
}

/// Creates a read-write source over the given bytes.
///
/// Any byte sequence is valid, including an empty one.
pub fn from_bytes(bytes: impl Into<Box<[u8]>>, name: impl Into<String>) -> MemSource {
    MemSource::new(bytes.into(), name.into(), false)
}

/// Creates a source over the live memory of the process with the given id.
///
/// The target is not validated here; an unusable id surfaces as an error on first read
/// or write.
pub fn attach_process(pid: u32, options: ProcessOptions) -> ProcessSource {
    debug!(pid, "attached process source");

    ProcessSource::new(pid, options)
}

/// Wraps the given source in a page-granular read cache.
///
/// The cache takes exclusive ownership; the source must not be accessed through any
/// other path afterwards.
pub fn cached<S: ByteSource>(source: S) -> CachedSource<S> {
    CachedSource::new(source)
}

/// Creates a cached source over the live memory of the process with the given id.
pub fn attach_process_cached(pid: u32, options: ProcessOptions) -> CachedSource<ProcessSource> {
    cached(attach_process(pid, options))
}
