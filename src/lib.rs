//! Implements addressable, cacheable views over raw byte sources.
//!
//! A [`ByteSource`] is the minimal read/write contract over one byte-addressable extent:
//! [`MemSource`] holds raw bytes or an eagerly loaded file, [`ProcessSource`] exposes
//! the live memory of another process. [`CachedSource`] wraps any source with a
//! page-granular read cache whose staleness is controlled exclusively through explicit
//! invalidation, since a volatile source may change behind the program's back.
//!
//! [`Position`]s and [`Span`]s cover the whole 64-bit address space, including `2^64` as
//! an exclusive end, and are the only addressing currency of this crate.
//!
//! Sources are constructed through the [`factory`] module.

#![forbid(unsafe_code)]

pub use cached::CachedSource;
pub use error::{SourceError, SourceResult};
pub use position::{Len, Position};
pub use source::{ByteSource, MemSource, ProcessOptions, ProcessSource};
pub use span::Span;

pub mod cached;
pub mod error;
pub mod factory;
pub mod position;
pub mod source;
pub mod span;
