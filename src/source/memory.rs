//! Implements the byte source backed by bytes held in memory.

use crate::{
    error::{SourceError, SourceResult},
    position::{Len, Position},
    source::{ByteSource, clamped_len},
    span::Span,
};

/// A byte source over bytes held in memory.
///
/// Both raw byte sequences and files use this source: files are loaded eagerly and in
/// full when the source is constructed, so no file handle stays open afterwards.
#[derive(Debug)]
pub struct MemSource {
    /// The name of the source.
    name: String,
    /// The bytes of the source.
    bytes: Box<[u8]>,
    /// Whether writes are rejected.
    read_only: bool,
}

impl MemSource {
    /// Creates a source over the given bytes.
    pub(crate) fn new(bytes: Box<[u8]>, name: String, read_only: bool) -> MemSource {
        MemSource {
            name,
            bytes,
            read_only,
        }
    }
}

impl ByteSource for MemSource {
    fn span(&self) -> Span {
        Span::new(
            Position::ZERO,
            Len::from(
                u64::try_from(self.bytes.len())
                    .expect("non `u64`-fitting length would not fit into memory"),
            ),
        )
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn is_volatile(&self) -> bool {
        false
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

        let offset = usize::try_from(position.as_u64()).expect("offset does not fit into `usize`");
        let output_size = clamped_len(span, position, buf.len());
        let truncated_buf = &mut buf[..output_size];

        truncated_buf.copy_from_slice(&self.bytes[offset..offset + output_size]);

        Ok(truncated_buf)
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

        let offset = usize::try_from(position.as_u64()).expect("offset does not fit into `usize`");
        let input_size = clamped_len(span, position, bytes.len());

        self.bytes[offset..offset + input_size].copy_from_slice(&bytes[..input_size]);

        Ok(input_size)
    }
}
