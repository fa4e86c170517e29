//! Implements the page-granular read cache around a byte source.

use std::{ops::Range, sync::Mutex};

use quick_cache::unsync::Cache;
use tracing::trace;

use crate::{
    error::{SourceError, SourceResult},
    position::{Len, Position},
    source::ByteSource,
    span::Span,
};

/// The page granularity used for sources that do not report one.
const DEFAULT_PAGE_LEN: u64 = 4096;
/// The smallest accepted page granularity.
const MIN_PAGE_LEN: u64 = 512;
/// The largest accepted page granularity.
const MAX_PAGE_LEN: u64 = 65_536;
/// The number of pages the cache holds at most.
const CACHED_PAGES: usize = 64;

/// One cached page of the underlying source.
struct Page {
    /// The buffered bytes of the page.
    data: Box<[u8]>,
    /// The range of `data` that was actually filled from the source.
    valid: Range<usize>,
}

impl Page {
    /// Copies what the page holds at `offset`, reporting whether it fell short of
    /// `room`.
    fn serve(&self, offset: usize, room: usize, dst: &mut [u8]) -> (usize, bool) {
        debug_assert!(self.valid.start <= offset || self.valid.is_empty());

        let avail = std::cmp::min(self.valid.end.saturating_sub(offset), room);
        dst[..avail].copy_from_slice(&self.data[offset..offset + avail]);

        (avail, avail < room)
    }
}

/// Wraps a byte source with a page-granular read cache.
///
/// The cache never refreshes itself: external changes to a volatile source become
/// visible only through [`CachedSource::invalidate`] or
/// [`CachedSource::invalidate_all`]. Writes through this wrapper drop the affected
/// pages themselves, so a read after a write always observes the written bytes.
///
/// The wrapped source is owned exclusively and must not be accessed through any other
/// path while the cache exists.
pub struct CachedSource<S> {
    /// The wrapped source.
    source: S,
    /// The cached pages, keyed by page index.
    pages: Mutex<Cache<u64, Page>>,
    /// The byte granularity of a cached page.
    page_len: u64,
}

impl<S: ByteSource> CachedSource<S> {
    /// Creates a cache around the given source, taking exclusive ownership of it.
    pub(crate) fn new(source: S) -> CachedSource<S> {
        let page_len = match source.page_size() {
            0 => DEFAULT_PAGE_LEN,
            size => size.clamp(MIN_PAGE_LEN, MAX_PAGE_LEN),
        };

        CachedSource {
            source,
            pages: Mutex::new(Cache::new(CACHED_PAGES)),
            page_len,
        }
    }

    /// Drops every cached page intersecting the given span.
    ///
    /// This is the only way external changes to a volatile source become visible to
    /// subsequent reads; the cache itself never polls the source.
    pub fn invalidate(&self, span: Span) {
        let Some(span) = span.intersect(self.source.span()) else {
            return;
        };

        let first = span.start().as_u64() / self.page_len;
        let last = (span.end() - Len::from(1)).as_u64() / self.page_len;

        let mut pages = self.pages.lock().unwrap();

        // More candidate pages than the cache can hold: drop everything.
        if last - first >= CACHED_PAGES as u64 {
            pages.clear();
        } else {
            for index in first..=last {
                pages.remove(&index);
            }
        }

        trace!(first, last, "invalidated cache pages");
    }

    /// Drops every cached page.
    pub fn invalidate_all(&self) {
        self.invalidate(Span::FULL);
    }

    /// Reads one full page window through the source.
    ///
    /// A failed read-through caches nothing.
    fn fill_page(&self, index: u64, span: Span) -> SourceResult<Page> {
        let page_start = Position::from_u64(index * self.page_len);
        let page_span = Span::new(page_start, Len::from(self.page_len));
        let window = page_span
            .intersect(span)
            .expect("pages are only filled for positions inside the extent");

        let page_len = usize::try_from(self.page_len).expect("page lengths fit into `usize`");
        let mut data = vec![0; page_len].into_boxed_slice();

        let start = usize::try_from((window.start() - page_start).as_u64())
            .expect("offsets into a page fit into `usize`");
        let len = usize::try_from(window.len().as_u64()).expect("page windows fit into `usize`");
        let filled = self
            .source
            .read_at(window.start(), &mut data[start..start + len])?
            .len();

        trace!(index, filled, "filled cache page");

        Ok(Page {
            data,
            valid: start..start + filled,
        })
    }
}

impl<S: ByteSource> ByteSource for CachedSource<S> {
    fn span(&self) -> Span {
        self.source.span()
    }

    fn name(&self) -> &str {
        self.source.name()
    }

    fn is_read_only(&self) -> bool {
        self.source.is_read_only()
    }

    fn is_volatile(&self) -> bool {
        self.source.is_volatile()
    }

    fn page_size(&self) -> u64 {
        self.source.page_size()
    }

    fn read_at<'buf>(
        &self,
        position: Position,
        buf: &'buf mut [u8],
    ) -> SourceResult<&'buf [u8]> {
        let span = self.source.span();
        if !span.contains(position) {
            return Err(SourceError::OutOfRange {
                name: self.source.name().to_owned(),
                position,
            });
        }

        let page_len = usize::try_from(self.page_len).expect("page lengths fit into `usize`");
        let mut pages = self.pages.lock().unwrap();
        let mut filled = 0;

        while filled < buf.len() {
            let cursor = position + Len::from(u64::try_from(filled).unwrap_or(u64::MAX));
            if !span.contains(cursor) {
                break;
            }

            let index = cursor.as_u64() / self.page_len;
            let offset = usize::try_from(cursor.as_u64() % self.page_len)
                .expect("offsets into a page fit into `usize`");
            // What a fully valid page could still contribute at this offset.
            let room = std::cmp::min(page_len - offset, buf.len() - filled);

            let (copied, fell_short) = match pages.get(&index) {
                Some(page) => page.serve(offset, room, &mut buf[filled..]),
                None => {
                    let page = self.fill_page(index, span)?;
                    let result = page.serve(offset, room, &mut buf[filled..]);
                    pages.insert(index, page);
                    result
                }
            };

            filled += copied;
            if fell_short {
                break;
            }
        }

        Ok(&buf[..filled])
    }

    fn write_at(&mut self, position: Position, bytes: &[u8]) -> SourceResult<usize> {
        let written = self.source.write_at(position, bytes)?;

        self.invalidate(Span::new(
            position,
            Len::from(u64::try_from(written).unwrap_or(u64::MAX)),
        ));

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use super::*;
    use crate::source::MemSource;

    /// A volatile source over shared bytes, standing in for externally mutated memory.
    struct SharedSource {
        /// The bytes of the source, mutable from outside.
        bytes: Arc<Mutex<Vec<u8>>>,
        /// How many reads reached this source.
        reads: Arc<AtomicUsize>,
        /// The reported cache granularity.
        page_size: u64,
    }

    impl ByteSource for SharedSource {
        fn span(&self) -> Span {
            let len = u64::try_from(self.bytes.lock().unwrap().len()).unwrap();
            Span::new(Position::ZERO, Len::from(len))
        }

        fn name(&self) -> &str {
            "shared"
        }

        fn is_read_only(&self) -> bool {
            false
        }

        fn is_volatile(&self) -> bool {
            true
        }

        fn page_size(&self) -> u64 {
            self.page_size
        }

        fn read_at<'buf>(
            &self,
            position: Position,
            buf: &'buf mut [u8],
        ) -> SourceResult<&'buf [u8]> {
            self.reads.fetch_add(1, Ordering::Relaxed);

            let bytes = self.bytes.lock().unwrap();
            let span = Span::new(Position::ZERO, Len::from(u64::try_from(bytes.len()).unwrap()));
            if !span.contains(position) {
                return Err(SourceError::OutOfRange {
                    name: "shared".to_owned(),
                    position,
                });
            }

            let offset = usize::try_from(position.as_u64()).unwrap();
            let size = std::cmp::min(bytes.len() - offset, buf.len());
            buf[..size].copy_from_slice(&bytes[offset..offset + size]);

            Ok(&buf[..size])
        }

        fn write_at(&mut self, position: Position, bytes: &[u8]) -> SourceResult<usize> {
            let mut data = self.bytes.lock().unwrap();
            let offset = usize::try_from(position.as_u64()).unwrap();
            let size = std::cmp::min(data.len().saturating_sub(offset), bytes.len());
            data[offset..offset + size].copy_from_slice(&bytes[..size]);

            Ok(size)
        }
    }

    fn shared(
        bytes: &[u8],
        page_size: u64,
    ) -> (SharedSource, Arc<Mutex<Vec<u8>>>, Arc<AtomicUsize>) {
        let data = Arc::new(Mutex::new(bytes.to_vec()));
        let reads = Arc::new(AtomicUsize::new(0));
        let source = SharedSource {
            bytes: Arc::clone(&data),
            reads: Arc::clone(&reads),
            page_size,
        };

        (source, data, reads)
    }

    /// A source whose extent starts above zero, as a window into a larger space.
    struct OffsetSource {
        bytes: Vec<u8>,
        start: u64,
    }

    impl ByteSource for OffsetSource {
        fn span(&self) -> Span {
            Span::new(
                Position::from_u64(self.start),
                Len::from(u64::try_from(self.bytes.len()).unwrap()),
            )
        }

        fn name(&self) -> &str {
            "offset"
        }

        fn is_read_only(&self) -> bool {
            true
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
                    name: "offset".to_owned(),
                    position,
                });
            }

            let offset = usize::try_from((position - span.start()).as_u64()).unwrap();
            let size = std::cmp::min(self.bytes.len() - offset, buf.len());
            buf[..size].copy_from_slice(&self.bytes[offset..offset + size]);

            Ok(&buf[..size])
        }

        fn write_at(&mut self, _position: Position, _bytes: &[u8]) -> SourceResult<usize> {
            unreachable!("these tests never write");
        }
    }

    /// A source whose reads fail while the flag is set.
    struct FlakySource {
        bytes: Vec<u8>,
        failing: Arc<AtomicBool>,
        reads: Arc<AtomicUsize>,
    }

    impl ByteSource for FlakySource {
        fn span(&self) -> Span {
            Span::new(
                Position::ZERO,
                Len::from(u64::try_from(self.bytes.len()).unwrap()),
            )
        }

        fn name(&self) -> &str {
            "flaky"
        }

        fn is_read_only(&self) -> bool {
            false
        }

        fn is_volatile(&self) -> bool {
            true
        }

        fn read_at<'buf>(
            &self,
            position: Position,
            buf: &'buf mut [u8],
        ) -> SourceResult<&'buf [u8]> {
            self.reads.fetch_add(1, Ordering::Relaxed);

            if self.failing.load(Ordering::Relaxed) {
                return Err(SourceError::Io(std::io::Error::other("flaky")));
            }

            let offset = usize::try_from(position.as_u64()).unwrap();
            let size = std::cmp::min(self.bytes.len() - offset, buf.len());
            buf[..size].copy_from_slice(&self.bytes[offset..offset + size]);

            Ok(&buf[..size])
        }

        fn write_at(&mut self, _position: Position, _bytes: &[u8]) -> SourceResult<usize> {
            unreachable!("these tests never write");
        }
    }

    #[test]
    fn serves_reads_identical_to_the_source() {
        let bytes: Vec<u8> = (0..10_000_u64).map(|i| (i % 251) as u8).collect();
        let direct = MemSource::new(bytes.clone().into(), "direct".to_owned(), false);
        let cached = CachedSource::new(MemSource::new(bytes.into(), "cached".to_owned(), false));

        for &(start, len) in &[
            (0_u64, 100_usize),
            (4000, 5000),
            (4090, 12),
            (4095, 2),
            (9990, 100),
            (0, 10_000),
        ] {
            let mut direct_buf = vec![0; len];
            let mut cached_buf = vec![0; len];
            let expected = direct
                .read_at(Position::from_u64(start), &mut direct_buf)
                .unwrap()
                .to_vec();
            let actual = cached
                .read_at(Position::from_u64(start), &mut cached_buf)
                .unwrap();

            assert_eq!(actual, expected.as_slice(), "mismatch at {start}+{len}");
        }
    }

    #[test]
    fn second_reads_come_from_the_cache() {
        let (source, _data, reads) = shared(&[7; 8192], 4096);
        let cached = CachedSource::new(source);

        let mut buf = [0; 64];
        cached.read_at(Position::from_u64(100), &mut buf).unwrap();
        let after_first = reads.load(Ordering::Relaxed);

        cached.read_at(Position::from_u64(100), &mut buf).unwrap();
        cached.read_at(Position::from_u64(200), &mut buf).unwrap();

        assert_eq!(reads.load(Ordering::Relaxed), after_first);
        assert_eq!(buf, [7; 64]);
    }

    #[test]
    fn invalidation_exposes_external_changes() {
        let (source, data, _reads) = shared(&[1; 4096], 4096);
        let cached = CachedSource::new(source);

        let mut buf = [0; 16];
        assert_eq!(cached.read_at(Position::ZERO, &mut buf).unwrap(), &[1; 16]);

        // A silent external change stays invisible until the span is invalidated.
        data.lock().unwrap().fill(2);
        assert_eq!(cached.read_at(Position::ZERO, &mut buf).unwrap(), &[1; 16]);

        cached.invalidate(Span::new(Position::ZERO, Len::from(1)));
        assert_eq!(cached.read_at(Position::ZERO, &mut buf).unwrap(), &[2; 16]);
    }

    #[test]
    fn invalidate_all_drops_every_page() {
        let (source, data, _reads) = shared(&[1; 8192], 4096);
        let cached = CachedSource::new(source);

        let mut buf = [0; 16];
        cached.read_at(Position::ZERO, &mut buf).unwrap();
        cached.read_at(Position::from_u64(4096), &mut buf).unwrap();

        data.lock().unwrap().fill(2);
        cached.invalidate_all();

        assert_eq!(cached.read_at(Position::ZERO, &mut buf).unwrap(), &[2; 16]);
        assert_eq!(
            cached.read_at(Position::from_u64(4096), &mut buf).unwrap(),
            &[2; 16]
        );
    }

    #[test]
    fn writes_drop_the_affected_pages() {
        let (source, data, _reads) = shared(&[1; 8192], 4096);
        let mut cached = CachedSource::new(source);

        let mut buf = [0; 16];
        cached.read_at(Position::ZERO, &mut buf).unwrap();
        cached.read_at(Position::from_u64(4096), &mut buf).unwrap();

        // The write drops the first page, so the silent change becomes visible there,
        // while the second page still serves its cached bytes.
        data.lock().unwrap().fill(3);
        assert_eq!(cached.write_at(Position::from_u64(10), &[9; 4]).unwrap(), 4);

        assert_eq!(
            cached.read_at(Position::from_u64(8), &mut buf[..8]).unwrap(),
            &[3, 3, 9, 9, 9, 9, 3, 3]
        );
        assert_eq!(
            cached.read_at(Position::from_u64(4096), &mut buf).unwrap(),
            &[1; 16]
        );
    }

    #[test]
    fn handles_extents_that_start_mid_page() {
        let expected: Vec<u8> = (0..100).map(|i| i as u8).collect();
        let cached = CachedSource::new(OffsetSource {
            bytes: expected.clone(),
            start: 1000,
        });

        let mut buf = [0; 100];
        assert_eq!(
            cached.read_at(Position::from_u64(1000), &mut buf).unwrap(),
            expected.as_slice()
        );

        // Positions outside the extent are rejected even within the cached page.
        assert!(matches!(
            cached.read_at(Position::from_u64(999), &mut buf),
            Err(SourceError::OutOfRange { .. })
        ));
        assert!(matches!(
            cached.read_at(Position::from_u64(1100), &mut buf),
            Err(SourceError::OutOfRange { .. })
        ));
    }

    #[test]
    fn failed_read_throughs_cache_nothing() {
        let failing = Arc::new(AtomicBool::new(true));
        let reads = Arc::new(AtomicUsize::new(0));
        let cached = CachedSource::new(FlakySource {
            bytes: vec![5; 4096],
            failing: Arc::clone(&failing),
            reads: Arc::clone(&reads),
        });

        let mut buf = [0; 16];
        assert!(cached.read_at(Position::ZERO, &mut buf).is_err());

        failing.store(false, Ordering::Relaxed);
        assert_eq!(cached.read_at(Position::ZERO, &mut buf).unwrap(), &[5; 16]);
        assert_eq!(reads.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn propagates_range_and_read_only_errors() {
        let mut cached = CachedSource::new(MemSource::new(
            b"abc".as_slice().into(),
            "mem".to_owned(),
            true,
        ));

        let mut buf = [0; 4];
        assert!(matches!(
            cached.read_at(Position::from_u64(3), &mut buf),
            Err(SourceError::OutOfRange { .. })
        ));
        assert!(matches!(
            cached.write_at(Position::ZERO, b"x"),
            Err(SourceError::ReadOnly { .. })
        ));
    }

    #[test]
    fn delegates_the_source_attributes() {
        let (source, _data, _reads) = shared(&[0; 100], 0);
        let cached = CachedSource::new(source);

        assert_eq!(cached.span().end(), Position::from_u64(100));
        assert_eq!(cached.name(), "shared");
        assert!(cached.is_volatile());
        assert!(!cached.is_read_only());
        assert_eq!(cached.page_size(), 0);
    }

    #[test]
    fn clamps_the_page_granularity() {
        let granularity = |page_size| {
            let (source, _data, _reads) = shared(&[0; 16], page_size);
            CachedSource::new(source).page_len
        };

        assert_eq!(granularity(0), 4096);
        assert_eq!(granularity(16), 512);
        assert_eq!(granularity(1 << 20), 65_536);
        assert_eq!(granularity(8192), 8192);
    }
}
