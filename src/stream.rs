//! Byte stream abstraction consumed by the reader and writer sessions.
//!
//! Sessions never open files themselves; the caller hands them something
//! implementing [`ByteStream`]. The trait mirrors plain positioned I/O with
//! one extra bit: after a failed operation, [`ByteStream::is_fatal`] tells
//! the session whether the stream can still be used.

use std::io::{self, Read, Seek, SeekFrom, Write};

use bytemuck::{bytes_of, bytes_of_mut, Pod};

/// Sequential, seekable byte stream.
///
/// Writers may seek past the current end of the stream; once data is written
/// at the later offset, the skipped range must read back as zero bytes.
/// Files and `Cursor<Vec<u8>>` both behave this way.
pub trait ByteStream {
    /// Read up to `buf.len()` bytes. Partial reads are allowed; returning 0
    /// on a non-empty buffer signals end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write up to `buf.len()` bytes. Partial writes are allowed.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Reposition the stream, returning the new absolute offset.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Whether the most recent error left the stream unusable. A session
    /// consults this after every failed operation; `true` moves the session
    /// into its fatal state, `false` permits retrying the same call.
    fn is_fatal(&self) -> bool;
}

impl<S: ByteStream + ?Sized> ByteStream for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        (**self).seek(pos)
    }

    fn is_fatal(&self) -> bool {
        (**self).is_fatal()
    }
}

impl<S: ByteStream + ?Sized> ByteStream for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        (**self).seek(pos)
    }

    fn is_fatal(&self) -> bool {
        (**self).is_fatal()
    }
}

/// Adapter turning any `Read + Write + Seek` type into a [`ByteStream`]
/// that never reports fatal errors.
#[derive(Debug)]
pub struct IoStream<T> {
    inner: T,
}

impl<T: Read + Write + Seek> IoStream<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

impl<T: Read + Write + Seek> ByteStream for IoStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }

    fn is_fatal(&self) -> bool {
        false
    }
}

/// Read until `buf` is full or the stream ends. Returns the number of bytes
/// actually read; short only at end of stream.
pub fn read_fully<S: ByteStream + ?Sized>(stream: &mut S, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match stream.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Write all of `buf` or fail.
pub fn write_fully<S: ByteStream + ?Sized>(stream: &mut S, buf: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match stream.write(&buf[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "stream accepted no more bytes",
                ))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Read a fixed-layout value. Returns the number of bytes read so callers
/// can detect a short read.
pub(crate) fn read_pod<S: ByteStream + ?Sized, P: Pod>(
    stream: &mut S,
    value: &mut P,
) -> io::Result<usize> {
    read_fully(stream, bytes_of_mut(value))
}

/// Write a fixed-layout value in full.
pub(crate) fn write_pod<S: ByteStream + ?Sized, P: Pod>(
    stream: &mut S,
    value: &P,
) -> io::Result<()> {
    write_fully(stream, bytes_of(value))
}

/// Verdict returned by a [`stream_search`] callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAction {
    Continue,
    Stop,
}

const SEARCH_CHUNK_SIZE: usize = 8192;

/// Scan `[start, end)` for every occurrence of `pattern` at multiples of
/// `stride` (relative to `start`; 0 means every offset) and invoke
/// `on_match` with the absolute offset of each hit.
///
/// The callback may reposition the stream freely, e.g. to read ahead past
/// the match; the scan restores its own position afterwards. Returning
/// [`SearchAction::Stop`] ends the scan early, as does reaching
/// `max_matches` hits.
pub fn stream_search<S, F>(
    stream: &mut S,
    start: Option<u64>,
    end: Option<u64>,
    stride: usize,
    pattern: &[u8],
    max_matches: Option<usize>,
    mut on_match: F,
) -> io::Result<()>
where
    S: ByteStream + ?Sized,
    F: FnMut(&mut S, u64) -> io::Result<SearchAction>,
{
    if pattern.is_empty() {
        return Ok(());
    }

    let stride = stride.max(1) as u64;
    let start = start.unwrap_or(0);
    let end = match end {
        Some(end) => end,
        None => stream.seek(SeekFrom::End(0))?,
    };

    let cap = SEARCH_CHUNK_SIZE.max(pattern.len());
    let mut buf = vec![0u8; cap];
    let mut matches = 0usize;
    let mut base = start;

    while base < end && end - base >= pattern.len() as u64 {
        stream.seek(SeekFrom::Start(base))?;
        let want = ((end - base).min(cap as u64)) as usize;
        let n = read_fully(stream, &mut buf[..want])?;
        if n < pattern.len() {
            break;
        }

        // First stride-aligned offset within this chunk.
        let misalign = (base - start) % stride;
        let mut i = if misalign == 0 {
            0
        } else {
            (stride - misalign) as usize
        };
        while i + pattern.len() <= n {
            if buf[i..i + pattern.len()] == *pattern {
                match on_match(&mut *stream, base + i as u64)? {
                    SearchAction::Stop => return Ok(()),
                    SearchAction::Continue => {}
                }
                matches += 1;
                if max_matches.is_some_and(|limit| matches >= limit) {
                    return Ok(());
                }
            }
            i += stride as usize;
        }

        if n < want {
            // End of stream reached early.
            break;
        }
        // Overlap so a pattern straddling the chunk boundary is still seen.
        base += (n - pattern.len() + 1) as u64;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect_matches(data: &[u8], pattern: &[u8], stride: usize) -> Vec<u64> {
        let mut stream = IoStream::new(Cursor::new(data.to_vec()));
        let mut offsets = Vec::new();
        stream_search(&mut stream, None, None, stride, pattern, None, |_, off| {
            offsets.push(off);
            Ok(SearchAction::Continue)
        })
        .unwrap();
        offsets
    }

    #[test]
    fn search_finds_all_occurrences() {
        let mut data = vec![0u8; 100];
        data[10..13].copy_from_slice(b"abc");
        data[50..53].copy_from_slice(b"abc");
        data[97..100].copy_from_slice(b"abc");
        assert_eq!(collect_matches(&data, b"abc", 0), vec![10, 50, 97]);
    }

    #[test]
    fn search_respects_stride() {
        let mut data = vec![0u8; 64];
        data[8..11].copy_from_slice(b"abc");
        data[21..24].copy_from_slice(b"abc");
        assert_eq!(collect_matches(&data, b"abc", 8), vec![8]);
    }

    #[test]
    fn search_spans_chunk_boundary() {
        let mut data = vec![0u8; SEARCH_CHUNK_SIZE + 64];
        let off = SEARCH_CHUNK_SIZE - 2;
        data[off..off + 5].copy_from_slice(b"magic");
        assert_eq!(collect_matches(&data, b"magic", 0), vec![off as u64]);
    }

    #[test]
    fn search_honors_window_and_limit() {
        let mut data = vec![0u8; 100];
        data[10..13].copy_from_slice(b"abc");
        data[50..53].copy_from_slice(b"abc");
        data[80..83].copy_from_slice(b"abc");

        let mut stream = IoStream::new(Cursor::new(data.clone()));
        let mut offsets = Vec::new();
        stream_search(
            &mut stream,
            Some(20),
            Some(60),
            0,
            b"abc",
            None,
            |_, off| {
                offsets.push(off);
                Ok(SearchAction::Continue)
            },
        )
        .unwrap();
        assert_eq!(offsets, vec![50]);

        let mut stream = IoStream::new(Cursor::new(data));
        let mut offsets = Vec::new();
        stream_search(&mut stream, None, None, 0, b"abc", Some(2), |_, off| {
            offsets.push(off);
            Ok(SearchAction::Continue)
        })
        .unwrap();
        assert_eq!(offsets, vec![10, 50]);
    }

    #[test]
    fn search_callback_may_move_the_stream() {
        let mut data = vec![0u8; 300];
        data[100..103].copy_from_slice(b"abc");
        data[103] = 0x77;
        data[200..203].copy_from_slice(b"abc");

        let mut stream = IoStream::new(Cursor::new(data));
        let mut seen = Vec::new();
        stream_search(&mut stream, None, None, 0, b"abc", None, |stream, off| {
            stream.seek(SeekFrom::Start(off + 3))?;
            let mut byte = [0u8; 1];
            read_fully(stream, &mut byte)?;
            seen.push((off, byte[0]));
            Ok(SearchAction::Continue)
        })
        .unwrap();
        assert_eq!(seen, vec![(100, 0x77), (200, 0x00)]);
    }

    #[test]
    fn read_fully_reports_short_reads() {
        let mut stream = IoStream::new(Cursor::new(vec![1u8, 2, 3]));
        let mut buf = [0u8; 8];
        assert_eq!(read_fully(&mut stream, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }
}
