//! Reader session: format registration, the bid poll and the read state
//! machine.

use std::io::SeekFrom;

use crate::android::AndroidReader;
use crate::entry::{Entry, EntryType};
use crate::error::{Error, ReaderError, Result, SegmentError};
use crate::format::Format;
use crate::header::Header;
use crate::loki::LokiReader;
use crate::stream::ByteStream;

/// Tagged dispatch over the registered codecs.
enum FormatReader {
    Android(AndroidReader),
    Loki(LokiReader),
}

impl FormatReader {
    fn for_format(format: Format) -> FormatReader {
        match format {
            Format::Android => FormatReader::Android(AndroidReader::new(false)),
            Format::Bump => FormatReader::Android(AndroidReader::new(true)),
            Format::Loki => FormatReader::Loki(LokiReader::new()),
        }
    }

    fn format(&self) -> Format {
        match self {
            FormatReader::Android(reader) => reader.format(),
            FormatReader::Loki(reader) => reader.format(),
        }
    }

    fn bid<S: ByteStream>(&mut self, stream: &mut S, best_bid: u32) -> Result<Option<u32>> {
        match self {
            FormatReader::Android(reader) => reader.bid(stream, best_bid),
            FormatReader::Loki(reader) => reader.bid(stream, best_bid),
        }
    }

    fn read_header<S: ByteStream>(&mut self, stream: &mut S) -> Result<Header> {
        match self {
            FormatReader::Android(reader) => reader.read_header(stream),
            FormatReader::Loki(reader) => reader.read_header(stream),
        }
    }

    fn read_entry<S: ByteStream>(&mut self, stream: &mut S) -> Result<Option<Entry>> {
        match self {
            FormatReader::Android(reader) => reader.read_entry(stream),
            FormatReader::Loki(reader) => reader.read_entry(stream),
        }
    }

    fn go_to_entry<S: ByteStream>(
        &mut self,
        stream: &mut S,
        entry_type: Option<EntryType>,
    ) -> Result<Option<Entry>> {
        match self {
            FormatReader::Android(reader) => reader.go_to_entry(stream, entry_type),
            FormatReader::Loki(reader) => reader.go_to_entry(stream, entry_type),
        }
    }

    fn read_data<S: ByteStream>(&mut self, stream: &mut S, buf: &mut [u8]) -> Result<usize> {
        match self {
            FormatReader::Android(reader) => reader.read_data(stream, buf),
            FormatReader::Loki(reader) => reader.read_data(stream, buf),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    New,
    Header,
    Entry,
    Data,
    Fatal,
    Closed,
}

/// Stateful session reading one boot image from one stream.
///
/// ```
/// use std::io::Cursor;
/// use bootimg::{IoStream, Reader};
///
/// # fn example(image: Vec<u8>) -> bootimg::Result<()> {
/// let mut reader = Reader::new();
/// reader.enable_all_formats()?;
/// reader.open(IoStream::new(Cursor::new(image)))?;
///
/// let _header = reader.read_header()?;
/// while let Some(_entry) = reader.read_entry()? {
///     let mut buf = [0u8; 4096];
///     loop {
///         let n = reader.read_data(&mut buf)?;
///         if n == 0 {
///             break;
///         }
///         // consume buf[..n]
///     }
/// }
/// reader.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Reader<S: ByteStream> {
    state: ReaderState,
    stream: Option<S>,
    formats: Vec<FormatReader>,
    selected: Option<usize>,
    forced: bool,
}

impl<S: ByteStream> Default for Reader<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ByteStream> Reader<S> {
    pub fn new() -> Self {
        Self {
            state: ReaderState::New,
            stream: None,
            formats: Vec::new(),
            selected: None,
            forced: false,
        }
    }

    fn ensure_state(&self, states: &[ReaderState], operation: &'static str) -> Result<()> {
        if states.contains(&self.state) {
            Ok(())
        } else {
            Err(ReaderError::InvalidState { operation }.into())
        }
    }

    /// Mark the session fatal when the failure makes further progress
    /// impossible.
    fn note_failure(&mut self, error: Error) -> Error {
        let stream_fatal = self.stream.as_ref().is_some_and(|s| s.is_fatal());
        if stream_fatal || matches!(error, Error::Segment(SegmentError::EntryIsTruncated { .. })) {
            self.state = ReaderState::Fatal;
        }
        error
    }

    /// Register a codec. Registration order breaks bid ties.
    pub fn enable_format(&mut self, format: Format) -> Result<()> {
        self.ensure_state(&[ReaderState::New], "enable_format")?;

        if self.formats.iter().any(|f| f.format() == format) {
            return Err(ReaderError::FormatAlreadyEnabled(format).into());
        }

        self.formats.push(FormatReader::for_format(format));
        Ok(())
    }

    /// Register every known codec.
    pub fn enable_all_formats(&mut self) -> Result<()> {
        self.ensure_state(&[ReaderState::New], "enable_all_formats")?;

        for format in [Format::Android, Format::Bump, Format::Loki] {
            if !self.formats.iter().any(|f| f.format() == format) {
                self.formats.push(FormatReader::for_format(format));
            }
        }
        Ok(())
    }

    /// Force a specific codec, skipping the bid poll on open. The codec is
    /// registered if it was not already.
    pub fn set_format(&mut self, format: Format) -> Result<()> {
        self.ensure_state(&[ReaderState::New], "set_format")?;

        let index = match self.formats.iter().position(|f| f.format() == format) {
            Some(index) => index,
            None => {
                self.formats.push(FormatReader::for_format(format));
                self.formats.len() - 1
            }
        };

        self.selected = Some(index);
        self.forced = true;
        Ok(())
    }

    /// Bind the session to a stream. Unless a format was forced, every
    /// registered codec is polled and the highest bid wins.
    ///
    /// On failure the stream stays inside the session and can be recovered
    /// with [`Reader::into_stream`].
    pub fn open(&mut self, stream: S) -> Result<()> {
        self.ensure_state(&[ReaderState::New], "open")?;

        self.stream = Some(stream);

        if self.formats.is_empty() {
            return Err(ReaderError::NoFormatsRegistered.into());
        }

        if !self.forced {
            let mut best_bid = 0u32;
            let mut winner = None;

            let Self {
                stream, formats, ..
            } = self;
            let stream = stream.as_mut().ok_or(ReaderError::InvalidState {
                operation: "open",
            })?;

            for (index, format) in formats.iter_mut().enumerate() {
                stream
                    .seek(SeekFrom::Start(0))
                    .map_err(|e| Error::io("failed to seek file", e))?;

                match format.bid(stream, best_bid)? {
                    Some(bid) if bid > best_bid => {
                        best_bid = bid;
                        winner = Some(index);
                    }
                    Some(_) | None => {}
                }
            }

            let Some(winner) = winner else {
                return Err(ReaderError::UnknownFileFormat.into());
            };
            self.selected = Some(winner);
        }

        self.state = ReaderState::Header;
        Ok(())
    }

    /// Parse the boot image header.
    pub fn read_header(&mut self) -> Result<Header> {
        self.ensure_state(&[ReaderState::Header], "read_header")?;

        let result = self.with_codec(|codec, stream| {
            stream
                .seek(SeekFrom::Start(0))
                .map_err(|e| Error::io("failed to seek file", e))?;
            codec.read_header(stream)
        });

        match result {
            Ok(header) => {
                self.state = ReaderState::Entry;
                Ok(header)
            }
            Err(e) => Err(self.note_failure(e)),
        }
    }

    /// Advance to the next entry. `Ok(None)` after the last one. The
    /// current entry does not need to be fully read first.
    pub fn read_entry(&mut self) -> Result<Option<Entry>> {
        self.ensure_state(&[ReaderState::Entry, ReaderState::Data], "read_entry")?;

        match self.with_codec(|codec, stream| codec.read_entry(stream)) {
            Ok(Some(entry)) => {
                self.state = ReaderState::Data;
                Ok(Some(entry))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(self.note_failure(e)),
        }
    }

    /// Seek to the entry of the given type, or to the first entry when
    /// `entry_type` is `None`. `Ok(None)` when the image has no such entry.
    pub fn go_to_entry(&mut self, entry_type: Option<EntryType>) -> Result<Option<Entry>> {
        self.ensure_state(&[ReaderState::Entry, ReaderState::Data], "go_to_entry")?;

        match self.with_codec(|codec, stream| codec.go_to_entry(stream, entry_type)) {
            Ok(Some(entry)) => {
                self.state = ReaderState::Data;
                Ok(Some(entry))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(self.note_failure(e)),
        }
    }

    /// Read payload bytes of the current entry. Returns 0 at the end of the
    /// entry.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_state(&[ReaderState::Data], "read_data")?;

        match self.with_codec(|codec, stream| codec.read_data(stream, buf)) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.note_failure(e)),
        }
    }

    /// The detected (or forced) format, once the session is open.
    pub fn format(&self) -> Option<Format> {
        self.selected.map(|index| self.formats[index].format())
    }

    /// Whether the session hit an unrecoverable error. Only
    /// [`Reader::close`] is valid afterwards.
    pub fn is_fatal(&self) -> bool {
        self.state == ReaderState::Fatal
    }

    /// End the session. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.state = ReaderState::Closed;
        Ok(())
    }

    /// Recover the stream.
    pub fn into_stream(self) -> Option<S> {
        self.stream
    }

    fn with_codec<T>(
        &mut self,
        f: impl FnOnce(&mut FormatReader, &mut S) -> Result<T>,
    ) -> Result<T> {
        let Self {
            stream,
            formats,
            selected,
            ..
        } = self;
        let stream = stream.as_mut().ok_or(ReaderError::InvalidState {
            operation: "read",
        })?;
        let codec = selected
            .and_then(|index| formats.get_mut(index))
            .ok_or(ReaderError::InvalidState { operation: "read" })?;
        f(codec, stream)
    }
}
