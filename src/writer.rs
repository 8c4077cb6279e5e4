//! Writer session: single-codec registration and the write state machine.

use crate::android::AndroidWriter;
use crate::entry::Entry;
use crate::error::{Error, Result, WriterError};
use crate::format::Format;
use crate::header::Header;
use crate::stream::ByteStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    New,
    Header,
    Entry,
    Data,
    Fatal,
    Closed,
}

/// Stateful session producing one boot image onto one stream.
///
/// Entries are written in the fixed segment order; absent segments are
/// written as zero-length entries so the image is complete. The trailer and
/// the finished header are rendered by [`Writer::close`].
///
/// ```
/// use std::io::Cursor;
/// use bootimg::{Entry, EntryType, Format, Header, IoStream, Writer};
///
/// # fn example() -> bootimg::Result<Vec<u8>> {
/// let mut header = Header::new();
/// header.set_page_size(Some(2048));
/// header.set_kernel_address(Some(0x1000_8000));
/// header.set_ramdisk_address(Some(0x1100_0000));
/// header.set_secondboot_address(Some(0));
/// header.set_kernel_tags_address(Some(0x1000_0100));
///
/// let mut writer = Writer::new(Format::Android)?;
/// writer.open(IoStream::new(Cursor::new(Vec::new())))?;
/// writer.write_header(&header)?;
///
/// for entry_type in [
///     EntryType::Kernel,
///     EntryType::Ramdisk,
///     EntryType::SecondBoot,
///     EntryType::DeviceTree,
/// ] {
///     writer.write_entry(&Entry::new(entry_type))?;
///     if entry_type == EntryType::Kernel {
///         writer.write_data(b"kernel contents")?;
///     }
///     writer.finish_entry()?;
/// }
/// writer.close()?;
/// # Ok(writer.into_stream().map(IoStream::into_inner).map(Cursor::into_inner).unwrap_or_default())
/// # }
/// ```
#[derive(Debug)]
pub struct Writer<S: ByteStream> {
    state: WriterState,
    stream: Option<S>,
    codec: AndroidWriter,
}

impl<S: ByteStream> Writer<S> {
    /// Create a session for the given output format. Exactly one codec is
    /// registered per session; Loki images cannot be produced.
    pub fn new(format: Format) -> Result<Self> {
        let codec = match format {
            Format::Android => AndroidWriter::new(false),
            Format::Bump => AndroidWriter::new(true),
            Format::Loki => return Err(WriterError::UnsupportedFormat(format).into()),
        };

        Ok(Self {
            state: WriterState::New,
            stream: None,
            codec,
        })
    }

    fn ensure_state(&self, states: &[WriterState], operation: &'static str) -> Result<()> {
        if states.contains(&self.state) {
            Ok(())
        } else {
            Err(WriterError::InvalidState { operation }.into())
        }
    }

    fn note_failure(&mut self, error: Error) -> Error {
        if self.stream.as_ref().is_some_and(|s| s.is_fatal()) {
            self.state = WriterState::Fatal;
        }
        error
    }

    fn with_codec<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut AndroidWriter, &mut S) -> Result<T>,
    ) -> Result<T> {
        let Self { stream, codec, .. } = self;
        let stream = stream
            .as_mut()
            .ok_or(WriterError::InvalidState { operation })?;
        f(codec, stream)
    }

    /// Bind the session to a stream. The stream is assumed to be empty and
    /// positioned at the start.
    pub fn open(&mut self, stream: S) -> Result<()> {
        self.ensure_state(&[WriterState::New], "open")?;

        self.stream = Some(stream);
        self.state = WriterState::Header;
        Ok(())
    }

    /// A header template with the codec's supported fields filled in.
    pub fn get_header(&self) -> Result<Header> {
        self.ensure_state(&[WriterState::Header], "get_header")?;

        let mut header = Header::new();
        header.set_supported_fields(self.codec.supported_fields());
        Ok(header)
    }

    /// Validate and stage the header. Actual header bytes reach the stream
    /// on close, once sizes and the identifier are known; until then the
    /// first page is reserved.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        self.ensure_state(&[WriterState::Header], "write_header")?;

        let unsupported = header.present_fields() - self.codec.supported_fields();
        if !unsupported.is_empty() {
            return Err(WriterError::UnsupportedFields(unsupported).into());
        }

        match self.with_codec("write_header", |codec, stream| {
            codec.write_header(stream, header)
        }) {
            Ok(()) => {
                self.state = WriterState::Entry;
                Ok(())
            }
            Err(e) => Err(self.note_failure(e)),
        }
    }

    /// Start the next segment. The entry type must match the fixed segment
    /// order; a still-open previous segment is finished first.
    pub fn write_entry(&mut self, entry: &Entry) -> Result<()> {
        self.ensure_state(&[WriterState::Entry, WriterState::Data], "write_entry")?;

        if self.state == WriterState::Data {
            match self.with_codec("finish_entry", |codec, stream| codec.finish_entry(stream)) {
                Ok(()) => self.state = WriterState::Entry,
                Err(e) => return Err(self.note_failure(e)),
            }
        }

        match self.with_codec("write_entry", |codec, stream| {
            codec.write_entry(stream, entry)
        }) {
            Ok(()) => {
                self.state = WriterState::Data;
                Ok(())
            }
            Err(e) => Err(self.note_failure(e)),
        }
    }

    /// Write payload bytes of the current segment. A failure here is always
    /// fatal: part of the data may already be on the stream while the
    /// running digest no longer matches it.
    pub fn write_data(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_state(&[WriterState::Data], "write_data")?;

        match self.with_codec("write_data", |codec, stream| codec.write_data(stream, buf)) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.state = WriterState::Fatal;
                Err(e)
            }
        }
    }

    /// Freeze the current segment: record its size and pad up to the next
    /// page boundary.
    pub fn finish_entry(&mut self) -> Result<()> {
        self.ensure_state(&[WriterState::Data], "finish_entry")?;

        match self.with_codec("finish_entry", |codec, stream| codec.finish_entry(stream)) {
            Ok(()) => {
                self.state = WriterState::Entry;
                Ok(())
            }
            Err(e) => Err(self.note_failure(e)),
        }
    }

    /// Finalize the image: append the trailer (if every segment was
    /// written) and render the header into the first page.
    ///
    /// Closing again re-runs the finalization against the recorded image
    /// size, so the trailer is not appended twice and the output stays
    /// byte-identical.
    pub fn close(&mut self) -> Result<()> {
        if self.state == WriterState::New {
            self.state = WriterState::Closed;
            return Ok(());
        }

        match self.with_codec("close", |codec, stream| codec.close(stream)) {
            Ok(()) => {
                self.state = WriterState::Closed;
                Ok(())
            }
            Err(e) => Err(self.note_failure(e)),
        }
    }

    pub fn format(&self) -> Format {
        self.codec.format()
    }

    /// Whether the session hit an unrecoverable error. Only
    /// [`Writer::close`] is valid afterwards.
    pub fn is_fatal(&self) -> bool {
        self.state == WriterState::Fatal
    }

    /// Recover the stream.
    pub fn into_stream(self) -> Option<S> {
        self.stream
    }
}
