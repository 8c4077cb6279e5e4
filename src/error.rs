//! Error taxonomy: one kind family per codec, one for each session facade,
//! and a transport wrapper that keeps the underlying I/O error together with
//! a human-readable context message.

use std::io;

use thiserror::Error;

use crate::entry::EntryType;
use crate::format::Format;
use crate::header::HeaderFields;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Android(#[from] AndroidError),
    #[error(transparent)]
    Loki(#[from] LokiError),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failures specific to the Android (and Bump) codec.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AndroidError {
    #[error("Android header not found")]
    HeaderNotFound,
    #[error("Android header out of bounds")]
    HeaderOutOfBounds,
    #[error("invalid page size: {0}")]
    InvalidPageSize(u32),
    #[error("missing page size")]
    MissingPageSize,
    #[error("board name too long")]
    BoardNameTooLong,
    #[error("kernel cmdline too long")]
    KernelCmdlineTooLong,
}

/// Failures specific to the Loki codec.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LokiError {
    #[error("too small to be a Loki image")]
    LokiHeaderTooSmall,
    #[error("invalid Loki magic")]
    InvalidLokiMagic,
    #[error("page size cannot be 0")]
    PageSizeCannotBeZero,
    #[error("Loki shellcode not found")]
    ShellcodeNotFound,
    #[error("no ramdisk gzip header found")]
    NoRamdiskGzipHeaderFound,
    #[error("ramdisk offset greater than aboot offset")]
    RamdiskOffsetGreaterThanAbootOffset,
    #[error("unexpected end of file")]
    UnexpectedEndOfFile,
    #[error("invalid kernel address: {0:#010x}")]
    InvalidKernelAddress(u32),
    #[error("failed to determine ramdisk size")]
    FailedToDetermineRamdiskSize,
}

/// Failures raised by the shared segment engine.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    #[error("cannot add entries in current state")]
    AddEntryInIncorrectState,
    #[error("entry offset plus size would overflow")]
    EntryWouldOverflowOffset,
    #[error("read would overflow integer")]
    ReadWouldOverflowInteger,
    #[error("write would overflow integer")]
    WriteWouldOverflowInteger,
    #[error("invalid entry size: {0}")]
    InvalidEntrySize(u64),
    #[error("entry has no type")]
    MissingEntryType,
    #[error("expected entry of type {expected:?}, got {actual:?}")]
    UnexpectedEntryType {
        expected: EntryType,
        actual: EntryType,
    },
    #[error("entry is truncated ({remaining} bytes missing)")]
    EntryIsTruncated { remaining: u64 },
}

/// Failures raised by the [`crate::Reader`] session itself.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReaderError {
    #[error("invalid reader state for {operation}")]
    InvalidState { operation: &'static str },
    #[error("no formats registered")]
    NoFormatsRegistered,
    #[error("{0} format already enabled")]
    FormatAlreadyEnabled(Format),
    #[error("failed to determine boot image format")]
    UnknownFileFormat,
}

/// Failures raised by the [`crate::Writer`] session itself.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WriterError {
    #[error("invalid writer state for {operation}")]
    InvalidState { operation: &'static str },
    #[error("cannot write {0} images")]
    UnsupportedFormat(Format),
    #[error("header carries fields unsupported by the codec: {0:?}")]
    UnsupportedFields(HeaderFields),
    #[error("no more entries to write")]
    EndOfEntries,
}
