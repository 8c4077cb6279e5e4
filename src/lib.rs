//! Reading and writing Android boot images.
//!
//! A boot image bundles a kernel, a ramdisk and optionally a second-stage
//! bootloader and a device tree blob, page-aligned behind a fixed header.
//! Several dialects of the container exist; this crate handles the plain
//! Android layout, the Bump-tagged variant and (read-only) images mangled
//! by the Loki patcher.
//!
//! The entry points are the [`Reader`] and [`Writer`] sessions. A reader is
//! given a set of candidate formats and picks the best match by letting
//! every codec bid on the stream; a writer is created for exactly one
//! format. Both operate on anything implementing [`ByteStream`] — use
//! [`IoStream`] to adapt a `File` or an in-memory cursor.
//!
//! ```
//! use std::io::Cursor;
//! use bootimg::{Entry, EntryType, Format, Header, IoStream, Reader, Writer};
//!
//! # fn main() -> bootimg::Result<()> {
//! let mut header = Header::new();
//! header.set_page_size(Some(2048));
//! header.set_kernel_address(Some(0x1000_8000));
//! header.set_ramdisk_address(Some(0x1100_0000));
//! header.set_secondboot_address(Some(0));
//! header.set_kernel_tags_address(Some(0x1000_0100));
//!
//! let mut writer = Writer::new(Format::Android)?;
//! writer.open(IoStream::new(Cursor::new(Vec::new())))?;
//! writer.write_header(&header)?;
//! for entry_type in [
//!     EntryType::Kernel,
//!     EntryType::Ramdisk,
//!     EntryType::SecondBoot,
//!     EntryType::DeviceTree,
//! ] {
//!     writer.write_entry(&Entry::new(entry_type))?;
//!     if entry_type == EntryType::Kernel {
//!         writer.write_data(b"not a real kernel")?;
//!     }
//!     writer.finish_entry()?;
//! }
//! writer.close()?;
//!
//! let image = writer
//!     .into_stream()
//!     .map(IoStream::into_inner)
//!     .map(Cursor::into_inner)
//!     .unwrap_or_default();
//!
//! let mut reader = Reader::new();
//! reader.enable_all_formats()?;
//! reader.open(IoStream::new(Cursor::new(image)))?;
//! assert_eq!(reader.format(), Some(Format::Android));
//! # Ok(())
//! # }
//! ```

mod android;
pub mod constants;
mod entry;
mod error;
mod format;
mod header;
mod layouts;
mod loki;
mod reader;
mod segment;
mod stream;
mod utils;
mod writer;

pub use entry::{Entry, EntryType};
pub use error::{
    AndroidError, Error, LokiError, ReaderError, Result, SegmentError, WriterError,
};
pub use format::Format;
pub use header::{Header, HeaderFields};
pub use reader::Reader;
pub use stream::{
    read_fully, stream_search, write_fully, ByteStream, IoStream, SearchAction,
};
pub use writer::Writer;
