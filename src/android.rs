//! Codec for the canonical Android boot image layout, covering both the
//! plain (Samsung SEAndroid trailer) and Bump flavors.

use std::io::SeekFrom;

use bytemuck::{bytes_of_mut, Zeroable};
use sha1::{Digest, Sha1};

use crate::constants::{
    BOOT_ARGS_SIZE, BOOT_MAGIC, BOOT_MAGIC_SIZE, BOOT_NAME_SIZE, BUMP_MAGIC, HEADER_SEARCH_STRIDE,
    MAX_HEADER_OFFSET, SAMSUNG_SEANDROID_MAGIC, SHA1_DIGEST_SIZE, SUPPORTED_PAGE_SIZES,
};
use crate::entry::{Entry, EntryType};
use crate::error::{AndroidError, Error, Result};
use crate::format::Format;
use crate::header::{Header, HeaderFields};
use crate::layouts::{fix_android_header_byte_order, RawAndroidHeader, ANDROID_HEADER_SIZE};
use crate::segment::{SegmentReader, SegmentReaderEntry, SegmentWriter, SegmentWriterEntry};
use crate::stream::{read_fully, write_fully, write_pod, ByteStream};
use crate::utils::{align_to, trim_end};

pub(crate) const SUPPORTED_FIELDS: HeaderFields = HeaderFields::KERNEL_ADDRESS
    .union(HeaderFields::RAMDISK_ADDRESS)
    .union(HeaderFields::SECONDBOOT_ADDRESS)
    .union(HeaderFields::KERNEL_TAGS_ADDRESS)
    .union(HeaderFields::PAGE_SIZE)
    .union(HeaderFields::BOARD_NAME)
    .union(HeaderFields::KERNEL_CMDLINE);

/// Byte offset one past the last segment, i.e. where the trailer magic
/// lives. Only meaningful for headers with a non-zero page size.
fn image_end(hdr: &RawAndroidHeader) -> u64 {
    let page_size = u64::from(hdr.page_size);
    let mut pos = page_size;
    for size in [
        hdr.kernel_size,
        hdr.ramdisk_size,
        hdr.second_size,
        hdr.dt_size,
    ] {
        pos = align_to(pos + u64::from(size), page_size);
    }
    pos
}

/// Find and read the boot image header within the first
/// `max_header_offset` bytes, probing the magic at 8-byte strides.
///
/// Integer fields of the returned header are converted to host order. The
/// stream position is unspecified afterwards.
pub(crate) fn find_header<S: ByteStream>(
    stream: &mut S,
    max_header_offset: usize,
) -> Result<(RawAndroidHeader, u64)> {
    debug_assert!(max_header_offset <= MAX_HEADER_OFFSET);

    stream
        .seek(SeekFrom::Start(0))
        .map_err(|e| Error::io("failed to seek to start", e))?;

    let mut buf = vec![0u8; max_header_offset + ANDROID_HEADER_SIZE];
    let n = read_fully(stream, &mut buf).map_err(|e| Error::io("failed to read header", e))?;
    let buf = &buf[..n];

    let mut found = None;
    let mut offset = 0;
    while offset + BOOT_MAGIC_SIZE <= buf.len() {
        if &buf[offset..offset + BOOT_MAGIC_SIZE] == BOOT_MAGIC {
            found = Some(offset);
            break;
        }
        offset += HEADER_SEARCH_STRIDE;
    }

    let Some(offset) = found else {
        return Err(AndroidError::HeaderNotFound.into());
    };
    if offset >= max_header_offset || buf.len() - offset < ANDROID_HEADER_SIZE {
        return Err(AndroidError::HeaderOutOfBounds.into());
    }

    let mut hdr = RawAndroidHeader::zeroed();
    bytes_of_mut(&mut hdr).copy_from_slice(&buf[offset..offset + ANDROID_HEADER_SIZE]);
    fix_android_header_byte_order(&mut hdr);

    Ok((hdr, offset as u64))
}

/// Check for a trailer magic right after the last segment. `Ok(None)` when
/// the magic is absent or the stream is too short.
fn find_trailer_magic<S: ByteStream>(
    stream: &mut S,
    hdr: &RawAndroidHeader,
    magic: &[u8],
) -> Result<Option<u64>> {
    if hdr.page_size == 0 {
        return Ok(None);
    }

    let pos = image_end(hdr);
    stream
        .seek(SeekFrom::Start(pos))
        .map_err(|e| Error::io("failed to seek to trailer", e))?;

    let mut buf = vec![0u8; magic.len()];
    let n = read_fully(stream, &mut buf).map_err(|e| Error::io("failed to read trailer", e))?;

    if n == magic.len() && buf == magic {
        Ok(Some(pos))
    } else {
        Ok(None)
    }
}

pub(crate) fn convert_header(hdr: &RawAndroidHeader) -> Header {
    let mut header = Header::new();
    header.set_supported_fields(SUPPORTED_FIELDS);
    header.set_board_name(Some(
        String::from_utf8_lossy(trim_end(&hdr.name)).into_owned(),
    ));
    header.set_kernel_cmdline(Some(
        String::from_utf8_lossy(trim_end(&hdr.cmdline)).into_owned(),
    ));
    header.set_page_size(Some(hdr.page_size));
    header.set_kernel_address(Some(hdr.kernel_addr));
    header.set_ramdisk_address(Some(hdr.ramdisk_addr));
    header.set_secondboot_address(Some(hdr.second_addr));
    header.set_kernel_tags_address(Some(hdr.tags_addr));
    header
}

pub(crate) struct AndroidReader {
    hdr: RawAndroidHeader,
    header_offset: Option<u64>,
    is_bump: bool,
    /// Tolerate device tree blobs shorter than their declared size.
    allow_truncated_dt: bool,
    seg: SegmentReader,
}

impl AndroidReader {
    pub fn new(is_bump: bool) -> Self {
        Self {
            hdr: RawAndroidHeader::zeroed(),
            header_offset: None,
            is_bump,
            allow_truncated_dt: true,
            seg: SegmentReader::new(),
        }
    }

    pub fn format(&self) -> Format {
        if self.is_bump {
            Format::Bump
        } else {
            Format::Android
        }
    }

    /// Bid on the stream: 64 bits for the header magic, plus 128 for the
    /// matching trailer magic. `Ok(None)` when `best_bid` is already out of
    /// reach, `Ok(Some(0))` when this is not an Android image.
    pub fn bid<S: ByteStream>(&mut self, stream: &mut S, best_bid: u32) -> Result<Option<u32>> {
        let trailer: &[u8] = if self.is_bump {
            BUMP_MAGIC
        } else {
            SAMSUNG_SEANDROID_MAGIC
        };

        if best_bid as usize >= (BOOT_MAGIC_SIZE + trailer.len()) * 8 {
            return Ok(None);
        }

        let mut bid = 0u32;

        match find_header(stream, MAX_HEADER_OFFSET) {
            Ok((hdr, offset)) => {
                self.hdr = hdr;
                self.header_offset = Some(offset);
                bid += (BOOT_MAGIC_SIZE * 8) as u32;
            }
            Err(Error::Android(AndroidError::HeaderNotFound | AndroidError::HeaderOutOfBounds)) => {
                return Ok(Some(0));
            }
            Err(e) => return Err(e),
        }

        if find_trailer_magic(stream, &self.hdr, trailer)?.is_some() {
            bid += (trailer.len() * 8) as u32;
        }

        Ok(Some(bid))
    }

    pub fn read_header<S: ByteStream>(&mut self, stream: &mut S) -> Result<Header> {
        // No bid happened if the caller forced this format.
        if self.header_offset.is_none() {
            let (hdr, offset) = find_header(stream, MAX_HEADER_OFFSET)?;
            self.hdr = hdr;
            self.header_offset = Some(offset);
        }
        let header_offset = self.header_offset.unwrap_or(0);

        if self.hdr.page_size == 0 {
            return Err(AndroidError::InvalidPageSize(0).into());
        }

        let header = convert_header(&self.hdr);
        let page_size = u64::from(self.hdr.page_size);

        let mut pos = align_to(header_offset + ANDROID_HEADER_SIZE as u64, page_size);
        let mut entries = Vec::with_capacity(4);
        for (entry_type, size) in [
            (EntryType::Kernel, self.hdr.kernel_size),
            (EntryType::Ramdisk, self.hdr.ramdisk_size),
            (EntryType::SecondBoot, self.hdr.second_size),
            (EntryType::DeviceTree, self.hdr.dt_size),
        ] {
            let can_be_empty =
                size == 0 || (entry_type == EntryType::DeviceTree && self.allow_truncated_dt);
            entries.push(SegmentReaderEntry {
                entry_type,
                offset: pos,
                size: u64::from(size),
                can_be_empty,
            });
            pos = align_to(pos + u64::from(size), page_size);
        }

        self.seg.set_entries(entries)?;

        Ok(header)
    }

    pub fn read_entry<S: ByteStream>(&mut self, stream: &mut S) -> Result<Option<Entry>> {
        self.seg.read_entry(stream)
    }

    pub fn go_to_entry<S: ByteStream>(
        &mut self,
        stream: &mut S,
        entry_type: Option<EntryType>,
    ) -> Result<Option<Entry>> {
        self.seg.go_to_entry(stream, entry_type)
    }

    pub fn read_data<S: ByteStream>(&mut self, stream: &mut S, buf: &mut [u8]) -> Result<usize> {
        self.seg.read_data(stream, buf)
    }
}

#[derive(Debug)]
pub(crate) struct AndroidWriter {
    hdr: RawAndroidHeader,
    is_bump: bool,
    sha: Sha1,
    file_size: Option<u64>,
    seg: SegmentWriter,
}

impl AndroidWriter {
    pub fn new(is_bump: bool) -> Self {
        Self {
            hdr: RawAndroidHeader::zeroed(),
            is_bump,
            sha: Sha1::new(),
            file_size: None,
            seg: SegmentWriter::new(),
        }
    }

    pub fn format(&self) -> Format {
        if self.is_bump {
            Format::Bump
        } else {
            Format::Android
        }
    }

    pub fn supported_fields(&self) -> HeaderFields {
        SUPPORTED_FIELDS
    }

    /// Stage the header and reserve the first page of the stream for it.
    pub fn write_header<S: ByteStream>(&mut self, stream: &mut S, header: &Header) -> Result<()> {
        self.hdr = RawAndroidHeader::zeroed();
        self.hdr.magic.copy_from_slice(BOOT_MAGIC);

        if let Some(address) = header.kernel_address() {
            self.hdr.kernel_addr = address;
        }
        if let Some(address) = header.ramdisk_address() {
            self.hdr.ramdisk_addr = address;
        }
        if let Some(address) = header.secondboot_address() {
            self.hdr.second_addr = address;
        }
        if let Some(address) = header.kernel_tags_address() {
            self.hdr.tags_addr = address;
        }

        match header.page_size() {
            Some(page_size) if SUPPORTED_PAGE_SIZES.contains(&page_size) => {
                self.hdr.page_size = page_size;
            }
            Some(page_size) => return Err(AndroidError::InvalidPageSize(page_size).into()),
            None => return Err(AndroidError::MissingPageSize.into()),
        }

        if let Some(board_name) = header.board_name() {
            if board_name.len() >= BOOT_NAME_SIZE {
                return Err(AndroidError::BoardNameTooLong.into());
            }
            self.hdr.name[..board_name.len()].copy_from_slice(board_name.as_bytes());
        }
        if let Some(cmdline) = header.kernel_cmdline() {
            if cmdline.len() >= BOOT_ARGS_SIZE {
                return Err(AndroidError::KernelCmdlineTooLong.into());
            }
            self.hdr.cmdline[..cmdline.len()].copy_from_slice(cmdline.as_bytes());
        }

        let entries = [
            EntryType::Kernel,
            EntryType::Ramdisk,
            EntryType::SecondBoot,
            EntryType::DeviceTree,
        ]
        .into_iter()
        .map(|entry_type| SegmentWriterEntry {
            entry_type,
            offset: 0,
            size: None,
            align: self.hdr.page_size,
        })
        .collect();
        self.seg.set_entries(entries)?;

        // The header and its padding occupy the whole first page; it is
        // rendered on close, once the sizes and the id are known.
        stream
            .seek(SeekFrom::Start(u64::from(self.hdr.page_size)))
            .map_err(|e| Error::io("failed to seek to first page", e))?;

        Ok(())
    }

    pub fn write_entry<S: ByteStream>(&mut self, stream: &mut S, entry: &Entry) -> Result<()> {
        self.seg.write_entry(stream, entry)
    }

    pub fn write_data<S: ByteStream>(&mut self, stream: &mut S, buf: &[u8]) -> Result<usize> {
        let n = self.seg.write_data(stream, buf)?;

        // The payload always goes into the hash; the size is added in
        // finish_entry where the empty device tree exception applies.
        self.sha.update(&buf[..n]);

        Ok(n)
    }

    pub fn finish_entry<S: ByteStream>(&mut self, stream: &mut S) -> Result<()> {
        self.seg.finish_entry(stream)?;

        let Some(segment) = self.seg.current() else {
            return Ok(());
        };
        let entry_type = segment.entry_type;
        let size = segment.size.unwrap_or(0);

        // An absent device tree contributes neither bytes nor its size.
        if entry_type != EntryType::DeviceTree || size > 0 {
            self.sha.update(size.to_le_bytes());
        }

        match entry_type {
            EntryType::Kernel => self.hdr.kernel_size = size,
            EntryType::Ramdisk => self.hdr.ramdisk_size = size,
            EntryType::SecondBoot => self.hdr.second_size = size,
            EntryType::DeviceTree => self.hdr.dt_size = size,
        }

        Ok(())
    }

    /// Append the trailer and render the finished header into the first
    /// page. Reclosing seeks to the recorded end instead of growing the
    /// stream, so the trailer is never duplicated; the header is rewritten
    /// each time.
    pub fn close<S: ByteStream>(&mut self, stream: &mut S) -> Result<()> {
        match self.file_size {
            Some(file_size) => {
                stream
                    .seek(SeekFrom::Start(file_size))
                    .map_err(|e| Error::io("failed to seek to end of image", e))?;
            }
            None => {
                let file_size = stream
                    .seek(SeekFrom::Current(0))
                    .map_err(|e| Error::io("failed to get file offset", e))?;
                self.file_size = Some(file_size);
            }
        }

        // Only a fully written image gets its trailer and header.
        if self.seg.is_done() {
            let trailer: &[u8] = if self.is_bump {
                BUMP_MAGIC
            } else {
                SAMSUNG_SEANDROID_MAGIC
            };
            write_fully(stream, trailer).map_err(|e| Error::io("failed to write trailer", e))?;

            let digest: [u8; SHA1_DIGEST_SIZE] = self.sha.clone().finalize().into();
            self.hdr.id[..SHA1_DIGEST_SIZE].copy_from_slice(&digest);

            let mut out = self.hdr;
            fix_android_header_byte_order(&mut out);

            stream
                .seek(SeekFrom::Start(0))
                .map_err(|e| Error::io("failed to seek to beginning", e))?;
            write_pod(stream, &out).map_err(|e| Error::io("failed to write header", e))?;
        }

        Ok(())
    }
}
