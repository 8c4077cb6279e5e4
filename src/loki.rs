//! Reader for Loki-patched boot images.
//!
//! The Loki patcher scrambles the Android header, drops its own sub-header
//! at a fixed offset and appends a shellcode stub. None of the original
//! values survive verbatim, so reading is a reconstruction: new-style
//! images stash the original sizes in the sub-header, old-style images
//! require probing the kernel image header and scanning for the gzip
//! member that starts the ramdisk.

use std::io::SeekFrom;

use bytemuck::Zeroable;

use crate::android;
use crate::constants::{
    BOOT_MAGIC_SIZE, DEFAULT_KERNEL_OFFSET, DEFAULT_TAGS_OFFSET, LOKI_MAGIC, LOKI_MAGIC_OFFSET,
    LOKI_MAX_HEADER_OFFSET, LOKI_SHELLCODE, LOKI_SHELLCODE_SIZE, MAX_HEADER_OFFSET,
};
use crate::entry::{Entry, EntryType};
use crate::error::{AndroidError, Error, LokiError, Result};
use crate::format::Format;
use crate::header::{Header, HeaderFields};
use crate::layouts::{
    fix_loki_header_byte_order, RawAndroidHeader, RawLokiHeader, LOKI_HEADER_SIZE,
};
use crate::segment::{SegmentReader, SegmentReaderEntry};
use crate::stream::{read_fully, read_pod, stream_search, ByteStream, SearchAction};
use crate::utils::{align_to, trim_end};

const SUPPORTED_FIELDS: HeaderFields = android::SUPPORTED_FIELDS;

/// Load addresses used by LG bootloaders. Images patched for those devices
/// carry a page-sized aboot copy instead of the usual 0x200 bytes.
fn is_lg_ramdisk_address(address: u32) -> bool {
    address > 0x88f0_0000 || address == 0x4007_8000 || address == 0x10f0_0000
}

/// Find and read the Loki sub-header at its fixed offset.
pub(crate) fn find_loki_header<S: ByteStream>(stream: &mut S) -> Result<(RawLokiHeader, u64)> {
    stream
        .seek(SeekFrom::Start(LOKI_MAGIC_OFFSET))
        .map_err(|e| Error::io("Loki magic not found", e))?;

    let mut hdr = RawLokiHeader::zeroed();
    let n = read_pod(stream, &mut hdr).map_err(|e| Error::io("failed to read header", e))?;
    if n != LOKI_HEADER_SIZE {
        return Err(LokiError::LokiHeaderTooSmall.into());
    }

    if &hdr.magic != LOKI_MAGIC {
        return Err(LokiError::InvalidLokiMagic.into());
    }

    fix_loki_header_byte_order(&mut hdr);

    Ok((hdr, LOKI_MAGIC_OFFSET))
}

/// Recover the ramdisk load address.
///
/// Newer patchers store it inside the appended shellcode; the stub is
/// located by scanning for its code bytes, and when the pattern somehow
/// occurs more than once the last occurrence wins. Older patchers left
/// nothing behind, so the jflte default relative to the kernel address is
/// used instead.
fn find_ramdisk_address<S: ByteStream>(
    stream: &mut S,
    hdr: &RawAndroidHeader,
    loki_hdr: &RawLokiHeader,
) -> Result<u32> {
    if loki_hdr.ramdisk_addr == 0 {
        if hdr.kernel_addr > u32::MAX - 0x01ff_8000 {
            return Err(LokiError::InvalidKernelAddress(hdr.kernel_addr).into());
        }
        return Ok(hdr.kernel_addr + 0x01ff_8000);
    }

    let mut shellcode_offset = None;
    stream_search(
        stream,
        None,
        None,
        0,
        &LOKI_SHELLCODE[..LOKI_SHELLCODE_SIZE - 9],
        None,
        |_, offset| {
            shellcode_offset = Some(offset);
            Ok(SearchAction::Continue)
        },
    )
    .map_err(|e| Error::io("failed to search for Loki shellcode", e))?;

    let Some(offset) = shellcode_offset else {
        return Err(LokiError::ShellcodeNotFound.into());
    };

    stream
        .seek(SeekFrom::Start(offset + (LOKI_SHELLCODE_SIZE - 5) as u64))
        .map_err(|e| Error::io("failed to seek to ramdisk address", e))?;

    let mut addr = [0u8; 4];
    let n = read_fully(stream, &mut addr)
        .map_err(|e| Error::io("failed to read ramdisk address", e))?;
    if n != addr.len() {
        return Err(LokiError::UnexpectedEndOfFile.into());
    }

    Ok(u32::from_le_bytes(addr))
}

/// Recover the kernel size of an old-style image from the Linux image
/// header, which stores the end address at offset 0x2c.
fn find_linux_kernel_size<S: ByteStream>(stream: &mut S, kernel_offset: u32) -> Result<u32> {
    stream
        .seek(SeekFrom::Start(u64::from(kernel_offset) + 0x2c))
        .map_err(|e| Error::io("failed to seek to kernel header", e))?;

    let mut size = [0u8; 4];
    let n =
        read_fully(stream, &mut size).map_err(|e| Error::io("failed to read kernel size", e))?;
    if n != size.len() {
        return Err(LokiError::UnexpectedEndOfFile.into());
    }

    Ok(u32::from_le_bytes(size))
}

/// Scan forward from `start_offset` for the gzip member that starts the
/// ramdisk of an old-style image.
///
/// Candidates are deflate gzip headers (`1f 8b 08`). A flags byte of 0x08
/// (original-filename set, typical of ramdisks packed with the gzip tool)
/// is preferred over 0x00; within each class the first occurrence wins.
fn find_gzip_offset_old<S: ByteStream>(stream: &mut S, start_offset: u64) -> Result<u64> {
    const GZIP_DEFLATE_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

    let mut flag0_offset: Option<u64> = None;
    let mut flag8_offset: Option<u64> = None;

    stream_search(
        stream,
        Some(start_offset),
        None,
        0,
        &GZIP_DEFLATE_MAGIC,
        None,
        |stream, offset| {
            if flag0_offset.is_some() && flag8_offset.is_some() {
                return Ok(SearchAction::Stop);
            }

            stream.seek(SeekFrom::Start(offset + 3))?;
            let mut flags = [0u8; 1];
            if read_fully(stream, &mut flags)? != 1 {
                return Ok(SearchAction::Stop);
            }

            if flag0_offset.is_none() && flags[0] == 0x00 {
                flag0_offset = Some(offset);
            } else if flag8_offset.is_none() && flags[0] == 0x08 {
                flag8_offset = Some(offset);
            }

            Ok(SearchAction::Continue)
        },
    )
    .map_err(|e| Error::io("failed to search for gzip magic", e))?;

    flag8_offset
        .or(flag0_offset)
        .ok_or_else(|| LokiError::NoRamdiskGzipHeaderFound.into())
}

/// Recover the ramdisk size of an old-style image. The ramdisk runs from
/// the gzip header to the copy of aboot that the patcher parked at the end
/// of the file; trailing zero padding is left in place.
fn find_ramdisk_size_old<S: ByteStream>(
    stream: &mut S,
    hdr: &RawAndroidHeader,
    ramdisk_offset: u64,
) -> Result<u32> {
    let aboot_size = if is_lg_ramdisk_address(hdr.ramdisk_addr) {
        i64::from(hdr.page_size)
    } else {
        0x200
    };

    let aboot_offset = stream
        .seek(SeekFrom::End(-aboot_size))
        .map_err(|e| Error::io("failed to seek to end of file", e))?;

    if ramdisk_offset > aboot_offset {
        return Err(LokiError::RamdiskOffsetGreaterThanAbootOffset.into());
    }

    Ok((aboot_offset - ramdisk_offset) as u32)
}

fn convert_header(hdr: &RawAndroidHeader, ramdisk_addr: u32, tags_addr: u32) -> Header {
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
    header.set_ramdisk_address(Some(ramdisk_addr));
    header.set_secondboot_address(Some(hdr.second_addr));
    header.set_kernel_tags_address(Some(tags_addr));
    header
}

/// Segment layout recovered from a patched image.
struct RecoveredLayout {
    header: Header,
    kernel_offset: u64,
    kernel_size: u32,
    ramdisk_offset: u64,
    ramdisk_size: u32,
    dt_offset: u64,
}

pub(crate) struct LokiReader {
    hdr: RawAndroidHeader,
    loki_hdr: RawLokiHeader,
    header_offset: Option<u64>,
    loki_offset: Option<u64>,
    seg: SegmentReader,
}

impl LokiReader {
    pub fn new() -> Self {
        Self {
            hdr: RawAndroidHeader::zeroed(),
            loki_hdr: RawLokiHeader::zeroed(),
            header_offset: None,
            loki_offset: None,
            seg: SegmentReader::new(),
        }
    }

    pub fn format(&self) -> Format {
        Format::Loki
    }

    /// Bid on the stream: 32 bits for the Loki magic plus 64 for the
    /// Android header magic.
    pub fn bid<S: ByteStream>(&mut self, stream: &mut S, best_bid: u32) -> Result<Option<u32>> {
        if best_bid as usize >= (LOKI_MAGIC.len() + BOOT_MAGIC_SIZE) * 8 {
            return Ok(None);
        }

        let mut bid = 0u32;

        match find_loki_header(stream) {
            Ok((loki_hdr, offset)) => {
                self.loki_hdr = loki_hdr;
                self.loki_offset = Some(offset);
                bid += (LOKI_MAGIC.len() * 8) as u32;
            }
            Err(Error::Loki(_)) => return Ok(Some(0)),
            Err(e) => return Err(e),
        }

        match android::find_header(stream, LOKI_MAX_HEADER_OFFSET) {
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

        Ok(Some(bid))
    }

    pub fn read_header<S: ByteStream>(&mut self, stream: &mut S) -> Result<Header> {
        // No bid happened if the caller forced this format.
        if self.loki_offset.is_none() {
            let (loki_hdr, offset) = find_loki_header(stream)?;
            self.loki_hdr = loki_hdr;
            self.loki_offset = Some(offset);
        }
        if self.header_offset.is_none() {
            let (hdr, offset) = android::find_header(stream, MAX_HEADER_OFFSET)?;
            self.hdr = hdr;
            self.header_offset = Some(offset);
        }

        // New-style images record the original values of the fields the
        // patcher clobbered.
        let new_style = self.loki_hdr.orig_kernel_size != 0
            && self.loki_hdr.orig_ramdisk_size != 0
            && self.loki_hdr.ramdisk_addr != 0;

        let layout = if new_style {
            self.read_header_new(stream)?
        } else {
            self.read_header_old(stream)?
        };

        let mut entries = vec![
            SegmentReaderEntry {
                entry_type: EntryType::Kernel,
                offset: layout.kernel_offset,
                size: u64::from(layout.kernel_size),
                can_be_empty: false,
            },
            SegmentReaderEntry {
                entry_type: EntryType::Ramdisk,
                offset: layout.ramdisk_offset,
                size: u64::from(layout.ramdisk_size),
                can_be_empty: false,
            },
        ];
        if self.hdr.dt_size > 0 && layout.dt_offset != 0 {
            entries.push(SegmentReaderEntry {
                entry_type: EntryType::DeviceTree,
                offset: layout.dt_offset,
                size: u64::from(self.hdr.dt_size),
                can_be_empty: false,
            });
        }

        self.seg.set_entries(entries)?;

        Ok(layout.header)
    }

    fn read_header_new<S: ByteStream>(&self, stream: &mut S) -> Result<RecoveredLayout> {
        let hdr = &self.hdr;

        if hdr.page_size == 0 {
            return Err(LokiError::PageSizeCannotBeZero.into());
        }

        // The patcher wedged a fake chunk between ramdisk and device tree;
        // its size depends on the bootloader family.
        let fake_size = if is_lg_ramdisk_address(hdr.ramdisk_addr) {
            hdr.page_size
        } else {
            0x200
        };

        let ramdisk_addr = find_ramdisk_address(stream, hdr, &self.loki_hdr)?;
        let header = convert_header(hdr, ramdisk_addr, hdr.tags_addr);

        let page_size = u64::from(hdr.page_size);
        let mut pos = page_size;

        let kernel_offset = pos;
        pos = align_to(pos + u64::from(self.loki_hdr.orig_kernel_size), page_size);

        let ramdisk_offset = pos;
        pos = align_to(pos + u64::from(self.loki_hdr.orig_ramdisk_size), page_size);

        if hdr.dt_size != 0 {
            pos += u64::from(fake_size);
        }
        let dt_offset = pos;

        Ok(RecoveredLayout {
            header,
            kernel_offset,
            kernel_size: self.loki_hdr.orig_kernel_size,
            ramdisk_offset,
            ramdisk_size: self.loki_hdr.orig_ramdisk_size,
            dt_offset,
        })
    }

    fn read_header_old<S: ByteStream>(&self, stream: &mut S) -> Result<RecoveredLayout> {
        let hdr = &self.hdr;

        if hdr.page_size == 0 {
            return Err(LokiError::PageSizeCannotBeZero.into());
        }

        // The tags address was clobbered by the patcher; reconstruct it
        // from the jflte offsets.
        let tags_addr = hdr
            .kernel_addr
            .wrapping_sub(DEFAULT_KERNEL_OFFSET)
            .wrapping_add(DEFAULT_TAGS_OFFSET);

        let kernel_size = find_linux_kernel_size(stream, hdr.page_size)?;

        let gzip_start =
            u64::from(hdr.page_size) + align_to(u64::from(kernel_size), u64::from(hdr.page_size));
        let gzip_offset = find_gzip_offset_old(stream, gzip_start)?;

        let ramdisk_size = find_ramdisk_size_old(stream, hdr, gzip_offset)?;

        let ramdisk_addr = find_ramdisk_address(stream, hdr, &self.loki_hdr)?;
        let header = convert_header(hdr, ramdisk_addr, tags_addr);

        Ok(RecoveredLayout {
            header,
            kernel_offset: u64::from(hdr.page_size),
            kernel_size,
            ramdisk_offset: gzip_offset,
            ramdisk_size,
            dt_offset: 0,
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::IoStream;
    use std::io::Cursor;

    #[test]
    fn lg_ramdisk_addresses() {
        assert!(is_lg_ramdisk_address(0x88f0_0001));
        assert!(is_lg_ramdisk_address(0x4007_8000));
        assert!(is_lg_ramdisk_address(0x10f0_0000));
        assert!(!is_lg_ramdisk_address(0x1100_0000));
        assert!(!is_lg_ramdisk_address(0x88f0_0000));
    }

    #[test]
    fn loki_header_requires_magic() {
        let mut data = vec![0u8; 4096];
        data[LOKI_MAGIC_OFFSET as usize..LOKI_MAGIC_OFFSET as usize + 4].copy_from_slice(b"NOPE");
        let mut stream = IoStream::new(Cursor::new(data));
        let err = find_loki_header(&mut stream).unwrap_err();
        assert!(matches!(err, Error::Loki(LokiError::InvalidLokiMagic)));
    }

    #[test]
    fn loki_header_requires_full_size() {
        let data = vec![0u8; LOKI_MAGIC_OFFSET as usize + 16];
        let mut stream = IoStream::new(Cursor::new(data));
        let err = find_loki_header(&mut stream).unwrap_err();
        assert!(matches!(err, Error::Loki(LokiError::LokiHeaderTooSmall)));
    }

    #[test]
    fn default_ramdisk_address_checks_overflow() {
        let mut stream = IoStream::new(Cursor::new(vec![0u8; 64]));

        let mut hdr = RawAndroidHeader::zeroed();
        hdr.kernel_addr = 0x1000_8000;
        let loki_hdr = RawLokiHeader::zeroed();
        assert_eq!(
            find_ramdisk_address(&mut stream, &hdr, &loki_hdr).unwrap(),
            0x1200_0000
        );

        hdr.kernel_addr = u32::MAX - 0x01ff_8000 + 1;
        let err = find_ramdisk_address(&mut stream, &hdr, &loki_hdr).unwrap_err();
        assert!(matches!(
            err,
            Error::Loki(LokiError::InvalidKernelAddress(_))
        ));
    }

    #[test]
    fn shellcode_address_takes_last_match() {
        // Two stubs; the later one carries the address that counts.
        let mut data = vec![0u8; 4096];
        let pattern = &LOKI_SHELLCODE[..LOKI_SHELLCODE_SIZE - 9];
        data[100..100 + pattern.len()].copy_from_slice(pattern);
        data[100 + LOKI_SHELLCODE_SIZE - 5..100 + LOKI_SHELLCODE_SIZE - 1]
            .copy_from_slice(&0xdead_0000u32.to_le_bytes());
        data[900..900 + pattern.len()].copy_from_slice(pattern);
        data[900 + LOKI_SHELLCODE_SIZE - 5..900 + LOKI_SHELLCODE_SIZE - 1]
            .copy_from_slice(&0x1100_0000u32.to_le_bytes());

        let mut stream = IoStream::new(Cursor::new(data));
        let hdr = RawAndroidHeader::zeroed();
        let mut loki_hdr = RawLokiHeader::zeroed();
        loki_hdr.ramdisk_addr = 0x1234_5678;

        assert_eq!(
            find_ramdisk_address(&mut stream, &hdr, &loki_hdr).unwrap(),
            0x1100_0000
        );
    }

    #[test]
    fn missing_shellcode_is_an_error() {
        let mut stream = IoStream::new(Cursor::new(vec![0u8; 1024]));
        let hdr = RawAndroidHeader::zeroed();
        let mut loki_hdr = RawLokiHeader::zeroed();
        loki_hdr.ramdisk_addr = 0x1100_0000;

        let err = find_ramdisk_address(&mut stream, &hdr, &loki_hdr).unwrap_err();
        assert!(matches!(err, Error::Loki(LokiError::ShellcodeNotFound)));
    }

    #[test]
    fn gzip_scan_prefers_filename_flag() {
        let mut data = vec![0u8; 4096];
        // flags 0x00 at 1000, flags 0x08 at 2000; 0x08 wins despite coming
        // later.
        data[1000..1003].copy_from_slice(&[0x1f, 0x8b, 0x08]);
        data[1003] = 0x00;
        data[2000..2003].copy_from_slice(&[0x1f, 0x8b, 0x08]);
        data[2003] = 0x08;

        let mut stream = IoStream::new(Cursor::new(data));
        assert_eq!(find_gzip_offset_old(&mut stream, 0).unwrap(), 2000);
    }

    #[test]
    fn gzip_scan_accepts_plain_flags() {
        let mut data = vec![0u8; 4096];
        data[1500..1503].copy_from_slice(&[0x1f, 0x8b, 0x08]);
        data[1503] = 0x00;
        // Unrelated flags byte; not a candidate.
        data[800..803].copy_from_slice(&[0x1f, 0x8b, 0x08]);
        data[803] = 0x04;

        let mut stream = IoStream::new(Cursor::new(data));
        assert_eq!(find_gzip_offset_old(&mut stream, 0).unwrap(), 1500);

        let mut stream = IoStream::new(Cursor::new(vec![0u8; 512]));
        let err = find_gzip_offset_old(&mut stream, 0).unwrap_err();
        assert!(matches!(
            err,
            Error::Loki(LokiError::NoRamdiskGzipHeaderFound)
        ));
    }

    #[test]
    fn old_ramdisk_size_spans_to_aboot() {
        let mut hdr = RawAndroidHeader::zeroed();
        hdr.page_size = 2048;
        hdr.ramdisk_addr = 0x1100_0000;

        let mut stream = IoStream::new(Cursor::new(vec![0u8; 10240]));
        assert_eq!(
            find_ramdisk_size_old(&mut stream, &hdr, 6144).unwrap(),
            10240 - 0x200 - 6144
        );

        // LG images park a whole page of aboot at the end.
        hdr.ramdisk_addr = 0x4007_8000;
        let mut stream = IoStream::new(Cursor::new(vec![0u8; 10240]));
        assert_eq!(
            find_ramdisk_size_old(&mut stream, &hdr, 6144).unwrap(),
            10240 - 2048 - 6144
        );

        let err = find_ramdisk_size_old(&mut stream, &hdr, 9000).unwrap_err();
        assert!(matches!(
            err,
            Error::Loki(LokiError::RamdiskOffsetGreaterThanAbootOffset)
        ));
    }
}
