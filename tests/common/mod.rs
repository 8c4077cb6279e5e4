//! Fixture helpers shared by the integration tests.
#![allow(dead_code)]

use std::io::Cursor;

use bootimg::constants::{BOOT_MAGIC, LOKI_MAGIC, LOKI_MAGIC_OFFSET};
use bootimg::{Entry, EntryType, Format, Header, IoStream, Writer};

pub fn put_le32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[derive(Clone, Copy, Default)]
pub struct RawHeaderSpec {
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub dt_size: u32,
}

/// Render a little-endian Android header into the first 608 bytes of
/// `data`.
pub fn put_android_header(data: &mut [u8], spec: &RawHeaderSpec) {
    data[..8].copy_from_slice(BOOT_MAGIC);
    put_le32(data, 8, spec.kernel_size);
    put_le32(data, 12, spec.kernel_addr);
    put_le32(data, 16, spec.ramdisk_size);
    put_le32(data, 20, spec.ramdisk_addr);
    put_le32(data, 24, spec.second_size);
    put_le32(data, 28, spec.second_addr);
    put_le32(data, 32, spec.tags_addr);
    put_le32(data, 36, spec.page_size);
    put_le32(data, 40, spec.dt_size);
}

/// Render a Loki sub-header at its fixed offset.
pub fn put_loki_header(
    data: &mut [u8],
    orig_kernel_size: u32,
    orig_ramdisk_size: u32,
    ramdisk_addr: u32,
) {
    let base = LOKI_MAGIC_OFFSET as usize;
    data[base..base + 4].copy_from_slice(LOKI_MAGIC);
    // recovery flag and build string stay zero.
    put_le32(data, base + 136, orig_kernel_size);
    put_le32(data, base + 140, orig_ramdisk_size);
    put_le32(data, base + 144, ramdisk_addr);
}

pub fn default_header() -> Header {
    let mut header = Header::new();
    header.set_page_size(Some(2048));
    header.set_kernel_address(Some(0x1000_8000));
    header.set_ramdisk_address(Some(0x1100_0000));
    header.set_secondboot_address(Some(0));
    header.set_kernel_tags_address(Some(0x1000_0100));
    header
}

/// Write a complete image through the public API and return its bytes.
pub fn write_image(format: Format, header: &Header, segments: [&[u8]; 4]) -> Vec<u8> {
    let mut writer = Writer::new(format).unwrap();
    writer.open(IoStream::new(Cursor::new(Vec::new()))).unwrap();
    writer.write_header(header).unwrap();

    let order = [
        EntryType::Kernel,
        EntryType::Ramdisk,
        EntryType::SecondBoot,
        EntryType::DeviceTree,
    ];
    for (entry_type, data) in order.into_iter().zip(segments) {
        writer.write_entry(&Entry::new(entry_type)).unwrap();
        if !data.is_empty() {
            writer.write_data(data).unwrap();
        }
        writer.finish_entry().unwrap();
    }
    writer.close().unwrap();

    writer
        .into_stream()
        .map(IoStream::into_inner)
        .map(Cursor::into_inner)
        .unwrap_or_default()
}

/// Drain the current entry of a reader.
pub fn read_all_data<S: bootimg::ByteStream>(reader: &mut bootimg::Reader<S>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = reader.read_data(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}
