//! Raw on-disk layouts.
//!
//! Integer fields are little-endian on disk and host order in memory. The
//! `fix_*_byte_order` functions convert between the two; the conversion is
//! an involution, so the same function is applied once right after reading
//! and once right before writing.

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

use crate::constants::{BOOT_ARGS_SIZE, BOOT_ID_SIZE, BOOT_MAGIC_SIZE, BOOT_NAME_SIZE, LOKI_MAGIC_SIZE};

/// On-disk Android boot image header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct RawAndroidHeader {
    pub magic: [u8; BOOT_MAGIC_SIZE],
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub dt_size: u32,
    pub unused: u32,
    pub name: [u8; BOOT_NAME_SIZE],
    pub cmdline: [u8; BOOT_ARGS_SIZE],
    pub id: [u8; BOOT_ID_SIZE],
}

pub(crate) const ANDROID_HEADER_SIZE: usize = size_of::<RawAndroidHeader>();

const _: () = assert!(ANDROID_HEADER_SIZE == 608);

pub(crate) fn fix_android_header_byte_order(hdr: &mut RawAndroidHeader) {
    hdr.kernel_size = u32::from_le(hdr.kernel_size);
    hdr.kernel_addr = u32::from_le(hdr.kernel_addr);
    hdr.ramdisk_size = u32::from_le(hdr.ramdisk_size);
    hdr.ramdisk_addr = u32::from_le(hdr.ramdisk_addr);
    hdr.second_size = u32::from_le(hdr.second_size);
    hdr.second_addr = u32::from_le(hdr.second_addr);
    hdr.tags_addr = u32::from_le(hdr.tags_addr);
    hdr.page_size = u32::from_le(hdr.page_size);
    hdr.dt_size = u32::from_le(hdr.dt_size);
    hdr.unused = u32::from_le(hdr.unused);
}

/// On-disk Loki sub-header, found at [`crate::constants::LOKI_MAGIC_OFFSET`].
///
/// Old-style patched images leave the three trailing fields zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct RawLokiHeader {
    pub magic: [u8; LOKI_MAGIC_SIZE],
    pub recovery: u32,
    // Kept for the on-disk layout; nothing downstream consumes it.
    #[allow(dead_code)]
    pub build: [u8; 128],
    pub orig_kernel_size: u32,
    pub orig_ramdisk_size: u32,
    pub ramdisk_addr: u32,
}

pub(crate) const LOKI_HEADER_SIZE: usize = size_of::<RawLokiHeader>();

const _: () = assert!(LOKI_HEADER_SIZE == 148);

pub(crate) fn fix_loki_header_byte_order(hdr: &mut RawLokiHeader) {
    hdr.recovery = u32::from_le(hdr.recovery);
    hdr.orig_kernel_size = u32::from_le(hdr.orig_kernel_size);
    hdr.orig_ramdisk_size = u32::from_le(hdr.orig_ramdisk_size);
    hdr.ramdisk_addr = u32::from_le(hdr.ramdisk_addr);
}
