use bitflags::bitflags;

bitflags! {
    /// Set of [`Header`] fields a codec reads or writes.
    ///
    /// A codec stores its set into every header it produces, and a writer
    /// session rejects headers carrying fields outside the set of its
    /// registered codec.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFields: u16 {
        const KERNEL_ADDRESS = 1 << 0;
        const RAMDISK_ADDRESS = 1 << 1;
        const SECONDBOOT_ADDRESS = 1 << 2;
        const KERNEL_TAGS_ADDRESS = 1 << 3;
        const PAGE_SIZE = 1 << 4;
        const BOARD_NAME = 1 << 5;
        const KERNEL_CMDLINE = 1 << 6;
        const ID = 1 << 7;
    }
}

impl Default for HeaderFields {
    fn default() -> Self {
        HeaderFields::empty()
    }
}

/// Format-independent description of a boot image.
///
/// Every field is individually optional. Which fields are meaningful for a
/// given image depends on the codec; see [`Header::supported_fields`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    supported_fields: HeaderFields,
    kernel_address: Option<u32>,
    ramdisk_address: Option<u32>,
    secondboot_address: Option<u32>,
    kernel_tags_address: Option<u32>,
    page_size: Option<u32>,
    board_name: Option<String>,
    kernel_cmdline: Option<String>,
    id: Option<[u8; 20]>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fields the originating codec honors.
    pub fn supported_fields(&self) -> HeaderFields {
        self.supported_fields
    }

    pub(crate) fn set_supported_fields(&mut self, fields: HeaderFields) {
        self.supported_fields = fields;
    }

    /// The fields currently present in this header.
    pub fn present_fields(&self) -> HeaderFields {
        let mut fields = HeaderFields::empty();
        if self.kernel_address.is_some() {
            fields |= HeaderFields::KERNEL_ADDRESS;
        }
        if self.ramdisk_address.is_some() {
            fields |= HeaderFields::RAMDISK_ADDRESS;
        }
        if self.secondboot_address.is_some() {
            fields |= HeaderFields::SECONDBOOT_ADDRESS;
        }
        if self.kernel_tags_address.is_some() {
            fields |= HeaderFields::KERNEL_TAGS_ADDRESS;
        }
        if self.page_size.is_some() {
            fields |= HeaderFields::PAGE_SIZE;
        }
        if self.board_name.is_some() {
            fields |= HeaderFields::BOARD_NAME;
        }
        if self.kernel_cmdline.is_some() {
            fields |= HeaderFields::KERNEL_CMDLINE;
        }
        if self.id.is_some() {
            fields |= HeaderFields::ID;
        }
        fields
    }

    pub fn kernel_address(&self) -> Option<u32> {
        self.kernel_address
    }

    pub fn set_kernel_address(&mut self, address: Option<u32>) {
        self.kernel_address = address;
    }

    pub fn ramdisk_address(&self) -> Option<u32> {
        self.ramdisk_address
    }

    pub fn set_ramdisk_address(&mut self, address: Option<u32>) {
        self.ramdisk_address = address;
    }

    pub fn secondboot_address(&self) -> Option<u32> {
        self.secondboot_address
    }

    pub fn set_secondboot_address(&mut self, address: Option<u32>) {
        self.secondboot_address = address;
    }

    pub fn kernel_tags_address(&self) -> Option<u32> {
        self.kernel_tags_address
    }

    pub fn set_kernel_tags_address(&mut self, address: Option<u32>) {
        self.kernel_tags_address = address;
    }

    pub fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: Option<u32>) {
        self.page_size = page_size;
    }

    pub fn board_name(&self) -> Option<&str> {
        self.board_name.as_deref()
    }

    pub fn set_board_name(&mut self, name: Option<String>) {
        self.board_name = name;
    }

    pub fn kernel_cmdline(&self) -> Option<&str> {
        self.kernel_cmdline.as_deref()
    }

    pub fn set_kernel_cmdline(&mut self, cmdline: Option<String>) {
        self.kernel_cmdline = cmdline;
    }

    /// SHA-1 identifier produced by a writer.
    pub fn id(&self) -> Option<&[u8; 20]> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: Option<[u8; 20]>) {
        self.id = id;
    }

    /// Reset every field, including the supported set.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
