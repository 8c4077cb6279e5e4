/// Payload segment kinds, in their fixed on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Kernel,
    Ramdisk,
    SecondBoot,
    DeviceTree,
}

/// A typed payload descriptor.
///
/// Readers produce one entry per segment; writers consume them in segment
/// order. Two entries compare equal when both type and size match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Entry {
    entry_type: Option<EntryType>,
    size: Option<u64>,
}

impl Entry {
    pub fn new(entry_type: EntryType) -> Self {
        Self {
            entry_type: Some(entry_type),
            size: None,
        }
    }

    pub fn entry_type(&self) -> Option<EntryType> {
        self.entry_type
    }

    pub fn set_entry_type(&mut self, entry_type: Option<EntryType>) {
        self.entry_type = entry_type;
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn set_size(&mut self, size: Option<u64>) {
        self.size = size;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
