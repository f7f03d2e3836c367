use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Device,
    HostPinned,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 2] = [MemoryKind::Device, MemoryKind::HostPinned];
}

/// Owned handle to a device allocation. Returned to the device with [`super::Device::free`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DeviceBuffer {
    id: u64,
    kind: MemoryKind,
    address: u64,
    length: usize,
}

impl DeviceBuffer {
    pub fn new(
        id: u64,
        kind: MemoryKind,
        address: u64,
        length: usize,
    ) -> Self {
        Self {
            id,
            kind,
            address,
            length,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn range(
        &self,
        offset: usize,
        length: usize,
    ) -> BufferRange {
        BufferRange {
            buffer: self.id,
            address: self.address + offset as u64,
            offset,
            length,
        }
    }

    pub fn whole(&self) -> BufferRange {
        self.range(0, self.length)
    }
}

/// Borrowed view of `length` bytes at `offset` inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRange {
    pub buffer: u64,
    pub address: u64,
    pub offset: usize,
    pub length: usize,
}

impl BufferRange {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Leading `length` bytes of this range.
    pub fn prefix(
        &self,
        length: usize,
    ) -> BufferRange {
        BufferRange {
            length: length.min(self.length),
            ..*self
        }
    }
}
