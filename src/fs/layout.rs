//! On-disk records of a chainfs volume.
//!
//! The volume is an array of `BLOCK_SIZE` blocks:
//!
//! | Block        | Content                                             |
//! |--------------|-----------------------------------------------------|
//! | 0            | [`VolumeHeader`], then the info record (inode        |
//! |              | counter + free-block bitmap)                        |
//! | 1 ..= N      | inode table, a flat array of [`InodeRecord`]s        |
//! | N+1 ..       | data blocks: a [`ChainLink`] followed by the payload |
//!
//! Every record is packed and unpacked through `packed_struct`
//! with an explicit width, the in-memory layout never matters.

use super::{FSError, Result};
use packed_struct::prelude::*;

pub const BLOCK_SIZE: usize = 512;
/// Size of the reference simulated device.
pub const DEFAULT_VOLUME_SIZE: usize = 1024 * 1024;
pub const DEFAULT_INODE_TABLE_BLOCKS: u32 = 8;
/// Inode number 0 marks an empty inode table slot.
pub const EMPTY_INODE: u32 = 0;
pub const ROOT_INODE: u32 = 1;
/// Width of the name buffer inside a directory entry
pub const NAME_LEN: usize = 28;
// the derive below needs a literal array length
const _: () = assert!(NAME_LEN == 28);
/// Content bytes a single data block holds.
pub const PAYLOAD_SIZE: usize = BLOCK_SIZE - ChainLink::SIZE;

#[derive(PackedStruct, Debug, Clone, Copy, PartialEq)]
#[packed_struct(endian = "lsb")]
pub struct VolumeHeader {
    /// Always "CHFS"
    pub magic: [u8; 4],
    pub version: u32,
    /// The geometry the volume was formatted with.
    pub block_size: u32,
    pub block_count: u32,
    pub inode_table_blocks: u32,
}

impl VolumeHeader {
    pub const SIZE: usize = 20;
    pub const MAGIC: &'static [u8; 4] = b"CHFS";
    pub const VERSION: u32 = 1;

    pub fn new(geometry: &Geometry) -> Self {
        Self {
            magic: *Self::MAGIC,
            version: Self::VERSION,
            block_size: BLOCK_SIZE as u32,
            block_count: geometry.block_count,
            inode_table_blocks: geometry.inode_table_blocks,
        }
    }

    pub fn is_current(&self) -> bool {
        &self.magic == Self::MAGIC && self.version == Self::VERSION
    }
}

#[derive(PrimitiveEnum_u8, Clone, Copy, PartialEq, Eq, Debug)]
pub enum InodeKind {
    File = 0,
    Directory = 1,
}

/// One slot of the inode table.
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq)]
#[packed_struct(endian = "lsb")]
pub struct InodeRecord {
    pub inode: u32,
    #[packed_field(element_size_bytes = "1", ty = "enum")]
    pub kind: InodeKind,
    pub reserved: [u8; 3],
    /// 0 for an empty file, block 0 never holds data
    pub first_block: u32,
    /// Authoritative content length in bytes
    pub size: u32,
}

impl InodeRecord {
    pub const SIZE: usize = 16;

    pub fn new(inode: u32, kind: InodeKind) -> Self {
        Self {
            inode,
            kind,
            reserved: [0; 3],
            first_block: 0,
            size: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(EMPTY_INODE, InodeKind::File)
    }

    pub fn is_empty(&self) -> bool {
        self.inode == EMPTY_INODE
    }

    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }
}

/// A (inode, name) pair stored inside a directory's content.
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq)]
#[packed_struct(endian = "lsb")]
pub struct DirEntryRecord {
    pub inode: u32,
    /// NUL padded
    pub name: [u8; 28],
}

impl DirEntryRecord {
    pub const SIZE: usize = 4 + NAME_LEN;

    pub fn new(inode: u32, name: &str) -> Result<Self> {
        validate_name(name)?;
        let mut buf = [0; NAME_LEN];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self { inode, name: buf })
    }

    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn name_eq(&self, name: &str) -> bool {
        let name = name.as_bytes();
        name.len() <= NAME_LEN
            && self.name[..name.len()] == *name
            && self.name[name.len()..].iter().all(|&b| b == 0)
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > NAME_LEN || name.contains('/') || name.contains('\0') {
        return Err(FSError::InvalidName {
            name: name.to_string(),
            max: NAME_LEN,
        });
    }
    Ok(())
}

/// Leading field of every data block.
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq)]
#[packed_struct(endian = "lsb")]
pub struct ChainLink {
    /// 0 terminates the chain
    pub next_block: u32,
}

impl ChainLink {
    pub const SIZE: usize = 4;
}

/// Leading field of the info record in block 0.
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq)]
#[packed_struct(endian = "lsb")]
pub struct InodeCounter {
    pub last_inode: u32,
}

impl InodeCounter {
    pub const SIZE: usize = 4;
}

/// Leading field of a directory's content, followed by that many
/// [`DirEntryRecord`]s.
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq)]
#[packed_struct(endian = "lsb")]
pub struct DirHeader {
    pub entry_count: u32,
}

impl DirHeader {
    pub const SIZE: usize = 4;
}

/// Builds a whole data block: the link, the payload, zero padding.
pub fn encode_data_block(next_block: u32, payload: &[u8]) -> Result<Vec<u8>> {
    assert!(payload.len() <= PAYLOAD_SIZE, "payload exceeds a block");
    let mut block = vec![0; BLOCK_SIZE];
    block[..ChainLink::SIZE].copy_from_slice(&ChainLink { next_block }.pack()?);
    block[ChainLink::SIZE..ChainLink::SIZE + payload.len()].copy_from_slice(payload);
    Ok(block)
}

/// Number of chain blocks needed to hold `size` bytes.
pub fn blocks_for(size: usize) -> usize {
    size.div_ceil(PAYLOAD_SIZE)
}

/// Placement of the regions, derived from the store capacity at format
/// time and from the header afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_count: u32,
    pub inode_table_blocks: u32,
}

impl Geometry {
    /// Info record begins right after the header.
    pub const INFO_OFFSET: usize = VolumeHeader::SIZE;

    pub fn for_capacity(capacity: usize, inode_table_blocks: u32) -> Result<Self> {
        let geometry = Self {
            block_count: (capacity / BLOCK_SIZE).min(u32::MAX as usize) as u32,
            inode_table_blocks,
        };
        if !geometry.is_valid() {
            return Err(FSError::InvalidGeometry {
                capacity,
                inode_table_blocks,
            });
        }
        Ok(geometry)
    }

    /// Returns `None` when the header describes a volume this store
    /// cannot hold.
    pub fn from_header(header: &VolumeHeader, capacity: usize) -> Option<Self> {
        let geometry = Self {
            block_count: header.block_count,
            inode_table_blocks: header.inode_table_blocks,
        };
        let fits = geometry.block_count as usize * BLOCK_SIZE <= capacity;
        (header.block_size as usize == BLOCK_SIZE && fits && geometry.is_valid())
            .then_some(geometry)
    }

    fn is_valid(&self) -> bool {
        // header, info and at least one inode block plus one data block.
        // Bounding the inode table first keeps `reserved_blocks` in range.
        self.inode_table_blocks >= 1
            && self.inode_table_blocks < self.block_count
            && self.block_count > self.first_data_block()
            && Self::INFO_OFFSET + self.info_len() <= BLOCK_SIZE
    }

    pub fn bitmap_len(&self) -> usize {
        (self.block_count as usize).div_ceil(8)
    }

    /// Inode counter plus the bitmap.
    pub fn info_len(&self) -> usize {
        InodeCounter::SIZE + self.bitmap_len()
    }

    /// Header, info and the inode table.
    pub fn reserved_blocks(&self) -> u32 {
        1 + self.inode_table_blocks
    }

    pub fn first_data_block(&self) -> u32 {
        self.reserved_blocks()
    }

    pub fn data_blocks(&self) -> u32 {
        self.block_count - self.reserved_blocks()
    }

    pub fn inode_table_offset(&self) -> usize {
        BLOCK_SIZE
    }

    pub fn inode_table_len(&self) -> usize {
        self.inode_table_blocks as usize * BLOCK_SIZE
    }

    pub fn inode_slots(&self) -> usize {
        self.inode_table_len() / InodeRecord::SIZE
    }

    pub fn block_offset(&self, block: u32) -> usize {
        assert!(block < self.block_count, "block index out of range");
        block as usize * BLOCK_SIZE
    }
}
