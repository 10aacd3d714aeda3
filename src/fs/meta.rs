//! The superblock: the volume header and the info record that follows it
//! inside block 0.

use super::alloc::Bitmap;
use super::layout::{
    Geometry, InodeCounter, InodeKind, InodeRecord, VolumeHeader, BLOCK_SIZE, ROOT_INODE,
};
use super::{FSError, FileSystem, FsConfig, MountPolicy, Result};
use crate::store::BlockStore;
use packed_struct::prelude::*;
use tracing::{debug, info, warn};

/// Inode counter and free-block bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoRecord {
    /// Last inode number handed out. Only ever grows.
    pub inode_counter: u32,
    pub bitmap: Bitmap,
}

impl InfoRecord {
    /// Root already counted, reserved blocks already marked.
    pub fn fresh(geometry: &Geometry) -> Self {
        let mut bitmap = Bitmap::new(geometry.block_count);
        for block in 0..geometry.reserved_blocks() {
            bitmap.set(block);
        }
        Self {
            inode_counter: ROOT_INODE,
            bitmap,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let counter = InodeCounter {
            last_inode: self.inode_counter,
        };
        let mut buf = Vec::with_capacity(InodeCounter::SIZE + self.bitmap.as_bytes().len());
        buf.extend_from_slice(&counter.pack()?);
        buf.extend_from_slice(self.bitmap.as_bytes());
        Ok(buf)
    }

    pub fn decode(bytes: &[u8], geometry: &Geometry) -> Result<Self> {
        assert!(bytes.len() >= geometry.info_len(), "info record truncated");
        let counter = InodeCounter::unpack_from_slice(&bytes[..InodeCounter::SIZE])?;
        Ok(Self {
            inode_counter: counter.last_inode,
            bitmap: Bitmap::from_bytes(&bytes[InodeCounter::SIZE..], geometry.block_count),
        })
    }
}

impl<S: BlockStore> FileSystem<S> {
    /// Opens the volume held by `store`. What happens when the store holds
    /// no recognizable volume depends on `config.policy`.
    pub fn mount(store: S, config: FsConfig) -> Result<Self> {
        let mut buf = [0; VolumeHeader::SIZE];
        store.read_at(0, &mut buf);
        let header = VolumeHeader::unpack(&buf)?;
        if header.is_current() {
            if let Some(geometry) = Geometry::from_header(&header, store.capacity()) {
                let info = InfoRecord::decode(
                    &store.read(Geometry::INFO_OFFSET, geometry.info_len()),
                    &geometry,
                )?;
                debug!(
                    "Mounted volume: {} blocks, inode counter at {}",
                    geometry.block_count, info.inode_counter
                );
                return Ok(Self {
                    store,
                    geometry,
                    info,
                });
            }
        }
        let reason = if header.is_current() {
            "geometry does not fit the store"
        } else {
            "bad magic or version"
        };
        match config.policy {
            MountPolicy::Strict => Err(FSError::UnrecognizedVolume(reason)),
            MountPolicy::FormatOnMismatch => {
                warn!("Did not find a volume on the store ({reason}), formatting");
                Self::format(store, config)
            }
        }
    }

    /// Lays out a fresh volume, discarding whatever the store held, and
    /// creates the root directory as inode 1.
    pub fn format(mut store: S, config: FsConfig) -> Result<Self> {
        let geometry = Geometry::for_capacity(store.capacity(), config.inode_table_blocks)?;
        let reserved = geometry.reserved_blocks() as usize * BLOCK_SIZE;
        store.write_at(0, &vec![0; reserved]);
        store.write_at(0, &VolumeHeader::new(&geometry).pack()?);

        let mut fs = Self {
            store,
            geometry,
            info: InfoRecord::fresh(&geometry),
        };
        let root = InodeRecord::new(ROOT_INODE, InodeKind::Directory);
        fs.write_slot(0, &root)?;
        fs.init_new_directory(root, root)?;
        fs.persist_info()?;
        info!(
            "Formatted volume with {} blocks ({} for data), {} inode slots",
            geometry.block_count,
            geometry.data_blocks(),
            geometry.inode_slots()
        );
        Ok(fs)
    }

    pub(crate) fn persist_info(&mut self) -> Result<()> {
        let encoded = self.info.encode()?;
        self.store.write_at(Geometry::INFO_OFFSET, &encoded);
        Ok(())
    }
}
