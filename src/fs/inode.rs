//! The inode table: a flat run of fixed-size slots after block 0.
//! Slot order means nothing, records are found by scanning for their
//! inode number.

use super::layout::{InodeKind, InodeRecord, EMPTY_INODE};
use super::{FSError, FileSystem, Result};
use crate::store::BlockStore;
use packed_struct::prelude::*;
use tracing::debug;

impl<S: BlockStore> FileSystem<S> {
    fn slot_offset(&self, slot: usize) -> usize {
        assert!(slot < self.geometry.inode_slots(), "inode slot out of range");
        self.geometry.inode_table_offset() + slot * InodeRecord::SIZE
    }

    pub(crate) fn write_slot(&mut self, slot: usize, record: &InodeRecord) -> Result<()> {
        let offset = self.slot_offset(slot);
        self.store.write_at(offset, &record.pack()?);
        Ok(())
    }

    /// Index of the slot holding `inode`.
    fn find_slot(&self, inode: u32) -> Result<Option<usize>> {
        let table = self.store.read(
            self.geometry.inode_table_offset(),
            self.geometry.inode_table_len(),
        );
        for (slot, raw) in table.chunks_exact(InodeRecord::SIZE).enumerate() {
            if InodeRecord::unpack_from_slice(raw)?.inode == inode {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// Hands out the next inode number and stores a fresh record for it in
    /// the first empty slot.
    pub(crate) fn allocate_entry(&mut self, kind: InodeKind) -> Result<InodeRecord> {
        let slot = self
            .find_slot(EMPTY_INODE)?
            .ok_or(FSError::InodeTableFull)?;
        self.info.inode_counter += 1;
        let record = InodeRecord::new(self.info.inode_counter, kind);
        self.write_slot(slot, &record)?;
        self.persist_info()?;
        debug!("Allocated inode {} ({:?}) in slot {slot}", record.inode, kind);
        Ok(record)
    }

    /// Looks up the record of `inode`. `None` when no slot holds it;
    /// inode 0 is the empty-slot marker and is never found.
    pub fn find_by_inode(&self, inode: u32) -> Result<Option<InodeRecord>> {
        if inode == EMPTY_INODE {
            return Ok(None);
        }
        match self.find_slot(inode)? {
            Some(slot) => {
                let raw = self.store.read(self.slot_offset(slot), InodeRecord::SIZE);
                Ok(Some(InodeRecord::unpack_from_slice(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Overwrites the slot holding `record.inode`.
    pub(crate) fn update_entry(&mut self, record: &InodeRecord) -> Result<()> {
        if record.inode == EMPTY_INODE {
            return Err(FSError::InodeNotFound(record.inode));
        }
        let slot = self
            .find_slot(record.inode)?
            .ok_or(FSError::InodeNotFound(record.inode))?;
        self.write_slot(slot, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::layout::{BLOCK_SIZE, ROOT_INODE};
    use crate::fs::FsConfig;
    use crate::store::MemoryStore;

    fn small_fs() -> FileSystem<MemoryStore> {
        let config = FsConfig {
            inode_table_blocks: 1,
            ..FsConfig::default()
        };
        FileSystem::format(MemoryStore::new(BLOCK_SIZE * 16), config).unwrap()
    }

    #[test]
    fn test_root_is_inode_one() {
        let fs = small_fs();
        let root = fs.find_by_inode(ROOT_INODE).unwrap().unwrap();
        assert!(root.is_dir());
        assert_ne!(root.first_block, 0);
        assert!(fs.find_by_inode(0).unwrap().is_none());
        assert!(fs.find_by_inode(2).unwrap().is_none());
    }

    #[test]
    fn test_allocate_and_update() {
        let mut fs = small_fs();
        let mut file = fs.allocate_entry(InodeKind::File).unwrap();
        let dir = fs.allocate_entry(InodeKind::Directory).unwrap();
        assert_eq!((file.inode, dir.inode), (2, 3));

        file.size = 99;
        fs.update_entry(&file).unwrap();
        assert_eq!(fs.find_by_inode(2).unwrap(), Some(file));
        assert_eq!(fs.find_by_inode(3).unwrap(), Some(dir));
    }

    #[test]
    fn test_update_unknown_inode() {
        let mut fs = small_fs();
        let stray = InodeRecord::new(50, InodeKind::File);
        assert!(matches!(
            fs.update_entry(&stray),
            Err(FSError::InodeNotFound(50))
        ));
    }

    #[test]
    fn test_table_full() {
        let mut fs = small_fs();
        // the root holds one of the slots
        let slots = BLOCK_SIZE / InodeRecord::SIZE;
        for _ in 1..slots {
            fs.allocate_entry(InodeKind::File).unwrap();
        }
        let counter = fs.info.inode_counter;
        assert!(matches!(
            fs.allocate_entry(InodeKind::File),
            Err(FSError::InodeTableFull)
        ));
        assert_eq!(fs.info.inode_counter, counter);
    }
}
