//! This module stores file content
//! as a singly linked chain of data
//! blocks. It reads chains, rewrites
//! them in place, and grows or shrinks
//! them by only the block delta.

use super::alloc::{allocate_chain, free_chain, read_link};
use super::layout::{
    blocks_for, encode_data_block, ChainLink, InodeRecord, BLOCK_SIZE, PAYLOAD_SIZE,
};
use super::{FileSystem, Result};
use crate::store::BlockStore;
use tracing::{debug, trace};

impl<S: BlockStore> FileSystem<S> {
    /// Reads the `entry.size` bytes held by the chain starting at
    /// `entry.first_block`.
    pub(crate) fn read_content(&self, entry: &InodeRecord) -> Result<Vec<u8>> {
        let size = entry.size as usize;
        let mut content = Vec::with_capacity(size);
        let mut current = entry.first_block;
        while current != 0 && content.len() < size {
            let block = self.store.read(self.geometry.block_offset(current), BLOCK_SIZE);
            let take = (size - content.len()).min(PAYLOAD_SIZE);
            content.extend_from_slice(&block[ChainLink::SIZE..ChainLink::SIZE + take]);
            trace!("Read {take} bytes of inode {} from block {current}", entry.inode);
            current = read_link(&self.store, &self.geometry, current)?;
        }
        Ok(content)
    }

    /// Block indices of the chain, head first.
    pub(crate) fn chain_of(&self, entry: &InodeRecord) -> Result<Vec<u32>> {
        let mut chain = Vec::new();
        let mut current = entry.first_block;
        while current != 0 {
            chain.push(current);
            current = read_link(&self.store, &self.geometry, current)?;
        }
        Ok(chain)
    }

    /// Replaces the content of `entry` with `bytes`, then persists the
    /// inode record and the info record.
    ///
    /// Existing blocks are rewritten in place. Growth allocates only the
    /// missing tail (tail-first) and splices it after the old last block,
    /// shrinkage cuts the chain after the last needed block and frees the
    /// rest.
    pub(crate) fn write_content(&mut self, entry: &mut InodeRecord, bytes: &[u8]) -> Result<()> {
        let chunks: Vec<&[u8]> = bytes.chunks(PAYLOAD_SIZE).collect();
        let old_blocks = blocks_for(entry.size as usize);
        let new_blocks = chunks.len();
        debug!(
            "Writing {} bytes to inode {} ({old_blocks} -> {new_blocks} blocks)",
            bytes.len(),
            entry.inode
        );

        if new_blocks == 0 {
            free_chain(&self.store, &self.geometry, &mut self.info, entry.first_block)?;
            entry.first_block = 0;
        } else if entry.first_block == 0 {
            entry.first_block =
                allocate_chain(&mut self.store, &self.geometry, &mut self.info, &chunks)?;
        } else if new_blocks > old_blocks {
            let back_block = allocate_chain(
                &mut self.store,
                &self.geometry,
                &mut self.info,
                &chunks[old_blocks..],
            )?;
            self.rewrite_chain(entry.first_block, &chunks[..old_blocks], Some(back_block))?;
        } else {
            self.rewrite_chain(entry.first_block, &chunks, None)?;
        }

        entry.size = bytes.len() as u32;
        self.update_entry(entry)?;
        self.persist_info()?;
        Ok(())
    }

    /// Overwrites the payload of the first `chunks.len()` blocks of the
    /// chain at `head`. The last rewritten block is linked to `splice` if
    /// given, otherwise it ends the chain and whatever followed it is
    /// freed.
    fn rewrite_chain(&mut self, head: u32, chunks: &[&[u8]], splice: Option<u32>) -> Result<()> {
        let mut current = head;
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(current != 0, "chain shorter than its recorded size");
            let next = read_link(&self.store, &self.geometry, current)?;
            let is_last = i + 1 == chunks.len();
            let link = match (is_last, splice) {
                (false, _) => next,
                (true, Some(back_block)) => back_block,
                (true, None) => 0,
            };
            let block = encode_data_block(link, chunk)?;
            self.store.write_at(self.geometry.block_offset(current), &block);
            trace!("Rewrote block {current}, next {link}");
            if is_last && splice.is_none() && next != 0 {
                debug!("Truncating chain after block {current}");
                free_chain(&self.store, &self.geometry, &mut self.info, next)?;
            }
            current = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::layout::{InodeKind, ROOT_INODE};
    use crate::fs::{FSError, FsConfig};
    use crate::store::MemoryStore;

    const P: usize = PAYLOAD_SIZE;

    /// A volume with exactly `data_blocks` data blocks, one of them taken
    /// by the root directory.
    fn fs_with_data_blocks(data_blocks: usize) -> FileSystem<MemoryStore> {
        let config = FsConfig {
            inode_table_blocks: 1,
            ..FsConfig::default()
        };
        FileSystem::format(MemoryStore::new(BLOCK_SIZE * (2 + data_blocks)), config).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn free_blocks(fs: &FileSystem<MemoryStore>) -> u32 {
        fs.info.bitmap.count_clear()
    }

    #[test]
    fn test_roundtrip_sizes() {
        let mut fs = fs_with_data_blocks(32);
        let mut entry = fs.allocate_entry(InodeKind::File).unwrap();
        for size in [0, 1, P - 1, P, P + 1, 2 * P, 2 * P + 1, 5 * P + 3, 0] {
            let content = pattern(size);
            fs.write_content(&mut entry, &content).unwrap();
            assert_eq!(fs.read_content(&entry).unwrap(), content, "size {size}");
            assert_eq!(fs.chain_of(&entry).unwrap().len(), blocks_for(size));
            // the persisted record agrees with the caller's copy
            assert_eq!(fs.find_by_inode(entry.inode).unwrap(), Some(entry));
        }
        assert_eq!(entry.first_block, 0);
    }

    #[test]
    fn test_rewrite_same_size_keeps_blocks() {
        let mut fs = fs_with_data_blocks(16);
        let mut entry = fs.allocate_entry(InodeKind::File).unwrap();
        fs.write_content(&mut entry, &pattern(3 * P)).unwrap();
        let chain = fs.chain_of(&entry).unwrap();
        let free = free_blocks(&fs);

        fs.write_content(&mut entry, &pattern(3 * P)).unwrap();
        assert_eq!(fs.chain_of(&entry).unwrap(), chain);
        assert_eq!(free_blocks(&fs), free);

        // same block count, different bytes
        let other = vec![0xaa; 3 * P - 10];
        fs.write_content(&mut entry, &other).unwrap();
        assert_eq!(fs.chain_of(&entry).unwrap(), chain);
        assert_eq!(fs.read_content(&entry).unwrap(), other);
    }

    #[test]
    fn test_growth_keeps_prefix_blocks() {
        let mut fs = fs_with_data_blocks(16);
        let mut entry = fs.allocate_entry(InodeKind::File).unwrap();
        fs.write_content(&mut entry, &pattern(P + 1)).unwrap();
        let before = fs.chain_of(&entry).unwrap();
        let free = free_blocks(&fs);

        let grown = pattern(4 * P);
        fs.write_content(&mut entry, &grown).unwrap();
        let after = fs.chain_of(&entry).unwrap();
        assert_eq!(&after[..2], &before[..]);
        assert_eq!(after.len(), 4);
        assert_eq!(free_blocks(&fs), free - 2);
        assert_eq!(fs.read_content(&entry).unwrap(), grown);
    }

    #[test]
    fn test_shrink_returns_blocks() {
        let mut fs = fs_with_data_blocks(16);
        let mut entry = fs.allocate_entry(InodeKind::File).unwrap();
        fs.write_content(&mut entry, &pattern(5 * P)).unwrap();
        let before = fs.chain_of(&entry).unwrap();
        let free = free_blocks(&fs);

        let shrunk = pattern(2 * P - 1);
        fs.write_content(&mut entry, &shrunk).unwrap();
        assert_eq!(fs.chain_of(&entry).unwrap(), &before[..2]);
        assert_eq!(free_blocks(&fs), free + 3);
        assert_eq!(fs.read_content(&entry).unwrap(), shrunk);

        // the freed blocks can be claimed again by another file
        let mut other = fs.allocate_entry(InodeKind::File).unwrap();
        fs.write_content(&mut other, &pattern((free as usize + 3) * P)).unwrap();
        assert_eq!(free_blocks(&fs), 0);
    }

    #[test]
    fn test_storage_full_releases_partial_chain() {
        let mut fs = fs_with_data_blocks(5);
        // the root uses one data block
        let available = free_blocks(&fs) as usize;
        assert_eq!(available, 4);
        let mut entry = fs.allocate_entry(InodeKind::File).unwrap();
        assert!(matches!(
            fs.write_content(&mut entry, &pattern((available + 1) * P)),
            Err(FSError::StorageFull)
        ));
        assert_eq!(entry.first_block, 0);
        assert_eq!(fs.find_by_inode(entry.inode).unwrap().unwrap().first_block, 0);
        assert_eq!(free_blocks(&fs) as usize, available);

        fs.write_content(&mut entry, &pattern(available * P)).unwrap();
        assert_eq!(free_blocks(&fs), 0);
    }

    #[test]
    fn test_growth_failure_keeps_old_content() {
        let mut fs = fs_with_data_blocks(4);
        let mut entry = fs.allocate_entry(InodeKind::File).unwrap();
        let original = pattern(P);
        fs.write_content(&mut entry, &original).unwrap();
        assert!(matches!(
            fs.write_content(&mut entry, &pattern(5 * P)),
            Err(FSError::StorageFull)
        ));
        assert_eq!(fs.read_content(&entry).unwrap(), original);
        assert_eq!(free_blocks(&fs), 2);
    }

    #[test]
    fn test_root_chain() {
        let fs = fs_with_data_blocks(4);
        let root = fs.find_by_inode(ROOT_INODE).unwrap().unwrap();
        assert_eq!(fs.chain_of(&root).unwrap(), [fs.geometry.first_data_block()]);
    }
}
