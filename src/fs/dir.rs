//! Directories are files whose content is an entry count followed by
//! that many [`DirEntryRecord`]s.

use super::layout::{DirEntryRecord, DirHeader, InodeRecord};
use super::{FSError, FileSystem, Result};
use crate::store::BlockStore;
use packed_struct::prelude::*;
use tracing::debug;

pub fn encode_entries(entries: &[DirEntryRecord]) -> Result<Vec<u8>> {
    let header = DirHeader {
        entry_count: entries.len() as u32,
    };
    let mut buf = Vec::with_capacity(DirHeader::SIZE + entries.len() * DirEntryRecord::SIZE);
    buf.extend_from_slice(&header.pack()?);
    for entry in entries {
        buf.extend_from_slice(&entry.pack()?);
    }
    Ok(buf)
}

/// `None` when the content is shorter than its count claims.
pub fn decode_entries(content: &[u8]) -> Result<Option<Vec<DirEntryRecord>>> {
    let Some(header) = content.get(..DirHeader::SIZE) else {
        return Ok(None);
    };
    let count = DirHeader::unpack_from_slice(header)?.entry_count as usize;
    let records = &content[DirHeader::SIZE..];
    if records.len() < count * DirEntryRecord::SIZE {
        return Ok(None);
    }
    records
        .chunks_exact(DirEntryRecord::SIZE)
        .take(count)
        .map(|raw| DirEntryRecord::unpack_from_slice(raw).map_err(FSError::from))
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

impl<S: BlockStore> FileSystem<S> {
    pub(crate) fn list_entries(&self, dir: &InodeRecord) -> Result<Vec<DirEntryRecord>> {
        let content = self.read_content(dir)?;
        decode_entries(&content)?.ok_or(FSError::CorruptDirectory(dir.inode))
    }

    /// Appends `(child, name)` to `dir`. Names are compared exactly.
    pub(crate) fn add_entry(
        &mut self,
        dir: &mut InodeRecord,
        child: &InodeRecord,
        name: &str,
    ) -> Result<()> {
        let record = DirEntryRecord::new(child.inode, name)?;
        let mut entries = self.list_entries(dir)?;
        if entries.iter().any(|e| e.name_eq(name)) {
            return Err(FSError::AlreadyExists(name.to_string()));
        }
        entries.push(record);
        debug!(
            "Adding {name:?} (inode {}) to directory inode {}",
            child.inode, dir.inode
        );
        let content = encode_entries(&entries)?;
        self.write_content(dir, &content)
    }

    /// Gives `new_dir` its first content block: `.` and `..`. The root is
    /// its own parent.
    pub(crate) fn init_new_directory(
        &mut self,
        mut new_dir: InodeRecord,
        parent: InodeRecord,
    ) -> Result<InodeRecord> {
        let entries = [
            DirEntryRecord::new(new_dir.inode, ".")?,
            DirEntryRecord::new(parent.inode, "..")?,
        ];
        let content = encode_entries(&entries)?;
        self.write_content(&mut new_dir, &content)?;
        Ok(new_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::layout::{blocks_for, InodeKind, DEFAULT_VOLUME_SIZE, PAYLOAD_SIZE, ROOT_INODE};
    use crate::fs::FsConfig;
    use crate::store::MemoryStore;

    fn root(fs: &FileSystem<MemoryStore>) -> InodeRecord {
        fs.find_by_inode(ROOT_INODE).unwrap().unwrap()
    }

    #[test]
    fn test_decode_truncated() {
        let entries = [DirEntryRecord::new(1, ".").unwrap()];
        let encoded = encode_entries(&entries).unwrap();
        assert_eq!(&encoded[..DirHeader::SIZE], &[1, 0, 0, 0]);
        assert_eq!(decode_entries(&encoded).unwrap(), Some(entries.to_vec()));
        assert_eq!(decode_entries(&encoded[..10]).unwrap(), None);
        assert_eq!(decode_entries(&[1, 0]).unwrap(), None);
    }

    #[test]
    fn test_new_directory_entries() {
        let mut fs = FileSystem::format(MemoryStore::new(DEFAULT_VOLUME_SIZE), FsConfig::default())
            .unwrap();
        let parent = root(&fs);
        let child = fs.allocate_entry(InodeKind::Directory).unwrap();
        let child = fs.init_new_directory(child, parent).unwrap();

        let entries = fs.list_entries(&child).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].name_eq(".") && entries[0].inode == child.inode);
        assert!(entries[1].name_eq("..") && entries[1].inode == ROOT_INODE);
        assert_eq!(child.size as usize, DirHeader::SIZE + 2 * DirEntryRecord::SIZE);
        assert_eq!(fs.find_by_inode(child.inode).unwrap(), Some(child));
    }

    #[test]
    fn test_add_entry_rejects_duplicate() {
        let mut fs = FileSystem::format(MemoryStore::new(DEFAULT_VOLUME_SIZE), FsConfig::default())
            .unwrap();
        let mut dir = root(&fs);
        let file = fs.allocate_entry(InodeKind::File).unwrap();
        fs.add_entry(&mut dir, &file, "a.txt").unwrap();
        let size = dir.size;

        let other = fs.allocate_entry(InodeKind::File).unwrap();
        assert!(matches!(
            fs.add_entry(&mut dir, &other, "a.txt"),
            Err(FSError::AlreadyExists(_))
        ));
        assert_eq!(dir.size, size);
        assert_eq!(fs.list_entries(&dir).unwrap().len(), 3);

        // names are case-sensitive
        fs.add_entry(&mut dir, &other, "A.txt").unwrap();
        assert_eq!(fs.list_entries(&dir).unwrap().len(), 4);
    }

    #[test]
    fn test_directory_spans_blocks() {
        let mut fs = FileSystem::format(MemoryStore::new(DEFAULT_VOLUME_SIZE), FsConfig::default())
            .unwrap();
        let mut dir = root(&fs);
        let per_block = PAYLOAD_SIZE / DirEntryRecord::SIZE;
        for i in 0..per_block * 2 {
            let file = fs.allocate_entry(InodeKind::File).unwrap();
            fs.add_entry(&mut dir, &file, &format!("f{i}")).unwrap();
        }
        let entries = fs.list_entries(&dir).unwrap();
        assert_eq!(entries.len(), per_block * 2 + 2);
        assert_eq!(entries.last().unwrap().name(), format!("f{}", per_block * 2 - 1));
        assert_eq!(
            fs.chain_of(&dir).unwrap().len(),
            blocks_for(dir.size as usize)
        );
        assert!(fs.chain_of(&dir).unwrap().len() > 1);
    }
}
