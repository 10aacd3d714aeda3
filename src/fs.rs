use packed_struct::PackingError;
use thiserror::Error;
use tracing::debug;

pub mod alloc;
pub mod dir;
pub mod inode;
pub mod layout;
pub mod meta;
pub mod path;
pub mod storage;

use layout::{validate_name, Geometry, InodeKind, InodeRecord, DEFAULT_INODE_TABLE_BLOCKS};
use meta::InfoRecord;
use path::ResolveContext;
use crate::store::BlockStore;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FSError {
    #[error("Unable to find {0}")]
    NotFound(String),
    #[error("An entry named {0:?} already exists")]
    AlreadyExists(String),
    #[error("No free data block left on the volume")]
    StorageFull,
    #[error("The inode table has no empty slot left")]
    InodeTableFull,
    #[error("Inode {0} is not in the inode table")]
    InodeNotFound(u32),
    #[error("{0:?} is not a directory")]
    NotADirectory(String),
    #[error("{0:?} is a directory")]
    IsADirectory(String),
    #[error("Invalid name {name:?}: names are 1 to {max} bytes and may not contain '/'")]
    InvalidName { name: String, max: usize },
    #[error("The store holds no recognizable volume: {0}")]
    UnrecognizedVolume(&'static str),
    #[error("A store of {capacity} bytes cannot hold a volume with {inode_table_blocks} inode table blocks")]
    InvalidGeometry {
        capacity: usize,
        inode_table_blocks: u32,
    },
    #[error("The content of directory inode {0} is malformed. This indicates a corrupted filesystem")]
    CorruptDirectory(u32),
    #[error("Failed to pack or unpack an on-disk record")]
    Packing(#[from] PackingError),
}

pub type Result<T> = std::result::Result<T, FSError>;

/// What mounting does with a store whose header is not a chainfs header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MountPolicy {
    /// Format the store, losing whatever it held.
    #[default]
    FormatOnMismatch,
    /// Fail with [`FSError::UnrecognizedVolume`].
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    pub policy: MountPolicy,
    /// Only used when formatting, a mounted volume keeps its own.
    pub inode_table_blocks: u32,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            policy: MountPolicy::default(),
            inode_table_blocks: DEFAULT_INODE_TABLE_BLOCKS,
        }
    }
}

/// One row of [`FileSystem::list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub name: String,
    pub inode: u32,
    pub is_dir: bool,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub block_count: u32,
    pub free_blocks: u32,
    pub inode_slots: usize,
    /// Highest inode number handed out so far.
    pub inode_counter: u32,
}

#[derive(Debug)]
pub struct FileSystem<Store: BlockStore> {
    store: Store,
    geometry: Geometry,
    info: InfoRecord,
}

impl<Store: BlockStore> FileSystem<Store> {
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    pub fn usage(&self) -> Usage {
        Usage {
            block_count: self.geometry.block_count,
            free_blocks: self.info.bitmap.count_clear(),
            inode_slots: self.geometry.inode_slots(),
            inode_counter: self.info.inode_counter,
        }
    }

    pub fn create_file(&mut self, path: &str, is_dir: bool) -> Result<()> {
        self.create_file_in(&ResolveContext::root(), path, is_dir)
    }

    pub fn get_content(&self, path: &str) -> Result<Vec<u8>> {
        self.get_content_in(&ResolveContext::root(), path)
    }

    pub fn set_content(&mut self, path: &str, content: &[u8]) -> Result<()> {
        self.set_content_in(&ResolveContext::root(), path, content)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<DirListing>> {
        self.list_dir_in(&ResolveContext::root(), path)
    }

    pub fn stat(&self, path: &str) -> Result<InodeRecord> {
        self.stat_in(&ResolveContext::root(), path)
    }

    /// Creates an empty file, or a directory holding `.` and `..`, as the
    /// last component of `path`.
    pub fn create_file_in(&mut self, ctx: &ResolveContext, path: &str, is_dir: bool) -> Result<()> {
        let (mut parent, name) = self.resolve_parent(ctx, path)?;
        validate_name(name)?;
        if self.list_entries(&parent)?.iter().any(|e| e.name_eq(name)) {
            return Err(FSError::AlreadyExists(name.to_string()));
        }
        let kind = if is_dir {
            InodeKind::Directory
        } else {
            InodeKind::File
        };
        let mut entry = self.allocate_entry(kind)?;
        if is_dir {
            entry = self.init_new_directory(entry, parent)?;
        }
        self.add_entry(&mut parent, &entry, name)?;
        debug!("Created {path:?} as inode {}", entry.inode);
        Ok(())
    }

    pub fn get_content_in(&self, ctx: &ResolveContext, path: &str) -> Result<Vec<u8>> {
        let entry = self.stat_in(ctx, path)?;
        if entry.is_dir() {
            return Err(FSError::IsADirectory(path.to_string()));
        }
        self.read_content(&entry)
    }

    pub fn set_content_in(&mut self, ctx: &ResolveContext, path: &str, content: &[u8]) -> Result<()> {
        let mut entry = self.stat_in(ctx, path)?;
        if entry.is_dir() {
            return Err(FSError::IsADirectory(path.to_string()));
        }
        self.write_content(&mut entry, content)
    }

    pub fn list_dir_in(&self, ctx: &ResolveContext, path: &str) -> Result<Vec<DirListing>> {
        let dir = self.resolve_dir(ctx, path)?;
        if !dir.is_dir() {
            return Err(FSError::NotADirectory(path.to_string()));
        }
        self.list_entries(&dir)?
            .into_iter()
            .map(|e| -> Result<DirListing> {
                let child = self
                    .find_by_inode(e.inode)?
                    .ok_or_else(|| FSError::NotFound(e.name()))?;
                Ok(DirListing {
                    name: e.name(),
                    inode: child.inode,
                    is_dir: child.is_dir(),
                    size: child.size,
                })
            })
            .collect()
    }

    /// The inode record of the entry named by the last component of
    /// `path`, looked up among its parent's entries.
    pub fn stat_in(&self, ctx: &ResolveContext, path: &str) -> Result<InodeRecord> {
        let (parent, name) = self.resolve_parent(ctx, path)?;
        if name.is_empty() {
            // "/" or "dir/" name the directory itself
            return Ok(parent);
        }
        let entry = self
            .list_entries(&parent)?
            .into_iter()
            .find(|e| e.name_eq(name))
            .ok_or_else(|| FSError::NotFound(path.to_string()))?;
        self.find_by_inode(entry.inode)?
            .ok_or_else(|| FSError::NotFound(path.to_string()))
    }

    /// Returns a context rooted at the directory `path`.
    pub fn change_dir(&self, ctx: &ResolveContext, path: &str) -> Result<ResolveContext> {
        let dir = self.resolve_dir(ctx, path)?;
        if !dir.is_dir() {
            return Err(FSError::NotADirectory(path.to_string()));
        }
        Ok(ResolveContext { cwd: dir.inode })
    }
}
