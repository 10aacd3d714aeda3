//! chainfs lays out inodes, directories and file data on a fixed-size,
//! byte-addressable block store. File content is kept as singly linked
//! chains of blocks, free space in a bitmap inside block 0.
//!
//! ```no_run
//! use chainfs::{FileSystem, FsConfig, VolumeFile, DEFAULT_VOLUME_SIZE};
//!
//! let store = VolumeFile::open("disk.img", DEFAULT_VOLUME_SIZE)?;
//! let mut fs = FileSystem::mount(store, FsConfig::default())?;
//! fs.create_file("/notes", true)?;
//! fs.create_file("/notes/todo.txt", false)?;
//! fs.set_content("/notes/todo.txt", b"write tests")?;
//! # Ok::<(), eyre::Report>(())
//! ```
pub mod fs;
pub mod store;

pub use fs::layout::{InodeKind, InodeRecord, BLOCK_SIZE, DEFAULT_VOLUME_SIZE, PAYLOAD_SIZE};
pub use fs::path::ResolveContext;
pub use fs::{DirListing, FSError, FileSystem, FsConfig, MountPolicy, Usage};
pub use store::{BlockStore, MemoryStore, VolumeFile};
