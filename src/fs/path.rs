//! Slash-delimited path resolution.

use super::layout::{InodeRecord, ROOT_INODE};
use super::{FSError, FileSystem, Result};
use crate::store::BlockStore;
use tracing::trace;

/// Where relative paths start. Resolution never mutates a context,
/// changing directory produces a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveContext {
    pub cwd: u32,
}

impl ResolveContext {
    pub const fn root() -> Self {
        Self { cwd: ROOT_INODE }
    }
}

impl Default for ResolveContext {
    fn default() -> Self {
        Self::root()
    }
}

/// Splits off the last component. The prefix keeps its trailing
/// separator so that `"/a"` yields `Some("/")`, i.e. the root; a bare
/// name yields `None`, i.e. the context directory.
pub fn split_last(path: &str) -> (Option<&str>, &str) {
    match path.rfind('/') {
        Some(idx) => (Some(&path[..=idx]), &path[idx + 1..]),
        None => (None, path),
    }
}

impl<S: BlockStore> FileSystem<S> {
    /// Walks `path` from the root when it starts with `/`, from `ctx`
    /// otherwise. Empty components are skipped.
    pub(crate) fn resolve_dir(&self, ctx: &ResolveContext, path: &str) -> Result<InodeRecord> {
        let start = if path.starts_with('/') {
            ROOT_INODE
        } else {
            ctx.cwd
        };
        let mut current = self
            .find_by_inode(start)?
            .ok_or_else(|| FSError::NotFound(format!("inode {start}")))?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            if !current.is_dir() {
                return Err(FSError::NotADirectory(component.to_string()));
            }
            let entry = self
                .list_entries(&current)?
                .into_iter()
                .find(|e| e.name_eq(component))
                .ok_or_else(|| FSError::NotFound(format!("the dir {component:?} in {path:?}")))?;
            current = self
                .find_by_inode(entry.inode)?
                .ok_or_else(|| FSError::NotFound(format!("inode {} of {component:?}", entry.inode)))?;
            trace!("Resolved {component:?} to inode {}", current.inode);
        }
        Ok(current)
    }

    /// The directory that holds (or will hold) the last component of
    /// `path`, together with that component.
    pub(crate) fn resolve_parent<'p>(
        &self,
        ctx: &ResolveContext,
        path: &'p str,
    ) -> Result<(InodeRecord, &'p str)> {
        let (prefix, name) = split_last(path);
        let parent = self.resolve_dir(ctx, prefix.unwrap_or(""))?;
        if !parent.is_dir() {
            return Err(FSError::NotADirectory(prefix.unwrap_or(path).to_string()));
        }
        Ok((parent, name))
    }
}
