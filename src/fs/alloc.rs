//! Free-space allocation over the block bitmap.
//!
//! The allocator only mutates the caller's [`InfoRecord`]; persisting it
//! is left to the caller so a multi-block operation writes block 0 once.

use super::layout::{encode_data_block, ChainLink, Geometry};
use super::meta::InfoRecord;
use super::{FSError, Result};
use crate::store::BlockStore;
use packed_struct::prelude::*;
use tracing::{trace, warn};

/// One bit per block, set while the block is reserved or part of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
    len: u32,
}

impl Bitmap {
    pub fn new(len: u32) -> Self {
        Self {
            bits: vec![0; (len as usize).div_ceil(8)],
            len,
        }
    }

    pub fn from_bytes(bytes: &[u8], len: u32) -> Self {
        let mut bitmap = Self::new(len);
        let n = bitmap.bits.len();
        bitmap.bits.copy_from_slice(&bytes[..n]);
        bitmap
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_set(&self, index: u32) -> bool {
        assert!(index < self.len, "bit index out of range");
        self.bits[index as usize / 8] & (1 << (index % 8)) != 0
    }

    pub fn set(&mut self, index: u32) {
        assert!(index < self.len, "bit index out of range");
        self.bits[index as usize / 8] |= 1 << (index % 8);
    }

    pub fn clear(&mut self, index: u32) {
        assert!(index < self.len, "bit index out of range");
        self.bits[index as usize / 8] &= !(1 << (index % 8));
    }

    /// First-fit scan starting at `from`.
    pub fn first_clear(&self, from: u32) -> Option<u32> {
        (from..self.len).find(|&i| !self.is_set(i))
    }

    pub fn count_clear(&self) -> u32 {
        (0..self.len).filter(|&i| !self.is_set(i)).count() as u32
    }
}

/// Claims the first free data block and writes `block` (a full data
/// block record) into it.
pub fn allocate_block(
    store: &mut impl BlockStore,
    geometry: &Geometry,
    info: &mut InfoRecord,
    block: &[u8],
) -> Result<u32> {
    let index = info
        .bitmap
        .first_clear(geometry.first_data_block())
        .ok_or(FSError::StorageFull)?;
    info.bitmap.set(index);
    store.write_at(geometry.block_offset(index), block);
    trace!("Allocated block {index}");
    Ok(index)
}

/// Builds a chain holding `chunks` in order and returns its head.
///
/// The chain is built tail-first: each block is allocated already linked
/// to the one allocated before it, so the last allocation is the head
/// and no block has to be revisited. If the volume fills up midway the
/// blocks claimed so far are released again.
pub fn allocate_chain(
    store: &mut impl BlockStore,
    geometry: &Geometry,
    info: &mut InfoRecord,
    chunks: &[&[u8]],
) -> Result<u32> {
    let mut next = 0;
    let mut claimed = Vec::with_capacity(chunks.len());
    for chunk in chunks.iter().rev() {
        let block = encode_data_block(next, chunk)?;
        match allocate_block(store, geometry, info, &block) {
            Ok(index) => {
                claimed.push(index);
                next = index;
            }
            Err(err) => {
                for index in claimed {
                    info.bitmap.clear(index);
                }
                return Err(err);
            }
        }
    }
    Ok(next)
}

pub fn read_link(store: &impl BlockStore, geometry: &Geometry, block: u32) -> Result<u32> {
    let mut buf = [0; ChainLink::SIZE];
    store.read_at(geometry.block_offset(block), &mut buf);
    Ok(ChainLink::unpack(&buf)?.next_block)
}

/// Clears the bit of every block reachable from `head`. A head of 0 is a
/// no-op.
pub fn free_chain(
    store: &impl BlockStore,
    geometry: &Geometry,
    info: &mut InfoRecord,
    head: u32,
) -> Result<()> {
    let mut current = head;
    while current != 0 {
        if !info.bitmap.is_set(current) {
            warn!("Chain reaches block {current} which is already free, stopping");
            break;
        }
        let next = read_link(store, geometry, current)?;
        info.bitmap.clear(current);
        trace!("Freed block {current}");
        current = next;
    }
    Ok(())
}
