//! Byte-addressable block stores the filesystem lives on.

pub mod file;

pub use file::VolumeFile;

/// Trait that abstracts out the medium a volume lives on: a fixed
/// number of bytes, read and written at arbitrary offsets.
///
/// Accesses are synchronous and succeed within bounds. Going out of
/// bounds is a bug in the caller, implementations panic on it.
pub trait BlockStore {
    /// Total bytes available.
    fn capacity(&self) -> usize;
    /// Fills `buf` with the bytes starting at `offset`.
    fn read_at(&self, offset: usize, buf: &mut [u8]);
    /// Stores `data` starting at `offset`.
    fn write_at(&mut self, offset: usize, data: &[u8]);

    fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        self.read_at(offset, &mut buf);
        buf
    }
}

/// A store kept entirely in memory, zero filled when created.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: Vec<u8>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
        }
    }
}

fn check_range(offset: usize, len: usize, capacity: usize) {
    assert!(
        offset.checked_add(len).is_some_and(|end| end <= capacity),
        "access of {len} bytes at {offset} is out of range"
    );
}

impl BlockStore for MemoryStore {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) {
        check_range(offset, buf.len(), self.data.len());
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) {
        check_range(offset, data.len(), self.data.len());
        self.data[offset..offset + data.len()].copy_from_slice(data);
    }
}

#[test]
fn test_memory_store() {
    let mut store = MemoryStore::new(64);
    store.write_at(60, b"abcd");
    assert_eq!(store.read(59, 5), b"\0abcd");
    assert_eq!(store.capacity(), 64);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_memory_store_bounds() {
    let store = MemoryStore::new(64);
    store.read(61, 4);
}
