use super::{check_range, BlockStore};
use eyre::{ensure, Context, Result};
use std::fs::File;
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::path::Path;
use tracing::{debug, trace};

/// A store backed by a file mapped into memory. Writes land in the
/// shared mapping and reach the file when the kernel flushes it, on
/// [`VolumeFile::sync`], or when the store is dropped.
#[derive(Debug)]
pub struct VolumeFile {
    file: File,
    data_addr: *mut u8,
    data_size: usize,
}

impl VolumeFile {
    fn stat_file_size(fd: libc::c_int) -> Result<usize> {
        let mut stat = MaybeUninit::<libc::stat>::uninit();
        if unsafe { libc::fstat(fd, stat.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error().into());
        }
        let stat = unsafe { stat.assume_init() };
        trace!("Stat'ed file size: {}", stat.st_size);
        Ok(stat.st_size as usize)
    }

    fn mmap_volume_file(fd: libc::c_int, size: usize) -> Result<*mut u8> {
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error().into());
        }
        Ok(addr as *mut u8)
    }

    /// Opens the volume file at `path`, creating it zero filled with
    /// `capacity` bytes if it does not exist yet. An existing file must
    /// be exactly `capacity` bytes long.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        ensure!(capacity > 0, "volume capacity must not be zero");
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .wrap_err_with(|| format!("Couldn't open volume file {path:?}"))?;
        let size = Self::stat_file_size(file.as_raw_fd())?;
        if size == 0 {
            debug!("Creating volume file {path:?} of {capacity} bytes");
            file.set_len(capacity as u64)?;
        } else {
            ensure!(
                size == capacity,
                "Volume file {:?} is {} bytes, expected {}",
                path,
                size,
                capacity
            );
        }
        let data_addr = Self::mmap_volume_file(file.as_raw_fd(), capacity)?;
        debug!("Mapped volume file {path:?}");
        Ok(Self {
            file,
            data_addr,
            data_size: capacity,
        })
    }

    fn data(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data_addr, self.data_size) }
    }

    fn data_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.data_addr, self.data_size) }
    }

    /// Flushes the mapping to the file.
    pub fn sync(&self) -> Result<()> {
        let err = unsafe {
            libc::msync(
                self.data_addr as *mut libc::c_void,
                self.data_size,
                libc::MS_SYNC,
            )
        };
        if err != 0 {
            return Err(io::Error::last_os_error()).wrap_err("msync failed");
        }
        self.file.sync_all()?;
        Ok(())
    }
}

impl BlockStore for VolumeFile {
    fn capacity(&self) -> usize {
        self.data_size
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) {
        check_range(offset, buf.len(), self.data_size);
        buf.copy_from_slice(&self.data()[offset..offset + buf.len()]);
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) {
        check_range(offset, data.len(), self.data_size);
        self.data_mut()[offset..offset + data.len()].copy_from_slice(data);
    }
}

impl Drop for VolumeFile {
    fn drop(&mut self) {
        let err = unsafe { libc::munmap(self.data_addr as *mut libc::c_void, self.data_size) };
        if err != 0 {
            tracing::error!("munmap failed: {}", io::Error::last_os_error());
        }
    }
}
