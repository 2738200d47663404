//! PCIe BAR window mapping via `/dev/mem`.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::ptr;

use log::debug;

use crate::error::BarMapError;

/// One PCIe BAR window mapped read-write, shared, uncached, into this
/// process's address space.
pub struct BarMap {
    vaddr: *mut u8,
    len: usize,
}

unsafe impl Send for BarMap {}

impl BarMap {
    /// Map `length` bytes of physical address space starting at `phys_start`.
    pub fn map(phys_start: u64, length: usize) -> Result<Self, BarMapError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open("/dev/mem")
            .map_err(BarMapError::DevMemOpen)?;

        let vaddr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                phys_start as libc::off_t,
            )
        };
        // The fd can be closed once mmap returns; the mapping survives
        // independently of the file descriptor (matches /dev/mem BAR_wrapper
        // in the original driver, which closes its fd right after mmap).
        drop(file);

        if vaddr == libc::MAP_FAILED {
            return Err(BarMapError::MmapFailed(std::io::Error::last_os_error()));
        }

        debug!("mapped BAR: phys={:#x} len={:#x} vaddr={:p}", phys_start, length, vaddr);

        Ok(Self {
            vaddr: vaddr as *mut u8,
            len: length,
        })
    }

    pub fn vaddr(&self) -> *mut u8 {
        self.vaddr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read a 32-bit little-endian register at `offset` bytes from base.
    ///
    /// # Safety contract
    /// Bounds are checked at debug time; callers must still ensure `offset`
    /// addresses a register defined by this BAR's control-register file.
    pub fn read32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.len, "MMIO read32 out of bounds");
        unsafe {
            let ptr = self.vaddr.add(offset) as *const u32;
            u32::from_le(ptr::read_volatile(ptr))
        }
    }

    /// Write a 32-bit little-endian register at `offset` bytes from base.
    pub fn write32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.len, "MMIO write32 out of bounds");
        unsafe {
            let ptr = self.vaddr.add(offset) as *mut u32;
            ptr::write_volatile(ptr, value.to_le());
        }
    }
}

impl Drop for BarMap {
    fn drop(&mut self) {
        debug!("unmapping BAR: vaddr={:p} len={:#x}", self.vaddr, self.len);
        unsafe {
            libc::munmap(self.vaddr as *mut libc::c_void, self.len);
        }
    }
}

#[cfg(test)]
impl BarMap {
    /// Build a `BarMap`-shaped software stub backed by anonymous memory,
    /// standing in for a real BAR window so the register ABI can be
    /// exercised without root or hardware.
    pub(crate) fn stub(length: usize) -> Self {
        let vaddr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(vaddr, libc::MAP_FAILED, "stub mmap failed");
        Self {
            vaddr: vaddr as *mut u8,
            len: length,
        }
    }
}
