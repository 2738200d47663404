//! Huge-page buffer manager.
//!
//! Acquires one 2 MiB or 1 GiB huge page from the kernel's huge-page pool,
//! backs it immediately (so no page fault can land mid-transfer), and
//! resolves its bus-visible physical address via `/proc/self/pagemap`.
//!
//! Not `Clone` — a `HugePage` is a unique owner of one mapping, released
//! exactly once on drop.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ptr;

use log::debug;

use crate::error::HugePageError;

/// Huge-page size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HugePageSize {
    Huge2MiB,
    Huge1GiB,
}

impl HugePageSize {
    pub fn bytes(self) -> usize {
        match self {
            Self::Huge2MiB => 2 * 1024 * 1024,
            Self::Huge1GiB => 1024 * 1024 * 1024,
        }
    }

    /// log2(size), used to build the `MAP_HUGE_*` shift-encoded mmap flag.
    fn log2_bytes(self) -> i32 {
        match self {
            Self::Huge2MiB => 21,
            Self::Huge1GiB => 30,
        }
    }
}

/// MAP_HUGE_SHIFT per `include/uapi/linux/mman.h`; not present in every
/// version of the `libc` crate, so we encode it ourselves.
const MAP_HUGE_SHIFT: i32 = 26;

/// A pinned, physically-backed huge page.
pub struct HugePage {
    vaddr: *mut u8,
    paddr: u64,
    len: usize,
    size_class: HugePageSize,
}

// Safety: HugePage owns a unique mmap'd region; sending it across threads
// just moves ownership of that mapping, which is safe.
unsafe impl Send for HugePage {}

impl HugePage {
    /// Allocate one huge page of the given size class.
    pub fn allocate(size_class: HugePageSize) -> Result<Self, HugePageError> {
        let len = size_class.bytes();
        let flags = libc::MAP_PRIVATE
            | libc::MAP_ANONYMOUS
            | libc::MAP_HUGETLB
            | (size_class.log2_bytes() << MAP_HUGE_SHIFT);

        let vaddr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if vaddr == libc::MAP_FAILED {
            return Err(HugePageError::MapFailed(std::io::Error::last_os_error()));
        }
        let vaddr = vaddr as *mut u8;

        // Force the kernel to back the region now: read the first 4 bytes,
        // write a sentinel, restore. Avoids a page fault inside a later
        // time-critical DMA path.
        unsafe {
            let first = ptr::read_volatile(vaddr as *const u32);
            ptr::write_volatile(vaddr as *mut u32, 0xA5A5_A5A5);
            ptr::write_volatile(vaddr as *mut u32, first);
        }

        let paddr = match resolve_physical_address(vaddr as usize) {
            Ok(p) => p,
            Err(e) => {
                unsafe {
                    libc::munmap(vaddr as *mut libc::c_void, len);
                }
                return Err(e);
            }
        };

        debug!(
            "allocated {:?} huge page: vaddr={:p} paddr={:#x} len={:#x}",
            size_class, vaddr, paddr, len
        );

        Ok(Self {
            vaddr,
            paddr,
            len,
            size_class,
        })
    }

    pub fn vaddr(&self) -> *mut u8 {
        self.vaddr
    }

    pub fn paddr(&self) -> u64 {
        self.paddr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_class(&self) -> HugePageSize {
        self.size_class
    }

    /// Zero the entire page with volatile writes (the compiler must not
    /// elide a memset into device-visible memory).
    pub fn zero(&self) {
        unsafe {
            for i in 0..self.len {
                ptr::write_volatile(self.vaddr.add(i), 0);
            }
        }
    }
}

impl Drop for HugePage {
    fn drop(&mut self) {
        debug!("releasing huge page: vaddr={:p} paddr={:#x}", self.vaddr, self.paddr);
        unsafe {
            libc::munmap(self.vaddr as *mut libc::c_void, self.len);
        }
    }
}

/// Resolve the physical address backing `vaddr` via `/proc/self/pagemap`.
///
/// Entry layout: the lower 54 bits of the 8-byte little-endian entry at
/// `(vaddr / page_size) * 8` are the page frame number (PFN). A zero PFN
/// means the caller lacks CAP_SYS_ADMIN.
fn resolve_physical_address(vaddr: usize) -> Result<u64, HugePageError> {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;

    let mut file = File::open("/proc/self/pagemap").map_err(HugePageError::PagemapRead)?;
    let offset = (vaddr / page_size) as u64 * 8;
    file.seek(SeekFrom::Start(offset))
        .map_err(HugePageError::PagemapRead)?;

    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)
        .map_err(HugePageError::PagemapRead)?;

    let entry = u64::from_le_bytes(buf);
    let pfn = entry & ((1u64 << 54) - 1);
    if pfn == 0 {
        return Err(HugePageError::PhysResolveFailed);
    }

    Ok(pfn * page_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_classes_report_nominal_length() {
        assert_eq!(HugePageSize::Huge2MiB.bytes(), 2 * 1024 * 1024);
        assert_eq!(HugePageSize::Huge1GiB.bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn log2_matches_size_class() {
        assert_eq!(1u64 << HugePageSize::Huge2MiB.log2_bytes(), 2 * 1024 * 1024);
        assert_eq!(1u64 << HugePageSize::Huge1GiB.log2_bytes(), 1024 * 1024 * 1024);
    }
}
