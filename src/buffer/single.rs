//! One data huge page paired with one descriptor/writeback huge page,
//! built into a single linear descriptor chain.

use std::slice;

use crate::descriptor::{clear_writeback, writeback_length, Descriptor, CHUNK, DESC_SIZE, WB_SIZE};
use crate::error::BufferError;
use crate::hugepage::{HugePage, HugePageSize};

/// A C2H transfer buffer backing up to one 1 GiB data page.
pub struct SingleBuffer {
    data: HugePage,
    desc: HugePage,
    count: usize,
}

impl SingleBuffer {
    /// Allocate the backing huge pages. Does not build any descriptors yet
    /// — call `initialize` with the intended transfer size to do that.
    pub fn new() -> Result<Self, BufferError> {
        let data = HugePage::allocate(HugePageSize::Huge1GiB)?;
        let desc = HugePage::allocate(HugePageSize::Huge2MiB)?;
        Ok(Self { data, desc, count: 0 })
    }

    /// Build a descriptor chain moving `xfer_size` bytes, 0 < xfer_size <= 1 GiB.
    pub fn initialize(&mut self, xfer_size: u64) -> Result<(), BufferError> {
        if xfer_size == 0 {
            return Err(BufferError::ZeroSize);
        }
        if xfer_size > self.data.len() as u64 {
            return Err(BufferError::SizeOutOfRange {
                requested: xfer_size,
                max: self.data.len() as u64,
            });
        }

        self.desc.zero();

        let n = div_ceil(xfer_size, CHUNK) as usize;
        let wb_base = (self.desc.len() / 2) as u64;

        for i in 0..n {
            let is_last = i == n - 1;
            let nxt_adj = ((n as i64) - 2 - (i as i64)).max(0) as u8;
            let next_desc_addr = if is_last {
                0
            } else {
                self.desc.paddr() + ((i + 1) * DESC_SIZE) as u64
            };
            let data_addr = self.data.paddr() + (i as u64) * CHUNK;
            let wb_addr = self.desc.paddr() + wb_base + (i * WB_SIZE) as u64;

            let d = Descriptor {
                next_adjacent_count: nxt_adj,
                stop: is_last,
                completed: is_last,
                byte_count: CHUNK as u32,
                src_addr: wb_addr,
                dst_addr: data_addr,
                next_desc_addr,
            };

            let slot = unsafe {
                slice::from_raw_parts_mut(self.desc.vaddr().add(i * DESC_SIZE), DESC_SIZE)
            };
            d.encode(slot);

            let wb_slot = unsafe {
                slice::from_raw_parts_mut(
                    self.desc.vaddr().add((wb_base as usize) + i * WB_SIZE),
                    WB_SIZE,
                )
            };
            clear_writeback(wb_slot);
        }

        self.count = n;
        Ok(())
    }

    /// Physical address of the first descriptor, to be programmed into the
    /// SGDMA channel's first-descriptor registers.
    pub fn descriptor_ring_paddr(&self) -> u64 {
        self.desc.paddr()
    }

    pub fn descriptor_count(&self) -> usize {
        self.count
    }

    /// Virtual base of the data page, for reading out the transferred bytes.
    pub fn data_vaddr(&self) -> *mut u8 {
        self.data.vaddr()
    }

    /// Sum the `length` field of every writeback slot produced so far.
    pub fn xfered_size(&self) -> u64 {
        let wb_base = self.desc.len() / 2;
        let mut total = 0u64;
        for i in 0..self.count {
            let slot = unsafe {
                slice::from_raw_parts(self.desc.vaddr().add(wb_base + i * WB_SIZE), WB_SIZE)
            };
            total += writeback_length(slot) as u64;
        }
        total
    }
}

fn div_ceil(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DESC_MAGIC;

    fn decode_control(buf: &[u8]) -> u32 {
        u32::from_le_bytes(buf[0..4].try_into().unwrap())
    }

    #[test]
    fn quarter_gib_transfer_builds_two_descriptors() {
        let mut sb = SingleBuffer::new().unwrap();
        sb.initialize(0x1000_0000).unwrap();
        assert_eq!(sb.descriptor_count(), 2);

        let desc0 = unsafe { slice::from_raw_parts(sb.desc.vaddr(), DESC_SIZE) };
        let control0 = decode_control(desc0);
        assert_eq!(control0 >> 16, DESC_MAGIC as u32);
        assert_eq!((control0 >> 8) & 0x3F, 0);
        assert_eq!(control0 & 0b11, 0);

        let desc1 = unsafe { slice::from_raw_parts(sb.desc.vaddr().add(DESC_SIZE), DESC_SIZE) };
        let control1 = decode_control(desc1);
        assert_eq!(control1 & 0b11, 0b11);
    }

    #[test]
    fn rejects_zero_and_oversized_requests() {
        let mut sb = SingleBuffer::new().unwrap();
        assert!(matches!(sb.initialize(0), Err(BufferError::ZeroSize)));
        assert!(matches!(
            sb.initialize(2 * (1u64 << 30)),
            Err(BufferError::SizeOutOfRange { .. })
        ));
    }

    #[test]
    fn xfered_size_sums_writeback_lengths() {
        let mut sb = SingleBuffer::new().unwrap();
        sb.initialize(CHUNK * 2).unwrap();
        let wb_base = sb.desc.len() / 2;
        for i in 0..2usize {
            let slot = unsafe {
                slice::from_raw_parts_mut(sb.desc.vaddr().add(wb_base + i * WB_SIZE), WB_SIZE)
            };
            slot[4..8].copy_from_slice(&(CHUNK as u32).to_le_bytes());
        }
        assert_eq!(sb.xfered_size(), CHUNK * 2);
    }
}
