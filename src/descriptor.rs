//! Wire formats for scatter-gather descriptors and their writeback slots.
//!
//! Both are byte-exact little-endian records. Neither type relies on host
//! struct padding or endianness — each is encoded/decoded through explicit
//! field offsets into a raw byte slice, per the design notes.

use byteorder::{ByteOrder, LittleEndian};

bitflags::bitflags! {
    /// Bits [1:0] of the control field.
    pub struct ControlFlags: u32 {
        const STOP = 1 << 0;
        const COMPLETED = 1 << 1;
    }
}

/// Magic value occupying control bits [31:16] of every descriptor.
pub const DESC_MAGIC: u16 = 0xAD4B;

/// Transfer chunk size: each descriptor moves exactly one chunk.
/// XDMA allows a max transfer of (1 << 28) - 1 bytes per descriptor; we
/// choose a 1 << 27 chunk to stay comfortably under that ceiling.
pub const CHUNK: u64 = 1 << 27;

/// On-wire size of one descriptor.
pub const DESC_SIZE: usize = 32;

/// On-wire size of one writeback slot.
pub const WB_SIZE: usize = 8;

/// A 32-byte scatter-gather descriptor, encoded directly into a byte slice
/// within a huge page. There is no owned representation kept around after
/// encoding — the descriptor page itself is the source of truth.
pub struct Descriptor {
    pub next_adjacent_count: u8,
    pub stop: bool,
    pub completed: bool,
    pub byte_count: u32,
    pub src_addr: u64,
    pub dst_addr: u64,
    pub next_desc_addr: u64,
}

impl Descriptor {
    /// Encode this descriptor into `dst`, which must be exactly `DESC_SIZE`
    /// bytes (a single 32-byte slot of a descriptor page).
    pub fn encode(&self, dst: &mut [u8]) {
        debug_assert_eq!(dst.len(), DESC_SIZE);

        let mut flags = ControlFlags::empty();
        flags.set(ControlFlags::COMPLETED, self.completed);
        flags.set(ControlFlags::STOP, self.stop);

        let control = ((DESC_MAGIC as u32) << 16)
            | (((self.next_adjacent_count & 0x3F) as u32) << 8)
            | flags.bits();

        LittleEndian::write_u32(&mut dst[0..4], control);
        LittleEndian::write_u32(&mut dst[4..8], self.byte_count);
        LittleEndian::write_u32(&mut dst[8..12], self.src_addr as u32);
        LittleEndian::write_u32(&mut dst[12..16], (self.src_addr >> 32) as u32);
        LittleEndian::write_u32(&mut dst[16..20], self.dst_addr as u32);
        LittleEndian::write_u32(&mut dst[20..24], (self.dst_addr >> 32) as u32);
        LittleEndian::write_u32(&mut dst[24..28], self.next_desc_addr as u32);
        LittleEndian::write_u32(&mut dst[28..32], (self.next_desc_addr >> 32) as u32);
    }

    /// Decode a descriptor back out of a 32-byte slot, for test assertions.
    #[cfg(test)]
    pub fn decode(src: &[u8]) -> (u32, u32, u64, u64, u64) {
        debug_assert_eq!(src.len(), DESC_SIZE);
        let control = LittleEndian::read_u32(&src[0..4]);
        let byte_count = LittleEndian::read_u32(&src[4..8]);
        let src_lo = LittleEndian::read_u32(&src[8..12]) as u64;
        let src_hi = LittleEndian::read_u32(&src[12..16]) as u64;
        let dst_lo = LittleEndian::read_u32(&src[16..20]) as u64;
        let dst_hi = LittleEndian::read_u32(&src[20..24]) as u64;
        let next_lo = LittleEndian::read_u32(&src[24..28]) as u64;
        let next_hi = LittleEndian::read_u32(&src[28..32]) as u64;
        (
            control,
            byte_count,
            (src_hi << 32) | src_lo,
            (dst_hi << 32) | dst_lo,
            (next_hi << 32) | next_lo,
        )
    }
}

/// Write a zeroed C2H writeback slot (status=0, length=0) into `dst`.
pub fn clear_writeback(dst: &mut [u8]) {
    debug_assert_eq!(dst.len(), WB_SIZE);
    dst.fill(0);
}

/// Read the `length` field out of one 8-byte writeback slot.
pub fn writeback_length(src: &[u8]) -> u32 {
    debug_assert_eq!(src.len(), WB_SIZE);
    LittleEndian::read_u32(&src[4..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_magic_and_control_bits() {
        let d = Descriptor {
            next_adjacent_count: 5,
            stop: true,
            completed: true,
            byte_count: CHUNK as u32,
            src_addr: 0x1000,
            dst_addr: 0x2000,
            next_desc_addr: 0,
        };
        let mut buf = [0u8; DESC_SIZE];
        d.encode(&mut buf);
        let (control, byte_count, src, dst, _next) = Descriptor::decode(&buf);
        assert_eq!(control >> 16, DESC_MAGIC as u32);
        assert_eq!((control >> 8) & 0x3F, 5);
        assert_eq!(control & 0b11, 0b11);
        assert_eq!(byte_count, CHUNK as u32);
        assert_eq!(src, 0x1000);
        assert_eq!(dst, 0x2000);
    }

    #[test]
    fn next_adjacent_count_is_masked_to_six_bits() {
        let d = Descriptor {
            next_adjacent_count: 0xFF,
            stop: false,
            completed: false,
            byte_count: 0,
            src_addr: 0,
            dst_addr: 0,
            next_desc_addr: 0,
        };
        let mut buf = [0u8; DESC_SIZE];
        d.encode(&mut buf);
        let (control, ..) = Descriptor::decode(&buf);
        assert_eq!((control >> 8) & 0x3F, 0x3F);
    }

    #[test]
    fn writeback_length_reads_second_word() {
        let mut buf = [0u8; WB_SIZE];
        buf[4..8].copy_from_slice(&1234u32.to_le_bytes());
        assert_eq!(writeback_length(&buf), 1234);
    }
}
