//! Debuggee memory model
//!
//! This module provides the memory side of the external collaborator the
//! formatters read through:
//! - [`MemoryAccessor`]: raw, little-endian reads at an address
//! - [`image`]: a block-based [`ProcessImage`] with a stack and a heap region
//!
//! # Address Space
//!
//! The simulated target is a 64-bit little-endian process:
//! - stack blocks start at [`STACK_ADDRESS_START`]
//! - heap blocks start at [`HEAP_ADDRESS_START`]
//! - pointers are 8 bytes
//!
//! Freed blocks stay in the image as tombstones, so a stale node reference
//! fails with [`MemoryError::Freed`] instead of silently reading reused bytes.

pub mod image;

pub use image::{BlockState, ProcessImage, Region};

/// Memory address type (64-bit)
pub type Address = u64;

/// Size of a target pointer in bytes
pub const POINTER_SIZE: u64 = 8;

/// Starting address for heap allocations
pub const HEAP_ADDRESS_START: Address = 0x1000_0000;

/// Starting address for stack variables
pub const STACK_ADDRESS_START: Address = 0x7ffe_0000;

/// Errors raised by memory reads and by the image's allocator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("invalid read: address 0x{address:x} ({size} bytes) is not mapped")]
    Unmapped { address: Address, size: usize },

    #[error("use-after-free: address 0x{address:x} has been freed")]
    Freed { address: Address },

    #[error("memory at 0x{address:x} is not available (paged out)")]
    Unavailable { address: Address },

    #[error("access of {size} bytes at 0x{address:x} runs past the end of its block")]
    Overrun { address: Address, size: usize },

    #[error("out of memory: requested {requested} bytes, {allocated} allocated, limit is {limit}")]
    OutOfMemory {
        requested: usize,
        allocated: usize,
        limit: usize,
    },

    #[error("invalid free: address 0x{address:x} was never allocated")]
    InvalidFree { address: Address },

    #[error("double free detected at address 0x{address:x}")]
    DoubleFree { address: Address },
}

/// Read access to a live or post-mortem process image.
///
/// Only [`read_bytes`](MemoryAccessor::read_bytes) is required; the typed
/// helpers decode little-endian values on top of it.
pub trait MemoryAccessor {
    /// Read exactly `len` bytes starting at `address`
    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryError>;

    fn read_u8(&self, address: Address) -> Result<u8, MemoryError> {
        Ok(self.read_bytes(address, 1)?[0])
    }

    fn read_u32(&self, address: Address) -> Result<u32, MemoryError> {
        Ok(u32::from_le_bytes(le_array(&self.read_bytes(address, 4)?)))
    }

    fn read_i32(&self, address: Address) -> Result<i32, MemoryError> {
        Ok(i32::from_le_bytes(le_array(&self.read_bytes(address, 4)?)))
    }

    fn read_u64(&self, address: Address) -> Result<u64, MemoryError> {
        Ok(u64::from_le_bytes(le_array(&self.read_bytes(address, 8)?)))
    }

    fn read_i64(&self, address: Address) -> Result<i64, MemoryError> {
        Ok(i64::from_le_bytes(le_array(&self.read_bytes(address, 8)?)))
    }

    /// Read a target pointer
    fn read_pointer(&self, address: Address) -> Result<Address, MemoryError> {
        self.read_u64(address)
    }

    /// Read an unsigned integer of 1, 2, 4 or 8 bytes
    fn read_unsigned(&self, address: Address, size: u64) -> Result<u64, MemoryError> {
        let bytes = self.read_bytes(address, size as usize)?;
        let mut buf = [0u8; 8];
        let n = bytes.len().min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(u64::from_le_bytes(buf))
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Round `value` up to the next multiple of `align` (which must be non-zero)
pub fn align_up(value: u64, align: u64) -> u64 {
    let align = align.max(1);
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(25, 4), 28);
        assert_eq!(align_up(25, 8), 32);
        assert_eq!(align_up(32, 8), 32);
        assert_eq!(align_up(3, 0), 3);
    }

    #[test]
    fn test_typed_reads_are_little_endian() {
        let mut image = ProcessImage::default();
        let addr = image.allocate(Region::Heap, 16, 8).unwrap();
        image
            .write_bytes(addr, &[0x78, 0x56, 0x34, 0x12, 0xff, 0xff, 0xff, 0xff])
            .unwrap();

        assert_eq!(image.read_u8(addr).unwrap(), 0x78);
        assert_eq!(image.read_u32(addr).unwrap(), 0x1234_5678);
        assert_eq!(image.read_i32(addr + 4).unwrap(), -1);
        assert_eq!(image.read_u64(addr).unwrap(), 0xffff_ffff_1234_5678);
        assert_eq!(image.read_unsigned(addr, 2).unwrap(), 0x5678);
    }
}
