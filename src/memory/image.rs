//! Process image for the simulated debuggee
//!
//! This module provides block-based memory with:
//! - Explicit allocation/deallocation in a stack and a heap region
//! - Tombstone tracking for freed blocks (reads of freed memory fail)
//! - Paged-out blocks, which model memory the debugger cannot read
//!
//! Blocks are kept in a `BTreeMap` keyed by base address so that locating the
//! block containing an address is a single range query.

use super::{
    align_up, Address, MemoryAccessor, MemoryError, HEAP_ADDRESS_START, POINTER_SIZE,
    STACK_ADDRESS_START,
};
use std::collections::BTreeMap;

/// Gap left between heap blocks, standing in for allocator headers
const HEAP_BLOCK_GAP: u64 = 16;

/// State of a memory block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Allocated,
    Tombstone, // Freed but kept so stale reads are detected
    PagedOut,  // Allocated, but not readable by the debugger
}

/// Which part of the address space a block lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Stack,
    Heap,
}

/// A block of target memory
#[derive(Debug, Clone)]
pub struct Block {
    pub data: Vec<u8>,
    pub state: BlockState,
    pub region: Region,
}

impl Block {
    fn new(size: usize, region: Region) -> Self {
        Block {
            data: vec![0; size],
            state: BlockState::Allocated,
            region,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// The memory of one stopped process
#[derive(Debug, Clone)]
pub struct ProcessImage {
    blocks: BTreeMap<Address, Block>,
    next_heap_address: Address,
    next_stack_address: Address,
    total_allocated_bytes: usize,
    max_size: usize,
}

impl ProcessImage {
    /// Create an empty image with a maximum total allocation size
    pub fn new(max_size: usize) -> Self {
        ProcessImage {
            blocks: BTreeMap::new(),
            next_heap_address: HEAP_ADDRESS_START,
            next_stack_address: STACK_ADDRESS_START,
            total_allocated_bytes: 0,
            max_size,
        }
    }

    /// Allocate a zero-filled block of `size` bytes aligned to `align`
    pub fn allocate(
        &mut self,
        region: Region,
        size: usize,
        align: u64,
    ) -> Result<Address, MemoryError> {
        if self.total_allocated_bytes + size > self.max_size {
            return Err(MemoryError::OutOfMemory {
                requested: size,
                allocated: self.total_allocated_bytes,
                limit: self.max_size,
            });
        }

        let addr = match region {
            Region::Heap => {
                let addr = align_up(self.next_heap_address, align.max(16));
                self.next_heap_address = addr + size.max(1) as u64 + HEAP_BLOCK_GAP;
                addr
            }
            Region::Stack => {
                let addr = align_up(self.next_stack_address, align.max(POINTER_SIZE));
                self.next_stack_address = addr + size.max(1) as u64;
                addr
            }
        };

        self.blocks.insert(addr, Block::new(size, region));
        self.total_allocated_bytes += size;
        Ok(addr)
    }

    /// Free a heap or stack block (kept as a tombstone)
    pub fn free(&mut self, addr: Address) -> Result<(), MemoryError> {
        match self.blocks.get_mut(&addr) {
            Some(block) if block.state == BlockState::Tombstone => {
                Err(MemoryError::DoubleFree { address: addr })
            }
            Some(block) => {
                block.state = BlockState::Tombstone;
                self.total_allocated_bytes -= block.size();
                Ok(())
            }
            None => Err(MemoryError::InvalidFree { address: addr }),
        }
    }

    /// Mark the block containing `addr` as unreadable
    pub fn page_out(&mut self, addr: Address) -> Result<(), MemoryError> {
        let (_, block) = self.block_containing_mut(addr, 1)?;
        block.state = BlockState::PagedOut;
        Ok(())
    }

    /// Write bytes starting at an address; the range must lie in one block
    pub fn write_bytes(&mut self, addr: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        let (base, block) = self.block_containing_mut(addr, bytes.len())?;
        if block.state == BlockState::Tombstone {
            return Err(MemoryError::Freed { address: addr });
        }
        let offset = (addr - base) as usize;
        block.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, addr: Address, value: u8) -> Result<(), MemoryError> {
        self.write_bytes(addr, &[value])
    }

    pub fn write_u32(&mut self, addr: Address, value: u32) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    pub fn write_i32(&mut self, addr: Address, value: i32) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    pub fn write_u64(&mut self, addr: Address, value: u64) -> Result<(), MemoryError> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    pub fn write_pointer(&mut self, addr: Address, target: Address) -> Result<(), MemoryError> {
        self.write_u64(addr, target)
    }

    /// Write an unsigned integer truncated to `size` bytes
    pub fn write_unsigned(&mut self, addr: Address, size: u64, value: u64) -> Result<(), MemoryError> {
        let bytes = value.to_le_bytes();
        self.write_bytes(addr, &bytes[..(size as usize).min(8)])
    }

    /// All blocks, including tombstones (for display)
    pub fn blocks(&self) -> impl Iterator<Item = (&Address, &Block)> {
        self.blocks.iter()
    }

    /// Bytes currently allocated (tombstones excluded)
    pub fn total_allocated(&self) -> usize {
        self.total_allocated_bytes
    }

    /// Rough memory footprint of the image, used for snapshot budgeting
    pub fn estimated_size(&self) -> usize {
        self.blocks.values().map(|b| b.size() + 32).sum()
    }

    fn block_containing(&self, addr: Address, len: usize) -> Result<(Address, &Block), MemoryError> {
        let (&base, block) = self
            .blocks
            .range(..=addr)
            .next_back()
            .filter(|(&base, block)| addr < base + block.size().max(1) as u64)
            .ok_or(MemoryError::Unmapped {
                address: addr,
                size: len,
            })?;

        if addr + len as u64 > base + block.size() as u64 {
            return Err(MemoryError::Overrun {
                address: addr,
                size: len,
            });
        }
        Ok((base, block))
    }

    fn block_containing_mut(
        &mut self,
        addr: Address,
        len: usize,
    ) -> Result<(Address, &mut Block), MemoryError> {
        let (base, _) = self.block_containing(addr, len)?;
        let block = self
            .blocks
            .get_mut(&base)
            .ok_or(MemoryError::Unmapped {
                address: addr,
                size: len,
            })?;
        Ok((base, block))
    }
}

impl MemoryAccessor for ProcessImage {
    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        let (base, block) = self.block_containing(address, len)?;
        match block.state {
            BlockState::Allocated => {
                let offset = (address - base) as usize;
                Ok(block.data[offset..offset + len].to_vec())
            }
            BlockState::Tombstone => Err(MemoryError::Freed { address }),
            BlockState::PagedOut => Err(MemoryError::Unavailable { address }),
        }
    }
}

impl Default for ProcessImage {
    fn default() -> Self {
        // Default image size: 16 MB
        Self::new(16 * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_are_aligned_and_disjoint() {
        let mut image = ProcessImage::default();
        let a = image.allocate(Region::Heap, 40, 8).unwrap();
        let b = image.allocate(Region::Heap, 40, 8).unwrap();
        let s = image.allocate(Region::Stack, 48, 8).unwrap();

        assert_eq!(a % 16, 0);
        assert!(b >= a + 40 + HEAP_BLOCK_GAP);
        assert!(s >= STACK_ADDRESS_START);
        assert_eq!(image.total_allocated(), 128);
    }

    #[test]
    fn test_read_between_blocks_is_unmapped() {
        let mut image = ProcessImage::default();
        let a = image.allocate(Region::Heap, 8, 8).unwrap();

        assert!(image.read_u64(a).is_ok());
        assert_eq!(
            image.read_u8(a + 8),
            Err(MemoryError::Unmapped {
                address: a + 8,
                size: 1
            })
        );
        assert_eq!(
            image.read_u64(a + 4),
            Err(MemoryError::Overrun {
                address: a + 4,
                size: 8
            })
        );
        assert!(matches!(
            image.read_u8(0),
            Err(MemoryError::Unmapped { .. })
        ));
    }

    #[test]
    fn test_freed_block_reads_fail() {
        let mut image = ProcessImage::default();
        let a = image.allocate(Region::Heap, 16, 8).unwrap();
        image.write_u64(a, 42).unwrap();
        image.free(a).unwrap();

        assert_eq!(image.read_u64(a), Err(MemoryError::Freed { address: a }));
        assert_eq!(image.free(a), Err(MemoryError::DoubleFree { address: a }));
        assert_eq!(image.total_allocated(), 0);
    }

    #[test]
    fn test_paged_out_block_reads_fail() {
        let mut image = ProcessImage::default();
        let a = image.allocate(Region::Heap, 16, 8).unwrap();
        image.page_out(a + 4).unwrap();

        assert_eq!(
            image.read_u8(a + 8),
            Err(MemoryError::Unavailable { address: a + 8 })
        );
    }

    #[test]
    fn test_out_of_memory() {
        let mut image = ProcessImage::new(64);
        assert!(image.allocate(Region::Heap, 60, 8).is_ok());
        assert!(matches!(
            image.allocate(Region::Heap, 8, 8),
            Err(MemoryError::OutOfMemory { .. })
        ));
    }
}
