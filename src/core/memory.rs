//! Linear memory seam shared with the sandbox, plus an in-process arena implementation.
//!
//! Pointers are `u32` byte offsets into the sandbox's flat memory. Multi-byte values are
//! little-endian.
use std::collections::BTreeMap;
use std::ops::Range;

use crate::core::error::{Error, ErrorKind};

pub const ARENA_ALIGN: u32 = 8;
pub const DEFAULT_MEMORY_LIMIT: u32 = 16 * 1024 * 1024;

/// Allocator plus raw views over a sandbox's linear memory.
///
/// Embedders implement this over their runtime's memory export; [`ArenaMemory`] is a standalone
/// implementation.
pub trait LinearMemory {
    fn allocate(&mut self, size: u32) -> Result<u32, Error>;

    fn free(&mut self, ptr: u32) -> Result<(), Error>;

    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];

    /// Requested size of the live allocation starting at `ptr`, when the allocator tracks it.
    fn allocation_len(&self, _ptr: u32) -> Option<u32> {
        None
    }

    /// True when [`LinearMemory::allocation_len`] answers for every live allocation, so `None`
    /// means `ptr` is not an allocation base.
    fn tracks_allocations(&self) -> bool {
        false
    }

    fn read_bytes(&self, ptr: u32, len: u32) -> Result<&[u8], Error> {
        let range = checked_range(ptr, len, self.bytes().len())?;
        Ok(&self.bytes()[range])
    }

    fn write_bytes(&mut self, ptr: u32, data: &[u8]) -> Result<(), Error> {
        let len = u32::try_from(data.len()).map_err(|_| {
            Error::new(ErrorKind::OutOfBounds)
                .with_message("write larger than the address space")
                .with_ptr(ptr)
        })?;
        let range = checked_range(ptr, len, self.bytes().len())?;
        self.bytes_mut()[range].copy_from_slice(data);
        Ok(())
    }

    fn read_u8(&self, ptr: u32) -> Result<u8, Error> {
        Ok(self.read_bytes(ptr, 1)?[0])
    }

    fn read_u16(&self, ptr: u32) -> Result<u16, Error> {
        let mut out = [0u8; 2];
        out.copy_from_slice(self.read_bytes(ptr, 2)?);
        Ok(u16::from_le_bytes(out))
    }

    fn read_u32(&self, ptr: u32) -> Result<u32, Error> {
        let mut out = [0u8; 4];
        out.copy_from_slice(self.read_bytes(ptr, 4)?);
        Ok(u32::from_le_bytes(out))
    }

    fn write_u8(&mut self, ptr: u32, value: u8) -> Result<(), Error> {
        self.write_bytes(ptr, &[value])
    }

    fn write_u16(&mut self, ptr: u32, value: u16) -> Result<(), Error> {
        self.write_bytes(ptr, &value.to_le_bytes())
    }

    fn write_u32(&mut self, ptr: u32, value: u32) -> Result<(), Error> {
        self.write_bytes(ptr, &value.to_le_bytes())
    }
}

fn checked_range(ptr: u32, len: u32, size: usize) -> Result<Range<usize>, Error> {
    let start = ptr as usize;
    match start.checked_add(len as usize) {
        Some(end) if end <= size => Ok(start..end),
        _ => Err(Error::new(ErrorKind::OutOfBounds)
            .with_message(format!(
                "access of {len} bytes exceeds memory size {size}"
            ))
            .with_ptr(ptr)),
    }
}

pub fn align8(value: u32) -> Option<u32> {
    value.checked_add(ARENA_ALIGN - 1).map(|v| v & !(ARENA_ALIGN - 1))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Allocation {
    requested: u32,
    reserved: u32,
}

/// `Vec`-backed first-fit allocator with coalescing free blocks.
///
/// Address 0 is never handed out, so a zero pointer always means null. Freeing a pointer that is
/// not a live allocation fails with `Usage` rather than corrupting the free list.
#[derive(Debug)]
pub struct ArenaMemory {
    data: Vec<u8>,
    limit: u32,
    top: u32,
    live: BTreeMap<u32, Allocation>,
    free_blocks: BTreeMap<u32, u32>,
}

impl Default for ArenaMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

impl ArenaMemory {
    pub fn new(limit: u32) -> Self {
        Self {
            data: vec![0; ARENA_ALIGN as usize],
            limit,
            top: ARENA_ALIGN,
            live: BTreeMap::new(),
            free_blocks: BTreeMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    pub fn live_bytes(&self) -> u64 {
        self.live.values().map(|a| u64::from(a.requested)).sum()
    }

    /// Pointers of live allocations in address order.
    pub fn live_pointers(&self) -> Vec<u32> {
        self.live.keys().copied().collect()
    }

    fn take_free_block(&mut self, reserved: u32) -> Option<u32> {
        let (start, len) = self
            .free_blocks
            .iter()
            .find(|(_, len)| **len >= reserved)
            .map(|(start, len)| (*start, *len))?;
        self.free_blocks.remove(&start);
        if len > reserved {
            self.free_blocks.insert(start + reserved, len - reserved);
        }
        Some(start)
    }

    fn bump(&mut self, reserved: u32, requested: u32) -> Result<u32, Error> {
        let end = self
            .top
            .checked_add(reserved)
            .filter(|end| *end <= self.limit)
            .ok_or_else(|| {
                Error::new(ErrorKind::OutOfMemory)
                    .with_message(format!(
                        "allocation of {requested} bytes exceeds memory limit {}",
                        self.limit
                    ))
                    .with_hint("Free unused buffers or raise --memory-limit.")
            })?;
        let start = self.top;
        self.data.resize(end as usize, 0);
        self.top = end;
        Ok(start)
    }
}

impl LinearMemory for ArenaMemory {
    fn allocate(&mut self, size: u32) -> Result<u32, Error> {
        let reserved = align8(size.max(1)).ok_or_else(|| {
            Error::new(ErrorKind::OutOfMemory)
                .with_message(format!("allocation of {size} bytes overflows the address space"))
        })?;
        let ptr = match self.take_free_block(reserved) {
            Some(ptr) => ptr,
            None => self.bump(reserved, size)?,
        };
        self.data[ptr as usize..(ptr + reserved) as usize].fill(0);
        self.live.insert(
            ptr,
            Allocation {
                requested: size,
                reserved,
            },
        );
        tracing::trace!(ptr, size, "arena allocate");
        Ok(ptr)
    }

    fn free(&mut self, ptr: u32) -> Result<(), Error> {
        if ptr == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("cannot free a null pointer"));
        }
        let allocation = self.live.remove(&ptr).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("pointer is not a live allocation")
                .with_hint("The buffer was already freed or did not come from this allocator.")
                .with_ptr(ptr)
        })?;

        let mut start = ptr;
        let mut len = allocation.reserved;
        if let Some(next_len) = self.free_blocks.remove(&(start + len)) {
            len += next_len;
        }
        let prev = self
            .free_blocks
            .range(..start)
            .next_back()
            .map(|(prev_start, prev_len)| (*prev_start, *prev_len));
        if let Some((prev_start, prev_len)) = prev {
            if prev_start + prev_len == start {
                self.free_blocks.remove(&prev_start);
                start = prev_start;
                len += prev_len;
            }
        }
        if start + len == self.top {
            self.top = start;
            self.data.truncate(start as usize);
        } else {
            self.free_blocks.insert(start, len);
        }
        tracing::trace!(ptr, "arena free");
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn allocation_len(&self, ptr: u32) -> Option<u32> {
        self.live.get(&ptr).map(|allocation| allocation.requested)
    }

    fn tracks_allocations(&self) -> bool {
        true
    }
}
