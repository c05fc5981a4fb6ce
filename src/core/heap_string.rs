//! Length-prefixed UTF-16 buffers in sandbox memory.
//!
//! Wire layout, `4 + 2N` bytes, no terminator or padding:
//! bytes `[0, 4)` hold `N` as a little-endian `u32`; bytes `[4, 4 + 2N)` hold `N` little-endian
//! code units. Every pointer exchanged with the sandbox is the buffer base (the header address).
use crate::core::error::{Error, ErrorKind};
use crate::core::memory::LinearMemory;
use crate::core::value::Utf16Text;

pub const HEADER_LEN: u32 = 4;
pub const MAX_UNITS: u32 = (u32::MAX - HEADER_LEN) / 2;

/// Byte size of the wire buffer holding `count` code units.
pub fn encoded_len(count: usize) -> Result<u32, Error> {
    u32::try_from(count)
        .ok()
        .filter(|count| *count <= MAX_UNITS)
        .map(|count| HEADER_LEN + 2 * count)
        .ok_or_else(|| {
            Error::new(ErrorKind::OutOfMemory)
                .with_message(format!("text of {count} code units does not fit in linear memory"))
        })
}

pub fn encode_wire(units: &[u16]) -> Result<Vec<u8>, Error> {
    let size = encoded_len(units.len())?;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&((units.len() as u32).to_le_bytes()));
    for unit in units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    Ok(out)
}

/// Parses a complete wire buffer; the slice length must match its header exactly.
pub fn decode_wire(bytes: &[u8]) -> Result<Utf16Text, Error> {
    if bytes.len() < HEADER_LEN as usize {
        return Err(Error::new(ErrorKind::Corrupt).with_message("buffer shorter than its header"));
    }
    let mut header = [0u8; 4];
    header.copy_from_slice(&bytes[..4]);
    let count = u32::from_le_bytes(header);
    let expected = encoded_len(count as usize)?;
    if bytes.len() != expected as usize {
        return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
            "header declares {count} code units ({expected} bytes) but buffer has {} bytes",
            bytes.len()
        )));
    }
    Ok(units_from_le(&bytes[4..]))
}

fn units_from_le(bytes: &[u8]) -> Utf16Text {
    Utf16Text::from_units(
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>(),
    )
}

/// Scoped ownership of one allocation in linear memory.
///
/// Dropping an armed buffer frees it, so every early return releases the allocation.
/// [`HeapBuffer::into_raw`] hands ownership to the sandbox instead.
pub struct HeapBuffer<'m, M: LinearMemory + ?Sized> {
    memory: &'m mut M,
    ptr: u32,
    armed: bool,
}

impl<'m, M: LinearMemory + ?Sized> HeapBuffer<'m, M> {
    pub fn allocate(memory: &'m mut M, size: u32) -> Result<Self, Error> {
        let ptr = memory.allocate(size)?;
        Ok(Self {
            memory,
            ptr,
            armed: true,
        })
    }

    /// Takes ownership of an existing allocation.
    pub fn adopt(memory: &'m mut M, ptr: u32) -> Self {
        Self {
            memory,
            ptr,
            armed: true,
        }
    }

    pub fn ptr(&self) -> u32 {
        self.ptr
    }

    pub fn memory(&self) -> &M {
        &*self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut *self.memory
    }

    pub fn into_raw(mut self) -> u32 {
        self.armed = false;
        self.ptr
    }

    /// Frees now and reports allocator errors that `Drop` would only log.
    pub fn free(mut self) -> Result<(), Error> {
        self.armed = false;
        self.memory.free(self.ptr)
    }
}

impl<M: LinearMemory + ?Sized> Drop for HeapBuffer<'_, M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.memory.free(self.ptr) {
            tracing::warn!(ptr = self.ptr, error = %err, "failed to free heap buffer");
        }
    }
}

/// Copies `units` into a freshly allocated buffer and returns its base address.
///
/// The caller owns the buffer and must free it once, directly or via [`decode_from_heap`].
pub fn encode_to_heap<M: LinearMemory + ?Sized>(
    memory: &mut M,
    units: &[u16],
) -> Result<u32, Error> {
    let bytes = encode_wire(units)?;
    let size = bytes.len() as u32;
    let mut buffer = HeapBuffer::allocate(memory, size)?;
    let ptr = buffer.ptr();
    buffer.memory_mut().write_bytes(ptr, &bytes)?;
    tracing::debug!(ptr, count = units.len(), "encoded text to heap");
    Ok(buffer.into_raw())
}

/// Rejects null and, on allocators that track sizes, anything but a live allocation base.
fn check_base<M: LinearMemory + ?Sized>(memory: &M, ptr: u32) -> Result<(), Error> {
    if ptr == 0 {
        return Err(Error::new(ErrorKind::Usage).with_message("heap string pointer is null"));
    }
    if memory.tracks_allocations() && memory.allocation_len(ptr).is_none() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("pointer is not the base of a live allocation")
            .with_hint("Pass the buffer base address (its header), not an interior or freed pointer.")
            .with_ptr(ptr));
    }
    Ok(())
}

/// Reads the buffer at `ptr` without consuming it.
///
/// `count` must equal the header, and the buffer must fit the allocation when the allocator
/// tracks sizes.
pub fn read_from_heap<M: LinearMemory + ?Sized>(
    memory: &M,
    ptr: u32,
    count: u32,
) -> Result<Utf16Text, Error> {
    check_base(memory, ptr)?;
    let header = memory.read_u32(ptr)?;
    if header != count {
        return Err(Error::new(ErrorKind::OutOfBounds)
            .with_message(format!(
                "count {count} does not match buffer header {header}"
            ))
            .with_hint("Pass the buffer base address and the count written at encode time.")
            .with_ptr(ptr));
    }
    let size = encoded_len(count as usize)?;
    if let Some(len) = memory.allocation_len(ptr) {
        if len < size {
            return Err(Error::new(ErrorKind::OutOfBounds)
                .with_message(format!(
                    "allocation of {len} bytes is too small for {count} code units"
                ))
                .with_ptr(ptr));
        }
    }
    let bytes = memory.read_bytes(ptr + HEADER_LEN, size - HEADER_LEN)?;
    Ok(units_from_le(bytes))
}

/// Reads the buffer at `ptr` and frees it on every path, success or failure.
pub fn decode_from_heap<M: LinearMemory + ?Sized>(
    memory: &mut M,
    ptr: u32,
    count: u32,
) -> Result<Utf16Text, Error> {
    check_base(&*memory, ptr)?;
    let buffer = HeapBuffer::adopt(memory, ptr);
    let text = read_from_heap(buffer.memory(), ptr, count)?;
    buffer.free()?;
    tracing::debug!(ptr, count, "decoded text from heap");
    Ok(text)
}
