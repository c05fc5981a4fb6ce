//! Generational slot table for host values referenced from sandboxed code.
//!
//! Handles pair a slot index with the slot's generation. Releasing a slot clears it and bumps the
//! generation, so a stale handle is rejected instead of aliasing whatever reuses the slot.
use crate::core::error::{Error, ErrorKind};

/// Reference to one slot of a [`HandleTable`].
///
/// Crosses the boundary by value as a `u64` (see [`Handle::to_bits`]): generation in the high
/// 32 bits, slot index in the low 32 bits.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot-indexed registry with a LIFO free list.
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Inserts `value`, reusing the most recently freed slot when one exists.
    pub fn store(&mut self, value: T) -> Result<Handle, Error> {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| {
                    Error::new(ErrorKind::OutOfMemory).with_message("handle table is full")
                })?;
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                index
            }
        };
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none(), "free list returned an occupied slot");
        slot.value = Some(value);
        self.live += 1;
        Ok(Handle::from_parts(index, slot.generation))
    }

    pub fn load(&self, handle: Handle) -> Result<&T, Error> {
        let index = self.validate(handle)?;
        self.slots[index]
            .value
            .as_ref()
            .ok_or_else(|| released(handle))
    }

    pub fn load_mut(&mut self, handle: Handle) -> Result<&mut T, Error> {
        let index = self.validate(handle)?;
        self.slots[index]
            .value
            .as_mut()
            .ok_or_else(|| released(handle))
    }

    /// Clears the slot and hands back the value it held.
    ///
    /// A slot whose generation is exhausted is retired rather than returned to the free list.
    pub fn release(&mut self, handle: Handle) -> Result<T, Error> {
        let index = self.validate(handle)?;
        let slot = &mut self.slots[index];
        let value = slot.value.take().ok_or_else(|| released(handle))?;
        self.live -= 1;
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free_list.push(handle.index);
            }
            None => {
                tracing::debug!(index = handle.index, "retiring slot with exhausted generation");
            }
        }
        Ok(value)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.validate(handle).is_ok()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever allocated, live or not.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::from_parts(index as u32, slot.generation), value))
        })
    }

    fn validate(&self, handle: Handle) -> Result<usize, Error> {
        let index = handle.index as usize;
        let slot = self.slots.get(index).ok_or_else(|| {
            Error::new(ErrorKind::InvalidHandle)
                .with_message("handle was never issued")
                .with_handle(handle.to_bits())
        })?;
        if slot.generation != handle.generation || slot.value.is_none() {
            return Err(released(handle));
        }
        Ok(index)
    }
}

fn released(handle: Handle) -> Error {
    Error::new(ErrorKind::InvalidHandle)
        .with_message("handle was released")
        .with_hint("Handles must not be used after release; store the value again.")
        .with_handle(handle.to_bits())
}
