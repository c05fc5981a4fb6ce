//! Purpose: Own one boundary between host values and a sandbox's linear memory.
//! Exports: `Bridge`, `BridgeConfig`, `BridgeStats`, `ApiResult`.
//! Role: Single context object passed to every call site; no ambient global state.
//! Invariants: Handles are generational; stale or unissued handles fail with `InvalidHandle`.
//! Invariants: Buffer pointers are heap string bases (header address) in both directions.
//! Invariants: Decode consumes its buffer on success and on failure.
#![allow(clippy::result_large_err)]

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::handle::{Handle, HandleTable};
use crate::core::heap_string;
use crate::core::memory::{ArenaMemory, DEFAULT_MEMORY_LIMIT, LinearMemory};
use crate::core::value::{HostValue, Utf16Text};

use super::owned::OwnedHandle;

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BridgeConfig {
    pub memory_limit: u32,
    pub table_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            table_capacity: 0,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_limit(mut self, memory_limit: u32) -> Self {
        self.memory_limit = memory_limit;
        self
    }

    pub fn with_table_capacity(mut self, table_capacity: usize) -> Self {
        self.table_capacity = table_capacity;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BridgeStats {
    pub live_handles: usize,
    pub free_slots: usize,
    pub slots: usize,
    pub live_buffers: Option<usize>,
    pub live_bytes: Option<u64>,
}

#[derive(Debug)]
pub struct Bridge<M: LinearMemory = ArenaMemory> {
    table: HandleTable<HostValue>,
    memory: M,
}

impl Bridge<ArenaMemory> {
    pub fn with_config(config: &BridgeConfig) -> Self {
        Self {
            table: HandleTable::with_capacity(config.table_capacity),
            memory: ArenaMemory::new(config.memory_limit),
        }
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            live_buffers: Some(self.memory.live_allocations()),
            live_bytes: Some(self.memory.live_bytes()),
            ..self.table_stats()
        }
    }
}

impl Default for Bridge<ArenaMemory> {
    fn default() -> Self {
        Self::with_config(&BridgeConfig::default())
    }
}

impl<M: LinearMemory> Bridge<M> {
    pub fn new(memory: M) -> Self {
        Self {
            table: HandleTable::new(),
            memory,
        }
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn table(&self) -> &HandleTable<HostValue> {
        &self.table
    }

    pub fn table_stats(&self) -> BridgeStats {
        BridgeStats {
            live_handles: self.table.len(),
            free_slots: self.table.free_count(),
            slots: self.table.slot_count(),
            live_buffers: None,
            live_bytes: None,
        }
    }

    pub fn live_handles(&self) -> Vec<Handle> {
        self.table.iter().map(|(handle, _)| handle).collect()
    }

    pub fn store(&mut self, value: impl Into<HostValue>) -> ApiResult<Handle> {
        let value = value.into();
        let kind = value.type_name();
        let handle = self.table.store(value)?;
        tracing::debug!(handle = handle.to_bits(), kind, "store");
        Ok(handle)
    }

    /// Stores `value` behind a guard that releases the handle when dropped.
    pub fn store_owned(&mut self, value: impl Into<HostValue>) -> ApiResult<OwnedHandle<'_, M>> {
        let handle = self.store(value)?;
        Ok(OwnedHandle::adopt(self, handle))
    }

    pub fn load(&self, handle: Handle) -> ApiResult<&HostValue> {
        self.table.load(handle)
    }

    pub fn release(&mut self, handle: Handle) -> ApiResult<HostValue> {
        let value = self.table.release(handle)?;
        tracing::debug!(handle = handle.to_bits(), "release");
        Ok(value)
    }

    /// Appends a copy of `elem`'s value to the list stored at `list`.
    pub fn push(&mut self, list: Handle, elem: Handle) -> ApiResult<()> {
        let item = self.table.load(elem)?.clone();
        match self.table.load_mut(list)? {
            HostValue::List(items) => {
                items.push(item);
                Ok(())
            }
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("expected list, found {}", other.type_name()))
                .with_handle(list.to_bits())),
        }
    }

    pub fn encode_to_heap(&mut self, text: &Utf16Text) -> ApiResult<u32> {
        heap_string::encode_to_heap(&mut self.memory, text.units())
    }

    pub fn decode_from_heap(&mut self, ptr: u32, count: u32) -> ApiResult<Utf16Text> {
        heap_string::decode_from_heap(&mut self.memory, ptr, count)
    }

    pub fn allocate(&mut self, size: u32) -> ApiResult<u32> {
        self.memory.allocate(size)
    }

    pub fn free(&mut self, ptr: u32) -> ApiResult<()> {
        self.memory.free(ptr)
    }

    /// Consumes a sandbox text buffer and stores it as a host value.
    pub fn import_text(&mut self, ptr: u32, count: u32) -> ApiResult<Handle> {
        let text = self.decode_from_heap(ptr, count)?;
        self.store(text)
    }

    /// Copies the text stored at `handle` into a new sandbox buffer owned by the caller.
    pub fn export_text(&mut self, handle: Handle) -> ApiResult<u32> {
        let value = self.table.load(handle)?;
        let text = value.as_text().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("expected text, found {}", value.type_name()))
                .with_handle(handle.to_bits())
        })?;
        heap_string::encode_to_heap(&mut self.memory, text.units())
    }
}

#[cfg(test)]
mod tests {
    use super::{Bridge, BridgeConfig};
    use crate::core::error::ErrorKind;
    use crate::core::memory::LinearMemory;
    use crate::core::value::{HostValue, Utf16Text};

    #[test]
    fn store_release_reuse_scenario() {
        let mut bridge: Bridge = Bridge::default();
        let h1 = bridge.store("objA").expect("store a");
        let h2 = bridge.store("objB").expect("store b");
        assert_ne!(h1, h2);

        bridge.release(h1).expect("release a");
        assert_eq!(bridge.load(h1).expect_err("stale").kind(), ErrorKind::InvalidHandle);

        let h3 = bridge.store("objC").expect("store c");
        assert_eq!(h3.index(), h1.index());
        assert_eq!(bridge.load(h2).expect("load b"), &HostValue::from("objB"));
        assert_eq!(bridge.load(h3).expect("load c"), &HostValue::from("objC"));
    }

    #[test]
    fn export_then_import_round_trips_text() {
        let mut bridge: Bridge = Bridge::default();
        let original = bridge.store("héllo 🦀").expect("store");
        let ptr = bridge.export_text(original).expect("export");
        let count = bridge.memory().read_u32(ptr).expect("header");
        assert_eq!(count, 8);

        let copy = bridge.import_text(ptr, count).expect("import");
        assert_eq!(bridge.load(copy).expect("load"), bridge.load(original).expect("load"));
        assert_eq!(bridge.stats().live_buffers, Some(0));
    }

    #[test]
    fn export_rejects_non_text() {
        let mut bridge: Bridge = Bridge::default();
        let handle = bridge.store(42u32).expect("store");
        let err = bridge.export_text(handle).expect_err("number");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.handle(), Some(handle.to_bits()));
    }

    #[test]
    fn push_appends_copy_of_element() {
        let mut bridge: Bridge = Bridge::default();
        let list = bridge.store(Vec::<HostValue>::new()).expect("list");
        let elem = bridge.store(true).expect("elem");
        bridge.push(list, elem).expect("push");
        bridge.release(elem).expect("release elem");

        assert_eq!(
            bridge.load(list).expect("load"),
            &HostValue::List(vec![HostValue::Bool(true)])
        );
        let err = bridge.push(elem, list).expect_err("stale elem");
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn push_into_non_list_is_usage_error() {
        let mut bridge: Bridge = Bridge::default();
        let target = bridge.store(1u8).expect("store");
        let elem = bridge.store(2u8).expect("store");
        assert_eq!(bridge.push(target, elem).expect_err("not list").kind(), ErrorKind::Usage);
    }

    #[test]
    fn memory_limit_comes_from_config() {
        let config = BridgeConfig::new().with_memory_limit(32).with_table_capacity(4);
        let mut bridge = Bridge::with_config(&config);
        let text = Utf16Text::from("this does not fit in 32 bytes");
        let err = bridge.encode_to_heap(&text).expect_err("oom");
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    }

    #[test]
    fn stats_track_live_state() {
        let mut bridge: Bridge = Bridge::default();
        let a = bridge.store(1u8).expect("store");
        bridge.store(2u8).expect("store");
        bridge.release(a).expect("release");
        let ptr = bridge.encode_to_heap(&Utf16Text::from("AB")).expect("encode");

        let stats = bridge.stats();
        assert_eq!(stats.live_handles, 1);
        assert_eq!(stats.free_slots, 1);
        assert_eq!(stats.slots, 2);
        assert_eq!(stats.live_buffers, Some(1));
        assert_eq!(stats.live_bytes, Some(8));

        bridge.free(ptr).expect("free");
        assert_eq!(bridge.stats().live_bytes, Some(0));
    }
}
