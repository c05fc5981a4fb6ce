//! Purpose: Define the public Rust API boundary for heapbridge.
//! Exports: Bridge, configuration, handles, host values, memory seam, and errors.
//! Role: Surface used by the CLI, the C ABI, and embedding hosts.
//! Invariants: Callers reach core primitives through these re-exports.

mod bridge;
mod owned;

pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::handle::{Handle, HandleTable};
pub use crate::core::heap_string::{
    HEADER_LEN, HeapBuffer, decode_from_heap, decode_wire, encode_to_heap, encode_wire,
    encoded_len, read_from_heap,
};
pub use crate::core::memory::{ArenaMemory, DEFAULT_MEMORY_LIMIT, LinearMemory};
pub use crate::core::value::{HostValue, Utf16Text};
pub use bridge::{ApiResult, Bridge, BridgeConfig, BridgeStats};
pub use owned::OwnedHandle;
