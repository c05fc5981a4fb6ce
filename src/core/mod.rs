// Core modules: handle table, linear memory, heap string codec, host values, errors.
pub mod error;
pub mod handle;
pub mod heap_string;
pub mod memory;
pub mod value;
