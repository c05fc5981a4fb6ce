//! Purpose: Boundary layer between host values and a linear-memory sandbox.
//! Exports: `api` (bridge, handles, heap strings, memory seam), `abi` (C surface), CLI helpers.
//! Role: Library backing the `heapbridge` CLI, the C ABI, and embedding hosts.
//! Invariants: All bridge state lives in explicit `Bridge` values; there are no globals.
//! Invariants: Every misuse of a handle or buffer surfaces as a checked `Error`.
pub mod abi;
pub mod api;
pub mod core;
pub mod hex;
pub mod notice;
pub mod report_json;
pub mod script;
