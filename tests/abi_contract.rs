// C ABI contract tests: exercise exported functions the way a C host would.
use std::ptr;

use heapbridge::abi::{
    hbr_bridge, hbr_bridge_free, hbr_bridge_new, hbr_buf, hbr_buf_free, hbr_error,
    hbr_error_free, hbr_error_kind, hbr_export_text, hbr_heap_alloc, hbr_heap_free,
    hbr_heap_read, hbr_heap_write, hbr_import_text, hbr_load_bool, hbr_load_number, hbr_push,
    hbr_release, hbr_store_bool, hbr_store_list, hbr_store_number, hbr_store_utf16,
};

struct Fixture {
    bridge: *mut hbr_bridge,
}

impl Fixture {
    fn new() -> Self {
        let mut bridge: *mut hbr_bridge = ptr::null_mut();
        assert_eq!(hbr_bridge_new(0, &mut bridge, ptr::null_mut()), 0);
        assert!(!bridge.is_null());
        Self { bridge }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        hbr_bridge_free(self.bridge);
    }
}

fn take_error_kind(err: *mut hbr_error) -> i32 {
    assert!(!err.is_null(), "expected error");
    let kind = hbr_error_kind(err);
    hbr_error_free(err);
    kind
}

fn read_bytes(bridge: *mut hbr_bridge, ptr: u32, len: u32) -> Vec<u8> {
    let mut buf = hbr_buf::empty();
    assert_eq!(hbr_heap_read(bridge, ptr, len, &mut buf, ptr::null_mut()), 0);
    let bytes = buf.as_slice().to_vec();
    hbr_buf_free(&mut buf);
    assert!(buf.as_slice().is_empty());
    bytes
}

#[test]
fn store_load_release_numbers_and_bools() {
    let fx = Fixture::new();
    let mut h1 = 0u64;
    let mut h2 = 0u64;
    assert_eq!(hbr_store_number(fx.bridge, 2.5, &mut h1, ptr::null_mut()), 0);
    assert_eq!(hbr_store_bool(fx.bridge, 1, &mut h2, ptr::null_mut()), 0);
    assert_ne!(h1, h2);

    let mut number = 0.0f64;
    assert_eq!(hbr_load_number(fx.bridge, h1, &mut number, ptr::null_mut()), 0);
    assert_eq!(number, 2.5);
    let mut flag = 0u8;
    assert_eq!(hbr_load_bool(fx.bridge, h2, &mut flag, ptr::null_mut()), 0);
    assert_eq!(flag, 1);

    assert_eq!(hbr_release(fx.bridge, h1, ptr::null_mut()), 0);
    let mut err: *mut hbr_error = ptr::null_mut();
    assert_eq!(hbr_load_number(fx.bridge, h1, &mut number, &mut err), -1);
    assert_eq!(take_error_kind(err), 3);

    let mut err: *mut hbr_error = ptr::null_mut();
    assert_eq!(hbr_release(fx.bridge, h1, &mut err), -1);
    assert_eq!(take_error_kind(err), 3);
}

#[test]
fn load_number_of_bool_is_usage_error() {
    let fx = Fixture::new();
    let mut handle = 0u64;
    assert_eq!(hbr_store_bool(fx.bridge, 0, &mut handle, ptr::null_mut()), 0);
    let mut number = 0.0f64;
    let mut err: *mut hbr_error = ptr::null_mut();
    assert_eq!(hbr_load_number(fx.bridge, handle, &mut number, &mut err), -1);
    assert_eq!(take_error_kind(err), 2);
}

#[test]
fn export_writes_wire_buffer_and_import_consumes_it() {
    let fx = Fixture::new();
    let units: Vec<u16> = "AB".encode_utf16().collect();
    let mut handle = 0u64;
    assert_eq!(
        hbr_store_utf16(fx.bridge, units.as_ptr(), units.len(), &mut handle, ptr::null_mut()),
        0
    );

    let mut heap_ptr = 0u32;
    assert_eq!(hbr_export_text(fx.bridge, handle, &mut heap_ptr, ptr::null_mut()), 0);
    assert_eq!(read_bytes(fx.bridge, heap_ptr, 8), vec![2, 0, 0, 0, b'A', 0, b'B', 0]);

    let mut imported = 0u64;
    assert_eq!(hbr_import_text(fx.bridge, heap_ptr, 2, &mut imported, ptr::null_mut()), 0);
    assert_ne!(imported, handle);

    let mut err: *mut hbr_error = ptr::null_mut();
    assert_eq!(hbr_heap_free(fx.bridge, heap_ptr, &mut err), -1);
    assert_eq!(take_error_kind(err), 2);
}

#[test]
fn embedder_allocated_buffer_is_imported() {
    let fx = Fixture::new();
    let bytes = [1u8, 0, 0, 0, 0x3D, 0xD8];
    let mut heap_ptr = 0u32;
    assert_eq!(hbr_heap_alloc(fx.bridge, 6, &mut heap_ptr, ptr::null_mut()), 0);
    assert_eq!(
        hbr_heap_write(fx.bridge, heap_ptr, bytes.as_ptr(), bytes.len(), ptr::null_mut()),
        0
    );

    let mut handle = 0u64;
    assert_eq!(hbr_import_text(fx.bridge, heap_ptr, 1, &mut handle, ptr::null_mut()), 0);

    let mut out_ptr = 0u32;
    assert_eq!(hbr_export_text(fx.bridge, handle, &mut out_ptr, ptr::null_mut()), 0);
    assert_eq!(read_bytes(fx.bridge, out_ptr, 6), bytes.to_vec());
    assert_eq!(hbr_heap_free(fx.bridge, out_ptr, ptr::null_mut()), 0);
}

#[test]
fn push_builds_lists() {
    let fx = Fixture::new();
    let mut list = 0u64;
    let mut elem = 0u64;
    assert_eq!(hbr_store_list(fx.bridge, &mut list, ptr::null_mut()), 0);
    assert_eq!(hbr_store_number(fx.bridge, 1.0, &mut elem, ptr::null_mut()), 0);
    assert_eq!(hbr_push(fx.bridge, list, elem, ptr::null_mut()), 0);

    let mut err: *mut hbr_error = ptr::null_mut();
    assert_eq!(hbr_push(fx.bridge, elem, list, &mut err), -1);
    assert_eq!(take_error_kind(err), 2);
}

#[test]
fn null_arguments_are_usage_errors() {
    let mut err: *mut hbr_error = ptr::null_mut();
    let mut handle = 0u64;
    assert_eq!(hbr_store_number(ptr::null_mut(), 1.0, &mut handle, &mut err), -1);
    assert_eq!(take_error_kind(err), 2);

    let fx = Fixture::new();
    let mut err: *mut hbr_error = ptr::null_mut();
    assert_eq!(hbr_store_utf16(fx.bridge, ptr::null(), 3, &mut handle, &mut err), -1);
    assert_eq!(take_error_kind(err), 2);

    assert_eq!(hbr_store_utf16(fx.bridge, ptr::null(), 0, &mut handle, ptr::null_mut()), 0);
    assert_eq!(hbr_release(fx.bridge, handle, ptr::null_mut()), 0);
}

#[test]
fn heap_write_accepts_null_bytes_only_when_empty() {
    let fx = Fixture::new();
    let mut heap_ptr = 0u32;
    assert_eq!(hbr_heap_alloc(fx.bridge, 4, &mut heap_ptr, ptr::null_mut()), 0);
    assert_eq!(hbr_heap_write(fx.bridge, heap_ptr, ptr::null(), 0, ptr::null_mut()), 0);
    assert_eq!(read_bytes(fx.bridge, heap_ptr, 4), vec![0, 0, 0, 0]);

    let mut err: *mut hbr_error = ptr::null_mut();
    assert_eq!(hbr_heap_write(fx.bridge, heap_ptr, ptr::null(), 4, &mut err), -1);
    assert_eq!(take_error_kind(err), 2);
    assert_eq!(hbr_heap_free(fx.bridge, heap_ptr, ptr::null_mut()), 0);
}

#[test]
fn free_helpers_accept_null() {
    hbr_bridge_free(ptr::null_mut());
    hbr_buf_free(ptr::null_mut());
    hbr_error_free(ptr::null_mut());
    assert_eq!(hbr_error_kind(ptr::null()), 0);
}
