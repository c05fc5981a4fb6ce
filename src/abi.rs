//! Purpose: C ABI bridge for embedders (libheapbridge).
//! Exports: C-callable bridge, handle, and heap buffer functions plus buffer/error helpers.
//! Role: Stable ABI surface for hosts that are not written in Rust.
//! Invariants: Opaque bridge pointer; handles cross as `u64` bits; explicit free functions.
//! Invariants: Return 0 on success, -1 on failure with details in `out_err` when non-null.
//! Invariants: Error kind codes match `api::to_exit_code`.
#![allow(non_camel_case_types)]
#![allow(clippy::result_large_err)]

use crate::api::{
    Bridge, BridgeConfig, DEFAULT_MEMORY_LIMIT, Error, ErrorKind, Handle, HostValue,
    LinearMemory, Utf16Text, to_exit_code,
};
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

#[repr(C)]
pub struct hbr_bridge {
    bridge: Bridge,
}

#[repr(C)]
pub struct hbr_buf {
    data: *mut u8,
    len: usize,
}

impl hbr_buf {
    pub fn empty() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }
}

#[repr(C)]
pub struct hbr_error {
    kind: i32,
    message: *mut c_char,
    handle: u64,
    ptr: u32,
    has_handle: u8,
    has_ptr: u8,
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_bridge_new(
    memory_limit: u32,
    out_bridge: *mut *mut hbr_bridge,
    out_err: *mut *mut hbr_error,
) -> i32 {
    if out_bridge.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_bridge is null"),
        );
    }
    let limit = if memory_limit == 0 {
        DEFAULT_MEMORY_LIMIT
    } else {
        memory_limit
    };
    let config = BridgeConfig::new().with_memory_limit(limit);
    let handle = Box::new(hbr_bridge {
        bridge: Bridge::with_config(&config),
    });
    unsafe {
        *out_bridge = Box::into_raw(handle);
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_bridge_free(bridge: *mut hbr_bridge) {
    if bridge.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(bridge));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_store_number(
    bridge: *mut hbr_bridge,
    value: f64,
    out_handle: *mut u64,
    out_err: *mut *mut hbr_error,
) -> i32 {
    store_value(bridge, HostValue::Number(value), out_handle, out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_store_bool(
    bridge: *mut hbr_bridge,
    value: u8,
    out_handle: *mut u64,
    out_err: *mut *mut hbr_error,
) -> i32 {
    store_value(bridge, HostValue::Bool(value != 0), out_handle, out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_store_list(
    bridge: *mut hbr_bridge,
    out_handle: *mut u64,
    out_err: *mut *mut hbr_error,
) -> i32 {
    store_value(bridge, HostValue::List(Vec::new()), out_handle, out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_store_utf16(
    bridge: *mut hbr_bridge,
    units: *const u16,
    len: usize,
    out_handle: *mut u64,
    out_err: *mut *mut hbr_error,
) -> i32 {
    if units.is_null() && len != 0 {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("units is null"),
        );
    }
    let text = if len == 0 {
        Utf16Text::default()
    } else {
        let slice = unsafe { std::slice::from_raw_parts(units, len) };
        Utf16Text::from_units(slice)
    };
    store_value(bridge, HostValue::Text(text), out_handle, out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_load_number(
    bridge: *mut hbr_bridge,
    handle: u64,
    out_value: *mut f64,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    if out_value.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_value is null"),
        );
    }
    let value = match bridge
        .bridge
        .load(Handle::from_bits(handle))
        .and_then(f64::try_from)
    {
        Ok(value) => value,
        Err(err) => return fail(out_err, err),
    };
    unsafe {
        *out_value = value;
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_load_bool(
    bridge: *mut hbr_bridge,
    handle: u64,
    out_value: *mut u8,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    if out_value.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_value is null"),
        );
    }
    let value = match bridge
        .bridge
        .load(Handle::from_bits(handle))
        .and_then(bool::try_from)
    {
        Ok(value) => value,
        Err(err) => return fail(out_err, err),
    };
    unsafe {
        *out_value = u8::from(value);
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_release(
    bridge: *mut hbr_bridge,
    handle: u64,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    match bridge.bridge.release(Handle::from_bits(handle)) {
        Ok(_) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_push(
    bridge: *mut hbr_bridge,
    list: u64,
    elem: u64,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    match bridge
        .bridge
        .push(Handle::from_bits(list), Handle::from_bits(elem))
    {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_export_text(
    bridge: *mut hbr_bridge,
    handle: u64,
    out_ptr: *mut u32,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    if out_ptr.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_ptr is null"),
        );
    }
    let ptr = match bridge.bridge.export_text(Handle::from_bits(handle)) {
        Ok(ptr) => ptr,
        Err(err) => return fail(out_err, err),
    };
    unsafe {
        *out_ptr = ptr;
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_import_text(
    bridge: *mut hbr_bridge,
    ptr: u32,
    count: u32,
    out_handle: *mut u64,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    if out_handle.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_handle is null"),
        );
    }
    let handle = match bridge.bridge.import_text(ptr, count) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    unsafe {
        *out_handle = handle.to_bits();
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_heap_alloc(
    bridge: *mut hbr_bridge,
    size: u32,
    out_ptr: *mut u32,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    if out_ptr.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_ptr is null"),
        );
    }
    let ptr = match bridge.bridge.allocate(size) {
        Ok(ptr) => ptr,
        Err(err) => return fail(out_err, err),
    };
    unsafe {
        *out_ptr = ptr;
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_heap_free(
    bridge: *mut hbr_bridge,
    ptr: u32,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    match bridge.bridge.free(ptr) {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_heap_write(
    bridge: *mut hbr_bridge,
    ptr: u32,
    bytes: *const u8,
    len: usize,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    if bytes.is_null() && len != 0 {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("bytes is null"),
        );
    }
    let slice: &[u8] = if len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(bytes, len) }
    };
    match bridge.bridge.memory_mut().write_bytes(ptr, slice) {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_heap_read(
    bridge: *mut hbr_bridge,
    ptr: u32,
    len: u32,
    out_buf: *mut hbr_buf,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    let bytes = match bridge.bridge.memory().read_bytes(ptr, len) {
        Ok(bytes) => bytes.to_vec(),
        Err(err) => return fail(out_err, err),
    };
    if let Err(err) = write_buf(out_buf, bytes) {
        return fail(out_err, err);
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_buf_free(buf: *mut hbr_buf) {
    if buf.is_null() {
        return;
    }
    unsafe {
        let buf = &mut *buf;
        if !buf.data.is_null() && buf.len != 0 {
            drop(Vec::from_raw_parts(buf.data, buf.len, buf.len));
        }
        buf.data = ptr::null_mut();
        buf.len = 0;
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hbr_error_free(err: *mut hbr_error) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        if !err.message.is_null() {
            drop(CString::from_raw(err.message));
        }
    }
}

/// Kind code carried by an `hbr_error`.
#[unsafe(no_mangle)]
pub extern "C" fn hbr_error_kind(err: *const hbr_error) -> i32 {
    if err.is_null() {
        return 0;
    }
    unsafe { (*err).kind }
}

fn store_value(
    bridge: *mut hbr_bridge,
    value: HostValue,
    out_handle: *mut u64,
    out_err: *mut *mut hbr_error,
) -> i32 {
    let bridge = match borrow_bridge(bridge, out_err) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };
    if out_handle.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_handle is null"),
        );
    }
    let handle = match bridge.bridge.store(value) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    unsafe {
        *out_handle = handle.to_bits();
    }
    0
}

fn borrow_bridge<'a>(
    bridge: *mut hbr_bridge,
    out_err: *mut *mut hbr_error,
) -> Result<&'a mut hbr_bridge, i32> {
    if bridge.is_null() {
        return Err(fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("bridge is null"),
        ));
    }
    unsafe { Ok(&mut *bridge) }
}

fn write_buf(out_buf: *mut hbr_buf, bytes: Vec<u8>) -> Result<(), Error> {
    if out_buf.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message("out_buf is null"));
    }
    unsafe {
        let buf = &mut *out_buf;
        let mut data = bytes.into_boxed_slice();
        buf.len = data.len();
        buf.data = if data.is_empty() {
            ptr::null_mut()
        } else {
            data.as_mut_ptr()
        };
        std::mem::forget(data);
    }
    Ok(())
}

fn fail(out_err: *mut *mut hbr_error, err: Error) -> i32 {
    tracing::debug!(error = %err, "abi call failed");
    if out_err.is_null() {
        return -1;
    }
    let error = Box::new(hbr_error {
        kind: to_exit_code(err.kind()),
        message: to_c_string(&crate::report_json::error_message(&err)),
        handle: err.handle().unwrap_or(0),
        ptr: err.ptr().unwrap_or(0),
        has_handle: u8::from(err.handle().is_some()),
        has_ptr: u8::from(err.ptr().is_some()),
    });
    unsafe {
        *out_err = Box::into_raw(error);
    }
    -1
}

fn to_c_string(input: &str) -> *mut c_char {
    CString::new(input)
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}
