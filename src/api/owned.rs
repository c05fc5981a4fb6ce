//! Purpose: Scoped ownership of one handle-table slot.
//! Exports: `OwnedHandle`.
//! Role: Host-side counterpart of `HeapBuffer`; dropping the guard releases its handle.
//! Invariants: An armed guard releases exactly once; `into_handle` and `release` disarm it.
#![allow(clippy::result_large_err)]

use crate::core::handle::Handle;
use crate::core::memory::{ArenaMemory, LinearMemory};
use crate::core::value::HostValue;

use super::bridge::{ApiResult, Bridge};

/// A live handle that is released when the guard goes out of scope.
///
/// The guard borrows its [`Bridge`] mutably; reach the bridge through
/// [`OwnedHandle::bridge_mut`] while it is held.
pub struct OwnedHandle<'b, M: LinearMemory = ArenaMemory> {
    bridge: &'b mut Bridge<M>,
    handle: Handle,
    armed: bool,
}

impl<'b, M: LinearMemory> OwnedHandle<'b, M> {
    /// Takes ownership of an already issued handle.
    pub fn adopt(bridge: &'b mut Bridge<M>, handle: Handle) -> Self {
        Self {
            bridge,
            handle,
            armed: true,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn value(&self) -> ApiResult<&HostValue> {
        self.bridge.load(self.handle)
    }

    pub fn bridge(&self) -> &Bridge<M> {
        &*self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut Bridge<M> {
        &mut *self.bridge
    }

    /// Hands the handle out; the caller must release it.
    pub fn into_handle(mut self) -> Handle {
        self.armed = false;
        self.handle
    }

    /// Releases now and returns the value, reporting errors that `Drop` would only log.
    pub fn release(mut self) -> ApiResult<HostValue> {
        self.armed = false;
        self.bridge.release(self.handle)
    }
}

impl<M: LinearMemory> Drop for OwnedHandle<'_, M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.bridge.release(self.handle) {
            tracing::warn!(
                handle = self.handle.to_bits(),
                error = %err,
                "failed to release owned handle"
            );
        }
    }
}
