// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::pipe_gralloc::handle::GrallocDrmHandle;
use crate::pipe_gralloc::handle::WinsysHandle;
use crate::pipe_gralloc::screen::PipeContext;
use crate::pipe_gralloc::screen::PipeScreen;

/// A buffer allocated by a `PipeManager`.
///
/// All state changes go through the manager that allocated the buffer, under its lock.  Handing
/// the buffer back to `free` releases an outstanding transfer before the resource.
pub struct PipeBuffer<S: PipeScreen> {
    // Declared before `resource` so that a transfer never outlives its resource.
    pub(crate) transfer: Option<<S::Context as PipeContext>::Transfer>,
    pub(crate) resource: S::Resource,
    pub(crate) winsys: WinsysHandle,
    pub(crate) fb_handle: Option<u32>,
    pub(crate) handle: GrallocDrmHandle,
}

impl<S: PipeScreen> PipeBuffer<S> {
    pub(crate) fn new(
        handle: GrallocDrmHandle,
        resource: S::Resource,
        winsys: WinsysHandle,
        fb_handle: Option<u32>,
    ) -> PipeBuffer<S> {
        PipeBuffer {
            transfer: None,
            resource,
            winsys,
            fb_handle,
            handle,
        }
    }

    /// The gralloc handle as it was after allocation, with name and stride filled in.
    pub fn handle(&self) -> &GrallocDrmHandle {
        &self.handle
    }

    /// The shared descriptor used to import the buffer elsewhere.
    pub fn winsys_handle(&self) -> &WinsysHandle {
        &self.winsys
    }

    /// KMS handle of the buffer, present for framebuffer allocations only.
    pub fn fb_handle(&self) -> Option<u32> {
        self.fb_handle
    }

    /// Returns true between `map` and `unmap`.
    pub fn is_mapped(&self) -> bool {
        self.transfer.is_some()
    }

    pub fn resource(&self) -> &S::Resource {
        &self.resource
    }
}
