// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! screen: The capability interface of a rendering backend, modelled on Gallium's
//! `pipe_screen`/`pipe_context`.

use crate::pipe_gralloc::formats::PipeFormat;
use crate::pipe_gralloc::handle::PipeTextureTarget;
use crate::pipe_gralloc::handle::ResourceTemplate;
use crate::pipe_gralloc::handle::WinsysHandle;
use crate::pipe_gralloc::handle::WinsysHandleType;
use crate::pipe_gralloc::usage::HandleUsage;
use crate::pipe_gralloc::usage::PipeBind;
use crate::pipe_gralloc::usage::TransferUsage;
use crate::pipe_utils::PipeBox;
use crate::pipe_utils::PipeResult;

/// A backend image.  Dropping the value releases the reference it holds.
pub trait PipeResource: Send {
    /// The template the resource was created or imported with.
    fn template(&self) -> &ResourceTemplate;
}

/// A CPU mapping of (part of) a resource, live until handed back to `transfer_unmap`.
pub trait PipeTransfer: Send {
    /// Address of the first mapped byte.
    fn ptr(&self) -> *mut u8;

    /// Distance in bytes between two rows of the mapping.
    fn stride(&self) -> u32;

    /// Number of mapped bytes starting at `ptr`.
    fn size(&self) -> usize;
}

/// A rendering context.  Needed for transfers and copies, not for allocation.
pub trait PipeContext: Send {
    type Resource: PipeResource;
    type Transfer: PipeTransfer;

    /// Maps the region `bx` of `resource` for CPU access.
    fn transfer_map(
        &mut self,
        resource: &Self::Resource,
        usage: TransferUsage,
        bx: &PipeBox,
    ) -> PipeResult<Self::Transfer>;

    fn transfer_unmap(&mut self, transfer: Self::Transfer);

    /// Copies `src_box` of `src` into `dst` at (`dst_x`, `dst_y`).  Both resources must have the
    /// same format.
    fn resource_copy_region(
        &mut self,
        dst: &Self::Resource,
        dst_x: u32,
        dst_y: u32,
        src: &Self::Resource,
        src_box: &PipeBox,
    ) -> PipeResult<()>;

    /// Submits queued work so that it becomes visible to other users of the resources.
    fn flush(&mut self);
}

/// A device: capability queries plus resource factory.  Dropping the screen destroys it.
///
/// Implementations must return true from `is_format_supported` only for combinations they can
/// create, import and map.
pub trait PipeScreen: Send {
    type Resource: PipeResource;
    type Context: PipeContext<Resource = Self::Resource>;

    fn is_format_supported(
        &self,
        format: PipeFormat,
        target: PipeTextureTarget,
        sample_count: u32,
        bind: PipeBind,
    ) -> bool;

    fn resource_create(&self, templ: &ResourceTemplate) -> PipeResult<Self::Resource>;

    /// Wraps the resource described by `handle` into a new resource of layout `templ`.
    fn resource_from_handle(
        &self,
        templ: &ResourceTemplate,
        handle: &WinsysHandle,
        usage: HandleUsage,
    ) -> PipeResult<Self::Resource>;

    /// Exports a handle of `handle_type` for `resource`.
    fn resource_get_handle(
        &self,
        context: Option<&mut Self::Context>,
        resource: &Self::Resource,
        handle_type: WinsysHandleType,
        usage: HandleUsage,
    ) -> PipeResult<WinsysHandle>;

    fn context_create(&self) -> PipeResult<Self::Context>;
}

/// Produces the screen of a device.  Invoked once, when a manager is created.
pub trait ScreenLoader {
    type Screen: PipeScreen;

    /// Returns a screen bound to the device file descriptor `fd`.  `name` identifies the device
    /// in log messages.
    fn load_screen(&self, fd: i32, name: &str) -> PipeResult<Self::Screen>;
}
