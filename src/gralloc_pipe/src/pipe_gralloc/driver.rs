// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::pipe_gralloc::handle::GrallocDrmHandle;
use crate::pipe_gralloc::kms::GrallocDrm;
use crate::pipe_utils::PipeMapping;
use crate::pipe_utils::PipeRect;
use crate::pipe_utils::PipeResult;

/// The operations a drm_gralloc driver provides to the allocation framework.
///
/// Allocation and mapping failures are returned to the caller, who owns any retry policy.
/// `blit` has no result: an impossible copy is logged and dropped.
pub trait GrallocDrmDriver {
    /// The driver's buffer object.
    type Bo;

    /// Tears the driver down.  Every buffer must have been freed.
    fn destroy(self)
    where
        Self: Sized;

    /// Sets the driver's preferences on the display subsystem state.
    fn init_kms_features(&self, drm: &mut GrallocDrm);

    /// Allocates the buffer described by `handle`, or imports it when `handle.name` is set.
    /// Updates `handle.name` and `handle.stride` on success.
    fn alloc(&self, handle: &mut GrallocDrmHandle) -> PipeResult<Self::Bo>;

    fn free(&self, bo: Self::Bo);

    /// Maps the whole buffer for CPU access.  The rectangle is accepted for compatibility only,
    /// the mapping always starts at the first byte of the buffer.
    fn map(
        &self,
        bo: &mut Self::Bo,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        enable_write: bool,
    ) -> PipeResult<PipeMapping>;

    fn unmap(&self, bo: &mut Self::Bo);

    /// Copies `src_rect` of `src` to the origin of `dst_rect` in `dst`.
    fn blit(&self, dst: &Self::Bo, src: &Self::Bo, dst_rect: PipeRect, src_rect: PipeRect);
}
