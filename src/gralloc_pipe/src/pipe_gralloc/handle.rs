// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! handle: The gralloc handle shared with the allocation framework, and the descriptors used to
//! talk about resources with the screen.

use crate::pipe_gralloc::formats::pipe_format;
use crate::pipe_gralloc::formats::HalPixelFormat;
use crate::pipe_gralloc::formats::PipeFormat;
use crate::pipe_gralloc::usage::pipe_bind;
use crate::pipe_gralloc::usage::GrallocUsage;
use crate::pipe_gralloc::usage::PipeBind;

/// The part of a drm_gralloc handle this driver reads and writes.
///
/// `name` is the backend shared name of the buffer, 0 until the buffer has been exported once.
/// `stride` is in bytes.  Both are written back by `alloc`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GrallocDrmHandle {
    pub width: u32,
    pub height: u32,
    pub format: HalPixelFormat,
    pub usage: GrallocUsage,
    pub name: u32,
    pub stride: u32,
}

impl GrallocDrmHandle {
    /// A handle for a buffer that has not been allocated yet.
    pub fn new(
        width: u32,
        height: u32,
        format: HalPixelFormat,
        usage: GrallocUsage,
    ) -> GrallocDrmHandle {
        GrallocDrmHandle {
            width,
            height,
            format,
            usage,
            name: 0,
            stride: 0,
        }
    }

    /// Returns true if the handle names an existing backend resource.
    pub fn is_shared(&self) -> bool {
        self.name != 0
    }

    /// Returns true if both handles describe buffers of the same layout.
    pub fn same_layout(&self, other: &GrallocDrmHandle) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.stride == other.stride
            && self.format == other.format
    }
}

/// Gallium `PIPE_TEXTURE_*` targets.  Only 2D textures are allocated here.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PipeTextureTarget {
    Buffer = 0,
    Texture1D = 1,
    Texture2D = 2,
}

/// Creation parameters of a pipe resource, mirroring Gallium's resource template.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResourceTemplate {
    pub target: PipeTextureTarget,
    pub format: PipeFormat,
    pub bind: PipeBind,
    pub width0: u32,
    pub height0: u32,
    pub depth0: u32,
    pub array_size: u16,
}

impl ResourceTemplate {
    /// The single-layer 2D texture template for a gralloc handle.
    pub fn for_handle(handle: &GrallocDrmHandle) -> ResourceTemplate {
        ResourceTemplate {
            target: PipeTextureTarget::Texture2D,
            format: pipe_format(handle.format),
            bind: pipe_bind(handle.usage),
            width0: handle.width,
            height0: handle.height,
            depth0: 1,
            array_size: 1,
        }
    }
}

/// Gallium `WINSYS_HANDLE_TYPE_*`.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WinsysHandleType {
    /// A flink-style global name, valid for every process opening the same device.
    Shared = 0,
    /// A KMS (GEM) handle, local to the device file descriptor, used for scanout.
    Kms = 1,
    /// A dma-buf file descriptor.
    Fd = 2,
}

/// An exportable/importable resource descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WinsysHandle {
    pub handle_type: WinsysHandleType,
    pub handle: u32,
    pub stride: u32,
}

impl WinsysHandle {
    pub fn shared(name: u32, stride: u32) -> WinsysHandle {
        WinsysHandle {
            handle_type: WinsysHandleType::Shared,
            handle: name,
            stride,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_from_handle() {
        let handle = GrallocDrmHandle::new(
            64,
            32,
            HalPixelFormat::RGB_565,
            GrallocUsage::HW_RENDER,
        );
        let templ = ResourceTemplate::for_handle(&handle);

        assert_eq!(templ.target, PipeTextureTarget::Texture2D);
        assert_eq!(templ.format, PipeFormat::B5G6R5Unorm);
        assert_eq!(templ.bind, PipeBind::SHARED | PipeBind::RENDER_TARGET);
        assert_eq!((templ.width0, templ.height0), (64, 32));
        assert_eq!((templ.depth0, templ.array_size), (1, 1));
    }

    #[test]
    fn layout_ignores_usage_and_name() {
        let mut a = GrallocDrmHandle::new(8, 8, HalPixelFormat::RGBA_8888, GrallocUsage::HW_FB);
        a.stride = 64;
        let mut b = a;
        b.usage = GrallocUsage::SW_READ_OFTEN;
        b.name = 3;
        assert!(a.same_layout(&b));

        b.stride = 32;
        assert!(!a.same_layout(&b));
    }
}
