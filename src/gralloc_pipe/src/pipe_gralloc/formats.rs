// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! formats: Translation from Android HAL pixel formats to Gallium pipe formats.

use std::fmt;

/// An Android HAL pixel format, as stored in a gralloc handle.
#[derive(Copy, Clone, Eq, PartialEq, Default, Hash)]
pub struct HalPixelFormat(pub i32);

impl HalPixelFormat {
    pub const RGBA_8888: HalPixelFormat = HalPixelFormat(1);
    pub const RGBX_8888: HalPixelFormat = HalPixelFormat(2);
    pub const RGB_888: HalPixelFormat = HalPixelFormat(3);
    pub const RGB_565: HalPixelFormat = HalPixelFormat(4);
    pub const BGRA_8888: HalPixelFormat = HalPixelFormat(5);
    pub const YCBCR_422_SP: HalPixelFormat = HalPixelFormat(0x10);
    pub const YCRCB_420_SP: HalPixelFormat = HalPixelFormat(0x11);
    /// drm_gralloc private NV12 format.
    pub const DRM_NV12: HalPixelFormat = HalPixelFormat(0x102);
    /// 'YV12'
    pub const YV12: HalPixelFormat = HalPixelFormat(0x3231_5659);
}

impl fmt::Debug for HalPixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            HalPixelFormat::RGBA_8888 => "RGBA_8888",
            HalPixelFormat::RGBX_8888 => "RGBX_8888",
            HalPixelFormat::RGB_888 => "RGB_888",
            HalPixelFormat::RGB_565 => "RGB_565",
            HalPixelFormat::BGRA_8888 => "BGRA_8888",
            HalPixelFormat::YCBCR_422_SP => "YCbCr_422_SP",
            HalPixelFormat::YCRCB_420_SP => "YCrCb_420_SP",
            HalPixelFormat::DRM_NV12 => "DRM_NV12",
            HalPixelFormat::YV12 => "YV12",
            _ => return write!(f, "HalPixelFormat({:#x})", self.0),
        };

        write!(f, "{}", name)
    }
}

/// The subset of Gallium's `enum pipe_format` this driver allocates.  The discriminants are local
/// to this crate; backends translate them to their own format enumeration.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PipeFormat {
    None = 0,
    B8G8R8A8Unorm = 1,
    B5G6R5Unorm = 7,
    R8G8B8Unorm = 66,
    R8G8B8A8Unorm = 67,
    R8G8B8X8Unorm = 134,
}

impl PipeFormat {
    /// Size of one pixel in bytes, or 0 for `PipeFormat::None`.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PipeFormat::None => 0,
            PipeFormat::B5G6R5Unorm => 2,
            PipeFormat::R8G8B8Unorm => 3,
            PipeFormat::B8G8R8A8Unorm | PipeFormat::R8G8B8A8Unorm | PipeFormat::R8G8B8X8Unorm => 4,
        }
    }
}

/// Returns the pipe format backing `format`.  Planar YUV layouts and unknown formats have no
/// pipe equivalent and yield `PipeFormat::None`.
pub fn pipe_format(format: HalPixelFormat) -> PipeFormat {
    match format {
        HalPixelFormat::RGBA_8888 => PipeFormat::R8G8B8A8Unorm,
        HalPixelFormat::RGBX_8888 => PipeFormat::R8G8B8X8Unorm,
        HalPixelFormat::RGB_888 => PipeFormat::R8G8B8Unorm,
        HalPixelFormat::RGB_565 => PipeFormat::B5G6R5Unorm,
        HalPixelFormat::BGRA_8888 => PipeFormat::B8G8R8A8Unorm,
        HalPixelFormat::YV12
        | HalPixelFormat::DRM_NV12
        | HalPixelFormat::YCBCR_422_SP
        | HalPixelFormat::YCRCB_420_SP => PipeFormat::None,
        _ => PipeFormat::None,
    }
}
