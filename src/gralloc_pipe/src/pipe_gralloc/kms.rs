// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! kms: The mode-setting knobs a driver picks for the display subsystem.

use crate::pipe_gralloc::formats::HalPixelFormat;

/// How the display subsystem presents a new front buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DrmSwapMode {
    #[default]
    Noop,
    Flip,
    Copy,
    SetCrtc,
}

/// A display output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DrmOutput {
    /// Pixel format of the framebuffers scanned out on this output.
    pub fb_format: HalPixelFormat,
}

/// Display state owned by the mode-setting subsystem.  Drivers fill in their preferences once,
/// before the first buffer is presented.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GrallocDrm {
    pub primary: DrmOutput,
    pub swap_mode: DrmSwapMode,
    pub mode_quirk_vmwgfx: bool,
    pub mode_sync_flip: bool,
    pub swap_interval: u32,
    pub vblank_secondary: bool,
}

/// Default primary framebuffer format of pipe screens.
pub const PIPE_DEFAULT_FB_FORMAT: HalPixelFormat = HalPixelFormat::BGRA_8888;

/// Applies the display configuration of pipe screens to `drm`.
///
/// Only BGRA_8888 and RGB_565 are scanned out as requested, anything else falls back to
/// `PIPE_DEFAULT_FB_FORMAT`.
pub fn pipe_kms_features(drm: &mut GrallocDrm) {
    match drm.primary.fb_format {
        HalPixelFormat::BGRA_8888 | HalPixelFormat::RGB_565 => (),
        _ => drm.primary.fb_format = PIPE_DEFAULT_FB_FORMAT,
    }

    drm.mode_quirk_vmwgfx = false;
    drm.swap_mode = DrmSwapMode::Flip;
    drm.mode_sync_flip = true;
    drm.swap_interval = 1;
    drm.vblank_secondary = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drm_with(fb_format: HalPixelFormat) -> GrallocDrm {
        GrallocDrm {
            primary: DrmOutput { fb_format },
            swap_mode: DrmSwapMode::Copy,
            mode_quirk_vmwgfx: true,
            mode_sync_flip: false,
            swap_interval: 0,
            vblank_secondary: true,
        }
    }

    #[test]
    fn whitelisted_formats_pass_through() {
        for format in [HalPixelFormat::BGRA_8888, HalPixelFormat::RGB_565] {
            let mut drm = drm_with(format);
            pipe_kms_features(&mut drm);
            assert_eq!(drm.primary.fb_format, format);
        }
    }

    #[test]
    fn other_formats_are_overridden() {
        for format in [
            HalPixelFormat::RGBA_8888,
            HalPixelFormat::RGBX_8888,
            HalPixelFormat::RGB_888,
            HalPixelFormat::YV12,
            HalPixelFormat(0),
        ] {
            let mut drm = drm_with(format);
            pipe_kms_features(&mut drm);
            assert_eq!(drm.primary.fb_format, PIPE_DEFAULT_FB_FORMAT);
        }
    }

    #[test]
    fn swap_settings_are_fixed() {
        for format in [HalPixelFormat::RGB_565, HalPixelFormat::RGB_888] {
            let mut drm = drm_with(format);
            pipe_kms_features(&mut drm);
            assert_eq!(drm.swap_mode, DrmSwapMode::Flip);
            assert!(!drm.mode_quirk_vmwgfx);
            assert!(drm.mode_sync_flip);
            assert_eq!(drm.swap_interval, 1);
            assert!(!drm.vblank_secondary);
        }
    }
}
