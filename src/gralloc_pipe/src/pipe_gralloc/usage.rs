// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! usage: gralloc usage flags and the Gallium bind flags they imply.

use bitflags::bitflags;

bitflags! {
    /// Android gralloc usage bits, as stored in a gralloc handle.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct GrallocUsage: u32 {
        const SW_READ_RARELY = 0x0000_0002;
        const SW_READ_OFTEN = 0x0000_0003;
        const SW_READ_MASK = 0x0000_000f;
        const SW_WRITE_RARELY = 0x0000_0020;
        const SW_WRITE_OFTEN = 0x0000_0030;
        const SW_WRITE_MASK = 0x0000_00f0;
        const HW_TEXTURE = 0x0000_0100;
        const HW_RENDER = 0x0000_0200;
        const HW_2D = 0x0000_0400;
        const HW_COMPOSER = 0x0000_0800;
        const HW_FB = 0x0000_1000;
        const HW_VIDEO_ENCODER = 0x0001_0000;
        const HW_CAMERA_WRITE = 0x0002_0000;
        const HW_CAMERA_READ = 0x0004_0000;

        // Vendor and private bits pass through untouched.
        const _ = !0;
    }
}

bitflags! {
    /// Gallium `PIPE_BIND_*` flags.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PipeBind: u32 {
        const DEPTH_STENCIL = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const BLENDABLE = 1 << 2;
        const SAMPLER_VIEW = 1 << 3;
        const DISPLAY_TARGET = 1 << 12;
        const SCANOUT = 1 << 14;
        const SHARED = 1 << 15;
        const LINEAR = 1 << 16;
    }
}

bitflags! {
    /// Gallium `PIPE_TRANSFER_*` access flags.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TransferUsage: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

bitflags! {
    /// Gallium `PIPE_HANDLE_USAGE_*` flags, passed when importing or exporting a handle.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct HandleUsage: u32 {
        const EXPLICIT_FLUSH = 1 << 0;
        const FRAMEBUFFER_WRITE = 1 << 1;
        const SHADER_WRITE = 1 << 2;
        const READ_WRITE = Self::FRAMEBUFFER_WRITE.bits() | Self::SHADER_WRITE.bits();
    }
}

/// Returns the bind flags a resource needs to serve `usage`.  Every buffer is shareable.
pub fn pipe_bind(usage: GrallocUsage) -> PipeBind {
    let mut bind = PipeBind::SHARED;

    if usage.intersects(GrallocUsage::SW_READ_OFTEN | GrallocUsage::SW_WRITE_OFTEN) {
        bind |= PipeBind::LINEAR;
    }
    if usage.contains(GrallocUsage::HW_TEXTURE) {
        bind |= PipeBind::SAMPLER_VIEW;
    }
    if usage.contains(GrallocUsage::HW_RENDER) {
        bind |= PipeBind::RENDER_TARGET;
    }
    if usage.contains(GrallocUsage::HW_FB) {
        bind |= PipeBind::RENDER_TARGET | PipeBind::SCANOUT;
    }

    bind
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_BITS: [GrallocUsage; 10] = [
        GrallocUsage::SW_READ_RARELY,
        GrallocUsage::SW_READ_OFTEN,
        GrallocUsage::SW_WRITE_RARELY,
        GrallocUsage::SW_WRITE_OFTEN,
        GrallocUsage::HW_TEXTURE,
        GrallocUsage::HW_RENDER,
        GrallocUsage::HW_2D,
        GrallocUsage::HW_COMPOSER,
        GrallocUsage::HW_FB,
        GrallocUsage::HW_VIDEO_ENCODER,
    ];

    #[test]
    fn always_shared() {
        assert_eq!(pipe_bind(GrallocUsage::empty()), PipeBind::SHARED);
        assert_eq!(pipe_bind(GrallocUsage::HW_2D), PipeBind::SHARED);
    }

    #[test]
    fn usage_to_bind() {
        assert_eq!(
            pipe_bind(GrallocUsage::SW_WRITE_OFTEN),
            PipeBind::SHARED | PipeBind::LINEAR
        );
        assert_eq!(
            pipe_bind(GrallocUsage::HW_TEXTURE),
            PipeBind::SHARED | PipeBind::SAMPLER_VIEW
        );
        assert_eq!(
            pipe_bind(GrallocUsage::HW_RENDER),
            PipeBind::SHARED | PipeBind::RENDER_TARGET
        );
        assert_eq!(
            pipe_bind(GrallocUsage::HW_FB),
            PipeBind::SHARED | PipeBind::RENDER_TARGET | PipeBind::SCANOUT
        );
        assert_eq!(
            pipe_bind(GrallocUsage::HW_FB | GrallocUsage::HW_RENDER | GrallocUsage::HW_TEXTURE),
            PipeBind::SHARED
                | PipeBind::RENDER_TARGET
                | PipeBind::SCANOUT
                | PipeBind::SAMPLER_VIEW
        );
    }

    #[test]
    fn rarely_still_counts_as_cpu_access() {
        // SW_*_RARELY shares bits with SW_*_OFTEN.
        assert!(pipe_bind(GrallocUsage::SW_READ_RARELY).contains(PipeBind::LINEAR));
        assert!(pipe_bind(GrallocUsage::SW_WRITE_RARELY).contains(PipeBind::LINEAR));
    }

    #[test]
    fn bind_is_monotonic_in_usage() {
        // Every subset of the single bits, against every superset obtained by adding one bit.
        for mask in 0u32..(1 << SINGLE_BITS.len()) {
            let mut usage = GrallocUsage::empty();
            for (i, bit) in SINGLE_BITS.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    usage |= *bit;
                }
            }

            let bind = pipe_bind(usage);
            for bit in SINGLE_BITS {
                assert!(
                    pipe_bind(usage | bit).contains(bind),
                    "adding {:?} to {:?} dropped bind flags",
                    bit,
                    usage
                );
            }
        }
    }
}
