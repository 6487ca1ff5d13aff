// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A drm_gralloc driver that allocates, shares, maps and copies graphics buffers through a
//! Gallium pipe screen, either loaded from the device's DRI library or provided in-process.

pub mod dri;
#[macro_use]
mod macros;
mod pipe_gralloc;
mod pipe_os;
mod pipe_utils;
pub mod soft;

#[cfg(gallium)]
pub use crate::dri::create_for_pipe;
pub use crate::dri::DriLoader;
pub use crate::pipe_gralloc::*;
pub use crate::pipe_os::MemoryMapping;
pub use crate::pipe_os::SharedMemory;
pub use crate::pipe_utils::*;
pub use crate::soft::SoftLoader;
