// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! pipe_gralloc: A drm_gralloc driver allocating buffers through a pipe screen.

mod buffer;
mod driver;
mod formats;
mod handle;
mod kms;
mod manager;
mod screen;
mod usage;

pub use buffer::PipeBuffer;
pub use driver::GrallocDrmDriver;
pub use formats::pipe_format;
pub use formats::HalPixelFormat;
pub use formats::PipeFormat;
pub use handle::GrallocDrmHandle;
pub use handle::PipeTextureTarget;
pub use handle::ResourceTemplate;
pub use handle::WinsysHandle;
pub use handle::WinsysHandleType;
pub use kms::pipe_kms_features;
pub use kms::DrmOutput;
pub use kms::DrmSwapMode;
pub use kms::GrallocDrm;
pub use kms::PIPE_DEFAULT_FB_FORMAT;
pub use manager::PipeManager;
pub use screen::PipeContext;
pub use screen::PipeResource;
pub use screen::PipeScreen;
pub use screen::PipeTransfer;
pub use screen::ScreenLoader;
pub use usage::pipe_bind;
pub use usage::GrallocUsage;
pub use usage::HandleUsage;
pub use usage::PipeBind;
pub use usage::TransferUsage;
