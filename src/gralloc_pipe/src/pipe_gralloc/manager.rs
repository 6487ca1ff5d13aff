// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! manager: A drm_gralloc driver on top of a pipe screen.

use std::cmp::min;
use std::sync::Mutex;
use std::sync::MutexGuard;

use log::debug;
use log::error;

use crate::pipe_gralloc::buffer::PipeBuffer;
use crate::pipe_gralloc::driver::GrallocDrmDriver;
use crate::pipe_gralloc::formats::PipeFormat;
use crate::pipe_gralloc::handle::GrallocDrmHandle;
use crate::pipe_gralloc::handle::ResourceTemplate;
use crate::pipe_gralloc::handle::WinsysHandle;
use crate::pipe_gralloc::handle::WinsysHandleType;
use crate::pipe_gralloc::kms::pipe_kms_features;
use crate::pipe_gralloc::kms::GrallocDrm;
use crate::pipe_gralloc::screen::PipeContext;
use crate::pipe_gralloc::screen::PipeResource;
use crate::pipe_gralloc::screen::PipeScreen;
use crate::pipe_gralloc::screen::PipeTransfer;
use crate::pipe_gralloc::screen::ScreenLoader;
use crate::pipe_gralloc::usage::GrallocUsage;
use crate::pipe_gralloc::usage::HandleUsage;
use crate::pipe_gralloc::usage::TransferUsage;
use crate::pipe_utils::*;

/// Everything the manager-wide lock protects.  The context is declared first so that it is
/// dropped before the screen that created it.
struct PipeState<S: PipeScreen> {
    context: Option<S::Context>,
    screen: S,
}

impl<S: PipeScreen> PipeState<S> {
    /// Returns the rendering context, creating it on first use.  A failed creation leaves no
    /// context behind, so the next caller tries again.
    fn context(&mut self) -> PipeResult<&mut S::Context> {
        if self.context.is_none() {
            let context = self.screen.context_create().map_err(|e| {
                error!("failed to create pipe context: {}", e);
                PipeError::ContextCreation
            })?;

            debug!("created pipe context");
            self.context = Some(context);
        }

        self.context.as_mut().ok_or(PipeError::ContextCreation)
    }

    fn alloc(&mut self, handle: &GrallocDrmHandle) -> PipeResult<PipeBuffer<S>> {
        let templ = ResourceTemplate::for_handle(handle);

        if templ.format == PipeFormat::None
            || !self
                .screen
                .is_format_supported(templ.format, templ.target, 0, templ.bind)
        {
            error!("unsupported format {:?}", handle.format);
            return Err(PipeError::UnsupportedFormat(handle.format.0));
        }

        let PipeState { context, screen } = self;

        // On any error below, the resource built so far is released when it goes out of scope.
        let (resource, winsys) = if handle.is_shared() {
            let winsys = WinsysHandle::shared(handle.name, handle.stride);
            let resource = screen
                .resource_from_handle(&templ, &winsys, HandleUsage::READ_WRITE)
                .map_err(|e| {
                    error!("failed to import buffer {}: {}", handle.name, e);
                    PipeError::ResourceImport(handle.name)
                })?;

            (resource, winsys)
        } else {
            let resource = screen.resource_create(&templ).map_err(|e| {
                error!(
                    "failed to create {}x{} {:?} buffer: {}",
                    handle.width, handle.height, handle.format, e
                );
                PipeError::ResourceCreation
            })?;

            let winsys = screen
                .resource_get_handle(
                    context.as_mut(),
                    &resource,
                    WinsysHandleType::Shared,
                    HandleUsage::READ_WRITE,
                )
                .map_err(|e| {
                    error!("failed to export buffer: {}", e);
                    PipeError::ResourceExport(WinsysHandleType::Shared)
                })?;

            (resource, winsys)
        };

        // The display engine needs the KMS handle of framebuffers.
        let fb_handle = if handle.usage.contains(GrallocUsage::HW_FB) {
            let kms = screen
                .resource_get_handle(
                    context.as_mut(),
                    &resource,
                    WinsysHandleType::Kms,
                    HandleUsage::READ_WRITE,
                )
                .map_err(|e| {
                    error!("failed to get the KMS handle of a framebuffer: {}", e);
                    PipeError::ResourceExport(WinsysHandleType::Kms)
                })?;

            Some(kms.handle)
        } else {
            None
        };

        let mut buffer_handle = *handle;
        buffer_handle.name = winsys.handle;
        buffer_handle.stride = winsys.stride;

        Ok(PipeBuffer::new(buffer_handle, resource, winsys, fb_handle))
    }
}

/// A drm_gralloc driver backed by a pipe screen.
///
/// A single mutex serializes every operation that touches the screen, the lazily created
/// context, or the transfer of a buffer.  Callers must not overlap a map/unmap bracket on a
/// buffer with a blit involving the same buffer.
pub struct PipeManager<S: PipeScreen> {
    fd: i32,
    name: String,
    state: Mutex<PipeState<S>>,
}

impl<S: PipeScreen> PipeManager<S> {
    /// Creates a manager for the device `fd`, using `loader` to obtain its screen.
    pub fn create<L>(loader: &L, fd: i32, name: &str) -> PipeResult<PipeManager<S>>
    where
        L: ScreenLoader<Screen = S>,
    {
        let screen = loader.load_screen(fd, name).map_err(|e| {
            error!("failed to load pipe screen for {}: {}", name, e);
            e
        })?;

        debug!("loaded pipe screen for {} (fd {})", name, fd);
        Ok(PipeManager::from_screen(screen, fd, name))
    }

    /// Creates a manager around an already loaded screen.
    pub fn from_screen(screen: S, fd: i32, name: &str) -> PipeManager<S> {
        PipeManager {
            fd,
            name: name.to_string(),
            state: Mutex::new(PipeState {
                context: None,
                screen,
            }),
        }
    }

    /// The device file descriptor the screen is bound to.
    pub fn fd(&self) -> i32 {
        self.fd
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<PipeState<S>> {
        match self.state.lock() {
            Ok(guard) => guard,
            // A panicking contract check leaves the state consistent, keep going.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<S: PipeScreen> GrallocDrmDriver for PipeManager<S> {
    type Bo = PipeBuffer<S>;

    fn destroy(self) {
        let state = match self.state.into_inner() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Context first, then the screen, which unloads the backend library last.
        let PipeState { context, screen } = state;
        drop(context);
        drop(screen);

        debug!("destroyed pipe manager for {}", self.name);
    }

    fn init_kms_features(&self, drm: &mut GrallocDrm) {
        pipe_kms_features(drm);
    }

    fn alloc(&self, handle: &mut GrallocDrmHandle) -> PipeResult<PipeBuffer<S>> {
        let buffer = self.lock().alloc(handle)?;

        handle.name = buffer.winsys.handle;
        handle.stride = buffer.winsys.stride;

        Ok(buffer)
    }

    fn free(&self, mut bo: PipeBuffer<S>) {
        let mut state = self.lock();

        if let Some(transfer) = bo.transfer.take() {
            if let Some(context) = state.context.as_mut() {
                context.transfer_unmap(transfer);
            }
        }

        // Release the resource while still holding the lock.
        drop(bo);
    }

    fn map(
        &self,
        bo: &mut PipeBuffer<S>,
        _x: i32,
        _y: i32,
        _w: i32,
        _h: i32,
        enable_write: bool,
    ) -> PipeResult<PipeMapping> {
        let mut state = self.lock();
        let context = state.context()?;

        let usage = if enable_write {
            TransferUsage::READ_WRITE
        } else {
            TransferUsage::READ
        };

        assert!(bo.transfer.is_none(), "buffer is already mapped");

        // Map everything so that the returned address is the start of the buffer.
        let templ = bo.resource.template();
        let bx = PipeBox::new_2d(0, 0, templ.width0, templ.height0);

        let transfer = context
            .transfer_map(&bo.resource, usage, &bx)
            .map_err(|e| {
                error!("failed to map buffer: {}", e);
                PipeError::MappingFailed
            })?;

        let mapping = PipeMapping {
            ptr: transfer.ptr() as u64,
            size: transfer.size() as u64,
        };

        bo.transfer = Some(transfer);
        Ok(mapping)
    }

    fn unmap(&self, bo: &mut PipeBuffer<S>) {
        let mut state = self.lock();

        let Some(transfer) = bo.transfer.take() else {
            panic!("unmap of a buffer that is not mapped");
        };

        // A transfer only exists if the context does.
        if let Some(context) = state.context.as_mut() {
            context.transfer_unmap(transfer);

            // Make CPU writes visible to the next user of the buffer.
            context.flush();
        }
    }

    fn blit(
        &self,
        dst: &PipeBuffer<S>,
        src: &PipeBuffer<S>,
        dst_rect: PipeRect,
        src_rect: PipeRect,
    ) {
        if !dst.handle.same_layout(&src.handle) {
            error!("copy between incompatible buffers");
            return;
        }

        if src_rect.is_empty() {
            return;
        }

        // The source rectangle is copied whole, clamped only to the destination bounds.
        let dst_x = dst_rect.x1 as u32;
        let dst_y = dst_rect.y1 as u32;
        let width = min(src_rect.width(), dst.handle.width.saturating_sub(dst_x));
        let height = min(src_rect.height(), dst.handle.height.saturating_sub(dst_y));
        if width == 0 || height == 0 {
            return;
        }

        let src_box = PipeBox::new_2d(src_rect.x1 as u32, src_rect.y1 as u32, width, height);

        let mut state = self.lock();
        let context = match state.context() {
            Ok(context) => context,
            // Already logged.
            Err(_) => return,
        };

        if let Err(e) = context.resource_copy_region(
            &dst.resource,
            dst_x,
            dst_y,
            &src.resource,
            &src_box,
        ) {
            error!("failed to copy buffer region: {}", e);
        }

        context.flush();
    }
}
