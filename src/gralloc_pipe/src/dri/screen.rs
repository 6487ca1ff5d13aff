// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! screen: RAII wrappers over the Gallium screen, context, resource and transfer tables of the
//! DRI library.

use std::convert::TryInto;
use std::ptr::addr_of_mut;
use std::ptr::null_mut;
use std::ptr::NonNull;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;

use libc::c_uint;
use libloading::Library;
use log::debug;
use log::error;

use crate::dri::bindings::*;
use crate::dri::DriLoader;
use crate::pipe_gralloc::HandleUsage;
use crate::pipe_gralloc::PipeBind;
use crate::pipe_gralloc::PipeContext;
use crate::pipe_gralloc::PipeFormat;
use crate::pipe_gralloc::PipeManager;
use crate::pipe_gralloc::PipeResource;
use crate::pipe_gralloc::PipeScreen;
use crate::pipe_gralloc::PipeTextureTarget;
use crate::pipe_gralloc::PipeTransfer;
use crate::pipe_gralloc::ResourceTemplate;
use crate::pipe_gralloc::ScreenLoader;
use crate::pipe_gralloc::TransferUsage;
use crate::pipe_gralloc::WinsysHandle;
use crate::pipe_gralloc::WinsysHandleType;
use crate::pipe_utils::*;

const BIND_FLAGS: [(PipeBind, c_uint); 8] = [
    (PipeBind::DEPTH_STENCIL, PIPE_BIND_DEPTH_STENCIL),
    (PipeBind::RENDER_TARGET, PIPE_BIND_RENDER_TARGET),
    (PipeBind::BLENDABLE, PIPE_BIND_BLENDABLE),
    (PipeBind::SAMPLER_VIEW, PIPE_BIND_SAMPLER_VIEW),
    (PipeBind::DISPLAY_TARGET, PIPE_BIND_DISPLAY_TARGET),
    (PipeBind::SCANOUT, PIPE_BIND_SCANOUT),
    (PipeBind::SHARED, PIPE_BIND_SHARED),
    (PipeBind::LINEAR, PIPE_BIND_LINEAR),
];

const HANDLE_USAGE_FLAGS: [(HandleUsage, c_uint); 3] = [
    (HandleUsage::EXPLICIT_FLUSH, PIPE_HANDLE_USAGE_EXPLICIT_FLUSH),
    (
        HandleUsage::FRAMEBUFFER_WRITE,
        PIPE_HANDLE_USAGE_FRAMEBUFFER_WRITE,
    ),
    (HandleUsage::SHADER_WRITE, PIPE_HANDLE_USAGE_SHADER_WRITE),
];

const TRANSFER_USAGE_FLAGS: [(TransferUsage, c_uint); 2] = [
    (TransferUsage::READ, PIPE_TRANSFER_READ),
    (TransferUsage::WRITE, PIPE_TRANSFER_WRITE),
];

fn raw_flags<F: bitflags::Flags + Copy>(flags: F, table: &[(F, c_uint)]) -> c_uint {
    table
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .fold(0, |raw, (_, bit)| raw | bit)
}

fn raw_format(format: PipeFormat) -> pipe_format {
    match format {
        PipeFormat::None => PIPE_FORMAT_NONE,
        PipeFormat::B8G8R8A8Unorm => PIPE_FORMAT_B8G8R8A8_UNORM,
        PipeFormat::B5G6R5Unorm => PIPE_FORMAT_B5G6R5_UNORM,
        PipeFormat::R8G8B8Unorm => PIPE_FORMAT_R8G8B8_UNORM,
        PipeFormat::R8G8B8A8Unorm => PIPE_FORMAT_R8G8B8A8_UNORM,
        PipeFormat::R8G8B8X8Unorm => PIPE_FORMAT_R8G8B8X8_UNORM,
    }
}

fn raw_target(target: PipeTextureTarget) -> pipe_texture_target {
    match target {
        PipeTextureTarget::Buffer => PIPE_BUFFER,
        PipeTextureTarget::Texture1D => PIPE_TEXTURE_1D,
        PipeTextureTarget::Texture2D => PIPE_TEXTURE_2D,
    }
}

fn raw_handle_type(handle_type: WinsysHandleType) -> c_uint {
    match handle_type {
        WinsysHandleType::Shared => WINSYS_HANDLE_TYPE_SHARED,
        WinsysHandleType::Kms => WINSYS_HANDLE_TYPE_KMS,
        WinsysHandleType::Fd => WINSYS_HANDLE_TYPE_FD,
    }
}

fn raw_template(templ: &ResourceTemplate) -> PipeResult<pipe_resource> {
    let mut raw = pipe_resource {
        width0: templ.width0,
        height0: templ.height0.try_into()?,
        depth0: templ.depth0.try_into()?,
        array_size: templ.array_size,
        bind: raw_flags(templ.bind, &BIND_FLAGS),
        ..Default::default()
    };
    raw.set_format(raw_format(templ.format));
    raw.set_target(raw_target(templ.target));
    raw.set_usage(PIPE_USAGE_DEFAULT);

    Ok(raw)
}

fn raw_box(bx: &PipeBox) -> PipeResult<pipe_box> {
    Ok(pipe_box {
        x: bx.x.try_into()?,
        y: bx.y.try_into()?,
        z: bx.z.try_into()?,
        width: bx.width.try_into()?,
        height: bx.height.try_into()?,
        depth: bx.depth.try_into()?,
    })
}

impl ScreenLoader for DriLoader {
    type Screen = DriScreen;

    fn load_screen(&self, fd: i32, name: &str) -> PipeResult<DriScreen> {
        let library = self.open()?;

        // Safe because the entry point has the signature of `load_pipe_screen_fn`.  The function
        // pointer is only used while `library` is loaded.
        let load_pipe_screen: load_pipe_screen_fn = unsafe {
            *library
                .get::<load_pipe_screen_fn>(self.entry_point.as_bytes())
                .map_err(PipeError::MissingEntryPoint)?
        };

        let mut dev: *mut pipe_loader_device = null_mut();
        // Safe because `dev` is a valid location for the library to store its device in.
        let screen = unsafe { load_pipe_screen(&mut dev, fd) };
        let screen =
            NonNull::new(screen).ok_or_else(|| PipeError::ScreenCreation(name.to_string()))?;

        debug!("loaded {} for {}", self.library_path().display(), name);
        Ok(DriScreen {
            screen,
            _library: library,
        })
    }
}

/// Creates a drm_gralloc driver for `fd` using the default DRI library.
pub fn create_for_pipe(fd: i32, name: &str) -> PipeResult<PipeManager<DriScreen>> {
    PipeManager::create(&DriLoader::new(), fd, name)
}

/// A screen created by the DRI library.  Destroyed on drop, before the library is unloaded.
///
/// Resources and contexts must be dropped before their screen.
pub struct DriScreen {
    screen: NonNull<pipe_screen>,
    _library: Library,
}

// Safe because every use of the screen is serialized by the owning manager.
unsafe impl Send for DriScreen {}

impl DriScreen {
    fn table(&self) -> &pipe_screen {
        // Safe because the screen stays valid until drop.
        unsafe { self.screen.as_ref() }
    }
}

impl Drop for DriScreen {
    fn drop(&mut self) {
        if let Some(destroy) = self.table().destroy {
            // Safe because the screen is valid and not used after this point.
            unsafe { destroy(self.screen.as_ptr()) };
        }
    }
}

impl PipeScreen for DriScreen {
    type Resource = DriResource;
    type Context = DriContext;

    fn is_format_supported(
        &self,
        format: PipeFormat,
        target: PipeTextureTarget,
        sample_count: u32,
        bind: PipeBind,
    ) -> bool {
        let Some(is_format_supported) = self.table().is_format_supported else {
            return false;
        };

        // Safe because the screen is valid and the arguments are plain values.  Storage samples
        // follow the sample count.  The result is a `boolean` (unsigned char) before Mesa 19.3 and
        // a `bool` since.
        let supported = unsafe {
            is_format_supported(
                self.screen.as_ptr(),
                raw_format(format),
                raw_target(target),
                sample_count,
                sample_count,
                raw_flags(bind, &BIND_FLAGS),
            )
        };

        u8::from(supported) != 0
    }

    fn resource_create(&self, templ: &ResourceTemplate) -> PipeResult<DriResource> {
        let resource_create = self
            .table()
            .resource_create
            .ok_or(PipeError::ResourceCreation)?;
        let raw = raw_template(templ)?;

        // Safe because the screen is valid and `raw` outlives the call.
        let resource = unsafe { resource_create(self.screen.as_ptr(), &raw) };

        Ok(DriResource {
            resource: NonNull::new(resource).ok_or(PipeError::ResourceCreation)?,
            template: *templ,
        })
    }

    fn resource_from_handle(
        &self,
        templ: &ResourceTemplate,
        handle: &WinsysHandle,
        usage: HandleUsage,
    ) -> PipeResult<DriResource> {
        let resource_from_handle = self
            .table()
            .resource_from_handle
            .ok_or(PipeError::ResourceImport(handle.handle))?;
        let raw = raw_template(templ)?;
        let mut whandle = winsys_handle {
            type_: raw_handle_type(handle.handle_type),
            handle: handle.handle,
            stride: handle.stride,
            ..Default::default()
        };

        // Safe because the screen is valid and both descriptors outlive the call.
        let resource = unsafe {
            resource_from_handle(
                self.screen.as_ptr(),
                &raw,
                &mut whandle,
                raw_flags(usage, &HANDLE_USAGE_FLAGS),
            )
        };

        Ok(DriResource {
            resource: NonNull::new(resource).ok_or(PipeError::ResourceImport(handle.handle))?,
            template: *templ,
        })
    }

    fn resource_get_handle(
        &self,
        context: Option<&mut DriContext>,
        resource: &DriResource,
        handle_type: WinsysHandleType,
        usage: HandleUsage,
    ) -> PipeResult<WinsysHandle> {
        let resource_get_handle = self
            .table()
            .resource_get_handle
            .ok_or(PipeError::ResourceExport(handle_type))?;
        let context = context.map_or(null_mut(), |c| c.context.as_ptr());
        let mut whandle = winsys_handle {
            type_: raw_handle_type(handle_type),
            ..Default::default()
        };

        // Safe because the screen, the context if any, and the resource are valid.
        let exported = unsafe {
            resource_get_handle(
                self.screen.as_ptr(),
                context,
                resource.resource.as_ptr(),
                &mut whandle,
                raw_flags(usage, &HANDLE_USAGE_FLAGS),
            )
        };
        if u8::from(exported) == 0 {
            return Err(PipeError::ResourceExport(handle_type));
        }

        Ok(WinsysHandle {
            handle_type,
            handle: whandle.handle,
            stride: whandle.stride,
        })
    }

    fn context_create(&self) -> PipeResult<DriContext> {
        let context_create = self
            .table()
            .context_create
            .ok_or(PipeError::ContextCreation)?;

        // Safe because the screen is valid.
        let context = unsafe { context_create(self.screen.as_ptr(), null_mut(), 0) };

        Ok(DriContext {
            context: NonNull::new(context).ok_or(PipeError::ContextCreation)?,
        })
    }
}

/// A reference to a resource of the DRI library.
pub struct DriResource {
    resource: NonNull<pipe_resource>,
    template: ResourceTemplate,
}

// Safe because the reference count is atomic and every other use is serialized by the manager.
unsafe impl Send for DriResource {}

impl PipeResource for DriResource {
    fn template(&self) -> &ResourceTemplate {
        &self.template
    }
}

impl Drop for DriResource {
    fn drop(&mut self) {
        let resource = self.resource.as_ptr();

        // Safe because we hold one reference, so the resource and its screen are alive until the
        // count drops to zero.
        unsafe {
            let count = AtomicI32::from_ptr(addr_of_mut!((*resource).reference.count));
            if count.fetch_sub(1, Ordering::AcqRel) != 1 {
                return;
            }

            let screen = (*resource).screen;
            match (*screen).resource_destroy {
                Some(resource_destroy) => resource_destroy(screen, resource),
                None => error!("leaking resource, screen has no resource_destroy"),
            }
        }
    }
}

/// A context of the DRI library.  Destroyed on drop.
pub struct DriContext {
    context: NonNull<pipe_context>,
}

// Safe because every use of the context is serialized by the owning manager.
unsafe impl Send for DriContext {}

impl DriContext {
    fn table(&self) -> &pipe_context {
        // Safe because the context stays valid until drop.
        unsafe { self.context.as_ref() }
    }

    fn unmap_raw(&mut self, transfer: NonNull<pipe_transfer>) {
        let Some(transfer_unmap) = self.table().transfer_unmap else {
            error!("leaking transfer, context has no transfer_unmap");
            return;
        };

        // Safe because the transfer was returned by this context and is not used again.
        unsafe { transfer_unmap(self.context.as_ptr(), transfer.as_ptr()) };
    }
}

impl Drop for DriContext {
    fn drop(&mut self) {
        if let Some(destroy) = self.table().destroy {
            // Safe because the context is valid and not used after this point.
            unsafe { destroy(self.context.as_ptr()) };
        }
    }
}

/// A mapping of the DRI library.  Must be handed back to `transfer_unmap`.
pub struct DriTransfer {
    transfer: NonNull<pipe_transfer>,
    ptr: *mut u8,
    stride: u32,
    size: usize,
}

// Safe because the mapping is owned by the buffer holding the transfer.
unsafe impl Send for DriTransfer {}

impl PipeTransfer for DriTransfer {
    fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    fn stride(&self) -> u32 {
        self.stride
    }

    fn size(&self) -> usize {
        self.size
    }
}

impl PipeContext for DriContext {
    type Resource = DriResource;
    type Transfer = DriTransfer;

    fn transfer_map(
        &mut self,
        resource: &DriResource,
        usage: TransferUsage,
        bx: &PipeBox,
    ) -> PipeResult<DriTransfer> {
        let transfer_map = self.table().transfer_map.ok_or(PipeError::MappingFailed)?;
        let raw = raw_box(bx)?;
        let mut transfer: *mut pipe_transfer = null_mut();

        // Safe because the context and resource are valid, and `raw` outlives the call.
        let ptr = unsafe {
            transfer_map(
                self.context.as_ptr(),
                resource.resource.as_ptr(),
                0,
                raw_flags(usage, &TRANSFER_USAGE_FLAGS),
                &raw,
                &mut transfer,
            )
        };

        let Some(transfer) = NonNull::new(transfer) else {
            return Err(PipeError::MappingFailed);
        };
        if ptr.is_null() {
            self.unmap_raw(transfer);
            return Err(PipeError::MappingFailed);
        }

        // Safe because the transfer is valid until unmapped.
        let stride = unsafe { transfer.as_ref().stride };
        let size = stride as usize * bx.height as usize;

        Ok(DriTransfer {
            transfer,
            ptr: ptr as *mut u8,
            stride,
            size,
        })
    }

    fn transfer_unmap(&mut self, transfer: DriTransfer) {
        self.unmap_raw(transfer.transfer);
    }

    fn resource_copy_region(
        &mut self,
        dst: &DriResource,
        dst_x: u32,
        dst_y: u32,
        src: &DriResource,
        src_box: &PipeBox,
    ) -> PipeResult<()> {
        let resource_copy_region = self
            .table()
            .resource_copy_region
            .ok_or(PipeError::IncompatibleResources)?;
        let raw = raw_box(src_box)?;

        // Safe because the context and both resources are valid, and `raw` outlives the call.
        unsafe {
            resource_copy_region(
                self.context.as_ptr(),
                dst.resource.as_ptr(),
                0,
                dst_x,
                dst_y,
                0,
                src.resource.as_ptr(),
                0,
                &raw,
            )
        };

        Ok(())
    }

    fn flush(&mut self) {
        if let Some(flush) = self.table().flush {
            // Safe because the context is valid.  No fence is requested.
            unsafe { flush(self.context.as_ptr(), null_mut(), 0) };
        }
    }
}
