// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! soft: A pipe screen backed by shared memory, for devices without a usable rendering driver
//! and for exercising the driver in tests.
//!
//! Every screen created by one `SoftLoader` sees the same table of shared names, the way every
//! client of a DRM device sees the same flink names.

use std::collections::HashMap;
use std::convert::TryInto;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;
use std::sync::Weak;

use log::debug;
use vmm_sys_util::align_upwards;

use crate::pipe_gralloc::PipeContext;
use crate::pipe_gralloc::PipeFormat;
use crate::pipe_gralloc::PipeResource;
use crate::pipe_gralloc::PipeScreen;
use crate::pipe_gralloc::PipeTextureTarget;
use crate::pipe_gralloc::PipeTransfer;
use crate::pipe_gralloc::ResourceTemplate;
use crate::pipe_gralloc::ScreenLoader;
use crate::pipe_gralloc::WinsysHandle;
use crate::pipe_gralloc::WinsysHandleType;
use crate::pipe_gralloc::HandleUsage;
use crate::pipe_gralloc::PipeBind;
use crate::pipe_gralloc::TransferUsage;
use crate::pipe_os::round_up_to_page_size;
use crate::pipe_os::MemoryMapping;
use crate::pipe_os::SharedMemory;
use crate::pipe_utils::*;

/// Row alignment of soft resources, in bytes.
const SOFT_STRIDE_ALIGNMENT: u64 = 64;

/// The memory behind one or more resources.
struct SoftStorage {
    shm: SharedMemory,
    format: PipeFormat,
    stride: u32,
    height: u32,
    name: OnceLock<u32>,
    kms_handle: OnceLock<u32>,
}

impl SoftStorage {
    fn new(templ: &ResourceTemplate) -> PipeResult<SoftStorage> {
        let bpp = templ.format.bytes_per_pixel() as u64;
        let width = templ.width0 as u64;
        let height = templ.height0 as u64;

        let row = checked_arithmetic!(width * bpp)?;
        let stride: u32 = align_upwards!(row, SOFT_STRIDE_ALIGNMENT).try_into()?;
        let stride64 = stride as u64;
        let size = round_up_to_page_size(checked_arithmetic!(stride64 * height)?)?;

        Ok(SoftStorage {
            shm: SharedMemory::new("soft_pipe_resource", size)?,
            format: templ.format,
            stride,
            height: templ.height0,
            name: OnceLock::new(),
            kms_handle: OnceLock::new(),
        })
    }

    fn map(&self, writable: bool) -> PipeResult<MemoryMapping> {
        MemoryMapping::from_descriptor(&self.shm, self.shm.size().try_into()?, writable)
    }
}

struct SoftDevice {
    names: Mutex<HashMap<u32, Weak<SoftStorage>>>,
    next_name: AtomicU32,
    next_kms_handle: AtomicU32,
}

impl SoftDevice {
    fn names(&self) -> MutexGuard<HashMap<u32, Weak<SoftStorage>>> {
        match self.names.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn export_name(&self, storage: &Arc<SoftStorage>) -> u32 {
        *storage.name.get_or_init(|| {
            let name = self.next_name.fetch_add(1, Ordering::SeqCst);
            let mut names = self.names();
            names.retain(|_, storage| storage.strong_count() > 0);
            names.insert(name, Arc::downgrade(storage));
            name
        })
    }

    fn lookup_name(&self, name: u32) -> Option<Arc<SoftStorage>> {
        self.names().get(&name).and_then(Weak::upgrade)
    }
}

/// Produces soft screens sharing one name table.
pub struct SoftLoader {
    device: Arc<SoftDevice>,
}

impl SoftLoader {
    pub fn new() -> SoftLoader {
        SoftLoader {
            device: Arc::new(SoftDevice {
                names: Mutex::new(HashMap::new()),
                // 0 means "no name" in gralloc handles.
                next_name: AtomicU32::new(1),
                next_kms_handle: AtomicU32::new(1),
            }),
        }
    }
}

impl Default for SoftLoader {
    fn default() -> Self {
        SoftLoader::new()
    }
}

impl ScreenLoader for SoftLoader {
    type Screen = SoftScreen;

    fn load_screen(&self, fd: i32, name: &str) -> PipeResult<SoftScreen> {
        debug!("using soft pipe screen for {} (fd {})", name, fd);
        Ok(SoftScreen {
            device: self.device.clone(),
            fd,
        })
    }
}

pub struct SoftScreen {
    device: Arc<SoftDevice>,
    fd: i32,
}

impl SoftScreen {
    /// The device file descriptor the screen was loaded for.  Soft screens never use it.
    pub fn fd(&self) -> i32 {
        self.fd
    }
}

fn validate_template(templ: &ResourceTemplate) -> PipeResult<()> {
    if templ.width0 == 0 || templ.height0 == 0 || templ.depth0 != 1 || templ.array_size != 1 {
        return Err(PipeError::InvalidDimensions(templ.width0, templ.height0));
    }

    Ok(())
}

impl PipeScreen for SoftScreen {
    type Resource = SoftResource;
    type Context = SoftContext;

    fn is_format_supported(
        &self,
        format: PipeFormat,
        target: PipeTextureTarget,
        sample_count: u32,
        bind: PipeBind,
    ) -> bool {
        if format == PipeFormat::None || target != PipeTextureTarget::Texture2D {
            return false;
        }

        if sample_count > 1 {
            return false;
        }

        // No display engine scans out 24 bpp.
        !(format == PipeFormat::R8G8B8Unorm && bind.contains(PipeBind::SCANOUT))
    }

    fn resource_create(&self, templ: &ResourceTemplate) -> PipeResult<SoftResource> {
        if !self.is_format_supported(templ.format, templ.target, 0, templ.bind) {
            return Err(PipeError::UnsupportedFormat(templ.format as i32));
        }
        validate_template(templ)?;

        let storage = SoftStorage::new(templ)?;
        debug!(
            "created {}x{} {:?} soft resource, stride {}",
            templ.width0, templ.height0, templ.format, storage.stride
        );

        Ok(SoftResource {
            storage: Arc::new(storage),
            template: *templ,
        })
    }

    fn resource_from_handle(
        &self,
        templ: &ResourceTemplate,
        handle: &WinsysHandle,
        _usage: HandleUsage,
    ) -> PipeResult<SoftResource> {
        if handle.handle_type != WinsysHandleType::Shared {
            return Err(PipeError::UnsupportedHandleType(handle.handle_type));
        }
        validate_template(templ)?;

        let storage = self
            .device
            .lookup_name(handle.handle)
            .ok_or(PipeError::InvalidSharedName(handle.handle))?;

        if handle.stride != storage.stride {
            return Err(PipeError::InvalidStride {
                expected: storage.stride,
                actual: handle.stride,
            });
        }

        let bpp = templ.format.bytes_per_pixel();
        let width = templ.width0;
        let row = checked_arithmetic!(width * bpp)?;
        if row > storage.stride || templ.height0 > storage.height {
            return Err(PipeError::InvalidDimensions(templ.width0, templ.height0));
        }

        Ok(SoftResource {
            storage,
            template: *templ,
        })
    }

    fn resource_get_handle(
        &self,
        _context: Option<&mut SoftContext>,
        resource: &SoftResource,
        handle_type: WinsysHandleType,
        _usage: HandleUsage,
    ) -> PipeResult<WinsysHandle> {
        let storage = &resource.storage;
        let handle = match handle_type {
            WinsysHandleType::Shared => self.device.export_name(storage),
            WinsysHandleType::Kms => *storage
                .kms_handle
                .get_or_init(|| self.device.next_kms_handle.fetch_add(1, Ordering::SeqCst)),
            WinsysHandleType::Fd => return Err(PipeError::UnsupportedHandleType(handle_type)),
        };

        Ok(WinsysHandle {
            handle_type,
            handle,
            stride: storage.stride,
        })
    }

    fn context_create(&self) -> PipeResult<SoftContext> {
        Ok(SoftContext { _private: () })
    }
}

/// A view of soft memory with its own template.  Imports of the same name share the memory.
pub struct SoftResource {
    storage: Arc<SoftStorage>,
    template: ResourceTemplate,
}

impl SoftResource {
    pub fn stride(&self) -> u32 {
        self.storage.stride
    }
}

impl PipeResource for SoftResource {
    fn template(&self) -> &ResourceTemplate {
        &self.template
    }
}

/// A CPU mapping of a soft resource.
pub struct SoftTransfer {
    mapping: MemoryMapping,
    offset: usize,
    stride: u32,
}

impl PipeTransfer for SoftTransfer {
    fn ptr(&self) -> *mut u8 {
        self.mapping.as_ptr().wrapping_add(self.offset)
    }

    fn stride(&self) -> u32 {
        self.stride
    }

    fn size(&self) -> usize {
        self.mapping.size() - self.offset
    }
}

/// Checks that the `width` x `height` box at (`x`, `y`) lies inside `templ`.
fn check_box(templ: &ResourceTemplate, x: u32, y: u32, width: u32, height: u32) -> PipeResult<()> {
    let width0 = templ.width0;
    let height0 = templ.height0;

    let x_end = checked_arithmetic!(x + width)?;
    let y_end = checked_arithmetic!(y + height)?;
    checked_range!(x_end <= width0)?;
    checked_range!(y_end <= height0)?;

    Ok(())
}

/// Soft contexts keep no state, copies and transfers complete immediately.
pub struct SoftContext {
    _private: (),
}

impl PipeContext for SoftContext {
    type Resource = SoftResource;
    type Transfer = SoftTransfer;

    fn transfer_map(
        &mut self,
        resource: &SoftResource,
        usage: TransferUsage,
        bx: &PipeBox,
    ) -> PipeResult<SoftTransfer> {
        if bx.is_empty() || bx.z != 0 || bx.depth != 1 {
            return Err(PipeError::InvalidDimensions(bx.width, bx.height));
        }
        check_box(&resource.template, bx.x, bx.y, bx.width, bx.height)?;

        let storage = &resource.storage;
        let mapping = storage.map(usage.contains(TransferUsage::WRITE))?;

        let bpp = resource.template.format.bytes_per_pixel() as usize;
        let offset = bx.y as usize * storage.stride as usize + bx.x as usize * bpp;

        Ok(SoftTransfer {
            mapping,
            offset,
            stride: storage.stride,
        })
    }

    fn transfer_unmap(&mut self, transfer: SoftTransfer) {
        drop(transfer);
    }

    fn resource_copy_region(
        &mut self,
        dst: &SoftResource,
        dst_x: u32,
        dst_y: u32,
        src: &SoftResource,
        src_box: &PipeBox,
    ) -> PipeResult<()> {
        if dst.template.format != src.template.format {
            return Err(PipeError::IncompatibleResources);
        }

        if src_box.is_empty() {
            return Ok(());
        }

        check_box(&src.template, src_box.x, src_box.y, src_box.width, src_box.height)?;
        check_box(&dst.template, dst_x, dst_y, src_box.width, src_box.height)?;

        let bpp = src.template.format.bytes_per_pixel() as usize;
        let row_bytes = src_box.width as usize * bpp;
        let src_stride = src.storage.stride as usize;
        let dst_stride = dst.storage.stride as usize;
        let src_offset = |row: usize| (src_box.y as usize + row) * src_stride + src_box.x as usize * bpp;
        let dst_offset = |row: usize| (dst_y as usize + row) * dst_stride + dst_x as usize * bpp;
        let rows = src_box.height as usize;

        if Arc::ptr_eq(&dst.storage, &src.storage) {
            let mapping = dst.storage.map(true)?;
            // Safe because the mapping is writable, covers `size` bytes and lives until the end
            // of this function.
            let bytes = unsafe { std::slice::from_raw_parts_mut(mapping.as_ptr(), mapping.size()) };

            let mut copy_row = |row: usize| {
                let start = src_offset(row);
                bytes.copy_within(start..start + row_bytes, dst_offset(row));
            };

            // Copy away from the overlap so that no source row is overwritten before it is read.
            if dst_y > src_box.y {
                (0..rows).rev().for_each(&mut copy_row);
            } else {
                (0..rows).for_each(&mut copy_row);
            }
        } else {
            let src_mapping = src.storage.map(false)?;
            let dst_mapping = dst.storage.map(true)?;
            // Safe because both mappings cover `size` bytes, are distinct, and live until the end
            // of this function.
            let src_bytes =
                unsafe { std::slice::from_raw_parts(src_mapping.as_ptr(), src_mapping.size()) };
            let dst_bytes = unsafe {
                std::slice::from_raw_parts_mut(dst_mapping.as_ptr(), dst_mapping.size())
            };

            for row in 0..rows {
                let src_start = src_offset(row);
                let dst_start = dst_offset(row);
                dst_bytes[dst_start..dst_start + row_bytes]
                    .copy_from_slice(&src_bytes[src_start..src_start + row_bytes]);
            }
        }

        Ok(())
    }

    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(width: u32, height: u32, format: PipeFormat) -> ResourceTemplate {
        ResourceTemplate {
            target: PipeTextureTarget::Texture2D,
            format,
            bind: PipeBind::SHARED | PipeBind::LINEAR,
            width0: width,
            height0: height,
            depth0: 1,
            array_size: 1,
        }
    }

    fn screen() -> SoftScreen {
        SoftLoader::new().load_screen(-1, "soft").unwrap()
    }

    fn fill(context: &mut SoftContext, resource: &SoftResource, f: impl Fn(u32, u32) -> u8) {
        let templ = *resource.template();
        let bx = PipeBox::new_2d(0, 0, templ.width0, templ.height0);
        let transfer = context
            .transfer_map(resource, TransferUsage::READ_WRITE, &bx)
            .unwrap();
        for y in 0..templ.height0 {
            for x in 0..templ.width0 {
                let offset = (y * transfer.stride() + x * 4) as usize;
                // Safe because the offset lies in the mapped row `y`.
                unsafe { *transfer.ptr().add(offset) = f(x, y) };
            }
        }
        context.transfer_unmap(transfer);
    }

    fn first_byte(context: &mut SoftContext, resource: &SoftResource, x: u32, y: u32) -> u8 {
        let bx = PipeBox::new_2d(x, y, 1, 1);
        let transfer = context
            .transfer_map(resource, TransferUsage::READ, &bx)
            .unwrap();
        // Safe because the mapping starts at pixel (x, y).
        let value = unsafe { *transfer.ptr() };
        context.transfer_unmap(transfer);
        value
    }

    #[test]
    fn stride_is_aligned() {
        let screen = screen();
        let resource = screen
            .resource_create(&template(17, 3, PipeFormat::R8G8B8A8Unorm))
            .unwrap();
        assert_eq!(resource.stride(), 128);

        let resource = screen
            .resource_create(&template(5, 5, PipeFormat::B5G6R5Unorm))
            .unwrap();
        assert_eq!(resource.stride(), 64);
    }

    #[test]
    fn format_support() {
        let screen = screen();
        let bind = PipeBind::SHARED;

        assert!(screen.is_format_supported(
            PipeFormat::B8G8R8A8Unorm,
            PipeTextureTarget::Texture2D,
            0,
            bind | PipeBind::SCANOUT
        ));
        assert!(screen.is_format_supported(
            PipeFormat::R8G8B8Unorm,
            PipeTextureTarget::Texture2D,
            0,
            bind
        ));
        assert!(!screen.is_format_supported(
            PipeFormat::R8G8B8Unorm,
            PipeTextureTarget::Texture2D,
            0,
            bind | PipeBind::SCANOUT
        ));
        assert!(!screen.is_format_supported(
            PipeFormat::None,
            PipeTextureTarget::Texture2D,
            0,
            bind
        ));
        assert!(!screen.is_format_supported(
            PipeFormat::R8G8B8A8Unorm,
            PipeTextureTarget::Buffer,
            0,
            bind
        ));
        assert!(!screen.is_format_supported(
            PipeFormat::R8G8B8A8Unorm,
            PipeTextureTarget::Texture2D,
            4,
            bind
        ));
    }

    #[test]
    fn invalid_templates() {
        let screen = screen();

        let mut templ = template(0, 4, PipeFormat::R8G8B8A8Unorm);
        assert!(matches!(
            screen.resource_create(&templ),
            Err(PipeError::InvalidDimensions(0, 4))
        ));

        templ.width0 = 4;
        templ.array_size = 2;
        assert!(screen.resource_create(&templ).is_err());

        let huge = template(u32::MAX, 2, PipeFormat::R8G8B8A8Unorm);
        assert!(screen.resource_create(&huge).is_err());

        let none = template(4, 4, PipeFormat::None);
        assert!(matches!(
            screen.resource_create(&none),
            Err(PipeError::UnsupportedFormat(0))
        ));
    }

    #[test]
    fn export_is_stable() {
        let screen = screen();
        let resource = screen
            .resource_create(&template(8, 8, PipeFormat::R8G8B8A8Unorm))
            .unwrap();

        let first = screen
            .resource_get_handle(None, &resource, WinsysHandleType::Shared, HandleUsage::READ_WRITE)
            .unwrap();
        let second = screen
            .resource_get_handle(None, &resource, WinsysHandleType::Shared, HandleUsage::READ_WRITE)
            .unwrap();
        assert_eq!(first, second);
        assert_ne!(first.handle, 0);
        assert_eq!(first.stride, resource.stride());

        let kms = screen
            .resource_get_handle(None, &resource, WinsysHandleType::Kms, HandleUsage::READ_WRITE)
            .unwrap();
        assert_eq!(kms.handle_type, WinsysHandleType::Kms);
        assert_ne!(kms.handle, 0);

        assert!(matches!(
            screen.resource_get_handle(None, &resource, WinsysHandleType::Fd, HandleUsage::READ_WRITE),
            Err(PipeError::UnsupportedHandleType(WinsysHandleType::Fd))
        ));
    }

    #[test]
    fn import_checks_handle() {
        let loader = SoftLoader::new();
        let exporter = loader.load_screen(-1, "exporter").unwrap();
        let importer = loader.load_screen(-1, "importer").unwrap();
        let templ = template(8, 8, PipeFormat::R8G8B8A8Unorm);

        let resource = exporter.resource_create(&templ).unwrap();
        let handle = exporter
            .resource_get_handle(None, &resource, WinsysHandleType::Shared, HandleUsage::READ_WRITE)
            .unwrap();

        let imported = importer
            .resource_from_handle(&templ, &handle, HandleUsage::READ_WRITE)
            .unwrap();
        assert!(Arc::ptr_eq(&imported.storage, &resource.storage));

        let mut bad_stride = handle;
        bad_stride.stride += 4;
        assert!(matches!(
            importer.resource_from_handle(&templ, &bad_stride, HandleUsage::READ_WRITE),
            Err(PipeError::InvalidStride { .. })
        ));

        let too_tall = template(8, 9, PipeFormat::R8G8B8A8Unorm);
        assert!(matches!(
            importer.resource_from_handle(&too_tall, &handle, HandleUsage::READ_WRITE),
            Err(PipeError::InvalidDimensions(8, 9))
        ));

        let kms = WinsysHandle {
            handle_type: WinsysHandleType::Kms,
            ..handle
        };
        assert!(matches!(
            importer.resource_from_handle(&templ, &kms, HandleUsage::READ_WRITE),
            Err(PipeError::UnsupportedHandleType(WinsysHandleType::Kms))
        ));

        // The name dies with the last resource.
        drop(imported);
        drop(resource);
        assert!(matches!(
            importer.resource_from_handle(&templ, &handle, HandleUsage::READ_WRITE),
            Err(PipeError::InvalidSharedName(_))
        ));
    }

    #[test]
    fn names_are_per_loader() {
        let a = screen();
        let b = screen();
        let templ = template(8, 8, PipeFormat::R8G8B8A8Unorm);

        let resource = a.resource_create(&templ).unwrap();
        let handle = a
            .resource_get_handle(None, &resource, WinsysHandleType::Shared, HandleUsage::READ_WRITE)
            .unwrap();

        assert!(b
            .resource_from_handle(&templ, &handle, HandleUsage::READ_WRITE)
            .is_err());
    }

    #[test]
    fn transfer_bounds() {
        let screen = screen();
        let mut context = screen.context_create().unwrap();
        let resource = screen
            .resource_create(&template(8, 8, PipeFormat::R8G8B8A8Unorm))
            .unwrap();

        for bx in [
            PipeBox::new_2d(0, 0, 9, 8),
            PipeBox::new_2d(4, 4, 5, 1),
            PipeBox::new_2d(0, 0, 0, 8),
            PipeBox::new_2d(u32::MAX, 0, 2, 1),
        ] {
            assert!(context
                .transfer_map(&resource, TransferUsage::READ, &bx)
                .is_err());
        }

        let transfer = context
            .transfer_map(&resource, TransferUsage::READ, &PipeBox::new_2d(2, 1, 2, 2))
            .unwrap();
        assert_eq!(transfer.offset, 64 + 8);
        assert_eq!(transfer.size(), transfer.mapping.size() - 72);
        context.transfer_unmap(transfer);
    }

    #[test]
    fn copy_between_resources() {
        let screen = screen();
        let mut context = screen.context_create().unwrap();
        let templ = template(8, 8, PipeFormat::R8G8B8A8Unorm);
        let src = screen.resource_create(&templ).unwrap();
        let dst = screen.resource_create(&templ).unwrap();

        fill(&mut context, &src, |x, y| (y * 8 + x) as u8);
        context
            .resource_copy_region(&dst, 1, 2, &src, &PipeBox::new_2d(4, 4, 3, 2))
            .unwrap();

        assert_eq!(first_byte(&mut context, &dst, 1, 2), 36);
        assert_eq!(first_byte(&mut context, &dst, 3, 3), 46);
        assert_eq!(first_byte(&mut context, &dst, 4, 2), 0);
        assert_eq!(first_byte(&mut context, &dst, 1, 4), 0);
    }

    #[test]
    fn copy_within_resource_overlapping() {
        let screen = screen();
        let mut context = screen.context_create().unwrap();
        let resource = screen
            .resource_create(&template(8, 8, PipeFormat::R8G8B8A8Unorm))
            .unwrap();

        // Shift rows 0..4 down by two.
        fill(&mut context, &resource, |_, y| y as u8);
        context
            .resource_copy_region(&resource, 0, 2, &resource, &PipeBox::new_2d(0, 0, 8, 4))
            .unwrap();
        let rows: Vec<u8> = (0..8).map(|y| first_byte(&mut context, &resource, 0, y)).collect();
        assert_eq!(rows, vec![0, 1, 0, 1, 2, 3, 6, 7]);

        // And back up.
        fill(&mut context, &resource, |_, y| y as u8);
        context
            .resource_copy_region(&resource, 0, 0, &resource, &PipeBox::new_2d(0, 2, 8, 4))
            .unwrap();
        let rows: Vec<u8> = (0..8).map(|y| first_byte(&mut context, &resource, 0, y)).collect();
        assert_eq!(rows, vec![2, 3, 4, 5, 4, 5, 6, 7]);
    }

    #[test]
    fn copy_rejects_mismatches() {
        let screen = screen();
        let mut context = screen.context_create().unwrap();
        let rgba = screen
            .resource_create(&template(8, 8, PipeFormat::R8G8B8A8Unorm))
            .unwrap();
        let bgra = screen
            .resource_create(&template(8, 8, PipeFormat::B8G8R8A8Unorm))
            .unwrap();
        let small = screen
            .resource_create(&template(4, 4, PipeFormat::R8G8B8A8Unorm))
            .unwrap();

        assert!(matches!(
            context.resource_copy_region(&rgba, 0, 0, &bgra, &PipeBox::new_2d(0, 0, 4, 4)),
            Err(PipeError::IncompatibleResources)
        ));
        assert!(matches!(
            context.resource_copy_region(&small, 1, 1, &rgba, &PipeBox::new_2d(0, 0, 4, 4)),
            Err(PipeError::CheckedRange { .. })
        ));
        assert!(context
            .resource_copy_region(&rgba, 0, 0, &small, &PipeBox::new_2d(2, 2, 4, 4))
            .is_err());
    }
}
