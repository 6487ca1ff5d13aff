// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::num::NonZeroUsize;
use std::os::fd::AsFd;
use std::ptr::NonNull;

use libc::c_void;
use log::error;
use nix::sys::mman::mmap;
use nix::sys::mman::munmap;
use nix::sys::mman::MapFlags;
use nix::sys::mman::ProtFlags;

use crate::pipe_utils::PipeError;
use crate::pipe_utils::PipeResult;

/// Wraps a shared memory mapping in the current process. Provides RAII semantics including
/// munmap when no longer needed.
#[derive(Debug)]
pub struct MemoryMapping {
    addr: NonNull<c_void>,
    size: usize,
}

// Safe because the mapping is owned exclusively and only unmapped on drop.
unsafe impl Send for MemoryMapping {}

impl Drop for MemoryMapping {
    fn drop(&mut self) {
        // This is safe because we mmap the area at addr ourselves, and nobody
        // else is holding a reference to it.
        if let Err(e) = unsafe { munmap(self.addr, self.size) } {
            error!("failed to unmap {} bytes: {}", self.size, e);
        }
    }
}

impl MemoryMapping {
    /// Maps the first `size` bytes of `descriptor`, read-only or read-write.
    pub fn from_descriptor<F: AsFd>(
        descriptor: F,
        size: usize,
        writable: bool,
    ) -> PipeResult<MemoryMapping> {
        let non_zero_size = NonZeroUsize::new(size).ok_or(PipeError::MappingFailed)?;
        let prot = if writable {
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE
        } else {
            ProtFlags::PROT_READ
        };

        // Safe because we let the kernel pick the address and keep the mapping private to
        // this struct.
        let addr = unsafe {
            mmap(
                None,
                non_zero_size,
                prot,
                MapFlags::MAP_SHARED,
                descriptor,
                0,
            )?
        };

        Ok(MemoryMapping { addr, size })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr() as *mut u8
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe_os::SharedMemory;

    #[test]
    fn shared_writes_are_visible() {
        let shm = SharedMemory::new("mapping_test", 4096).unwrap();
        let writer = MemoryMapping::from_descriptor(&shm, 4096, true).unwrap();
        let reader = MemoryMapping::from_descriptor(&shm, 4096, false).unwrap();

        unsafe {
            *writer.as_ptr().add(100) = 0xa5;
            assert_eq!(*reader.as_ptr().add(100), 0xa5);
        }
    }

    #[test]
    fn zero_size_is_rejected() {
        let shm = SharedMemory::new("mapping_test", 4096).unwrap();
        assert!(MemoryMapping::from_descriptor(&shm, 0, false).is_err());
    }
}
