// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! pipe_utils: Utility enums, structs, and implementations needed by the rest of the crate.

use std::ffi::NulError;
use std::io::Error as IoError;
use std::num::TryFromIntError;

use nix::Error as NixError;
use remain::sorted;
use thiserror::Error;

/// A CPU mapping of a buffer.  `ptr` is the address of the first byte of the buffer and `size`
/// covers every row of the buffer, including the padding up to `stride`.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct PipeMapping {
    pub ptr: u64,
    pub size: u64,
}

/// A 3D box inside a resource, in pixels.  Mirrors Gallium's `pipe_box`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PipeBox {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl PipeBox {
    /// A single-layer box at (`x`, `y`).
    pub fn new_2d(x: u32, y: u32, width: u32, height: u32) -> PipeBox {
        PipeBox {
            x,
            y,
            z: 0,
            width,
            height,
            depth: 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }
}

/// A rectangle given by its two corners, as passed to `blit` by the allocation framework.  `x2`
/// and `y2` are exclusive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PipeRect {
    pub x1: u16,
    pub y1: u16,
    pub x2: u16,
    pub y2: u16,
}

impl PipeRect {
    pub fn new(x1: u16, y1: u16, x2: u16, y2: u16) -> PipeRect {
        PipeRect { x1, y1, x2, y2 }
    }

    /// Returns true if the rectangle covers no pixel, including inverted rectangles.
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1) as u32
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1) as u32
    }
}

/// An error generated while using this crate.
#[sorted]
#[derive(Error, Debug)]
pub enum PipeError {
    /// Checked Arithmetic error
    #[error("arithmetic failed: {}({}) {op} {}({})", .field1.0, .field1.1, .field2.0, .field2.1)]
    CheckedArithmetic {
        field1: (&'static str, usize),
        field2: (&'static str, usize),
        op: &'static str,
    },
    /// Checked Range error
    #[error("range check failed: {}({}) vs {}({})", .field1.0, .field1.1, .field2.0, .field2.1)]
    CheckedRange {
        field1: (&'static str, usize),
        field2: (&'static str, usize),
    },
    /// The backend could not create a rendering context.
    #[error("failed to create pipe context")]
    ContextCreation,
    /// The resources of a copy do not share a pixel layout.
    #[error("copy between incompatible resources")]
    IncompatibleResources,
    /// The resource template has a zero or oversized extent.
    #[error("invalid resource dimensions {0}x{1}")]
    InvalidDimensions(u32, u32),
    /// No live resource is known by the given shared name.
    #[error("invalid shared name {0}")]
    InvalidSharedName(u32),
    /// An imported handle does not describe the layout of the named resource.
    #[error("stride mismatch: handle has {actual}, resource has {expected}")]
    InvalidStride { expected: u32, actual: u32 },
    /// An input/output error occured.
    #[error("an input/output error occur: {0}")]
    IoError(IoError),
    /// The backend library could not be opened.
    #[error("failed to open backend library: {0}")]
    LibraryLoad(libloading::Error),
    /// The backend could not provide a CPU mapping.
    #[error("failed to map pipe resource")]
    MappingFailed,
    /// The backend library does not export the screen entry point.
    #[error("backend library has no screen entry point: {0}")]
    MissingEntryPoint(libloading::Error),
    /// Nix crate error.
    #[error("The errno is {0}")]
    NixError(NixError),
    #[error("Nul Error occured {0}")]
    NulError(NulError),
    /// The backend could not create a new resource.
    #[error("failed to create pipe resource")]
    ResourceCreation,
    /// The backend could not export a handle of the requested type.
    #[error("failed to export a handle of type {0:?}")]
    ResourceExport(crate::pipe_gralloc::WinsysHandleType),
    /// The backend could not wrap a shared handle into a resource.
    #[error("failed to import shared name {0}")]
    ResourceImport(u32),
    /// The screen entry point returned no screen.
    #[error("failed to create pipe screen for {0}")]
    ScreenCreation(String),
    /// An attempted integer conversion failed.
    #[error("int conversion failed: {0}")]
    TryFromIntError(TryFromIntError),
    /// The format and bind flags are not supported by the screen.
    #[error("unsupported format {0:#x}")]
    UnsupportedFormat(i32),
    /// The requested handle type can not be exported or imported.
    #[error("unsupported handle type {0:?}")]
    UnsupportedHandleType(crate::pipe_gralloc::WinsysHandleType),
}

impl PipeError {
    /// Returns the negative errno a C allocation framework expects for this error.
    pub fn errno(&self) -> i32 {
        use PipeError::*;

        let errno = match self {
            ContextCreation | MappingFailed | ResourceCreation => libc::ENOMEM,
            IoError(e) => e.raw_os_error().unwrap_or(libc::EIO),
            NixError(e) => *e as i32,
            LibraryLoad(_) | MissingEntryPoint(_) | ScreenCreation(_) => libc::ENODEV,
            UnsupportedHandleType(_) => libc::ENOTSUP,
            CheckedArithmetic { .. } | CheckedRange { .. } => libc::ERANGE,
            _ => libc::EINVAL,
        };

        -errno
    }
}

impl From<NixError> for PipeError {
    fn from(e: NixError) -> PipeError {
        PipeError::NixError(e)
    }
}

impl From<NulError> for PipeError {
    fn from(e: NulError) -> PipeError {
        PipeError::NulError(e)
    }
}

impl From<IoError> for PipeError {
    fn from(e: IoError) -> PipeError {
        PipeError::IoError(e)
    }
}

impl From<TryFromIntError> for PipeError {
    fn from(e: TryFromIntError) -> PipeError {
        PipeError::TryFromIntError(e)
    }
}

/// The result of an operation in this crate.
pub type PipeResult<T> = std::result::Result<T, PipeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_emptiness() {
        assert!(PipeRect::new(0, 0, 0, 10).is_empty());
        assert!(PipeRect::new(5, 0, 4, 10).is_empty());
        assert!(PipeRect::new(0, 7, 10, 7).is_empty());
        assert!(!PipeRect::new(0, 0, 1, 1).is_empty());
        assert_eq!(PipeRect::new(5, 0, 4, 10).width(), 0);
    }

    #[test]
    fn errno_classes() {
        assert_eq!(PipeError::ContextCreation.errno(), -libc::ENOMEM);
        assert_eq!(PipeError::MappingFailed.errno(), -libc::ENOMEM);
        assert_eq!(PipeError::UnsupportedFormat(0x32315659).errno(), -libc::EINVAL);
        assert_eq!(
            PipeError::NixError(NixError::EBADF).errno(),
            -libc::EBADF
        );
    }
}
