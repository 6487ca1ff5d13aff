// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! dri: Pipe screens provided by the gallium DRI library of the device.
//!
//! The screen wrappers need the Gallium headers and are only built when `MESA_SOURCE_DIR` points
//! at a Mesa source tree.

#[cfg(gallium)]
mod bindings;
#[cfg(gallium)]
mod screen;

use std::path::PathBuf;

use libc::c_void;
use libloading::os::unix::Library as UnixLibrary;
use libloading::os::unix::RTLD_GLOBAL;
use libloading::os::unix::RTLD_NOW;
use libloading::Library;
use log::debug;

#[cfg(gallium)]
pub use crate::dri::screen::create_for_pipe;
#[cfg(gallium)]
pub use crate::dri::screen::DriContext;
#[cfg(gallium)]
pub use crate::dri::screen::DriResource;
#[cfg(gallium)]
pub use crate::dri::screen::DriScreen;
#[cfg(gallium)]
pub use crate::dri::screen::DriTransfer;
use crate::pipe_utils::*;

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        const DRI_LIBRARY_DIR: &str = "/vendor/lib64/dri";
    } else {
        const DRI_LIBRARY_DIR: &str = "/vendor/lib/dri";
    }
}

const DRI_LIBRARY_NAME: &str = "gallium_dri.so";
const DRI_ENTRY_POINT: &str = "load_pipe_screen";

/// Loads pipe screens from the gallium DRI library, following the Rust builder pattern.
#[derive(Clone, Debug)]
pub struct DriLoader {
    library_dir: PathBuf,
    library_name: String,
    entry_point: String,
}

impl DriLoader {
    pub fn new() -> DriLoader {
        DriLoader {
            library_dir: PathBuf::from(DRI_LIBRARY_DIR),
            library_name: DRI_LIBRARY_NAME.to_string(),
            entry_point: DRI_ENTRY_POINT.to_string(),
        }
    }

    /// Set the directory the library is loaded from.
    pub fn set_library_dir<P: Into<PathBuf>>(mut self, library_dir: P) -> DriLoader {
        self.library_dir = library_dir.into();
        self
    }

    /// Set the file name of the library.
    pub fn set_library_name(mut self, library_name: &str) -> DriLoader {
        self.library_name = library_name.to_string();
        self
    }

    /// Set the symbol resolved to obtain a screen.
    pub fn set_entry_point(mut self, entry_point: &str) -> DriLoader {
        self.entry_point = entry_point.to_string();
        self
    }

    pub fn library_path(&self) -> PathBuf {
        self.library_dir.join(&self.library_name)
    }

    /// Loads the library and checks that it exports the entry point.
    pub fn open(&self) -> PipeResult<Library> {
        let path = self.library_path();

        // Safe because the library is a gallium driver whose initializers have no requirements
        // on the loading process.
        let library: Library = unsafe { UnixLibrary::open(Some(&path), RTLD_NOW | RTLD_GLOBAL) }
            .map_err(PipeError::LibraryLoad)?
            .into();

        // Safe because the symbol is only looked up, never read through this type.
        if let Err(e) = unsafe { library.get::<*const c_void>(self.entry_point.as_bytes()) } {
            return Err(PipeError::MissingEntryPoint(e));
        }

        debug!("opened {}", path.display());
        Ok(library)
    }
}

impl Default for DriLoader {
    fn default() -> Self {
        DriLoader::new()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn default_library_path() {
        let loader = DriLoader::new();

        if cfg!(target_pointer_width = "64") {
            assert_eq!(
                loader.library_path(),
                Path::new("/vendor/lib64/dri/gallium_dri.so")
            );
        } else {
            assert_eq!(
                loader.library_path(),
                Path::new("/vendor/lib/dri/gallium_dri.so")
            );
        }
    }

    #[test]
    fn setters() {
        let loader = DriLoader::new()
            .set_library_dir("/opt/dri")
            .set_library_name("swrast_dri.so")
            .set_entry_point("load_swrast_screen");

        assert_eq!(loader.library_path(), Path::new("/opt/dri/swrast_dri.so"));
        assert_eq!(loader.entry_point, "load_swrast_screen");
    }

    #[test]
    fn missing_library() {
        let loader = DriLoader::new().set_library_dir("/nonexistent/gralloc_pipe/dri");

        let err = loader.open().err().unwrap();
        assert!(matches!(err, PipeError::LibraryLoad(_)));
        assert_eq!(err.errno(), -libc::ENODEV);
    }

    #[cfg(target_env = "gnu")]
    #[test]
    fn missing_entry_point() {
        let loader = DriLoader::new()
            .set_library_dir("")
            .set_library_name("libc.so.6");

        let err = loader.open().err().unwrap();
        assert!(matches!(err, PipeError::MissingEntryPoint(_)));
        assert_eq!(err.errno(), -libc::ENODEV);
    }

    #[cfg(target_env = "gnu")]
    #[test]
    fn open_checks_custom_entry_point() {
        let loader = DriLoader::new()
            .set_library_dir("")
            .set_library_name("libc.so.6")
            .set_entry_point("malloc");

        assert!(loader.open().is_ok());
    }
}
