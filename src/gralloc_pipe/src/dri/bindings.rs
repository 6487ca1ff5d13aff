// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Gallium screen and context tables generated from the Mesa headers, plus the pipe loader entry
//! point of the DRI library.

#![allow(
    non_upper_case_globals,
    non_snake_case,
    non_camel_case_types,
    dead_code,
    unused_variables
)]

use libc::c_int;

include!(concat!(env!("OUT_DIR"), "/gallium.rs"));

/// Owned by the library, filled in by the entry point.
#[repr(C)]
pub struct pipe_loader_device {
    _unused: [u8; 0],
}

/// `struct pipe_screen *load_pipe_screen(struct pipe_loader_device **dev, int fd)`
pub type load_pipe_screen_fn =
    unsafe extern "C" fn(dev: *mut *mut pipe_loader_device, fd: c_int) -> *mut pipe_screen;
