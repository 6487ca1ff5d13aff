// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::env;
use std::path::PathBuf;

// Relative to the root of a Mesa source tree, 18.3 to 20.0.
const MESA_INCLUDE_DIRS: [&str; 4] = [
    "include",
    "src",
    "src/gallium/include",
    "src/gallium/auxiliary",
];

fn main() {
    println!("cargo:rustc-check-cfg=cfg(gallium)");
    println!("cargo:rerun-if-changed=gallium.h");
    println!("cargo:rerun-if-env-changed=MESA_SOURCE_DIR");

    // The DRI backend is only built when the Gallium headers are available.
    let Some(mesa_dir) = env::var_os("MESA_SOURCE_DIR").map(PathBuf::from) else {
        return;
    };

    let bindings = bindgen::Builder::default()
        .clang_args(
            MESA_INCLUDE_DIRS
                .iter()
                .map(|dir| format!("-I{}", mesa_dir.join(dir).display())),
        )
        .header("gallium.h")
        .allowlist_type("pipe_(screen|context|resource|box|transfer)")
        .allowlist_type("pipe_(format|texture_target|transfer_usage|resource_usage)")
        .allowlist_type("winsys_handle")
        .allowlist_var("PIPE_(BIND|HANDLE_USAGE|TRANSFER|USAGE)_.*")
        .allowlist_var("WINSYS_HANDLE_TYPE_.*")
        .prepend_enum_name(false)
        .derive_default(true)
        .generate()
        .expect("Unable to generate gallium bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("gallium.rs"))
        .expect("Couldn't write bindings!");

    println!("cargo:rustc-cfg=gallium");
}
