// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

mod memory_mapping;
mod shm;

pub use memory_mapping::MemoryMapping;
pub use shm::round_up_to_page_size;
pub use shm::SharedMemory;
