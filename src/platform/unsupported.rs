// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fallback for targets without System V IPC. Every call fails with
// `ErrorKind::Unsupported`, which surfaces as `Error::Unimplemented`.

use std::io;

pub type Key = i32;

pub type SemOp = (u16, i16, bool);

fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "shared memory transport is not implemented on this platform",
    )
}

pub fn ipc_key(_path: &str, _proj_id: u8) -> io::Result<Key> {
    Err(unsupported())
}

pub fn max_segment_size() -> Option<usize> {
    None
}

pub struct PlatformSegment {
    _private: (),
}

impl PlatformSegment {
    pub fn create(_key: Key, _size: usize, _perms: u32) -> io::Result<Self> {
        Err(unsupported())
    }

    pub fn open(_key: Key, _read_only: bool) -> io::Result<Self> {
        Err(unsupported())
    }

    pub fn id(&self) -> i32 {
        -1
    }

    pub fn size(&self) -> usize {
        0
    }

    pub fn is_read_only(&self) -> bool {
        true
    }

    pub fn as_ptr(&self) -> *const u8 {
        std::ptr::null()
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        std::ptr::null_mut()
    }

    pub fn remove_by_key(_key: Key) {}
}

#[derive(Debug)]
pub struct PlatformSemaphores {
    _private: (),
}

impl PlatformSemaphores {
    pub fn create(_key: Key, _count: u16, _perms: u32) -> io::Result<Self> {
        Err(unsupported())
    }

    pub fn open(_key: Key) -> io::Result<Self> {
        Err(unsupported())
    }

    pub fn id(&self) -> i32 {
        -1
    }

    pub fn apply(&self, _ops: &[SemOp]) -> io::Result<bool> {
        Err(unsupported())
    }

    pub fn value(&self, _num: u16) -> io::Result<i32> {
        Err(unsupported())
    }

    pub fn remove_by_id(_id: i32) {}

    pub fn remove_by_key(_key: Key) {}
}
