// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bounds-checked view over one attached shared memory segment.
// Delegates to platform::PlatformSegment (System V, or the unsupported stub).
// This is the only place that turns a segment pointer into a slice.

use crate::error::{Error, Result};
use crate::platform::{ipc_key, PlatformSegment};
use crate::segment_map::SegmentIo;

/// Project id of the fixed-size control segment.
pub(crate) const CONTROL_PROJ_ID: u8 = 0xfe;
/// Project id of the semaphore set.
pub(crate) const SEMAPHORE_PROJ_ID: u8 = 0xff;
/// Payload segments use project ids `1..=MAX_PAYLOAD_SEGMENTS`.
pub(crate) const MAX_PAYLOAD_SEGMENTS: usize = 0xfd;

/// Permissions for segments created by a producer. Consumers only read.
const SEGMENT_PERMS: u32 = 0o644;

/// An attached shared memory segment.
pub struct Segment {
    inner: PlatformSegment,
    label: String,
}

impl Segment {
    /// Create the segment keyed by (`path`, `proj_id`) exclusively and attach
    /// it read-write.
    pub fn create(path: &str, proj_id: u8, size: usize) -> Result<Self> {
        let label = label_for(proj_id);
        let key = ipc_key(path, proj_id)
            .map_err(|e| Error::from_os(format!("ftok {label} of {path}"), e))?;
        let inner = PlatformSegment::create(key, size, SEGMENT_PERMS).map_err(|e| {
            Error::from_os(format!("shmget/shmat {label} ({size} bytes, key {key:#x})"), e)
        })?;
        tracing::debug!(%path, segment = %label, size, id = inner.id(), "created segment");
        Ok(Self { inner, label })
    }

    /// Attach the existing segment keyed by (`path`, `proj_id`).
    pub fn open(path: &str, proj_id: u8, read_only: bool) -> Result<Self> {
        let label = label_for(proj_id);
        let key = ipc_key(path, proj_id)
            .map_err(|e| Error::from_os(format!("ftok {label} of {path}"), e))?;
        let inner = PlatformSegment::open(key, read_only)
            .map_err(|e| Error::from_os(format!("shmget/shmat {label} (key {key:#x})"), e))?;
        tracing::debug!(%path, segment = %label, size = inner.size(), "attached segment");
        Ok(Self { inner, label })
    }

    /// Remove the segment keyed by (`path`, `proj_id`) if it exists.
    pub fn remove(path: &str, proj_id: u8) {
        if let Ok(key) = ipc_key(path, proj_id) {
            PlatformSegment::remove_by_key(key);
        }
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.inner.size()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.size() == 0
    }

    fn check(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.inner.size() => Ok(()),
            _ => Err(Error::invalid(format!(
                "{}: access {offset}+{len} exceeds {} bytes",
                self.label,
                self.inner.size()
            ))),
        }
    }
}

impl SegmentIo for Segment {
    fn write_at(&self, offset: usize, src: &[u8]) -> Result<()> {
        if self.inner.is_read_only() {
            return Err(Error::invalid(format!("{} is attached read-only", self.label)));
        }
        self.check(offset, src.len())?;
        // Safety: range checked above; the gate protocol excludes concurrent
        // writers and readers.
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                self.inner.as_mut_ptr().add(offset),
                src.len(),
            );
        }
        Ok(())
    }

    fn read_at(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.check(offset, dst.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.inner.as_ptr().add(offset),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("label", &self.label)
            .field("id", &self.inner.id())
            .field("len", &self.len())
            .finish()
    }
}

fn label_for(proj_id: u8) -> String {
    match proj_id {
        CONTROL_PROJ_ID => "control segment".to_string(),
        SEMAPHORE_PROJ_ID => "semaphore set".to_string(),
        n => format!("segment {n}"),
    }
}
