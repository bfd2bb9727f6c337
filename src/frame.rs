// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Frame planes and frame sets.
// A plane either owns its bytes or is a view into a reference-counted master
// frame allocation; `Bytes` covers both without a custom destructor.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Maximum number of planes in one frame (matches the capture engine's
/// per-frame plane table).
pub const MAX_PLANES: usize = 8;

/// One contiguous plane of pixel bytes plus its metadata.
#[derive(Clone)]
pub struct FrameBuffer {
    data: Bytes,
    width: u32,
    height: u32,
    frame_number: u32,
}

impl FrameBuffer {
    /// A plane that exclusively owns `data`.
    pub fn from_vec(data: Vec<u8>, width: u32, height: u32, frame_number: u32) -> Self {
        Self {
            data: Bytes::from(data),
            width,
            height,
            frame_number,
        }
    }

    /// A plane over `data`, which may be a slice of a larger master frame.
    /// The master allocation stays alive until the last plane referencing it
    /// is dropped.
    pub fn from_bytes(data: Bytes, width: u32, height: u32, frame_number: u32) -> Self {
        Self {
            data,
            width,
            height,
            frame_number,
        }
    }

    /// Plane bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the plane bytes (cheap clone).
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Number of bytes in the plane.
    pub fn byte_len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// Stamp the plane with the number of the frame it belongs to.
    pub fn set_frame_number(&mut self, frame_number: u32) {
        self.frame_number = frame_number;
    }

    /// Bytes per row, assuming tightly packed rows of uniform size.
    ///
    /// This is only exact for formats whose planes have no row padding;
    /// texture dimensions travel separately, so consumers should not rely on it.
    pub fn row_stride(&self) -> u32 {
        if self.height == 0 {
            return 0;
        }
        self.byte_len() / self.height
    }
}

impl PartialEq for FrameBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.frame_number == other.frame_number
            && self.data == other.data
    }
}

impl Eq for FrameBuffer {}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frame_number", &self.frame_number)
            .finish()
    }
}

/// One video frame: 1 to [`MAX_PLANES`] planes sharing a frame number.
///
/// Immutable once built. Clones share the same planes, so the cache, the
/// transport and any number of subscribers can hold the same frame.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameSet {
    planes: Arc<[FrameBuffer]>,
}

impl FrameSet {
    /// Build a frame set, rejecting an empty or oversized plane list, a
    /// plane with zero height and planes that disagree on the frame number.
    pub fn new(planes: Vec<FrameBuffer>) -> Result<Self> {
        if planes.is_empty() || planes.len() > MAX_PLANES {
            return Err(Error::invalid(format!(
                "frame set needs 1..={MAX_PLANES} planes, got {}",
                planes.len()
            )));
        }
        if let Some(i) = planes.iter().position(|p| p.height == 0) {
            return Err(Error::invalid(format!("plane {i} has height 0")));
        }
        let number = planes[0].frame_number;
        if let Some(p) = planes.iter().find(|p| p.frame_number != number) {
            return Err(Error::invalid(format!(
                "plane frame number {} does not match frame {number}",
                p.frame_number
            )));
        }
        Ok(Self {
            planes: planes.into(),
        })
    }

    /// Frame number shared by every plane.
    pub fn frame_number(&self) -> u32 {
        self.planes[0].frame_number
    }

    pub fn planes(&self) -> &[FrameBuffer] {
        &self.planes
    }

    pub fn plane(&self, index: usize) -> Option<&FrameBuffer> {
        self.planes.get(index)
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Sum of the plane byte lengths.
    pub fn payload_len(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }

    /// Whether `self` and `other` are the same shared frame (not merely equal).
    pub fn ptr_eq(&self, other: &FrameSet) -> bool {
        Arc::ptr_eq(&self.planes, &other.planes)
    }
}

impl std::fmt::Debug for FrameSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSet")
            .field("frame_number", &self.frame_number())
            .field("planes", &self.planes.len())
            .field("payload_len", &self.payload_len())
            .finish()
    }
}
