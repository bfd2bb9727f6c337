// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Wire layout of a channel. All fields are native-endian u32.
//
//   control segment:  [frame_number][total_payload_bytes]
//   payload stream:   [plane_count] then per plane [byte_len][height][bytes...]
//
// The payload stream is laid over consecutive payload segments by
// segment_map, so a header may straddle two segments.

use crate::error::{Error, Result};
use crate::frame::{FrameBuffer, FrameSet, MAX_PLANES};
use crate::segment_map::{copy_in, copy_out, SegmentIo};

pub const CONTROL_BLOCK_LEN: usize = 8;

const PLANE_COUNT_LEN: usize = 4;
const PLANE_HEADER_LEN: usize = 8;

/// Contents of the control segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlBlock {
    pub frame_number: u32,
    pub total_bytes: u32,
}

impl ControlBlock {
    pub fn encode(&self) -> [u8; CONTROL_BLOCK_LEN] {
        let mut out = [0u8; CONTROL_BLOCK_LEN];
        out[..4].copy_from_slice(&self.frame_number.to_ne_bytes());
        out[4..].copy_from_slice(&self.total_bytes.to_ne_bytes());
        out
    }

    pub fn decode(raw: &[u8; CONTROL_BLOCK_LEN]) -> Self {
        Self {
            frame_number: u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]),
            total_bytes: u32::from_ne_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }

    pub(crate) fn write_to<S: SegmentIo>(&self, seg: &S) -> Result<()> {
        seg.write_at(0, &self.encode())
    }

    pub(crate) fn read_from<S: SegmentIo>(seg: &S) -> Result<Self> {
        let mut raw = [0u8; CONTROL_BLOCK_LEN];
        seg.read_at(0, &mut raw)?;
        Ok(Self::decode(&raw))
    }
}

/// Bytes the payload stream of `frames` occupies.
pub fn payload_len(frames: &FrameSet) -> usize {
    PLANE_COUNT_LEN + frames.plane_count() * PLANE_HEADER_LEN + frames.payload_len()
}

/// Write the payload stream of `frames` at offset 0. Returns bytes written.
pub(crate) fn encode_payload<S: SegmentIo>(
    segments: &[S],
    segment_size: usize,
    frames: &FrameSet,
) -> Result<usize> {
    let mut off = copy_in(
        segments,
        segment_size,
        0,
        &(frames.plane_count() as u32).to_ne_bytes(),
    )?;
    for plane in frames.planes() {
        let mut header = [0u8; PLANE_HEADER_LEN];
        header[..4].copy_from_slice(&plane.byte_len().to_ne_bytes());
        header[4..].copy_from_slice(&plane.height().to_ne_bytes());
        off += copy_in(segments, segment_size, off, &header)?;
        off += copy_in(segments, segment_size, off, plane.data())?;
    }
    Ok(off)
}

/// Read a payload stream of `total` bytes written by [`encode_payload`].
///
/// Plane width is reconstructed as `byte_len / height`, which is only the
/// real width for one-byte-per-pixel formats without row padding.
pub(crate) fn decode_payload<S: SegmentIo>(
    segments: &[S],
    segment_size: usize,
    control: ControlBlock,
) -> Result<FrameSet> {
    let total = control.total_bytes as usize;
    let mut off = 0usize;

    let plane_count = read_u32(segments, segment_size, &mut off, total, "plane count")? as usize;
    if plane_count == 0 || plane_count > MAX_PLANES {
        return Err(Error::invalid(format!(
            "plane count {plane_count} outside 1..={MAX_PLANES}"
        )));
    }

    let mut planes = Vec::with_capacity(plane_count);
    for i in 0..plane_count {
        let byte_len = read_u32(segments, segment_size, &mut off, total, "plane length")? as usize;
        let height = read_u32(segments, segment_size, &mut off, total, "plane height")?;
        if height == 0 {
            return Err(Error::invalid(format!("plane {i} has height 0")));
        }
        if byte_len > total - off {
            return Err(Error::invalid(format!(
                "plane {i} of {byte_len} bytes runs past payload end ({total} bytes)"
            )));
        }
        let mut data = vec![0u8; byte_len];
        off += copy_out(segments, segment_size, off, &mut data)?;
        let width = byte_len as u32 / height;
        planes.push(FrameBuffer::from_vec(data, width, height, control.frame_number));
    }
    FrameSet::new(planes)
}

fn read_u32<S: SegmentIo>(
    segments: &[S],
    segment_size: usize,
    off: &mut usize,
    total: usize,
    what: &str,
) -> Result<u32> {
    if total.saturating_sub(*off) < 4 {
        return Err(Error::invalid(format!(
            "{what} at offset {} runs past payload end ({total} bytes)",
            *off
        )));
    }
    let mut raw = [0u8; 4];
    *off += copy_out(segments, segment_size, *off, &mut raw)?;
    Ok(u32::from_ne_bytes(raw))
}
