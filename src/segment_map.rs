// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Logical-offset to (segment, local offset) translation.
// Writer and reader use the same functions, so a byte stream laid over
// consecutive fixed-size segments is addressed identically by both ends.

use crate::error::{Error, Result};

/// Where a logical byte offset lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentAddress {
    pub segment: usize,
    pub local_offset: usize,
    /// Bytes from `local_offset` to the end of the segment.
    pub remaining: usize,
}

/// Translate `global_offset` for segments of `segment_size` bytes.
///
/// `segment_size` must be non-zero.
pub fn translate(global_offset: usize, segment_size: usize) -> SegmentAddress {
    let local_offset = global_offset % segment_size;
    SegmentAddress {
        segment: global_offset / segment_size,
        local_offset,
        remaining: segment_size - local_offset,
    }
}

/// Number of `segment_size` segments needed to hold `bytes` bytes.
pub fn segments_needed(bytes: usize, segment_size: usize) -> usize {
    bytes.div_ceil(segment_size)
}

/// Bounds-checked byte access to one segment.
pub(crate) trait SegmentIo {
    fn write_at(&self, offset: usize, src: &[u8]) -> Result<()>;
    fn read_at(&self, offset: usize, dst: &mut [u8]) -> Result<()>;
}

/// Copy `src` into the segmented stream starting at logical `offset`,
/// splitting at segment boundaries. Returns the number of bytes written.
pub(crate) fn copy_in<S: SegmentIo>(
    segments: &[S],
    segment_size: usize,
    offset: usize,
    src: &[u8],
) -> Result<usize> {
    let mut done = 0;
    while done < src.len() {
        let addr = translate(offset + done, segment_size);
        let seg = segments.get(addr.segment).ok_or_else(|| missing(addr.segment, segments.len()))?;
        let n = addr.remaining.min(src.len() - done);
        seg.write_at(addr.local_offset, &src[done..done + n])?;
        done += n;
    }
    Ok(done)
}

/// Fill `dst` from the segmented stream starting at logical `offset`.
/// Returns the number of bytes read.
pub(crate) fn copy_out<S: SegmentIo>(
    segments: &[S],
    segment_size: usize,
    offset: usize,
    dst: &mut [u8],
) -> Result<usize> {
    let mut done = 0;
    while done < dst.len() {
        let addr = translate(offset + done, segment_size);
        let seg = segments.get(addr.segment).ok_or_else(|| missing(addr.segment, segments.len()))?;
        let n = addr.remaining.min(dst.len() - done);
        seg.read_at(addr.local_offset, &mut dst[done..done + n])?;
        done += n;
    }
    Ok(done)
}

fn missing(index: usize, attached: usize) -> Error {
    Error::invalid(format!("segment {index} not attached ({attached} attached)"))
}
