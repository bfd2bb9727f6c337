// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-producer / single-consumer frame channel over System V shared memory.
//
// Resources of a channel, all keyed by ftok(id, project id):
//   0x01..=0xfd  payload segments, all `segment_size` bytes
//   0xfe         control segment (see wire::ControlBlock)
//   0xff         semaphore set (see sync_guard)
//
// The producer creates everything exclusively and removes it on drop. The
// consumer attaches read-only and discovers segments as the payload grows.
// At most one published payload is in flight; a second write waits until
// the consumer has claimed the first.

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::frame::FrameSet;
use crate::segment::{Segment, CONTROL_PROJ_ID, MAX_PAYLOAD_SEGMENTS};
use crate::segment_map::segments_needed;
use crate::slot_registry::{ChannelSlotRegistry, SlotLease};
use crate::sync_guard::{ChannelCloser, Gate, SyncGuard};
use crate::wire::{self, ControlBlock, CONTROL_BLOCK_LEN};

/// Which end of a channel this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

/// One endpoint of a shared memory frame channel.
///
/// Field order is drop order: payload segments, control segment, semaphore
/// set, then the registry slot.
pub struct SharedChannel {
    id: String,
    role: Role,
    max_segment_size: usize,
    /// 0 until the first payload segment exists.
    segment_size: usize,
    segments: Vec<Segment>,
    control: Segment,
    guard: SyncGuard,
    _lease: Option<SlotLease>,
}

impl SharedChannel {
    /// Lease a slot from `registry` and create a producer on it.
    ///
    /// Fails with `AlreadyExists` if resources for that slot survive from an
    /// earlier producer; see [`SharedChannel::clear_storage`].
    pub fn create_producer(registry: &ChannelSlotRegistry, config: &ChannelConfig) -> Result<Self> {
        check_config(config)?;
        let lease = registry.allocate()?;
        let id = lease.path().to_string();
        let guard = SyncGuard::create(&id)?;
        let control = Segment::create(&id, CONTROL_PROJ_ID, CONTROL_BLOCK_LEN)?;
        tracing::info!(%id, slot = lease.index(), "producer channel created");
        Ok(Self {
            id,
            role: Role::Producer,
            max_segment_size: config.max_segment_size,
            segment_size: 0,
            segments: Vec::new(),
            control,
            guard,
            _lease: Some(lease),
        })
    }

    /// Attach to the producer channel `id`.
    ///
    /// Returns `TransientNotReady` if the producer does not exist yet.
    pub fn open_consumer(id: &str, config: &ChannelConfig) -> Result<Self> {
        check_config(config)?;
        let guard = SyncGuard::open(id)?;
        let control = Segment::open(id, CONTROL_PROJ_ID, true)?;
        if control.len() < CONTROL_BLOCK_LEN {
            return Err(Error::invalid(format!(
                "control segment of {id} is {} bytes, expected {CONTROL_BLOCK_LEN}",
                control.len()
            )));
        }
        tracing::info!(%id, "consumer channel attached");
        Ok(Self {
            id: id.to_string(),
            role: Role::Consumer,
            max_segment_size: config.max_segment_size,
            segment_size: 0,
            segments: Vec::new(),
            control,
            guard,
            _lease: None,
        })
    }

    /// Channel id: the key-source path consumers pass to `open_consumer`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Payload segment size, or 0 before the first payload.
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Number of payload segments this endpoint has created or attached.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Whether a published payload is waiting for the consumer.
    pub fn has_pending(&self) -> Result<bool> {
        self.guard.has_pending()
    }

    /// Handle that tears the channel down from another thread, failing a
    /// blocked `write` or `read` with `Error::Closed`.
    pub fn closer(&self) -> ChannelCloser {
        self.guard.closer()
    }

    /// Publish `frames`. Blocks while the previous payload is unclaimed.
    ///
    /// If segment allocation fails the segments created by this call are
    /// removed again and the channel stays usable.
    pub fn write(&mut self, frames: &FrameSet) -> Result<()> {
        if self.role != Role::Producer {
            return Err(Error::invalid(format!("write on consumer channel {}", self.id)));
        }
        let needed = wire::payload_len(frames);
        let total = u32::try_from(needed)
            .map_err(|_| Error::invalid(format!("payload of {needed} bytes exceeds u32")))?;
        let segment_size = if self.segments.is_empty() {
            self.max_segment_size.min(needed)
        } else {
            self.segment_size
        };
        let count = segments_needed(needed, segment_size);
        if count > MAX_PAYLOAD_SEGMENTS {
            return Err(Error::ResourceExhaustion(format!(
                "payload of {needed} bytes needs {count} segments of {segment_size} bytes, \
                 at most {MAX_PAYLOAD_SEGMENTS} available"
            )));
        }

        // Drain first so the control gate is never held while waiting on
        // the consumer.
        self.guard.wait_drained()?;
        let control = self.guard.acquire(Gate::Control)?;
        grow_segments(&self.id, Role::Producer, &mut self.segments, count, segment_size)?;
        self.segment_size = segment_size;
        ControlBlock {
            frame_number: frames.frame_number(),
            total_bytes: total,
        }
        .write_to(&self.control)?;
        let data = self.guard.acquire_for_publish()?;
        control.release()?;

        wire::encode_payload(&self.segments, segment_size, frames)?;
        data.publish()?;
        tracing::trace!(
            id = %self.id,
            frame = frames.frame_number(),
            bytes = needed,
            segments = count,
            "published frame"
        );
        Ok(())
    }

    /// Take the waiting payload, if any. `Ok(None)` means nothing has been
    /// published since the last read, or the producer's segments are not
    /// all visible yet.
    pub fn read(&mut self) -> Result<Option<FrameSet>> {
        if self.role != Role::Consumer {
            return Err(Error::invalid(format!("read on producer channel {}", self.id)));
        }
        let control = self.guard.acquire(Gate::Control)?;
        let block = ControlBlock::read_from(&self.control)?;
        if block.total_bytes == 0 {
            return Ok(None);
        }

        if self.segments.is_empty() {
            // The first segment's size is the producer's segment size.
            match Segment::open(&self.id, 1, true) {
                Ok(first) => {
                    if first.is_empty() {
                        return Err(Error::invalid(format!("segment 1 of {} is empty", self.id)));
                    }
                    self.segment_size = first.len();
                    self.segments.push(first);
                }
                Err(e) if e.is_not_ready() => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        let count = segments_needed(block.total_bytes as usize, self.segment_size);
        if count > MAX_PAYLOAD_SEGMENTS {
            return Err(Error::invalid(format!(
                "control block announces {} bytes, more than {MAX_PAYLOAD_SEGMENTS} segments hold",
                block.total_bytes
            )));
        }
        match grow_segments(&self.id, Role::Consumer, &mut self.segments, count, self.segment_size) {
            Ok(()) => {}
            Err(e) if e.is_not_ready() => return Ok(None),
            Err(e) => return Err(e),
        }

        let Some(data) = self.guard.try_claim_payload()? else {
            return Ok(None);
        };
        control.release()?;

        let decoded = wire::decode_payload(&self.segments, self.segment_size, block);
        data.release()?;
        let frames = decoded?;
        tracing::trace!(id = %self.id, frame = frames.frame_number(), "received frame");
        Ok(Some(frames))
    }

    /// Release this endpoint. A producer also removes the channel's OS
    /// resources and frees its registry slot.
    pub fn close(self) {
        drop(self);
    }

    /// Remove every OS resource of channel `id`. For cleaning up after a
    /// producer that exited without dropping its channel.
    pub fn clear_storage(id: &str) {
        SyncGuard::remove(id);
        Segment::remove(id, CONTROL_PROJ_ID);
        for proj in 1..=MAX_PAYLOAD_SEGMENTS as u8 {
            Segment::remove(id, proj);
        }
        tracing::debug!(%id, "cleared channel storage");
    }
}

impl Drop for SharedChannel {
    fn drop(&mut self) {
        tracing::debug!(
            id = %self.id,
            role = ?self.role,
            segments = self.segments.len(),
            "closing channel"
        );
    }
}

impl std::fmt::Debug for SharedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedChannel")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("segment_size", &self.segment_size)
            .field("segments", &self.segments.len())
            .finish()
    }
}

fn check_config(config: &ChannelConfig) -> Result<()> {
    if config.max_segment_size == 0 {
        return Err(Error::invalid("max_segment_size must be non-zero"));
    }
    Ok(())
}

/// Create (producer) or attach (consumer) payload segments until there are
/// `count`. A producer removes what it created here if any creation fails.
fn grow_segments(
    id: &str,
    role: Role,
    segments: &mut Vec<Segment>,
    count: usize,
    segment_size: usize,
) -> Result<()> {
    let before = segments.len();
    while segments.len() < count {
        let proj = (segments.len() + 1) as u8;
        let seg = match role {
            Role::Producer => Segment::create(id, proj, segment_size),
            Role::Consumer => Segment::open(id, proj, true).and_then(|s| {
                if s.len() == segment_size {
                    Ok(s)
                } else {
                    Err(Error::invalid(format!(
                        "segment {proj} of {id} is {} bytes, expected {segment_size}",
                        s.len()
                    )))
                }
            }),
        };
        match seg {
            Ok(s) => segments.push(s),
            Err(e) => {
                if role == Role::Producer {
                    tracing::warn!(%id, segment = proj, error = %e, "segment allocation failed");
                    segments.truncate(before);
                }
                return Err(e);
            }
        }
    }
    Ok(())
}
