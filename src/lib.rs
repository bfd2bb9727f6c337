// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Live multi-plane video frame delivery.
//
// Two halves:
// - `SharedChannel` moves frames between unrelated processes through
//   System V shared memory segments and a semaphore handshake.
// - `Stream` hands each captured frame to any number of in-process
//   subscribers through a reference-counted `FrameCache`, and optionally
//   publishes it to a `SharedChannel`.

mod platform;

pub mod config;
pub mod error;
pub mod frame;
pub mod segment_map;
pub mod wire;

mod segment;
pub use segment::Segment;

mod sync_guard;
pub use sync_guard::{ChannelCloser, Gate, GateGuard, PublishGuard, SyncGuard};

mod slot_registry;
pub use slot_registry::{ChannelSlotRegistry, SlotLease};

mod channel;
pub use channel::{Role, SharedChannel};

mod frame_cache;
pub use frame_cache::{DeliveryToken, FrameCache};

mod subscriber;
pub use subscriber::{SubscriberRegistry, Subscription};

mod events;
pub use events::{EventKind, EventSlot, StreamEvent};

mod capture;
pub use capture::{CaptureEngine, CaptureError, TestPattern, VideoMode};

mod stream;
pub use stream::{Shutdown, Stream};

pub use config::{ChannelConfig, StreamConfig};
pub use error::{Error, Result};
pub use frame::{FrameBuffer, FrameSet, MAX_PLANES};
