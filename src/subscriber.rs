// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Local frame subscribers. Each subscriber owns an unbounded FIFO of
// delivery tokens; the producing thread never blocks on a slow subscriber.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::frame::FrameSet;
use crate::frame_cache::{DeliveryToken, FrameCache};

/// The live delivery targets of one stream.
#[derive(Default)]
pub struct SubscriberRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    senders: Vec<(u64, Sender<DeliveryToken>)>,
    next_id: u64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. It receives every frame offered after this call.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.senders.push((id, tx));
        Subscription { rx }
    }

    pub fn len(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().senders.is_empty()
    }

    /// Disconnect every subscriber. Their queued frames stay receivable.
    pub fn clear(&self) {
        self.lock().senders.clear();
    }

    /// Offer cache entry `key` to every subscriber. Subscribers whose
    /// queue is closed are dropped, and their reservation is released.
    /// Returns how many subscribers the frame was queued for.
    pub fn notify(&self, cache: &FrameCache, key: i32) -> usize {
        let targets = self.lock().senders.clone();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in &targets {
            let Some(token) = cache.reserve(key) else {
                break;
            };
            match tx.send(token) {
                Ok(()) => delivered += 1,
                // The returned token drops here and gives its share back.
                Err(_) => closed.push(*id),
            }
        }
        if !closed.is_empty() {
            let mut inner = self.lock();
            inner.senders.retain(|(id, _)| !closed.contains(id));
            tracing::debug!(
                pruned = closed.len(),
                remaining = inner.senders.len(),
                "dropped closed subscribers"
            );
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

/// Receiving end of one subscriber.
///
/// Frames whose cache entry was cleared before they were received are
/// skipped.
pub struct Subscription {
    rx: Receiver<DeliveryToken>,
}

impl Subscription {
    /// Block for the next frame. `None` once the stream has dropped this
    /// subscriber and the queue is empty.
    pub fn recv(&self) -> Option<FrameSet> {
        loop {
            let token = self.rx.recv().ok()?;
            if let Some(frames) = token.redeem() {
                return Some(frames);
            }
        }
    }

    /// Next frame if one is queued.
    pub fn try_recv(&self) -> Option<FrameSet> {
        loop {
            match self.rx.try_recv() {
                Ok(token) => {
                    if let Some(frames) = token.redeem() {
                        return Some(frames);
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
            }
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<FrameSet> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(token) => {
                    if let Some(frames) = token.redeem() {
                        return Some(frames);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Release the share of every frame still queued.
        let dropped = self.rx.try_iter().count();
        if dropped > 0 {
            tracing::trace!(dropped, "subscription dropped with queued frames");
        }
    }
}
