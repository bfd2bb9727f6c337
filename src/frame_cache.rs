// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Keeps a produced frame alive until every subscriber it was offered to has
// taken it or given up on it.
//
// Entry lifecycle: insert (0 pending) -> reserve x N -> redeem/drop x N -> removed.
// An entry nobody reserved is removed by check_and_remove_if_unreferenced.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::frame::FrameSet;

struct Entry {
    frames: FrameSet,
    pending: u32,
    serial: u64,
}

#[derive(Default)]
struct Table {
    entries: HashMap<i32, Entry>,
    next_serial: u64,
}

/// Per-stream table of frames awaiting delivery. Cloning shares the table.
#[derive(Clone, Default)]
pub struct FrameCache {
    table: Arc<Mutex<Table>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frames` under the smallest key not currently live.
    pub fn insert(&self, frames: FrameSet) -> i32 {
        let mut t = self.lock();
        let key = (0..=i32::MAX)
            .find(|k| !t.entries.contains_key(k))
            .unwrap_or(i32::MAX);
        let serial = t.next_serial;
        t.next_serial += 1;
        t.entries.insert(key, Entry { frames, pending: 0, serial });
        key
    }

    /// Reserve one delivery of entry `key`. `None` if the entry is gone.
    pub fn reserve(&self, key: i32) -> Option<DeliveryToken> {
        let mut t = self.lock();
        let entry = t.entries.get_mut(&key)?;
        entry.pending += 1;
        Some(DeliveryToken {
            table: Arc::downgrade(&self.table),
            key,
            serial: entry.serial,
            redeemed: false,
        })
    }

    /// Take one share of entry `key`. `None` if it was already removed.
    pub fn consume(&self, key: i32) -> Option<FrameSet> {
        take_share(&self.table, key, None, true)
    }

    /// Remove entry `key` if nothing reserved it. Returns whether it was
    /// removed.
    pub fn check_and_remove_if_unreferenced(&self, key: i32) -> bool {
        let removed = {
            let mut t = self.lock();
            match t.entries.get(&key) {
                Some(e) if e.pending == 0 => t.entries.remove(&key),
                _ => None,
            }
        };
        removed.is_some()
    }

    /// Drop every entry. Outstanding tokens redeem to `None`.
    pub fn clear(&self) {
        let drained: Vec<Entry> = {
            let mut t = self.lock();
            t.entries.drain().map(|(_, e)| e).collect()
        };
        if !drained.is_empty() {
            tracing::debug!(entries = drained.len(), "frame cache cleared");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Outstanding reservations of entry `key`.
    pub fn pending(&self, key: i32) -> Option<u32> {
        self.lock().entries.get(&key).map(|e| e.pending)
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        lock_table(&self.table)
    }
}

impl std::fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCache").field("entries", &self.len()).finish()
    }
}

fn lock_table(table: &Mutex<Table>) -> MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Decrement entry `key`, removing it at zero. With `serial`, only an entry
/// of that generation is touched. The frame memory of a removed entry is
/// released after the lock.
fn take_share(
    table: &Mutex<Table>,
    key: i32,
    serial: Option<u64>,
    want_frames: bool,
) -> Option<FrameSet> {
    let (frames, removed) = {
        let mut t = lock_table(table);
        let entry = t.entries.get_mut(&key)?;
        if serial.is_some_and(|s| s != entry.serial) {
            return None;
        }
        entry.pending = entry.pending.saturating_sub(1);
        let frames = want_frames.then(|| entry.frames.clone());
        let removed = if entry.pending == 0 {
            t.entries.remove(&key)
        } else {
            None
        };
        (frames, removed)
    };
    drop(removed);
    frames
}

/// One reserved delivery of a cached frame.
///
/// Redeem it to get the frame. Dropping it unredeemed gives the share back,
/// so a token lost in a closed queue never pins the frame.
#[must_use = "dropping a token releases the reservation"]
pub struct DeliveryToken {
    table: Weak<Mutex<Table>>,
    key: i32,
    serial: u64,
    redeemed: bool,
}

impl DeliveryToken {
    pub fn key(&self) -> i32 {
        self.key
    }

    /// Take the frame and release this share. `None` if the cache was
    /// cleared or dropped in the meantime.
    pub fn redeem(mut self) -> Option<FrameSet> {
        self.redeemed = true;
        let table = self.table.upgrade()?;
        take_share(&table, self.key, Some(self.serial), true)
    }
}

impl Drop for DeliveryToken {
    fn drop(&mut self) {
        if self.redeemed {
            return;
        }
        if let Some(table) = self.table.upgrade() {
            take_share(&table, self.key, Some(self.serial), false);
        }
    }
}

impl std::fmt::Debug for DeliveryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryToken")
            .field("key", &self.key)
            .field("redeemed", &self.redeemed)
            .finish()
    }
}
