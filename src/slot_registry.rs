// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bounded pool of key-source paths for concurrently active producers.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::ChannelConfig;
use crate::error::{Error, Result};

/// Hands out key-source paths, one per live producer.
///
/// Cloning shares the same pool.
#[derive(Debug, Clone)]
pub struct ChannelSlotRegistry {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    paths: Vec<String>,
    in_use: Mutex<Vec<bool>>,
}

impl ChannelSlotRegistry {
    /// Registry over an explicit list of existing file paths.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        let in_use = Mutex::new(vec![false; paths.len()]);
        Self {
            shared: Arc::new(Shared { paths, in_use }),
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(config.key_sources.iter().cloned())
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.shared.paths.len()
    }

    /// Number of slots currently leased.
    pub fn in_use(&self) -> usize {
        self.lock().iter().filter(|&&used| used).count()
    }

    /// Lease the smallest free slot.
    pub fn allocate(&self) -> Result<SlotLease> {
        let mut in_use = self.lock();
        let index = in_use.iter().position(|&used| !used).ok_or_else(|| {
            Error::ResourceExhaustion(format!(
                "all {} channel slots are in use",
                self.shared.paths.len()
            ))
        })?;
        in_use[index] = true;
        tracing::trace!(slot = index, "allocated channel slot");
        Ok(SlotLease {
            registry: self.clone(),
            index,
        })
    }

    fn release(&self, index: usize) {
        if let Some(slot) = self.lock().get_mut(index) {
            *slot = false;
        }
        tracing::trace!(slot = index, "released channel slot");
    }

    fn lock(&self) -> MutexGuard<'_, Vec<bool>> {
        // A panic while holding this lock cannot leave the flags torn.
        self.shared
            .in_use
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ChannelSlotRegistry {
    fn default() -> Self {
        Self::from_config(&ChannelConfig::default())
    }
}

/// A leased slot. The slot is freed exactly once, when the lease drops.
#[derive(Debug)]
pub struct SlotLease {
    registry: ChannelSlotRegistry,
    index: usize,
}

impl SlotLease {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The key-source path, which doubles as the channel id.
    pub fn path(&self) -> &str {
        &self.registry.shared.paths[self.index]
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.registry.release(self.index);
    }
}
