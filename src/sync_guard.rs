// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Write/read handshake over one System V semaphore set.
//
// Semaphores:
//   CONTROL  binary gate over the control block and segment layout
//   DATA     binary gate over the payload bytes
//   PENDING  1 while a published payload has not been claimed by a reader
//
// Writer: wait_drained -> CONTROL -> DATA(+PENDING==0) -> release CONTROL
//         -> copy -> publish (DATA-1, PENDING+1 in one call)
// Reader: CONTROL -> claim (PENDING-1, DATA 0->1, non-blocking)
//         -> release CONTROL -> copy -> release DATA

use std::io;

use crate::error::{Error, Result};
use crate::platform::{ipc_key, PlatformSemaphores, SemOp};
use crate::segment::SEMAPHORE_PROJ_ID;

const PENDING: u16 = 2;
const SEM_COUNT: u16 = 3;
const SEM_PERMS: u32 = 0o666;

/// One of the two binary gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Control = 0,
    Data = 1,
}

impl Gate {
    fn num(self) -> u16 {
        self as u16
    }

    fn name(self) -> &'static str {
        match self {
            Gate::Control => "control",
            Gate::Data => "data",
        }
    }
}

/// The semaphore set of one channel.
#[derive(Debug)]
pub struct SyncGuard {
    inner: PlatformSemaphores,
    path: String,
}

impl SyncGuard {
    /// Create the set for channel `path` exclusively. All semaphores start
    /// at 0 (both gates free, nothing pending). The set is removed when the
    /// returned guard is dropped.
    pub fn create(path: &str) -> Result<Self> {
        let key = ipc_key(path, SEMAPHORE_PROJ_ID)
            .map_err(|e| Error::from_os(format!("ftok semaphore set of {path}"), e))?;
        let inner = PlatformSemaphores::create(key, SEM_COUNT, SEM_PERMS)
            .map_err(|e| Error::from_os(format!("semget create (key {key:#x})"), e))?;
        tracing::debug!(%path, id = inner.id(), "created semaphore set");
        Ok(Self {
            inner,
            path: path.to_string(),
        })
    }

    /// Open the set a producer created for `path`.
    pub fn open(path: &str) -> Result<Self> {
        let key = ipc_key(path, SEMAPHORE_PROJ_ID)
            .map_err(|e| Error::from_os(format!("ftok semaphore set of {path}"), e))?;
        let inner = PlatformSemaphores::open(key)
            .map_err(|e| Error::from_os(format!("semget open (key {key:#x})"), e))?;
        Ok(Self {
            inner,
            path: path.to_string(),
        })
    }

    /// Remove the set for `path` if one exists.
    pub fn remove(path: &str) {
        if let Ok(key) = ipc_key(path, SEMAPHORE_PROJ_ID) {
            PlatformSemaphores::remove_by_key(key);
        }
    }

    /// Block until `gate` is free, then take it.
    pub fn acquire(&self, gate: Gate) -> Result<GateGuard<'_>> {
        self.apply(gate.name(), &[(gate.num(), 0, false), (gate.num(), 1, false)])?;
        Ok(GateGuard::new(self, gate))
    }

    /// Take `gate` if it is free right now.
    pub fn try_acquire(&self, gate: Gate) -> Result<Option<GateGuard<'_>>> {
        let took = self.apply(gate.name(), &[(gate.num(), 0, true), (gate.num(), 1, true)])?;
        Ok(took.then(|| GateGuard::new(self, gate)))
    }

    fn release(&self, gate: Gate) -> Result<()> {
        self.apply(gate.name(), &[(gate.num(), -1, false)])?;
        Ok(())
    }

    /// Block until no published payload is waiting for a reader.
    pub fn wait_drained(&self) -> Result<()> {
        self.apply("pending", &[(PENDING, 0, false)])?;
        Ok(())
    }

    /// Take the data gate for writing. Only succeeds once the previous
    /// payload has been claimed.
    pub fn acquire_for_publish(&self) -> Result<PublishGuard<'_>> {
        self.apply(
            "data",
            &[
                (PENDING, 0, false),
                (Gate::Data.num(), 0, false),
                (Gate::Data.num(), 1, false),
            ],
        )?;
        Ok(PublishGuard {
            guard: self,
            published: false,
        })
    }

    /// Claim a published payload and take the data gate, without blocking.
    /// `None` means no payload is waiting or a writer holds the gate.
    pub fn try_claim_payload(&self) -> Result<Option<GateGuard<'_>>> {
        let took = self.apply(
            "claim",
            &[
                (PENDING, -1, true),
                (Gate::Data.num(), 0, true),
                (Gate::Data.num(), 1, true),
            ],
        )?;
        Ok(took.then(|| GateGuard::new(self, Gate::Data)))
    }

    pub fn is_held(&self, gate: Gate) -> Result<bool> {
        Ok(self.value(gate.num())? != 0)
    }

    /// Whether a published payload is waiting for a reader.
    pub fn has_pending(&self) -> Result<bool> {
        Ok(self.value(PENDING)? != 0)
    }

    /// Handle that can remove this set from another thread.
    pub fn closer(&self) -> ChannelCloser {
        ChannelCloser {
            id: self.inner.id(),
            path: self.path.clone(),
        }
    }

    fn value(&self, num: u16) -> Result<i32> {
        self.inner
            .value(num)
            .map_err(|e| self.sem_error("semctl GETVAL", e))
    }

    fn apply(&self, what: &str, ops: &[SemOp]) -> Result<bool> {
        self.inner
            .apply(ops)
            .map_err(|e| self.sem_error(&format!("semop {what}"), e))
    }

    fn sem_error(&self, call: &str, err: io::Error) -> Error {
        // A removed set id is reported as EINVAL to later callers and as
        // EIDRM to callers already blocked on it.
        #[cfg(unix)]
        {
            if err.raw_os_error() == Some(libc::EINVAL) {
                return Error::Closed(format!("got EINVAL during {call} on {}", self.path));
            }
        }
        Error::from_os(format!("{call} on {}", self.path), err)
    }
}

/// Holds one gate; releases it when dropped.
#[must_use = "the gate is released when the guard is dropped"]
pub struct GateGuard<'a> {
    guard: &'a SyncGuard,
    gate: Gate,
    held: bool,
}

impl<'a> GateGuard<'a> {
    fn new(guard: &'a SyncGuard, gate: Gate) -> Self {
        Self {
            guard,
            gate,
            held: true,
        }
    }

    pub fn gate(&self) -> Gate {
        self.gate
    }

    /// Release now and report failure instead of ignoring it.
    pub fn release(mut self) -> Result<()> {
        self.held = false;
        self.guard.release(self.gate)
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.guard.release(self.gate) {
                tracing::warn!(gate = self.gate.name(), error = %e, "gate release failed");
            }
        }
    }
}

/// Holds the data gate for a writer. `publish` hands the payload to a
/// reader; dropping without publishing just frees the gate.
#[must_use = "the data gate is released when the guard is dropped"]
pub struct PublishGuard<'a> {
    guard: &'a SyncGuard,
    published: bool,
}

impl PublishGuard<'_> {
    pub fn publish(mut self) -> Result<()> {
        self.published = true;
        self.guard.apply(
            "publish",
            &[(Gate::Data.num(), -1, false), (PENDING, 1, false)],
        )?;
        Ok(())
    }
}

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            if let Err(e) = self.guard.release(Gate::Data) {
                tracing::warn!(error = %e, "data gate release failed");
            }
        }
    }
}

/// Removes a channel's semaphore set, failing every blocked peer with
/// `Error::Closed`. Only meaningful while the owning channel is alive.
#[derive(Debug, Clone)]
pub struct ChannelCloser {
    id: i32,
    path: String,
}

impl ChannelCloser {
    pub fn close(&self) {
        tracing::debug!(path = %self.path, id = self.id, "removing semaphore set");
        PlatformSemaphores::remove_by_id(self.id);
    }
}
