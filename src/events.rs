// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Stream lifecycle events, delivered to at most one listener.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Started,
    Stopped,
    StartFailed,
    StopRequested,
    FatalError,
    /// The shared memory channel failed and was disabled.
    RemoteStreamFailed(String),
}

impl EventKind {
    /// Wire-style name, e.g. `"stop-requested"`.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Stopped => "stopped",
            EventKind::StartFailed => "start-failed",
            EventKind::StopRequested => "stop-requested",
            EventKind::FatalError => "fatal-error",
            EventKind::RemoteStreamFailed(_) => "remote-stream-failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub kind: EventKind,
    /// Wall-clock time of emission, microseconds since the Unix epoch.
    pub timestamp_us: u64,
}

impl StreamEvent {
    pub fn now(kind: EventKind) -> Self {
        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self { kind, timestamp_us }
    }
}

/// Single-listener mailbox. Setting a new listener replaces the old one,
/// whose receiver then disconnects.
#[derive(Debug, Default)]
pub struct EventSlot {
    listener: Mutex<Option<Sender<StreamEvent>>>,
}

impl EventSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new listener and return its receiving end.
    pub fn listen(&self) -> Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel();
        *self.lock() = Some(tx);
        rx
    }

    pub fn remove_listener(&self) {
        self.lock().take();
    }

    pub fn has_listener(&self) -> bool {
        self.lock().is_some()
    }

    /// Deliver `kind` to the listener, if any. A listener whose receiver is
    /// gone is removed. Returns whether the event was queued.
    pub fn emit(&self, kind: EventKind) -> bool {
        let event = StreamEvent::now(kind);
        tracing::debug!(event = event.kind.name(), ts = event.timestamp_us, "stream event");
        let mut slot = self.lock();
        let Some(tx) = slot.as_ref() else {
            return false;
        };
        if tx.send(event).is_err() {
            *slot = None;
            return false;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Option<Sender<StreamEvent>>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
