// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A live stream: one capture thread feeding local subscribers through the
// frame cache and, optionally, a remote consumer through a shared channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::capture::{CaptureEngine, CaptureError};
use crate::channel::SharedChannel;
use crate::config::{ChannelConfig, StreamConfig};
use crate::error::{Error, Result};
use crate::events::{EventKind, EventSlot, StreamEvent};
use crate::frame::FrameSet;
use crate::frame_cache::FrameCache;
use crate::slot_registry::ChannelSlotRegistry;
use crate::subscriber::{SubscriberRegistry, Subscription};
use crate::sync_guard::ChannelCloser;

/// What `stop` does with the capture thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Wait for the thread to finish.
    Join,
    /// Let the thread finish on its own.
    Detach,
}

struct Shared {
    name: String,
    cache: FrameCache,
    subscribers: SubscriberRegistry,
    events: EventSlot,
    /// Held for the whole of a remote write, which may block on the consumer.
    remote: Mutex<Option<SharedChannel>>,
    /// Never held across a semaphore operation.
    remote_handle: Mutex<Option<RemoteHandle>>,
}

/// What host calls need of the remote channel without touching it.
struct RemoteHandle {
    id: String,
    closer: ChannelCloser,
}

/// One run of the capture thread. `active` is cleared by `stop` or by the
/// thread itself when the source fails.
struct Worker {
    handle: JoinHandle<()>,
    active: Arc<AtomicBool>,
}

/// A named stream of frames.
pub struct Stream {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Stream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                cache: FrameCache::new(),
                subscribers: SubscriberRegistry::new(),
                events: EventSlot::new(),
                remote: Mutex::new(None),
                remote_handle: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|w| w.active.load(Ordering::Acquire))
    }

    /// Start capturing from `engine` on a new thread. Does nothing if the
    /// stream is already running.
    pub fn start<E>(&self, engine: E, config: StreamConfig) -> Result<()>
    where
        E: CaptureEngine + 'static,
    {
        let mut worker = lock(&self.worker);
        if let Some(w) = worker.as_ref() {
            if w.active.load(Ordering::Acquire) {
                tracing::debug!(stream = %self.shared.name, "start ignored, already running");
                return Ok(());
            }
        }
        if let Some(previous) = worker.take() {
            // Ended on its own after a start failure or fatal error.
            if previous.handle.join().is_err() {
                tracing::error!(stream = %self.shared.name, "capture thread panicked");
            }
        }

        let active = Arc::new(AtomicBool::new(true));
        let shared = Arc::clone(&self.shared);
        let run = Arc::clone(&active);
        let handle = std::thread::Builder::new()
            .name(format!("capture-{}", self.shared.name))
            .spawn(move || capture_loop(shared, run, engine, config))
            .map_err(|e| {
                Error::from_os(format!("spawn capture thread for {}", self.shared.name), e)
            })?;
        *worker = Some(Worker { handle, active });
        Ok(())
    }

    /// Stop capturing. Subscribers are disconnected, cached frames dropped
    /// and the remote channel torn down before the thread is joined or
    /// detached.
    pub fn stop(&self, mode: Shutdown) {
        let worker = lock(&self.worker).take();
        if let Some(w) = worker.as_ref() {
            if w.active.swap(false, Ordering::AcqRel) {
                self.shared.events.emit(EventKind::StopRequested);
            }
        }
        self.shared.clear_subscribers();
        self.shared.teardown_remote();

        match (worker, mode) {
            (Some(w), Shutdown::Join) => {
                if w.handle.join().is_err() {
                    tracing::error!(stream = %self.shared.name, "capture thread panicked");
                }
            }
            (Some(_), Shutdown::Detach) => {
                tracing::debug!(stream = %self.shared.name, "capture thread detached");
            }
            (None, _) => {}
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.subscribers.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    /// Disconnect every subscriber and drop cached frames.
    pub fn clear_subscribers(&self) {
        self.shared.clear_subscribers();
    }

    /// Replace the event listener.
    pub fn listen_events(&self) -> Receiver<StreamEvent> {
        self.shared.events.listen()
    }

    pub fn remove_event_listener(&self) {
        self.shared.events.remove_listener();
    }

    /// Start publishing frames to a new producer channel and return its id.
    /// An existing remote channel is torn down first.
    pub fn enable_remote_stream(
        &self,
        registry: &ChannelSlotRegistry,
        config: &ChannelConfig,
    ) -> Result<String> {
        self.shared.teardown_remote();
        let channel = SharedChannel::create_producer(registry, config)?;
        let id = channel.id().to_string();
        let handle = RemoteHandle {
            id: id.clone(),
            closer: channel.closer(),
        };
        let mut remote = lock(&self.shared.remote);
        *lock(&self.shared.remote_handle) = Some(handle);
        *remote = Some(channel);
        tracing::info!(stream = %self.shared.name, %id, "remote stream enabled");
        Ok(id)
    }

    pub fn disable_remote_stream(&self) {
        self.shared.teardown_remote();
    }

    /// Id of the active remote channel. Does not wait for a remote write
    /// stalled on a slow consumer.
    pub fn remote_stream_id(&self) -> Option<String> {
        lock(&self.shared.remote_handle)
            .as_ref()
            .map(|h| h.id.clone())
    }

    /// Hand a completed frame to the remote channel and to subscribers.
    /// Called by the capture thread; hosts driving their own capture may
    /// call it directly.
    pub fn frame_produced(&self, frames: FrameSet) {
        self.shared.frame_produced(frames);
    }

    /// Frames still waiting for at least one subscriber.
    pub fn cached_frames(&self) -> usize {
        self.shared.cache.len()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.stop(Shutdown::Join);
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.shared.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Shared {
    fn frame_produced(&self, frames: FrameSet) {
        // Lock order: remote, then remote_handle.
        let failure = {
            let mut remote = lock(&self.remote);
            let written = remote.as_mut().map(|channel| channel.write(&frames));
            match written {
                Some(Err(e)) => {
                    // No handle left means teardown_remote is closing the
                    // channel on purpose.
                    let deliberate = lock(&self.remote_handle).take().is_none();
                    Some((e, deliberate, remote.take()))
                }
                _ => None,
            }
        };
        if let Some((e, deliberate, channel)) = failure {
            drop(channel);
            if deliberate {
                tracing::debug!(stream = %self.name, error = %e, "remote write ended by teardown");
            } else {
                tracing::warn!(stream = %self.name, error = %e, "remote stream failed");
                self.events.emit(EventKind::RemoteStreamFailed(e.to_string()));
            }
        }

        if !self.subscribers.is_empty() {
            let key = self.cache.insert(frames);
            self.subscribers.notify(&self.cache, key);
            self.cache.check_and_remove_if_unreferenced(key);
        }
    }

    fn clear_subscribers(&self) {
        self.subscribers.clear();
        self.cache.clear();
    }

    /// Remove the semaphore set first so a write blocked on the consumer
    /// fails and gives up the channel lock.
    fn teardown_remote(&self) {
        let handle = lock(&self.remote_handle).take();
        if let Some(handle) = handle {
            handle.closer.close();
        }
        let channel = lock(&self.remote).take();
        if let Some(channel) = channel {
            tracing::info!(stream = %self.name, id = %channel.id(), "remote stream disabled");
            channel.close();
        }
    }
}

fn capture_loop<E: CaptureEngine>(
    shared: Arc<Shared>,
    active: Arc<AtomicBool>,
    mut engine: E,
    config: StreamConfig,
) {
    let _clear = ClearOnExit(Arc::clone(&active));
    let name = shared.name.as_str();
    if let Err(e) = engine.start() {
        tracing::error!(stream = %name, error = %e, "capture start failed");
        active.store(false, Ordering::Release);
        shared.events.emit(EventKind::StartFailed);
        return;
    }
    shared.events.emit(EventKind::Started);
    tracing::info!(stream = %name, "capture started");

    let mut frame_number: u32 = 0;
    'capture: while active.load(Ordering::Acquire) {
        if let Err(e) = prepare_with_retry(&mut engine, &config) {
            tracing::error!(stream = %name, error = %e, "capture prepare failed");
            active.store(false, Ordering::Release);
            shared.events.emit(EventKind::FatalError);
            break;
        }
        loop {
            match engine.receive() {
                Ok(Some(mut planes)) => {
                    for plane in &mut planes {
                        plane.set_frame_number(frame_number);
                    }
                    match FrameSet::new(planes) {
                        Ok(frames) => shared.frame_produced(frames),
                        Err(e) => {
                            tracing::warn!(stream = %name, frame = frame_number, error = %e, "dropping malformed frame");
                        }
                    }
                    frame_number = frame_number.wrapping_add(1);
                }
                Ok(None) | Err(CaptureError::TryAgain) => break,
                Err(e) => {
                    tracing::error!(stream = %name, error = %e, "capture receive failed");
                    active.store(false, Ordering::Release);
                    shared.events.emit(EventKind::FatalError);
                    break 'capture;
                }
            }
        }
    }

    engine.stop();
    shared.events.emit(EventKind::Stopped);
    tracing::info!(stream = %name, frames = frame_number, "capture stopped");
}

/// Marks the run inactive however the capture thread exits, panics included.
struct ClearOnExit(Arc<AtomicBool>);

impl Drop for ClearOnExit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Call `prepare`, retrying `TryAgain` up to `max_retries` times.
fn prepare_with_retry<E: CaptureEngine>(
    engine: &mut E,
    config: &StreamConfig,
) -> std::result::Result<(), CaptureError> {
    let mut retries = 0u32;
    loop {
        match engine.prepare() {
            Err(CaptureError::TryAgain) if retries < config.max_retries => {
                std::thread::sleep(config.retry_interval);
                retries += 1;
            }
            other => return other,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
