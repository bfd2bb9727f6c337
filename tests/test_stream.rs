// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Stream lifecycle, local delivery and remote publishing.

use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use framepipe::{
    CaptureEngine, CaptureError, EventKind, FrameBuffer, FrameSet, Shutdown, Stream,
    StreamConfig, StreamEvent, TestPattern,
};

const WAIT: Duration = Duration::from_secs(5);

fn next_event(rx: &Receiver<StreamEvent>) -> EventKind {
    rx.recv_timeout(WAIT).expect("event").kind
}

/// Emits `total` two-plane frames, one per `prepare`.
struct Counted {
    total: u32,
    sent: u32,
    ready: bool,
}

impl Counted {
    fn new(total: u32) -> Self {
        Self { total, sent: 0, ready: false }
    }
}

impl CaptureEngine for Counted {
    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), CaptureError> {
        if self.sent < self.total {
            self.ready = true;
        } else {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Vec<FrameBuffer>>, CaptureError> {
        if !self.ready {
            return Ok(None);
        }
        self.ready = false;
        self.sent += 1;
        Ok(Some(vec![
            FrameBuffer::from_vec(vec![1; 16], 4, 4, 999),
            FrameBuffer::from_vec(vec![2; 8], 4, 2, 999),
        ]))
    }

    fn stop(&mut self) {}
}

struct NeverReady;

impl CaptureEngine for NeverReady {
    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }
    fn prepare(&mut self) -> Result<(), CaptureError> {
        Err(CaptureError::TryAgain)
    }
    fn receive(&mut self) -> Result<Option<Vec<FrameBuffer>>, CaptureError> {
        Ok(None)
    }
    fn stop(&mut self) {}
}

struct NoDevice;

impl CaptureEngine for NoDevice {
    fn start(&mut self) -> Result<(), CaptureError> {
        Err(CaptureError::Failed("no such device".into()))
    }
    fn prepare(&mut self) -> Result<(), CaptureError> {
        unreachable!()
    }
    fn receive(&mut self) -> Result<Option<Vec<FrameBuffer>>, CaptureError> {
        unreachable!()
    }
    fn stop(&mut self) {}
}

struct PanicsOnStart;

impl CaptureEngine for PanicsOnStart {
    fn start(&mut self) -> Result<(), CaptureError> {
        panic!("capture backend crashed");
    }
    fn prepare(&mut self) -> Result<(), CaptureError> {
        unreachable!()
    }
    fn receive(&mut self) -> Result<Option<Vec<FrameBuffer>>, CaptureError> {
        unreachable!()
    }
    fn stop(&mut self) {}
}

#[test]
fn lifecycle_events_in_order() {
    let stream = Stream::new("lifecycle");
    let events = stream.listen_events();
    let sub = stream.subscribe();

    stream
        .start(TestPattern::new(16, 16, 200), StreamConfig::default())
        .unwrap();
    assert_eq!(next_event(&events), EventKind::Started);
    assert!(stream.is_running());

    let frame = sub.recv_timeout(WAIT).expect("frame from test pattern");
    assert_eq!(frame.plane_count(), 1);
    assert_eq!(frame.planes()[0].byte_len(), 16 * 16 * 3);

    stream.stop(Shutdown::Join);
    assert!(!stream.is_running());
    assert_eq!(next_event(&events), EventKind::StopRequested);
    assert_eq!(next_event(&events), EventKind::Stopped);
    assert_eq!(stream.subscriber_count(), 0);
    assert_eq!(stream.cached_frames(), 0);
}

#[test]
fn frames_are_numbered_in_capture_order() {
    let stream = Stream::new("numbered");
    let sub = stream.subscribe();
    stream.start(Counted::new(5), StreamConfig::default()).unwrap();

    let numbers: Vec<u32> = (0..5)
        .map(|_| sub.recv_timeout(WAIT).expect("frame").frame_number())
        .collect();
    assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
    stream.stop(Shutdown::Join);
}

#[test]
fn retry_cap_turns_into_fatal_error() {
    let stream = Stream::new("never-ready");
    let events = stream.listen_events();
    let config = StreamConfig::default()
        .with_max_retries(5)
        .with_retry_interval(Duration::from_millis(1));
    stream.start(NeverReady, config).unwrap();

    assert_eq!(next_event(&events), EventKind::Started);
    assert_eq!(next_event(&events), EventKind::FatalError);
    assert_eq!(next_event(&events), EventKind::Stopped);
    assert!(!stream.is_running());
    // Nothing is running, so stop does not request anything.
    stream.stop(Shutdown::Join);
    assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn start_failure_is_reported() {
    let stream = Stream::new("no-device");
    let events = stream.listen_events();
    stream.start(NoDevice, StreamConfig::default()).unwrap();
    assert_eq!(next_event(&events), EventKind::StartFailed);

    // The stream can be started again afterwards.
    stream.start(Counted::new(1), StreamConfig::default()).unwrap();
    assert_eq!(next_event(&events), EventKind::Started);
    stream.stop(Shutdown::Detach);
}

#[test]
fn panicked_capture_thread_allows_restart() {
    let stream = Stream::new("panicky");
    let events = stream.listen_events();
    stream.start(PanicsOnStart, StreamConfig::default()).unwrap();

    let deadline = Instant::now() + WAIT;
    while stream.is_running() {
        assert!(Instant::now() < deadline, "panicked thread still marked running");
        std::thread::sleep(Duration::from_millis(1));
    }

    // The restart joins the panicked thread instead of ignoring the call.
    stream.start(Counted::new(1), StreamConfig::default()).unwrap();
    assert_eq!(next_event(&events), EventKind::Started);
    stream.stop(Shutdown::Join);
}

#[test]
fn second_start_is_ignored() {
    let stream = Stream::new("twice");
    let events = stream.listen_events();
    stream.start(Counted::new(0), StreamConfig::default()).unwrap();
    stream.start(Counted::new(0), StreamConfig::default()).unwrap();
    assert_eq!(next_event(&events), EventKind::Started);
    stream.stop(Shutdown::Join);
    assert_eq!(next_event(&events), EventKind::StopRequested);
    assert_eq!(next_event(&events), EventKind::Stopped);
    assert!(events.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn host_driven_frames_reach_subscribers() {
    let stream = Stream::new("host");
    let a = stream.subscribe();
    let b = stream.subscribe();
    let frames = FrameSet::new(vec![FrameBuffer::from_vec(vec![5; 4], 2, 2, 11)]).unwrap();

    stream.frame_produced(frames.clone());
    assert_eq!(stream.cached_frames(), 1);
    assert!(a.try_recv().unwrap().ptr_eq(&frames));
    assert!(b.try_recv().unwrap().ptr_eq(&frames));
    assert_eq!(stream.cached_frames(), 0);

    drop(a);
    drop(b);
    stream.frame_produced(frames);
    assert_eq!(stream.cached_frames(), 0);
}

#[test]
fn clear_subscribers_drops_pending_frames() {
    let stream = Stream::new("clear");
    let sub = stream.subscribe();
    let start = Instant::now();
    for n in 0..3 {
        stream.frame_produced(
            FrameSet::new(vec![FrameBuffer::from_vec(vec![0; 4], 2, 2, n)]).unwrap(),
        );
    }
    assert_eq!(stream.cached_frames(), 3);
    stream.clear_subscribers();
    assert_eq!(stream.cached_frames(), 0);
    assert!(sub.recv().is_none());
    assert!(start.elapsed() < WAIT);
}

#[cfg(unix)]
mod remote {
    use super::*;
    use framepipe::{ChannelConfig, ChannelSlotRegistry, Error, SharedChannel};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use tempfile::NamedTempFile;

    fn remote_config() -> (NamedTempFile, ChannelConfig, ChannelSlotRegistry) {
        let file = NamedTempFile::new().expect("temp key source");
        let path = file.path().to_string_lossy().into_owned();
        SharedChannel::clear_storage(&path);
        let config = ChannelConfig::default().with_key_sources([path]);
        let registry = ChannelSlotRegistry::from_config(&config);
        (file, config, registry)
    }

    fn read_within(consumer: &mut SharedChannel) -> FrameSet {
        let deadline = Instant::now() + WAIT;
        loop {
            if let Some(f) = consumer.read().expect("read") {
                return f;
            }
            assert!(Instant::now() < deadline, "no remote frame");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn stream_publishes_to_remote_consumer() {
        let (_f, config, registry) = remote_config();
        let stream = Stream::new("remote");
        let id = stream.enable_remote_stream(&registry, &config).unwrap();
        assert_eq!(stream.remote_stream_id().as_deref(), Some(id.as_str()));

        let mut consumer = SharedChannel::open_consumer(&id, &config).unwrap();
        stream
            .start(TestPattern::new(32, 20, 100), StreamConfig::default())
            .unwrap();

        let first = read_within(&mut consumer);
        let second = read_within(&mut consumer);
        assert_eq!(first.planes()[0].byte_len(), 32 * 20 * 3);
        assert_eq!(first.planes()[0].height(), 20);
        assert!(second.frame_number() > first.frame_number());

        // The capture thread may be blocked on the unread next frame.
        stream.stop(Shutdown::Join);
        assert!(stream.remote_stream_id().is_none());
        assert_eq!(registry.in_use(), 0);
        assert!(matches!(consumer.read(), Err(Error::Closed(_))));
    }

    #[test]
    fn remote_failure_disables_channel_and_notifies() {
        let (_f, config, registry) = remote_config();
        let stream = Stream::new("remote-fail");
        let events = stream.listen_events();
        let sub = stream.subscribe();
        let id = stream.enable_remote_stream(&registry, &config).unwrap();

        // Someone removes the channel's resources underneath the producer.
        SharedChannel::clear_storage(&id);
        let frames = FrameSet::new(vec![FrameBuffer::from_vec(vec![1; 4], 2, 2, 0)]).unwrap();
        stream.frame_produced(frames);

        match next_event(&events) {
            EventKind::RemoteStreamFailed(reason) => assert!(!reason.is_empty()),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(stream.remote_stream_id().is_none());
        assert_eq!(registry.in_use(), 0);
        // Local delivery still happened.
        assert!(sub.try_recv().is_some());
    }

    fn small_frame(n: u32) -> FrameSet {
        FrameSet::new(vec![FrameBuffer::from_vec(vec![3; 16], 4, 4, n)]).unwrap()
    }

    #[test]
    fn remote_id_answers_while_write_waits_for_consumer() {
        let (_f, config, registry) = remote_config();
        let stream = Arc::new(Stream::new("backpressured"));
        let id = stream.enable_remote_stream(&registry, &config).unwrap();

        // Nobody reads, so the second write blocks until teardown.
        stream.frame_produced(small_frame(0));
        let writer = {
            let stream = Arc::clone(&stream);
            thread::spawn(move || stream.frame_produced(small_frame(1)))
        };
        thread::sleep(Duration::from_millis(100));
        assert!(!writer.is_finished());

        let (tx, rx) = mpsc::channel();
        let reader = {
            let stream = Arc::clone(&stream);
            thread::spawn(move || {
                let _ = tx.send(stream.remote_stream_id());
            })
        };
        let got = rx.recv_timeout(WAIT).expect("remote_stream_id blocked");
        assert_eq!(got.as_deref(), Some(id.as_str()));
        reader.join().unwrap();

        stream.disable_remote_stream();
        writer.join().unwrap();
        assert!(stream.remote_stream_id().is_none());
        assert_eq!(registry.in_use(), 0);
    }

    #[test]
    fn enabling_again_replaces_the_channel() {
        let (_f, config, registry) = remote_config();
        let stream = Stream::new("re-enable");
        let first = stream.enable_remote_stream(&registry, &config).unwrap();
        let second = stream.enable_remote_stream(&registry, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.in_use(), 1);
        stream.disable_remote_stream();
        assert_eq!(registry.in_use(), 0);
        assert!(SharedChannel::open_consumer(&first, &config)
            .unwrap_err()
            .is_not_ready());
    }
}
