// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Frame sources driven by a stream's capture thread.

use std::time::{Duration, Instant};

use crate::frame::FrameBuffer;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The source has nothing yet; call again shortly.
    #[error("capture source not ready, try again")]
    TryAgain,
    #[error("capture failed: {0}")]
    Failed(String),
}

/// A source of captured frames.
///
/// The capture thread calls `start` once, then alternates `prepare` and
/// `receive` until the stream stops, then calls `stop`.
pub trait CaptureEngine: Send {
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Advance the source. `TryAgain` is retried after a short sleep.
    fn prepare(&mut self) -> Result<(), CaptureError>;

    /// Next completed frame's planes, or `None` once everything prepared so
    /// far has been handed out. Frame numbers are assigned by the stream.
    fn receive(&mut self) -> Result<Option<Vec<FrameBuffer>>, CaptureError>;

    fn stop(&mut self);
}

/// A capture resolution and frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoMode {
    pub const fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }
}

const TEST_PATTERN_MODES: [VideoMode; 6] = [
    VideoMode::new(1280, 720, 1),
    VideoMode::new(1280, 720, 10),
    VideoMode::new(1920, 1080, 1),
    VideoMode::new(1920, 1080, 10),
    VideoMode::new(3840, 2160, 1),
    VideoMode::new(3840, 2160, 10),
];

const RGB888_PIXEL: usize = 3;
const DOT_COLOR: [u8; 3] = [0x46, 0xb8, 0x4b];
const PACING_STEP: Duration = Duration::from_millis(10);

/// Synthetic RGB888 source: a row of up to three green dots on black that
/// grows by one dot per frame and wraps every four frames.
#[derive(Debug)]
pub struct TestPattern {
    width: u32,
    height: u32,
    interval: Duration,
    next_due: Option<Instant>,
    ready: bool,
    produced: u32,
}

impl TestPattern {
    /// `fps` of 0 is treated as 1.
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            interval: Duration::from_secs(1) / fps.max(1),
            next_due: None,
            ready: false,
            produced: 0,
        }
    }

    pub fn from_mode(mode: VideoMode) -> Self {
        Self::new(mode.width, mode.height, mode.fps)
    }

    /// Pixel format of every plane this source emits.
    pub fn format(&self) -> &'static str {
        "rgb888"
    }

    /// Modes advertised to hosts picking a resolution.
    pub fn video_modes() -> &'static [VideoMode] {
        &TEST_PATTERN_MODES
    }

    /// Frames handed out so far.
    pub fn produced(&self) -> u32 {
        self.produced
    }

    /// Render the pattern for `phase` (0..=3, larger values clamp to 3).
    pub fn texture(phase: u32, width: u32, height: u32, frame_number: u32) -> FrameBuffer {
        let phase = phase.min(3) as i64;
        let (w, h) = (width as i64, height as i64);
        let h_frac = h / 5;
        let x_margin = (w - h) / 2;
        let mut data = vec![0u8; width as usize * height as usize * RGB888_PIXEL];

        if h_frac > 0 {
            for y in (2 * h_frac + 1)..=(3 * h_frac).min(h - 1) {
                for x in 0..w {
                    let xn = x - x_margin;
                    if xn < 0 || xn >= phase * 2 * h_frac || xn % (2 * h_frac) > h_frac {
                        continue;
                    }
                    let at = RGB888_PIXEL * (y * w + x) as usize;
                    data[at..at + RGB888_PIXEL].copy_from_slice(&DOT_COLOR);
                }
            }
        }
        FrameBuffer::from_vec(data, width, height, frame_number)
    }
}

impl CaptureEngine for TestPattern {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::Failed(format!(
                "invalid test pattern size {}x{}",
                self.width, self.height
            )));
        }
        self.next_due = Some(Instant::now() + self.interval);
        self.produced = 0;
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), CaptureError> {
        let due = self
            .next_due
            .ok_or_else(|| CaptureError::Failed("test pattern not started".into()))?;
        let now = Instant::now();
        if now < due {
            // Sleep in short steps so the stream can notice a stop request.
            std::thread::sleep((due - now).min(PACING_STEP));
        }
        if Instant::now() >= due {
            self.ready = true;
            self.next_due = Some(due + self.interval);
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Vec<FrameBuffer>>, CaptureError> {
        if !self.ready {
            return Ok(None);
        }
        self.ready = false;
        self.produced += 1;
        let phase = self.produced % 4;
        Ok(Some(vec![Self::texture(phase, self.width, self.height, self.produced)]))
    }

    fn stop(&mut self) {
        self.next_due = None;
        self.ready = false;
    }
}
