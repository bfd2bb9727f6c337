// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Channel and stream configuration.
// Resolution order for the maximum segment size:
//   1. FRAMEPIPE_MAX_SEGMENT_SIZE env var (explicit override)
//   2. the kernel limit (kernel.shmmax / kern.sysv.shmmax)
//   3. DEFAULT_MAX_SEGMENT_SIZE

use std::time::Duration;

use crate::platform;

/// Env var that overrides the maximum payload segment size, in bytes.
pub const MAX_SEGMENT_SIZE_ENV: &str = "FRAMEPIPE_MAX_SEGMENT_SIZE";

/// Used when the kernel limit cannot be queried.
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 4 * 1024 * 1024;

/// Files whose identity seeds channel keys when no explicit list is given.
/// Each must exist on every host that runs a producer or consumer.
#[cfg(target_os = "linux")]
pub const DEFAULT_KEY_SOURCES: [&str; 8] = [
    "/dev/null",
    "/dev/zero",
    "/dev/urandom",
    "/dev/random",
    "/dev/full",
    "/tmp",
    "/etc",
    "/usr",
];

#[cfg(not(target_os = "linux"))]
pub const DEFAULT_KEY_SOURCES: [&str; 8] = [
    "/dev/null",
    "/dev/zero",
    "/dev/urandom",
    "/dev/random",
    "/tmp",
    "/etc",
    "/usr",
    "/var",
];

/// Resolve the maximum payload segment size for this host.
pub fn max_segment_size() -> usize {
    if let Some(v) = std::env::var(MAX_SEGMENT_SIZE_ENV)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
    {
        return v;
    }
    platform::max_segment_size()
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_MAX_SEGMENT_SIZE)
}

/// Settings shared by producers and consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Upper bound for one payload segment. The first payload written fixes
    /// the actual size at `min(max_segment_size, payload bytes)`.
    pub max_segment_size: usize,
    /// Key-source paths, one per registry slot.
    pub key_sources: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_segment_size: max_segment_size(),
            key_sources: DEFAULT_KEY_SOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ChannelConfig {
    pub fn with_max_segment_size(mut self, bytes: usize) -> Self {
        self.max_segment_size = bytes;
        self
    }

    pub fn with_key_sources<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_sources = paths.into_iter().map(Into::into).collect();
        self
    }
}

/// Capture-loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Sleep between `prepare` attempts that report `TryAgain`.
    pub retry_interval: Duration,
    /// Consecutive `TryAgain` results tolerated before the stream gives up.
    pub max_retries: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(1),
            max_retries: 500,
        }
    }
}

impl StreamConfig {
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_defaults() {
        let c = StreamConfig::default();
        assert_eq!(c.retry_interval, Duration::from_millis(1));
        assert_eq!(c.max_retries, 500);
    }

    #[test]
    fn builders_override_fields() {
        let c = ChannelConfig::default()
            .with_max_segment_size(16)
            .with_key_sources(["/a", "/b"]);
        assert_eq!(c.max_segment_size, 16);
        assert_eq!(c.key_sources, vec!["/a".to_string(), "/b".to_string()]);
        assert!(ChannelConfig::default().max_segment_size > 0);
        assert_eq!(ChannelConfig::default().key_sources.len(), 8);
    }
}
