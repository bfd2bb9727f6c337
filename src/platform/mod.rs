// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

#[cfg(unix)]
pub mod sysv;

#[cfg(not(unix))]
pub mod unsupported;

// Re-export the platform-specific implementations under a uniform name.

#[cfg(unix)]
pub use sysv::{ipc_key, max_segment_size, PlatformSegment, PlatformSemaphores, SemOp};

#[cfg(not(unix))]
pub use unsupported::{ipc_key, max_segment_size, PlatformSegment, PlatformSemaphores, SemOp};
