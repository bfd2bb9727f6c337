// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Crate-wide error type.
// OS failures are classified by errno so callers can match on what went
// wrong rather than on message text.

use std::io;

/// Errors returned by channels, guards, registries and streams.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Segment, semaphore or slot creation failed for lack of space,
    /// memory, descriptors or free slots.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Exclusive creation collided with an existing resource key.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Bad argument, or a malformed control/payload header on decode.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The peer's resources are not visible yet. Poll again later.
    #[error("not ready: {0}")]
    TransientNotReady(String),

    /// The platform has no shared-memory transport.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// The channel's OS resources were removed while we were using them.
    #[error("channel closed: {0}")]
    Closed(String),

    #[error("{context}: {source}")]
    Os {
        context: String,
        #[source]
        source: io::Error,
    },
}

/// Shorthand for `Result<T, framepipe::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify an OS error by errno. `context` names the call and the
    /// resource, e.g. `"shmget segment 3 (key 0x1a2b3c4d)"`.
    pub(crate) fn from_os(context: impl Into<String>, err: io::Error) -> Self {
        let context = context.into();
        if err.kind() == io::ErrorKind::Unsupported {
            return Error::Unimplemented(format!("{context}: {err}"));
        }
        let Some(code) = err.raw_os_error() else {
            return Error::Os { context, source: err };
        };
        #[cfg_attr(not(unix), allow(unused_variables))]
        let msg = format!("got {} during {context}", errno_name(code));
        match code {
            #[cfg(unix)]
            libc::ENOSPC | libc::ENOMEM | libc::ENFILE | libc::EMFILE => {
                Error::ResourceExhaustion(msg)
            }
            #[cfg(unix)]
            libc::EACCES | libc::EPERM => Error::PermissionDenied(msg),
            #[cfg(unix)]
            libc::EEXIST => Error::AlreadyExists(msg),
            #[cfg(unix)]
            libc::EINVAL => Error::InvalidArgument(msg),
            #[cfg(unix)]
            libc::ENOENT => Error::TransientNotReady(msg),
            #[cfg(unix)]
            libc::ENOSYS => Error::Unimplemented(msg),
            #[cfg(unix)]
            libc::EIDRM => Error::Closed(msg),
            _ => Error::Os { context, source: err },
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Whether this error means the peer is simply not there yet.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Error::TransientNotReady(_))
    }
}

#[cfg(unix)]
fn errno_name(code: i32) -> &'static str {
    match code {
        libc::EACCES => "EACCES",
        libc::EEXIST => "EEXIST",
        libc::EINVAL => "EINVAL",
        libc::ENOENT => "ENOENT",
        libc::ENFILE => "ENFILE",
        libc::EMFILE => "EMFILE",
        libc::ENOMEM => "ENOMEM",
        libc::ENOSPC => "ENOSPC",
        libc::EPERM => "EPERM",
        libc::EIDRM => "EIDRM",
        libc::ENOSYS => "ENOSYS",
        _ => "UNKNOWN",
    }
}

#[cfg(not(unix))]
fn errno_name(_code: i32) -> &'static str {
    "UNKNOWN"
}
